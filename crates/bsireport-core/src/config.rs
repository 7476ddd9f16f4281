//! 配置文件加载（TOML）
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ReportError;

/// 报告配置；所有字段可省略，缺省值与 config/default.toml 一致
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    /// 协议名 -> 产生合规结果的模块名（如 tls -> bsi_compliance_tls）
    pub compliance_modules: BTreeMap<String, String>,
    pub vulnerability_type: String,
    pub finding_type: String,
    /// 参与来源汇总（host:port + 时间）的事件类型
    pub source_types: Vec<String>,
    /// 渲染后 LaTeX 的落盘位置（相对当前目录）
    pub intermediate_path: PathBuf,
    /// 外部编译器超时（秒），0 表示不限制
    pub compile_timeout_secs: u64,
    pub pdflatex_program: String,
    pub pandoc_program: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        let compliance_modules = [("tls", "bsi_compliance_tls"), ("ssh", "bsi_compliance_ssh"), ("ipsec", "bsi_compliance_ipsec")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            compliance_modules,
            vulnerability_type: "VULNERABILITY".to_string(),
            finding_type: "FINDING".to_string(),
            source_types: vec![
                "BSI_COMPLIANCE_RESULT".to_string(),
                "VULNERABILITY".to_string(),
                "FINDING".to_string(),
            ],
            intermediate_path: PathBuf::from("output/report.tex"),
            compile_timeout_secs: 300,
            pdflatex_program: "pdflatex".to_string(),
            pandoc_program: "pandoc".to_string(),
        }
    }
}

/// 从 TOML 文件加载配置；未出现的键取默认值
pub fn load_config(path: &Path) -> Result<ReportConfig, ReportError> {
    let txt = std::fs::read_to_string(path).map_err(|e| ReportError::io(path, e))?;
    let parsed: ReportConfig = toml::from_str(&txt).map_err(|e| ReportError::Config {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    // 协议名会拼成模板变量名 <protocol>_compliance_events
    if let Some(bad) = parsed
        .compliance_modules
        .keys()
        .find(|k| k.is_empty() || !k.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
    {
        return Err(ReportError::Config {
            path: path.to_path_buf(),
            message: format!("protocol name {bad:?} must be a non-empty identifier"),
        });
    }

    Ok(parsed)
}
