//! 报告选项与统计信息（模块）
use std::path::PathBuf;

use crate::config::ReportConfig;

/// 编译模式
/// - Pdflatex：直接调用排版引擎生成 PDF（默认）。
/// - Pandoc：通过文档转换工具生成 PDF，作为备用路径。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompilerMode {
    #[default]
    Pdflatex,
    Pandoc,
}

/// 检测到多个 scan id 时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MultiScanPolicy {
    /// 立即失败，不渲染也不编译
    #[default]
    Abort,
    /// 仅记录警告，继续用混合数据生成报告
    Warn,
}

/// 报告生成选项
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// 输入 NDJSON 文件
    pub input: PathBuf,
    /// 目标 PDF 路径
    pub output: PathBuf,
    /// LaTeX 模板路径
    pub template: PathBuf,
    /// 保留中间文件（.tex、编译日志、辅助文件），debug 模式下开启
    pub keep_artifacts: bool,
    /// 跳过 scan id 一致性检查
    pub skip_scan_check: bool,
    pub multi_scan_policy: MultiScanPolicy,
    pub compiler: CompilerMode,
    /// 分类规则、外部程序名、超时等
    pub config: ReportConfig,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            input: PathBuf::from("output.ndjson"),
            output: PathBuf::from("output/report.pdf"),
            template: PathBuf::from("templates/report.tex.j2"),
            keep_artifacts: false,
            skip_scan_check: false,
            multi_scan_policy: MultiScanPolicy::Abort,
            compiler: CompilerMode::Pdflatex,
            config: ReportConfig::default(),
        }
    }
}

/// 生成统计信息（便于 CLI 打印）
#[derive(Debug, Default, Clone)]
pub struct ReportStats {
    pub records_loaded: usize,
    pub malformed_lines: usize,
    pub scan_ids: Vec<String>,
    /// (协议, 条目数)，按协议名排序
    pub compliance_counts: Vec<(String, usize)>,
    pub vulnerabilities: usize,
    pub findings: usize,
    pub sources: usize,
    /// 渲染后的 LaTeX 文件（可能已被删除）
    pub latex_path: PathBuf,
    /// 编译成功时为生成的 PDF 路径
    pub pdf: Option<PathBuf>,
}
