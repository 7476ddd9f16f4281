//! scan id 一致性校验
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

use crate::types::EventRecord;

/// 校验结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanIdentity {
    pub valid: bool,
    /// 去重后的 scan id（排序）；缺失记为空串，非字符串取 JSON 文本
    pub scan_ids: Vec<String>,
}

/// 检查输入是否只来自一次扫描
/// - skip_check 为真时只告警，结果恒为 valid
/// - 空输入视为 valid
pub fn validate_scan_identity(records: &[EventRecord], skip_check: bool) -> ScanIdentity {
    // 以 JSON 文本去重（字符串带引号），"1" 与 1 是两个不同的 scan
    let distinct: BTreeMap<String, String> = records
        .iter()
        .map(|r| match r.scan() {
            None => ("\"\"".to_string(), String::new()),
            Some(v) => (v.to_string(), display_scan(v)),
        })
        .collect();
    let mut scan_ids: Vec<String> = distinct.into_values().collect();
    scan_ids.sort();

    if skip_check {
        warn!("scan id checking is disabled, report may contain results from multiple scans");
        return ScanIdentity { valid: true, scan_ids };
    }

    ScanIdentity { valid: scan_ids.len() <= 1, scan_ids }
}

/// 展示用：字符串去掉引号，其余取 JSON 文本
fn display_scan(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
