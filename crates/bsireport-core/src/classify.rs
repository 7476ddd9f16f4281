//! 事件分类与聚合（纯函数，不修改输入）
//!
//! 所有桶都按输入顺序稳定筛选；同一输入与同一组谓词总得到同样的桶。
use chrono::DateTime;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::ReportConfig;
use crate::error::ReportError;
use crate::types::{EventRecord, SourceEntry};

/// 报告封面日期格式
pub const DATE_FORMAT: &str = "%d.%m.%Y";
/// 来源汇总中的时间格式
pub const DATETIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// module 字段精确匹配（区分大小写）的 data 列表
pub fn classify_by_module(records: &[EventRecord], module: &str) -> Vec<Value> {
    collect_payloads(records, |r| r.module() == Some(module))
}

/// type 字段精确匹配的 data 列表
pub fn classify_by_type(records: &[EventRecord], event_type: &str) -> Vec<Value> {
    collect_payloads(records, |r| r.event_type() == Some(event_type))
}

fn collect_payloads(records: &[EventRecord], pred: impl Fn(&EventRecord) -> bool) -> Vec<Value> {
    records
        .iter()
        .filter(|r| pred(r))
        .map(|r| r.data().cloned().unwrap_or(Value::Null))
        .collect()
}

/// 来源汇总：type 在允许列表中且 data 为对象的记录 -> (host:port, 时间)
/// - data 缺 host 或 port 的条目不输出
/// - 被选中记录的 timestamp 无法转换时直接报错
pub fn summarize_sources(records: &[EventRecord], allowed_types: &[String]) -> Result<Vec<SourceEntry>, ReportError> {
    let mut out = Vec::new();
    for r in records {
        let selected = r.event_type().is_some_and(|t| allowed_types.iter().any(|a| a == t));
        if !selected {
            continue;
        }
        let Some(data) = r.data_object() else { continue };

        let (Some(host), Some(port)) = (label_part(data.get("host")), label_part(data.get("port"))) else {
            debug!(event_type = r.event_type(), "source entry without host/port omitted");
            continue;
        };
        out.push(SourceEntry {
            label: format!("{host}:{port}"),
            timestamp: format_timestamp(r.timestamp(), DATETIME_FORMAT)?,
        });
    }
    Ok(out)
}

fn label_part(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Unix 时间戳（秒，UTC）格式化
/// 接受 JSON 数字或数字字符串；小数部分向下取整到秒
pub fn format_timestamp(value: Option<&Value>, pattern: &str) -> Result<String, ReportError> {
    let invalid = |reason| ReportError::InvalidTimestamp {
        value: value.map(Value::to_string).unwrap_or_else(|| "<missing>".to_string()),
        reason,
    };

    let secs = match value {
        None | Some(Value::Null) => return Err(invalid("field is missing")),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => i,
            None => float_secs(n.as_f64()).ok_or_else(|| invalid("not a finite number"))?,
        },
        Some(Value::String(s)) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(i) => i,
                Err(_) => float_secs(s.parse::<f64>().ok()).ok_or_else(|| invalid("not a number"))?,
            }
        }
        Some(_) => return Err(invalid("not a number")),
    };

    let dt = DateTime::from_timestamp(secs, 0).ok_or_else(|| invalid("out of range"))?;
    Ok(dt.format(pattern).to_string())
}

fn float_secs(f: Option<f64>) -> Option<i64> {
    let f = f?;
    if !f.is_finite() || f < i64::MIN as f64 || f >= i64::MAX as f64 {
        return None;
    }
    Some(f.floor() as i64)
}

/// 报告日期：取第一条记录的时间戳；无记录时为 None
pub fn scan_date(records: &[EventRecord]) -> Result<Option<String>, ReportError> {
    match records.first() {
        None => Ok(None),
        Some(r) => format_timestamp(r.timestamp(), DATE_FORMAT).map(Some),
    }
}

/// 一次运行中模板需要的全部分类结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Buckets {
    /// 协议名 -> 该协议合规模块产出的 data 列表
    pub compliance: BTreeMap<String, Vec<Value>>,
    pub vulnerabilities: Vec<Value>,
    pub findings: Vec<Value>,
    pub sources: Vec<SourceEntry>,
}

impl Buckets {
    /// 按配置构建所有桶
    pub fn collect(records: &[EventRecord], cfg: &ReportConfig) -> Result<Self, ReportError> {
        let compliance = cfg
            .compliance_modules
            .iter()
            .map(|(proto, module)| (proto.clone(), classify_by_module(records, module)))
            .collect();
        Ok(Self {
            compliance,
            vulnerabilities: classify_by_type(records, &cfg.vulnerability_type),
            findings: classify_by_type(records, &cfg.finding_type),
            sources: summarize_sources(records, &cfg.source_types)?,
        })
    }
}
