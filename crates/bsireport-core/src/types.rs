//! 公共类型（对外暴露）
use serde::Serialize;
use serde_json::{Map, Value};

/// 单条扫描事件（NDJSON 的一行）
///
/// 加载阶段不强制要求是 JSON 对象；非对象记录的所有字段访问均返回 None。
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord(Value);

impl EventRecord {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    fn field(&self, key: &str) -> Option<&Value> {
        self.0.as_object().and_then(|m| m.get(key))
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(Value::as_str)
    }

    /// 原始 scan 字段
    pub fn scan(&self) -> Option<&Value> {
        self.field("scan")
    }

    pub fn module(&self) -> Option<&str> {
        self.str_field("module")
    }

    pub fn event_type(&self) -> Option<&str> {
        self.str_field("type")
    }

    pub fn timestamp(&self) -> Option<&Value> {
        self.field("timestamp")
    }

    pub fn data(&self) -> Option<&Value> {
        self.field("data")
    }

    /// data 为对象时返回该对象
    pub fn data_object(&self) -> Option<&Map<String, Value>> {
        self.data().and_then(Value::as_object)
    }
}

/// 来源汇总条目（模板中的 sources 列表元素）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceEntry {
    /// host:port
    pub label: String,
    /// DD.MM.YYYY HH:MM:SS（UTC）
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accessors_on_object() {
        let r = EventRecord::new(json!({
            "scan": "s1", "module": "bsi_compliance_tls", "type": "BSI_COMPLIANCE_RESULT",
            "timestamp": 1.5, "data": {"host": "a"}
        }));
        assert_eq!(r.scan(), Some(&json!("s1")));
        assert_eq!(r.module(), Some("bsi_compliance_tls"));
        assert_eq!(r.event_type(), Some("BSI_COMPLIANCE_RESULT"));
        assert_eq!(r.timestamp(), Some(&json!(1.5)));
        assert!(r.data_object().is_some());
    }

    #[test]
    fn non_object_record_has_no_fields() {
        let r = EventRecord::new(json!([1, 2, 3]));
        assert!(r.scan().is_none());
        assert!(r.module().is_none());
        assert!(r.data().is_none());
    }

    #[test]
    fn non_string_module_is_absent() {
        let r = EventRecord::new(json!({"module": 7, "data": "plain"}));
        assert!(r.module().is_none());
        assert!(r.data().is_some());
        assert!(r.data_object().is_none());
    }
}
