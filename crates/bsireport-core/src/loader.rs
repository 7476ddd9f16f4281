//! NDJSON 事件加载（逐行解析，坏行跳过）
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::ReportError;
use crate::types::EventRecord;

/// 加载结果
#[derive(Debug, Default, Clone)]
pub struct LoadedRecords {
    /// 成功解析的记录，保持输入顺序
    pub records: Vec<EventRecord>,
    /// 无法解析的行数（每行一条 warn 日志）
    pub malformed: usize,
}

/// 逐行解析 NDJSON
/// - 每行独立解析，失败时记录行号与原文后继续，不重试
/// - 空白行直接跳过
/// - 非 UTF-8 的行按解析失败处理
pub fn load_records<R: BufRead>(mut reader: R) -> Result<LoadedRecords, std::io::Error> {
    let mut out = LoadedRecords::default();
    let mut buf: Vec<u8> = Vec::new();
    let mut line_no = 0usize;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_no += 1;

        let line = buf.trim_ascii();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_slice(line) {
            Ok(value) => out.records.push(EventRecord::new(value)),
            Err(e) => {
                out.malformed += 1;
                warn!(line = line_no, error = %e, content = %String::from_utf8_lossy(line), "skipping malformed JSON line");
            }
        }
    }

    debug!(records = out.records.len(), malformed = out.malformed, "ndjson loaded");
    Ok(out)
}

/// 打开文件并加载；文件本身读不了是致命错误
pub fn load_records_from_path(path: &Path) -> Result<LoadedRecords, ReportError> {
    let file = File::open(path).map_err(|e| ReportError::io(path, e))?;
    load_records(BufReader::new(file)).map_err(|e| ReportError::io(path, e))
}
