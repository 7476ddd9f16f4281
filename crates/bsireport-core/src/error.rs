//! 错误类型（核心库对外统一使用 ReportError）
use std::path::PathBuf;
use thiserror::Error;

/// 报告流水线错误
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration in {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("input contains events from {} scans: {}", .scan_ids.len(), .scan_ids.join(", "))]
    MultipleScans { scan_ids: Vec<String> },

    #[error("invalid timestamp {value}: {reason}")]
    InvalidTimestamp { value: String, reason: &'static str },

    #[error("template error: {0}")]
    Template(String),
}

impl ReportError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReportError::Io { path: path.into(), source }
    }
}

impl From<tera::Error> for ReportError {
    fn from(e: tera::Error) -> Self {
        // tera 的顶层消息通常只有 "Failed to render"，真正原因在 source 链里
        let mut msg = e.to_string();
        let mut cur = std::error::Error::source(&e);
        while let Some(inner) = cur {
            msg.push_str(": ");
            msg.push_str(&inner.to_string());
            cur = inner.source();
        }
        ReportError::Template(msg)
    }
}

/// 外部编译器（pdflatex / pandoc）调用错误
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{program} not found, is it installed and on PATH?")]
    NotFound { program: String },

    #[error("{program} failed ({status}): {log_tail}")]
    Failed {
        program: String,
        status: String,
        log_tail: String,
    },

    #[error("{program} did not finish within {secs}s and was killed")]
    TimedOut { program: String, secs: u64 },

    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}
