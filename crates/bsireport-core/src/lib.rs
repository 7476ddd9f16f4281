//! 合规报告核心库
//!
//! 设计要点：
//! - 输入为扫描工具输出的 NDJSON 事件流，逐行解析，坏行跳过并告警。
//! - 校验所有事件来自同一次扫描（可关闭；多 scan 时默认中止）。
//! - 按 module / type 字段稳定筛选出报告各章节所需的数据桶。
//! - 通过 LaTeX 风格定界符的 Tera 模板渲染，再交给 pdflatex 或 pandoc 生成 PDF。

mod options;
mod config;
mod error;
mod types;
mod loader;
mod validate;
mod classify;
mod render;
mod compile;
mod report;

pub use options::{CompilerMode, MultiScanPolicy, ReportOptions, ReportStats};
pub use config::{load_config, ReportConfig};
pub use error::{CompileError, ReportError};
pub use types::{EventRecord, SourceEntry};
pub use loader::{load_records, load_records_from_path, LoadedRecords};
pub use validate::{validate_scan_identity, ScanIdentity};
pub use classify::{
    classify_by_module, classify_by_type, format_timestamp, scan_date, summarize_sources, Buckets, DATETIME_FORMAT,
    DATE_FORMAT,
};
pub use render::{escape_latex, LatexSyntax, ReportContext, Renderer};
pub use compile::{build_compiler, DocumentCompiler, PandocCompiler, PdflatexCompiler};
pub use report::generate_report;
