//! 报告生成主流程：加载 → 校验 → 分类 → 渲染 → 编译
//!
//! 全程单线程顺序执行；外部编译器只调用一次，不重试。
use std::path::Path;
use tracing::{error, info, warn};

use crate::classify::{scan_date, Buckets};
use crate::compile::DocumentCompiler;
use crate::error::ReportError;
use crate::loader::load_records_from_path;
use crate::options::{MultiScanPolicy, ReportOptions, ReportStats};
use crate::render::{LatexSyntax, ReportContext, Renderer};
use crate::validate::validate_scan_identity;

/// 生成 PDF 报告
/// - 多 scan 输入在 Abort 策略下于渲染前失败，不会调用编译器
/// - 模板或写盘失败直接返回错误
/// - 编译失败只记录日志，`ReportStats::pdf` 为 None
/// - 中间 .tex 在成功与失败时都会删除，除非 keep_artifacts
pub fn generate_report(opts: &ReportOptions, compiler: &dyn DocumentCompiler) -> Result<ReportStats, ReportError> {
    let loaded = load_records_from_path(&opts.input)?;
    let records = loaded.records;
    info!(records = records.len(), malformed = loaded.malformed, input = %opts.input.display(), "events loaded");

    let identity = validate_scan_identity(&records, opts.skip_scan_check);
    if !identity.valid {
        match opts.multi_scan_policy {
            MultiScanPolicy::Abort => return Err(ReportError::MultipleScans { scan_ids: identity.scan_ids }),
            MultiScanPolicy::Warn => {
                warn!(scan_ids = ?identity.scan_ids, "input contains events from multiple scans, report is based on mixed data")
            }
        }
    }

    let buckets = Buckets::collect(&records, &opts.config)?;
    let ctx = ReportContext {
        scan_ids: identity.scan_ids,
        timestamp: scan_date(&records)?,
        buckets,
    };

    let mut stats = ReportStats {
        records_loaded: records.len(),
        malformed_lines: loaded.malformed,
        scan_ids: ctx.scan_ids.clone(),
        compliance_counts: ctx.buckets.compliance.iter().map(|(k, v)| (k.clone(), v.len())).collect(),
        vulnerabilities: ctx.buckets.vulnerabilities.len(),
        findings: ctx.buckets.findings.len(),
        sources: ctx.buckets.sources.len(),
        latex_path: opts.config.intermediate_path.clone(),
        pdf: None,
    };

    let renderer = Renderer::new(LatexSyntax::default())?;
    let latex = renderer.render_file(&opts.template, &ctx)?;
    write_latex(&stats.latex_path, &latex)?;
    info!(path = %stats.latex_path.display(), bytes = latex.len(), "rendered LaTeX written");

    match compiler.compile(&stats.latex_path, &opts.output) {
        Ok(pdf) => {
            info!(program = compiler.program(), pdf = %pdf.display(), "report compiled");
            stats.pdf = Some(pdf);
        }
        Err(e) => error!(program = compiler.program(), error = %e, "error while converting LaTeX to PDF"),
    }

    if !opts.keep_artifacts {
        if let Err(e) = std::fs::remove_file(&stats.latex_path) {
            warn!(path = %stats.latex_path.display(), error = %e, "could not delete rendered LaTeX");
        }
    }

    Ok(stats)
}

fn write_latex(path: &Path, content: &str) -> Result<(), ReportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ReportError::io(parent, e))?;
    }
    std::fs::write(path, content).map_err(|e| ReportError::io(path, e))
}
