use bsireport_core::{
    generate_report, CompileError, DocumentCompiler, LatexSyntax, MultiScanPolicy, ReportContext, ReportError,
    ReportOptions, Renderer,
};
use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const TEMPLATE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../templates/report.tex.j2");

/// 不调用外部程序：记录调用次数并写一个假 PDF
struct FakeCompiler {
    calls: Cell<usize>,
    fail: bool,
    seen_latex: std::cell::RefCell<String>,
}

impl FakeCompiler {
    fn new() -> Self {
        Self { calls: Cell::new(0), fail: false, seen_latex: Default::default() }
    }

    fn failing() -> Self {
        Self { fail: true, ..Self::new() }
    }
}

impl DocumentCompiler for FakeCompiler {
    fn program(&self) -> &str {
        "fake"
    }

    fn compile(&self, source: &Path, output: &Path) -> Result<PathBuf, CompileError> {
        self.calls.set(self.calls.get() + 1);
        *self.seen_latex.borrow_mut() = fs::read_to_string(source).unwrap();
        if self.fail {
            return Err(CompileError::Failed {
                program: "fake".into(),
                status: "exit status: 1".into(),
                log_tail: String::new(),
            });
        }
        fs::write(output, b"%PDF-1.4 fake").unwrap();
        Ok(output.to_path_buf())
    }
}

fn options(dir: &TempDir, ndjson: &str) -> ReportOptions {
    let input = dir.path().join("output.ndjson");
    fs::write(&input, ndjson).unwrap();
    let mut opts = ReportOptions {
        input,
        output: dir.path().join("report.pdf"),
        template: PathBuf::from(TEMPLATE),
        ..ReportOptions::default()
    };
    opts.config.intermediate_path = dir.path().join("build/report.tex");
    opts
}

const THREE_EVENTS: &str = r#"{"scan":"scan1","timestamp":1700000000,"type":"BSI_COMPLIANCE_RESULT","module":"bsi_compliance_tls","data":{"host":"mail.example.org","port":465,"result":"compliant"}}
{"scan":"scan1","timestamp":1700000001.25,"type":"VULNERABILITY","module":"badsecrets","data":{"host":"www.example.org","port":443,"severity":"HIGH","description":"Known secret_key in use"}}
{"scan":"scan1","timestamp":"1700000002","type":"FINDING","module":"nuclei","data":{"host":"www.example.org","description":"Directory listing"}}
"#;

#[test]
fn three_events_end_to_end() {
    let dir = TempDir::new().unwrap();
    let opts = options(&dir, THREE_EVENTS);
    let compiler = FakeCompiler::new();

    let stats = generate_report(&opts, &compiler).unwrap();

    assert_eq!(stats.records_loaded, 3);
    assert_eq!(stats.malformed_lines, 0);
    assert_eq!(stats.scan_ids, vec!["scan1".to_string()]);
    let tls = stats.compliance_counts.iter().find(|(p, _)| p == "tls").map(|(_, n)| *n);
    assert_eq!(tls, Some(1));
    assert_eq!(stats.vulnerabilities, 1);
    assert_eq!(stats.findings, 1);
    // FINDING 缺 port，不进入来源汇总
    assert_eq!(stats.sources, 2);
    assert_eq!(compiler.calls.get(), 1);
    assert_eq!(stats.pdf.as_deref(), Some(opts.output.as_path()));
    assert!(opts.output.is_file());
    // 非 debug 模式下中间文件被删除
    assert!(!stats.latex_path.exists());

    let latex = compiler.seen_latex.borrow();
    assert!(latex.contains(r"\date{14.11.2023}"));
    assert!(latex.contains(r"mail.example.org & 465 & compliant"));
    assert!(latex.contains(r"Known secret\_key in use"));
    assert!(latex.contains("www.example.org:443 & 14.11.2023 22:13:21"));
    assert!(!latex.contains(r"\VAR{"));
}

#[test]
fn multiple_scans_abort_before_compiling() {
    let dir = TempDir::new().unwrap();
    let opts = options(
        &dir,
        "{\"scan\":\"A\",\"timestamp\":0,\"type\":\"FINDING\"}\n{\"scan\":\"B\",\"timestamp\":0,\"type\":\"FINDING\"}\n",
    );
    let compiler = FakeCompiler::new();

    let err = generate_report(&opts, &compiler).unwrap_err();

    match err {
        ReportError::MultipleScans { scan_ids } => assert_eq!(scan_ids, vec!["A".to_string(), "B".to_string()]),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(compiler.calls.get(), 0);
    assert!(!opts.output.exists());
    assert!(!opts.config.intermediate_path.exists());
}

#[test]
fn multiple_scans_with_warn_policy_continue() {
    let dir = TempDir::new().unwrap();
    let mut opts = options(&dir, "{\"scan\":\"A\",\"timestamp\":0}\n{\"scan\":\"B\",\"timestamp\":0}\n");
    opts.multi_scan_policy = MultiScanPolicy::Warn;
    let compiler = FakeCompiler::new();

    let stats = generate_report(&opts, &compiler).unwrap();
    assert_eq!(stats.scan_ids.len(), 2);
    assert_eq!(compiler.calls.get(), 1);
    assert!(compiler.seen_latex.borrow().contains(r"\author{Scan: A, B}"));
}

#[test]
fn disabled_scan_check_never_aborts() {
    let dir = TempDir::new().unwrap();
    let mut opts = options(&dir, "{\"scan\":\"A\",\"timestamp\":0}\n{\"scan\":\"B\",\"timestamp\":0}\n");
    opts.skip_scan_check = true;
    let compiler = FakeCompiler::new();

    assert!(generate_report(&opts, &compiler).unwrap().pdf.is_some());
}

#[test]
fn malformed_lines_are_skipped() {
    let dir = TempDir::new().unwrap();
    let mut input = String::from(THREE_EVENTS);
    input.insert_str(0, "this is not json\n");
    let opts = options(&dir, &input);
    let compiler = FakeCompiler::new();

    let stats = generate_report(&opts, &compiler).unwrap();
    assert_eq!(stats.records_loaded, 3);
    assert_eq!(stats.malformed_lines, 1);
}

#[test]
fn empty_input_renders_empty_sections() {
    let dir = TempDir::new().unwrap();
    let opts = options(&dir, "");
    let compiler = FakeCompiler::new();

    let stats = generate_report(&opts, &compiler).unwrap();
    assert_eq!(stats.records_loaded, 0);
    assert_eq!(compiler.calls.get(), 1);
    let latex = compiler.seen_latex.borrow();
    assert!(latex.contains("No vulnerabilities were reported."));
    assert!(latex.contains("No TLS compliance results."));
    assert!(latex.contains(r"\date{}"));
}

#[test]
fn keep_artifacts_retains_rendered_latex() {
    let dir = TempDir::new().unwrap();
    let mut opts = options(&dir, THREE_EVENTS);
    opts.keep_artifacts = true;
    let compiler = FakeCompiler::new();

    let stats = generate_report(&opts, &compiler).unwrap();
    let kept = fs::read_to_string(&stats.latex_path).unwrap();
    assert!(kept.starts_with(r"\documentclass"));
}

#[test]
fn compile_failure_is_recovered() {
    let dir = TempDir::new().unwrap();
    let opts = options(&dir, THREE_EVENTS);
    let compiler = FakeCompiler::failing();

    let stats = generate_report(&opts, &compiler).unwrap();
    assert!(stats.pdf.is_none());
    assert_eq!(compiler.calls.get(), 1);
    // 失败路径同样清理中间文件
    assert!(!stats.latex_path.exists());
}

#[test]
fn template_error_is_fatal_and_skips_compiler() {
    let dir = TempDir::new().unwrap();
    let mut opts = options(&dir, THREE_EVENTS);
    let template = dir.path().join("broken.tex.j2");
    fs::write(&template, "\\VAR{ no_such_binding }\n").unwrap();
    opts.template = template;
    let compiler = FakeCompiler::new();

    let err = generate_report(&opts, &compiler).unwrap_err();
    assert!(matches!(err, ReportError::Template(_)));
    assert_eq!(compiler.calls.get(), 0);
}

#[test]
fn bad_timestamp_on_summarized_record_is_fatal() {
    let dir = TempDir::new().unwrap();
    let opts = options(
        &dir,
        "{\"scan\":\"s\",\"timestamp\":0,\"type\":\"DNS_NAME\"}\n{\"scan\":\"s\",\"type\":\"FINDING\",\"data\":{\"host\":\"h\",\"port\":1}}\n",
    );
    let compiler = FakeCompiler::new();

    let err = generate_report(&opts, &compiler).unwrap_err();
    assert!(matches!(err, ReportError::InvalidTimestamp { .. }));
    assert_eq!(compiler.calls.get(), 0);
}

#[test]
fn bundled_template_renders_with_empty_bindings() {
    let renderer = Renderer::new(LatexSyntax::default()).unwrap();
    let out = renderer.render_file(Path::new(TEMPLATE), &ReportContext::default()).unwrap();
    assert!(out.contains(r"\begin{document}"));
    assert!(out.contains("No sources were recorded for this scan."));
    assert!(out.contains("No findings were reported."));
    assert!(!out.contains("%%"));
}

#[test]
fn string_and_number_scan_ids_abort() {
    let dir = TempDir::new().unwrap();
    let opts = options(&dir, "{\"scan\":\"1\",\"timestamp\":0}\n{\"scan\":1,\"timestamp\":0}\n");
    let compiler = FakeCompiler::new();

    let err = generate_report(&opts, &compiler).unwrap_err();
    assert!(matches!(err, ReportError::MultipleScans { .. }));
    assert_eq!(compiler.calls.get(), 0);
    assert!(!opts.output.exists());
}
