use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use bsireport_core::{build_compiler, generate_report, load_config, CompilerMode, MultiScanPolicy, ReportConfig, ReportOptions};
use std::path::PathBuf;
use tracing::info;

/// 命令行入口（基于 clap）
#[derive(Parser, Debug)]
#[command(name = "bsireport", version, about = "Create a PDF compliance report from scan output.ndjson via a LaTeX template")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 读取 output.ndjson 并生成 PDF 报告
    Generate {
        /// 扫描输出（NDJSON，每行一个事件）
        #[arg(short = 'j', long, value_name = "PATH")]
        ndjson: PathBuf,

        /// 报告导出路径
        #[arg(short, long, value_name = "PATH", default_value = "output/report.pdf")]
        output: PathBuf,

        /// LaTeX 模板
        #[arg(short, long, value_name = "PATH", default_value = "templates/report.tex.j2")]
        template: PathBuf,

        /// debug 日志，并保留渲染后的 .tex 与编译日志
        #[arg(short, long)]
        debug: bool,

        /// 不检查 scan id（报告可能混合多次扫描的结果）
        #[arg(long)]
        disable_scan_id_checking: bool,

        /// 编译器：pdflatex 或 pandoc（默认 pdflatex）
        #[arg(long, default_value = "pdflatex", value_parser = ["pdflatex", "pandoc"])]
        compiler: String,

        /// 兼容旧参数，等同于 --compiler pdflatex
        #[arg(short = 'p', long)]
        use_pdflatex: bool,

        /// 发现多个 scan id 时：abort（默认）或 warn
        #[arg(long, default_value = "abort", value_parser = ["abort", "warn"])]
        on_multiple_scans: String,

        /// 配置文件（TOML），缺省使用内置默认值
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// 编译超时（秒，0 表示不限制），覆盖配置文件
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            ndjson,
            output,
            template,
            debug,
            disable_scan_id_checking,
            compiler,
            use_pdflatex,
            on_multiple_scans,
            config,
            timeout,
        } => {
            // 初始化日志（RUST_LOG 控制等级；--debug 强制 debug）
            init_tracing(debug);
            info!(?ndjson, ?output, ?template, "generating report");

            let mut cfg = match &config {
                Some(path) => load_config(path).with_context(|| format!("load config {}", path.display()))?,
                None => ReportConfig::default(),
            };
            if let Some(secs) = timeout {
                cfg.compile_timeout_secs = secs;
            }

            let compiler = match (use_pdflatex, compiler.as_str()) {
                (false, "pandoc") => CompilerMode::Pandoc,
                _ => CompilerMode::Pdflatex,
            };
            let multi_scan_policy = match on_multiple_scans.as_str() {
                "warn" => MultiScanPolicy::Warn,
                _ => MultiScanPolicy::Abort,
            };

            let opts = ReportOptions {
                input: ndjson,
                output,
                template,
                keep_artifacts: debug,
                skip_scan_check: disable_scan_id_checking,
                multi_scan_policy,
                compiler,
                config: cfg,
            };
            let doc_compiler = build_compiler(opts.compiler, &opts.config, opts.keep_artifacts);
            let stats = generate_report(&opts, doc_compiler.as_ref()).context("report generation failed")?;

            info!(
                records = stats.records_loaded,
                malformed = stats.malformed_lines,
                compliance = ?stats.compliance_counts,
                vulnerabilities = stats.vulnerabilities,
                findings = stats.findings,
                sources = stats.sources,
                "report data summary"
            );
            match stats.pdf {
                Some(pdf) => info!(pdf = %pdf.display(), "report finished"),
                None => bail!("{} could not produce {}", doc_compiler.program(), opts.output.display()),
            }
        }
    }

    Ok(())
}

fn init_tracing(debug: bool) {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let env_filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(env_filter).with_writer(std::io::stderr).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
