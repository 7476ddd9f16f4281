//! 外部编译器调用（pdflatex / pandoc）
//!
//! 外部程序的 stdout/stderr 统一重定向到 `<source>.compile.log`，
//! 调用线程只做阻塞等待（可选超时），不需要额外的读管道线程。
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::ReportConfig;
use crate::error::CompileError;
use crate::options::CompilerMode;

/// 轮询子进程状态的间隔
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// 失败时附带的日志行数
const LOG_TAIL_LINES: usize = 20;
/// pdflatex 在输出目录留下的辅助文件
const PDFLATEX_AUX_EXTENSIONS: &[&str] = &["aux", "log", "out", "toc"];

/// 把渲染好的 LaTeX 文件编译为 PDF
pub trait DocumentCompiler {
    /// 外部程序名（日志用）
    fn program(&self) -> &str;

    /// 编译 `source`，成功时返回生成的 PDF 路径（即 `output`）
    fn compile(&self, source: &Path, output: &Path) -> Result<PathBuf, CompileError>;
}

/// 按模式构建编译器
pub fn build_compiler(mode: CompilerMode, cfg: &ReportConfig, keep_artifacts: bool) -> Box<dyn DocumentCompiler> {
    let timeout = match cfg.compile_timeout_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    match mode {
        CompilerMode::Pdflatex => Box::new(PdflatexCompiler {
            program: cfg.pdflatex_program.clone(),
            timeout,
            keep_artifacts,
        }),
        CompilerMode::Pandoc => Box::new(PandocCompiler {
            program: cfg.pandoc_program.clone(),
            timeout,
            keep_artifacts,
        }),
    }
}

/// 直接调用排版引擎
#[derive(Debug, Clone)]
pub struct PdflatexCompiler {
    pub program: String,
    pub timeout: Option<Duration>,
    pub keep_artifacts: bool,
}

impl DocumentCompiler for PdflatexCompiler {
    fn program(&self) -> &str {
        &self.program
    }

    fn compile(&self, source: &Path, output: &Path) -> Result<PathBuf, CompileError> {
        let out_dir = parent_dir(output);
        std::fs::create_dir_all(&out_dir).map_err(|e| self.io_err(e))?;
        // jobname 决定 pdflatex 产物的文件名，否则会沿用 .tex 的文件名
        let jobname = output
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("report")
            .to_string();

        let args = vec![
            "-interaction=nonstopmode".to_string(),
            "-halt-on-error".to_string(),
            format!("-output-directory={}", out_dir.display()),
            format!("-jobname={jobname}"),
            source.display().to_string(),
        ];
        let log_path = compile_log_path(source);
        let res = run_tool(&self.program, &args, &log_path, self.timeout).and_then(|status| {
            let produced = out_dir.join(format!("{jobname}.pdf"));
            check_success(&self.program, status, &produced, &log_path)?;
            if produced != output {
                std::fs::rename(&produced, output).map_err(|e| self.io_err(e))?;
            }
            Ok(output.to_path_buf())
        });

        if !self.keep_artifacts {
            remove_quietly(&log_path);
            for ext in PDFLATEX_AUX_EXTENSIONS {
                remove_quietly(&out_dir.join(format!("{jobname}.{ext}")));
            }
        }
        res
    }
}

impl PdflatexCompiler {
    fn io_err(&self, source: std::io::Error) -> CompileError {
        CompileError::Io { program: self.program.clone(), source }
    }
}

/// 通过 pandoc 转换（备用路径）
#[derive(Debug, Clone)]
pub struct PandocCompiler {
    pub program: String,
    pub timeout: Option<Duration>,
    pub keep_artifacts: bool,
}

impl DocumentCompiler for PandocCompiler {
    fn program(&self) -> &str {
        &self.program
    }

    fn compile(&self, source: &Path, output: &Path) -> Result<PathBuf, CompileError> {
        std::fs::create_dir_all(parent_dir(output)).map_err(|e| CompileError::Io {
            program: self.program.clone(),
            source: e,
        })?;

        let args = vec![
            "--from=latex".to_string(),
            format!("--output={}", output.display()),
            source.display().to_string(),
        ];
        let log_path = compile_log_path(source);
        let res = run_tool(&self.program, &args, &log_path, self.timeout)
            .and_then(|status| check_success(&self.program, status, output, &log_path))
            .map(|_| output.to_path_buf());

        if !self.keep_artifacts {
            remove_quietly(&log_path);
        }
        res
    }
}

/// 运行外部程序并等待结束；超时则杀掉子进程
fn run_tool(program: &str, args: &[String], log_path: &Path, timeout: Option<Duration>) -> Result<ExitStatus, CompileError> {
    let io_err = |source| CompileError::Io { program: program.to_string(), source };

    let log = File::create(log_path).map_err(io_err)?;
    let log_err = log.try_clone().map_err(io_err)?;

    info!(program, ?args, "invoking document compiler");
    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .spawn()
    {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(CompileError::NotFound { program: program.to_string() })
        }
        Err(e) => return Err(io_err(e)),
    };

    match timeout {
        None => child.wait().map_err(io_err),
        Some(limit) => wait_with_timeout(&mut child, program, limit),
    }
}

fn wait_with_timeout(child: &mut Child, program: &str, limit: Duration) -> Result<ExitStatus, CompileError> {
    let io_err = |source| CompileError::Io { program: program.to_string(), source };
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait().map_err(io_err)? {
            return Ok(status);
        }
        if started.elapsed() >= limit {
            // 进程可能恰好已退出，kill 失败无需处理
            let _ = child.kill();
            let _ = child.wait();
            return Err(CompileError::TimedOut { program: program.to_string(), secs: limit.as_secs() });
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// 退出码非 0 或产物缺失都算失败
fn check_success(program: &str, status: ExitStatus, produced: &Path, log_path: &Path) -> Result<(), CompileError> {
    if !status.success() {
        return Err(CompileError::Failed {
            program: program.to_string(),
            status: status.to_string(),
            log_tail: log_tail(log_path),
        });
    }
    if !produced.is_file() {
        return Err(CompileError::Failed {
            program: program.to_string(),
            status: format!("{status}, but {} was not produced", produced.display()),
            log_tail: log_tail(log_path),
        });
    }
    debug!(program, output = %produced.display(), "document compiled");
    Ok(())
}

fn compile_log_path(source: &Path) -> PathBuf {
    let mut name = source.file_name().map(|s| s.to_os_string()).unwrap_or_default();
    name.push(".compile.log");
    source.with_file_name(name)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn log_tail(path: &Path) -> String {
    let Ok(file) = File::open(path) else { return String::new() };
    let lines: Vec<String> = BufReader::new(file).lines().map_while(Result::ok).collect();
    let start = lines.len().saturating_sub(LOG_TAIL_LINES);
    lines[start..].join("\n")
}

fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed artifact"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => debug!(path = %path.display(), error = %e, "could not remove artifact"),
    }
}
