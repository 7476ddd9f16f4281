//! LaTeX 模板渲染（Tera）
//!
//! LaTeX 自身大量使用 `{` `}`，与 Tera 的 `{{ }}` / `{% %}` / `{# #}` 冲突，
//! 因此模板采用 LaTeX 风格的定界符（默认 `\VAR{}`、`\BLOCK{}`、`\#{}`，
//! 以及行首 `%%` 语句、`%#` 注释），渲染前先翻译为 Tera 源码：
//! - 定界符内的表达式原样交给 Tera；
//! - 其余文本只要含 `{` 就包进 `{% raw %}`，保证不会被 Tera 误认。
//!
//! 与 Jinja 的差异：`%#` 行注释连同换行整行删除，不会留下空行。
//!
//! 定界符配置是显式传入 [`Renderer::new`] 的值，不存在进程级共享状态。
use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use std::collections::HashMap;
use std::path::Path;
use tera::{Context, Tera, Value};

use crate::classify::Buckets;
use crate::error::ReportError;

/// 模板定界符配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatexSyntax {
    pub block_start: String,
    pub block_end: String,
    pub variable_start: String,
    pub variable_end: String,
    pub comment_start: String,
    pub comment_end: String,
    /// 以此开头的整行视为语句（如 `%% for x in xs`）
    pub line_statement_prefix: Option<String>,
    /// 以此开头的整行视为模板注释，连同换行整行丢弃
    pub line_comment_prefix: Option<String>,
    /// 去掉块标签（及注释、行语句）后紧跟的第一个换行
    pub trim_blocks: bool,
}

impl Default for LatexSyntax {
    fn default() -> Self {
        Self {
            block_start: r"\BLOCK{".to_string(),
            block_end: "}".to_string(),
            variable_start: r"\VAR{".to_string(),
            variable_end: "}".to_string(),
            comment_start: r"\#{".to_string(),
            comment_end: "}".to_string(),
            line_statement_prefix: Some("%%".to_string()),
            line_comment_prefix: Some("%#".to_string()),
            trim_blocks: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Block,
    Variable,
    Comment,
}

/// 模板变量绑定
#[derive(Debug, Clone, Default)]
pub struct ReportContext {
    pub scan_ids: Vec<String>,
    /// 报告日期（DD.MM.YYYY），无记录时绑定为空串
    pub timestamp: Option<String>,
    pub buckets: Buckets,
}

impl ReportContext {
    /// 转换为 Tera 上下文
    /// - `<protocol>_compliance_events`：每个合规协议一个列表，另有 `compliance` 映射
    /// - `vulnerability_events` / `finding_events` / `sources`
    pub fn to_tera_context(&self) -> Context {
        let mut ctx = Context::new();
        ctx.insert("scan_ids", &self.scan_ids);
        ctx.insert("timestamp", self.timestamp.as_deref().unwrap_or(""));
        for (proto, events) in &self.buckets.compliance {
            ctx.insert(format!("{proto}_compliance_events"), events);
        }
        ctx.insert("compliance", &self.buckets.compliance);
        ctx.insert("vulnerability_events", &self.buckets.vulnerabilities);
        ctx.insert("finding_events", &self.buckets.findings);
        ctx.insert("sources", &self.buckets.sources);
        ctx
    }
}

/// 模板渲染器
pub struct Renderer {
    syntax: LatexSyntax,
    /// 三种起始定界符（顺序与 TagKind 对应）
    starts: AhoCorasick,
}

impl Renderer {
    pub fn new(syntax: LatexSyntax) -> Result<Self, ReportError> {
        let delims = [
            &syntax.block_start,
            &syntax.block_end,
            &syntax.variable_start,
            &syntax.variable_end,
            &syntax.comment_start,
            &syntax.comment_end,
        ];
        if delims.iter().any(|d| d.is_empty()) {
            return Err(ReportError::Template("template delimiters must not be empty".to_string()));
        }
        let starts = [&syntax.block_start, &syntax.variable_start, &syntax.comment_start];
        if starts[0] == starts[1] || starts[0] == starts[2] || starts[1] == starts[2] {
            return Err(ReportError::Template("template start delimiters must be distinct".to_string()));
        }

        // 起始定界符可能互为前缀，取最长匹配
        let starts = AhoCorasickBuilder::new()
            .match_kind(MatchKind::LeftmostLongest)
            .build(starts)
            .map_err(|e| ReportError::Template(format!("invalid template delimiters: {e}")))?;
        Ok(Self { syntax, starts })
    }

    /// 将 LaTeX 定界符模板翻译为 Tera 源码
    pub fn translate(&self, src: &str) -> Result<String, ReportError> {
        let mut out = String::with_capacity(src.len() + src.len() / 4);
        let mut pending = String::new();

        for line in src.split_inclusive('\n') {
            let body = line.trim_start();

            if let Some(prefix) = self.syntax.line_comment_prefix.as_deref() {
                if body.starts_with(prefix) {
                    self.translate_inline(&pending, &mut out)?;
                    pending.clear();
                    continue;
                }
            }

            if let Some(prefix) = self.syntax.line_statement_prefix.as_deref() {
                if let Some(stmt) = body.strip_prefix(prefix) {
                    self.translate_inline(&pending, &mut out)?;
                    pending.clear();
                    out.push_str("{% ");
                    out.push_str(stmt.trim());
                    out.push_str(" %}");
                    if !self.syntax.trim_blocks && line.ends_with('\n') {
                        out.push('\n');
                    }
                    continue;
                }
            }

            pending.push_str(line);
        }
        self.translate_inline(&pending, &mut out)?;
        Ok(out)
    }

    fn translate_inline(&self, text: &str, out: &mut String) -> Result<(), ReportError> {
        let mut pos = 0;
        while let Some(m) = self.starts.find(&text[pos..]) {
            let tag_start = pos + m.start();
            push_text(&text[pos..tag_start], out);

            let kind = match m.pattern().as_usize() {
                0 => TagKind::Block,
                1 => TagKind::Variable,
                _ => TagKind::Comment,
            };
            let end_delim = match kind {
                TagKind::Block => &self.syntax.block_end,
                TagKind::Variable => &self.syntax.variable_end,
                TagKind::Comment => &self.syntax.comment_end,
            };

            let inner_start = pos + m.end();
            let inner_len = find_tag_end(&text[inner_start..], end_delim).ok_or_else(|| {
                let line = text[..tag_start].matches('\n').count() + 1;
                ReportError::Template(format!("unclosed {kind:?} tag in template near line {line}"))
            })?;
            let inner = text[inner_start..inner_start + inner_len].trim();

            match kind {
                TagKind::Variable => {
                    out.push_str("{{ ");
                    out.push_str(inner);
                    out.push_str(" }}");
                }
                TagKind::Block => {
                    out.push_str("{% ");
                    out.push_str(inner);
                    out.push_str(" %}");
                }
                TagKind::Comment => {}
            }

            pos = inner_start + inner_len + end_delim.len();
            if self.syntax.trim_blocks && kind != TagKind::Variable {
                let rest = &text[pos..];
                if rest.starts_with("\r\n") {
                    pos += 2;
                } else if rest.starts_with('\n') {
                    pos += 1;
                }
            }
        }
        push_text(&text[pos..], out);
        Ok(())
    }

    /// 渲染模板源码
    pub fn render(&self, name: &str, template: &str, ctx: &ReportContext) -> Result<String, ReportError> {
        let translated = self.translate(template)?;

        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.register_filter("tex", tex_filter);
        tera.add_raw_template(name, &translated)?;

        let rendered = tera.render(name, &ctx.to_tera_context())?;
        Ok(rendered)
    }

    /// 读取模板文件并渲染
    pub fn render_file(&self, path: &Path, ctx: &ReportContext) -> Result<String, ReportError> {
        let template = std::fs::read_to_string(path).map_err(|e| ReportError::io(path, e))?;
        let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("report.tex");
        self.render(name, &template, ctx)
    }
}

/// 普通文本：含 `{` 时整段包进 raw 块
fn push_text(text: &str, out: &mut String) {
    if text.is_empty() {
        return;
    }
    if text.contains('{') {
        out.push_str("{% raw %}");
        out.push_str(text);
        out.push_str("{% endraw %}");
    } else {
        out.push_str(text);
    }
}

/// 在标签内容中找结束定界符的位置
/// 跳过字符串字面量，并按 `{` `}` 配对计数（表达式里可能出现花括号）
fn find_tag_end(s: &str, end: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        if depth == 0 && s[i..].starts_with(end) {
            return Some(i);
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    None
}

/// `tex` 过滤器：转义 LaTeX 特殊字符；null 渲染为空串
fn tex_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let raw = match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Ok(Value::String(escape_latex(&raw)))
}

pub fn escape_latex(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str(r"\textbackslash{}"),
            '^' => out.push_str(r"\textasciicircum{}"),
            '~' => out.push_str(r"\textasciitilde{}"),
            '{' | '}' | '$' | '&' | '#' | '%' | '_' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceEntry;
    use serde_json::json;

    fn renderer() -> Renderer {
        Renderer::new(LatexSyntax::default()).unwrap()
    }

    fn ctx() -> ReportContext {
        let mut buckets = Buckets::default();
        buckets.compliance.insert("tls".into(), vec![json!({"host": "a_b.example", "port": 443})]);
        buckets.compliance.insert("ssh".into(), vec![]);
        buckets.sources.push(SourceEntry { label: "a_b.example:443".into(), timestamp: "01.01.1970 00:00:00".into() });
        ReportContext { scan_ids: vec!["scan1".into()], timestamp: Some("01.01.1970".into()), buckets }
    }

    #[test]
    fn variable_inside_latex_braces() {
        let out = renderer().render("t", r"\textbf{\VAR{scan_ids | first}}", &ctx()).unwrap();
        assert_eq!(out, r"\textbf{scan1}");
    }

    #[test]
    fn latex_braces_and_hashes_survive() {
        let src = "\\newcommand{\\x}[1]{{#1}}\n{{literal}} {%x%}\n";
        let out = renderer().render("t", src, &ctx()).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn line_statements_with_trim_blocks() {
        let src = "begin\n%% for e in tls_compliance_events\n\\VAR{e.host}:\\VAR{e.port}\n%% endfor\nend\n";
        let out = renderer().render("t", src, &ctx()).unwrap();
        assert_eq!(out, "begin\na_b.example:443\nend\n");
    }

    #[test]
    fn inline_blocks_and_comments() {
        let src = "\\#{ dropped }\n\\BLOCK{ if ssh_compliance_events | length == 0 }\nnone\n\\BLOCK{ endif }\n";
        let out = renderer().render("t", src, &ctx()).unwrap();
        assert_eq!(out, "none\n");
    }

    #[test]
    fn line_comments_are_dropped() {
        let out = renderer().render("t", "a\n%# note to self\nb\n", &ctx()).unwrap();
        assert_eq!(out, "a\nb\n");
    }

    #[test]
    fn plain_latex_comments_are_kept() {
        let out = renderer().render("t", "% latex comment\n", &ctx()).unwrap();
        assert_eq!(out, "% latex comment\n");
    }

    #[test]
    fn without_trim_blocks_newlines_stay() {
        let syntax = LatexSyntax { trim_blocks: false, ..LatexSyntax::default() };
        let r = Renderer::new(syntax).unwrap();
        let out = r.render("t", "\\BLOCK{ if true }\nx\n\\BLOCK{ endif }\n", &ctx()).unwrap();
        assert_eq!(out, "\nx\n\n");
    }

    #[test]
    fn braces_inside_string_literals() {
        let out = renderer().render("t", r#"\VAR{ "}" ~ "{" }"#, &ctx()).unwrap();
        assert_eq!(out, "}{");
    }

    #[test]
    fn tex_filter_escapes_values() {
        let out = renderer().render("t", r"\VAR{ sources.0.label | tex }", &ctx()).unwrap();
        assert_eq!(out, r"a\_b.example:443");
        assert_eq!(escape_latex(r"50% & $x^2\ #1 {~}"), r"50\% \& \$x\textasciicircum{}2\textbackslash{} \#1 \{\textasciitilde{}\}");
    }

    #[test]
    fn per_protocol_and_map_bindings() {
        let out = renderer().render("t", r"\VAR{ compliance.tls | length }/\VAR{ tls_compliance_events | length }", &ctx()).unwrap();
        assert_eq!(out, "1/1");
    }

    #[test]
    fn unclosed_tag_is_an_error() {
        let err = renderer().render("t", "ok\n\\VAR{ scan_ids\n", &ctx()).unwrap_err();
        assert!(matches!(err, ReportError::Template(msg) if msg.contains("line 2")));
    }

    #[test]
    fn undefined_variable_is_an_error() {
        let err = renderer().render("t", r"\VAR{ nope }", &ctx()).unwrap_err();
        assert!(matches!(err, ReportError::Template(_)));
    }

    #[test]
    fn empty_delimiters_are_rejected() {
        let syntax = LatexSyntax { variable_end: String::new(), ..LatexSyntax::default() };
        assert!(Renderer::new(syntax).is_err());
    }

    #[test]
    fn custom_delimiters() {
        let syntax = LatexSyntax {
            variable_start: "<<".into(),
            variable_end: ">>".into(),
            ..LatexSyntax::default()
        };
        let out = Renderer::new(syntax).unwrap().render("t", "{<<timestamp>>}", &ctx()).unwrap();
        assert_eq!(out, "{01.01.1970}");
    }
}
