//! HTML/纯文本转换工具。
//!
//! 简介、作者、标签等字段经常带着 HTML 片段或实体，这里统一剥离成纯文本；
//! 反过来也负责把纯文本段落拼回 `<p>` 片段。

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

fn re_block_break() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| {
        Regex::new(r"(?i)<br\s*/?>|</p\s*>|</div\s*>|</h[1-6]\s*>|</li\s*>").unwrap()
    })
}

fn re_all_tags() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"(?is)<[^>]+>").unwrap())
}

fn re_blank_lines() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"\n[ \t]*\n").unwrap())
}

// ── 实体解码 ────────────────────────────────────────────────────

pub fn unescape_basic_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }

    Cow::Owned(
        s.replace("&nbsp;", " ")
            .replace("&#160;", " ")
            .replace("&quot;", "\"")
            .replace("&#34;", "\"")
            .replace("&#x22;", "\"")
            .replace("&#39;", "'")
            .replace("&#x27;", "'")
            .replace("&apos;", "'")
            .replace("&rsquo;", "\u{2019}")
            .replace("&lsquo;", "\u{2018}")
            .replace("&hellip;", "\u{2026}")
            .replace("&mdash;", "\u{2014}")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&amp;", "&"),
    )
}

// ── HTML 转义 ───────────────────────────────────────────────────

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

// ── HTML 检测 ───────────────────────────────────────────────────

pub fn looks_like_html(s: &str) -> bool {
    let t = s.trim();
    if t.is_empty() {
        return false;
    }

    let lower = t.to_ascii_lowercase();
    lower.contains("<p")
        || lower.contains("</p")
        || lower.contains("<br")
        || lower.contains("<div")
        || lower.contains("<span")
        || lower.contains("<a ")
        || lower.contains("<img")
        || lower.contains("<em")
        || lower.contains("<strong")
}

// ── script/style 移除 ──────────────────────────────────────────

fn strip_script_and_style_blocks(html: &str) -> String {
    fn remove_tag_block(input: &str, tag: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let lower = input.to_ascii_lowercase();
        let open_pat = format!("<{}", tag);
        let close_pat = format!("</{}>", tag);

        let mut i = 0;
        while i < input.len() {
            if lower[i..].starts_with(&open_pat) {
                if let Some(close_pos) = lower[i..].find(&close_pat) {
                    i += close_pos + close_pat.len();
                    continue;
                } else {
                    break;
                }
            }

            let Some(ch) = input[i..].chars().next() else {
                break;
            };
            out.push(ch);
            i += ch.len_utf8();
        }

        out
    }

    let without_script = remove_tag_block(html, "script");
    remove_tag_block(&without_script, "style")
}

// ── 纯文本 ──────────────────────────────────────────────────────

/// 剥离 HTML，保留段落换行；每行内部空白折叠成一个空格。
pub fn html_to_plain_text(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    let text = if looks_like_html(raw) || raw.contains("</") {
        let cleaned = strip_script_and_style_blocks(raw);
        let with_breaks = re_block_break().replace_all(&cleaned, "\n");
        re_all_tags().replace_all(&with_breaks, "").into_owned()
    } else {
        raw.to_string()
    };
    let text = unescape_basic_entities(&text);

    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines: Vec<String> = Vec::new();
    for line in normalized.split('\n') {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            // 连续空行只保留一个段落分隔
            if lines.last().is_some_and(|l| !l.is_empty()) {
                lines.push(String::new());
            }
            continue;
        }
        lines.push(collapsed);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

/// 单行字段（作者、标签），所有空白折叠。
pub fn html_to_inline_text(raw: &str) -> String {
    html_to_plain_text(raw)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ── 段落重建 ────────────────────────────────────────────────────

/// 按空行切段落，包成 `<p>`；段内单个换行转 `<br/>`。
/// 已经是 HTML 的段落原样保留。
pub fn paragraphs_to_html(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = Vec::new();
    for block in re_blank_lines().split(normalized.trim()) {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }
        if looks_like_html(block) {
            out.push(block.to_string());
            continue;
        }
        let lines: Vec<String> = block.lines().map(|l| escape_html(l.trim())).collect();
        out.push(format!("<p>{}</p>", lines.join("<br/>")));
    }
    out.join("\n")
}
