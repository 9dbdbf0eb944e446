//! 正文兜底：嵌入式 JSON 里找不到正文时，退回到渲染后的 DOM。
//!
//! 1. 按候选选择器定位正文容器，剔除导航/脚本/样式子树，输出净化后的内部 HTML；
//! 2. 仍然没有时，再从嵌入式 JSON 的 `content` 字段取纯文本，按空行重建段落。
//!
//! 上游直接给出的 HTML 正文也走同一套净化规则（[`sanitize_fragment`]）。

use std::sync::OnceLock;

use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::embedded::escaped_string;
use super::unescape::unescape_layered;
use crate::catalog::html_text::{escape_html, paragraphs_to_html};

const CONTAINER_SELECTORS: &[&str] = &[
    "#chapter-content",
    ".chapter-content",
    "#chr-content",
    ".reading-content",
    ".chapter__content",
    ".entry-content",
    "article",
    "main",
];

const DROPPED_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "form", "iframe", "noscript", "button", "svg",
    "template",
];

const DROPPED_CLASSES: &[&str] = &[
    "nav",
    "navigation",
    "chapter-nav",
    "chapter-navigation",
    "ads",
    "advertisement",
    "comments",
];

const VOID_TAGS: &[&str] = &["br", "hr", "img", "wbr"];

fn container_selectors() -> &'static [Selector] {
    static S: OnceLock<Vec<Selector>> = OnceLock::new();
    S.get_or_init(|| {
        CONTAINER_SELECTORS
            .iter()
            .filter_map(|s| Selector::parse(s).ok())
            .collect()
    })
}

fn re_content_field() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(&escaped_string("content", "content")).unwrap())
}

/// 在 DOM 中寻找第一个带文字的正文容器，返回净化后的内部 HTML。
pub fn readable_container_html(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    for selector in container_selectors() {
        for element in document.select(selector) {
            let mut out = String::new();
            write_children(element, &mut out);
            let cleaned = out.trim();
            if has_visible_text(cleaned) {
                debug!(target: "decoder", container = ?selector, "DOM 兜底命中正文容器");
                return Some(cleaned.to_string());
            }
        }
    }
    None
}

/// 从嵌入式 JSON 中取 `content` 字段并按空行重建段落。
pub fn embedded_content_paragraphs(html: &str) -> Option<String> {
    re_content_field()
        .captures_iter(html)
        .filter_map(|c| c.name("content").map(|m| unescape_layered(m.as_str()).into_owned()))
        .map(|text| paragraphs_to_html(&text))
        .find(|html| !html.is_empty())
}

/// 净化一段上游 HTML 正文：去掉脚本、导航等子树以及事件属性，文本重新转义。
pub fn sanitize_fragment(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::new();
    write_children(fragment.root_element(), &mut out);
    out.trim().to_string()
}

fn has_visible_text(fragment: &str) -> bool {
    let mut in_tag = false;
    for ch in fragment.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag && !c.is_whitespace() => return true,
            _ => {}
        }
    }
    // 纯插图章节同样算有内容
    fragment.contains("<img")
}

fn write_children(parent: ElementRef<'_>, out: &mut String) {
    for child in parent.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&escape_html(text)),
            Node::Element(el) => {
                let name = el.name();
                if DROPPED_TAGS.contains(&name)
                    || el.classes().any(|c| DROPPED_CLASSES.contains(&c))
                {
                    continue;
                }
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };

                out.push('<');
                out.push_str(name);
                for (key, value) in el.attrs() {
                    if key.starts_with("on") || value.trim_start().starts_with("javascript:") {
                        continue;
                    }
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    out.push_str(&escape_html(value));
                    out.push('"');
                }
                if VOID_TAGS.contains(&name) {
                    out.push_str("/>");
                    continue;
                }
                out.push('>');
                write_children(child_el, out);
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
            _ => {}
        }
    }
}
