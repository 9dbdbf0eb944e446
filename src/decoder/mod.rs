//! 响应正文解码：直接 JSON、嵌入式 JSON、DOM 兜底。

pub mod direct;
pub mod embedded;
pub mod html_fallback;
pub mod unescape;

pub use direct::{parse_json_as, parse_json_body};
pub use embedded::{
    DEFAULT_WINDOW, EmbeddedRecord, ExtractionSchema, escaped_bool, escaped_number,
    escaped_string,
};
pub use html_fallback::{embedded_content_paragraphs, readable_container_html, sanitize_fragment};
pub use unescape::{escape_layered, unescape_layered};
