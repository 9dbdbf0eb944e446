//! 来源插件：每个站点一个实现，统一暴露列表/搜索、详情、章节页、正文四类操作。

use async_trait::async_trait;

use crate::catalog::filters::{FilterSet, FilterValues};
use crate::catalog::models::{ChapterPage, NovelDetail, NovelItem};
use crate::decoder::parse_json_body;
use crate::error::{Result, SourceError};
use crate::network_parser::{FetchRequest, Transport};

pub mod cache;
pub mod catalog_feed;
pub mod registry;
pub mod serial_api;
pub mod ssr_pages;

pub use cache::IdentifierCache;
pub use catalog_feed::CatalogFeed;
pub use registry::SourceRegistry;
pub use serial_api::SerialApi;
pub use ssr_pages::SsrPages;

/// 作者附言与正文之间的分隔。
pub const AUTHOR_NOTE_SEPARATOR: &str = "<hr/>";

#[derive(Debug, Clone, Default)]
pub struct ListingOptions {
    /// `true` 按最新更新排序，否则按热门。
    pub show_latest: bool,
    pub filters: FilterValues,
}

#[async_trait]
pub trait SourcePlugin: Send + Sync {
    fn id(&self) -> &'static str;
    fn name(&self) -> &'static str;
    fn site(&self) -> &str;
    fn filters(&self) -> &FilterSet;

    async fn popular_novels(&self, page: u32, options: &ListingOptions) -> Result<Vec<NovelItem>>;
    async fn search_novels(&self, term: &str, page: u32) -> Result<Vec<NovelItem>>;
    /// 元数据 + 首批（或全部）章节。
    async fn parse_novel(&self, path: &str) -> Result<NovelDetail>;
    async fn parse_page(&self, path: &str, page: u32) -> Result<ChapterPage>;
    /// 章节正文 HTML；找不到正文时返回占位文本而不是错误。
    async fn parse_chapter(&self, chapter_path: &str) -> Result<String>;

    /// 丢弃会话级缓存（如果有）。
    fn reset_session(&self) {}
}

async fn fetch_body(transport: &dyn Transport, request: FetchRequest) -> Result<String> {
    Ok(transport.fetch(request).await?.body)
}

async fn fetch_json(transport: &dyn Transport, url: String) -> Result<serde_json::Value> {
    let body = fetch_body(transport, FetchRequest::get_json(url.as_str())).await?;
    parse_json_body(&body, &url)
}

/// `novel/chapter` 形式的章节路径。
fn split_chapter_path(path: &str) -> Result<(&str, &str)> {
    path.trim_matches('/')
        .rsplit_once('/')
        .filter(|(novel, chapter)| !novel.is_empty() && !chapter.is_empty())
        .ok_or_else(|| SourceError::InvalidPath(path.to_string()))
}

fn normalize_path(path: &str) -> Result<&str> {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Err(SourceError::InvalidPath(path.to_string()));
    }
    Ok(trimmed)
}

/// 正文后追加作者附言。
fn with_author_note(body: String, note: Option<&str>) -> String {
    match note.map(str::trim).filter(|n| !n.is_empty()) {
        Some(note) => format!("{body}\n{AUTHOR_NOTE_SEPARATOR}\n{note}"),
        None => body,
    }
}
