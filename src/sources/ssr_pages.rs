//! ssr-pages：服务端渲染站点，数据以转义 JSON 的形式内联在 HTML 里。
//!
//! 列表页一次给出全部作品（客户端自行过滤/排序），详情页一次给出全部章节，
//! 因此只有第 1 页有效。正文优先取内联 JSON 的 `body`，其次是 DOM 正文容器，
//! 最后是内联 JSON 的 `content` 纯文本。

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{
    ListingOptions, SourcePlugin, fetch_body, normalize_path, split_chapter_path,
    with_author_note,
};
use crate::base_system::context::Config;
use crate::base_system::json_extract::tags_from_value;
use crate::catalog::builder::{CatalogBuilder, RawChapter, RawNovel, join_url};
use crate::catalog::filters::{FilterSet, ResolvedFilters};
use crate::catalog::html_text::{looks_like_html, paragraphs_to_html};
use crate::catalog::models::{
    CONTENT_NOT_FOUND, Chapter, ChapterPage, NovelDetail, NovelItem, NovelStatus,
};
use crate::decoder::{
    DEFAULT_WINDOW, EmbeddedRecord, ExtractionSchema, embedded_content_paragraphs, escaped_bool,
    escaped_number, escaped_string, readable_container_html, sanitize_fragment,
};
use crate::error::Result;
use crate::network_parser::{FetchRequest, Transport};
use crate::pagination::{ChapterFeed, FeedPage, PageCursor, PageStrategy, PaginationDriver};

/// `\"genres\":[...]`，捕获数组内部。
const GENRES_ARRAY: &str = r#"\\"genres\\":\s*\[(?P<value>[^\]]*)\]"#;

struct Schemas {
    series: ExtractionSchema,
    chapter: ExtractionSchema,
    body: ExtractionSchema,
    note: ExtractionSchema,
}

impl Schemas {
    fn build(window: usize) -> Result<Self> {
        let series_anchor = format!(
            r"{},\s*{},\s*{}",
            escaped_number("id", "id"),
            escaped_string("title", "title"),
            escaped_string("slug", "slug")
        );
        let series = ExtractionSchema::builder(series_anchor)
            .secondary_string("cover", "cover")
            .secondary_string("status", "status")
            .secondary_string("type", "type")
            .secondary_string("description", "description")
            .secondary_string("author", "author_name")
            .secondary_string("artist", "artist_name")
            .secondary_string("updated_at", "updated_at")
            .secondary_number("views", "views")
            .secondary_number("rating", "rating")
            .secondary("genres", GENRES_ARRAY)
            .window(window)
            .build()?;

        let chapter_anchor = format!(
            r"{},\s*{}",
            escaped_string("chapter_slug", "slug"),
            escaped_string("chapter_title", "title")
        );
        let chapter = ExtractionSchema::builder(chapter_anchor)
            .secondary_number("number", "chapter_number")
            .secondary_string("published_at", "published_at")
            .secondary("locked", escaped_bool("is_locked", "value"))
            .secondary("illustrated", escaped_bool("has_illustrations", "value"))
            .window(window)
            .build()?;

        let body = ExtractionSchema::builder(escaped_string("body", "body"))
            .window(window)
            .build()?;
        let note = ExtractionSchema::builder(escaped_string("author_note", "note"))
            .window(window)
            .build()?;

        Ok(Self {
            series,
            chapter,
            body,
            note,
        })
    }
}

/// 列表页里的一条作品记录，保留客户端过滤/排序需要的字段。
#[derive(Debug, Clone)]
struct SeriesEntry {
    item: NovelItem,
    status: NovelStatus,
    genres: Vec<String>,
    views: f64,
    updated_at: String,
}

pub struct SsrPages {
    transport: Arc<dyn Transport>,
    builder: CatalogBuilder,
    filters: FilterSet,
    schemas: Schemas,
}

impl SsrPages {
    pub const ID: &'static str = "ssr-pages";

    pub fn new(base_url: &str, transport: Arc<dyn Transport>) -> Result<Self> {
        Self::with_window(base_url, transport, DEFAULT_WINDOW)
    }

    pub fn with_window(base_url: &str, transport: Arc<dyn Transport>, window: usize) -> Result<Self> {
        Ok(Self {
            transport,
            builder: CatalogBuilder::new(base_url),
            filters: listing_filters(),
            schemas: Schemas::build(window)?,
        })
    }

    pub fn from_config(config: &Config, transport: Arc<dyn Transport>) -> Result<Self> {
        let mut source = Self::with_window(&config.ssr_pages_base, transport, config.embedded_window)?;
        source.builder = source.builder.with_default_cover(&config.default_cover);
        Ok(source)
    }

    fn url(&self, path: &str) -> String {
        join_url(self.builder.base_url(), path)
    }

    async fn page_html(&self, path: &str) -> Result<String> {
        let url = self.url(path);
        fetch_body(self.transport.as_ref(), FetchRequest::get(url.as_str())).await
    }

    /// 正文页按站内跳转的方式请求，带上作品页作为 Referer。
    async fn chapter_html(&self, slug: &str, chapter: &str) -> Result<String> {
        let request = FetchRequest::get(self.url(&format!("/series/{slug}/{chapter}")))
            .with_referer(self.url(&format!("/series/{slug}")));
        fetch_body(self.transport.as_ref(), request).await
    }

    /// 全量列表，按 slug 去重（同一作品可能在页面状态里出现多次）。
    async fn series_index(&self) -> Result<Vec<SeriesEntry>> {
        let html = self.page_html("/series").await?;
        let mut seen = HashSet::new();
        let entries: Vec<SeriesEntry> = self
            .schemas
            .series
            .extract(&html)
            .iter()
            .filter(|r| self.builder.is_visible(r.get_non_empty("type"), None))
            .filter_map(|r| {
                let slug = r.get_non_empty("slug")?.to_string();
                if !seen.insert(slug.clone()) {
                    return None;
                }
                Some(SeriesEntry {
                    item: self.builder.item(
                        r.get("title").unwrap_or(&slug),
                        &slug,
                        r.get_non_empty("cover"),
                    ),
                    status: r
                        .get("status")
                        .map(NovelStatus::from_upstream)
                        .unwrap_or_default(),
                    genres: genres_of(&r),
                    views: r.get_f64("views").unwrap_or(0.0),
                    updated_at: r.get("updated_at").unwrap_or_default().to_string(),
                })
            })
            .collect();
        debug!(target: "source", source = Self::ID, count = entries.len(), "全量列表解析完成");
        Ok(entries)
    }

    fn novel_from(&self, html: &str, slug: &str) -> Option<RawNovel> {
        let extraction = self.schemas.series.extract(html);
        let record = extraction
            .iter()
            .find(|r| r.get("slug") == Some(slug))
            .or_else(|| extraction.first())?;
        Some(RawNovel {
            path: slug.to_string(),
            name: record.get("title").unwrap_or_default().to_string(),
            cover: record.get_non_empty("cover").map(str::to_string),
            summary: record.get("description").map(str::to_string),
            author: record.get("author").map(str::to_string),
            artist: record.get_non_empty("artist").map(str::to_string),
            genres: genres_of(&record),
            status: record.get("status").map(str::to_string),
            rating: record.get_f64("rating"),
        })
    }

    /// 返回 `(章节, 原始记录条数)`；锁定章节会被过滤，但仍计入条数。
    fn chapters_from(&self, html: &str, slug: &str) -> (Vec<Chapter>, usize) {
        let records = self.schemas.chapter.extract(html);
        let chapters = records
            .iter()
            .enumerate()
            .filter_map(|(position, r)| {
                let chapter_slug = r.get_non_empty("slug")?;
                self.builder.chapter(RawChapter {
                    name: r.get("title").unwrap_or_default().to_string(),
                    path: format!("{slug}/{chapter_slug}"),
                    number: r.get_f64("number"),
                    position,
                    release_time: r.get("published_at").map(str::to_string),
                    locked: r.get_bool("locked").unwrap_or(false),
                    illustrated: r.get_bool("illustrated").unwrap_or(false),
                })
            })
            .collect();
        (chapters, records.iter().count())
    }

    fn chapter_body(&self, html: &str) -> Option<String> {
        if let Some(body) = self
            .schemas
            .body
            .extract(html)
            .iter()
            .find_map(|r| r.get_non_empty("body").map(str::to_string))
        {
            return Some(if looks_like_html(&body) {
                sanitize_fragment(&body)
            } else {
                paragraphs_to_html(&body)
            });
        }
        debug!(target: "source", source = Self::ID, "内联正文缺失，尝试 DOM 兜底");
        readable_container_html(html).or_else(|| embedded_content_paragraphs(html))
    }
}

/// `genres` 数组内部既可能是对象也可能是字符串，按 JSON 解析，失败时当作分隔字符串。
fn genres_of(record: &EmbeddedRecord) -> Vec<String> {
    let Some(inner) = record.get_non_empty("genres") else {
        return Vec::new();
    };
    match serde_json::from_str::<Value>(&format!("[{inner}]")) {
        Ok(value) => tags_from_value(&value),
        Err(_) => tags_from_value(&Value::String(inner.to_string())),
    }
}

fn listing_filters() -> FilterSet {
    FilterSet::new()
        .picker(
            "sort",
            "Sort by",
            &[("Popular", "views"), ("Latest", "updated"), ("Title", "title")],
            "views",
        )
        .picker(
            "status",
            "Status",
            &[
                ("All", ""),
                ("Ongoing", "ongoing"),
                ("Completed", "completed"),
                ("Hiatus", "hiatus"),
                ("Cancelled", "cancelled"),
            ],
            "",
        )
        .checkbox_group(
            "genres",
            "Genres",
            &[
                ("Action", "action"),
                ("Comedy", "comedy"),
                ("Drama", "drama"),
                ("Fantasy", "fantasy"),
                ("Romance", "romance"),
            ],
            &[],
        )
}

/// 客户端过滤 + 排序，替代服务端分页。
fn apply_listing(mut entries: Vec<SeriesEntry>, filters: &ResolvedFilters, latest: bool) -> Vec<NovelItem> {
    let status = filters.picker("status");
    if !status.is_empty() {
        let wanted = NovelStatus::from_upstream(status);
        entries.retain(|e| e.status == wanted);
    }
    let genres = filters.checkboxes("genres");
    if !genres.is_empty() {
        entries.retain(|e| {
            genres
                .iter()
                .all(|g| e.genres.iter().any(|have| have.eq_ignore_ascii_case(g)))
        });
    }

    let sort = if latest { "updated" } else { filters.picker("sort") };
    entries.sort_by(|a, b| match sort {
        "updated" => b.updated_at.cmp(&a.updated_at),
        "title" => a.item.name.to_lowercase().cmp(&b.item.name.to_lowercase()),
        _ => b.views.total_cmp(&a.views),
    });
    entries.into_iter().map(|e| e.item).collect()
}

/// 详情页上的章节表；`prefetched` 为详情请求已经拿到的页面。
struct SeriesChapters<'a> {
    source: &'a SsrPages,
    slug: &'a str,
    prefetched: Option<&'a str>,
}

#[async_trait]
impl ChapterFeed for SeriesChapters<'_> {
    async fn fetch(&self, _cursor: PageCursor) -> Result<FeedPage> {
        let (chapters, fetched) = match self.prefetched {
            Some(html) => self.source.chapters_from(html, self.slug),
            None => {
                let html = self.source.page_html(&format!("/series/{}", self.slug)).await?;
                self.source.chapters_from(&html, self.slug)
            }
        };
        Ok(FeedPage {
            chapters,
            fetched,
            ..Default::default()
        })
    }
}

#[async_trait]
impl SourcePlugin for SsrPages {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn name(&self) -> &'static str {
        "SSR Pages"
    }

    fn site(&self) -> &str {
        self.builder.base_url()
    }

    fn filters(&self) -> &FilterSet {
        &self.filters
    }

    async fn popular_novels(&self, page: u32, options: &ListingOptions) -> Result<Vec<NovelItem>> {
        if page > 1 {
            return Ok(Vec::new());
        }
        let filters = self.filters.resolve(&options.filters);
        let entries = self.series_index().await?;
        Ok(apply_listing(entries, &filters, options.show_latest))
    }

    async fn search_novels(&self, term: &str, page: u32) -> Result<Vec<NovelItem>> {
        if page > 1 {
            debug!(target: "source", source = Self::ID, page, "搜索不分页，跳过请求");
            return Ok(Vec::new());
        }
        let needle = term.trim().to_lowercase();
        Ok(self
            .series_index()
            .await?
            .into_iter()
            .map(|e| e.item)
            .filter(|item| item.name.to_lowercase().contains(&needle))
            .collect())
    }

    async fn parse_novel(&self, path: &str) -> Result<NovelDetail> {
        let slug = normalize_path(path)?;
        let html = self.page_html(&format!("/series/{slug}")).await?;
        let raw = self.novel_from(&html, slug).unwrap_or_else(|| {
            warn!(target: "source", source = Self::ID, slug, "详情页没有内联作品数据");
            RawNovel {
                path: slug.to_string(),
                name: slug.to_string(),
                ..Default::default()
            }
        });
        let novel = self.builder.novel(raw);

        let feed = SeriesChapters {
            source: self,
            slug,
            prefetched: Some(html.as_str()),
        };
        let batch = PaginationDriver::new(&feed, PageStrategy::SinglePage)
            .labelled(slug)
            .first_batch()
            .await?;
        info!(
            target: "source",
            source = Self::ID,
            slug,
            chapters = batch.chapters.len(),
            "详情解析完成"
        );
        Ok(NovelDetail {
            novel,
            chapters: batch.chapters,
            total_pages: None,
        })
    }

    async fn parse_page(&self, path: &str, page: u32) -> Result<ChapterPage> {
        let slug = normalize_path(path)?;
        let feed = SeriesChapters {
            source: self,
            slug,
            prefetched: None,
        };
        let chapters = PaginationDriver::new(&feed, PageStrategy::SinglePage)
            .labelled(slug)
            .page(page)
            .await?;
        Ok(ChapterPage {
            page: page.max(1),
            chapters,
        })
    }

    async fn parse_chapter(&self, chapter_path: &str) -> Result<String> {
        let (slug, chapter) = split_chapter_path(chapter_path)?;
        let html = self.chapter_html(slug, chapter).await?;
        let Some(body) = self.chapter_body(&html) else {
            warn!(target: "source", source = Self::ID, chapter_path, "找不到正文");
            return Ok(CONTENT_NOT_FOUND.to_string());
        };
        let note = self
            .schemas
            .note
            .extract(&html)
            .first()
            .and_then(|r| r.get_non_empty("note").map(str::to_string));
        Ok(with_author_note(body, note.as_deref()))
    }
}
