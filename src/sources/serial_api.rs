//! serial-api：纯 JSON 接口，章节按页计数。
//!
//! 章节接口只认数字 id，而小说路径是 slug，所以详情请求会把
//! `slug → id` 写进会话缓存；章节页和正文请求先查缓存，未命中时重新走一次详情。

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{
    IdentifierCache, ListingOptions, SourcePlugin, fetch_body, fetch_json, normalize_path,
    split_chapter_path, with_author_note,
};
use crate::base_system::context::Config;
use crate::base_system::json_extract::{
    JsonMap, collect_maps, pick_array, pick_bool, pick_cover, pick_f64, pick_from, pick_string,
};
use crate::catalog::builder::{CatalogBuilder, RawChapter, RawNovel, join_url};
use crate::catalog::filters::FilterSet;
use crate::catalog::html_text::{looks_like_html, paragraphs_to_html};
use crate::catalog::models::{CONTENT_NOT_FOUND, ChapterPage, Novel, NovelDetail, NovelItem};
use crate::decoder::{parse_json_as, parse_json_body, sanitize_fragment};
use crate::error::{Result, SourceError};
use crate::network_parser::{FetchRequest, Transport};
use crate::pagination::{ChapterFeed, FeedPage, PageCursor, PageStrategy, PaginationDriver};

pub struct SerialApi {
    transport: Arc<dyn Transport>,
    builder: CatalogBuilder,
    filters: FilterSet,
    cache: IdentifierCache,
    eager_pages: bool,
}

impl SerialApi {
    pub const ID: &'static str = "serial-api";

    pub fn new(base_url: &str, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            builder: CatalogBuilder::new(base_url).allow_locked(true),
            filters: listing_filters(),
            cache: IdentifierCache::new(),
            eager_pages: false,
        }
    }

    pub fn from_config(config: &Config, transport: Arc<dyn Transport>) -> Self {
        let mut source = Self::new(&config.serial_api_base, transport);
        source.builder = source.builder.with_default_cover(&config.default_cover);
        source.eager_pages = config.eager_chapter_pages;
        source
    }

    /// 详情里一次拉完全部章节页。
    pub fn eager_pages(mut self, eager: bool) -> Self {
        self.eager_pages = eager;
        self
    }

    pub fn cache(&self) -> &IdentifierCache {
        &self.cache
    }

    fn url(&self, path: &str) -> String {
        join_url(self.builder.base_url(), path)
    }

    /// 详情请求：返回元数据和上游 id，并写入缓存。
    async fn fetch_detail(&self, slug: &str) -> Result<(Novel, Option<String>)> {
        let url = self.url(&format!("/api/novels/{slug}"));
        // 详情决定缓存内容，要求绕过中间缓存
        let body = fetch_body(
            self.transport.as_ref(),
            FetchRequest::get_json(url.as_str()).fresh(),
        )
        .await?;
        let raw = parse_json_body(&body, &url)?;

        let maps = collect_maps(&raw);
        let id = pick_from(&maps, |m| pick_string(m, &["id", "novel_id"]));
        match &id {
            Some(id) => {
                debug!(target: "source", source = Self::ID, slug, id = %id, "缓存小说 id");
                self.cache.insert(slug, id.clone());
            }
            None => warn!(target: "source", source = Self::ID, slug, "详情缺少 id"),
        }
        Ok((self.builder.novel(RawNovel::from_json(&raw, slug)), id))
    }

    /// 缓存优先；冷缓存时透明地走一次详情请求。
    async fn novel_id(&self, slug: &str) -> Result<String> {
        if let Some(id) = self.cache.get(slug) {
            return Ok(id);
        }
        debug!(target: "source", source = Self::ID, slug, "缓存未命中，重新解析详情");
        self.fetch_detail(slug)
            .await?
            .1
            .ok_or_else(|| SourceError::InvalidPath(slug.to_string()))
    }

    fn strategy(&self) -> PageStrategy {
        PageStrategy::Counted {
            eager: self.eager_pages,
        }
    }

    fn listing_items(&self, raw: &Value) -> Vec<NovelItem> {
        let Some(records) = pick_array(raw, &["data", "novels", "items"]) else {
            return Vec::new();
        };
        records
            .iter()
            .filter_map(Value::as_object)
            .filter(|m| {
                self.builder.is_visible(
                    pick_string(m, &["type", "kind"]).as_deref(),
                    pick_bool(m, &["free", "is_free"]),
                )
            })
            .filter_map(|m| {
                let path = pick_string(m, &["slug", "id"])?;
                let name = pick_string(m, &["title", "name"]).unwrap_or_else(|| path.clone());
                Some(self.builder.item(&name, &path, pick_cover(m).as_deref()))
            })
            .collect()
    }
}

fn listing_filters() -> FilterSet {
    FilterSet::new()
        .picker(
            "order",
            "Order by",
            &[
                ("Popular", "popular"),
                ("Rating", "rating"),
                ("Chapters", "chapters"),
                ("Newest", "new"),
            ],
            "popular",
        )
        .picker(
            "status",
            "Status",
            &[
                ("All", ""),
                ("Ongoing", "ongoing"),
                ("Completed", "completed"),
                ("Hiatus", "hiatus"),
            ],
            "",
        )
        .checkbox_group(
            "genres",
            "Genres",
            &[
                ("Action", "action"),
                ("Adventure", "adventure"),
                ("Comedy", "comedy"),
                ("Drama", "drama"),
                ("Fantasy", "fantasy"),
                ("Romance", "romance"),
                ("Sci-fi", "sci-fi"),
            ],
            &[],
        )
        .switch("mature", "Include mature", false)
}

/// 章节列表接口的响应；分页信息可能在 `meta` 里，也可能在顶层。
#[derive(Debug, Default, Deserialize)]
struct ChapterListing {
    #[serde(default, alias = "chapters")]
    data: Vec<Value>,
    #[serde(default)]
    meta: Option<PageMeta>,
    #[serde(default, alias = "total_pages")]
    last_page: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PageMeta {
    #[serde(default, alias = "total_pages", alias = "pages")]
    last_page: Option<u64>,
    #[serde(default)]
    per_page: Option<u64>,
    /// 本页第一条记录的全局序号（从 1 开始）。
    #[serde(default)]
    from: Option<u64>,
}

/// 某本书的章节列表接口。
///
/// 章节没有编号时按全局位置兜底，所以需要知道本页之前有多少条记录：
/// 优先用 `meta.from`，其次 `meta.per_page`，再其次第一页的条数。
struct ChapterList<'a> {
    source: &'a SerialApi,
    novel_id: &'a str,
    slug: &'a str,
    first_page_len: AtomicUsize,
}

impl<'a> ChapterList<'a> {
    fn new(source: &'a SerialApi, novel_id: &'a str, slug: &'a str) -> Self {
        Self {
            source,
            novel_id,
            slug,
            first_page_len: AtomicUsize::new(0),
        }
    }

    fn page_offset(&self, page: u32, meta: Option<&PageMeta>, records: usize) -> usize {
        if let Some(from) = meta.and_then(|m| m.from) {
            return from.saturating_sub(1) as usize;
        }
        if page <= 1 {
            return 0;
        }
        let per_page = match meta.and_then(|m| m.per_page) {
            Some(n) if n > 0 => n as usize,
            _ => match self.first_page_len.load(Ordering::Relaxed) {
                0 => records,
                n => n,
            },
        };
        (page as usize - 1) * per_page
    }
}

#[async_trait]
impl ChapterFeed for ChapterList<'_> {
    async fn fetch(&self, cursor: PageCursor) -> Result<FeedPage> {
        let page = match cursor {
            PageCursor::Page(n) => n.max(1),
            PageCursor::Offset { .. } | PageCursor::Full => 1,
        };
        let url = self.source.builder.listing_url(
            &format!("/api/novels/{}/chapters", self.novel_id),
            &[("page", page.to_string())],
        );
        let body = fetch_body(
            self.source.transport.as_ref(),
            FetchRequest::get_json(url.as_str()),
        )
        .await?;
        let listing: ChapterListing = parse_json_as(&body, &url)?;

        let meta = listing.meta.as_ref();
        let total_pages = meta
            .and_then(|m| m.last_page)
            .or(listing.last_page)
            .map(|n| n.min(u32::MAX as u64) as u32);

        let records: Vec<&JsonMap> = listing.data.iter().filter_map(Value::as_object).collect();
        if page == 1 {
            self.first_page_len.store(records.len(), Ordering::Relaxed);
        }
        let offset = self.page_offset(page, meta, records.len());

        let chapters = records
            .iter()
            .enumerate()
            .filter_map(|(idx, m)| {
                let key = pick_string(m, &["slug", "id"])?;
                self.source.builder.chapter(RawChapter {
                    name: pick_string(m, &["title", "name"]).unwrap_or_default(),
                    path: format!("{}/{}", self.slug, key),
                    number: pick_f64(m, &["number", "chapter_number", "order"]),
                    position: offset + idx,
                    release_time: pick_string(m, &["published_at", "created_at"]),
                    locked: pick_bool(m, &["locked", "is_locked"]).unwrap_or(false)
                        || pick_bool(m, &["free", "is_free"]) == Some(false),
                    illustrated: pick_bool(m, &["has_images", "illustrated"]).unwrap_or(false),
                })
            })
            .collect();

        Ok(FeedPage {
            fetched: records.len(),
            chapters,
            total_pages,
            total_count: None,
        })
    }
}

#[async_trait]
impl SourcePlugin for SerialApi {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn name(&self) -> &'static str {
        "Serial API"
    }

    fn site(&self) -> &str {
        self.builder.base_url()
    }

    fn filters(&self) -> &FilterSet {
        &self.filters
    }

    async fn popular_novels(&self, page: u32, options: &ListingOptions) -> Result<Vec<NovelItem>> {
        let filters = self.filters.resolve(&options.filters);
        let order = if options.show_latest {
            "latest"
        } else {
            filters.picker("order")
        };
        let params = [
            ("page", page.max(1).to_string()),
            ("sort", order.to_string()),
            ("status", filters.picker("status").to_string()),
            ("genres", filters.checkboxes("genres").join(",")),
            (
                "mature",
                String::from(if filters.switch("mature") { "1" } else { "" }),
            ),
        ];
        let url = self.builder.listing_url("/api/novels", &params);
        let raw = fetch_json(self.transport.as_ref(), url).await?;
        Ok(self.listing_items(&raw))
    }

    async fn search_novels(&self, term: &str, page: u32) -> Result<Vec<NovelItem>> {
        let url = self.builder.listing_url(
            "/api/novels/search",
            &[("q", term.trim().to_string()), ("page", page.max(1).to_string())],
        );
        let raw = fetch_json(self.transport.as_ref(), url).await?;
        Ok(self.listing_items(&raw))
    }

    async fn parse_novel(&self, path: &str) -> Result<NovelDetail> {
        let slug = normalize_path(path)?;
        let (novel, id) = self.fetch_detail(slug).await?;
        let Some(id) = id else {
            return Ok(NovelDetail {
                novel,
                chapters: Vec::new(),
                total_pages: None,
            });
        };

        let feed = ChapterList::new(self, &id, slug);
        let batch = PaginationDriver::new(&feed, self.strategy())
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
            total_pages: batch.total_pages,
        })
    }

    async fn parse_page(&self, path: &str, page: u32) -> Result<ChapterPage> {
        let slug = normalize_path(path)?;
        let id = self.novel_id(slug).await?;
        let feed = ChapterList::new(self, &id, slug);
        let chapters = PaginationDriver::new(&feed, self.strategy())
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
        let id = self.novel_id(slug).await?;
        let url = self.url(&format!("/api/novels/{id}/chapters/{chapter}"));
        let raw = fetch_json(self.transport.as_ref(), url).await?;

        let maps = collect_maps(&raw);
        let Some(content) = pick_from(&maps, |m| pick_string(m, &["content", "body", "text"]))
        else {
            warn!(target: "source", source = Self::ID, chapter_path, "正文缺失");
            return Ok(CONTENT_NOT_FOUND.to_string());
        };
        let body = if looks_like_html(&content) {
            sanitize_fragment(&content)
        } else {
            paragraphs_to_html(&content)
        };
        let note = pick_from(&maps, |m| {
            pick_string(m, &["author_note", "authors_note", "note"])
        });
        Ok(with_author_note(body, note.as_deref()))
    }

    fn reset_session(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::filters::{FilterValue, FilterValues};
    use crate::network_parser::fixture::FixtureTransport;

    const BASE: &str = "https://api.serial.test";

    fn detail_json() -> &'static str {
        r#"{"data":{"id":7,"slug":"sword-saint","title":"Sword Saint",
            "synopsis":"<p>A tale.</p>","author":"Lin","genres":["Action","Drama"],
            "status":"HIATUS","cover":"/covers/7.jpg","rating":4.5}}"#
    }

    fn chapters_json(page: u32) -> String {
        let first = (page - 1) * 2 + 1;
        format!(
            r#"{{"data":[
                {{"id":{first},"slug":"ch-{first}","title":"Chapter {first}","number":{first},"locked":false}},
                {{"id":{second},"slug":"ch-{second}","title":"Chapter {second}","number":{second},"locked":true,"has_images":true}}
            ],"meta":{{"current_page":{page},"last_page":3}}}}"#,
            second = first + 1
        )
    }

    fn source(transport: Arc<FixtureTransport>) -> SerialApi {
        SerialApi::new(BASE, transport)
    }

    #[tokio::test]
    async fn detail_returns_first_page_and_total() {
        let transport = Arc::new(
            FixtureTransport::new()
                .with(&format!("{BASE}/api/novels/sword-saint"), detail_json())
                .with(&format!("{BASE}/api/novels/7/chapters?page=1"), chapters_json(1)),
        );
        let src = source(transport.clone());
        let detail = src.parse_novel("sword-saint").await.unwrap();

        assert_eq!(detail.novel.name, "Sword Saint");
        assert_eq!(detail.novel.summary, "A tale.");
        assert_eq!(detail.novel.cover, format!("{BASE}/covers/7.jpg"));
        assert_eq!(detail.total_pages, Some(3));
        assert_eq!(detail.chapters.len(), 2);
        assert_eq!(detail.chapters[0].path, "sword-saint/ch-1");
        assert_eq!(detail.chapters[1].name, "🔒 Chapter 2 🖼");
        assert_eq!(src.cache().get("sword-saint").as_deref(), Some("7"));
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn cold_cache_resolves_through_detail() {
        let detail_url = format!("{BASE}/api/novels/sword-saint");
        let page_url = format!("{BASE}/api/novels/7/chapters?page=2");
        let transport = Arc::new(
            FixtureTransport::new()
                .with(&detail_url, detail_json())
                .with(&page_url, chapters_json(2)),
        );
        let src = source(transport.clone());

        let page = src.parse_page("sword-saint", 2).await.unwrap();
        assert_eq!(page.page, 2);
        assert_eq!(page.chapters[0].chapter_number, 3.0);
        assert_eq!(transport.calls(), vec![detail_url.clone(), page_url.clone()]);

        // 缓存已热，不再请求详情
        src.parse_page("sword-saint", 2).await.unwrap();
        assert_eq!(transport.calls().len(), 3);
        assert_eq!(transport.calls()[2], page_url);

        src.reset_session();
        assert!(src.cache().is_empty());
    }

    #[tokio::test]
    async fn eager_detail_fetches_every_page() {
        let transport = Arc::new(
            FixtureTransport::new()
                .with(&format!("{BASE}/api/novels/sword-saint"), detail_json())
                .with(&format!("{BASE}/api/novels/7/chapters?page=1"), chapters_json(1))
                .with(&format!("{BASE}/api/novels/7/chapters?page=2"), chapters_json(2))
                .with(&format!("{BASE}/api/novels/7/chapters?page=3"), chapters_json(3)),
        );
        let src = source(transport).eager_pages(true);
        let detail = src.parse_novel("/sword-saint/").await.unwrap();
        assert_eq!(detail.total_pages, None);
        let numbers: Vec<_> = detail.chapters.iter().map(|c| c.chapter_number).collect();
        assert_eq!(numbers, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    fn unnumbered(slugs: &[&str], meta: &str) -> String {
        let items: Vec<String> = slugs
            .iter()
            .map(|s| format!(r#"{{"slug":"{s}","title":"Untitled"}}"#))
            .collect();
        format!(r#"{{"data":[{}],"meta":{meta}}}"#, items.join(","))
    }

    #[tokio::test]
    async fn unnumbered_chapters_keep_their_place_across_pages() {
        let transport = Arc::new(
            FixtureTransport::new()
                .with(&format!("{BASE}/api/novels/sword-saint"), detail_json())
                .with(
                    &format!("{BASE}/api/novels/7/chapters?page=1"),
                    unnumbered(&["c1", "c2"], r#"{"last_page":2}"#),
                )
                .with(
                    &format!("{BASE}/api/novels/7/chapters?page=2"),
                    unnumbered(&["c3", "c4"], r#"{"last_page":2}"#),
                ),
        );
        let src = source(transport).eager_pages(true);
        let detail = src.parse_novel("sword-saint").await.unwrap();
        let paths: Vec<_> = detail.chapters.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(
            paths,
            ["sword-saint/c1", "sword-saint/c2", "sword-saint/c3", "sword-saint/c4"]
        );
        let numbers: Vec<_> = detail.chapters.iter().map(|c| c.chapter_number).collect();
        assert_eq!(numbers, [1.0, 2.0, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn short_last_page_of_unnumbered_chapters() {
        let transport = Arc::new(
            FixtureTransport::new()
                .with(&format!("{BASE}/api/novels/sword-saint"), detail_json())
                .with(
                    &format!("{BASE}/api/novels/7/chapters?page=1"),
                    unnumbered(&["c1", "c2"], r#"{"last_page":2}"#),
                )
                .with(
                    &format!("{BASE}/api/novels/7/chapters?page=2"),
                    unnumbered(&["c3"], r#"{"last_page":2}"#),
                ),
        );
        let src = source(transport).eager_pages(true);
        let detail = src.parse_novel("sword-saint").await.unwrap();
        let numbers: Vec<_> = detail.chapters.iter().map(|c| c.chapter_number).collect();
        assert_eq!(numbers, [1.0, 2.0, 3.0]);
        assert_eq!(detail.chapters[2].name, "Untitled");
    }

    #[tokio::test]
    async fn single_page_uses_meta_offset_for_unnumbered_chapters() {
        let transport = Arc::new(
            FixtureTransport::new()
                .with(&format!("{BASE}/api/novels/sword-saint"), detail_json())
                .with(
                    &format!("{BASE}/api/novels/7/chapters?page=2"),
                    unnumbered(&["c11", "c12"], r#"{"last_page":3,"from":11}"#),
                )
                .with(
                    &format!("{BASE}/api/novels/7/chapters?page=3"),
                    unnumbered(&["c21"], r#"{"last_page":3,"per_page":10}"#),
                ),
        );
        let src = source(transport);
        let page = src.parse_page("sword-saint", 2).await.unwrap();
        let numbers: Vec<_> = page.chapters.iter().map(|c| c.chapter_number).collect();
        assert_eq!(numbers, [11.0, 12.0]);

        let page = src.parse_page("sword-saint", 3).await.unwrap();
        assert_eq!(page.chapters[0].chapter_number, 21.0);
    }

    #[tokio::test]
    async fn eager_detail_fails_hard_when_a_later_page_fails() {
        let transport = Arc::new(
            FixtureTransport::new()
                .with(&format!("{BASE}/api/novels/sword-saint"), detail_json())
                .with(&format!("{BASE}/api/novels/7/chapters?page=1"), chapters_json(1))
                .failing(&format!("{BASE}/api/novels/7/chapters?page=2"), 503),
        );
        let src = source(transport).eager_pages(true);
        let err = src.parse_novel("sword-saint").await.unwrap_err();
        assert!(matches!(
            err,
            SourceError::PartialCatalog {
                completed_pages: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn chapter_content_with_author_note() {
        let transport = Arc::new(
            FixtureTransport::new()
                .with(&format!("{BASE}/api/novels/sword-saint"), detail_json())
                .with(
                    &format!("{BASE}/api/novels/7/chapters/ch-1"),
                    r#"{"data":{"content":"First line\n\nSecond","author_note":"<p>Thanks for reading</p>"}}"#,
                )
                .with(&format!("{BASE}/api/novels/7/chapters/ch-2"), r#"{"data":{}}"#),
        );
        let src = source(transport);
        let body = src.parse_chapter("sword-saint/ch-1").await.unwrap();
        assert_eq!(
            body,
            "<p>First line</p>\n<p>Second</p>\n<hr/>\n<p>Thanks for reading</p>"
        );
        assert_eq!(
            src.parse_chapter("sword-saint/ch-2").await.unwrap(),
            CONTENT_NOT_FOUND
        );
        assert!(matches!(
            src.parse_chapter("no-slash").await.unwrap_err(),
            SourceError::InvalidPath(_)
        ));
    }

    #[tokio::test]
    async fn listing_applies_filters_and_visibility() {
        let url = format!(
            "{BASE}/api/novels?page=1&sort=rating&status=completed&genres=action%2Cfantasy"
        );
        let transport = Arc::new(FixtureTransport::new().with(
            &url,
            r#"{"data":[
                {"slug":"a","title":"A &amp; B","type":"novel","cover":"https://cdn.test/a.png"},
                {"slug":"b","title":"Comic","type":"comic"},
                {"slug":"c","title":"Paid","type":"novel","free":false}
            ]}"#,
        ));
        let src = source(transport.clone());

        let mut filters = FilterValues::new();
        filters.insert("order".into(), FilterValue::Single("rating".into()));
        filters.insert("status".into(), FilterValue::Single("completed".into()));
        filters.insert(
            "genres".into(),
            FilterValue::Multi(vec!["action".into(), "fantasy".into()]),
        );
        let items = src
            .popular_novels(
                1,
                &ListingOptions {
                    show_latest: false,
                    filters,
                },
            )
            .await
            .unwrap();

        let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["A & B", "Paid"]);
        assert_eq!(items[1].cover, crate::catalog::models::DEFAULT_COVER);
        assert_eq!(transport.calls(), vec![url]);
    }

    #[tokio::test]
    async fn latest_listing_and_empty_search() {
        let transport = Arc::new(
            FixtureTransport::new()
                .with(&format!("{BASE}/api/novels?page=2&sort=latest"), r#"{"data":[]}"#)
                .with(&format!("{BASE}/api/novels/search?q=nothing&page=1"), ""),
        );
        let src = source(transport);
        let latest = src
            .popular_novels(
                2,
                &ListingOptions {
                    show_latest: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(latest.is_empty());
        assert!(src.search_novels("nothing", 1).await.unwrap().is_empty());
    }
}
