//! catalog-feed：JSON 接口，章节用 skip/take 分页且总数事先未知；搜索不分页。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{
    ListingOptions, SourcePlugin, fetch_body, fetch_json, normalize_path, split_chapter_path,
    with_author_note,
};
use crate::base_system::context::Config;
use crate::base_system::json_extract::{
    JsonMap, collect_maps, pick_array, pick_bool, pick_cover, pick_f64, pick_from, pick_string,
    pick_u64,
};
use crate::catalog::builder::{CatalogBuilder, RawChapter, RawNovel, join_url};
use crate::catalog::filters::FilterSet;
use crate::catalog::html_text::{looks_like_html, paragraphs_to_html};
use crate::catalog::models::{CONTENT_NOT_FOUND, ChapterPage, NovelDetail, NovelItem};
use crate::decoder::{parse_json_body, sanitize_fragment};
use crate::error::Result;
use crate::network_parser::{FetchRequest, Transport};
use crate::pagination::{ChapterFeed, FeedPage, PageCursor, PageStrategy, PaginationDriver};

/// 列表接口每页条数。
const LISTING_PAGE_SIZE: usize = 20;
const SEARCH_LIMIT: usize = 100;
const DEFAULT_BATCH: usize = 500;

pub struct CatalogFeed {
    transport: Arc<dyn Transport>,
    builder: CatalogBuilder,
    filters: FilterSet,
    batch: usize,
}

impl CatalogFeed {
    pub const ID: &'static str = "catalog-feed";

    pub fn new(base_url: &str, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            builder: CatalogBuilder::new(base_url),
            filters: listing_filters(),
            batch: DEFAULT_BATCH,
        }
    }

    pub fn from_config(config: &Config, transport: Arc<dyn Transport>) -> Self {
        Self::new(&config.catalog_feed_base, transport)
            .batch_size(config.skip_take_batch)
            .default_cover(&config.default_cover)
    }

    pub fn batch_size(mut self, batch: usize) -> Self {
        self.batch = batch.max(1);
        self
    }

    fn default_cover(mut self, cover: &str) -> Self {
        self.builder = self.builder.with_default_cover(cover);
        self
    }

    fn items(&self, raw: &Value) -> Vec<NovelItem> {
        let Some(records) = pick_array(raw, &["items", "results"]) else {
            return Vec::new();
        };
        records
            .iter()
            .filter_map(Value::as_object)
            .filter(|m| self.builder.is_visible(pick_string(m, &["kind", "type"]).as_deref(), is_free(m)))
            .filter_map(|m| {
                let path = pick_string(m, &["slug"])?;
                let name = pick_string(m, &["name", "title"]).unwrap_or_else(|| path.clone());
                Some(self.builder.item(&name, &path, pick_cover(m).as_deref()))
            })
            .collect()
    }
}

/// `premium: true` 或 `access: "premium"` 视为非免费。
fn is_free(map: &JsonMap) -> Option<bool> {
    if let Some(premium) = pick_bool(map, &["premium", "is_premium"]) {
        return Some(!premium);
    }
    pick_string(map, &["access"]).map(|a| a.eq_ignore_ascii_case("free"))
}

fn listing_filters() -> FilterSet {
    FilterSet::new()
        .picker(
            "order",
            "Order",
            &[("Trending", "trending"), ("Most read", "reads"), ("Top rated", "rating")],
            "trending",
        )
        .picker(
            "genre",
            "Genre",
            &[
                ("Any", ""),
                ("Fantasy", "fantasy"),
                ("Wuxia", "wuxia"),
                ("Romance", "romance"),
                ("Horror", "horror"),
                ("Mystery", "mystery"),
            ],
            "",
        )
        .switch("completed", "Completed only", false)
}

struct ChapterBatches<'a> {
    source: &'a CatalogFeed,
    slug: &'a str,
}

#[async_trait]
impl ChapterFeed for ChapterBatches<'_> {
    async fn fetch(&self, cursor: PageCursor) -> Result<FeedPage> {
        let (skip, take) = match cursor {
            PageCursor::Offset { skip, take } => (skip, take),
            PageCursor::Page(n) => ((n.max(1) as usize - 1) * self.source.batch, self.source.batch),
            PageCursor::Full => (0, self.source.batch),
        };
        let url = self.source.builder.listing_url(
            &format!("/v1/novels/{}/chapters", self.slug),
            &[("skip", skip.to_string()), ("take", take.to_string())],
        );
        let raw = fetch_json(self.source.transport.as_ref(), url).await?;

        let total_count = raw
            .as_object()
            .and_then(|m| pick_u64(m, &["total_count", "totalCount", "total"]))
            .map(|n| n as usize);

        let records: Vec<&JsonMap> = pick_array(&raw, &["items", "chapters"])
            .map(|records| records.iter().filter_map(Value::as_object).collect())
            .unwrap_or_default();
        let chapters: Vec<_> = records
            .iter()
            .enumerate()
            .filter_map(|(idx, m)| {
                let key = pick_string(m, &["slug", "id"])?;
                self.source.builder.chapter(RawChapter {
                    name: pick_string(m, &["title", "name"]).unwrap_or_default(),
                    path: format!("{}/{}", self.slug, key),
                    number: pick_f64(m, &["index", "number"]),
                    position: skip + idx,
                    release_time: pick_string(m, &["posted_at", "published"]),
                    locked: is_free(m) == Some(false),
                    illustrated: pick_bool(m, &["illustrated", "has_images"]).unwrap_or(false),
                })
            })
            .collect();

        debug!(
            target: "source",
            source = CatalogFeed::ID,
            slug = self.slug,
            skip,
            take,
            records = records.len(),
            visible = chapters.len(),
            ?total_count,
            "章节批次"
        );
        Ok(FeedPage {
            fetched: records.len(),
            chapters,
            total_pages: None,
            total_count,
        })
    }
}

#[async_trait]
impl SourcePlugin for CatalogFeed {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn name(&self) -> &'static str {
        "Catalog Feed"
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
            "recent"
        } else {
            filters.picker("order")
        };
        let skip = (page.max(1) as usize - 1) * LISTING_PAGE_SIZE;
        let mut params = vec![
            ("skip", skip.to_string()),
            ("take", LISTING_PAGE_SIZE.to_string()),
            ("order", order.to_string()),
            ("genre", filters.picker("genre").to_string()),
        ];
        if filters.switch("completed") {
            params.push(("completed", "true".to_string()));
        }
        let url = self.builder.listing_url("/v1/catalog", &params);
        let raw = fetch_json(self.transport.as_ref(), url).await?;
        Ok(self.items(&raw))
    }

    /// 上游搜索是 POST 查询，一次返回全部结果，后续页直接为空。
    async fn search_novels(&self, term: &str, page: u32) -> Result<Vec<NovelItem>> {
        if page > 1 {
            debug!(target: "source", source = Self::ID, page, "搜索不分页，跳过请求");
            return Ok(Vec::new());
        }
        let url = join_url(self.builder.base_url(), "/v1/search");
        let query = json!({ "query": term.trim(), "limit": SEARCH_LIMIT });
        let body = fetch_body(
            self.transport.as_ref(),
            FetchRequest::post_json(url.as_str(), query.to_string()),
        )
        .await?;
        Ok(self.items(&parse_json_body(&body, &url)?))
    }

    async fn parse_novel(&self, path: &str) -> Result<NovelDetail> {
        let slug = normalize_path(path)?;
        let url = join_url(self.builder.base_url(), &format!("/v1/novels/{slug}"));
        let raw = fetch_json(self.transport.as_ref(), url).await?;
        let novel = self.builder.novel(RawNovel::from_json(&raw, slug));

        let feed = ChapterBatches { source: self, slug };
        let chapters = PaginationDriver::new(&feed, PageStrategy::SkipTake { batch: self.batch })
            .labelled(slug)
            .collect_all()
            .await?;
        info!(
            target: "source",
            source = Self::ID,
            slug,
            chapters = chapters.len(),
            "详情解析完成"
        );
        Ok(NovelDetail {
            novel,
            chapters,
            total_pages: None,
        })
    }

    async fn parse_page(&self, path: &str, page: u32) -> Result<ChapterPage> {
        let slug = normalize_path(path)?;
        let feed = ChapterBatches { source: self, slug };
        let chapters = PaginationDriver::new(&feed, PageStrategy::SkipTake { batch: self.batch })
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
        let url = join_url(
            self.builder.base_url(),
            &format!("/v1/novels/{slug}/chapters/{chapter}"),
        );
        let raw = fetch_json(self.transport.as_ref(), url).await?;
        let maps = collect_maps(&raw);

        let Some(content) = pick_from(&maps, |m| pick_string(m, &["html", "content", "text"]))
        else {
            return Ok(CONTENT_NOT_FOUND.to_string());
        };
        let body = if looks_like_html(&content) {
            sanitize_fragment(&content)
        } else {
            paragraphs_to_html(&content)
        };
        let note = pick_from(&maps, |m| pick_string(m, &["author_note", "notes"]));
        Ok(with_author_note(body, note.as_deref()))
    }
}
