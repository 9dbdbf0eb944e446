//! 把上游记录映射成统一模型。
//!
//! 各来源先把原始数据摊平成 [`RawNovel`] / [`RawChapter`]，
//! 再交给 [`CatalogBuilder`] 统一处理：HTML 剥离、状态映射、封面兜底、
//! 可见性过滤、章节标记，以及最终的排序去重。

use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use super::html_text::{html_to_inline_text, html_to_plain_text};
use super::models::{Chapter, DEFAULT_COVER, Novel, NovelItem, NovelStatus};
use crate::base_system::json_extract::{
    collect_maps, pick_cover, pick_f64, pick_from, pick_string, pick_tags,
};

pub const LOCK_GLYPH: &str = "🔒";
pub const ILLUSTRATION_GLYPH: &str = "🖼";

/// 来源侧摊平后的小说元数据，字段可能含 HTML 或缺失。
#[derive(Debug, Clone, Default)]
pub struct RawNovel {
    pub path: String,
    pub name: String,
    pub cover: Option<String>,
    pub summary: Option<String>,
    pub author: Option<String>,
    pub artist: Option<String>,
    pub genres: Vec<String>,
    pub status: Option<String>,
    pub rating: Option<f64>,
}

impl RawNovel {
    /// 从 JSON 详情对象按候选键宽松读取。
    pub fn from_json(raw: &Value, path: &str) -> Self {
        let maps = collect_maps(raw);
        let s = |keys: &[&str]| pick_from(&maps, |m| pick_string(m, keys));
        Self {
            path: path.to_string(),
            name: s(&["title", "name", "novel_title", "book_name"]).unwrap_or_default(),
            cover: pick_from(&maps, pick_cover),
            summary: s(&["synopsis", "summary", "description", "abstract", "intro"]),
            author: s(&["author", "author_name", "authorName", "writer"]),
            artist: s(&["artist", "illustrator", "artist_name"]),
            genres: maps
                .iter()
                .map(|m| pick_tags(m))
                .find(|tags| !tags.is_empty())
                .unwrap_or_default(),
            status: s(&["status", "state", "publication_status", "serial_status"]),
            rating: pick_from(&maps, |m| pick_f64(m, &["rating", "score", "average_rating"])),
        }
    }
}

/// 来源侧摊平后的章节。`number` 缺失时用列表位置 `position + 1` 代替。
#[derive(Debug, Clone, Default)]
pub struct RawChapter {
    pub name: String,
    pub path: String,
    pub number: Option<f64>,
    pub position: usize,
    pub release_time: Option<String>,
    pub locked: bool,
    pub illustrated: bool,
}

#[derive(Debug, Clone)]
pub struct CatalogBuilder {
    base_url: String,
    default_cover: String,
    allow_locked: bool,
}

impl CatalogBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            default_cover: DEFAULT_COVER.to_string(),
            allow_locked: false,
        }
    }

    pub fn with_default_cover(mut self, cover: impl Into<String>) -> Self {
        let cover = cover.into();
        if !cover.trim().is_empty() {
            self.default_cover = cover;
        }
        self
    }

    /// 来源能展示付费/锁定章节时打开：锁定内容保留并加 🔒 标记。
    pub fn allow_locked(mut self, allow: bool) -> Self {
        self.allow_locked = allow;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn cover(&self, raw: Option<&str>) -> String {
        resolve_cover(&self.base_url, raw, &self.default_cover)
    }

    pub fn novel(&self, raw: RawNovel) -> Novel {
        let status = raw
            .status
            .as_deref()
            .map(NovelStatus::from_upstream)
            .unwrap_or_default();
        let genres = raw
            .genres
            .iter()
            .map(|g| html_to_inline_text(g))
            .filter(|g| !g.is_empty())
            .collect();
        Novel {
            cover: self.cover(raw.cover.as_deref()),
            name: html_to_inline_text(&raw.name),
            summary: raw.summary.as_deref().map(html_to_plain_text).unwrap_or_default(),
            author: raw.author.as_deref().map(html_to_inline_text).unwrap_or_default(),
            artist: raw
                .artist
                .as_deref()
                .map(html_to_inline_text)
                .filter(|a| !a.is_empty()),
            genres,
            status,
            rating: raw.rating.filter(|r| r.is_finite()),
            path: raw.path,
        }
    }

    pub fn item(&self, name: &str, path: &str, cover: Option<&str>) -> NovelItem {
        NovelItem {
            name: html_to_inline_text(name),
            path: path.to_string(),
            cover: self.cover(cover),
        }
    }

    /// 列表记录是否应当出现在结果里：非小说类型一律丢弃；
    /// 来源不支持锁定内容时，非免费记录也丢弃。
    pub fn is_visible(&self, record_type: Option<&str>, free: Option<bool>) -> bool {
        if let Some(kind) = record_type
            && !kind.trim().eq_ignore_ascii_case("novel")
        {
            return false;
        }
        self.allow_locked || free.unwrap_or(true)
    }

    /// 锁定章节在不支持锁定内容的来源上返回 `None`。
    pub fn chapter(&self, raw: RawChapter) -> Option<Chapter> {
        if raw.locked && !self.allow_locked {
            debug!(target: "catalog", path = %raw.path, "跳过锁定章节");
            return None;
        }
        let mut name = html_to_inline_text(&raw.name);
        if name.is_empty() {
            name = format!("Chapter {}", raw.position + 1);
        }
        if raw.locked {
            name = format!("{LOCK_GLYPH} {name}");
        }
        if raw.illustrated {
            name = format!("{name} {ILLUSTRATION_GLYPH}");
        }
        Some(Chapter {
            name,
            path: raw.path,
            chapter_number: raw
                .number
                .filter(|n| n.is_finite())
                .unwrap_or((raw.position + 1) as f64),
            release_time: raw.release_time.filter(|t| !t.trim().is_empty()),
        })
    }

    /// 拼接列表查询 URL；空值参数直接省略。
    pub fn listing_url(&self, path: &str, params: &[(&str, String)]) -> String {
        let base = join_url(&self.base_url, path);
        let pairs: Vec<_> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
        if pairs.is_empty() {
            return base;
        }
        match Url::parse_with_params(&base, pairs) {
            Ok(url) => url.to_string(),
            Err(_) => base,
        }
    }
}

/// 相对封面地址补全为绝对地址；缺失或空白时用默认封面。
pub fn resolve_cover(base_url: &str, raw: Option<&str>, default_cover: &str) -> String {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return default_cover.to_string();
    };
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return raw.to_string();
    }
    if let Some(rest) = raw.strip_prefix("//") {
        return format!("https://{rest}");
    }
    Url::parse(base_url)
        .and_then(|base| base.join(raw))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| default_cover.to_string())
}

pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// 按 `chapter_number` 稳定升序排序，相同编号只保留第一次出现的那条。
pub fn finalize_chapters(mut chapters: Vec<Chapter>) -> Vec<Chapter> {
    chapters.sort_by(|a, b| a.chapter_number.total_cmp(&b.chapter_number));
    let before = chapters.len();
    chapters.dedup_by(|later, earlier| later.chapter_number == earlier.chapter_number);
    if chapters.len() != before {
        debug!(
            target: "catalog",
            dropped = before - chapters.len(),
            "章节编号重复，已去重"
        );
    }
    chapters
}
