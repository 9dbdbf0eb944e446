//! 统一内容模型：所有来源最终都产出这些结构。

use serde::{Deserialize, Serialize};

pub const DEFAULT_COVER: &str = "https://placehold.co/300x450/png?text=No+Cover";

/// 章节正文找不到时返回的占位文本（正文可能付费或缺失，不视为错误）。
pub const CONTENT_NOT_FOUND: &str = "<p>Chapter content not found.</p>";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NovelStatus {
    Ongoing,
    Completed,
    OnHiatus,
    Cancelled,
    #[default]
    Unknown,
}

impl NovelStatus {
    /// 上游状态字符串映射。无法识别的一律 `Unknown`，不做猜测。
    pub fn from_upstream(raw: &str) -> Self {
        let key: String = raw
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match key.as_str() {
            "ongoing" | "active" | "publishing" | "serializing" | "serialized" | "releasing"
            | "updating" | "inprogress" => Self::Ongoing,
            "completed" | "complete" | "finished" | "ended" | "end" | "done" => Self::Completed,
            "hiatus" | "onhiatus" | "paused" | "onhold" | "suspended" => Self::OnHiatus,
            "cancelled" | "canceled" | "dropped" | "discontinued" | "abandoned" => Self::Cancelled,
            _ => Self::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Ongoing => "Ongoing",
            Self::Completed => "Completed",
            Self::OnHiatus => "On Hiatus",
            Self::Cancelled => "Cancelled",
            Self::Unknown => "Unknown",
        }
    }
}

/// 列表/搜索结果中的一项。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NovelItem {
    pub name: String,
    pub path: String,
    pub cover: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Novel {
    pub path: String,
    pub name: String,
    pub cover: String,
    pub summary: String,
    pub author: String,
    pub artist: Option<String>,
    pub genres: Vec<String>,
    pub status: NovelStatus,
    pub rating: Option<f64>,
}

impl Novel {
    pub fn genres_display(&self) -> String {
        self.genres.join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub name: String,
    pub path: String,
    pub chapter_number: f64,
    pub release_time: Option<String>,
}

/// 详情：元数据 + 首批（或全部）章节。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NovelDetail {
    pub novel: Novel,
    pub chapters: Vec<Chapter>,
    /// 按页计数的来源才有；`None` 表示 `chapters` 已是完整目录。
    pub total_pages: Option<u32>,
}

/// 按页增量拉取的一页章节。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChapterPage {
    pub page: u32,
    pub chapters: Vec<Chapter>,
}
