//! 统一内容模型与目录构建。

pub mod builder;
pub mod filters;
pub mod html_text;
pub mod models;

pub use builder::{CatalogBuilder, RawChapter, RawNovel, finalize_chapters, join_url, resolve_cover};
pub use filters::{FilterDef, FilterKind, FilterOption, FilterSet, FilterValue, FilterValues, ResolvedFilters};
pub use models::{
    CONTENT_NOT_FOUND, Chapter, ChapterPage, DEFAULT_COVER, Novel, NovelDetail, NovelItem,
    NovelStatus,
};
