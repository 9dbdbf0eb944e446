//! 章节目录分页驱动。
//!
//! 上游的分页方式各不相同：
//! - 按页计数：第 1 页给出 `total_pages`，其余页一次拉完或按需拉取；
//! - skip/take：总数只有拿到响应后才知道，偏移递增直到 `skip >= total_count`；
//! - 不分页：一次返回全部，只有第 1 页有效。
//!
//! 无论哪种方式，交给调用方的章节都按 `chapter_number` 升序且去重。
//! 已有页面成功之后的失败一律上抛为 [`SourceError::PartialCatalog`]；
//! skip/take 在总数未达到时拿到空批次，同样视为失败而不是完整结果。

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::catalog::builder::finalize_chapters;
use crate::catalog::models::Chapter;
use crate::error::{Result, SourceError};

/// 单次目录拉取的页数/批次上限，防止上游虚报总数导致无限循环。
pub const MAX_PAGES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCursor {
    /// 从 1 开始的页码
    Page(u32),
    Offset { skip: usize, take: usize },
    /// 不分页来源的整表请求
    Full,
}

/// 来源为一次拉取返回的内容。
#[derive(Debug, Clone, Default)]
pub struct FeedPage {
    pub chapters: Vec<Chapter>,
    pub total_pages: Option<u32>,
    pub total_count: Option<usize>,
    /// 上游本次返回的原始记录数（可见性过滤之前）。skip/take 的翻页判断依据它，
    /// 否则锁定章节被过滤掉会被误判成“批次不满”或“空批次”。
    pub fetched: usize,
}

/// 按游标拉取一批章节；由各来源实现。
#[async_trait]
pub trait ChapterFeed: Send + Sync {
    async fn fetch(&self, cursor: PageCursor) -> Result<FeedPage>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStrategy {
    Counted { eager: bool },
    SkipTake { batch: usize },
    SinglePage,
}

/// 详情页需要的章节：完整目录，或按页计数时的第一页。
#[derive(Debug, Clone, Default)]
pub struct CatalogBatch {
    pub chapters: Vec<Chapter>,
    /// 仅按需分页时为 `Some`，调用方据此继续请求后续页。
    pub total_pages: Option<u32>,
}

pub struct PaginationDriver<'a, F: ChapterFeed + ?Sized> {
    feed: &'a F,
    strategy: PageStrategy,
    label: &'a str,
}

impl<'a, F: ChapterFeed + ?Sized> PaginationDriver<'a, F> {
    pub fn new(feed: &'a F, strategy: PageStrategy) -> Self {
        Self {
            feed,
            strategy,
            label: "",
        }
    }

    /// 日志里用来区分是哪本书的目录。
    pub fn labelled(mut self, label: &'a str) -> Self {
        self.label = label;
        self
    }

    pub async fn first_batch(&self) -> Result<CatalogBatch> {
        match self.strategy {
            PageStrategy::Counted { eager: false } => {
                let page = self.feed.fetch(PageCursor::Page(1)).await?;
                let total = page.total_pages.unwrap_or(1).max(1);
                debug!(target: "pagination", novel = self.label, total, "按需分页，仅取第 1 页");
                Ok(CatalogBatch {
                    chapters: finalize_chapters(page.chapters),
                    total_pages: Some(total),
                })
            }
            PageStrategy::Counted { eager: true } => Ok(CatalogBatch {
                chapters: self.collect_counted().await?,
                total_pages: None,
            }),
            PageStrategy::SkipTake { batch } => Ok(CatalogBatch {
                chapters: self.collect_skip_take(batch).await?,
                total_pages: None,
            }),
            PageStrategy::SinglePage => {
                let page = self.feed.fetch(PageCursor::Full).await?;
                Ok(CatalogBatch {
                    chapters: finalize_chapters(page.chapters),
                    total_pages: None,
                })
            }
        }
    }

    /// 完整目录，与策略是否按需无关。
    pub async fn collect_all(&self) -> Result<Vec<Chapter>> {
        match self.strategy {
            PageStrategy::Counted { .. } => self.collect_counted().await,
            PageStrategy::SkipTake { batch } => self.collect_skip_take(batch).await,
            PageStrategy::SinglePage => Ok(finalize_chapters(
                self.feed.fetch(PageCursor::Full).await?.chapters,
            )),
        }
    }

    /// 第 `page` 页（从 1 开始）。不分页来源的后续页直接返回空，不发请求。
    pub async fn page(&self, page: u32) -> Result<Vec<Chapter>> {
        let page = page.max(1);
        let cursor = match self.strategy {
            PageStrategy::Counted { .. } => PageCursor::Page(page),
            PageStrategy::SkipTake { batch } => PageCursor::Offset {
                skip: (page as usize - 1).saturating_mul(batch),
                take: batch,
            },
            PageStrategy::SinglePage if page > 1 => {
                debug!(target: "pagination", novel = self.label, page, "不分页来源，跳过后续页");
                return Ok(Vec::new());
            }
            PageStrategy::SinglePage => PageCursor::Full,
        };
        let fetched = self.feed.fetch(cursor).await?;
        Ok(finalize_chapters(fetched.chapters))
    }

    async fn collect_counted(&self) -> Result<Vec<Chapter>> {
        let first = self.feed.fetch(PageCursor::Page(1)).await?;
        let total = first.total_pages.unwrap_or(1).max(1);
        if total as usize > MAX_PAGES {
            return Err(SourceError::PageLimit(MAX_PAGES));
        }

        let mut chapters = first.chapters;
        for page in 2..=total {
            let next = self
                .feed
                .fetch(PageCursor::Page(page))
                .await
                .map_err(|e| partial(page as usize - 1, e))?;
            debug!(
                target: "pagination",
                novel = self.label,
                page,
                total,
                count = next.chapters.len(),
                "章节页已拉取"
            );
            chapters.extend(next.chapters);
        }

        info!(target: "pagination", novel = self.label, pages = total, "目录拉取完成");
        Ok(finalize_chapters(chapters))
    }

    async fn collect_skip_take(&self, batch: usize) -> Result<Vec<Chapter>> {
        let take = batch.max(1);
        let mut skip = 0usize;
        let mut fetched_batches = 0usize;
        let mut records = 0usize;
        let mut chapters = Vec::new();

        // 总数要等第一次响应才知道，所以至少执行一次
        loop {
            if fetched_batches >= MAX_PAGES {
                return Err(SourceError::PageLimit(MAX_PAGES));
            }
            let page = self
                .feed
                .fetch(PageCursor::Offset { skip, take })
                .await
                .map_err(|e| partial(fetched_batches, e))?;
            fetched_batches += 1;

            // 没有填写 fetched 的来源退回到过滤后的条数
            let received = page.fetched.max(page.chapters.len());
            records += received;
            chapters.extend(page.chapters);
            skip += take;

            match page.total_count {
                Some(total) if skip >= total => break,
                Some(total) if received == 0 => {
                    warn!(
                        target: "pagination",
                        novel = self.label,
                        skip,
                        total,
                        "上游返回空批次但总数未达到"
                    );
                    return Err(partial(
                        fetched_batches - 1,
                        SourceError::Truncated {
                            received: records,
                            expected: total,
                        },
                    ));
                }
                Some(_) => {}
                // 没有总数时，不满一批即视为结束
                None if received < take => break,
                None => {}
            }
        }

        info!(
            target: "pagination",
            novel = self.label,
            batches = fetched_batches,
            count = chapters.len(),
            "目录拉取完成"
        );
        Ok(finalize_chapters(chapters))
    }
}

fn partial(completed_pages: usize, source: SourceError) -> SourceError {
    if completed_pages == 0 {
        return source;
    }
    warn!(target: "pagination", completed_pages, error = %source, "目录在中途失败");
    SourceError::PartialCatalog {
        completed_pages,
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::network_parser::TransportError;

    fn ch(number: f64) -> Chapter {
        Chapter {
            name: format!("Chapter {number}"),
            path: format!("n/{number}"),
            chapter_number: number,
            release_time: None,
        }
    }

    /// 按调用顺序返回预置结果，并记录游标。
    struct ScriptedFeed {
        responses: Mutex<Vec<Result<FeedPage>>>,
        cursors: Mutex<Vec<PageCursor>>,
    }

    impl ScriptedFeed {
        fn new(mut responses: Vec<Result<FeedPage>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                cursors: Mutex::new(Vec::new()),
            }
        }

        fn cursors(&self) -> Vec<PageCursor> {
            self.cursors.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChapterFeed for ScriptedFeed {
        async fn fetch(&self, cursor: PageCursor) -> Result<FeedPage> {
            self.cursors.lock().unwrap().push(cursor);
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| panic!("unexpected fetch {cursor:?}"))
        }
    }

    fn page(numbers: &[f64], total_pages: Option<u32>, total_count: Option<usize>) -> Result<FeedPage> {
        Ok(FeedPage {
            chapters: numbers.iter().copied().map(ch).collect(),
            total_pages,
            total_count,
            fetched: numbers.len(),
        })
    }

    /// 上游返回了 `fetched` 条记录，但只有 `numbers` 可见。
    fn filtered(numbers: &[f64], fetched: usize, total_count: Option<usize>) -> Result<FeedPage> {
        Ok(FeedPage {
            fetched,
            ..page(numbers, None, total_count)?
        })
    }

    fn http_error(status: u16) -> Result<FeedPage> {
        Err(SourceError::Transport(TransportError::Status {
            url: "https://example.org/chapters".into(),
            status,
        }))
    }

    fn numbers(chapters: &[Chapter]) -> Vec<f64> {
        chapters.iter().map(|c| c.chapter_number).collect()
    }

    fn assert_strictly_ascending(chapters: &[Chapter]) {
        assert!(
            chapters
                .windows(2)
                .all(|w| w[0].chapter_number < w[1].chapter_number),
            "{:?}",
            numbers(chapters)
        );
    }

    #[tokio::test]
    async fn skip_take_with_zero_total_fetches_once() {
        let feed = ScriptedFeed::new(vec![page(&[], None, Some(0))]);
        let driver = PaginationDriver::new(&feed, PageStrategy::SkipTake { batch: 500 });
        let chapters = driver.collect_all().await.unwrap();
        assert!(chapters.is_empty());
        assert_eq!(feed.cursors(), vec![PageCursor::Offset { skip: 0, take: 500 }]);
    }

    #[tokio::test]
    async fn skip_take_follows_last_reported_total() {
        let feed = ScriptedFeed::new(vec![
            page(&[3.0, 1.0], None, Some(3)),
            page(&[2.0, 3.0], None, Some(5)),
            page(&[5.0, 4.0], None, Some(5)),
        ]);
        let driver = PaginationDriver::new(&feed, PageStrategy::SkipTake { batch: 2 });
        let chapters = driver.collect_all().await.unwrap();
        assert_eq!(numbers(&chapters), [1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_strictly_ascending(&chapters);
        assert_eq!(feed.cursors().len(), 3);
        assert_eq!(feed.cursors()[2], PageCursor::Offset { skip: 4, take: 2 });
    }

    #[tokio::test]
    async fn skip_take_without_total_stops_on_short_batch() {
        let feed = ScriptedFeed::new(vec![page(&[1.0, 2.0], None, None), page(&[3.0], None, None)]);
        let driver = PaginationDriver::new(&feed, PageStrategy::SkipTake { batch: 2 });
        assert_eq!(numbers(&driver.collect_all().await.unwrap()), [1.0, 2.0, 3.0]);
        assert_eq!(feed.cursors().len(), 2);
    }

    #[tokio::test]
    async fn skip_take_empty_batch_below_total_is_an_error() {
        let feed = ScriptedFeed::new(vec![page(&[1.0], None, Some(10)), page(&[], None, Some(10))]);
        let driver = PaginationDriver::new(&feed, PageStrategy::SkipTake { batch: 1 });
        match driver.collect_all().await.unwrap_err() {
            SourceError::PartialCatalog {
                completed_pages,
                source,
            } => {
                assert_eq!(completed_pages, 1);
                assert!(matches!(
                    *source,
                    SourceError::Truncated {
                        received: 1,
                        expected: 10
                    }
                ));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(feed.cursors().len(), 2);

        // 第一批就是空的：没有任何已完成批次，直接返回 Truncated
        let feed = ScriptedFeed::new(vec![page(&[], None, Some(3))]);
        let driver = PaginationDriver::new(&feed, PageStrategy::SkipTake { batch: 2 });
        assert!(matches!(
            driver.collect_all().await.unwrap_err(),
            SourceError::Truncated {
                received: 0,
                expected: 3
            }
        ));
    }

    #[tokio::test]
    async fn skip_take_counts_filtered_records_as_received() {
        // 第二批全部被过滤，但上游确实返回了两条，应继续翻页
        let feed = ScriptedFeed::new(vec![
            page(&[1.0, 2.0], None, Some(6)),
            filtered(&[], 2, Some(6)),
            page(&[5.0, 6.0], None, Some(6)),
        ]);
        let driver = PaginationDriver::new(&feed, PageStrategy::SkipTake { batch: 2 });
        assert_eq!(numbers(&driver.collect_all().await.unwrap()), [1.0, 2.0, 5.0, 6.0]);
        assert_eq!(feed.cursors().len(), 3);

        // 没有总数时，满批次里有一条被过滤也不能当成最后一批
        let feed = ScriptedFeed::new(vec![filtered(&[1.0], 2, None), page(&[3.0], None, None)]);
        let driver = PaginationDriver::new(&feed, PageStrategy::SkipTake { batch: 2 });
        assert_eq!(numbers(&driver.collect_all().await.unwrap()), [1.0, 3.0]);
        assert_eq!(feed.cursors().len(), 2);
    }

    #[tokio::test]
    async fn mid_sequence_failure_is_partial_catalog() {
        let feed = ScriptedFeed::new(vec![
            page(&[1.0, 2.0], Some(3), None),
            page(&[3.0, 4.0], Some(3), None),
            http_error(502),
        ]);
        let driver = PaginationDriver::new(&feed, PageStrategy::Counted { eager: true });
        match driver.collect_all().await.unwrap_err() {
            SourceError::PartialCatalog {
                completed_pages,
                source,
            } => {
                assert_eq!(completed_pages, 2);
                assert!(matches!(*source, SourceError::Transport(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_page_failure_propagates_unchanged() {
        let feed = ScriptedFeed::new(vec![http_error(500)]);
        let driver = PaginationDriver::new(&feed, PageStrategy::SkipTake { batch: 10 });
        assert!(matches!(
            driver.collect_all().await.unwrap_err(),
            SourceError::Transport(_)
        ));
    }

    #[tokio::test]
    async fn counted_pages_are_merged_and_deduplicated() {
        let feed = ScriptedFeed::new(vec![
            page(&[2.0, 1.0, 2.0], Some(2), None),
            page(&[3.0, 1.0], Some(2), None),
        ]);
        let driver = PaginationDriver::new(&feed, PageStrategy::Counted { eager: false });
        let chapters = driver.collect_all().await.unwrap();
        assert_eq!(numbers(&chapters), [1.0, 2.0, 3.0]);
        assert_eq!(chapters[1].path, "n/2");
        assert_eq!(feed.cursors(), vec![PageCursor::Page(1), PageCursor::Page(2)]);
    }

    #[tokio::test]
    async fn lazy_counted_first_batch_reports_total() {
        let feed = ScriptedFeed::new(vec![page(&[1.0, 2.0], Some(7), None)]);
        let driver = PaginationDriver::new(&feed, PageStrategy::Counted { eager: false });
        let batch = driver.first_batch().await.unwrap();
        assert_eq!(batch.total_pages, Some(7));
        assert_eq!(batch.chapters.len(), 2);
        assert_eq!(feed.cursors().len(), 1);
    }

    #[tokio::test]
    async fn absurd_page_count_hits_limit() {
        let feed = ScriptedFeed::new(vec![page(&[1.0], Some(MAX_PAGES as u32 + 1), None)]);
        let driver = PaginationDriver::new(&feed, PageStrategy::Counted { eager: true });
        assert!(matches!(
            driver.collect_all().await.unwrap_err(),
            SourceError::PageLimit(MAX_PAGES)
        ));
    }

    #[tokio::test]
    async fn single_page_source_ignores_later_pages() {
        let feed = ScriptedFeed::new(vec![page(&[2.0, 1.0], None, None)]);
        let driver = PaginationDriver::new(&feed, PageStrategy::SinglePage);
        assert!(driver.page(2).await.unwrap().is_empty());
        assert!(feed.cursors().is_empty());
        assert_eq!(numbers(&driver.page(1).await.unwrap()), [1.0, 2.0]);
        assert_eq!(feed.cursors(), vec![PageCursor::Full]);
    }

    #[tokio::test]
    async fn skip_take_page_maps_to_offset() {
        let feed = ScriptedFeed::new(vec![page(&[], None, Some(0))]);
        let driver = PaginationDriver::new(&feed, PageStrategy::SkipTake { batch: 50 });
        driver.page(3).await.unwrap();
        assert_eq!(feed.cursors(), vec![PageCursor::Offset { skip: 100, take: 50 }]);
    }
}
