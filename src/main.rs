//! novel-source-kit 命令行：对内置来源执行列表、搜索、详情、目录与正文抓取。
//!
//! 默认输出人类可读文本；`--json` 输出结构化结果，供脚本消费。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};

use novel_source_kit::base_system::config::load_or_create_with_base;
use novel_source_kit::base_system::context::Config;
use novel_source_kit::base_system::logging::{LogOptions, LogSystem};
use novel_source_kit::catalog::html_text::html_to_plain_text;
use novel_source_kit::catalog::models::{Chapter, NovelItem};
use novel_source_kit::network_parser::ReqwestTransport;
use novel_source_kit::sources::{ListingOptions, SourcePlugin, SourceRegistry};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const WRAP_WIDTH: usize = 78;

#[derive(Debug, Parser)]
#[command(name = "novel-source-kit", version = VERSION)]
#[command(about = "Browse serialized-fiction sources from the terminal")]
struct Cli {
    /// 启用调试日志输出
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,

    /// 以 JSON 输出结果（同时关闭控制台日志）
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    /// 配置文件路径（默认 `<data-dir>/sources.yml`）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 数据目录（存放配置与 logs）
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 列出已注册的来源及其过滤器
    Sources,
    /// 热门/最新列表
    Popular {
        source: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// 按最新更新排序
        #[arg(long, default_value_t = false)]
        latest: bool,
        /// `key=value`，可重复；多选用逗号分隔
        #[arg(long = "filter")]
        filters: Vec<String>,
    },
    /// 搜索
    Search {
        source: String,
        term: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// 作品详情与首批章节
    Novel { source: String, path: String },
    /// 按页拉取章节目录
    Chapters {
        source: String,
        path: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// 章节正文
    Chapter { source: String, chapter_path: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = cli.data_dir.as_deref();
    let _log = init_logging(cli.debug, !cli.json, data_dir)?;

    let config = load_or_create_with_base::<Config>(cli.config.as_deref(), data_dir)
        .map_err(|e| anyhow!(e.to_string()))
        .context("加载配置失败")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("创建异步运行时失败")?;
    runtime.block_on(run(cli, config))
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    let transport = ReqwestTransport::new((&config).into()).context("初始化 HTTP 客户端失败")?;
    let registry = SourceRegistry::with_defaults(&config, Arc::new(transport))?;
    info!(target: "startup", version = VERSION, sources = registry.len(), "来源已就绪");

    let json = cli.json;
    match cli.command {
        Command::Sources => {
            if json {
                let listing: Vec<_> = registry.iter().map(|s| SourceSummary::of(s.as_ref())).collect();
                return print_json(&listing);
            }
            for source in registry.iter() {
                println!("{:<14} {:<14} {}", source.id(), source.name(), source.site());
                for filter in source.filters().iter() {
                    println!("    --filter {}=…  ({})", filter.key, filter.label);
                }
            }
        }
        Command::Popular {
            source,
            page,
            latest,
            filters,
        } => {
            let source = registry.get(&source)?;
            let options = ListingOptions {
                show_latest: latest,
                filters: source.filters().parse_pairs(&filters),
            };
            debug!(target: "cli", ?options, "列表参数");
            let items = source
                .popular_novels(page, &options)
                .await
                .with_context(|| format!("{} 列表第 {page} 页失败", source.id()))?;
            emit_items(&items, json)?;
        }
        Command::Search { source, term, page } => {
            let source = registry.get(&source)?;
            let items = source
                .search_novels(&term, page)
                .await
                .with_context(|| format!("{} 搜索 {term:?} 失败", source.id()))?;
            emit_items(&items, json)?;
        }
        Command::Novel { source, path } => {
            let source = registry.get(&source)?;
            let detail = source
                .parse_novel(&path)
                .await
                .with_context(|| format!("{} 详情 {path} 失败", source.id()))?;
            if json {
                return print_json(&detail);
            }
            let novel = &detail.novel;
            println!("{}", novel.name);
            println!("作者: {}", novel.author);
            if let Some(artist) = &novel.artist {
                println!("画师: {artist}");
            }
            println!("状态: {}", novel.status.label());
            if !novel.genres.is_empty() {
                println!("标签: {}", novel.genres_display());
            }
            if let Some(rating) = novel.rating {
                println!("评分: {rating:.2}");
            }
            println!("封面: {}", novel.cover);
            println!();
            println!("{}", textwrap::fill(&novel.summary, WRAP_WIDTH));
            println!();
            if let Some(total) = detail.total_pages {
                println!("章节（第 1/{total} 页）:");
            } else {
                println!("章节（共 {} 章）:", detail.chapters.len());
            }
            print_chapters(&detail.chapters);
        }
        Command::Chapters { source, path, page } => {
            let source = registry.get(&source)?;
            let listing = source
                .parse_page(&path, page)
                .await
                .with_context(|| format!("{} 目录第 {page} 页失败", source.id()))?;
            if json {
                return print_json(&listing);
            }
            print_chapters(&listing.chapters);
        }
        Command::Chapter {
            source,
            chapter_path,
        } => {
            let source = registry.get(&source)?;
            let body = source
                .parse_chapter(&chapter_path)
                .await
                .with_context(|| format!("{} 正文 {chapter_path} 失败", source.id()))?;
            if json {
                return print_json(&ChapterBody {
                    path: &chapter_path,
                    html: &body,
                });
            }
            for paragraph in html_to_plain_text(&body).split('\n') {
                println!("{}", textwrap::fill(paragraph, WRAP_WIDTH));
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct SourceSummary<'a> {
    id: &'static str,
    name: &'static str,
    site: &'a str,
    filters: &'a novel_source_kit::catalog::filters::FilterSet,
}

impl<'a> SourceSummary<'a> {
    fn of(source: &'a dyn SourcePlugin) -> Self {
        Self {
            id: source.id(),
            name: source.name(),
            site: source.site(),
            filters: source.filters(),
        }
    }
}

#[derive(Serialize)]
struct ChapterBody<'a> {
    path: &'a str,
    html: &'a str,
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn emit_items(items: &[NovelItem], json: bool) -> Result<()> {
    if json {
        return print_json(items);
    }
    if items.is_empty() {
        println!("（没有结果）");
    }
    for item in items {
        println!("{}\n    {}", item.name, item.path);
    }
    Ok(())
}

fn print_chapters(chapters: &[Chapter]) {
    for chapter in chapters {
        match &chapter.release_time {
            Some(time) => println!("{:>7}  {}  [{}]", chapter.chapter_number, chapter.name, time),
            None => println!("{:>7}  {}", chapter.chapter_number, chapter.name),
        }
        println!("         {}", chapter.path);
    }
}

fn init_logging(debug: bool, console: bool, base_dir: Option<&Path>) -> Result<LogSystem> {
    let logs_dir = base_dir
        .map(|dir| dir.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let opts = LogOptions {
        debug,
        use_color: true,
        archive_on_exit: true,
        console,
        logs_dir,
    };
    LogSystem::init(opts).map_err(|e| anyhow!(e))
}
