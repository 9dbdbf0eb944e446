//! 日志初始化：stderr 控制台 + `logs/latest.log`，过大的日志在启动/退出时归档为 zip。
//!
//! stdout 只留给命令输出（`--json` 时控制台日志整体关闭）。HTTP/HTML 解析相关的
//! 依赖库日志在控制台压到 WARN，文件里保留到 INFO，方便回溯上游响应问题。

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::{io, panic, thread, time::Duration};

use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{error, info};
use tracing_appender::non_blocking::{self, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use zip::CompressionMethod;
use zip::write::FileOptions;

const LATEST_LOG: &str = "latest.log";
const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
const FLUSH_WAIT_MS: u64 = 200;

/// 依赖库的日志来源，单独限级。
const DEPENDENCY_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls", "h2", "html5ever", "selectors"];

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("subscriber init failed: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("time formatting failed: {0}")]
    Time(#[from] time::error::Format),
}

#[derive(Clone, Debug)]
pub struct LogOptions {
    pub debug: bool,
    pub use_color: bool,
    pub archive_on_exit: bool,
    /// `--json` 输出时关闭控制台日志。
    pub console: bool,
    pub logs_dir: PathBuf,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            debug: false,
            use_color: true,
            archive_on_exit: true,
            console: true,
            logs_dir: PathBuf::from("logs"),
        }
    }
}

/// 持有文件 writer 的 guard；drop 时刷盘并按需归档。
pub struct LogSystem {
    shutdown: Arc<Shutdown>,
}

impl LogSystem {
    pub fn init(options: LogOptions) -> Result<Self, LogError> {
        fs::create_dir_all(&options.logs_dir)?;
        let latest_log = options.logs_dir.join(LATEST_LOG);
        archive_if_large(&latest_log, &options.logs_dir)?;

        let (file_writer, guard) = non_blocking::NonBlockingBuilder::default()
            .lossy(false)
            .finish(rolling::never(&options.logs_dir, LATEST_LOG));

        let console_writer = if options.console {
            BoxMakeWriter::new(io::stderr)
        } else {
            BoxMakeWriter::new(io::sink)
        };
        let console_level = if options.debug {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        };
        let console_layer = fmt::layer()
            .with_target(options.debug)
            .with_ansi(options.use_color)
            .with_writer(console_writer)
            .with_filter(level_targets(console_level, LevelFilter::WARN));

        let file_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_ansi(false)
            .with_writer(file_writer)
            .with_filter(level_targets(LevelFilter::DEBUG, LevelFilter::INFO));

        tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init()?;

        let shutdown = Arc::new(Shutdown {
            logs_dir: options.logs_dir,
            latest_log,
            guard: Mutex::new(Some(guard)),
            hooks: Mutex::new(Vec::new()),
            done: AtomicBool::new(false),
            archive: options.archive_on_exit,
        });
        shutdown.on_ctrlc();
        shutdown.on_panic();

        Ok(Self { shutdown })
    }

    /// 退出前执行的收尾动作（后注册的先执行）。
    pub fn add_exit_hook<F>(&self, func: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Ok(mut hooks) = self.shutdown.hooks.lock() {
            hooks.push(Box::new(func));
        }
    }

    pub fn safe_exit(&self) {
        self.shutdown.run();
    }
}

impl Drop for LogSystem {
    fn drop(&mut self) {
        self.shutdown.run();
    }
}

/// 本 crate 按 `own` 级别，依赖库按 `dependencies` 级别。
fn level_targets(own: LevelFilter, dependencies: LevelFilter) -> Targets {
    let dependencies = dependencies.min(own);
    DEPENDENCY_TARGETS
        .iter()
        .fold(Targets::new().with_default(own), |targets, name| {
            targets.with_target(*name, dependencies)
        })
}

type ExitHook = Box<dyn FnOnce() + Send + 'static>;

struct Shutdown {
    logs_dir: PathBuf,
    latest_log: PathBuf,
    guard: Mutex<Option<WorkerGuard>>,
    hooks: Mutex<Vec<ExitHook>>,
    done: AtomicBool,
    archive: bool,
}

impl Shutdown {
    fn on_ctrlc(self: &Arc<Self>) {
        let shutdown = Arc::clone(self);
        let _ = ctrlc::set_handler(move || {
            shutdown.run();
            std::process::exit(130);
        });
    }

    fn on_panic(self: &Arc<Self>) {
        let shutdown = Arc::clone(self);
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            match info.location() {
                Some(at) => error!("panic at {}:{}: {}", at.file(), at.line(), info),
                None => error!("panic: {info}"),
            }
            shutdown.run();
            previous(info);
        }));
    }

    /// 只执行一次：收尾钩子 → 刷盘 → 归档。
    fn run(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut hooks) = self.hooks.lock() {
            while let Some(hook) = hooks.pop() {
                hook();
            }
        }
        if let Ok(mut guard) = self.guard.lock() {
            guard.take();
        }
        thread::sleep(Duration::from_millis(FLUSH_WAIT_MS));

        if self.archive
            && let Err(err) = archive_if_large(&self.latest_log, &self.logs_dir)
        {
            eprintln!("failed to archive log: {err}");
        }
    }
}

fn archive_if_large(latest_log: &Path, logs_dir: &Path) -> Result<Option<PathBuf>, LogError> {
    match fs::metadata(latest_log) {
        Ok(meta) if meta.len() >= MAX_LOG_BYTES => archive_log_file(latest_log, logs_dir),
        _ => Ok(None),
    }
}

/// `latest.log` → `sources_<时间戳>.zip`；空文件直接删除。
fn archive_log_file(latest_log: &Path, logs_dir: &Path) -> Result<Option<PathBuf>, LogError> {
    let len = match fs::metadata(latest_log) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if len == 0 {
        let _ = fs::remove_file(latest_log);
        return Ok(None);
    }

    let stamp = OffsetDateTime::now_utc().format(format_description!(
        "[year][month][day]_[hour][minute][second]"
    ))?;
    let archive_path = logs_dir.join(format!("sources_{stamp}.zip"));

    // 先挪走再压缩，writer 此后写入的是新的 latest.log
    let staged = logs_dir.join(format!(".staged_{stamp}.log"));
    fs::rename(latest_log, &staged)?;

    let mut zip = zip::ZipWriter::new(File::create(&archive_path)?);
    zip.start_file(
        format!("sources_{stamp}.log"),
        FileOptions::default().compression_method(CompressionMethod::Deflated),
    )?;
    io::copy(&mut File::open(&staged)?, &mut zip)?;
    zip.finish()?;
    let _ = fs::remove_file(&staged);

    info!(target: "startup", path = %archive_path.display(), "日志已归档");
    Ok(Some(archive_path))
}
