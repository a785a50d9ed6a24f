//! 日志模块 - 文件日志（按大小轮转）+ 控制台日志

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// 日志文件名
pub const LOG_FILE: &str = "blobsync.log";

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// 是否写入日志文件
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 最大日志文件大小（MB）
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u32,
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_level")]
    pub level: String,
    /// 日志目录，默认为配置目录下的 `logs`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

fn default_enabled() -> bool {
    true
}

fn default_max_size_mb() -> u32 {
    5
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_size_mb: default_max_size_mb(),
            level: default_level(),
            dir: None,
        }
    }
}

impl LogConfig {
    /// 日志目录：配置值优先，否则为 `<app_dir>/logs`
    pub fn log_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| crate::dirs::app_dir().join("logs"))
    }

    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        self.level.parse().unwrap_or(tracing::Level::INFO)
    }
}

struct RotatingState {
    file_path: PathBuf,
    max_size: u64,
    written: u64,
    writer: Option<BufWriter<File>>,
}

impl RotatingState {
    fn open(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        self.written = file.metadata()?.len();
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    /// `<name>.log` -> `<name>.log.old`，旧备份被覆盖
    fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut w) = self.writer.take() {
            let _ = w.flush();
        }
        let backup = backup_path(&self.file_path);
        if backup.exists() {
            fs::remove_file(&backup)?;
        }
        fs::rename(&self.file_path, &backup)?;
        self.open()
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > self.max_size {
            self.rotate()?;
        }
        if self.writer.is_none() {
            self.open()?;
        }
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::other("log writer not available"))?;
        let n = writer.write(buf)?;
        writer.flush()?;
        self.written += n as u64;
        Ok(n)
    }
}

fn backup_path(file_path: &Path) -> PathBuf {
    let mut name = file_path.as_os_str().to_owned();
    name.push(".old");
    PathBuf::from(name)
}

/// 带大小限制的日志写入器，超过限制时轮转为 `.old` 备份
#[derive(Clone)]
pub struct SizeRotatingWriter {
    state: Arc<Mutex<RotatingState>>,
}

impl SizeRotatingWriter {
    pub fn new(log_dir: &Path, max_size_mb: u32) -> io::Result<Self> {
        Self::with_limit(log_dir, (max_size_mb as u64) * 1024 * 1024)
    }

    /// 以字节为单位指定大小限制
    pub fn with_limit(log_dir: &Path, max_size: u64) -> io::Result<Self> {
        fs::create_dir_all(log_dir)?;

        let mut state = RotatingState {
            file_path: log_dir.join(LOG_FILE),
            max_size,
            written: 0,
            writer: None,
        };
        state.open()?;
        // 启动时已经超过限制则立即轮转
        if state.written > max_size {
            state.rotate()?;
        }

        Ok(Self {
            state: Arc::new(Mutex::new(state)),
        })
    }

    pub fn file_path(&self) -> PathBuf {
        self.lock().file_path.clone()
    }

    fn lock(&self) -> MutexGuard<'_, RotatingState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// 单次日志事件使用的写入句柄
pub struct LogWriter {
    state: Arc<Mutex<RotatingState>>,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .writer
            .as_mut()
        {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for SizeRotatingWriter {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            state: self.state.clone(),
        }
    }
}

/// 初始化全局日志：控制台（stderr）+ 可选的文件日志
///
/// `RUST_LOG` 存在时优先于配置的级别。只能在二进制入口调用一次。
pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.tracing_level().as_str().to_lowercase()))
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false);

    let file_layer = if config.enabled {
        let log_dir = config.log_dir();
        match SizeRotatingWriter::new(&log_dir, config.max_size_mb) {
            Ok(writer) => Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            ),
            Err(e) => {
                // 文件日志创建失败，只输出到控制台
                eprintln!("无法创建日志文件 {}: {}", log_dir.display(), e);
                None
            }
        }
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}
