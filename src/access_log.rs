// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 访问日志
//!
//! 请求处理任务只调用 [`AccessLogBuffer::append`]，它在互斥锁内把格式化好的行
//! 推入内存缓冲，从不碰磁盘。刷盘时在锁内把缓冲整体换成空的，释放锁后再做文件 I/O。
//!
//! 日志文件名为 `{name}-{yyyy-MM-dd}.log`（UTC 日期）。当前文件达到大小上限时，
//! 下一次刷盘先把它改名为 `{name}-{yyyy-MM-dd}-{HH-mm-ss}.log`，再写入新文件。
//! 每个新文件先写一段 `#` 开头的文件头。
//!
//! [`FlushWorker`] 按固定间隔触发刷盘，关闭时做最后一次同步刷盘。

use crate::config::Config;
use crate::exception::Exception;
use crate::param::LOG_FIELDS;

use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// 一条访问记录
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub query: String,
    pub status: u16,
    pub bytes: u64,
    pub client: String,
    pub user_agent: String,
}

impl LogEntry {
    /// 渲染为一行，字段以单个空格分隔，顺序与文件头 `#Fields` 一致
    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {} {} {} {} {} {}",
            self.timestamp.format("%Y-%m-%d"),
            self.timestamp.format("%H:%M:%S"),
            field(&self.method),
            field(&self.path),
            field(&self.query),
            self.status,
            self.bytes,
            field(&self.client),
            field(&self.user_agent),
        )
    }
}

/// 空字段写作 `-`；空白与控制字符替换为 `+`，保证一条记录只占一行
fn field(value: &str) -> String {
    if value.is_empty() {
        return "-".to_string();
    }
    value
        .chars()
        .map(|c| if c.is_whitespace() || c.is_control() { '+' } else { c })
        .collect()
}

pub struct AccessLogBuffer {
    buffer: Mutex<Vec<String>>,
    flush_lock: Mutex<()>,
    directory: PathBuf,
    name: String,
    size_limit: u64,
    software: String,
}

impl AccessLogBuffer {
    pub fn new(directory: &Path, name: &str, size_limit: u64, software: &str) -> Self {
        Self {
            buffer: Mutex::new(Vec::new()),
            flush_lock: Mutex::new(()),
            directory: directory.to_path_buf(),
            name: name.to_string(),
            size_limit,
            software: software.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.log_directory(),
            config.log_name(),
            config.log_file_size_limit(),
            config.server_name(),
        )
    }

    pub fn append(&self, entry: &LogEntry) {
        let line = entry.to_line();
        self.buffer_lock().push(line);
    }

    /// 尚未刷盘的条目数
    pub fn pending(&self) -> usize {
        self.buffer_lock().len()
    }

    pub fn flush(&self) -> Result<usize, Exception> {
        self.flush_at(Utc::now())
    }

    /// 以给定时刻选择日志文件并刷盘，返回写入的行数。
    ///
    /// 所有刷盘都经过 `flush_lock` 串行化。失败时本轮条目丢弃，缓冲本身不受影响。
    pub fn flush_at(&self, now: DateTime<Utc>) -> Result<usize, Exception> {
        let _serial = match self.flush_lock.lock() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!("刷盘锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        };
        let lines = mem::take(&mut *self.buffer_lock());
        if lines.is_empty() {
            return Ok(0);
        }

        fs::create_dir_all(&self.directory)?;
        let path = self.select_file(now)?;
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = BufWriter::with_capacity(65536, file);
        for line in &lines {
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        debug!("已向{}写入{}条访问日志", path.display(), lines.len());
        Ok(lines.len())
    }

    /// 当前日期对应的活动日志文件路径
    pub fn active_path(&self, now: DateTime<Utc>) -> PathBuf {
        self.directory
            .join(format!("{}-{}.log", self.name, now.format("%Y-%m-%d")))
    }

    /// 确定本次写入的文件：不存在则新建并写文件头；达到上限则先改名再新建。
    fn select_file(&self, now: DateTime<Utc>) -> Result<PathBuf, Exception> {
        let path = self.active_path(now);
        match fs::metadata(&path) {
            Ok(meta) if meta.len() >= self.size_limit => {
                let rotated = self.rotated_path(now);
                fs::rename(&path, &rotated)?;
                debug!("日志文件{}已轮转为{}", path.display(), rotated.display());
                self.write_header(&path, now)?;
            }
            Ok(_) => {}
            Err(_) => self.write_header(&path, now)?,
        }
        Ok(path)
    }

    fn rotated_path(&self, now: DateTime<Utc>) -> PathBuf {
        let stem = format!(
            "{}-{}-{}",
            self.name,
            now.format("%Y-%m-%d"),
            now.format("%H-%M-%S")
        );
        let mut candidate = self.directory.join(format!("{}.log", stem));
        let mut n = 1;
        // 同一秒内多次轮转
        while candidate.exists() {
            candidate = self.directory.join(format!("{}-{}.log", stem, n));
            n += 1;
        }
        candidate
    }

    fn write_header(&self, path: &Path, now: DateTime<Utc>) -> Result<(), Exception> {
        let header = format!(
            "#Software: {}\n#Version: 1.0\n#Date: {}\n#Fields: {}\n",
            self.software,
            now.format("%Y-%m-%d %H:%M:%S"),
            LOG_FIELDS
        );
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        file.write_all(header.as_bytes())?;
        Ok(())
    }

    fn buffer_lock(&self) -> MutexGuard<'_, Vec<String>> {
        match self.buffer.lock() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!("访问日志缓冲锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        }
    }
}

/// 后台刷盘任务的句柄。
///
/// `shutdown` 消耗句柄本身，最后一次刷盘因此只会发生一次。
pub struct FlushWorker {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl FlushWorker {
    /// 在当前 tokio 运行时上启动定时刷盘
    pub fn spawn(buffer: Arc<AccessLogBuffer>, interval: Duration) -> Self {
        let (stop, mut stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // interval 的第一次 tick 立即完成
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => flush_blocking(&buffer).await,
                    _ = &mut stopped => break,
                }
            }
            flush_blocking(&buffer).await;
            debug!("访问日志刷盘任务已退出");
        });
        Self { stop, handle }
    }

    /// 停止定时器并等待最后一次刷盘完成
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.handle.await {
            error!("访问日志刷盘任务异常退出：{}", e);
        }
    }
}

async fn flush_blocking(buffer: &Arc<AccessLogBuffer>) {
    let buffer = Arc::clone(buffer);
    match tokio::task::spawn_blocking(move || buffer.flush()).await {
        Ok(Ok(0)) => {}
        Ok(Ok(n)) => debug!("定时刷盘完成，{}条", n),
        Ok(Err(e)) => error!("{}", e),
        Err(e) => error!("刷盘线程异常：{}", e),
    }
}
