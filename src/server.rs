// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 服务端
//!
//! [`App`] 在启动时显式构造所有组件并完成预加载；[`run`] 负责接收连接，
//! 每个连接一个 tokio 任务，管线本身在阻塞线程池上执行。

use crate::access_log::{AccessLogBuffer, LogEntry};
use crate::cache::FileCache;
use crate::config::Config;
use crate::error_page::ErrorResponder;
use crate::exception::Exception;
use crate::filter::RequestFilter;
use crate::param::{MAX_REQUEST_HEAD, SHUTDOWN_GRACE};
use crate::pipeline::{
    AccessLogStage, Context, FilterStage, Pipeline, ServerHeaderStage, StaticFileStage,
};
use crate::reader::{DiskReader, FileReader};
use crate::request::Request;
use crate::resolver::PathResolver;
use crate::response::Response;

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

use std::fs;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub struct App {
    config: Config,
    pipeline: Pipeline,
    cache: Arc<FileCache>,
    access_log: Arc<AccessLogBuffer>,
    errors: ErrorResponder,
    active_connections: AtomicU32,
}

impl App {
    pub fn build(config: Config) -> Result<Self, Exception> {
        Self::build_with_reader(config, Arc::new(DiskReader))
    }

    /// 构造全部组件并预加载缓存。默认文档读取失败时返回 `StartupConfig`。
    pub fn build_with_reader(config: Config, reader: Arc<dyn FileReader>) -> Result<Self, Exception> {
        config.validate()?;
        fs::create_dir_all(config.log_directory()).map_err(|e| {
            Exception::StartupConfig(format!(
                "无法创建日志目录{}：{}",
                config.log_directory().display(),
                e
            ))
        })?;

        let resolver = PathResolver::new(config.www_root(), config.default_document())?;
        info!("www root: {}", resolver.root().display());
        let errors = ErrorResponder::new(config.error_pages());
        let filter = RequestFilter::new(config.no_serve());

        let cache = Arc::new(FileCache::from_capacity(
            config.cache_size(),
            config.cache_threshold(),
        ));
        let preload_exclusions: Vec<String> = config
            .no_serve()
            .iter()
            .chain(config.no_cache())
            .cloned()
            .collect();
        cache.preload(&resolver, &RequestFilter::new(&preload_exclusions), reader.as_ref())?;

        let access_log = Arc::new(AccessLogBuffer::from_config(&config));

        let pipeline = Pipeline::new(errors.clone())
            .stage(AccessLogStage::new(Arc::clone(&access_log)))
            .stage(ServerHeaderStage::new(config.server_name()))
            .stage(FilterStage::new(filter.clone(), errors.clone()))
            .stage(StaticFileStage::new(
                resolver,
                filter,
                Arc::clone(&cache),
                reader,
                errors.clone(),
                config.cache_control_max_age(),
            ));
        info!("请求管线已配置，共{}个阶段", pipeline.len());

        Ok(Self {
            config,
            pipeline,
            cache,
            access_log,
            errors,
            active_connections: AtomicU32::new(0),
        })
    }

    /// 让一个已解析的请求走完管线
    pub fn handle(&self, id: u128, request: Request, remote_addr: &str) -> Response {
        let mut ctx = Context::new(id, request, remote_addr);
        self.pipeline.run(&mut ctx);
        ctx.response
    }

    /// 请求头无法解析时直接返回错误页，并照常记一条访问日志
    pub fn handle_malformed(&self, id: u128, e: &Exception, remote_addr: &str) -> Response {
        let mut response = Response::new();
        response.set_server_name(self.config.server_name());
        self.errors
            .respond(&mut response, e.status_code().unwrap_or(400), false);
        self.access_log.append(&LogEntry {
            timestamp: Utc::now(),
            method: String::new(),
            path: String::new(),
            query: String::new(),
            status: response.status_code(),
            bytes: response.content_length(),
            client: remote_addr.to_string(),
            user_agent: String::new(),
        });
        response
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &Arc<FileCache> {
        &self.cache
    }

    pub fn access_log(&self) -> &Arc<AccessLogBuffer> {
        &self.access_log
    }

    pub fn active_connections(&self) -> u32 {
        self.active_connections.load(Ordering::Relaxed)
    }
}

/// 接收连接直到 `shutdown` 完成，然后等待已接收的连接全部处理完再返回。
///
/// 返回后调用方即可做最后一次日志刷盘：此时不会再有访问日志追加。
/// 等待超过 [`SHUTDOWN_GRACE`] 的连接会被中止。
pub async fn run<F>(listener: TcpListener, app: Arc<App>, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut connections = JoinSet::new();
    let mut id: u128 = 0;

    loop {
        let (mut stream, addr) = tokio::select! {
            _ = &mut shutdown => {
                info!("主循环接收到停机指令，正在退出...");
                break;
            }
            Some(finished) = connections.join_next() => {
                if let Err(e) = finished {
                    error!("连接处理任务异常退出：{}", e);
                }
                continue;
            }
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("接受连接失败：{}", e);
                    continue;
                }
            },
        };
        debug!("[ID{}]TCP连接已建立：{}", id, addr);

        let app = Arc::clone(&app);
        let conn_id = id;
        connections.spawn(async move {
            app.active_connections.fetch_add(1, Ordering::Relaxed);
            handle_connection(&mut stream, conn_id, addr, &app).await;
            app.active_connections.fetch_sub(1, Ordering::Relaxed);
        });
        id += 1;
    }

    // 不再接收新连接
    drop(listener);
    if !connections.is_empty() {
        info!("等待{}个连接处理完毕", connections.len());
    }
    let drain = async {
        while let Some(finished) = connections.join_next().await {
            if let Err(e) = finished {
                error!("连接处理任务异常退出：{}", e);
            }
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!("连接在{}秒内未处理完，强制中止", SHUTDOWN_GRACE.as_secs());
        connections.shutdown().await;
    }
}

/// # 连接处理器
///
/// 读取一个请求头、执行管线、写回响应。客户端中途断开时放弃剩余写入；
/// 访问日志在管线内已经记录。
async fn handle_connection(stream: &mut TcpStream, id: u128, addr: SocketAddr, app: &Arc<App>) {
    let buffer = match read_head(stream).await {
        Ok(Some(b)) => b,
        Ok(None) => {
            debug!("[ID{}]客户端未发送数据即关闭连接", id);
            return;
        }
        Err(e) => {
            error!("[ID{}]读取TCPStream时遇到错误: {}", id, e);
            return;
        }
    };
    let remote = addr.ip().to_string();

    let job_app = Arc::clone(app);
    let job = tokio::task::spawn_blocking(move || match Request::try_from(&buffer, id) {
        Ok(request) => job_app.handle(id, request, &remote),
        Err(e) => {
            warn!("[ID{}]解析HTTP请求失败: {}", id, e);
            job_app.handle_malformed(id, &e, &remote)
        }
    });
    let response = match job.await {
        Ok(r) => r,
        Err(e) => {
            error!("[ID{}]请求处理线程异常：{}", id, e);
            return;
        }
    };

    let response_bytes = response.as_bytes();
    debug!("[ID{}]发送响应，长度: {}", id, response_bytes.len());
    if let Err(e) = stream.write_all(&response_bytes).await {
        debug!("[ID{}]客户端已断开，放弃写入：{}", id, e);
        return;
    }
    let _ = stream.flush().await;
    let _ = stream.shutdown().await;
}

/// 读到空行为止；超过上限的部分不再读取。连接直接关闭时返回 `None`。
async fn read_head(stream: &mut TcpStream) -> std::io::Result<Option<Vec<u8>>> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(if buffer.is_empty() { None } else { Some(buffer) });
        }
        buffer.extend_from_slice(&chunk[..n]);
        if buffer.windows(4).any(|w| w == b"\r\n\r\n") || buffer.len() >= MAX_REQUEST_HEAD {
            buffer.truncate(MAX_REQUEST_HEAD);
            return Ok(Some(buffer));
        }
    }
}
