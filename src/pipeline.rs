// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 请求处理管线
//!
//! 管线是一个有序的阶段列表。每个阶段拿到请求上下文和一个 [`Next`]，
//! 调用 `next.run(ctx)` 把控制交给后一个阶段，不调用则短路。
//!
//! 标准顺序：访问日志 → `Server` 头 → 请求过滤 → 静态文件。
//! 走完全部阶段仍未完成的响应按 404 处理。

use crate::access_log::{AccessLogBuffer, LogEntry};
use crate::cache::{cache_key, FileCache};
use crate::error_page::ErrorResponder;
use crate::filter::RequestFilter;
use crate::param::HttpRequestMethod;
use crate::reader::FileReader;
use crate::request::Request;
use crate::resolver::PathResolver;
use crate::response::{get_mime, Response};
use crate::util::{is_hidden, normalize_request_path};

use bytes::Bytes;
use chrono::Utc;
use log::{debug, error, warn};

use std::io;
use std::sync::Arc;

/// 单个请求在管线中流转的上下文
pub struct Context {
    pub id: u128,
    pub request: Request,
    pub response: Response,
    pub remote_addr: String,
    /// 过滤器放行后写入的规整路径
    pub path: Option<String>,
}

impl Context {
    pub fn new(id: u128, request: Request, remote_addr: &str) -> Self {
        let mut response = Response::new();
        response.set_version(request.version());
        Self {
            id,
            request,
            response,
            remote_addr: remote_addr.to_string(),
            path: None,
        }
    }

    pub fn headonly(&self) -> bool {
        self.request.method() == HttpRequestMethod::Head
    }
}

pub trait Stage: Send + Sync {
    fn handle(&self, ctx: &mut Context, next: Next<'_>);
}

/// 指向剩余阶段的续体
pub struct Next<'a> {
    stages: &'a [Box<dyn Stage>],
    errors: &'a ErrorResponder,
}

impl Next<'_> {
    pub fn run(self, ctx: &mut Context) {
        match self.stages.split_first() {
            Some((stage, rest)) => stage.handle(
                ctx,
                Next {
                    stages: rest,
                    errors: self.errors,
                },
            ),
            None => {
                if !ctx.response.is_complete() {
                    debug!("[ID{}]没有阶段处理该请求，返回404", ctx.id);
                    let headonly = ctx.headonly();
                    self.errors.respond(&mut ctx.response, 404, headonly);
                }
            }
        }
    }
}

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    errors: ErrorResponder,
}

impl Pipeline {
    pub fn new(errors: ErrorResponder) -> Self {
        Self {
            stages: Vec::new(),
            errors,
        }
    }

    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn run(&self, ctx: &mut Context) {
        Next {
            stages: &self.stages,
            errors: &self.errors,
        }
        .run(ctx)
    }
}

/// 在后续阶段完成后记录一条访问日志
pub struct AccessLogStage {
    log: Arc<AccessLogBuffer>,
}

impl AccessLogStage {
    pub fn new(log: Arc<AccessLogBuffer>) -> Self {
        Self { log }
    }
}

impl Stage for AccessLogStage {
    fn handle(&self, ctx: &mut Context, next: Next<'_>) {
        let timestamp = Utc::now();
        next.run(ctx);
        let entry = LogEntry {
            timestamp,
            method: ctx.request.method_token().to_string(),
            path: ctx.request.path().to_string(),
            query: ctx.request.query().to_string(),
            status: ctx.response.status_code(),
            bytes: ctx.response.content().map_or(0, |c| c.len() as u64),
            client: ctx.remote_addr.clone(),
            user_agent: ctx.request.user_agent().to_string(),
        };
        self.log.append(&entry);
    }
}

/// 为每个响应加上 `Server` 头
pub struct ServerHeaderStage {
    server_name: String,
}

impl ServerHeaderStage {
    pub fn new(server_name: &str) -> Self {
        Self {
            server_name: server_name.to_string(),
        }
    }
}

impl Stage for ServerHeaderStage {
    fn handle(&self, ctx: &mut Context, next: Next<'_>) {
        ctx.response.set_server_name(&self.server_name);
        next.run(ctx);
    }
}

pub struct FilterStage {
    filter: RequestFilter,
    errors: ErrorResponder,
}

impl FilterStage {
    pub fn new(filter: RequestFilter, errors: ErrorResponder) -> Self {
        Self { filter, errors }
    }
}

impl Stage for FilterStage {
    fn handle(&self, ctx: &mut Context, next: Next<'_>) {
        match self.filter.check(ctx.request.method(), ctx.request.path()) {
            Ok(path) => {
                ctx.path = Some(path);
                next.run(ctx);
            }
            Err(e) => {
                warn!("[ID{}]请求{} {}被拒绝：{}", ctx.id, ctx.request.method_token(), ctx.request.path(), e);
                let headonly = ctx.headonly();
                self.errors
                    .respond(&mut ctx.response, e.status_code().unwrap_or(500), headonly);
            }
        }
    }
}

/// 终端阶段：解析路径，先查缓存，未命中再读盘
pub struct StaticFileStage {
    resolver: PathResolver,
    filter: RequestFilter,
    cache: Arc<FileCache>,
    reader: Arc<dyn FileReader>,
    errors: ErrorResponder,
    max_age: u64,
}

impl StaticFileStage {
    pub fn new(
        resolver: PathResolver,
        filter: RequestFilter,
        cache: Arc<FileCache>,
        reader: Arc<dyn FileReader>,
        errors: ErrorResponder,
        max_age: u64,
    ) -> Self {
        Self {
            resolver,
            filter,
            cache,
            reader,
            errors,
            max_age,
        }
    }

    /// 实际将要提供的文件是否被隐藏或排除规则拦截。
    ///
    /// 目录替换为默认文档、符号链接指向别的文件时，请求路径与文件不一致，
    /// 所以按规范路径再判定一次。根目录的默认文档不受排除列表约束。
    fn is_blocked(&self, resolved: &std::path::Path) -> bool {
        let relative = self.resolver.relative(resolved);
        if relative == self.resolver.default_document() {
            return false;
        }
        is_hidden(&relative) || self.filter.is_excluded(&relative)
    }

    /// 读取并按大小决定是否准入可淘汰层
    fn load(&self, id: u128, key: &str, path: &std::path::Path) -> io::Result<Bytes> {
        let bytes = self.reader.read(path)?;
        if self.cache.should_cache(bytes.len() as u64) {
            self.cache.admit(key, bytes.clone(), false);
            debug!("[ID{}]文件已加入缓存", id);
        } else {
            debug!("[ID{}]文件过大({} bytes)，跳过缓存", id, bytes.len());
        }
        Ok(bytes)
    }
}

impl Stage for StaticFileStage {
    fn handle(&self, ctx: &mut Context, _next: Next<'_>) {
        let id = ctx.id;
        let headonly = ctx.headonly();
        let path = match ctx.path.clone().or_else(|| normalize_request_path(ctx.request.path())) {
            Some(p) => p,
            None => {
                self.errors.respond(&mut ctx.response, 400, headonly);
                return;
            }
        };
        let resolved = match self.resolver.resolve(&path) {
            Ok(p) => p,
            Err(e) => {
                debug!("[ID{}]路径{}解析失败：{}", id, path, e);
                self.errors.respond(&mut ctx.response, 404, headonly);
                return;
            }
        };
        if self.is_blocked(&resolved) {
            debug!("[ID{}]{}被隐藏或排除规则拦截", id, resolved.display());
            self.errors.respond(&mut ctx.response, 404, headonly);
            return;
        }
        let key = cache_key(&resolved);

        let body = match self.cache.lookup(&key) {
            Some(bytes) => {
                debug!("[ID{}]缓存命中：{}", id, key);
                Some(bytes)
            }
            None if headonly => {
                debug!("[ID{}]缓存未命中，HEAD请求只读取大小", id);
                match self.reader.file_size(&resolved) {
                    Ok(len) => {
                        ctx.response.write_head(len);
                        None
                    }
                    Err(e) => return self.fail(ctx, &resolved, e),
                }
            }
            None => {
                debug!("[ID{}]缓存未命中，读取文件：{}", id, key);
                match self.load(id, &key, &resolved) {
                    Ok(bytes) => Some(bytes),
                    Err(e) => return self.fail(ctx, &resolved, e),
                }
            }
        };

        ctx.response
            .set_code(200)
            .set_content_type(get_mime(resolved.extension()))
            .set_cache_control(self.max_age);
        if let Some(bytes) = body {
            ctx.response.write_body(bytes, headonly);
        }
        ctx.response.complete();
    }
}

impl StaticFileStage {
    fn fail(&self, ctx: &mut Context, path: &std::path::Path, e: io::Error) {
        let headonly = ctx.headonly();
        if e.kind() == io::ErrorKind::NotFound {
            debug!("[ID{}]文件{}已不存在", ctx.id, path.display());
            self.errors.respond(&mut ctx.response, 404, headonly);
        } else {
            error!("[ID{}]无法读取文件{}：{}", ctx.id, path.display(), e);
            self.errors.respond(&mut ctx.response, 500, headonly);
        }
    }
}
