// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了服务器在启动与请求处理生命周期中可能出现的各类异常情况。
//!
//! ## 分类
//! - **请求级**：`BadRequest`、`MethodNotAllowed`、`NotFound` 以及请求解析阶段的
//!   `RequestIsNotUtf8`、`UnsupportedHttpVersion`。这些异常全部由错误页响应器在本地
//!   消化，绝不会越过请求边界。
//! - **启动级**：`StartupConfig`，进程在接受连接之前必须终止。
//! - **后台级**：`CachePreload` 与 `LogFlush`，记录日志后继续运行。

use std::fmt;
use std::io;

/// 服务器运行过程中发生的异常类型。
#[derive(Debug, Clone, PartialEq)]
pub enum Exception {
    /// 请求路径无法解析（非法百分号编码、空字节等）。对应 `400 Bad Request`。
    BadRequest,
    /// 客户端发送的请求字节流无法解析为合法的 UTF-8 字符串。
    RequestIsNotUtf8,
    /// 客户端使用了服务器不支持的 HTTP 协议版本。
    UnsupportedHttpVersion,
    /// 使用了 GET/HEAD 以外的方法。对应 `501 Not Implemented`。
    MethodNotAllowed,
    /// 文件不存在、隐藏文件、被排除的文件或越出根目录的路径。对应 `404 Not Found`。
    NotFound,
    /// 根目录或默认文档缺失、配置文件非法。致命错误。
    StartupConfig(String),
    /// 预加载期间单个文件读取失败。仅记录并跳过。
    CachePreload(String),
    /// 访问日志刷盘失败。本轮条目可能丢失，进程继续运行。
    LogFlush(String),
}

use Exception::*;

impl Exception {
    /// 请求级异常对应的 HTTP 状态码；启动级与后台级异常没有状态码。
    pub fn status_code(&self) -> Option<u16> {
        match self {
            BadRequest | RequestIsNotUtf8 | UnsupportedHttpVersion => Some(400),
            MethodNotAllowed => Some(501),
            NotFound => Some(404),
            StartupConfig(_) | CachePreload(_) | LogFlush(_) => None,
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BadRequest => write!(f, "Malformed request path (400)"),
            RequestIsNotUtf8 => write!(f, "Request bytes can't be parsed in UTF-8"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            MethodNotAllowed => write!(f, "Method not implemented (501)"),
            NotFound => write!(f, "File not found (404)"),
            StartupConfig(msg) => write!(f, "Startup configuration error: {}", msg),
            CachePreload(msg) => write!(f, "Cache preload warning: {}", msg),
            LogFlush(msg) => write!(f, "Access log flush failed: {}", msg),
        }
    }
}

impl std::error::Error for Exception {}

impl From<io::Error> for Exception {
    /// 刷盘路径上的 I/O 错误统一归为 `LogFlush`
    fn from(e: io::Error) -> Self {
        LogFlush(e.to_string())
    }
}
