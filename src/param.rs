// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 协议参数与常量模块
//!
//! 该模块定义了 `staticd` 遵循的 HTTP 协议相关常量和数据结构，包括：
//! - 常见的 HTTP 状态码及其原因短语（Reason Phrase）。
//! - 静态资源常用的 MIME 类型映射表。
//! - HTTP 方法与版本的强类型枚举。

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use lazy_static::lazy_static;

/// 服务器名称标识的默认值，用于 HTTP 响应头的 `Server` 字段以及访问日志头部
pub const DEFAULT_SERVER_NAME: &str = concat!("staticd/", env!("CARGO_PKG_VERSION"));

/// HTTP 协议规定的换行符（Carriage Return Line Feed）
pub const CRLF: &str = "\r\n";

/// 单个请求头允许的最大字节数，超出部分直接丢弃
pub const MAX_REQUEST_HEAD: usize = 8192;

/// 惰性准入的默认大小阈值：小于该值的文件在首次未命中后会被放入缓存
pub const DEFAULT_CACHE_THRESHOLD: u64 = 1024 * 1024;

/// 停机时等待在途连接处理完毕的上限
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// 访问日志文件头中 `#Fields` 行所声明的字段顺序
pub const LOG_FIELDS: &str =
    "date time cs-method cs-uri-stem cs-uri-query sc-status sc-bytes c-ip cs(User-Agent)";

lazy_static! {
    /// 服务器允许处理的 HTTP 方法列表。
    ///
    /// 不在该列表中的方法一律触发 501 Not Implemented。
    pub static ref ALLOWED_METHODS: Vec<HttpRequestMethod> = {
        vec![HttpRequestMethod::Get, HttpRequestMethod::Head]
    };
}

lazy_static! {
    /// HTTP 状态码与其对应的标准原因短语映射表。
    ///
    /// 参考标准：[RFC 9110: HTTP Semantics](https://www.rfc-editor.org/rfc/rfc9110.html)。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        // 2xx: 成功响应 (Successful)
        map.insert(200, "OK");
        map.insert(204, "No Content");

        // 3xx: 重定向 (Redirection)
        map.insert(301, "Moved Permanently");
        map.insert(304, "Not Modified");

        // 4xx: 客户端错误 (Client Error)
        map.insert(400, "Bad Request");
        map.insert(403, "Forbidden");
        map.insert(404, "Not Found");
        map.insert(405, "Method Not Allowed");
        map.insert(408, "Request Timeout");
        map.insert(413, "Content Too Large");
        map.insert(414, "URI Too Long");

        // 5xx: 服务端错误 (Server Error)
        map.insert(500, "Internal Server Error");
        map.insert(501, "Not Implemented");
        map.insert(503, "Service Unavailable");
        map.insert(505, "HTTP Version Not Supported");
        map
    };
}

lazy_static! {
    /// 文件后缀名到 MIME 类型的映射表。
    ///
    /// 只覆盖静态站点最常见的类型，其余一律按 `application/octet-stream` 返回。
    pub static ref MIME_TYPES: HashMap<&'static str, &'static str> = {
        let mut map = HashMap::new();
        map.insert("css", "text/css;charset=utf-8");
        map.insert("csv", "text/csv");
        map.insert("gif", "image/gif");
        map.insert("htm", "text/html;charset=utf-8");
        map.insert("html", "text/html;charset=utf-8");
        map.insert("ico", "image/vnd.microsoft.icon");
        map.insert("jpeg", "image/jpeg");
        map.insert("jpg", "image/jpeg");
        map.insert("js", "text/javascript;charset=utf-8");
        map.insert("json", "application/json");
        map.insert("mjs", "text/javascript;charset=utf-8");
        map.insert("mp4", "video/mp4");
        map.insert("pdf", "application/pdf");
        map.insert("png", "image/png");
        map.insert("svg", "image/svg+xml");
        map.insert("txt", "text/plain;charset=utf-8");
        map.insert("wasm", "application/wasm");
        map.insert("webp", "image/webp");
        map.insert("woff", "font/woff");
        map.insert("woff2", "font/woff2");
        map.insert("xml", "application/xml");
        map.insert("zip", "application/zip");
        map
    };
}

/// 支持的 HTTP 协议版本
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpVersion {
    /// HTTP/1.0 版本
    V1_0,
    /// HTTP/1.1 版本
    V1_1,
}

/// HTTP 请求方法
///
/// 解析阶段接受任意方法记号，是否允许处理由请求过滤器决定。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpRequestMethod {
    Get,
    Head,
    Options,
    Post,
    Put,
    Delete,
    Patch,
    Trace,
    Connect,
    /// 无法识别的扩展方法
    Other,
}

impl HttpRequestMethod {
    /// 根据（已转为大写的）方法记号构造枚举值
    pub fn from_token(token: &str) -> Self {
        match token {
            "GET" => HttpRequestMethod::Get,
            "HEAD" => HttpRequestMethod::Head,
            "OPTIONS" => HttpRequestMethod::Options,
            "POST" => HttpRequestMethod::Post,
            "PUT" => HttpRequestMethod::Put,
            "DELETE" => HttpRequestMethod::Delete,
            "PATCH" => HttpRequestMethod::Patch,
            "TRACE" => HttpRequestMethod::Trace,
            "CONNECT" => HttpRequestMethod::Connect,
            _ => HttpRequestMethod::Other,
        }
    }

    pub fn is_allowed(&self) -> bool {
        ALLOWED_METHODS.contains(self)
    }
}

impl fmt::Display for HttpVersion {
    /// 将枚举格式化为 HTTP 报文中的版本字符串
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpVersion::V1_0 => write!(f, "HTTP/1.0"),
            HttpVersion::V1_1 => write!(f, "HTTP/1.1"),
        }
    }
}

impl fmt::Display for HttpRequestMethod {
    /// 将枚举格式化为 HTTP 标准大写方法名
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpRequestMethod::Get => write!(f, "GET"),
            HttpRequestMethod::Head => write!(f, "HEAD"),
            HttpRequestMethod::Options => write!(f, "OPTIONS"),
            HttpRequestMethod::Post => write!(f, "POST"),
            HttpRequestMethod::Put => write!(f, "PUT"),
            HttpRequestMethod::Delete => write!(f, "DELETE"),
            HttpRequestMethod::Patch => write!(f, "PATCH"),
            HttpRequestMethod::Trace => write!(f, "TRACE"),
            HttpRequestMethod::Connect => write!(f, "CONNECT"),
            HttpRequestMethod::Other => write!(f, "-"),
        }
    }
}
