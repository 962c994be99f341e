// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 负责将 TCP 流中读取的原始字节解析为强类型的 `Request` 结构体：
//! 1. 请求行（Request-Line）的解析（方法、路径、查询串、版本）。
//! 2. 访问日志需要的标头（`User-Agent`）的提取。
//!
//! 方法在这里只做语法识别，GET/HEAD 之外的方法交给过滤器返回 501。

use crate::{exception::Exception, param::*};
use lazy_static::lazy_static;
use log::error;
use regex::Regex;

lazy_static! {
    /// 请求行：`方法 目标 版本`。目标中允许夹杂空格，由首尾两段锚定。
    static ref REQUEST_LINE: Regex =
        Regex::new(r"^([A-Za-z]+) (.+) ([A-Za-z]+/\d\.\d)$").unwrap();
}

/// 表示一个 HTTP 请求的元数据。请求体不会被读取。
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP 请求方法
    method: HttpRequestMethod,
    /// 原始方法记号（大写），用于日志
    method_token: String,
    /// 请求路径，不含查询串
    path: String,
    /// 查询串，不含开头的 `?`
    query: String,
    /// HTTP 协议版本
    version: HttpVersion,
    /// 客户端标识字符串
    user_agent: String,
}

impl Request {
    /// 从原始字节缓冲区尝试构建 `Request` 实例。
    ///
    /// # 参数
    /// * `buffer` - 从网络 Socket 读取的原始数据。
    /// * `id` - 连接 ID，用于在多线程环境下追踪日志。
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        // 1. 将字节流转换为字符串，失败则判定为非法的 HTTP 请求
        let request_string = match std::str::from_utf8(buffer) {
            Ok(string) => string,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };
        // 只关心请求头部分
        let head = match request_string.find("\r\n\r\n") {
            Some(end) => &request_string[..end],
            None => request_string,
        };

        let request_lines: Vec<&str> = head.split(CRLF).collect();

        // 2. 解析请求行 (e.g., "GET /index.html?x=1 HTTP/1.1")
        let captures = match REQUEST_LINE.captures(request_lines[0]) {
            Some(c) => c,
            None => {
                error!("[ID{}]HTTP请求行格式不正确：{}", id, request_lines[0]);
                return Err(Exception::BadRequest);
            }
        };

        let method_token = captures[1].to_uppercase();
        let method = HttpRequestMethod::from_token(&method_token);

        let version_str = captures[3].to_uppercase();
        let version = match version_str.as_str() {
            "HTTP/1.1" => HttpVersion::V1_1,
            "HTTP/1.0" => HttpVersion::V1_0,
            _ => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, &version_str);
                return Err(Exception::UnsupportedHttpVersion);
            }
        };

        let target = &captures[2];
        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p.to_string(), q.to_string()),
            None => (target.to_string(), String::new()),
        };

        // 3. 解析 Headers，字段名大小写不敏感
        let mut user_agent = String::new();
        for line in request_lines.iter().skip(1) {
            if let Some((name, value)) = line.split_once(':') {
                if name.trim().eq_ignore_ascii_case("user-agent") {
                    user_agent = value.trim().to_string();
                }
            }
        }

        Ok(Self {
            method,
            method_token,
            path,
            query,
            version,
            user_agent,
        })
    }

    /// 以代码方式构造请求，供管线测试与基准使用
    pub fn new(method: &str, target: &str) -> Self {
        let method_token = method.to_uppercase();
        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p.to_string(), q.to_string()),
            None => (target.to_string(), String::new()),
        };
        Self {
            method: HttpRequestMethod::from_token(&method_token),
            method_token,
            path,
            query,
            version: HttpVersion::V1_1,
            user_agent: String::new(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }
}

// --- Getter 访问器实现 ---

impl Request {
    /// 获取 HTTP 协议版本
    pub fn version(&self) -> HttpVersion {
        self.version
    }

    /// 获取请求路径（不含查询参数）
    pub fn path(&self) -> &str {
        &self.path
    }

    /// 获取查询串
    pub fn query(&self) -> &str {
        &self.query
    }

    /// 获取请求方法
    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    /// 获取原始方法名
    pub fn method_token(&self) -> &str {
        &self.method_token
    }

    /// 获取用户代理字符串
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}
