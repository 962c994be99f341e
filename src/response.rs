use crate::param::*;

use bytes::Bytes;
use chrono::prelude::*;
use log::error;

use std::ffi::OsStr;

/// 一次请求的响应上下文。
///
/// 管线中的各阶段依次修改它；一旦 `complete` 被置位，后续阶段不得再写入。
#[derive(Debug, Clone)]
pub struct Response {
    version: HttpVersion,
    status_code: u16,
    information: String,
    content_type: Option<String>,
    content_length: u64,
    cache_control: Option<String>,
    date: DateTime<Utc>,
    server_name: Option<String>,
    content: Option<Bytes>,
    started: bool,
    complete: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            version: HttpVersion::V1_1,
            status_code: 200,
            information: "OK".to_string(),
            content_type: None,
            content_length: 0,
            cache_control: None,
            date: Utc::now(),
            server_name: None,
            content: None,
            started: false,
            complete: false,
        }
    }

    pub fn set_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = match STATUS_CODES.get(&code) {
            Some(&info) => info.to_string(),
            None => {
                error!("未登记的状态码：{}，原因短语留空", code);
                String::new()
            }
        };
        self
    }

    pub fn set_content_type(&mut self, content_type: &str) -> &mut Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    pub fn set_cache_control(&mut self, max_age: u64) -> &mut Self {
        self.cache_control = Some(format!("public, max-age={}", max_age));
        self
    }

    pub fn set_server_name(&mut self, name: &str) -> &mut Self {
        self.server_name = Some(name.to_string());
        self
    }

    pub fn set_version(&mut self, version: HttpVersion) -> &mut Self {
        self.version = version;
        self
    }

    /// 写入响应体。HEAD 请求只记录长度、不保留字节。
    ///
    /// 写入后响应即视为已开始发送，错误页响应器将不再覆盖它。
    pub fn write_body(&mut self, bytes: Bytes, headonly: bool) -> &mut Self {
        self.content_length = bytes.len() as u64;
        self.content = if headonly { None } else { Some(bytes) };
        self.started = true;
        self
    }

    /// 只声明长度、不携带响应体，供未命中缓存的 HEAD 请求使用
    pub fn write_head(&mut self, content_length: u64) -> &mut Self {
        self.content_length = content_length;
        self.content = None;
        self.started = true;
        self
    }

    /// 清除已设置的内容相关头与响应体，状态码复位为 200。`Server` 头保留。
    pub fn clear(&mut self) -> &mut Self {
        self.set_code(200);
        self.content_type = None;
        self.content_length = 0;
        self.cache_control = None;
        self.content = None;
        self
    }

    /// 标记响应完成，管线的其余阶段将跳过它
    pub fn complete(&mut self) -> &mut Self {
        self.complete = true;
        self
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        let mut header = format!(
            "{} {} {}{}",
            self.version, self.status_code, self.information, CRLF
        );
        if let Some(t) = &self.content_type {
            header.push_str(&["Content-Type: ", t, CRLF].concat());
        }
        header.push_str(&format!("Content-Length: {}{}", self.content_length, CRLF));
        if let Some(c) = &self.cache_control {
            header.push_str(&["Cache-Control: ", c, CRLF].concat());
        }
        header.push_str(&["Date: ", &format_date(&self.date), CRLF].concat());
        if let Some(s) = &self.server_name {
            header.push_str(&["Server: ", s, CRLF].concat());
        }
        header.push_str(&["Connection: close", CRLF, CRLF].concat());

        let body: &[u8] = match &self.content {
            Some(c) => c,
            None => b"",
        };
        [header.as_bytes(), body].concat()
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn cache_control(&self) -> Option<&str> {
        self.cache_control.as_deref()
    }

    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    pub fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }

    pub fn has_started(&self) -> bool {
        self.started
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc2822()
}

/// 根据扩展名查 MIME 类型，未知类型按二进制流处理
pub fn get_mime(extension: Option<&OsStr>) -> &'static str {
    extension
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .and_then(|e| MIME_TYPES.get(e.as_str()).copied())
        .unwrap_or("application/octet-stream")
}
