//! # 错误页响应器
//!
//! 在错误页目录下查找 `{状态码}.html`，找到则以 `text/html` 返回其内容，
//! 否则返回纯文本 `An error occurred: {状态码}`。无论哪种情况都会把响应标记为完成。

use crate::response::Response;

use bytes::Bytes;
use log::{debug, warn};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ErrorResponder {
    pages: PathBuf,
}

impl ErrorResponder {
    pub fn new(pages: &Path) -> Self {
        Self {
            pages: pages.to_path_buf(),
        }
    }

    pub fn page_path(&self, code: u16) -> PathBuf {
        self.pages.join(format!("{}.html", code))
    }

    /// 用错误页终结响应。响应已经开始发送时什么也不做。
    pub fn respond(&self, response: &mut Response, code: u16, headonly: bool) {
        if response.has_started() || response.is_complete() {
            debug!("响应已开始发送，放弃写入{}错误页", code);
            return;
        }
        response.clear();
        response.set_code(code);
        match fs::read(self.page_path(code)) {
            Ok(page) => {
                response
                    .set_content_type("text/html")
                    .write_body(Bytes::from(page), headonly);
            }
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("无法读取错误页{}：{}", self.page_path(code).display(), e);
                }
                response
                    .set_content_type("text/plain;charset=utf-8")
                    .write_body(Bytes::from(format!("An error occurred: {}", code)), headonly);
            }
        }
        response.complete();
    }
}
