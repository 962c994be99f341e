//! # 请求过滤器
//!
//! 在任何 I/O 之前校验方法与路径。判定顺序：
//! 1. 方法不是 GET/HEAD → 501（不论路径是否存在）。
//! 2. 路径无法规整 → 400。
//! 3. 文件名以 `.` 开头 → 404。
//! 4. 规整后的完整路径以任一排除后缀结尾（大小写不敏感）→ 404。

use crate::exception::Exception;
use crate::param::HttpRequestMethod;
use crate::util::{ends_with_ignore_case, is_hidden, normalize_request_path};

#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    /// 已转为小写的排除后缀，保持配置中的顺序
    exclusions: Vec<String>,
}

impl RequestFilter {
    pub fn new(exclusions: &[String]) -> Self {
        Self {
            exclusions: exclusions
                .iter()
                .filter(|e| !e.is_empty())
                .map(|e| e.to_lowercase())
                .collect(),
        }
    }

    /// 判定请求能否继续。放行时返回规整后的路径（不含开头的 `/`）。
    pub fn check(&self, method: HttpRequestMethod, raw_path: &str) -> Result<String, Exception> {
        if !method.is_allowed() {
            return Err(Exception::MethodNotAllowed);
        }
        let path = normalize_request_path(raw_path).ok_or(Exception::BadRequest)?;
        if is_hidden(&path) {
            return Err(Exception::NotFound);
        }
        if self.is_excluded(&path) {
            return Err(Exception::NotFound);
        }
        Ok(path)
    }

    /// 只做后缀判定，不含隐藏文件规则。预加载也复用这里。
    pub fn is_excluded(&self, path: &str) -> bool {
        self.exclusions
            .iter()
            .any(|ex| ends_with_ignore_case(path, ex))
    }
}
