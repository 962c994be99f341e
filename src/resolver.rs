//! # 路径解析
//!
//! 把过滤器放行的请求路径映射为根目录内的规范绝对路径。
//! 根目录约束在规范化（解析 `..` 与符号链接）之后按路径分量检查，
//! 越界一律视为 404。

use crate::exception::Exception;

use log::warn;

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct PathResolver {
    /// 规范化后的根目录
    root: PathBuf,
    default_document: String,
}

impl PathResolver {
    pub fn new(root: &Path, default_document: &str) -> Result<Self, Exception> {
        let root = fs::canonicalize(root).map_err(|e| {
            Exception::StartupConfig(format!("无法规范化根目录{}：{}", root.display(), e))
        })?;
        Ok(Self {
            root,
            default_document: default_document.to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn default_document(&self) -> &str {
        &self.default_document
    }

    /// 默认文档的（未规范化）路径
    pub fn default_document_path(&self) -> PathBuf {
        self.root.join(&self.default_document)
    }

    /// 解析规整后的请求路径。空路径替换为默认文档；目录解析为其下的默认文档。
    pub fn resolve(&self, path: &str) -> Result<PathBuf, Exception> {
        let relative = match path {
            "" | "/" => self.default_document.as_str(),
            p => p,
        };
        let canonical = self.confine(&self.root.join(relative))?;
        if canonical.is_dir() {
            let index = self.confine(&canonical.join(&self.default_document))?;
            return if index.is_file() {
                Ok(index)
            } else {
                Err(Exception::NotFound)
            };
        }
        if !canonical.is_file() {
            return Err(Exception::NotFound);
        }
        Ok(canonical)
    }

    /// 根目录内路径的相对形式，以 `/` 分隔。隐藏文件与排除列表按它判定。
    pub fn relative(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// 规范化并确认结果仍在根目录内
    fn confine(&self, candidate: &Path) -> Result<PathBuf, Exception> {
        let canonical = fs::canonicalize(candidate).map_err(|_| Exception::NotFound)?;
        if !canonical.starts_with(&self.root) {
            warn!(
                "路径{}规范化后为{}，越出根目录，按404处理",
                candidate.display(),
                canonical.display()
            );
            return Err(Exception::NotFound);
        }
        Ok(canonical)
    }
}
