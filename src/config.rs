use log::warn;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use std::fs;
use std::path::{Path, PathBuf};

use crate::exception::Exception;
use crate::param::{DEFAULT_CACHE_THRESHOLD, DEFAULT_SERVER_NAME};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    www_root: PathBuf,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_local")]
    local: bool,
    #[serde(default)]
    worker_threads: usize,
    #[serde(default = "default_document")]
    default_document: String,
    #[serde(default = "default_error_pages")]
    error_pages: PathBuf,
    #[serde(default)]
    no_serve: Vec<String>,
    #[serde(default)]
    no_cache: Vec<String>,
    #[serde(default = "default_cache_size")]
    cache_size: usize,
    #[serde(default = "default_cache_threshold")]
    cache_threshold: u64,
    #[serde(default = "default_cache_control_max_age")]
    cache_control_max_age: u64,
    #[serde(default = "default_log_directory")]
    log_directory: PathBuf,
    #[serde(default = "default_log_name")]
    log_name: String,
    #[serde(default = "default_log_flush_interval")]
    log_flush_interval: u64,
    #[serde(default = "default_log_file_size_limit")]
    log_file_size_limit: u64,
    #[serde(default = "default_server_name")]
    server_name: String,
}

fn default_port() -> u16 {
    7878
}

fn default_local() -> bool {
    true
}

fn default_document() -> String {
    "index.html".to_string()
}

fn default_error_pages() -> PathBuf {
    PathBuf::from("errorpages")
}

fn default_cache_size() -> usize {
    128
}

fn default_cache_threshold() -> u64 {
    DEFAULT_CACHE_THRESHOLD
}

fn default_cache_control_max_age() -> u64 {
    3600
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_name() -> String {
    "staticd_w3c".to_string()
}

fn default_log_flush_interval() -> u64 {
    300
}

fn default_log_file_size_limit() -> u64 {
    52428800 // 50MB
}

fn default_server_name() -> String {
    DEFAULT_SERVER_NAME.to_string()
}

impl Config {
    /// 以给定根目录构造一份全部取默认值的配置
    pub fn new(www_root: impl Into<PathBuf>) -> Self {
        Self {
            www_root: www_root.into(),
            port: default_port(),
            local: default_local(),
            worker_threads: 0,
            default_document: default_document(),
            error_pages: default_error_pages(),
            no_serve: Vec::new(),
            no_cache: Vec::new(),
            cache_size: default_cache_size(),
            cache_threshold: default_cache_threshold(),
            cache_control_max_age: default_cache_control_max_age(),
            log_directory: default_log_directory(),
            log_name: default_log_name(),
            log_flush_interval: default_log_flush_interval(),
            log_file_size_limit: default_log_file_size_limit(),
            server_name: default_server_name(),
        }
    }

    pub fn from_toml(filename: impl AsRef<Path>) -> Result<Self, Exception> {
        let filename = filename.as_ref();
        let str_val = fs::read_to_string(filename).map_err(|e| {
            Exception::StartupConfig(format!("无法读取配置文件{}：{}", filename.display(), e))
        })?;
        Self::from_toml_str(&str_val)
    }

    pub fn from_toml_str(str_val: &str) -> Result<Self, Exception> {
        let mut raw_config: Config = toml::from_str(str_val)
            .map_err(|e| Exception::StartupConfig(format!("配置文件格式错误：{}", e)))?;
        if raw_config.worker_threads == 0 {
            raw_config.worker_threads = num_cpus::get();
        }
        if raw_config.cache_size == 0 {
            warn!("cache_size被设置为0，但可淘汰缓存层不能为空，因此该值将被改为{}。", default_cache_size());
            raw_config.cache_size = default_cache_size();
        }
        raw_config.validate()?;
        Ok(raw_config)
    }

    /// 启动前的配置校验，任何一项失败都是致命错误
    pub fn validate(&self) -> Result<(), Exception> {
        if !self.www_root.is_dir() {
            return Err(Exception::StartupConfig(format!(
                "www_root {} 不存在或不是目录",
                self.www_root.display()
            )));
        }
        let doc = &self.default_document;
        if doc.is_empty() || doc.starts_with('.') || doc.contains('/') || doc.contains('\\') {
            return Err(Exception::StartupConfig(format!(
                "default_document {:?} 必须是一个非隐藏的文件名",
                doc
            )));
        }
        if self.log_flush_interval == 0 {
            return Err(Exception::StartupConfig(
                "log_flush_interval 必须大于0".to_string(),
            ));
        }
        if self.log_file_size_limit == 0 {
            return Err(Exception::StartupConfig(
                "log_file_size_limit 必须大于0".to_string(),
            ));
        }
        Ok(())
    }
}

// 链式修改，供测试与基准使用
impl Config {
    pub fn with_no_serve(mut self, patterns: &[&str]) -> Self {
        self.no_serve = patterns.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_no_cache(mut self, patterns: &[&str]) -> Self {
        self.no_cache = patterns.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_error_pages(mut self, dir: impl Into<PathBuf>) -> Self {
        self.error_pages = dir.into();
        self
    }

    pub fn with_log_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_directory = dir.into();
        self
    }

    pub fn with_cache_threshold(mut self, threshold: u64) -> Self {
        self.cache_threshold = threshold;
        self
    }
}

impl Config {
    pub fn www_root(&self) -> &Path {
        &self.www_root
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn default_document(&self) -> &str {
        &self.default_document
    }

    pub fn error_pages(&self) -> &Path {
        &self.error_pages
    }

    pub fn no_serve(&self) -> &[String] {
        &self.no_serve
    }

    pub fn no_cache(&self) -> &[String] {
        &self.no_cache
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    pub fn cache_threshold(&self) -> u64 {
        self.cache_threshold
    }

    pub fn cache_control_max_age(&self) -> u64 {
        self.cache_control_max_age
    }

    pub fn log_directory(&self) -> &Path {
        &self.log_directory
    }

    pub fn log_name(&self) -> &str {
        &self.log_name
    }

    pub fn log_flush_interval(&self) -> u64 {
        self.log_flush_interval
    }

    pub fn log_file_size_limit(&self) -> u64 {
        self.log_file_size_limit
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }
}
