//! # 文件缓存
//!
//! 以规范绝对路径为键、不可变字节为值的读穿透缓存，分两层：
//! - **常驻层**：启动时预加载的文件，进程存活期间从不移除。
//! - **可淘汰层**：运行期首次未命中后准入的小文件，容量受限，按 LRU 淘汰。
//!
//! 两个请求同时首次访问同一文件时可能都去读盘并重复准入，值完全相同，后写覆盖即可。

use crate::exception::Exception;
use crate::filter::RequestFilter;
use crate::reader::FileReader;
use crate::resolver::PathResolver;
use crate::util::{format_file_size, is_hidden};

use bytes::Bytes;
use log::{debug, info, warn};
use lru::LruCache;

use std::collections::{HashMap, HashSet};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockWriteGuard};

pub struct FileCache {
    pinned: RwLock<HashMap<String, Bytes>>,
    evictable: Mutex<LruCache<String, Bytes>>,
    threshold: u64,
}

/// 一次预加载的统计
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct PreloadReport {
    pub files: usize,
    pub bytes: u64,
    pub skipped: usize,
}

/// 缓存键：规范绝对路径的字符串形式
pub fn cache_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl FileCache {
    /// `capacity` 为可淘汰层的条目上限，`threshold` 为惰性准入的大小阈值（字节）
    pub fn from_capacity(capacity: usize, threshold: u64) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            pinned: RwLock::new(HashMap::new()),
            evictable: Mutex::new(LruCache::new(capacity)),
            threshold,
        }
    }

    /// 查询缓存，命中时返回字节的廉价克隆
    pub fn lookup(&self, key: &str) -> Option<Bytes> {
        {
            let pinned = match self.pinned.read() {
                Ok(lock) => lock,
                Err(poisoned) => {
                    warn!("常驻缓存锁被污染，恢复并继续");
                    poisoned.into_inner()
                }
            };
            if let Some(bytes) = pinned.get(key) {
                return Some(bytes.clone());
            }
        }
        self.evictable_lock().get(key).cloned()
    }

    /// 准入。常驻条目一经写入不会被可淘汰条目覆盖。
    ///
    /// 惰性准入只取常驻层读锁；在可淘汰层互斥锁内再查一次常驻层，
    /// 与同键的常驻准入交错时由后者的 `pop` 清掉残留条目。
    pub fn admit(&self, key: &str, bytes: Bytes, pinned: bool) {
        if pinned {
            self.pinned_write().insert(key.to_string(), bytes);
            self.evictable_lock().pop(key);
            return;
        }
        if self.is_pinned(key) {
            return;
        }
        let mut evictable = self.evictable_lock();
        if !self.is_pinned(key) {
            evictable.put(key.to_string(), bytes);
        }
    }

    /// 文件大小是否低于惰性准入阈值
    pub fn should_cache(&self, file_size: u64) -> bool {
        file_size < self.threshold
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn is_pinned(&self, key: &str) -> bool {
        match self.pinned.read() {
            Ok(lock) => lock.contains_key(key),
            Err(poisoned) => poisoned.into_inner().contains_key(key),
        }
    }

    pub fn pinned_len(&self) -> usize {
        match self.pinned.read() {
            Ok(lock) => lock.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn evictable_len(&self) -> usize {
        self.evictable_lock().len()
    }

    pub fn len(&self) -> usize {
        self.pinned_len() + self.evictable_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn pinned_write(&self) -> RwLockWriteGuard<'_, HashMap<String, Bytes>> {
        match self.pinned.write() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!("常驻缓存锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        }
    }

    fn evictable_lock(&self) -> MutexGuard<'_, LruCache<String, Bytes>> {
        match self.evictable.lock() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!("可淘汰缓存锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        }
    }

    /// 启动时的预加载。
    ///
    /// 默认文档必定常驻，读取失败属于致命错误；其余文件跳过隐藏文件与
    /// `exclusions` 命中的路径，单个文件失败只记录警告。
    pub fn preload(
        &self,
        resolver: &PathResolver,
        exclusions: &RequestFilter,
        reader: &dyn FileReader,
    ) -> Result<PreloadReport, Exception> {
        let mut report = PreloadReport::default();

        let default_path = resolver.resolve("").map_err(|_| {
            Exception::StartupConfig(format!(
                "默认文档{}不存在",
                resolver.default_document_path().display()
            ))
        })?;
        let default_bytes = reader.read(&default_path).map_err(|e| {
            Exception::StartupConfig(format!("无法读取默认文档{}：{}", default_path.display(), e))
        })?;
        report.bytes += default_bytes.len() as u64;
        report.files += 1;
        self.admit(&cache_key(&default_path), default_bytes, true);
        debug!("默认文档{}已预加载", default_path.display());

        for file in walk_files(resolver.root()) {
            if file == default_path {
                continue;
            }
            let relative = resolver.relative(&file);
            if is_hidden(&relative) || exclusions.is_excluded(&relative) {
                debug!("跳过预加载：{}", relative);
                continue;
            }
            match reader.read(&file) {
                Ok(bytes) => {
                    report.bytes += bytes.len() as u64;
                    report.files += 1;
                    self.admit(&cache_key(&file), bytes, true);
                    debug!("文件{}已预加载", file.display());
                }
                Err(e) => {
                    let warning = Exception::CachePreload(format!("{}：{}", file.display(), e));
                    warn!("{}", warning);
                    report.skipped += 1;
                }
            }
        }

        info!(
            "预加载完成：{}个文件，共{}，跳过{}个",
            report.files,
            format_file_size(report.bytes),
            report.skipped
        );
        Ok(report)
    }
}

/// 递归列出根目录下的所有普通文件（规范路径）。
///
/// 不进入隐藏目录；符号链接解析后越出根目录或形成环路的一律跳过。
fn walk_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        if !visited.insert(dir.clone()) {
            continue;
        }
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("无法读取目录{}：{}，跳过", dir.display(), e);
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = match fs::canonicalize(entry.path()) {
                Ok(p) if p.starts_with(root) => p,
                Ok(p) => {
                    debug!("{}指向根目录之外，跳过", p.display());
                    continue;
                }
                Err(e) => {
                    warn!("无法规范化{}：{}，跳过", entry.path().display(), e);
                    continue;
                }
            };
            if path.is_dir() {
                if !entry.file_name().to_string_lossy().starts_with('.') {
                    stack.push(path);
                }
            } else if path.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{DiskReader, MockFileReader};
    use std::io;
    use std::sync::Arc;
    use std::thread;

    fn site() -> (tempfile::TempDir, PathResolver) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("css")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("index.html"), "hello").unwrap();
        fs::write(root.join("css/site.css"), "body{}").unwrap();
        fs::write(root.join(".env"), "KEY=1").unwrap();
        fs::write(root.join(".git/HEAD"), "ref").unwrap();
        fs::write(root.join("a.secret"), "s").unwrap();
        let resolver = PathResolver::new(root, "index.html").unwrap();
        (dir, resolver)
    }

    #[test]
    fn test_admit_and_lookup() {
        let cache = FileCache::from_capacity(3, 1024);
        cache.admit("/www/a.txt", Bytes::from("a"), false);

        assert_eq!(cache.lookup("/www/a.txt"), Some(Bytes::from("a")));
        assert_eq!(cache.lookup("/www/missing"), None);
        assert_eq!(cache.evictable_len(), 1);
    }

    #[test]
    fn test_pinned_never_evicted() {
        let cache = FileCache::from_capacity(1, 1024);
        cache.admit("/www/pinned", Bytes::from("p"), true);
        for i in 0..10 {
            cache.admit(&format!("/www/{}", i), Bytes::from("x"), false);
        }

        assert_eq!(cache.lookup("/www/pinned"), Some(Bytes::from("p")));
        assert_eq!(cache.pinned_len(), 1);
        assert_eq!(cache.evictable_len(), 1);
    }

    #[test]
    fn test_evictable_lru_order() {
        let cache = FileCache::from_capacity(2, 1024);
        cache.admit("f1", Bytes::from("1"), false);
        cache.admit("f2", Bytes::from("2"), false);
        cache.lookup("f1");
        cache.admit("f3", Bytes::from("3"), false);

        assert!(cache.lookup("f2").is_none());
        assert!(cache.lookup("f1").is_some());
        assert!(cache.lookup("f3").is_some());
    }

    #[test]
    fn test_evictable_does_not_replace_pinned() {
        let cache = FileCache::from_capacity(2, 1024);
        cache.admit("k", Bytes::from("pinned"), true);
        cache.admit("k", Bytes::from("other"), false);

        assert_eq!(cache.lookup("k"), Some(Bytes::from("pinned")));
        assert_eq!(cache.evictable_len(), 0);
    }

    #[test]
    fn test_pinning_moves_out_of_evictable() {
        let cache = FileCache::from_capacity(2, 1024);
        cache.admit("k", Bytes::from("v"), false);
        cache.admit("k", Bytes::from("v"), true);

        assert!(cache.is_pinned("k"));
        assert_eq!(cache.evictable_len(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_should_cache_is_strictly_below_threshold() {
        let cache = FileCache::from_capacity(2, 1024);
        assert!(cache.should_cache(1023));
        assert!(!cache.should_cache(1024));
        assert!(!cache.should_cache(4096));
    }

    #[test]
    fn test_zero_capacity_still_usable() {
        let cache = FileCache::from_capacity(0, 1024);
        cache.admit("k", Bytes::from("v"), false);
        assert_eq!(cache.lookup("k"), Some(Bytes::from("v")));
    }

    #[test]
    fn test_concurrent_same_key_admission() {
        let cache = Arc::new(FileCache::from_capacity(4, 4096));
        let content = Bytes::from(vec![7u8; 2048]);
        let handles: Vec<_> = (0..50)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let content = content.clone();
                thread::spawn(move || {
                    if cache.lookup("/www/race.bin").is_none() {
                        cache.admit("/www/race.bin", content.clone(), false);
                    }
                    cache.lookup("/www/race.bin").unwrap()
                })
            })
            .collect();

        for h in handles {
            assert_eq!(h.join().unwrap(), content);
        }
        assert_eq!(cache.evictable_len(), 1);
    }

    #[test]
    fn test_pinned_wins_against_concurrent_lazy_admission() {
        for _ in 0..20 {
            let cache = Arc::new(FileCache::from_capacity(8, 1024));
            let pinned = Bytes::from("preloaded");
            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let cache = Arc::clone(&cache);
                    let pinned = pinned.clone();
                    thread::spawn(move || {
                        if i == 8 {
                            cache.admit("/www/same.txt", pinned, true);
                        } else {
                            cache.admit("/www/same.txt", Bytes::from("lazy"), false);
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }

            assert_eq!(cache.lookup("/www/same.txt").unwrap(), pinned);
            assert_eq!(cache.evictable_len(), 0);
        }
    }

    #[test]
    fn test_pinned_lookup_not_blocked_by_waiting_lazy_admission() {
        let cache = Arc::new(FileCache::from_capacity(8, 1024));
        cache.admit("/www/index.html", Bytes::from("hello"), true);
        let guard = cache.evictable_lock();

        let admitter = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.admit("/www/late.txt", Bytes::from("late"), false))
        };
        // 准入线程此时阻塞在可淘汰层互斥锁上
        thread::sleep(std::time::Duration::from_millis(50));
        let reader = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.lookup("/www/index.html"))
        };
        assert_eq!(reader.join().unwrap(), Some(Bytes::from("hello")));

        drop(guard);
        admitter.join().unwrap();
        assert_eq!(cache.lookup("/www/late.txt"), Some(Bytes::from("late")));
    }

    #[test]
    fn test_preload_skips_hidden_and_excluded() {
        let (_guard, resolver) = site();
        let cache = FileCache::from_capacity(8, 1024);
        let exclusions = RequestFilter::new(&[".SECRET".to_string()]);

        let report = cache.preload(&resolver, &exclusions, &DiskReader).unwrap();

        assert_eq!(report.files, 2);
        assert_eq!(report.skipped, 0);
        let root = resolver.root();
        assert!(cache.is_pinned(&cache_key(&root.join("index.html"))));
        assert!(cache.is_pinned(&cache_key(&root.join("css/site.css"))));
        assert!(!cache.is_pinned(&cache_key(&root.join(".env"))));
        assert!(!cache.is_pinned(&cache_key(&root.join(".git/HEAD"))));
        assert!(!cache.is_pinned(&cache_key(&root.join("a.secret"))));
    }

    #[test]
    fn test_default_document_pinned_even_if_excluded() {
        let (_guard, resolver) = site();
        let cache = FileCache::from_capacity(8, 1024);
        let exclusions = RequestFilter::new(&[".html".to_string()]);

        cache.preload(&resolver, &exclusions, &DiskReader).unwrap();

        let key = cache_key(&resolver.root().join("index.html"));
        assert_eq!(cache.lookup(&key), Some(Bytes::from("hello")));
    }

    #[test]
    fn test_preload_missing_default_document_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("other.html"), "x").unwrap();
        let resolver = PathResolver::new(dir.path(), "index.html").unwrap();
        let cache = FileCache::from_capacity(8, 1024);

        let err = cache
            .preload(&resolver, &RequestFilter::default(), &DiskReader)
            .unwrap_err();
        assert!(matches!(err, Exception::StartupConfig(_)));
    }

    #[test]
    fn test_preload_unreadable_default_document_is_fatal() {
        let (_guard, resolver) = site();
        let cache = FileCache::from_capacity(8, 1024);
        let mut reader = MockFileReader::new();
        reader
            .expect_read()
            .returning(|_| Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied")));

        let err = cache
            .preload(&resolver, &RequestFilter::default(), &reader)
            .unwrap_err();
        assert!(matches!(err, Exception::StartupConfig(_)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_preload_individual_failure_is_skipped() {
        let (_guard, resolver) = site();
        let cache = FileCache::from_capacity(8, 1024);
        let mut reader = MockFileReader::new();
        reader.expect_read().returning(|p| {
            if p.ends_with("site.css") {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
            } else {
                DiskReader.read(p)
            }
        });

        let report = cache
            .preload(&resolver, &RequestFilter::new(&[".secret".to_string()]), &reader)
            .unwrap();
        assert_eq!(report.files, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(cache.pinned_len(), 1);
    }
}
