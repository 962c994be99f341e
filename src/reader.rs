//! 文件读取接缝。缓存与静态文件阶段只通过这里接触磁盘。

use bytes::Bytes;

use std::fs;
use std::io;
use std::path::Path;

#[cfg_attr(test, mockall::automock)]
pub trait FileReader: Send + Sync {
    /// 读取文件的全部内容
    fn read(&self, path: &Path) -> io::Result<Bytes>;

    /// 文件大小（字节）
    fn file_size(&self, path: &Path) -> io::Result<u64>;
}

/// 直接读取本地文件系统
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskReader;

impl FileReader for DiskReader {
    fn read(&self, path: &Path) -> io::Result<Bytes> {
        fs::read(path).map(Bytes::from)
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        fs::metadata(path).map(|m| m.len())
    }
}
