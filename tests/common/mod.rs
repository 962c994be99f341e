//! 集成测试共用的站点构造与请求工具

#![allow(dead_code)]

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use staticd::{server, App, Config};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// 临时站点：`www/` 为根目录，`outside.txt` 位于根目录之外
pub struct Site {
    pub dir: TempDir,
}

impl Site {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("www");
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::write(root.join("index.html"), "hello").unwrap();
        fs::write(root.join("docs/guide.txt"), "guide").unwrap();
        fs::write(root.join(".env"), "SECRET=1").unwrap();
        fs::write(root.join("a.secret"), "classified").unwrap();
        fs::write(dir.path().join("outside.txt"), "root:x:0:0").unwrap();
        fs::create_dir_all(dir.path().join("errorpages")).unwrap();
        fs::write(dir.path().join("errorpages/404.html"), "<h1>custom 404</h1>").unwrap();
        Self { dir }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("www")
    }

    pub fn logs(&self) -> PathBuf {
        self.dir.path().join("logs")
    }

    pub fn config(&self) -> Config {
        Config::new(self.root())
            .with_no_serve(&[".secret"])
            .with_error_pages(self.dir.path().join("errorpages"))
            .with_log_directory(self.logs())
    }

    pub fn write(&self, relative: &str, content: &[u8]) {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
}

/// 后台运行的真实服务端
pub struct Running {
    pub addr: SocketAddr,
    pub app: Arc<App>,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Running {
    pub async fn start(config: Config) -> Self {
        let app = Arc::new(App::build(config).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(server::run(listener, Arc::clone(&app), async move {
            let _ = stopped.await;
        }));
        Self { addr, app, stop, handle }
    }

    pub async fn stop(self) -> Arc<App> {
        let _ = self.stop.send(());
        self.handle.await.unwrap();
        self.app
    }

    pub async fn send(&self, raw: &[u8]) -> String {
        send_raw(self.addr, raw).await
    }
}

/// 发送原始字节并读到服务端关闭连接为止
pub async fn send_raw(addr: SocketAddr, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw).await.unwrap();
    let mut buffer = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buffer))
        .await
        .expect("服务端未在5秒内响应")
        .unwrap();
    String::from_utf8_lossy(&buffer).to_string()
}

/// 拆分响应为（状态码，头部，主体）
pub fn parse_response(response: &str) -> (u16, Vec<(String, String)>, String) {
    let (head, body) = response.split_once("\r\n\r\n").unwrap_or((response, ""));
    let mut lines = head.split("\r\n");
    let status_code = lines
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|c| c.parse().ok())
        .unwrap_or(0);
    let headers = lines
        .filter_map(|l| l.split_once(": "))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    (status_code, headers, body.to_string())
}

pub fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// 日志目录下所有文件的数据行（去掉 `#` 文件头）
pub fn log_lines(dir: &Path) -> Vec<String> {
    let mut files: Vec<_> = match fs::read_dir(dir) {
        Ok(entries) => entries.flatten().map(|e| e.path()).collect(),
        Err(_) => return Vec::new(),
    };
    files.sort();
    files
        .iter()
        .flat_map(|f| {
            fs::read_to_string(f)
                .unwrap()
                .lines()
                .filter(|l| !l.starts_with('#'))
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}
