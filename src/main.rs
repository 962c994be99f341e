// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 静态文件服务器
//!
//! 基于 Tokio 运行时的多线程静态文件服务器。核心功能包括：
//! - 启动时预加载站点文件，运行期对小文件做惰性缓存
//! - 请求过滤（方法、隐藏文件、排除列表）与根目录约束
//! - 按日期命名、按大小轮转的 W3C 访问日志，定时刷盘，停机时完整落盘
//! - 后台管理控制台（CLI 指令交互）

use staticd::{server, App, Config, FlushWorker};

use log::{error, info, LevelFilter};
use log4rs::{
    append::console::ConsoleAppender,
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::TcpListener,
    runtime::Builder,
    sync::Notify,
};

use std::{
    env,
    net::{Ipv4Addr, SocketAddrV4},
    process,
    sync::Arc,
    time::Duration,
};

const DEFAULT_CONFIG: &str = "config/development.toml";
const LOG_CONFIG: &str = "config/log4rs.yaml";

/// # 程序入口点
///
/// 初始化日志、加载配置、完成预加载后启动主事件循环。
fn main() {
    // 1. 初始化日志系统：优先使用外部 YAML，缺失时退回控制台输出
    init_logging();

    // 2. 环境配置加载：第一个命令行参数可覆盖默认配置文件路径
    let config_path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = match Config::from_toml(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };
    info!("配置文件{}已载入", config_path);

    // 3. 异步运行时定制：根据配置文件动态分配工作线程数
    let runtime = match Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("无法创建异步运行时：{}", e);
            process::exit(1);
        }
    };

    // 4. 组件构造与预加载：默认文档缺失时服务器不启动
    let app = match App::build(config) {
        Ok(app) => Arc::new(app),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(serve(app)) {
        error!("{}", e);
        process::exit(1);
    }
}

async fn serve(app: Arc<App>) -> std::io::Result<()> {
    let config = app.config();
    let port = config.port();
    let address = match config.local() {
        true => Ipv4Addr::new(127, 0, 0, 1),
        false => Ipv4Addr::new(0, 0, 0, 0),
    };
    let socket = SocketAddrV4::new(address, port);
    let listener = TcpListener::bind(socket).await?;
    info!("服务端将在{}上监听Socket连接", socket);

    let flusher = FlushWorker::spawn(
        Arc::clone(app.access_log()),
        Duration::from_secs(config.log_flush_interval()),
    );

    let stop = Arc::new(Notify::new());
    tokio::spawn(console(Arc::clone(&app), Arc::clone(&stop)));

    let shutdown = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("收到Ctrl-C"),
            _ = stop.notified() => {}
        }
    };
    server::run(listener, Arc::clone(&app), shutdown).await;

    // 定时器停止并做最后一次刷盘
    flusher.shutdown().await;
    info!("访问日志已全部落盘，服务器退出");
    Ok(())
}

/// 交互式管理控制台。标准输入关闭时控制台退出，但不会触发停机。
async fn console(app: Arc<App>, stop: Arc<Notify>) {
    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin);
    let mut input = String::new();
    loop {
        input.clear();
        match reader.read_line(&mut input).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let cmd = input.trim();
        match cmd {
            "stop" => {
                println!("停机指令已激活，服务器将停止接收新连接并落盘访问日志...");
                stop.notify_one();
                break;
            }
            "help" => {
                println!("== staticd Help ==");
                println!("stop   - 发出停机信号");
                println!("status - 查看当前服务器运行状态");
                println!("help   - 显示此帮助信息");
                println!("==================");
            }
            "status" => {
                println!("== staticd 状态 ===");
                println!("当前活跃连接数: {}", app.active_connections());
                println!("缓存条目数: {}", app.cache().len());
                println!("待刷盘日志条数: {}", app.access_log().pending());
                println!("==================");
            }
            "" => {}
            _ => {
                println!("无效的命令：{}", cmd);
            }
        }
    }
}

fn init_logging() {
    if log4rs::init_file(LOG_CONFIG, Default::default()).is_ok() {
        return;
    }
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S)} {h({l})} {m}{n}")))
        .build();
    let fallback = log4rs::Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info));
    match fallback {
        Ok(c) => {
            if let Err(e) = log4rs::init_config(c) {
                eprintln!("无法初始化日志系统：{}", e);
            }
        }
        Err(e) => eprintln!("无法初始化日志系统：{}", e),
    }
    info!("未找到{}，使用默认控制台日志配置", LOG_CONFIG);
}
