// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # devserve
//!
//! 把本地目录通过 HTTP 发布出来的开发服务器。
//! - 解析命令行与配置文件，校验失败时打印全部错误并以 1 退出
//! - 根据配置创建多线程 Tokio 运行时
//! - 按端口列表依次尝试绑定
//! - 后台管理控制台（`stop`、`status`、`help`），以及 Ctrl-C 停机

use std::{io::IsTerminal, process::ExitCode, sync::Arc};

use clap::Parser;
use log::{error, info};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    runtime::Builder,
};

use devserve::{
    cli::Cli,
    logging::{self, ConsoleLog},
    server::{Server, ServerStats, ShutdownHandle},
};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // 1. 初始化日志系统：指定 --log-config 时使用该 YAML 文件
    if let Err(e) = logging::init(cli.verbose, cli.log_config.as_deref()) {
        eprintln!("无法初始化日志系统：{}", e);
        return ExitCode::FAILURE;
    }

    // 2. 合并配置文件与命令行参数并校验
    let options = match cli.load_options() {
        Ok(options) => Arc::new(options),
        Err(errors) => {
            for e in errors {
                error!("{}", e);
            }
            return ExitCode::FAILURE;
        }
    };
    info!("www root: {}", options.root().display());

    // 3. 根据配置分配工作线程数
    let runtime = match Builder::new_multi_thread()
        .worker_threads(options.worker_threads())
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("无法创建运行时：{}", e);
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async move {
        let server = match Server::bind(Arc::clone(&options), Arc::new(ConsoleLog)).await {
            Ok(server) => server,
            Err(e) => {
                error!("无法绑定端口 {:?}：{}", options.ports(), e);
                return ExitCode::FAILURE;
            }
        };
        match server.url() {
            Ok(url) => info!("服务已启动：{}", url),
            Err(e) => error!("无法获取监听地址：{}", e),
        }

        let shutdown = server.shutdown_handle();
        tokio::spawn(wait_for_ctrl_c(shutdown.clone()));
        if std::io::stdin().is_terminal() {
            tokio::spawn(console(shutdown, server.stats()));
        }

        server.run().await;
        ExitCode::SUCCESS
    })
}

async fn wait_for_ctrl_c(shutdown: ShutdownHandle) {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("收到 Ctrl-C，正在停机");
        shutdown.trigger();
    }
}

/// 交互式管理控制台，运行在后台，不阻塞监听循环
async fn console(shutdown: ShutdownHandle, stats: Arc<ServerStats>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(input)) = lines.next_line().await {
        match input.trim() {
            "stop" => {
                println!("停机指令已激活，服务器即将关闭...");
                shutdown.trigger();
                break;
            }
            "help" => {
                println!("== devserve Help ==");
                println!("stop   - 发出停机信号");
                println!("status - 查看当前服务器运行状态");
                println!("help   - 显示此帮助信息");
                println!("===================");
            }
            "status" => {
                println!("== devserve 状态 ==");
                println!("当前活跃连接数: {}", stats.active());
                println!("已处理请求数: {}", stats.served());
                println!("===================");
            }
            "" => {}
            cmd => println!("无效的命令：{}", cmd),
        }
    }
}
