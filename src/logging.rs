//! 日志初始化与请求日志输出。

use std::{env, io::IsTerminal};

use log::{error, info, warn, LevelFilter};
use log4rs::{
    append::console::ConsoleAppender,
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
};

use crate::{handler::RequestMeta, server::RequestLog};

const COLOR_PATTERN: &str = "{d(%H:%M:%S)} {h({l:<5})} {m}{n}";
const PLAIN_PATTERN: &str = "{d(%H:%M:%S)} {l:<5} {m}{n}";

/// 根据环境变量判断是否输出颜色
///
/// `NO_COLOR` 非空时关闭；`FORCE_COLOR` 不为 `0`/`false` 时强制开启；
/// 否则要求标准输出是终端且 `TERM` 不是 `dumb`。
pub fn color_enabled() -> bool {
    color_from_env(
        env::var("NO_COLOR").ok().as_deref(),
        env::var("FORCE_COLOR").ok().as_deref(),
        env::var("TERM").ok().as_deref(),
        env::var("COLORTERM").ok().as_deref(),
        std::io::stdout().is_terminal(),
    )
}

fn color_from_env(
    no_color: Option<&str>,
    force_color: Option<&str>,
    term: Option<&str>,
    colorterm: Option<&str>,
    is_terminal: bool,
) -> bool {
    if no_color.is_some_and(|v| !v.is_empty()) {
        return false;
    }
    if let Some(force) = force_color {
        return !matches!(force, "0" | "false");
    }
    if !is_terminal {
        return false;
    }
    if colorterm.is_some() {
        return true;
    }
    term.map(|t| t != "dumb").unwrap_or(false)
}

/// 初始化 log4rs。
///
/// 只有显式传入 `--log-config` 时才从 YAML 文件加载，此时级别与颜色由文件决定；
/// 否则输出到控制台，级别和颜色分别取自 `verbose` 与 [`color_enabled`]。
pub fn init(verbose: bool, config_file: Option<&str>) -> Result<(), String> {
    if let Some(file) = config_file {
        return log4rs::init_file(file, Default::default())
            .map_err(|e| format!("cannot load {}: {}", file, e));
    }
    let config = console_config(verbose, color_enabled())?;
    log4rs::init_config(config)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// 控制台日志配置
pub fn console_config(verbose: bool, color: bool) -> Result<Config, String> {
    let pattern = if color { COLOR_PATTERN } else { PLAIN_PATTERN };
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(pattern)))
        .build();
    Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(level))
        .map_err(|e| e.to_string())
}

/// 请求日志行，例如 `200 GET /docs/ (docs/index.html) 3ms`
pub fn format_request(meta: &RequestMeta) -> String {
    let method = if meta.method.is_empty() {
        "-"
    } else {
        meta.method.as_str()
    };
    let mut line = format!("{} {} {}", meta.status, method, meta.url);
    if let Some(local) = &meta.local_path {
        let url_path = meta.url_path.as_deref().unwrap_or("");
        if url_path.trim_matches('/') != local {
            line.push_str(&format!(" ({})", local));
        }
    }
    line.push_str(&format!(" {}ms", meta.timing.elapsed().as_millis()));
    if let Some(e) = &meta.error {
        line.push_str(&format!(" - {}", e));
    }
    line
}

/// 输出到 `log` 门面的请求日志，级别随状态码变化
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleLog;

impl RequestLog for ConsoleLog {
    fn request(&self, meta: &RequestMeta) {
        let line = format!("[ID{}] {}", meta.id, format_request(meta));
        match meta.status {
            0..=399 => info!("{}", line),
            400..=499 => warn!("{}", line),
            _ => error!("{}", line),
        }
    }
}
