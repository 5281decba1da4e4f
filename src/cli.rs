//! 命令行参数。`-h` 用于指定主机，帮助信息只能通过 `--help` 获取。

use clap::{ArgAction, Parser};

use crate::config::{OptionsInput, PortInput, RuntimeOptions};

#[derive(Parser, Debug, Default)]
#[command(
    name = "devserve",
    version,
    about = "Serve a local directory over HTTP for development",
    disable_help_flag = true
)]
pub struct Cli {
    /// Directory to serve (defaults to the current directory)
    pub root: Option<String>,

    /// Bind address
    #[arg(short = 'h', long)]
    pub host: Option<String>,

    /// Port, port range (8080-8085) or start port (8080+)
    #[arg(short, long)]
    pub port: Option<String>,

    /// Custom response header rule, e.g. `*.md content-type: text/plain`
    #[arg(long = "header", value_name = "SPEC")]
    pub headers: Vec<String>,

    /// Send CORS headers
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub cors: Option<bool>,

    /// Compress text responses with gzip
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub gzip: Option<bool>,

    #[arg(long, conflicts_with = "gzip")]
    pub no_gzip: bool,

    /// Allow directory listings
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub dir_list: Option<bool>,

    #[arg(long, conflicts_with = "dir_list")]
    pub no_dir_list: bool,

    /// Directory index file names
    #[arg(long, value_delimiter = ',', value_name = "NAMES")]
    pub dir_file: Vec<String>,

    /// Extensions tried for extensionless URLs
    #[arg(long, value_delimiter = ',', value_name = "SUFFIXES")]
    pub ext: Vec<String>,

    /// Segment patterns to hide, `!` negates
    #[arg(long, value_delimiter = ',', value_name = "PATTERNS")]
    pub exclude: Vec<String>,

    /// Trailing slash policy: auto, always, never or ignore
    #[arg(long, value_name = "POLICY")]
    pub trailing_slash: Option<String>,

    /// TOML file with default options
    #[arg(long, value_name = "FILE")]
    pub config: Option<String>,

    /// log4rs YAML file; overrides `--verbose` and colour detection
    #[arg(long, value_name = "FILE")]
    pub log_config: Option<String>,

    /// Number of worker threads
    #[arg(long)]
    pub threads: Option<usize>,

    /// Print debug logs
    #[arg(short, long)]
    pub verbose: bool,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

fn non_empty(values: Vec<String>) -> Option<Vec<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

impl Cli {
    /// 转换为未经校验的配置，没有出现的参数保持为 `None`
    pub fn to_input(&self) -> OptionsInput {
        OptionsInput {
            root: self.root.clone(),
            host: self.host.clone(),
            port: self.port.clone().map(PortInput::Spec),
            headers: non_empty(self.headers.clone()),
            cors: self.cors,
            gzip: if self.no_gzip { Some(false) } else { self.gzip },
            index: non_empty(self.dir_file.clone()),
            ext: non_empty(self.ext.clone()),
            exclude: non_empty(self.exclude.clone()),
            list: if self.no_dir_list {
                Some(false)
            } else {
                self.dir_list
            },
            trailing_slash: self.trailing_slash.clone(),
            worker_threads: self.threads,
        }
    }

    /// 合并配置文件（如果有）与命令行参数，并进行校验
    pub fn load_options(&self) -> Result<RuntimeOptions, Vec<String>> {
        let base = match &self.config {
            Some(file) => OptionsInput::from_toml(file).map_err(|e| vec![e])?,
            None => OptionsInput::default(),
        };
        RuntimeOptions::from_input(base.merge(self.to_input()))
    }
}
