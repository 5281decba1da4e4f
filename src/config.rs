use lazy_static::lazy_static;
use log::warn;
use regex::Regex;
use serde_derive::{Deserialize, Serialize};

use std::{
    fmt,
    fs::File,
    io::prelude::*,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::matcher::PathMatcher;

lazy_static! {
    static ref HEADER_NAME: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
    static ref HOST_NAME: Regex = Regex::new(r"^[A-Za-z0-9._:\[\]-]+$").unwrap();
}

/// 端口列表的最大长度
pub const MAX_PORTS: usize = 100;

/// `N+` 形式展开的端口数量
const PORT_RANGE_STEP: u32 = 10;

/// 尾部斜杠策略
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrailingSlash {
    Auto,
    Always,
    Never,
    Ignore,
}

impl FromStr for TrailingSlash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "auto" => Ok(TrailingSlash::Auto),
            "always" => Ok(TrailingSlash::Always),
            "never" => Ok(TrailingSlash::Never),
            "ignore" => Ok(TrailingSlash::Ignore),
            other => Err(format!(
                "invalid trailing slash policy '{}', expected one of: auto, always, never, ignore",
                other
            )),
        }
    }
}

impl fmt::Display for TrailingSlash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrailingSlash::Auto => "auto",
            TrailingSlash::Always => "always",
            TrailingSlash::Never => "never",
            TrailingSlash::Ignore => "ignore",
        };
        write!(f, "{}", name)
    }
}

/// 自定义响应头规则。`include` 为空时作用于所有文件。
#[derive(Debug, Clone)]
pub struct HeaderRule {
    headers: Vec<(String, String)>,
    matcher: Option<PathMatcher>,
}

impl HeaderRule {
    pub fn new(include: Vec<String>, headers: Vec<(String, String)>) -> Self {
        let matcher = if include.is_empty() {
            None
        } else {
            Some(PathMatcher::new(&include, true))
        };
        Self { headers, matcher }
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// 该规则是否作用于给定的本地路径
    pub fn applies_to(&self, local_path: Option<&str>) -> bool {
        match (&self.matcher, local_path) {
            (None, _) => true,
            (Some(m), Some(path)) => m.test(path),
            (Some(_), None) => false,
        }
    }
}

/// 配置文件中的端口既可以写成数字，也可以写成端口描述字符串（如 `"8080+"`）。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum PortInput {
    Number(u32),
    Spec(String),
}

/// 未经校验的原始配置。所有字段都是可选的，可以来自 TOML 配置文件，
/// 也可以来自命令行；两者通过 [`OptionsInput::merge`] 合并。
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct OptionsInput {
    pub root: Option<String>,
    pub host: Option<String>,
    pub port: Option<PortInput>,
    pub headers: Option<Vec<String>>,
    pub cors: Option<bool>,
    pub gzip: Option<bool>,
    pub index: Option<Vec<String>>,
    pub ext: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    pub list: Option<bool>,
    pub trailing_slash: Option<String>,
    pub worker_threads: Option<usize>,
}

impl OptionsInput {
    /// 读取 TOML 配置文件
    pub fn from_toml(filename: &str) -> Result<Self, String> {
        let mut file =
            File::open(filename).map_err(|e| format!("cannot open config file {}: {}", filename, e))?;
        let mut str_val = String::new();
        file.read_to_string(&mut str_val)
            .map_err(|e| format!("cannot read config file {}: {}", filename, e))?;
        toml::from_str(&str_val).map_err(|e| format!("invalid config file {}: {}", filename, e))
    }

    /// 逐字段合并，`other` 中存在的值覆盖 `self`
    pub fn merge(self, other: OptionsInput) -> OptionsInput {
        OptionsInput {
            root: other.root.or(self.root),
            host: other.host.or(self.host),
            port: other.port.or(self.port),
            headers: other.headers.or(self.headers),
            cors: other.cors.or(self.cors),
            gzip: other.gzip.or(self.gzip),
            index: other.index.or(self.index),
            ext: other.ext.or(self.ext),
            exclude: other.exclude.or(self.exclude),
            list: other.list.or(self.list),
            trailing_slash: other.trailing_slash.or(self.trailing_slash),
            worker_threads: other.worker_threads.or(self.worker_threads),
        }
    }
}

/// 经过校验的运行时配置，构造完成后不再修改。
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    root: PathBuf,
    host: String,
    ports: Vec<u16>,
    headers: Vec<HeaderRule>,
    cors: bool,
    gzip: bool,
    index: Vec<String>,
    ext: Vec<String>,
    exclude: Vec<String>,
    list: bool,
    trailing_slash: TrailingSlash,
    worker_threads: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port_spec() -> &'static str {
    "8080+"
}

fn default_index() -> Vec<String> {
    vec!["index.html".to_string()]
}

fn default_ext() -> Vec<String> {
    vec![".html".to_string()]
}

fn default_exclude() -> Vec<String> {
    vec![".*".to_string(), "!.well-known".to_string()]
}

impl RuntimeOptions {
    /// 应用默认值并校验全部字段，返回收集到的所有错误信息。
    pub fn from_input(input: OptionsInput) -> Result<Self, Vec<String>> {
        let mut errors = vec![];

        let root = match validate_root(input.root.as_deref().unwrap_or(".")) {
            Ok(r) => r,
            Err(e) => {
                errors.push(e);
                PathBuf::new()
            }
        };

        let host = input.host.unwrap_or_else(default_host);
        if !HOST_NAME.is_match(&host) {
            errors.push(format!("invalid host '{}'", host));
        }

        let ports = match input.port {
            None => parse_port_spec(default_port_spec()),
            Some(PortInput::Number(n)) => parse_port_spec(&n.to_string()),
            Some(PortInput::Spec(s)) => parse_port_spec(&s),
        }
        .unwrap_or_else(|e| {
            errors.push(e);
            vec![]
        });

        let mut headers = vec![];
        for spec in input.headers.unwrap_or_default() {
            match parse_header_spec(&spec) {
                Ok(rule) => headers.push(rule),
                Err(e) => errors.push(e),
            }
        }

        let mut index = vec![];
        for name in input.index.unwrap_or_else(default_index) {
            let name = name.trim().to_string();
            if name.is_empty() || name.contains(['/', '\\']) {
                errors.push(format!("invalid directory index file name '{}'", name));
            } else if !index.contains(&name) {
                index.push(name);
            }
        }

        let mut ext = vec![];
        for suffix in input.ext.unwrap_or_else(default_ext) {
            match normalize_ext(&suffix) {
                Ok(s) if !ext.contains(&s) => ext.push(s),
                Ok(_) => {}
                Err(e) => errors.push(e),
            }
        }

        let exclude: Vec<String> = input
            .exclude
            .unwrap_or_else(default_exclude)
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        let trailing_slash = match input.trailing_slash.as_deref() {
            None => TrailingSlash::Auto,
            Some(s) => s.parse().unwrap_or_else(|e| {
                errors.push(e);
                TrailingSlash::Auto
            }),
        };

        let worker_threads = match input.worker_threads {
            None | Some(0) => num_cpus::get(),
            Some(n) => n,
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            root,
            host,
            ports,
            headers,
            cors: input.cors.unwrap_or(false),
            gzip: input.gzip.unwrap_or(true),
            index,
            ext,
            exclude,
            list: input.list.unwrap_or(true),
            trailing_slash,
            worker_threads,
        })
    }
}

impl RuntimeOptions {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    pub fn headers(&self) -> &[HeaderRule] {
        &self.headers
    }

    pub fn cors(&self) -> bool {
        self.cors
    }

    pub fn gzip(&self) -> bool {
        self.gzip
    }

    pub fn index(&self) -> &[String] {
        &self.index
    }

    pub fn ext(&self) -> &[String] {
        &self.ext
    }

    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    pub fn list(&self) -> bool {
        self.list
    }

    pub fn trailing_slash(&self) -> TrailingSlash {
        self.trailing_slash
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }
}

fn validate_root(root: &str) -> Result<PathBuf, String> {
    let path = Path::new(root);
    let canonical = std::fs::canonicalize(path)
        .map_err(|e| format!("root directory '{}' is not accessible: {}", root, e))?;
    if !canonical.is_dir() {
        return Err(format!("root '{}' is not a directory", root));
    }
    Ok(canonical)
}

fn normalize_ext(suffix: &str) -> Result<String, String> {
    let suffix = suffix.trim();
    let suffix = if suffix.starts_with('.') {
        suffix.to_string()
    } else {
        format!(".{}", suffix)
    };
    if suffix.len() < 2 || suffix.contains(['/', '\\']) {
        return Err(format!("invalid extension '{}'", suffix));
    }
    Ok(suffix)
}

/// 解析端口描述：`N`、`N+`（N 到 N+9）或 `N-M`（可以降序）。
pub fn parse_port_spec(spec: &str) -> Result<Vec<u16>, String> {
    let spec = spec.trim();
    let parse_one = |s: &str| -> Result<u32, String> {
        match s.trim().parse::<u32>() {
            Ok(n) if (1..=65535).contains(&n) => Ok(n),
            _ => Err(format!("invalid port '{}' in '{}'", s.trim(), spec)),
        }
    };

    let numbers: Vec<u32> = if let Some(start) = spec.strip_suffix('+') {
        let start = parse_one(start)?;
        (start..=(start + PORT_RANGE_STEP - 1).min(65535)).collect()
    } else if let Some((a, b)) = spec.split_once('-') {
        let (a, b) = (parse_one(a)?, parse_one(b)?);
        let len = a.abs_diff(b) as usize + 1;
        if len > MAX_PORTS {
            return Err(format!(
                "port range '{}' has {} ports, the maximum is {}",
                spec, len, MAX_PORTS
            ));
        }
        if a <= b {
            (a..=b).collect()
        } else {
            (b..=a).rev().collect()
        }
    } else {
        vec![parse_one(spec)?]
    };

    let mut ports = vec![];
    for n in numbers {
        let port = n as u16;
        if !ports.contains(&port) {
            ports.push(port);
        }
    }
    Ok(ports)
}

fn split_include(prefix: &str) -> Vec<String> {
    let include: Vec<String> = prefix
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if include.iter().any(|s| s == "*") {
        vec![]
    } else {
        include
    }
}

fn check_header_name(name: &str, spec: &str) -> Result<(), String> {
    if HEADER_NAME.is_match(name) {
        Ok(())
    } else {
        Err(format!("invalid header name '{}' in '{}'", name, spec))
    }
}

/// 解析 `--header` 描述。支持两种形式：
///
/// - `[include,…] name: value`
/// - `[include,…] {"name": "value", …}`
pub fn parse_header_spec(spec: &str) -> Result<HeaderRule, String> {
    let input = spec.trim();
    let colon = input.find(':');
    let brace = input.find('{');

    if let (Some(b), Some(c)) = (brace, colon) {
        if c > b && input.ends_with('}') {
            let include = split_include(&input[..b]);
            let value: serde_json::Value = serde_json::from_str(&input[b..])
                .map_err(|e| format!("invalid JSON in header rule '{}': {}", spec, e))?;
            let object = value
                .as_object()
                .ok_or_else(|| format!("header rule '{}' is not a JSON object", spec))?;
            let mut headers = vec![];
            for (name, value) in object {
                check_header_name(name, spec)?;
                let value = match value {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Number(n) => n.to_string(),
                    serde_json::Value::Bool(b) => b.to_string(),
                    _ => {
                        return Err(format!(
                            "header '{}' in '{}' must be a string, number or boolean",
                            name, spec
                        ))
                    }
                };
                headers.push((name.clone(), value));
            }
            if headers.is_empty() {
                warn!("header rule '{}' does not define any header", spec);
            }
            return Ok(HeaderRule::new(include, headers));
        }
    }

    let colon = colon.ok_or_else(|| format!("invalid header rule '{}', expected 'name: value'", spec))?;
    let key = input[..colon].trim();
    let value = input[colon + 1..].trim();
    let parts: Vec<&str> = key.split_whitespace().collect();
    let (include, name) = match parts.as_slice() {
        [name] => (vec![], *name),
        [include, name] => (split_include(include), *name),
        _ => return Err(format!("invalid header rule '{}'", spec)),
    };
    check_header_name(name, spec)?;
    Ok(HeaderRule::new(
        include,
        vec![(name.to_string(), value.to_string())],
    ))
}
