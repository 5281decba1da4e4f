// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 负责将 TCP 流中读取的请求头字节解析为 `Request` 结构体：
//! 1. 请求行（Request-Line）的解析（方法、请求目标、版本）。
//! 2. 全部标头按出现顺序保存，名称统一转为小写以便不区分大小写地查找。
//! 3. `Accept-Encoding`、`Origin` 等处理流程需要的便捷访问器。
//!
//! 请求体不在这里解析：服务器只会根据 `Content-Length` 把它读掉丢弃。

use crate::{exception::Exception, param::*};
use log::error;

/// 一个完整的 HTTP 请求头。
#[derive(Debug, Clone)]
pub struct Request {
    /// 原始方法名。不支持的方法也会被保留，由处理流程返回 405。
    method_name: String,
    /// 解析后的方法，不在支持列表中时为 `None`
    method: Option<HttpRequestMethod>,
    /// 请求目标（路径与查询字符串，或 `*`）
    target: String,
    /// HTTP 协议版本
    version: HttpVersion,
    /// `(小写名称, 值)`，保持请求中的顺序
    headers: Vec<(String, String)>,
}

/// 查找请求头结束标记 `\r\n\r\n`，返回请求头（含结束标记）的字节长度。
pub fn find_head_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

impl Request {
    /// 从请求头字节构建 `Request`。
    ///
    /// `buffer` 可以包含也可以不包含末尾的空行。
    /// `id` 为连接序号，仅用于日志。
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let request_string = match std::str::from_utf8(buffer) {
            Ok(string) => string,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };

        let mut lines = request_string.split(CRLF);
        let request_line = lines.next().unwrap_or("");

        // 请求行严格由单个空格分隔的三部分组成
        let parts: Vec<&str> = request_line.split(' ').collect();
        if parts.len() != 3 || !is_token(parts[0]) || parts[1].is_empty() {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, request_line);
            return Err(Exception::MalformedRequest);
        }

        let version = match parts[2] {
            "HTTP/1.1" => HttpVersion::V1_1,
            "HTTP/1.0" => HttpVersion::V1_0,
            other => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, other);
                return Err(Exception::UnsupportedHttpVersion);
            }
        };

        let mut headers = vec![];
        for line in lines {
            if line.is_empty() {
                break;
            }
            let (name, value) = match line.split_once(':') {
                Some((n, v)) if is_token(n) => (n, v),
                _ => {
                    error!("[ID{}]HTTP标头格式不正确：{}", id, line);
                    return Err(Exception::MalformedRequest);
                }
            };
            headers.push((name.to_ascii_lowercase(), value.trim().to_string()));
        }

        Ok(Self {
            method_name: parts[0].to_string(),
            method: HttpRequestMethod::parse(parts[0]),
            target: parts[1].to_string(),
            version,
            headers,
        })
    }
}

impl Request {
    /// 获取 HTTP 协议版本
    pub fn version(&self) -> HttpVersion {
        self.version
    }

    /// 请求目标，原样保留
    pub fn target(&self) -> &str {
        &self.target
    }

    /// 支持的方法，否则为 `None`
    pub fn method(&self) -> Option<HttpRequestMethod> {
        self.method
    }

    /// 请求行中的方法名
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// 按名称（不区分大小写）查找第一个匹配的标头
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn origin(&self) -> Option<&str> {
        self.header("origin")
    }

    /// 声明的请求体长度，缺省或非法时视为 0
    pub fn content_length(&self) -> u64 {
        self.header("content-length")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
    }

    /// `Accept-Encoding` 按逗号拆分、去掉参数、转小写后是否包含 `gzip`
    pub fn accepts_gzip(&self) -> bool {
        match self.header("accept-encoding") {
            Some(value) => value.split(',').any(|token| {
                token
                    .split(';')
                    .next()
                    .map(|t| t.trim().eq_ignore_ascii_case("gzip"))
                    .unwrap_or(false)
            }),
            None => false,
        }
    }

    /// CORS 预检：OPTIONS 且同时带有 `Origin` 与 `Access-Control-Request-Method`
    pub fn is_preflight(&self) -> bool {
        self.method == Some(HttpRequestMethod::Options)
            && self.origin().is_some()
            && self.header("access-control-request-method").is_some()
    }
}
