// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Web 服务器协议参数与常量模块
//!
//! 该模块定义了 `devserve` 遵循的 HTTP 协议相关常量和数据结构，包括：
//! - 常见的 HTTP 状态码及其原因短语（Reason Phrase）。
//! - HTTP 方法、版本的强类型枚举。
//! - 请求头长度、压缩上限等运行限制。

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt;

/// 服务器名称标识，用于 HTTP 响应头的 `Server` 字段
pub const SERVER_NAME: &str = "devserve";

/// HTTP 协议规定的换行符（Carriage Return Line Feed）
pub const CRLF: &str = "\r\n";

/// 请求头（请求行 + 全部标头）允许的最大字节数
pub const MAX_HEAD_SIZE: usize = 16 * 1024;

/// 可以被丢弃读取的请求体上限，超过该值时不再读取而是直接关闭连接
pub const MAX_DISCARD_BODY: u64 = 10 * 1024 * 1024;

/// 超过该大小的文本文件不再进行 gzip 压缩
pub const MAX_COMPRESS_SIZE: u64 = 50_000_000;

/// 流式传输时单次读取的块大小
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// CORS 预检结果允许被缓存的秒数
pub const CORS_MAX_AGE: u32 = 60;

/// 服务器允许处理的 HTTP 方法列表，顺序即 `Allow` 头中的顺序。
///
/// 不在该列表中的方法将触发 405 Method Not Allowed。
pub const ALLOWED_METHODS: [HttpRequestMethod; 4] = [
    HttpRequestMethod::Get,
    HttpRequestMethod::Head,
    HttpRequestMethod::Options,
    HttpRequestMethod::Post,
];

/// `Allow` 与 `Access-Control-Allow-Methods` 使用的方法列表字符串
pub fn allowed_methods_value() -> String {
    ALLOWED_METHODS
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

lazy_static! {
    /// HTTP 状态码与其对应的标准原因短语映射表。
    ///
    /// 参考标准：[RFC 9110: HTTP Semantics](https://www.rfc-editor.org/rfc/rfc9110.html)。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        // 2xx: 成功响应 (Successful)
        map.insert(200, "OK");
        map.insert(204, "No Content");

        // 3xx: 重定向 (Redirection)
        map.insert(307, "Temporary Redirect");

        // 4xx: 客户端错误 (Client Error)
        map.insert(400, "Bad Request");
        map.insert(403, "Forbidden");
        map.insert(404, "Not Found");
        map.insert(405, "Method Not Allowed");

        // 5xx: 服务端错误 (Server Error)
        map.insert(500, "Internal Server Error");
        map
    };
}

/// 返回状态码对应的原因短语，未知状态码返回空字符串
pub fn status_text(code: u16) -> &'static str {
    STATUS_CODES.get(&code).copied().unwrap_or("")
}

/// 支持的 HTTP 协议版本
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpVersion {
    /// HTTP/1.0 版本
    V1_0,
    /// HTTP/1.1 版本
    V1_1,
}

/// 标准 HTTP 请求方法
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpRequestMethod {
    /// 获取资源
    Get,
    /// 获取资源的元数据（不包含响应体）
    Head,
    /// 查询服务器支持的选项，同时用于 CORS 预检
    Options,
    /// 与 GET 相同处理，请求体被忽略
    Post,
}

impl HttpRequestMethod {
    /// 从请求行中的方法名解析，方法名区分大小写（RFC 9110）。
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "GET" => Some(HttpRequestMethod::Get),
            "HEAD" => Some(HttpRequestMethod::Head),
            "OPTIONS" => Some(HttpRequestMethod::Options),
            "POST" => Some(HttpRequestMethod::Post),
            _ => None,
        }
    }
}

impl fmt::Display for HttpVersion {
    /// 将枚举格式化为 HTTP 报文中的版本字符串
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpVersion::V1_0 => write!(f, "HTTP/1.0"),
            HttpVersion::V1_1 => write!(f, "HTTP/1.1"),
        }
    }
}

impl fmt::Display for HttpRequestMethod {
    /// 将枚举格式化为 HTTP 标准大写方法名
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpRequestMethod::Get => write!(f, "GET"),
            HttpRequestMethod::Head => write!(f, "HEAD"),
            HttpRequestMethod::Options => write!(f, "OPTIONS"),
            HttpRequestMethod::Post => write!(f, "POST"),
        }
    }
}

/// 将标头名转换为 Title-Kebab-Case，例如 `access-control-allow-origin`
/// 转换为 `Access-Control-Allow-Origin`。
pub fn header_case(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => {
                    let mut word = first.to_ascii_uppercase().to_string();
                    word.push_str(&chars.as_str().to_ascii_lowercase());
                    word
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}
