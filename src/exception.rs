// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了 Web 服务器在读取和解析请求报文时可能出现的各类异常情况。
//!
//! 文件系统层面的错误不在此列：解析器会把它们吞掉并折算为 404，
//! 文件响应阶段的错误则被记录到请求元数据中，再转为对应的错误页面。

use std::fmt;

/// 服务器读取、解析请求过程中发生的异常类型。
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Exception {
    /// 客户端发送的请求头无法解析为合法的 UTF-8 字符串。
    RequestIsNotUtf8,
    /// 请求行或标头的格式不符合 HTTP/1.x 语法。
    MalformedRequest,
    /// 客户端使用了服务器不支持的 HTTP 协议版本（例如 HTTP/0.9 或 HTTP/2.0）。
    UnsupportedHttpVersion,
    /// 请求头超出了 `MAX_HEAD_SIZE` 限制。
    HeaderTooLarge,
    /// 客户端在发送完整请求头之前关闭了连接。
    ConnectionClosed,
}

use Exception::*;

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIsNotUtf8 => write!(f, "Request bytes can't be parsed in UTF-8"),
            MalformedRequest => write!(f, "Malformed request head"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            HeaderTooLarge => write!(f, "Request head too large"),
            ConnectionClosed => write!(f, "Connection closed before request was complete"),
        }
    }
}

impl std::error::Error for Exception {}
