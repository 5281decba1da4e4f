//! HTTP 响应：状态码、有序标头列表与响应体，以及写入套接字的逻辑。
//!
//! 标头在响应头发出后被锁定（`headers_sent`），之后的修改都会被忽略。
//! 响应体要么是内存中的字节，要么是打开的文件句柄；文件会分块流式发送，
//! 需要压缩时每一块都经过 gzip 编码器。

use crate::param::*;

use bytes::Bytes;
use chrono::prelude::*;
use flate2::{write::GzEncoder, Compression};
use log::debug;
use tokio::{
    fs::File,
    io::{self, AsyncReadExt, AsyncWrite, AsyncWriteExt},
};

use std::io::Write;

/// 响应体
#[derive(Debug, Default)]
pub enum Body {
    #[default]
    Empty,
    /// 预先生成的内容（目录列表、错误页面）
    Bytes(Bytes),
    /// 打开的文件及其大小，发送时再读取
    File { file: File, size: u64 },
}

impl Body {
    pub fn len(&self) -> u64 {
        match self {
            Body::Empty => 0,
            Body::Bytes(b) => b.len() as u64,
            Body::File { size, .. } => *size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub struct Response {
    status_code: u16,
    headers: Vec<(String, String)>,
    headers_sent: bool,
    body: Body,
    gzip: bool,
    head_only: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            status_code: 200,
            headers: vec![],
            headers_sent: false,
            body: Body::Empty,
            gzip: false,
            head_only: false,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &'static str {
        status_text(self.status_code)
    }

    pub fn set_status(&mut self, code: u16) -> &mut Self {
        if !self.headers_sent {
            self.status_code = code;
        }
        self
    }

    /// 设置标头，名称统一转为 Title-Kebab-Case
    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.set_raw_header(&header_case(name), value)
    }

    /// 设置标头并保留名称的原始大小写，同名（不区分大小写）的旧值会被替换
    pub fn set_raw_header(&mut self, name: &str, value: &str) -> &mut Self {
        if self.headers_sent {
            return self;
        }
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some(entry) => *entry = (name.to_string(), value.to_string()),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
        self
    }

    pub fn remove_header(&mut self, name: &str) -> &mut Self {
        if !self.headers_sent {
            self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        }
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    pub fn set_body(&mut self, body: Body) -> &mut Self {
        self.body = body;
        self
    }

    /// 启用后省略 `Content-Length`，并以 gzip 编码发送响应体
    pub fn set_gzip(&mut self, gzip: bool) -> &mut Self {
        if !self.headers_sent {
            self.gzip = gzip;
        }
        self
    }

    /// 只发送响应头（HEAD 请求），标头仍按完整响应计算
    pub fn set_head_only(&mut self, head_only: bool) -> &mut Self {
        self.head_only = head_only;
        self
    }

    /// 生成响应头并锁定标头。
    ///
    /// 在这里补齐 `Content-Length`/`Content-Encoding`、`Date`、`Server` 与 `Connection`。
    pub fn head_bytes(&mut self) -> Vec<u8> {
        if !self.headers_sent {
            if self.gzip {
                self.remove_header("content-length");
                self.set_header("content-encoding", "gzip");
            } else if self.header("content-length").is_none() {
                let length = self.body.len().to_string();
                self.set_header("content-length", &length);
            }
            self.set_header("date", &format_date(&Utc::now()));
            self.set_header("server", SERVER_NAME);
            self.set_header("connection", "close");
            self.headers_sent = true;
        }

        let mut head = format!(
            "{} {} {}{}",
            HttpVersion::V1_1,
            self.status_code,
            self.information(),
            CRLF
        );
        for (name, value) in &self.headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str(CRLF);
        }
        head.push_str(CRLF);
        head.into_bytes()
    }

    /// 把响应写入流，返回写出的响应体字节数（压缩后）。
    ///
    /// 响应体在写出后被取走，再次调用只会重复响应头。
    pub async fn write_to<W>(&mut self, stream: &mut W) -> io::Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let head = self.head_bytes();
        stream.write_all(&head).await?;

        let body = std::mem::take(&mut self.body);
        if self.head_only {
            stream.flush().await?;
            return Ok(0);
        }

        let sent = match body {
            Body::Empty => 0,
            Body::Bytes(data) => {
                let data = if self.gzip {
                    Bytes::from(compress(&data)?)
                } else {
                    data
                };
                stream.write_all(&data).await?;
                data.len() as u64
            }
            Body::File { file, size } => stream_file(file, size, self.gzip, stream).await?,
        };
        stream.flush().await?;
        Ok(sent)
    }
}

/// 分块读取文件写入流，不会把整个文件读入内存
async fn stream_file<W>(mut file: File, size: u64, gzip: bool, stream: &mut W) -> io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; STREAM_CHUNK_SIZE];
    let mut encoder = if gzip {
        Some(GzEncoder::new(Vec::new(), Compression::default()))
    } else {
        None
    };
    let mut total_read = 0u64;
    let mut total_sent = 0u64;

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        total_read += n as u64;
        match encoder.as_mut() {
            Some(encoder) => {
                encoder.write_all(&buffer[..n])?;
                let pending = std::mem::take(encoder.get_mut());
                if !pending.is_empty() {
                    stream.write_all(&pending).await?;
                    total_sent += pending.len() as u64;
                }
            }
            None => {
                stream.write_all(&buffer[..n]).await?;
                total_sent += n as u64;
            }
        }
    }
    if let Some(encoder) = encoder {
        let rest = encoder.finish()?;
        stream.write_all(&rest).await?;
        total_sent += rest.len() as u64;
    }
    debug!("流式传输完成，文件大小: {} bytes，读取 {} bytes，发送 {} bytes", size, total_read, total_sent);
    Ok(total_sent)
}

/// IMF-fixdate，例如 `Sun, 06 Nov 1994 08:49:37 GMT`
fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn compress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    let compressed = encoder.finish()?;
    debug!(
        "压缩完成: 原始大小: {} bytes, 压缩后: {} bytes",
        data.len(),
        compressed.len()
    );
    Ok(compressed)
}
