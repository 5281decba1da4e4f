//! 集成测试共用的服务器启动与原始 HTTP 收发工具。

#![allow(dead_code)]

use std::{net::SocketAddr, path::Path, sync::Arc};

use devserve::{
    config::{OptionsInput, RuntimeOptions},
    handler::RequestMeta,
    server::{RequestLog, Server, ShutdownHandle},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

struct NullLog;

impl RequestLog for NullLog {
    fn request(&self, _meta: &RequestMeta) {}
}

pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: ShutdownHandle,
    task: JoinHandle<()>,
}

impl TestServer {
    /// 在临时端口上启动服务器，`input.root` 会被替换为 `root`
    pub async fn start(root: &Path, input: OptionsInput) -> TestServer {
        let options = RuntimeOptions::from_input(OptionsInput {
            root: Some(root.to_string_lossy().into_owned()),
            ..input
        })
        .unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Server::with_listener(listener, Arc::new(options), Arc::new(NullLog)).unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();
        let task = tokio::spawn(server.run());
        TestServer {
            addr,
            shutdown,
            task,
        }
    }

    /// 发送原始请求，读取到连接关闭为止
    pub async fn send_raw(&self, raw: &[u8]) -> RawResponse {
        let mut stream = TcpStream::connect(self.addr).await.unwrap();
        stream.write_all(raw).await.unwrap();
        let mut out = vec![];
        stream.read_to_end(&mut out).await.unwrap();
        RawResponse::parse(&out)
    }

    pub async fn request(&self, method: &str, path: &str, headers: &[(&str, &str)]) -> RawResponse {
        let mut raw = format!("{} {} HTTP/1.1\r\nHost: {}\r\n", method, path, self.addr);
        for (name, value) in headers {
            raw.push_str(&format!("{}: {}\r\n", name, value));
        }
        raw.push_str("\r\n");
        self.send_raw(raw.as_bytes()).await
    }

    pub async fn get(&self, path: &str) -> RawResponse {
        self.request("GET", path, &[]).await
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        self.task.await.unwrap();
    }
}

pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    fn parse(raw: &[u8]) -> RawResponse {
        let end = raw
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("response without head terminator");
        let head = String::from_utf8_lossy(&raw[..end]).into_owned();
        let mut lines = head.split("\r\n");
        let status = lines
            .next()
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let headers = lines
            .filter_map(|l| l.split_once(": "))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RawResponse {
            status,
            headers,
            body: raw[end + 4..].to_vec(),
        }
    }

    /// 标头名称精确匹配（区分大小写），用于检查输出的大小写
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// 常用的站点目录结构
pub fn site() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let write = |path: &str, content: &[u8]| {
        let full = root.join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, content).unwrap();
    };
    write("index.html", b"<!doctype html><title>home</title>");
    write("manifest.json", b"{\"name\":\"site\"}");
    write("readme.md", "# Readme\n\nSome text.\n".repeat(50).as_bytes());
    write("section/page.html", b"<p>page</p>");
    write("docs/guide.txt", b"guide");
    write("docs/api.html", b"api");
    write(".env", b"SECRET=1");
    write(".git/HEAD", b"ref: refs/heads/main");
    write(".well-known/security.txt", b"Contact: mailto:a@b.c");
    write("image.bin", &[0x89, 0x50, 0x4e, 0x47, 0x00, 0x01, 0x02]);
    dir
}
