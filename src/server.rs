//! TCP 服务端：按端口列表依次尝试绑定，每个连接派生一个任务处理单个请求。

use std::{
    io,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use log::{debug, info, warn};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpListener,
    sync::watch,
};

use crate::{
    config::RuntimeOptions,
    exception::Exception,
    handler::{RequestHandler, RequestMeta},
    param::{MAX_DISCARD_BODY, MAX_HEAD_SIZE},
    request::{find_head_end, Request},
    resolver::FileResolver,
};

/// 请求日志的接收者，由调用方注入
#[cfg_attr(test, mockall::automock)]
pub trait RequestLog: Send + Sync {
    fn request(&self, meta: &RequestMeta);
}

/// 运行状态计数
#[derive(Debug, Default)]
pub struct ServerStats {
    active: AtomicUsize,
    served: AtomicU64,
}

impl ServerStats {
    /// 当前活跃连接数
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// 已完成的请求总数
    pub fn served(&self) -> u64 {
        self.served.load(Ordering::SeqCst)
    }
}

/// 停机信号，可以被复制到任意任务中触发
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }
}

/// 按顺序尝试绑定端口。端口被占用时尝试下一个，其他错误直接返回。
pub async fn bind_first(host: &str, ports: &[u16]) -> io::Result<TcpListener> {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    for port in ports {
        match TcpListener::bind((host, *port)).await {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                warn!("端口{}已被占用，尝试下一个端口", port);
            }
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AddrInUse,
        format!("no available port in {:?}", ports),
    ))
}

pub struct Server {
    listener: TcpListener,
    options: Arc<RuntimeOptions>,
    resolver: Arc<FileResolver>,
    logger: Arc<dyn RequestLog>,
    stats: Arc<ServerStats>,
    shutdown: ShutdownHandle,
}

impl Server {
    /// 绑定 `options` 中的主机与端口列表
    pub async fn bind(options: Arc<RuntimeOptions>, logger: Arc<dyn RequestLog>) -> io::Result<Self> {
        let listener = bind_first(options.host(), options.ports()).await?;
        Self::with_listener(listener, options, logger)
    }

    /// 使用已经绑定好的监听器
    pub fn with_listener(
        listener: TcpListener,
        options: Arc<RuntimeOptions>,
        logger: Arc<dyn RequestLog>,
    ) -> io::Result<Self> {
        let resolver = FileResolver::new(&options)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let (sender, _) = watch::channel(false);
        Ok(Self {
            listener,
            options,
            resolver: Arc::new(resolver),
            logger,
            stats: Arc::new(ServerStats::default()),
            shutdown: ShutdownHandle {
                sender: Arc::new(sender),
            },
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// 可访问的地址，例如 `http://127.0.0.1:8080`
    pub fn url(&self) -> io::Result<String> {
        Ok(format!("http://{}", self.local_addr()?))
    }

    pub fn stats(&self) -> Arc<ServerStats> {
        Arc::clone(&self.stats)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// 主事件循环：持续接收新连接，直到收到停机信号
    pub async fn run(self) {
        let mut shutdown = self.shutdown.sender.subscribe();
        let mut id: u128 = 0;

        loop {
            if *shutdown.borrow_and_update() {
                info!("主循环接收到停机指令，正在退出...");
                break;
            }

            let accepted = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                accepted = self.listener.accept() => accepted,
            };

            let (mut stream, addr) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("接受连接失败：{}", e);
                    continue;
                }
            };
            debug!("[ID{}]TCP连接已建立：{}", id, addr);

            let resolver = Arc::clone(&self.resolver);
            let options = Arc::clone(&self.options);
            let logger = Arc::clone(&self.logger);
            let stats = Arc::clone(&self.stats);
            tokio::spawn(async move {
                stats.active.fetch_add(1, Ordering::SeqCst);
                if let Some(meta) =
                    handle_connection(&mut stream, id, &resolver, &options).await
                {
                    logger.request(&meta);
                    stats.served.fetch_add(1, Ordering::SeqCst);
                }
                stats.active.fetch_sub(1, Ordering::SeqCst);
            });
            id += 1;
        }
    }
}

/// 读取请求头，返回 `(请求头, 已经读到的请求体部分)`
async fn read_head<S>(stream: &mut S) -> Result<(Vec<u8>, Vec<u8>), Exception>
where
    S: AsyncRead + Unpin,
{
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        if let Some(end) = find_head_end(&buffer) {
            let rest = buffer.split_off(end);
            return Ok((buffer, rest));
        }
        if buffer.len() > MAX_HEAD_SIZE {
            return Err(Exception::HeaderTooLarge);
        }
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return Err(Exception::ConnectionClosed),
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
        }
    }
}

/// 处理单个连接上的一个请求，写出响应后关闭连接。
///
/// 客户端在发送完整请求头之前断开时返回 `None`。
pub async fn handle_connection<S>(
    stream: &mut S,
    id: u128,
    resolver: &FileResolver,
    options: &RuntimeOptions,
) -> Option<RequestMeta>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let parsed = match read_head(stream).await {
        Ok((head, rest)) => {
            let parsed = Request::try_from(&head, id);
            if let Ok(request) = &parsed {
                discard_body(stream, request.content_length(), rest.len() as u64, id).await;
            }
            parsed
        }
        Err(Exception::ConnectionClosed) => {
            debug!("[ID{}]客户端在请求完成前关闭了连接", id);
            return None;
        }
        Err(e) => Err(e),
    };
    debug!("[ID{}]HTTP请求接收完毕", id);

    let mut handler = RequestHandler::new(id, parsed.as_ref().map_err(|e| *e), resolver, options);
    handler.process().await;

    match handler.send(stream).await {
        Ok(sent) => debug!("[ID{}]响应发送完毕，响应体 {} bytes", id, sent),
        Err(e) => warn!("[ID{}]发送响应失败：{}", id, e),
    }
    if let Err(e) = stream.shutdown().await {
        debug!("[ID{}]关闭连接失败：{}", id, e);
    }
    Some(handler.finish())
}

/// 读掉请求体，避免关闭连接时还有未读数据导致客户端收到 RST
async fn discard_body<S>(stream: &mut S, declared: u64, buffered: u64, id: u128)
where
    S: AsyncRead + Unpin,
{
    let remaining = declared.saturating_sub(buffered);
    if remaining == 0 {
        return;
    }
    if remaining > MAX_DISCARD_BODY {
        debug!("[ID{}]请求体过大（{} bytes），不再读取", id, remaining);
        return;
    }
    let mut limited = (&mut *stream).take(remaining);
    if let Err(e) = tokio::io::copy(&mut limited, &mut tokio::io::sink()).await {
        debug!("[ID{}]读取请求体失败：{}", id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptionsInput;
    use tokio::io::duplex;

    fn setup() -> (tempfile::TempDir, RuntimeOptions) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hello").unwrap();
        let options = RuntimeOptions::from_input(OptionsInput {
            root: Some(dir.path().to_string_lossy().into_owned()),
            ..Default::default()
        })
        .unwrap();
        (dir, options)
    }

    async fn exchange(options: &RuntimeOptions, raw: &[u8]) -> (Option<RequestMeta>, String) {
        let resolver = FileResolver::new(options).unwrap();
        let (mut client, mut server) = duplex(64 * 1024);
        client.write_all(raw).await.unwrap();
        let meta = handle_connection(&mut server, 7, &resolver, options).await;
        drop(server);
        let mut out = vec![];
        client.read_to_end(&mut out).await.unwrap();
        (meta, String::from_utf8_lossy(&out).into_owned())
    }

    #[tokio::test]
    async fn test_handle_connection() {
        let (_dir, options) = setup();
        let (meta, out) = exchange(&options, b"GET /hello.txt HTTP/1.1\r\nHost: x\r\n\r\n").await;
        let meta = meta.unwrap();
        assert_eq!(meta.id, 7);
        assert_eq!(meta.status, 200);
        assert_eq!(meta.local_path.as_deref(), Some("hello.txt"));
        assert!(meta.timing.send.is_some());
        assert!(meta.timing.close.is_some());
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.contains("Connection: close\r\n"));
        assert!(out.ends_with("\r\n\r\nhello"));
    }

    #[tokio::test]
    async fn test_post_body_is_discarded() {
        let (_dir, options) = setup();
        let (meta, out) = exchange(
            &options,
            b"POST /hello.txt HTTP/1.1\r\nContent-Length: 9\r\n\r\nignore me",
        )
        .await;
        assert_eq!(meta.unwrap().status, 200);
        assert!(out.ends_with("hello"));
    }

    #[tokio::test]
    async fn test_malformed_head() {
        let (_dir, options) = setup();
        let (meta, out) = exchange(&options, b"GARBAGE\r\n\r\n").await;
        assert_eq!(meta.unwrap().status, 400);
        assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn test_head_too_large() {
        let (_dir, options) = setup();
        let mut raw = b"GET / HTTP/1.1\r\nX-Big: ".to_vec();
        raw.extend(std::iter::repeat(b'a').take(MAX_HEAD_SIZE + 10));
        let (meta, _) = exchange(&options, &raw).await;
        let meta = meta.unwrap();
        assert_eq!(meta.status, 400);
        assert_eq!(meta.error.as_deref(), Some("Request head too large"));
    }

    #[tokio::test]
    async fn test_client_closed_early() {
        let (_dir, options) = setup();
        let resolver = FileResolver::new(&options).unwrap();
        let (mut client, mut server) = duplex(1024);
        client.write_all(b"GET / HTT").await.unwrap();
        drop(client);
        assert!(handle_connection(&mut server, 1, &resolver, &options).await.is_none());
    }

    #[tokio::test]
    async fn test_server_reports_each_request_once() {
        let (_dir, options) = setup();
        let mut log = MockRequestLog::new();
        log.expect_request()
            .withf(|meta: &RequestMeta| meta.status == 200 && meta.url == "/hello.txt")
            .times(1)
            .return_const(());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Server::with_listener(listener, Arc::new(options), Arc::new(log)).unwrap();
        let addr = server.local_addr().unwrap();
        let stats = server.stats();
        let shutdown = server.shutdown_handle();
        let task = tokio::spawn(server.run());

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /hello.txt HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();
        let mut out = vec![];
        stream.read_to_end(&mut out).await.unwrap();
        assert!(String::from_utf8_lossy(&out).ends_with("hello"));

        // 等待日志回调完成
        for _ in 0..100 {
            if stats.served() == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(stats.served(), 1);

        shutdown.trigger();
        assert!(shutdown.is_triggered());
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_first_skips_used_port() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let taken_port = taken.local_addr().unwrap().port();
        let free = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let free_port = free.local_addr().unwrap().port();
        drop(free);

        let listener = bind_first("127.0.0.1", &[taken_port, free_port]).await.unwrap();
        assert_eq!(listener.local_addr().unwrap().port(), free_port);

        let err = bind_first("127.0.0.1", &[taken_port]).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);
    }
}
