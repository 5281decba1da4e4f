// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 请求处理流程
//!
//! 每个请求创建一个 `RequestHandler`，按以下顺序分派：
//! 1. 方法不受支持 → 405；请求头或 URL 无法解析 → 400。
//! 2. `OPTIONS *` → 204。
//! 3. 校验 URL 路径，交给解析器查找文件。
//! 4. 需要时发出 307 重定向（合并连续斜杠、尾部斜杠策略）。
//! 5. 文件 → 文件响应；目录且允许列表 → 目录列表；其余 → 错误页面。

use std::time::{Duration, Instant};

use bytes::Bytes;
use lazy_static::lazy_static;
use log::{debug, warn};
use percent_encoding::percent_decode_str;
use regex::Regex;
use tokio::{fs::File, io::AsyncWrite};

use crate::{
    config::{RuntimeOptions, TrailingSlash},
    content_type::{self, TypeResult},
    exception::Exception,
    fs_probe::{self, FsKind, FsLocation},
    html::HtmlBuilder,
    param::*,
    request::Request,
    resolver::FileResolver,
    response::{Body, Response},
};

lazy_static! {
    static ref SLASH_RUN: Regex = Regex::new(r"/{2,}").unwrap();
    static ref HEADER_TOKEN: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
}

/// 用户规则中不允许覆盖的标头（小写）
const BLOCKED_RULE_HEADERS: [&str; 2] = ["content-encoding", "content-length"];

/// 请求各阶段的时间点
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub start: Instant,
    /// 开始发送响应
    pub send: Option<Instant>,
    /// 连接关闭
    pub close: Option<Instant>,
}

impl Timing {
    /// 从开始到关闭（或到现在）经过的时间
    pub fn elapsed(&self) -> Duration {
        match self.close {
            Some(close) => close.duration_since(self.start),
            None => self.start.elapsed(),
        }
    }
}

/// 单个请求的元数据，供日志使用
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub id: u128,
    pub method: String,
    pub status: u16,
    /// 请求行中的原始目标
    pub url: String,
    /// 合并斜杠并解码后的路径
    pub url_path: Option<String>,
    /// 相对根目录的文件路径
    pub local_path: Option<String>,
    pub timing: Timing,
    pub error: Option<String>,
}

/// 拆分请求目标，返回 `(路径, 查询字符串)`，查询字符串包含开头的 `?`。
///
/// 支持 origin-form（`/a?b`）、absolute-form（`http://host/a`）和 `*`。
pub fn split_target(target: &str) -> Result<(String, String), String> {
    if target == "*" {
        return Ok(("*".to_string(), String::new()));
    }
    let rest = if target.starts_with('/') {
        target
    } else {
        let after_scheme = target
            .strip_prefix("http://")
            .or_else(|| target.strip_prefix("https://"))
            .ok_or_else(|| format!("Invalid URL: {}", target))?;
        match after_scheme.find('/') {
            Some(i) => &after_scheme[i..],
            None => "/",
        }
    };
    let rest = match rest.find('#') {
        Some(i) => &rest[..i],
        None => rest,
    };
    match rest.find('?') {
        Some(i) => Ok((rest[..i].to_string(), rest[i..].to_string())),
        None => Ok((rest.to_string(), String::new())),
    }
}

/// 把连续的 `/` 合并为一个
pub fn collapse_slashes(path: &str) -> String {
    SLASH_RUN.replace_all(path, "/").into_owned()
}

/// 校验并解码 URL 路径，任一片段非法时返回 `None`。
///
/// 片段解码后不能是 `.` 或 `..`，不能包含 `/` 或 `\`；原始片段不能包含 `?` 或 `#`。
pub fn decode_url_path(path: &str) -> Option<String> {
    if !path.starts_with('/') {
        return None;
    }
    let mut decoded = String::with_capacity(path.len());
    for (i, segment) in path.split('/').enumerate() {
        if i > 0 {
            decoded.push('/');
        }
        if segment.contains(['?', '#']) {
            return None;
        }
        let text = percent_decode_str(segment).decode_utf8().ok()?;
        if text == "." || text == ".." || text.contains(['/', '\\']) {
            return None;
        }
        decoded.push_str(&text);
    }
    Some(decoded)
}

/// 每个请求对应一个处理器，只在请求生命周期内存在
pub struct RequestHandler<'a> {
    request: Result<&'a Request, Exception>,
    resolver: &'a FileResolver,
    options: &'a RuntimeOptions,
    response: Response,
    file: Option<FsLocation>,
    /// `(路径, 查询字符串)`，解析失败时为错误信息
    url: Result<(String, String), String>,
    meta: RequestMeta,
}

impl<'a> RequestHandler<'a> {
    pub fn new(
        id: u128,
        request: Result<&'a Request, Exception>,
        resolver: &'a FileResolver,
        options: &'a RuntimeOptions,
    ) -> Self {
        let (method, url, parsed, error) = match request {
            Ok(req) => {
                let parsed = split_target(req.target());
                let error = parsed.as_ref().err().cloned();
                (req.method_name().to_string(), req.target().to_string(), parsed, error)
            }
            Err(e) => (String::new(), String::new(), Err(e.to_string()), Some(e.to_string())),
        };
        Self {
            request,
            resolver,
            options,
            response: Response::new(),
            file: None,
            url: parsed,
            meta: RequestMeta {
                id,
                method,
                status: 200,
                url,
                url_path: None,
                local_path: None,
                timing: Timing {
                    start: Instant::now(),
                    send: None,
                    close: None,
                },
                error,
            },
        }
    }

    pub fn meta(&self) -> &RequestMeta {
        &self.meta
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn file(&self) -> Option<&FsLocation> {
        self.file.as_ref()
    }

    fn method(&self) -> Option<HttpRequestMethod> {
        self.request.ok().and_then(|r| r.method())
    }

    fn set_status(&mut self, status: u16) {
        self.response.set_status(status);
        self.meta.status = status;
    }

    /// 主流程：构建完成后响应尚未写出，由 [`RequestHandler::send`] 发送
    pub async fn process(&mut self) {
        let request = match self.request {
            Ok(r) => r,
            Err(_) => {
                self.send_error_page(400);
                return;
            }
        };

        let method = match request.method() {
            Some(m) => m,
            None => {
                debug!("[ID{}]不支持的HTTP请求方法：{}", self.meta.id, request.method_name());
                self.send_error_page(405);
                return;
            }
        };

        let (raw_path, query) = match self.url.clone() {
            Ok(parts) => parts,
            Err(_) => {
                self.send_error_page(400);
                return;
            }
        };

        if method == HttpRequestMethod::Options && raw_path == "*" {
            self.set_status(204);
            self.response.set_header("allow", &allowed_methods_value());
            return;
        }

        let collapsed = collapse_slashes(&raw_path);
        let decoded = match decode_url_path(&collapsed) {
            Some(d) => d,
            None => {
                self.meta.error = Some(format!("Invalid URL path: {}", raw_path));
                self.send_error_page(400);
                return;
            }
        };
        self.meta.url_path = Some(decoded.clone());

        let resolution = self.resolver.find(&decoded).await;
        self.set_status(resolution.status);
        self.meta.local_path = resolution
            .file
            .as_ref()
            .and_then(|f| self.resolver.local_path(&f.file_path));
        self.file = resolution.file;

        if let Some(location) = self
            .redirect_target(method, &raw_path, &collapsed, &decoded)
            .await
        {
            self.send_redirect(&format!("{}{}", location, query));
            return;
        }

        let effective = match (&self.file, self.meta.status) {
            (Some(file), 200) => Some(file.effective().clone()),
            _ => None,
        };
        match effective {
            Some(target) if target.kind == FsKind::File => self.send_file(&target).await,
            Some(target) if target.kind == FsKind::Dir && self.options.list() => {
                self.send_list(&target).await
            }
            _ => {
                let status = match self.meta.status {
                    200 => 404,
                    s => s,
                };
                self.send_error_page(status);
            }
        }
    }

    /// 计算重定向目标，不需要重定向时返回 `None`。
    ///
    /// 连续斜杠总是会被合并；尾部斜杠只在找到文件时按策略调整。
    async fn redirect_target(
        &self,
        method: HttpRequestMethod,
        raw_path: &str,
        collapsed: &str,
        decoded: &str,
    ) -> Option<String> {
        let mut location = collapsed.to_string();

        let slash_applies = matches!(
            method,
            HttpRequestMethod::Get | HttpRequestMethod::Head | HttpRequestMethod::Post
        ) && collapsed.len() >= 2
            && self.meta.status == 200;

        if let (true, Some(file)) = (slash_applies, &self.file) {
            let has_slash = collapsed.ends_with('/');
            let want_slash = match self.options.trailing_slash() {
                TrailingSlash::Ignore => has_slash,
                TrailingSlash::Always => true,
                TrailingSlash::Never => false,
                TrailingSlash::Auto => self.auto_wants_slash(file, decoded).await,
            };
            if want_slash && !has_slash {
                location.push('/');
            } else if !want_slash && has_slash {
                location = location.trim_end_matches('/').to_string();
                if location.is_empty() {
                    location.push('/');
                }
            }
        }

        if location != raw_path {
            Some(location)
        } else {
            None
        }
    }

    /// `auto` 策略：目录和索引文件使用尾部斜杠，文件本身（包括通过追加扩展名
    /// 匹配到的文件）不使用。
    ///
    /// 链接按目标判断：指向目录的链接解析出的索引文件位于链接真实路径之下。
    async fn auto_wants_slash(&self, file: &FsLocation, decoded: &str) -> bool {
        if file.is_dir_like() {
            return true;
        }
        let requested = match self.resolver.resolve_path(decoded) {
            Some(p) => p,
            None => return false,
        };
        let (served, requested) = match &file.target {
            Some(target) if file.kind == FsKind::Link => match fs_probe::real_path(&requested).await {
                Some(real) => (&target.file_path, real),
                None => return false,
            },
            _ => (&file.file_path, requested),
        };
        if *served == requested {
            return false;
        }
        // 通过目录索引找到的文件
        served.parent() == Some(requested.as_path())
    }

    fn send_redirect(&mut self, location: &str) {
        debug!("[ID{}]重定向到 {}", self.meta.id, location);
        self.set_status(307);
        self.response
            .set_header("location", location)
            .set_body(Body::Empty);
    }

    /// 组装标头：Allow、Content-Type、CORS 以及用户规则。
    fn set_headers(&mut self, content_type: Option<&str>, cors: bool, rules: bool) {
        let method = self.method();
        let is_options = method == Some(HttpRequestMethod::Options);

        if is_options || self.meta.status == 405 {
            self.response.set_header("allow", &allowed_methods_value());
        }
        if let (false, Some(value)) = (is_options, content_type) {
            self.response.set_header("content-type", value);
        }

        if let (true, true, Ok(request)) = (cors, self.options.cors(), self.request) {
            if let Some(origin) = request.origin() {
                self.response
                    .set_header("access-control-allow-origin", origin);
                if request.is_preflight() {
                    self.response
                        .set_header("access-control-allow-methods", &allowed_methods_value())
                        .set_header("access-control-max-age", &CORS_MAX_AGE.to_string());
                    if let Some(value) = request.header("access-control-request-headers") {
                        let tokens: Vec<&str> = value.split(',').map(|t| t.trim()).collect();
                        if tokens.iter().all(|t| HEADER_TOKEN.is_match(t)) {
                            self.response
                                .set_header("access-control-allow-headers", &tokens.join(", "));
                        }
                    }
                }
            }
        }

        if rules {
            let local_path = self.meta.local_path.as_deref();
            for rule in self.options.headers() {
                if !rule.applies_to(local_path) {
                    continue;
                }
                for (name, value) in rule.headers() {
                    if BLOCKED_RULE_HEADERS
                        .iter()
                        .any(|b| name.eq_ignore_ascii_case(b))
                    {
                        continue;
                    }
                    self.response.set_raw_header(name, value);
                }
            }
        }
    }

    fn can_compress(&self, content_type: &TypeResult, size: u64) -> bool {
        self.options.gzip()
            && content_type.is_text()
            && size <= MAX_COMPRESS_SIZE
            && self.request.map(|r| r.accepts_gzip()).unwrap_or(false)
    }

    /// 根据方法设置响应体：HEAD 只发响应头，OPTIONS 返回 204 空响应
    fn set_body(&mut self, body: Body, length: u64, gzip: bool) {
        match self.method() {
            Some(HttpRequestMethod::Options) => {
                self.set_status(204);
                self.response.set_body(Body::Empty);
            }
            method => {
                if !gzip {
                    self.response
                        .set_header("content-length", &length.to_string());
                }
                self.response
                    .set_gzip(gzip)
                    .set_head_only(method == Some(HttpRequestMethod::Head))
                    .set_body(body);
            }
        }
    }

    async fn send_file(&mut self, target: &FsLocation) {
        let path = target.file_path.clone();
        if !self.resolver.within_root(&path) {
            warn!("[ID{}]文件 {} 不在根目录内", self.meta.id, path.display());
            self.send_error_page(404);
            return;
        }

        let mut file = match File::open(&path).await {
            Ok(f) => f,
            Err(e) => {
                let status = match e.kind() {
                    std::io::ErrorKind::ResourceBusy => 403,
                    _ => 500,
                };
                self.meta.error = Some(e.to_string());
                self.send_error_page(status);
                return;
            }
        };
        let size = match file.metadata().await {
            Ok(meta) => meta.len(),
            Err(e) => {
                self.meta.error = Some(e.to_string());
                self.send_error_page(500);
                return;
            }
        };

        let content_type = content_type::get_content_type(Some(path.as_path()), Some(&mut file)).await;
        self.set_headers(Some(&content_type.to_header_value()), true, true);
        let gzip = self.can_compress(&content_type, size);
        self.set_body(Body::File { file, size }, size, gzip);
    }

    async fn send_list(&mut self, target: &FsLocation) {
        let items = self.resolver.index(&target.file_path).await;
        let root_name = self
            .resolver
            .root()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let url_path = match &self.url {
            Ok((path, _)) => collapse_slashes(path),
            Err(_) => "/".to_string(),
        };
        let html = HtmlBuilder::from_dir(&root_name, &url_path, &items, self.options.ext()).build();
        self.send_html(html, false, false);
    }

    fn send_error_page(&mut self, status: u16) {
        self.set_status(status);
        let url_path = match &self.url {
            Ok((path, _)) => path.clone(),
            Err(_) => String::new(),
        };
        let html = HtmlBuilder::from_status_code(status, &url_path).build();
        self.file = None;
        self.send_html(html, true, false);
    }

    fn send_html(&mut self, html: String, cors: bool, rules: bool) {
        let content_type = content_type::type_for_file_path("page.html");
        self.set_headers(Some(&content_type.to_header_value()), cors, rules);
        let size = html.len() as u64;
        let gzip = self.can_compress(&content_type, size);
        self.set_body(Body::Bytes(Bytes::from(html)), size, gzip);
    }

    /// 写出响应，记录开始发送的时间
    pub async fn send<W>(&mut self, stream: &mut W) -> std::io::Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        self.meta.timing.send = Some(Instant::now());
        let result = self.response.write_to(stream).await;
        if let Err(e) = &result {
            self.meta.error = Some(e.to_string());
        }
        result
    }

    /// 连接关闭后调用，返回完整的请求元数据
    pub fn finish(mut self) -> RequestMeta {
        self.meta.timing.close = Some(Instant::now());
        self.meta.status = self.response.status_code();
        self.meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptionsInput;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use std::path::Path;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(root.join("index.html"), "<h1>home</h1>").unwrap();
        std::fs::write(root.join("manifest.json"), "{}").unwrap();
        std::fs::write(root.join("readme.md"), "# readme\n".repeat(20)).unwrap();
        std::fs::write(root.join(".env"), "SECRET=1").unwrap();
        std::fs::write(root.join("blob"), [0u8, 1, 2, 3, 0x1b, 0xff]).unwrap();
        std::fs::create_dir_all(root.join("section")).unwrap();
        std::fs::write(root.join("section/page.html"), "page").unwrap();
        std::fs::create_dir_all(root.join("docs")).unwrap();
        std::fs::write(root.join("docs/notes.txt"), "notes").unwrap();
        std::fs::create_dir_all(root.join("blog")).unwrap();
        std::fs::write(root.join("blog/index.html"), "blog").unwrap();
        std::fs::create_dir_all(root.join(".well-known")).unwrap();
        std::fs::write(root.join(".well-known/security.txt"), "contact").unwrap();
        dir
    }

    fn options(root: &Path, input: OptionsInput) -> RuntimeOptions {
        RuntimeOptions::from_input(OptionsInput {
            root: Some(root.to_string_lossy().into_owned()),
            ..input
        })
        .unwrap()
    }

    struct Outcome {
        meta: RequestMeta,
        head: String,
        body: Vec<u8>,
    }

    impl Outcome {
        fn header(&self, name: &str) -> Option<String> {
            let prefix = format!("{}: ", name);
            self.head
                .split("\r\n")
                .find(|line| line.starts_with(&prefix))
                .map(|line| line[prefix.len()..].to_string())
        }
    }

    async fn run(options: &RuntimeOptions, raw: &str) -> Outcome {
        let resolver = FileResolver::new(options).unwrap();
        let parsed = Request::try_from(raw.as_bytes(), 1);
        let mut handler = RequestHandler::new(1, parsed.as_ref().map_err(|e| *e), &resolver, options);
        handler.process().await;
        let mut out: Vec<u8> = vec![];
        handler.send(&mut out).await.unwrap();
        let meta = handler.finish();
        let pos = out.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
        Outcome {
            meta,
            head: String::from_utf8(out[..pos + 4].to_vec()).unwrap(),
            body: out[pos + 4..].to_vec(),
        }
    }

    async fn get(options: &RuntimeOptions, path: &str) -> Outcome {
        run(options, &format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", path)).await
    }

    #[test]
    fn test_split_target() {
        assert_eq!(split_target("/a?b=1#c").unwrap(), ("/a".to_string(), "?b=1".to_string()));
        assert_eq!(split_target("http://host:80/x/y").unwrap().0, "/x/y");
        assert_eq!(split_target("https://host").unwrap().0, "/");
        assert_eq!(split_target("*").unwrap().0, "*");
        assert!(split_target("relative/path").is_err());
    }

    #[test]
    fn test_decode_url_path() {
        assert_eq!(decode_url_path("/a%20b/c").as_deref(), Some("/a b/c"));
        assert_eq!(decode_url_path("/").as_deref(), Some("/"));
        assert!(decode_url_path("a/b").is_none());
        assert!(decode_url_path("/a/../b").is_none());
        assert!(decode_url_path("/%2E%2E/etc/passwd").is_none());
        assert!(decode_url_path("/./a").is_none());
        assert!(decode_url_path("/a%2Fb").is_none());
        assert!(decode_url_path("/a%5Cb").is_none());
        assert!(decode_url_path("/%FF").is_none());
        assert_eq!(collapse_slashes("//a///b/"), "/a/b/");
    }

    #[tokio::test]
    async fn test_index_fallback() {
        let dir = fixture();
        let opts = options(dir.path(), OptionsInput::default());
        let out = get(&opts, "/").await;
        assert_eq!(out.meta.status, 200);
        assert_eq!(out.body, b"<h1>home</h1>");
        assert_eq!(out.header("Content-Type").as_deref(), Some("text/html; charset=UTF-8"));
        assert_eq!(out.header("Content-Length").as_deref(), Some("13"));
        assert_eq!(out.meta.local_path.as_deref(), Some("index.html"));
    }

    #[tokio::test]
    async fn test_extensionless_url() {
        let dir = fixture();
        let opts = options(dir.path(), OptionsInput::default());
        let out = get(&opts, "/section/page").await;
        assert_eq!(out.meta.status, 200);
        assert_eq!(out.body, b"page");
        assert_eq!(out.meta.local_path.as_deref(), Some("section/page.html"));
    }

    #[tokio::test]
    async fn test_default_excludes() {
        let dir = fixture();
        let opts = options(dir.path(), OptionsInput::default());
        assert_eq!(get(&opts, "/.env").await.meta.status, 404);
        assert_eq!(get(&opts, "/.well-known/security.txt").await.meta.status, 200);
        let listing = get(&opts, "/.well-known/").await;
        assert_eq!(listing.meta.status, 200);
        assert!(String::from_utf8_lossy(&listing.body).contains("security.txt"));

        let no_list = options(
            dir.path(),
            OptionsInput {
                list: Some(false),
                ..Default::default()
            },
        );
        assert_eq!(get(&no_list, "/.well-known/").await.meta.status, 404);
    }

    #[tokio::test]
    async fn test_trailing_slash_auto() {
        let dir = fixture();
        let opts = options(dir.path(), OptionsInput::default());

        let out = get(&opts, "/section/page/").await;
        assert_eq!(out.meta.status, 307);
        assert_eq!(out.header("Location").as_deref(), Some("/section/page"));
        assert!(out.body.is_empty());

        let out = get(&opts, "/docs").await;
        assert_eq!(out.meta.status, 307);
        assert_eq!(out.header("Location").as_deref(), Some("/docs/"));

        let out = get(&opts, "/blog").await;
        assert_eq!(out.meta.status, 307);
        assert_eq!(out.header("Location").as_deref(), Some("/blog/"));

        let out = get(&opts, "/readme.md/").await;
        assert_eq!(out.header("Location").as_deref(), Some("/readme.md"));

        assert_eq!(get(&opts, "/blog/").await.meta.status, 200);
        assert_eq!(get(&opts, "/readme.md").await.meta.status, 200);
    }

    #[tokio::test]
    async fn test_trailing_slash_policies() {
        let dir = fixture();
        let always = options(
            dir.path(),
            OptionsInput {
                trailing_slash: Some("always".to_string()),
                ..Default::default()
            },
        );
        let out = get(&always, "/readme.md?x=1").await;
        assert_eq!(out.header("Location").as_deref(), Some("/readme.md/?x=1"));

        let never = options(
            dir.path(),
            OptionsInput {
                trailing_slash: Some("never".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(get(&never, "/docs/").await.header("Location").as_deref(), Some("/docs"));
        assert_eq!(get(&never, "/").await.meta.status, 200);

        let ignore = options(
            dir.path(),
            OptionsInput {
                trailing_slash: Some("ignore".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(get(&ignore, "/docs").await.meta.status, 200);
        assert_eq!(get(&ignore, "/readme.md/").await.meta.status, 200);
        assert_eq!(get(&ignore, "//docs").await.header("Location").as_deref(), Some("/docs"));
    }

    #[tokio::test]
    async fn test_collapse_redirect() {
        let dir = fixture();
        let opts = options(dir.path(), OptionsInput::default());
        let out = get(&opts, "//section//page?q").await;
        assert_eq!(out.meta.status, 307);
        assert_eq!(out.header("Location").as_deref(), Some("/section/page?q"));

        // 不存在的文件也会先合并斜杠
        let out = get(&opts, "/missing//file").await;
        assert_eq!(out.meta.status, 307);
        assert_eq!(out.header("Location").as_deref(), Some("/missing/file"));
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let dir = fixture();
        let opts = options(
            dir.path(),
            OptionsInput {
                cors: Some(true),
                ..Default::default()
            },
        );
        let out = run(
            &opts,
            "OPTIONS /manifest.json HTTP/1.1\r\nOrigin: https://example.com\r\nAccess-Control-Request-Method: POST\r\nAccess-Control-Request-Headers: X-Header1\r\n\r\n",
        )
        .await;
        assert_eq!(out.meta.status, 204);
        assert!(out.head.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert_eq!(out.header("Access-Control-Allow-Origin").as_deref(), Some("https://example.com"));
        assert_eq!(out.header("Access-Control-Allow-Methods").as_deref(), Some("GET, HEAD, OPTIONS, POST"));
        assert_eq!(out.header("Access-Control-Allow-Headers").as_deref(), Some("X-Header1"));
        assert_eq!(out.header("Access-Control-Max-Age").as_deref(), Some("60"));
        assert_eq!(out.header("Allow").as_deref(), Some("GET, HEAD, OPTIONS, POST"));
        assert_eq!(out.header("Content-Length").as_deref(), Some("0"));
        assert!(out.header("Content-Type").is_none());
        assert!(out.body.is_empty());
    }

    #[tokio::test]
    async fn test_cors_invalid_request_headers() {
        let dir = fixture();
        let opts = options(
            dir.path(),
            OptionsInput {
                cors: Some(true),
                ..Default::default()
            },
        );
        let out = run(
            &opts,
            "OPTIONS /manifest.json HTTP/1.1\r\nOrigin: https://a.test\r\nAccess-Control-Request-Method: GET\r\nAccess-Control-Request-Headers: X-Ok, Bad Header\r\n\r\n",
        )
        .await;
        assert!(out.header("Access-Control-Allow-Headers").is_none());

        // 非预检请求只有 Allow-Origin
        let out = run(&opts, "GET /manifest.json HTTP/1.1\r\nOrigin: https://a.test\r\n\r\n").await;
        assert_eq!(out.header("Access-Control-Allow-Origin").as_deref(), Some("https://a.test"));
        assert!(out.header("Access-Control-Allow-Methods").is_none());

        // 未开启 CORS
        let plain = options(dir.path(), OptionsInput::default());
        let out = run(&plain, "GET /manifest.json HTTP/1.1\r\nOrigin: https://a.test\r\n\r\n").await;
        assert!(out.header("Access-Control-Allow-Origin").is_none());
    }

    #[tokio::test]
    async fn test_options_asterisk() {
        let dir = fixture();
        let opts = options(dir.path(), OptionsInput::default());
        let out = run(&opts, "OPTIONS * HTTP/1.1\r\n\r\n").await;
        assert_eq!(out.meta.status, 204);
        assert_eq!(out.header("Allow").as_deref(), Some("GET, HEAD, OPTIONS, POST"));
        assert_eq!(out.header("Content-Length").as_deref(), Some("0"));
        assert!(out.body.is_empty());
    }

    #[tokio::test]
    async fn test_header_rules_blocklist() {
        let dir = fixture();
        let opts = options(
            dir.path(),
            OptionsInput {
                headers: Some(vec![
                    r#"*.* {"X-Header2": "two", "Content-Encoding": "br"}"#.to_string(),
                    "*.json x-json: yes".to_string(),
                ]),
                gzip: Some(false),
                ..Default::default()
            },
        );
        let out = get(&opts, "/readme.md").await;
        assert_eq!(out.header("X-Header2").as_deref(), Some("two"));
        assert!(out.header("Content-Encoding").is_none());
        assert!(out.header("x-json").is_none());

        let out = get(&opts, "/manifest.json").await;
        assert_eq!(out.header("x-json").as_deref(), Some("yes"));

        // 目录列表不应用规则
        let out = get(&opts, "/docs/").await;
        assert!(out.header("X-Header2").is_none());
    }

    #[tokio::test]
    async fn test_gzip() {
        let dir = fixture();
        let opts = options(dir.path(), OptionsInput::default());
        let out = run(&opts, "GET /readme.md HTTP/1.1\r\nAccept-Encoding: gzip, br\r\n\r\n").await;
        assert_eq!(out.header("Content-Encoding").as_deref(), Some("gzip"));
        assert!(out.header("Content-Length").is_none());
        let mut plain = String::new();
        GzDecoder::new(&out.body[..]).read_to_string(&mut plain).unwrap();
        assert_eq!(plain, "# readme\n".repeat(20));

        // 二进制内容不压缩
        let out = run(&opts, "GET /blob HTTP/1.1\r\nAccept-Encoding: gzip\r\n\r\n").await;
        assert!(out.header("Content-Encoding").is_none());
        assert_eq!(out.header("Content-Type").as_deref(), Some("application/octet-stream"));
        assert_eq!(out.body.len(), 6);

        // 客户端未声明 gzip
        let out = get(&opts, "/readme.md").await;
        assert!(out.header("Content-Encoding").is_none());
    }

    #[tokio::test]
    async fn test_head_and_post() {
        let dir = fixture();
        let opts = options(dir.path(), OptionsInput::default());
        let out = run(&opts, "HEAD /section/page HTTP/1.1\r\n\r\n").await;
        assert_eq!(out.meta.status, 200);
        assert_eq!(out.header("Content-Length").as_deref(), Some("4"));
        assert!(out.body.is_empty());

        let out = run(&opts, "POST /section/page HTTP/1.1\r\nContent-Length: 0\r\n\r\n").await;
        assert_eq!(out.meta.status, 200);
        assert_eq!(out.body, b"page");
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let dir = fixture();
        let opts = options(dir.path(), OptionsInput::default());
        let out = run(&opts, "DELETE /readme.md HTTP/1.1\r\n\r\n").await;
        assert_eq!(out.meta.status, 405);
        assert_eq!(out.header("Allow").as_deref(), Some("GET, HEAD, OPTIONS, POST"));
        assert!(String::from_utf8_lossy(&out.body).contains("405: Method Not Allowed"));
    }

    #[tokio::test]
    async fn test_bad_requests() {
        let dir = fixture();
        let opts = options(dir.path(), OptionsInput::default());
        for path in ["/%2E%2E/etc/passwd", "/a/%2e/b", "/a%2Fb", "relative"] {
            let out = get(&opts, path).await;
            assert_eq!(out.meta.status, 400, "{}", path);
            assert!(String::from_utf8_lossy(&out.body).contains("400: Bad Request"));
        }

        let out = run(&opts, "NOT A VALID REQUEST\r\n\r\n").await;
        assert_eq!(out.meta.status, 400);
        assert!(out.meta.error.is_some());
    }

    #[tokio::test]
    async fn test_not_found_page() {
        let dir = fixture();
        let opts = options(dir.path(), OptionsInput::default());
        let out = get(&opts, "/nothing%20here").await;
        assert_eq!(out.meta.status, 404);
        assert_eq!(out.header("Content-Type").as_deref(), Some("text/html; charset=UTF-8"));
        assert!(String::from_utf8_lossy(&out.body).contains("<code>/nothing here</code>"));
    }

    #[tokio::test]
    async fn test_dir_listing() {
        let dir = fixture();
        let opts = options(dir.path(), OptionsInput::default());
        let out = get(&opts, "/docs/").await;
        assert_eq!(out.meta.status, 200);
        let body = String::from_utf8_lossy(&out.body);
        assert!(body.contains("notes.txt"));
        assert!(body.contains("href=\"../\""));
        assert!(body.contains("<base href=\"/docs/\">"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_outside_root() {
        let dir = fixture();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "secret").unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret.txt"), dir.path().join("leak.txt"))
            .unwrap();
        std::os::unix::fs::symlink(dir.path().join("readme.md"), dir.path().join("alias.md")).unwrap();

        let opts = options(dir.path(), OptionsInput::default());
        assert_eq!(get(&opts, "/leak.txt").await.meta.status, 404);
        let out = get(&opts, "/alias.md").await;
        assert_eq!(out.meta.status, 200);
        assert_eq!(out.body, "# readme\n".repeat(20).as_bytes());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_dir_index_keeps_slash() {
        let dir = fixture();
        std::fs::create_dir_all(dir.path().join("v2")).unwrap();
        std::fs::write(dir.path().join("v2/index.html"), "v2").unwrap();
        std::os::unix::fs::symlink(dir.path().join("v2"), dir.path().join("latest")).unwrap();
        let opts = options(dir.path(), OptionsInput::default());

        let out = get(&opts, "/latest/").await;
        assert_eq!(out.meta.status, 200);
        assert_eq!(out.header("Location"), None);
        assert_eq!(out.body, b"v2");

        let out = get(&opts, "/latest").await;
        assert_eq!(out.meta.status, 307);
        assert_eq!(out.header("Location").as_deref(), Some("/latest/"));

        let out = get(&opts, "/v2/").await;
        assert_eq!(out.meta.status, 200);
        assert_eq!(out.header("Location"), None);
    }
}
