// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 内容类型识别
//!
//! 根据文件名判断 MIME 类型；文件名无法判断时读取文件开头的字节，
//! 按 WHATWG MIME Sniffing 标准中"二进制资源"的规则区分文本与二进制。

use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};
use std::io::SeekFrom;
use std::path::Path;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};

/// 嗅探时最多读取的字节数
pub const SNIFF_LENGTH: usize = 1500;

/// 参与二进制判定的最大字节数
const SNIFF_SCAN_LIMIT: usize = 2000;

/// 文本类型默认使用的字符集
pub const DEFAULT_CHARSET: &str = "UTF-8";

/// 分类结果所属的组
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TypeGroup {
    Text,
    Bin,
    Unknown,
}

/// 一张分类表：文本表与二进制表结构相同，只是二进制表不使用文件名和后缀规则。
struct TypeTable {
    default_type: &'static str,
    extension_map: HashMap<&'static str, &'static str>,
    extensions: HashSet<&'static str>,
    file_names: HashSet<&'static str>,
    suffixes: Vec<&'static str>,
}

lazy_static! {
    static ref TEXT: TypeTable = TypeTable {
        default_type: "text/plain",
        extension_map: HashMap::from([
            ("atom", "application/atom+xml"),
            ("cjs", "text/javascript"),
            ("css", "text/css"),
            ("csv", "text/csv"),
            ("htm", "text/html"),
            ("html", "text/html"),
            ("ics", "text/calendar"),
            ("js", "text/javascript"),
            ("json", "application/json"),
            ("jsonld", "application/ld+json"),
            ("map", "application/json"),
            ("markdown", "text/markdown"),
            ("md", "text/markdown"),
            ("mjs", "text/javascript"),
            ("rss", "application/rss+xml"),
            ("rtf", "application/rtf"),
            ("shtml", "text/html"),
            ("svg", "image/svg+xml"),
            ("tsv", "text/tab-separated-values"),
            ("txt", "text/plain"),
            ("vtt", "text/vtt"),
            ("webmanifest", "application/manifest+json"),
            ("xhtml", "application/xhtml+xml"),
            ("xml", "application/xml"),
            ("xsl", "application/xslt+xml"),
            ("yaml", "text/yaml"),
            ("yml", "text/yaml"),
        ]),
        extensions: HashSet::from([
            "asm", "astro", "bash", "bat", "c", "cc", "cfg", "cjs", "clj", "cmd", "conf",
            "cpp", "cs", "cts", "cxx", "d", "dart", "diff", "dockerfile", "elm", "env",
            "erl", "ex", "exs", "fish", "fs", "go", "gql", "graphql", "h", "hbs", "hpp",
            "hs", "ini", "java", "jl", "jsx", "kt", "kts", "less", "lisp", "lock", "log",
            "lua", "m", "mdx", "mts", "nix", "php", "pl", "properties", "ps1", "py", "r",
            "rb", "rs", "rst", "sass", "scala", "scss", "sh", "sql", "styl", "svelte",
            "swift", "tex", "toml", "ts", "tsx", "vue", "zig", "zsh",
        ]),
        file_names: HashSet::from([
            ".editorconfig", ".env", ".gitattributes", ".gitignore", ".gitkeep",
            ".gitmodules", ".htaccess", ".npmignore", ".npmrc", ".nvmrc", ".prettierrc",
            "authors", "changelog", "codeowners", "contributing", "copying", "dockerfile",
            "gemfile", "license", "makefile", "notice", "procfile", "rakefile", "readme",
            "vagrantfile",
        ]),
        suffixes: vec!["config", "file", "ignore", "rc"],
    };

    static ref BIN: TypeTable = TypeTable {
        default_type: "application/octet-stream",
        extension_map: HashMap::from([
            ("7z", "application/x-7z-compressed"),
            ("aac", "audio/aac"),
            ("apng", "image/apng"),
            ("avi", "video/x-msvideo"),
            ("avif", "image/avif"),
            ("bmp", "image/bmp"),
            ("bz2", "application/x-bzip2"),
            ("epub", "application/epub+zip"),
            ("flac", "audio/flac"),
            ("gif", "image/gif"),
            ("gz", "application/gzip"),
            ("heic", "image/heic"),
            ("ico", "image/vnd.microsoft.icon"),
            ("jpeg", "image/jpeg"),
            ("jpg", "image/jpeg"),
            ("m4a", "audio/mp4"),
            ("mid", "audio/midi"),
            ("midi", "audio/midi"),
            ("mov", "video/quicktime"),
            ("mp3", "audio/mpeg"),
            ("mp4", "video/mp4"),
            ("mpeg", "video/mpeg"),
            ("oga", "audio/ogg"),
            ("ogg", "audio/ogg"),
            ("ogv", "video/ogg"),
            ("opus", "audio/opus"),
            ("otf", "font/otf"),
            ("pdf", "application/pdf"),
            ("png", "image/png"),
            ("rar", "application/vnd.rar"),
            ("tar", "application/x-tar"),
            ("tif", "image/tiff"),
            ("tiff", "image/tiff"),
            ("ttf", "font/ttf"),
            ("wasm", "application/wasm"),
            ("wav", "audio/wav"),
            ("weba", "audio/webm"),
            ("webm", "video/webm"),
            ("webp", "image/webp"),
            ("woff", "font/woff"),
            ("woff2", "font/woff2"),
            ("xz", "application/x-xz"),
            ("zip", "application/zip"),
        ]),
        extensions: HashSet::from([
            "a", "bin", "class", "dat", "db", "deb", "dll", "dmg", "doc", "docx", "dylib",
            "exe", "img", "iso", "jar", "lib", "o", "obj", "pyc", "so", "sqlite", "xls",
            "xlsx",
        ]),
        file_names: HashSet::new(),
        suffixes: vec![],
    };
}

/// 类型判定结果
#[derive(Debug, Clone, PartialEq)]
pub struct TypeResult {
    pub group: TypeGroup,
    pub mime: &'static str,
    pub charset: Option<&'static str>,
}

impl TypeResult {
    fn text(mime: &'static str) -> Self {
        Self {
            group: TypeGroup::Text,
            mime,
            charset: Some(DEFAULT_CHARSET),
        }
    }

    fn bin(mime: &'static str) -> Self {
        Self {
            group: TypeGroup::Bin,
            mime,
            charset: None,
        }
    }

    fn unknown() -> Self {
        Self {
            group: TypeGroup::Unknown,
            mime: BIN.default_type,
            charset: None,
        }
    }

    pub fn is_text(&self) -> bool {
        self.group == TypeGroup::Text
    }

    /// 渲染为 `Content-Type` 头的值
    pub fn to_header_value(&self) -> String {
        match self.group {
            TypeGroup::Text => format!(
                "{}; charset={}",
                self.mime,
                self.charset.unwrap_or(DEFAULT_CHARSET)
            ),
            _ => self.mime.to_string(),
        }
    }
}

/// 仅根据文件名判定类型
pub fn type_for_file_path<P: AsRef<Path>>(path: P) -> TypeResult {
    let name = match path.as_ref().file_name() {
        Some(n) => n.to_string_lossy().to_lowercase(),
        None => return TypeResult::unknown(),
    };
    // 以点开头的文件名（如 .gitignore）视为没有扩展名
    let ext = match name.rfind('.') {
        Some(pos) if pos > 0 => &name[pos + 1..],
        _ => "",
    };

    if !ext.is_empty() {
        if let Some(mime) = TEXT.extension_map.get(ext) {
            return TypeResult::text(*mime);
        }
        if let Some(mime) = BIN.extension_map.get(ext) {
            return TypeResult::bin(*mime);
        }
        if TEXT.extensions.contains(ext) {
            return TypeResult::text(TEXT.default_type);
        }
        if BIN.extensions.contains(ext) {
            return TypeResult::bin(BIN.default_type);
        }
    } else if TEXT.file_names.contains(name.as_str())
        || TEXT.suffixes.iter().any(|s| name.ends_with(s))
    {
        return TypeResult::text(TEXT.default_type);
    }
    TypeResult::unknown()
}

/// 二进制数据字节位图：`[0x00..0x08] ∪ {0x0B} ∪ [0x0E..0x1A] ∪ [0x1C..0x1F]`
const BINARY_BYTES: [bool; 256] = {
    let mut table = [false; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = matches!(i, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F);
        i += 1;
    }
    table
};

/// 判断一段字节是否为文本
pub fn sniff_bytes(buf: &[u8]) -> TypeResult {
    let has_bom = buf.starts_with(&[0xEF, 0xBB, 0xBF])
        || buf.starts_with(&[0xFE, 0xFF])
        || buf.starts_with(&[0xFF, 0xFE]);
    if has_bom {
        return TypeResult::text(TEXT.default_type);
    }
    let limit = buf.len().min(SNIFF_SCAN_LIMIT);
    if buf[..limit].iter().any(|b| BINARY_BYTES[*b as usize]) {
        TypeResult::bin(BIN.default_type)
    } else {
        TypeResult::text(TEXT.default_type)
    }
}

/// 读取文件开头的字节进行嗅探，读取后把游标恢复到文件开头。
pub async fn sniff_file(file: &mut File) -> std::io::Result<TypeResult> {
    let mut buf = vec![0u8; SNIFF_LENGTH];
    let mut filled = 0;
    while filled < SNIFF_LENGTH {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    file.seek(SeekFrom::Start(0)).await?;
    Ok(sniff_bytes(&buf[..filled]))
}

/// 先按文件名判定，失败时在有文件句柄的情况下进行嗅探。
///
/// 两者都不可用时退回到 `application/octet-stream`。
pub async fn get_content_type(path: Option<&Path>, file: Option<&mut File>) -> TypeResult {
    if let Some(path) = path {
        let result = type_for_file_path(path);
        if result.group != TypeGroup::Unknown {
            return result;
        }
    }
    if let Some(file) = file {
        if let Ok(result) = sniff_file(file).await {
            return result;
        }
    }
    TypeResult::bin(BIN.default_type)
}
