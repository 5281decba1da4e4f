//! 文件系统探测的薄封装。
//!
//! 所有函数都不会返回错误：失败一律折算为 `FsKind::Absent`、`None`、
//! 空列表或 `false`，由调用方决定如何映射到 HTTP 状态码。

use std::fs::Metadata;
use std::path::{Component, Path, PathBuf};

use tokio::fs;

/// 文件系统条目的类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsKind {
    File,
    Dir,
    Link,
    /// 不存在或无法访问
    Absent,
}

impl FsKind {
    fn from_metadata(meta: &Metadata) -> Self {
        let file_type = meta.file_type();
        if file_type.is_symlink() {
            FsKind::Link
        } else if file_type.is_dir() {
            FsKind::Dir
        } else if file_type.is_file() {
            FsKind::File
        } else {
            FsKind::Absent
        }
    }

    pub fn is_file_or_link(self) -> bool {
        matches!(self, FsKind::File | FsKind::Link)
    }
}

/// 一个文件系统位置。`target` 只在 `kind == Link` 且链接指向根目录内的
/// 普通文件或目录时存在。
#[derive(Debug, Clone, PartialEq)]
pub struct FsLocation {
    pub file_path: PathBuf,
    pub kind: FsKind,
    pub target: Option<Box<FsLocation>>,
}

impl FsLocation {
    pub fn new(file_path: PathBuf, kind: FsKind) -> Self {
        Self {
            file_path,
            kind,
            target: None,
        }
    }

    /// 链接解析后的目标，非链接时返回自身
    pub fn effective(&self) -> &FsLocation {
        match &self.target {
            Some(target) if self.kind == FsKind::Link => target,
            _ => self,
        }
    }

    /// 目录或指向目录的链接
    pub fn is_dir_like(&self) -> bool {
        self.effective().kind == FsKind::Dir
    }

    pub fn file_name(&self) -> String {
        self.file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// 使用 lstat 获取条目类型，符号链接本身优先于其目标类型。
pub async fn get_kind(path: &Path) -> FsKind {
    match fs::symlink_metadata(path).await {
        Ok(meta) => FsKind::from_metadata(&meta),
        Err(_) => FsKind::Absent,
    }
}

/// 列出目录的直接子项，读取失败时返回空列表
pub async fn list_dir(path: &Path) -> Vec<FsLocation> {
    let mut entries = vec![];
    let mut reader = match fs::read_dir(path).await {
        Ok(r) => r,
        Err(_) => return entries,
    };
    loop {
        match reader.next_entry().await {
            Ok(Some(entry)) => {
                let kind = match entry.file_type().await {
                    Ok(t) if t.is_symlink() => FsKind::Link,
                    Ok(t) if t.is_dir() => FsKind::Dir,
                    Ok(t) if t.is_file() => FsKind::File,
                    _ => FsKind::Absent,
                };
                entries.push(FsLocation::new(entry.path(), kind));
            }
            Ok(None) => break,
            Err(_) => return vec![],
        }
    }
    entries
}

/// 规范化路径（解析所有符号链接），失败返回 `None`
pub async fn real_path(path: &Path) -> Option<PathBuf> {
    fs::canonicalize(path).await.ok()
}

/// 检查当前进程能否读取该条目：文件需要可读，目录需要可读且可进入。
pub async fn is_readable(path: &Path, kind: FsKind) -> bool {
    match kind {
        FsKind::Dir => fs::read_dir(path).await.is_ok(),
        FsKind::File | FsKind::Link => fs::File::open(path).await.is_ok(),
        FsKind::Absent => false,
    }
}

/// `path` 是否等于 `root` 或位于其内部。
///
/// 两者都必须是绝对路径，且 `path` 不能包含 `..` 片段。
pub fn is_subpath(root: &Path, path: &Path) -> bool {
    if !root.is_absolute() || !path.is_absolute() {
        return false;
    }
    if path.components().any(|c| c == Component::ParentDir) {
        return false;
    }
    path.starts_with(root)
}
