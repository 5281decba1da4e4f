// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 文件解析器
//!
//! 把 URL 路径映射为根目录内的文件系统位置。负责：
//! 1. 根目录包含性检查（任何返回的位置都在根目录之内）；
//! 2. 目录索引文件回退（`index.html`）与无扩展名 URL 回退（`.html`）；
//! 3. 符号链接跟随，且链接目标同样必须位于根目录之内；
//! 4. 基于 `exclude` 模式的访问控制。
//!
//! 所有文件系统错误都被吞掉，最终体现为 404。

use std::path::{Component, Path, PathBuf};

use log::debug;

use crate::{
    config::RuntimeOptions,
    fs_probe::{self, FsKind, FsLocation},
    matcher::PathMatcher,
};

/// `find` 的结果：状态码只会是 200、403 或 404
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub status: u16,
    pub file: Option<FsLocation>,
}

impl Resolution {
    fn new(status: u16, file: Option<FsLocation>) -> Self {
        Self { status, file }
    }
}

/// 在整个服务器生命周期内只读共享的解析器
#[derive(Debug, Clone)]
pub struct FileResolver {
    root: PathBuf,
    index: Vec<String>,
    ext: Vec<String>,
    list: bool,
    exclude_matcher: Option<PathMatcher>,
}

impl FileResolver {
    pub fn new(options: &RuntimeOptions) -> Result<Self, String> {
        Self::with_settings(
            options.root(),
            options.index(),
            options.ext(),
            options.exclude(),
            options.list(),
        )
    }

    pub fn with_settings(
        root: &Path,
        index: &[String],
        ext: &[String],
        exclude: &[String],
        list: bool,
    ) -> Result<Self, String> {
        if root.as_os_str().is_empty() || !root.is_absolute() {
            return Err(format!("root must be an absolute path, got '{}'", root.display()));
        }
        // 去掉末尾的分隔符：Path 的 components 会忽略它，这里重建一次即可
        let root: PathBuf = root.components().collect();
        let exclude_matcher = if exclude.is_empty() {
            None
        } else {
            Some(PathMatcher::new(exclude, true))
        };
        Ok(Self {
            root,
            index: index.to_vec(),
            ext: ext.to_vec(),
            list,
            exclude_matcher,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn within_root(&self, path: &Path) -> bool {
        fs_probe::is_subpath(&self.root, path)
    }

    /// 文件相对根目录的路径，使用 `/` 分隔，去掉首尾分隔符。
    /// 不在根目录内时返回 `None`。
    pub fn local_path(&self, path: &Path) -> Option<String> {
        if !self.within_root(path) {
            return None;
        }
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        Some(parts.join("/"))
    }

    /// 路径位于根目录内，并且没有被 `exclude` 规则排除
    pub fn allowed_path(&self, path: &Path) -> bool {
        let local = match self.local_path(path) {
            Some(l) => l,
            None => return false,
        };
        match &self.exclude_matcher {
            Some(m) => !m.test(&local),
            None => true,
        }
    }

    /// 把相对 URL 路径拼接到根目录上，越界时返回 `None`
    pub fn resolve_path(&self, url_relative: &str) -> Option<PathBuf> {
        let mut path = self.root.clone();
        for segment in url_relative.split(['/', '\\']) {
            match segment {
                "" | "." => continue,
                ".." => return None,
                s => path.push(s),
            }
        }
        if self.within_root(&path) {
            Some(path)
        } else {
            None
        }
    }

    /// 核心查找逻辑：目录时尝试索引文件，不存在时尝试追加扩展名。
    pub async fn locate_file(&self, fs_path: &Path) -> FsLocation {
        if !self.within_root(fs_path) {
            return FsLocation::new(fs_path.to_path_buf(), FsKind::Absent);
        }

        let kind = fs_probe::get_kind(fs_path).await;

        if kind == FsKind::Dir {
            for name in &self.index {
                let candidate = fs_path.join(name);
                let candidate_kind = fs_probe::get_kind(&candidate).await;
                if candidate_kind.is_file_or_link() {
                    return FsLocation::new(candidate, candidate_kind);
                }
            }
        }

        if kind == FsKind::Absent {
            for suffix in &self.ext {
                let mut candidate = fs_path.as_os_str().to_os_string();
                candidate.push(suffix);
                let candidate = PathBuf::from(candidate);
                let candidate_kind = fs_probe::get_kind(&candidate).await;
                if candidate_kind.is_file_or_link() {
                    return FsLocation::new(candidate, candidate_kind);
                }
            }
        }

        FsLocation::new(fs_path.to_path_buf(), kind)
    }

    /// 解析符号链接的目标，目标必须是根目录内的文件或目录
    async fn link_target(&self, link: &Path) -> Option<FsLocation> {
        let real = fs_probe::real_path(link).await?;
        if !self.within_root(&real) {
            return None;
        }
        let kind = fs_probe::get_kind(&real).await;
        match kind {
            FsKind::File | FsKind::Dir => Some(FsLocation::new(real, kind)),
            _ => None,
        }
    }

    /// 把 URL 路径解析为最终要提供的文件
    pub async fn find(&self, url_relative: &str) -> Resolution {
        let fs_path = match self.resolve_path(url_relative) {
            Some(p) => p,
            None => return Resolution::new(404, None),
        };

        let mut file = self.locate_file(&fs_path).await;

        if file.kind == FsKind::Link {
            if let Some(real) = fs_probe::real_path(&file.file_path).await {
                let target = self.locate_file(&real).await;
                if matches!(target.kind, FsKind::File | FsKind::Dir)
                    && self.within_root(&target.file_path)
                {
                    file.target = Some(Box::new(target));
                }
            }
        }

        let effective = file.effective().clone();
        if !matches!(effective.kind, FsKind::File | FsKind::Dir) {
            debug!("{} 不是文件或目录", file.file_path.display());
            return Resolution::new(404, None);
        }

        // 经由目录链接到达的路径按字面位于根目录内，还需要检查真实路径
        match fs_probe::real_path(&effective.file_path).await {
            Some(real) if self.within_root(&real) => {}
            _ => return Resolution::new(404, None),
        }

        let allowed = match effective.kind {
            FsKind::Dir => self.list && self.allowed_path(&effective.file_path),
            _ => self.allowed_path(&effective.file_path),
        } && self.allowed_path(&file.file_path);

        if !allowed {
            return Resolution::new(404, Some(file));
        }
        if !fs_probe::is_readable(&effective.file_path, effective.kind).await {
            return Resolution::new(403, Some(file));
        }
        Resolution::new(200, Some(file))
    }

    /// 目录列表：按路径字节序排序，去掉不存在和被排除的条目，并解析链接目标
    pub async fn index(&self, dir_path: &Path) -> Vec<FsLocation> {
        if !self.list {
            return vec![];
        }
        let mut items: Vec<FsLocation> = fs_probe::list_dir(dir_path)
            .await
            .into_iter()
            .filter(|item| item.kind != FsKind::Absent && self.allowed_path(&item.file_path))
            .collect();
        items.sort_by(|a, b| {
            a.file_path
                .as_os_str()
                .as_encoded_bytes()
                .cmp(b.file_path.as_os_str().as_encoded_bytes())
        });
        for item in items.iter_mut() {
            if item.kind == FsKind::Link {
                item.target = self.link_target(&item.file_path).await.map(Box::new);
            }
        }
        items
    }
}
