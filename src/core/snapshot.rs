//! 快照 - 一次扫描中文件和目录的身份信息

use crate::error::ItemError;
use std::path::{Component, Path, PathBuf};

/// 文件快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    /// 相对路径（统一使用 / 分隔），跨目录树的身份键
    pub relative_path: String,
    /// 内容 hash（小写十六进制）
    pub content_hash: String,
    pub absolute_path: PathBuf,
}

/// 目录快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirSnapshot {
    pub relative_path: String,
    pub absolute_path: PathBuf,
}

/// 一次扫描的完整结果
#[derive(Debug, Default)]
pub struct TreeSnapshot {
    pub root: PathBuf,
    /// 按相对路径字典序排列，不含根目录本身
    pub dirs: Vec<DirSnapshot>,
    /// 按相对路径字典序排列
    pub files: Vec<FileSnapshot>,
    /// 存在但无法读取的条目（相对路径），状态未知
    pub unreadable: Vec<String>,
    pub errors: Vec<ItemError>,
}

impl TreeSnapshot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn dir_count(&self) -> usize {
        self.dirs.len()
    }
}

/// 计算 `full` 相对于 `base` 的路径，分隔符统一为 `/`
///
/// `full` 不在 `base` 之下或与之相同时返回 `None`。
pub fn relative_path(base: &Path, full: &Path) -> Option<String> {
    let rel = full.strip_prefix(base).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// 比较用的路径键：大小写不敏感的文件系统上折叠为小写
pub fn path_key(relative: &str) -> String {
    if cfg!(any(target_os = "windows", target_os = "macos")) {
        relative.to_lowercase()
    } else {
        relative.to_string()
    }
}

/// 路径深度（组成部分的数量）
pub fn depth(relative: &str) -> usize {
    relative.split('/').filter(|s| !s.is_empty()).count()
}

/// `relative` 是否等于 `ancestor` 或位于其下（按路径键比较）
pub fn is_within(relative: &str, ancestor: &str) -> bool {
    let key = path_key(relative);
    let ancestor = path_key(ancestor);
    key == ancestor
        || (key.starts_with(&ancestor) && key.as_bytes().get(ancestor.len()) == Some(&b'/'))
}

/// 把相对路径拼接到根目录上，拒绝 `..`、绝对路径等越界成分
pub fn resolve(root: &Path, relative: &str) -> Option<PathBuf> {
    let rel = Path::new(relative);
    if relative.is_empty() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
        return None;
    }
    Some(root.join(rel))
}
