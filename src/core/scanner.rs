use crate::core::hasher::calculate_file_hash;
use crate::core::snapshot::{relative_path, DirSnapshot, FileSnapshot, TreeSnapshot};
use crate::error::{ItemError, ItemErrorKind, Phase, SyncError};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// 目录遍历的原始结果（尚未计算 hash）
#[derive(Debug, Default)]
struct Listing {
    dirs: Vec<(String, PathBuf)>,
    files: Vec<(String, PathBuf)>,
    unreadable: Vec<String>,
    errors: Vec<ItemError>,
}

/// 目录树扫描器，不跟随符号链接
#[derive(Debug, Default)]
pub struct TreeScanner;

impl TreeScanner {
    pub fn new() -> Self {
        Self
    }

    /// 扫描目录树并为每个文件计算 hash
    ///
    /// 根目录不存在或不可读时返回 [`SyncError::Scan`]；
    /// 根目录以下的单个条目出错只记录到快照的 `errors` 中。
    pub async fn scan(&self, root: &Path) -> Result<TreeSnapshot, SyncError> {
        let scan_err = |source: io::Error| SyncError::Scan {
            root: root.to_path_buf(),
            source,
        };

        debug!("开始扫描目录: {}", root.display());

        let metadata = tokio::fs::metadata(root).await.map_err(scan_err)?;
        if !metadata.is_dir() {
            return Err(scan_err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "不是目录",
            )));
        }

        // 使用 spawn_blocking 避免阻塞 async runtime
        let base = root.to_path_buf();
        let listing = tokio::task::spawn_blocking(move || walk(&base))
            .await
            .map_err(|e| scan_err(io::Error::other(e)))?
            .map_err(scan_err)?;

        let snapshot = hash_listing(root, listing).await;

        info!(
            "扫描完成: {} - {} 个目录, {} 个文件, {} 个不可读",
            root.display(),
            snapshot.dir_count(),
            snapshot.file_count(),
            snapshot.unreadable.len()
        );

        Ok(snapshot)
    }
}

/// 为遍历结果中的每个文件计算 hash
///
/// 无法读取的文件（包括遍历后被删除的）记入 `unreadable` 与 `errors`，不进入 `files`。
async fn hash_listing(root: &Path, listing: Listing) -> TreeSnapshot {
    let mut snapshot = TreeSnapshot::new(root);
    snapshot.unreadable = listing.unreadable;
    snapshot.errors = listing.errors;
    snapshot.dirs = listing
        .dirs
        .into_iter()
        .map(|(relative_path, absolute_path)| DirSnapshot {
            relative_path,
            absolute_path,
        })
        .collect();

    for (rel, abs) in listing.files {
        match calculate_file_hash(&abs).await {
            Ok(content_hash) => snapshot.files.push(FileSnapshot {
                relative_path: rel,
                content_hash,
                absolute_path: abs,
            }),
            Err(e) => {
                warn!(path = %rel, phase = %Phase::Scan, "计算哈希失败，本轮跳过: {}", e);
                snapshot.unreadable.push(rel.clone());
                snapshot
                    .errors
                    .push(ItemError::new(Phase::Scan, rel, ItemErrorKind::Hash(e)));
            }
        }
    }

    snapshot.unreadable.sort();
    snapshot
}

/// 同步遍历目录树，结果按相对路径排序
fn walk(root: &Path) -> io::Result<Listing> {
    let mut listing = Listing::default();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let depth = err.depth();
                let rel = err.path().and_then(|p| relative_path(root, p));
                let io_err = err
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::other("检测到符号链接循环"));

                match rel {
                    // 根目录本身不可读，整轮扫描失败
                    None if depth == 0 => return Err(io_err),
                    None => {
                        warn!("遍历出错: {}", io_err);
                    }
                    Some(rel) => {
                        warn!(path = %rel, phase = %Phase::Scan, "遍历出错，本轮跳过: {}", io_err);
                        listing.unreadable.push(rel.clone());
                        listing
                            .errors
                            .push(ItemError::new(Phase::Scan, rel, ItemErrorKind::Walk(io_err)));
                    }
                }
                continue;
            }
        };

        // 跳过根目录本身
        let Some(rel) = relative_path(root, entry.path()) else {
            continue;
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            listing.dirs.push((rel, entry.into_path()));
        } else if file_type.is_file() {
            listing.files.push((rel, entry.into_path()));
        } else {
            debug!("跳过非常规文件: {}", rel);
        }
    }

    listing.dirs.sort_by(|a, b| a.0.cmp(&b.0));
    listing.files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(listing)
}
