use crate::core::reconciler::Action;
use crate::core::snapshot::{is_within, resolve};
use crate::error::{ItemError, ItemErrorKind};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// 日志时间格式
pub const LOG_TIME_FORMAT: &str = "%d-%m-%Y %H:%M";

/// 操作类型（日志中的动词）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Created,
    Edited,
    Deleted,
    Copied,
}

impl RecordKind {
    pub fn verb(&self) -> &'static str {
        match self {
            RecordKind::Created => "created",
            RecordKind::Edited => "edited",
            RecordKind::Deleted => "deleted",
            RecordKind::Copied => "copied",
        }
    }

    fn preposition(&self) -> &'static str {
        match self {
            RecordKind::Created | RecordKind::Edited => "in",
            RecordKind::Deleted => "from",
            RecordKind::Copied => "to",
        }
    }
}

/// 一个成功执行的动作
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    pub action: Action,
    pub kind: RecordKind,
    /// 文件名；目录动作为备份中的目录绝对路径
    pub name: String,
    /// 文件所在的备份目录
    pub directory: PathBuf,
    pub timestamp: DateTime<Local>,
}

impl ActionRecord {
    fn new(action: &Action, kind: RecordKind, path: &Path) -> Self {
        let (name, directory) = if action.is_dir_action() {
            (path.display().to_string(), path.to_path_buf())
        } else {
            (
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                path.parent().map(Path::to_path_buf).unwrap_or_default(),
            )
        };

        Self {
            action: action.clone(),
            kind,
            name,
            directory,
            timestamp: Local::now(),
        }
    }

    /// 写入操作日志的一行
    ///
    /// 文件: `<时间> - <文件名> was <动词> <介词> <目录>`；
    /// 目录: `<时间> - Directory <路径> was <动词>`。
    pub fn log_line(&self) -> String {
        let ts = self.timestamp.format(LOG_TIME_FORMAT);
        if self.action.is_dir_action() {
            format!("{} - Directory {} was {}", ts, self.name, self.kind.verb())
        } else {
            format!(
                "{} - {} was {} {} {}",
                ts,
                self.name,
                self.kind.verb(),
                self.kind.preposition(),
                self.directory.display()
            )
        }
    }
}

/// 动作执行器
///
/// 只修改备份目录；源目录只读。
#[derive(Debug)]
pub struct ActionExecutor {
    source_root: PathBuf,
    backup_root: PathBuf,
    /// 未能创建的目录，其下的动作直接失败
    blocked: Vec<String>,
}

impl ActionExecutor {
    pub fn new(source_root: impl Into<PathBuf>, backup_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            backup_root: backup_root.into(),
            blocked: Vec::new(),
        }
    }

    /// 标记一个不可用的目录
    pub fn block_dir(&mut self, relative: impl Into<String>) {
        self.blocked.push(relative.into());
    }

    /// 执行单个动作
    ///
    /// 返回 `Ok(None)` 表示目标已处于期望状态（例如要删除的文件已不存在）。
    pub async fn execute(&mut self, action: &Action) -> Result<Option<ActionRecord>, ItemError> {
        let target = action.target();
        let fail = |kind: ItemErrorKind| ItemError::new(action.phase(), target, kind);

        // 删除不依赖父目录，包括清理与被阻塞目录同名的旧文件
        let is_delete = matches!(action, Action::DeleteFile(_) | Action::DeleteDir(_));
        if !is_delete {
            if let Some(parent) = self.blocked.iter().find(|b| is_within(target, b)) {
                return Err(fail(ItemErrorKind::ParentUnavailable(parent.clone())));
            }
        }

        let dest = resolve(&self.backup_root, target).ok_or_else(|| fail(ItemErrorKind::InvalidPath))?;

        match action {
            Action::CreateDir(_) => {
                debug!("创建目录: {}", dest.display());
                if let Err(e) = fs::create_dir_all(&dest).await {
                    self.blocked.push(target.to_string());
                    return Err(fail(ItemErrorKind::CreateDir(e)));
                }
                Ok(Some(ActionRecord::new(action, RecordKind::Created, &dest)))
            }
            Action::OverwriteFile(rel) | Action::CreateFile(rel) => {
                let from = resolve(&self.source_root, rel).ok_or_else(|| fail(ItemErrorKind::InvalidPath))?;
                let overwrite = matches!(action, Action::OverwriteFile(_));
                debug!("复制: {} -> {} (覆盖={})", from.display(), dest.display(), overwrite);
                copy_file(&from, &dest, overwrite)
                    .await
                    .map_err(|e| fail(ItemErrorKind::Copy(e)))?;
                let kind = if overwrite {
                    RecordKind::Edited
                } else {
                    RecordKind::Created
                };
                Ok(Some(ActionRecord::new(action, kind, &dest)))
            }
            Action::DuplicateFile { from, .. } => {
                let from = resolve(&self.source_root, from).ok_or_else(|| fail(ItemErrorKind::InvalidPath))?;
                debug!("复制重复文件: {} -> {}", from.display(), dest.display());
                copy_file(&from, &dest, false)
                    .await
                    .map_err(|e| fail(ItemErrorKind::Copy(e)))?;
                Ok(Some(ActionRecord::new(action, RecordKind::Copied, &dest)))
            }
            Action::DeleteFile(_) => {
                debug!("删除文件: {}", dest.display());
                match fs::remove_file(&dest).await {
                    Ok(()) => Ok(Some(ActionRecord::new(action, RecordKind::Deleted, &dest))),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(fail(ItemErrorKind::Delete(e))),
                }
            }
            Action::DeleteDir(_) => {
                debug!("删除目录: {}", dest.display());
                match fs::remove_dir_all(&dest).await {
                    Ok(()) => Ok(Some(ActionRecord::new(action, RecordKind::Deleted, &dest))),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(fail(ItemErrorKind::Delete(e))),
                }
            }
        }
    }
}

/// 复制文件内容；覆盖时先删除旧文件，避免残留尾部字节
async fn copy_file(from: &Path, to: &Path, overwrite: bool) -> io::Result<()> {
    if overwrite {
        match fs::remove_file(to).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    fs::copy(from, to).await?;
    Ok(())
}
