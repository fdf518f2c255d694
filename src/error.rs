//! 错误类型
//!
//! 分三层：配置错误在任何同步周期开始前终止进程；周期级错误（扫描、日志写入）
//! 终止当前周期并由驱动器停止运行；单项错误只记录到报告中，周期继续。

use serde::{Serialize, Serializer};
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("缺少必需参数: {0}")]
    MissingArgument(&'static str),

    #[error("目录不存在: {0}")]
    MissingRoot(PathBuf),

    #[error("不是目录: {0}")]
    NotADirectory(PathBuf),

    #[error("源目录与备份目录不能相同或互相嵌套: {source_root} <-> {backup_root}")]
    NestedRoots {
        source_root: PathBuf,
        backup_root: PathBuf,
    },

    #[error("同步间隔必须为正整数（分钟），当前值: {0}")]
    InvalidInterval(u64),

    #[error("日志文件不能位于同步目录内: {0}")]
    LogInsideTree(PathBuf),

    #[error("日志文件不可用: {path}")]
    LogSinkUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("读取配置文件失败: {path}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("解析配置文件失败: {path}")]
    ParseFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// 周期级错误
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("扫描目录失败: {root}")]
    Scan {
        root: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("写入操作日志失败: {sink}")]
    Sink {
        sink: String,
        #[source]
        source: io::Error,
    },
}

/// 同步周期中的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Scan,
    CreateDirs,
    Modify,
    Duplicate,
    CreateFiles,
    DeleteFiles,
    DeleteDirs,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Scan => "scan",
            Phase::CreateDirs => "create_dirs",
            Phase::Modify => "modify",
            Phase::Duplicate => "duplicate",
            Phase::CreateFiles => "create_files",
            Phase::DeleteFiles => "delete_files",
            Phase::DeleteDirs => "delete_dirs",
        };
        f.write_str(name)
    }
}

/// 单项错误的具体原因
#[derive(Debug, Error)]
pub enum ItemErrorKind {
    #[error("计算哈希失败: {0}")]
    Hash(#[source] io::Error),

    #[error("遍历失败: {0}")]
    Walk(#[source] io::Error),

    #[error("复制失败: {0}")]
    Copy(#[source] io::Error),

    #[error("删除失败: {0}")]
    Delete(#[source] io::Error),

    #[error("创建目录失败: {0}")]
    CreateDir(#[source] io::Error),

    #[error("路径冲突: {0}")]
    Conflict(String),

    #[error("父目录不可用: {0}")]
    ParentUnavailable(String),

    #[error("非法相对路径")]
    InvalidPath,
}

/// 单项错误：记录后跳过，不影响周期内其他动作
#[derive(Debug, Error)]
#[error("[{phase}] {relative_path}: {kind}")]
pub struct ItemError {
    pub phase: Phase,
    pub relative_path: String,
    #[source]
    pub kind: ItemErrorKind,
}

impl ItemError {
    pub fn new(phase: Phase, relative_path: impl Into<String>, kind: ItemErrorKind) -> Self {
        Self {
            phase,
            relative_path: relative_path.into(),
            kind,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.kind, ItemErrorKind::Conflict(_))
    }
}

impl Serialize for ItemError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("ItemError", 3)?;
        state.serialize_field("phase", &self.phase)?;
        state.serialize_field("relativePath", &self.relative_path)?;
        state.serialize_field("message", &self.kind.to_string())?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_error_display_and_json() {
        let err = ItemError::new(
            Phase::Modify,
            "docs/a.txt",
            ItemErrorKind::Copy(io::Error::new(io::ErrorKind::NotFound, "gone")),
        );

        assert_eq!(err.to_string(), "[modify] docs/a.txt: 复制失败: gone");

        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["phase"], "modify");
        assert_eq!(json["relativePath"], "docs/a.txt");
        assert_eq!(json["message"], "复制失败: gone");
    }
}
