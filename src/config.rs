//! 同步配置模块

use crate::error::ConfigError;
use crate::logging::LogConfig;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// 默认同步间隔（分钟）
pub const DEFAULT_SYNC_PERIOD_MINUTES: u64 = 60;

/// 配置文件内容，所有字段可选，命令行参数会覆盖同名字段
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    /// 源目录
    #[serde(default)]
    pub source_folder: Option<PathBuf>,
    /// 备份目录
    #[serde(default)]
    pub dest_folder: Option<PathBuf>,
    /// 同步间隔（分钟）
    #[serde(default)]
    pub sync_period: Option<u64>,
    /// 操作日志所在目录
    #[serde(default)]
    pub log: Option<PathBuf>,
    /// 诊断日志配置
    #[serde(default)]
    pub diagnostics: Option<LogConfig>,
}

impl FileConfig {
    /// 从 JSON 配置文件加载
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 用 `overrides` 中已设置的字段覆盖当前配置
    pub fn merge(self, overrides: FileConfig) -> FileConfig {
        FileConfig {
            source_folder: overrides.source_folder.or(self.source_folder),
            dest_folder: overrides.dest_folder.or(self.dest_folder),
            sync_period: overrides.sync_period.or(self.sync_period),
            log: overrides.log.or(self.log),
            diagnostics: overrides.diagnostics.or(self.diagnostics),
        }
    }
}

/// 经过校验的同步配置
///
/// 两个根目录都已规范化为绝对路径。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub source_root: PathBuf,
    pub backup_root: PathBuf,
    pub sync_interval_minutes: u64,
    pub log_file: PathBuf,
}

impl SyncConfig {
    /// 校验并创建配置
    pub fn new(
        source_root: impl AsRef<Path>,
        backup_root: impl AsRef<Path>,
        sync_interval_minutes: u64,
        log_file: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        if sync_interval_minutes == 0 {
            return Err(ConfigError::InvalidInterval(sync_interval_minutes));
        }

        let source_root = canonical_dir(source_root.as_ref())?;
        let backup_root = canonical_dir(backup_root.as_ref())?;

        if source_root.starts_with(&backup_root) || backup_root.starts_with(&source_root) {
            return Err(ConfigError::NestedRoots {
                source_root,
                backup_root,
            });
        }

        let log_file = absolute_log_path(log_file.into())?;
        if log_file.starts_with(&backup_root) || log_file.starts_with(&source_root) {
            return Err(ConfigError::LogInsideTree(log_file));
        }

        Ok(Self {
            source_root,
            backup_root,
            sync_interval_minutes,
            log_file,
        })
    }

    /// 由合并后的配置文件内容创建
    ///
    /// 日志目录不存在时回退到当前工作目录；日志文件名带当天日期。
    pub fn from_file_config(config: &FileConfig) -> Result<Self, ConfigError> {
        let source = config
            .source_folder
            .as_ref()
            .ok_or(ConfigError::MissingArgument("sourceFolder"))?;
        let backup = config
            .dest_folder
            .as_ref()
            .ok_or(ConfigError::MissingArgument("destFolder"))?;
        let interval = config.sync_period.unwrap_or(DEFAULT_SYNC_PERIOD_MINUTES);

        let log_dir = match &config.log {
            Some(dir) if dir.is_dir() => dir.clone(),
            Some(dir) => {
                warn!("日志目录 {} 不存在，改用当前目录", dir.display());
                current_dir()?
            }
            None => current_dir()?,
        };
        let log_file = log_dir.join(log_file_name(Local::now().date_naive()));

        Self::new(source, backup, interval, log_file)
    }

    /// 同步间隔
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_minutes * 60)
    }

    /// 检查两个根目录是否仍然存在
    pub fn ensure_reachable(&self) -> Result<(), ConfigError> {
        for root in [&self.source_root, &self.backup_root] {
            match fs::metadata(root) {
                Ok(metadata) if metadata.is_dir() => {}
                Ok(_) => return Err(ConfigError::NotADirectory(root.clone())),
                Err(_) => return Err(ConfigError::MissingRoot(root.clone())),
            }
        }
        Ok(())
    }
}

/// 当天的操作日志文件名
pub fn log_file_name(date: NaiveDate) -> String {
    format!("SyncLog_{}.log", date.format("%d-%m-%Y"))
}

fn canonical_dir(path: &Path) -> Result<PathBuf, ConfigError> {
    let metadata = fs::metadata(path).map_err(|_| ConfigError::MissingRoot(path.to_path_buf()))?;
    if !metadata.is_dir() {
        return Err(ConfigError::NotADirectory(path.to_path_buf()));
    }
    dunce::canonicalize(path).map_err(|_| ConfigError::MissingRoot(path.to_path_buf()))
}

/// 日志文件的绝对路径（父目录存在时按规范化路径计算）
fn absolute_log_path(path: PathBuf) -> Result<PathBuf, ConfigError> {
    let path = if path.is_absolute() {
        path
    } else {
        current_dir()?.join(path)
    };

    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => match dunce::canonicalize(parent) {
            Ok(parent) => Ok(parent.join(name)),
            Err(_) => Ok(path.clone()),
        },
        _ => Ok(path),
    }
}

fn current_dir() -> Result<PathBuf, ConfigError> {
    std::env::current_dir().map_err(|source| ConfigError::LogSinkUnavailable {
        path: PathBuf::from("."),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Roots {
        _dir: tempfile::TempDir,
        source: PathBuf,
        backup: PathBuf,
        logs: PathBuf,
    }

    fn roots() -> Roots {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source");
        let backup = dir.path().join("backup");
        let logs = dir.path().join("logs");
        for d in [&source, &backup, &logs] {
            fs::create_dir_all(d).unwrap();
        }
        Roots {
            _dir: dir,
            source,
            backup,
            logs,
        }
    }

    #[test]
    fn test_valid_config() {
        let r = roots();
        let config = SyncConfig::new(&r.source, &r.backup, 5, r.logs.join("sync.log")).unwrap();
        assert!(config.source_root.is_absolute());
        assert_eq!(config.interval(), Duration::from_secs(300));
        config.ensure_reachable().unwrap();
    }

    #[test]
    fn test_zero_interval_rejected() {
        let r = roots();
        let err = SyncConfig::new(&r.source, &r.backup, 0, r.logs.join("sync.log")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidInterval(0)));
    }

    #[test]
    fn test_missing_root_rejected() {
        let r = roots();
        let err = SyncConfig::new(r.source.join("nope"), &r.backup, 1, r.logs.join("sync.log"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingRoot(_)));
    }

    #[test]
    fn test_nested_roots_rejected() {
        let r = roots();
        let inner = r.source.join("inner");
        fs::create_dir_all(&inner).unwrap();

        let err = SyncConfig::new(&r.source, &inner, 1, r.logs.join("sync.log")).unwrap_err();
        assert!(matches!(err, ConfigError::NestedRoots { .. }));

        let err = SyncConfig::new(&r.source, &r.source, 1, r.logs.join("sync.log")).unwrap_err();
        assert!(matches!(err, ConfigError::NestedRoots { .. }));
    }

    #[test]
    fn test_log_inside_backup_rejected() {
        let r = roots();
        let err = SyncConfig::new(&r.source, &r.backup, 1, r.backup.join("sync.log")).unwrap_err();
        assert!(matches!(err, ConfigError::LogInsideTree(_)));
    }

    #[test]
    fn test_vanished_root_detected() {
        let r = roots();
        let config = SyncConfig::new(&r.source, &r.backup, 1, r.logs.join("sync.log")).unwrap();
        fs::remove_dir_all(&r.backup).unwrap();
        assert!(matches!(
            config.ensure_reachable(),
            Err(ConfigError::MissingRoot(_))
        ));
    }

    #[test]
    fn test_file_config_merge_and_resolve() {
        let r = roots();
        let file = r.logs.join("config.json");
        fs::write(
            &file,
            serde_json::json!({
                "sourceFolder": r.source,
                "destFolder": "/does/not/matter",
                "syncPeriod": 15,
                "log": r.logs,
            })
            .to_string(),
        )
        .unwrap();

        let from_file = FileConfig::load(&file).unwrap();
        let cli = FileConfig {
            dest_folder: Some(r.backup.clone()),
            ..Default::default()
        };
        let config = SyncConfig::from_file_config(&from_file.merge(cli)).unwrap();

        assert_eq!(config.sync_interval_minutes, 15);
        assert!(config.backup_root.ends_with("backup"));
        let name = config.log_file.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("SyncLog_") && name.ends_with(".log"));
    }

    #[test]
    fn test_missing_argument() {
        let err = SyncConfig::from_file_config(&FileConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingArgument("sourceFolder")));
    }

    #[test]
    fn test_bad_config_file() {
        let r = roots();
        let file = r.logs.join("broken.json");
        fs::write(&file, "{ not json").unwrap();
        assert!(matches!(
            FileConfig::load(&file),
            Err(ConfigError::ParseFile { .. })
        ));
    }

    #[test]
    fn test_log_file_name() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(log_file_name(date), "SyncLog_07-03-2024.log");
    }
}
