//! 单向文件夹镜像
//!
//! 以源目录为准，周期性地让备份目录与之保持一致，每个变更写入一行操作日志。

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod sink;

pub use crate::config::{FileConfig, SyncConfig};
pub use crate::core::{CycleKind, CycleReport, SyncDriver, SyncEngine};
pub use crate::error::{ConfigError, ItemError, SyncError};
pub use crate::sink::{FileSink, LogSink, MemorySink};

/// 启动时的首次同步
pub async fn run_initial_sync(
    config: &SyncConfig,
    sink: &dyn LogSink,
) -> Result<CycleReport, SyncError> {
    SyncEngine::new(config.clone())
        .run_cycle(sink, CycleKind::Initial)
        .await
}

/// 运行一个定时同步周期
pub async fn run_cycle(config: &SyncConfig, sink: &dyn LogSink) -> Result<CycleReport, SyncError> {
    SyncEngine::new(config.clone())
        .run_cycle(sink, CycleKind::Scheduled)
        .await
}
