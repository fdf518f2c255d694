use crate::config::SyncConfig;
use crate::core::executor::{ActionExecutor, ActionRecord};
use crate::core::reconciler::{ActionSummary, Reconciler};
use crate::core::scanner::TreeScanner;
use crate::error::{ConfigError, ItemError, SyncError};
use crate::sink::LogSink;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 同步周期类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleKind {
    /// 启动时的首次同步
    Initial,
    /// 定时触发的同步
    Scheduled,
}

/// 同步周期报告
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub kind: CycleKind,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    /// 成功执行的动作，按执行顺序
    pub executed: Vec<ActionRecord>,
    /// 扫描、冲突与执行中的单项错误
    pub errors: Vec<ItemError>,
    pub summary: ActionSummary,
}

impl CycleReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// 同步引擎 - 执行一个完整的同步周期
#[derive(Debug)]
pub struct SyncEngine {
    config: SyncConfig,
    scanner: TreeScanner,
    reconciler: Reconciler,
}

impl SyncEngine {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            scanner: TreeScanner::new(),
            reconciler: Reconciler::new(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// 检查两个根目录与日志输出是否仍然可用
    pub async fn ensure_reachable(&self, sink: &dyn LogSink) -> Result<(), ConfigError> {
        self.config.ensure_reachable()?;
        sink.check()
            .await
            .map_err(|source| ConfigError::LogSinkUnavailable {
                path: self.config.log_file.clone(),
                source,
            })
    }

    /// 运行一个同步周期
    ///
    /// 扫描源目录与备份目录，生成动作计划并按顺序执行；
    /// 每个成功的动作立即追加到操作日志。单项错误记录在报告中，
    /// 根目录或日志不可用时返回错误。
    pub async fn run_cycle(
        &self,
        sink: &dyn LogSink,
        kind: CycleKind,
    ) -> Result<CycleReport, SyncError> {
        let cycle_id = Uuid::new_v4();
        let started_at = Local::now();
        let timer = Instant::now();

        info!("开始同步周期: {} ({:?})", cycle_id, kind);

        if let Err(e) = self.ensure_reachable(sink).await {
            error!("同步前检查失败: {}", e);
            return Err(e.into());
        }

        let source = self.scanner.scan(&self.config.source_root).await?;
        let backup = self.scanner.scan(&self.config.backup_root).await?;

        let plan = self.reconciler.reconcile(&source, &backup);
        let summary = Reconciler::summarize_actions(&plan.actions);
        debug!(
            "动作计划: 创建目录 {}, 覆盖 {}, 复制 {}, 新建 {}, 删除文件 {}, 删除目录 {}",
            summary.dirs_created,
            summary.files_overwritten,
            summary.files_duplicated,
            summary.files_created,
            summary.files_deleted,
            summary.dirs_deleted
        );

        let mut errors = Vec::new();
        errors.extend(source.errors);
        errors.extend(backup.errors);
        for conflict in &plan.conflicts {
            warn!(
                path = %conflict.relative_path,
                phase = %conflict.phase,
                "类型冲突，本轮跳过: {}",
                conflict.kind
            );
        }
        errors.extend(plan.conflicts);

        let mut executor =
            ActionExecutor::new(&self.config.source_root, &self.config.backup_root);
        for dir in plan.blocked_dirs {
            executor.block_dir(dir);
        }

        let mut executed = Vec::new();
        for action in &plan.actions {
            match executor.execute(action).await {
                Ok(Some(record)) => {
                    sink.append(&record.log_line())
                        .await
                        .map_err(|source| SyncError::Sink {
                            sink: sink.name().to_string(),
                            source,
                        })?;
                    executed.push(record);
                }
                Ok(None) => {
                    debug!("目标已处于期望状态: {}", action.target());
                }
                Err(e) => {
                    warn!(
                        path = %e.relative_path,
                        phase = %e.phase,
                        "执行动作失败: {}",
                        e.kind
                    );
                    errors.push(e);
                }
            }
        }

        let summary = Reconciler::summarize_actions(executed.iter().map(|r| &r.action));

        info!(
            "同步周期完成: {} - 执行 {} 个动作, {} 个错误, 耗时 {:?}",
            cycle_id,
            executed.len(),
            errors.len(),
            timer.elapsed()
        );

        Ok(CycleReport {
            cycle_id,
            kind,
            started_at,
            finished_at: Local::now(),
            executed,
            errors,
            summary,
        })
    }
}
