//! 定时驱动 - 启动时同步一次，之后按间隔周期性同步

use crate::core::engine::{CycleKind, CycleReport, SyncEngine};
use crate::error::SyncError;
use crate::sink::LogSink;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// 周期触发源
#[async_trait]
pub trait Schedule: Send {
    /// 等待下一次触发
    async fn tick(&mut self);
}

/// 固定间隔触发，首次触发在一个完整间隔之后
pub struct IntervalSchedule {
    interval: Interval,
}

impl IntervalSchedule {
    pub fn new(period: Duration) -> Self {
        let mut interval = time::interval_at(Instant::now() + period, period);
        // 同步耗时超过间隔时顺延，不补发
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl Schedule for IntervalSchedule {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

/// 同步驱动器
///
/// 同一时间只运行一个周期；任何周期级错误都会终止运行。
pub struct SyncDriver<S: Schedule> {
    engine: SyncEngine,
    sink: Arc<dyn LogSink>,
    schedule: S,
}

impl SyncDriver<IntervalSchedule> {
    /// 使用配置中的同步间隔
    pub fn with_interval(engine: SyncEngine, sink: Arc<dyn LogSink>) -> Self {
        let schedule = IntervalSchedule::new(engine.config().interval());
        Self::new(engine, sink, schedule)
    }
}

impl<S: Schedule> SyncDriver<S> {
    pub fn new(engine: SyncEngine, sink: Arc<dyn LogSink>, schedule: S) -> Self {
        Self {
            engine,
            sink,
            schedule,
        }
    }

    /// 运行直到取消或出现致命错误，返回已完成的周期数（含首次同步）
    pub async fn run(self, cancel: CancellationToken) -> Result<u64, SyncError> {
        let Self {
            engine,
            sink,
            mut schedule,
        } = self;
        let mut completed = 0u64;

        run_once(&engine, sink.as_ref(), CycleKind::Initial).await?;
        completed += 1;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("收到停止信号，已完成 {} 个同步周期", completed);
                    break;
                }

                _ = schedule.tick() => {
                    run_once(&engine, sink.as_ref(), CycleKind::Scheduled).await?;
                    completed += 1;
                }
            }
        }

        Ok(completed)
    }
}

async fn run_once(
    engine: &SyncEngine,
    sink: &dyn LogSink,
    kind: CycleKind,
) -> Result<CycleReport, SyncError> {
    engine
        .run_cycle(sink, kind)
        .await
        .inspect_err(|e| error!("同步周期失败，停止运行: {}", e))
}
