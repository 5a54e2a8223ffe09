// 采样主循环
//
// 两层循环：
// - 外层（每小时）：计算当前UTC小时桶并打开对应日志文件
// - 内层（每次轮询）：流仍打开且小时未变化时反复调用跟踪器，
//   未被跳过的记录写入日志
//
// 小时变化时回到外层轮换文件，计数器不重置。

use chrono::{DateTime, Utc};
use common::{HourBucket, Result};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cadence::{CadenceTracker, PollOutcome};
use crate::logsink::{HourlyLogSink, LogStore};
use crate::source::FrameSource;

/// 时钟接口，测试中可替换为可控时钟
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 主循环配置
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// 被门控跳过时单次休眠的上限
    pub max_idle_sleep: Duration,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            max_idle_sleep: Duration::from_millis(50),
        }
    }
}

/// 主循环结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// 流已关闭
    StreamClosed,
    /// 收到停止信号
    Shutdown,
}

/// 运行采样主循环直到流关闭、收到停止信号或发生致命错误
///
/// 无论以何种方式结束，都会关闭数据源并输出统计摘要。
pub async fn run_monitor<S, L, C>(
    source: &mut S,
    tracker: &mut CadenceTracker,
    sink: &mut HourlyLogSink<L>,
    clock: &C,
    options: &DriverOptions,
    mut shutdown: watch::Receiver<bool>,
) -> Result<StopReason>
where
    S: FrameSource + ?Sized,
    L: LogStore,
    C: Clock,
{
    let result = drive(source, tracker, sink, clock, options, &mut shutdown).await;

    source.close().await;
    let flushed = sink.flush();

    match &result {
        Ok(reason) => info!("Monitor stopped ({:?}): {}", reason, tracker.summary()),
        Err(e) => warn!("Monitor aborted: {} ({})", e, tracker.summary()),
    }

    let reason = result?;
    flushed?;
    Ok(reason)
}

async fn drive<S, L, C>(
    source: &mut S,
    tracker: &mut CadenceTracker,
    sink: &mut HourlyLogSink<L>,
    clock: &C,
    options: &DriverOptions,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<StopReason>
where
    S: FrameSource + ?Sized,
    L: LogStore,
    C: Clock,
{
    'hourly: loop {
        if !source.is_open() {
            return Ok(StopReason::StreamClosed);
        }
        if *shutdown.borrow() {
            return Ok(StopReason::Shutdown);
        }

        let bucket = HourBucket::of(clock.now());
        sink.open_bucket(bucket)?;
        info!("Sampling into hour bucket {}", bucket);

        loop {
            if *shutdown.borrow() {
                return Ok(StopReason::Shutdown);
            }
            if !source.is_open() {
                return Ok(StopReason::StreamClosed);
            }

            let ts = clock.now();
            if !bucket.contains(ts) {
                info!("Hour changed at {}, rotating log file", ts);
                continue 'hourly;
            }

            match tracker.poll(ts, source).await? {
                PollOutcome::Skipped { wait } => {
                    pause(wait.min(options.max_idle_sleep), shutdown).await;
                }
                PollOutcome::Sampled(record) => {
                    sink.append(&record)?;
                }
            }
        }
    }
}

/// 休眠直到下一次可轮询时刻，期间收到停止信号则提前返回
async fn pause(wait: Duration, shutdown: &mut watch::Receiver<bool>) {
    tokio::select! {
        _ = tokio::time::sleep(wait) => {}
        changed = shutdown.changed() => {
            if changed.is_err() {
                // 发送端已关闭，不会再有停止信号
                tokio::time::sleep(wait).await;
            } else {
                debug!("Shutdown requested while waiting for next poll");
            }
        }
    }
}
