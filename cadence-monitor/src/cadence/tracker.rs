// 帧节奏跟踪器实现
//
// 把一连串原始轮询转换为采样记录流：节流门控、成功/失败分类、
// 累计计数、最大间隔统计以及重复帧检测。

use bytes::Bytes;
use chrono::{DateTime, Utc};
use common::{MonitorError, Result, SampleRecord};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::source::{FrameRead, FrameSource};

/// 帧率对应的帧间隔
///
/// 非有限值、非正值，以及间隔超出 `Duration` 范围或为零的帧率返回None。
pub fn frame_period(fps: f64) -> Option<Duration> {
    if !(fps.is_finite() && fps > 0.0) {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / fps)
        .ok()
        .filter(|period| !period.is_zero())
}

/// 确定目标帧率
///
/// 显式配置优先，其次使用流报告的帧率；两者都不可用时返回
/// `MonitorError::NoFpsAvailable`。无法换算为帧间隔的值视为不可用。
pub fn resolve_target_fps(configured: Option<f64>, reported: Option<f64>) -> Result<f64> {
    let usable = |fps: &f64| frame_period(*fps).is_some();

    if let Some(fps) = configured.filter(usable) {
        info!("Using configured target fps: {:.2}", fps);
        return Ok(fps);
    }
    if let Some(fps) = configured {
        warn!("Ignoring unusable configured fps value: {}", fps);
    }

    match reported.filter(usable) {
        Some(fps) => {
            info!("Using stream reported target fps: {:.2}", fps);
            Ok(fps)
        }
        None => Err(MonitorError::NoFpsAvailable),
    }
}

/// 单次轮询的结果
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// 被节流门控跳过，需等待 `wait` 后再轮询
    Skipped { wait: Duration },
    /// 已读取并产生一条采样记录
    Sampled(SampleRecord),
}

/// 跟踪器统计快照
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerSummary {
    pub frames: u64,
    pub unique_frames: u64,
    pub dropped: u64,
    pub duplicates: u64,
    pub max_period: Option<Duration>,
    pub max_unique_period: Option<Duration>,
}

impl std::fmt::Display for TrackerSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fmt_opt = |d: Option<Duration>| {
            d.map(|d| format!("{:.3}s", d.as_secs_f64()))
                .unwrap_or_else(|| "n/a".to_string())
        };
        write!(
            f,
            "frames={}, unique={}, dropped={}, duplicates={}, max_period={}, max_unique_period={}",
            self.frames,
            self.unique_frames,
            self.dropped,
            self.duplicates,
            fmt_opt(self.max_period),
            fmt_opt(self.max_unique_period)
        )
    }
}

/// 帧节奏跟踪器
///
/// 每路流一个实例，只由采样循环通过 `&mut` 修改。
pub struct CadenceTracker {
    /// 目标帧率（帧/秒）
    target_fps: f64,
    /// 目标帧间隔
    target_period: Duration,
    /// 成功轮询累计
    frames: u64,
    /// 唯一帧累计
    unique_frames: u64,
    /// 失败轮询累计
    dropped: u64,
    /// 重复帧累计（仅用于诊断）
    duplicates: u64,
    /// 上次成功轮询时间
    last_success_time: Option<DateTime<Utc>>,
    /// 上次唯一帧时间
    last_unique_frame_time: Option<DateTime<Utc>>,
    /// 最近一次读取到的帧内容
    last_frame: Option<Bytes>,
    /// 最大成功轮询间隔
    max_period: Option<Duration>,
    /// 最大唯一帧间隔
    max_unique_period: Option<Duration>,
}

impl CadenceTracker {
    /// 创建新的跟踪器
    ///
    /// # 参数
    ///
    /// * `target_fps` - 目标帧率，必须能换算为有效的帧间隔
    pub fn new(target_fps: f64) -> Result<Self> {
        let target_period = frame_period(target_fps).ok_or(MonitorError::NoFpsAvailable)?;
        info!(
            "Creating CadenceTracker: target_fps={:.2}, target_period={:.3}ms",
            target_fps,
            target_period.as_secs_f64() * 1000.0
        );

        Ok(Self {
            target_fps,
            target_period,
            frames: 0,
            unique_frames: 0,
            dropped: 0,
            duplicates: 0,
            last_success_time: None,
            last_unique_frame_time: None,
            last_frame: None,
            max_period: None,
            max_unique_period: None,
        })
    }

    pub fn target_fps(&self) -> f64 {
        self.target_fps
    }

    pub fn target_period(&self) -> Duration {
        self.target_period
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn unique_frames(&self) -> u64 {
        self.unique_frames
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn max_period(&self) -> Option<Duration> {
        self.max_period
    }

    pub fn max_unique_period(&self) -> Option<Duration> {
        self.max_unique_period
    }

    /// 节流门控
    ///
    /// 上次成功时间与上次唯一帧时间都已记录、且距上次成功不足一个目标
    /// 间隔时，返回还需等待的时长；否则返回None表示可以轮询。
    pub fn gate(&self, ts: DateTime<Utc>) -> Option<Duration> {
        let (Some(last_success), Some(_)) = (self.last_success_time, self.last_unique_frame_time)
        else {
            return None;
        };

        let elapsed = elapsed_between(last_success, ts);
        if elapsed < self.target_period {
            Some(self.target_period - elapsed)
        } else {
            None
        }
    }

    /// 记录一次已执行的轮询并产生采样记录
    pub fn observe(&mut self, ts: DateTime<Utc>, read: FrameRead) -> SampleRecord {
        let mut period = None;
        let success = read.is_frame();

        match read {
            FrameRead::Frame(frame) => {
                self.frames += 1;

                let is_unique = match &self.last_frame {
                    Some(previous) => *previous != frame,
                    None => true,
                };

                if is_unique {
                    self.unique_frames += 1;
                    if let Some(last_unique) = self.last_unique_frame_time {
                        let unique_period = elapsed_between(last_unique, ts);
                        if raise_max(&mut self.max_unique_period, unique_period) {
                            info!(
                                "Longest unique frame period detected: {:.3}s",
                                unique_period.as_secs_f64()
                            );
                        }
                    }
                    self.last_unique_frame_time = Some(ts);
                } else {
                    self.duplicates += 1;
                    warn!(
                        "Duplicate frame observed at {} (frame #{}, {} duplicates so far)",
                        ts, self.frames, self.duplicates
                    );
                }

                if let Some(last_success) = self.last_success_time {
                    let elapsed = elapsed_between(last_success, ts);
                    if raise_max(&mut self.max_period, elapsed) {
                        info!(
                            "Longest frame capture period detected: {:.3}s",
                            elapsed.as_secs_f64()
                        );
                    }
                    period = Some(elapsed);
                }
                self.last_success_time = Some(ts);
                self.last_frame = Some(frame);
            }
            FrameRead::Missed => {
                self.dropped += 1;
                debug!("Poll at {} returned no frame ({} dropped)", ts, self.dropped);
            }
        }

        SampleRecord {
            timestamp: ts,
            frames: self.frames,
            unique_frames: self.unique_frames,
            dropped: self.dropped,
            success,
            period,
        }
    }

    /// 执行一次完整轮询：门控、读帧、记录
    pub async fn poll<S>(&mut self, ts: DateTime<Utc>, source: &mut S) -> Result<PollOutcome>
    where
        S: FrameSource + ?Sized,
    {
        if let Some(wait) = self.gate(ts) {
            return Ok(PollOutcome::Skipped { wait });
        }

        let read = source.read_frame().await?;
        Ok(PollOutcome::Sampled(self.observe(ts, read)))
    }

    /// 当前统计快照
    pub fn summary(&self) -> TrackerSummary {
        TrackerSummary {
            frames: self.frames,
            unique_frames: self.unique_frames,
            dropped: self.dropped,
            duplicates: self.duplicates,
            max_period: self.max_period,
            max_unique_period: self.max_unique_period,
        }
    }
}

/// 两个时间点之间的时长，时钟回拨时取零
fn elapsed_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> Duration {
    (later - earlier).to_std().unwrap_or(Duration::ZERO)
}

/// 更新最大值；首次观测只做初始化。返回是否出现了新的更大值
fn raise_max(current: &mut Option<Duration>, candidate: Duration) -> bool {
    match current {
        Some(max) if candidate > *max => {
            *max = candidate;
            true
        }
        Some(_) => false,
        None => {
            *current = Some(candidate);
            false
        }
    }
}
