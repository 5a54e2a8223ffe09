// 模拟帧数据源
//
// 不依赖任何视频库，按名义帧率生成可预测的帧内容，
// 可配置周期性重复帧与周期性读帧失败，用于验证采样流程。

use async_trait::async_trait;
use bytes::Bytes;
use common::{MonitorError, Result};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info};

use super::{FrameRead, FrameSource};
use crate::cadence::frame_period;

/// 模拟数据源配置
#[derive(Debug, Clone)]
pub struct SyntheticOptions {
    /// 名义帧率
    pub fps: f64,
    /// 每第N帧重复上一帧内容
    pub repeat_every: Option<u64>,
    /// 每第M次读取失败
    pub miss_every: Option<u64>,
    /// 产生指定数量的读取后关闭
    pub read_limit: Option<u64>,
    /// 单帧字节数
    pub frame_size: usize,
}

impl Default for SyntheticOptions {
    fn default() -> Self {
        Self {
            fps: 30.0,
            repeat_every: None,
            miss_every: None,
            read_limit: None,
            frame_size: 64,
        }
    }
}

pub struct SyntheticFrameSource {
    options: SyntheticOptions,
    ticker: Interval,
    reads: u64,
    generated: u64,
    last_frame: Option<Bytes>,
    open: bool,
}

impl SyntheticFrameSource {
    pub async fn connect(options: SyntheticOptions) -> Result<Self> {
        let period = frame_period(options.fps).ok_or_else(|| {
            MonitorError::ConnectionError(format!("invalid synthetic frame rate: {}", options.fps))
        })?;

        info!("🎥 Creating synthetic frame source (MOCK MODE)");
        info!("  FPS: {:.2}", options.fps);
        info!("  Frame size: {} bytes", options.frame_size);

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(Self {
            options,
            ticker,
            reads: 0,
            generated: 0,
            last_frame: None,
            open: true,
        })
    }

    fn next_frame(&mut self) -> Bytes {
        self.generated += 1;

        let repeat = matches!(self.options.repeat_every, Some(n) if n > 0 && self.generated % n == 0);
        if repeat {
            if let Some(previous) = &self.last_frame {
                debug!("Synthetic source repeating frame #{}", self.generated);
                return previous.clone();
            }
        }

        let seed = self.generated.to_le_bytes();
        let frame: Vec<u8> = (0..self.options.frame_size)
            .map(|i| seed[i % seed.len()] ^ (i as u8))
            .collect();
        let frame = Bytes::from(frame);
        self.last_frame = Some(frame.clone());
        frame
    }
}

#[async_trait]
impl FrameSource for SyntheticFrameSource {
    fn is_open(&self) -> bool {
        self.open
    }

    async fn read_frame(&mut self) -> Result<FrameRead> {
        if !self.open {
            return Ok(FrameRead::Missed);
        }

        self.ticker.tick().await;
        self.reads += 1;

        if let Some(limit) = self.options.read_limit {
            if self.reads >= limit {
                info!("Synthetic source reached its read limit ({})", limit);
                self.open = false;
            }
        }

        let miss = matches!(self.options.miss_every, Some(m) if m > 0 && self.reads % m == 0);
        if miss {
            return Ok(FrameRead::Missed);
        }

        Ok(FrameRead::Frame(self.next_frame()))
    }

    fn reported_fps(&self) -> Option<f64> {
        Some(self.options.fps)
    }

    async fn close(&mut self) {
        self.open = false;
    }
}
