// 帧数据源抽象
//
// 本模块定义了"连接流，然后反复尝试读取下一帧"的统一接口。
// 数据源只负责返回不透明、可比较的帧字节，不做任何统计。
//
// # 实现
//
// - `FfmpegFrameSource`: 通过FFmpeg子进程解码实时流
// - `SyntheticFrameSource`: 确定性的模拟帧发生器，用于演示与测试

use async_trait::async_trait;
use bytes::Bytes;
use common::Result;

pub mod ffmpeg;
pub mod synthetic;

pub use ffmpeg::{FfmpegFrameSource, FfmpegOptions};
pub use synthetic::{SyntheticFrameSource, SyntheticOptions};

/// 单次读帧结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameRead {
    /// 成功读取到一帧
    Frame(Bytes),
    /// 本次未读到帧（属于正常的稳态事件，计入丢帧）
    Missed,
}

impl FrameRead {
    pub fn is_frame(&self) -> bool {
        matches!(self, FrameRead::Frame(_))
    }

    pub fn into_frame(self) -> Option<Bytes> {
        match self {
            FrameRead::Frame(frame) => Some(frame),
            FrameRead::Missed => None,
        }
    }
}

/// 统一的帧数据源接口
///
/// 连接由各实现自己的异步构造函数完成，连接失败返回
/// `MonitorError::ConnectionError`。
#[async_trait]
pub trait FrameSource: Send {
    /// 流是否仍处于打开状态
    fn is_open(&self) -> bool;

    /// 尝试读取下一帧
    ///
    /// # 返回
    ///
    /// - `Ok(FrameRead::Frame(bytes))`: 成功获取帧
    /// - `Ok(FrameRead::Missed)`: 本次未获取到帧
    /// - `Err(error)`: 不可恢复的传输错误，运行终止
    async fn read_frame(&mut self) -> Result<FrameRead>;

    /// 流自身报告的帧率
    fn reported_fps(&self) -> Option<f64>;

    /// 关闭数据源并释放底层传输
    async fn close(&mut self);
}

#[async_trait]
impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    async fn read_frame(&mut self) -> Result<FrameRead> {
        (**self).read_frame().await
    }

    fn reported_fps(&self) -> Option<f64> {
        (**self).reported_fps()
    }

    async fn close(&mut self) {
        (**self).close().await
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    //! 按脚本返回结果的测试数据源

    use super::*;
    use std::collections::VecDeque;

    pub struct ScriptedSource {
        reads: VecDeque<FrameRead>,
        fps: Option<f64>,
        pub reads_issued: usize,
        pub closed: bool,
    }

    impl ScriptedSource {
        pub fn new(reads: Vec<FrameRead>) -> Self {
            Self {
                reads: reads.into(),
                fps: None,
                reads_issued: 0,
                closed: false,
            }
        }

        pub fn with_fps(mut self, fps: f64) -> Self {
            self.fps = Some(fps);
            self
        }
    }

    pub fn frame(content: &'static [u8]) -> FrameRead {
        FrameRead::Frame(Bytes::from_static(content))
    }

    #[async_trait]
    impl FrameSource for ScriptedSource {
        fn is_open(&self) -> bool {
            !self.closed && !self.reads.is_empty()
        }

        async fn read_frame(&mut self) -> Result<FrameRead> {
            self.reads_issued += 1;
            Ok(self.reads.pop_front().unwrap_or(FrameRead::Missed))
        }

        fn reported_fps(&self) -> Option<f64> {
            self.fps
        }

        async fn close(&mut self) {
            self.closed = true;
        }
    }
}
