// FFmpeg帧数据源
//
// 使用ffprobe探测流的分辨率与帧率，然后启动ffmpeg子进程把视频解码为
// 8位灰度原始帧输出到stdout。后台任务按固定帧长读取并通过有界通道交给
// 采样循环。

use async_trait::async_trait;
use bytes::Bytes;
use common::{MonitorError, Result};
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{FrameRead, FrameSource};
use crate::uri::redact_str;

/// FFmpeg数据源配置
#[derive(Debug, Clone)]
pub struct FfmpegOptions {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// RTSP传输方式（tcp / udp），仅对rtsp地址生效
    pub rtsp_transport: String,
    /// 单次读帧的最长等待时间，超时记为一次失败轮询
    pub read_timeout: Duration,
    /// 探测流信息的超时时间
    pub probe_timeout: Duration,
    /// 解码帧缓冲通道容量
    pub channel_capacity: usize,
    /// 以原始速率读取输入（用于文件输入）
    pub realtime_input: bool,
}

impl Default for FfmpegOptions {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            rtsp_transport: "tcp".to_string(),
            read_timeout: Duration::from_millis(2000),
            probe_timeout: Duration::from_secs(10),
            channel_capacity: 2,
            realtime_input: false,
        }
    }
}

/// ffprobe探测结果
#[derive(Debug, Clone, PartialEq)]
pub struct StreamProbe {
    pub width: u32,
    pub height: u32,
    pub fps: Option<f64>,
}

impl StreamProbe {
    /// 灰度帧字节数
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
}

/// FFmpeg帧数据源
pub struct FfmpegFrameSource {
    display_uri: String,
    probe: StreamProbe,
    child: Option<Child>,
    frames: mpsc::Receiver<std::io::Result<Bytes>>,
    reader_task: Option<JoinHandle<()>>,
    read_timeout: Duration,
    open: bool,
}

impl FfmpegFrameSource {
    /// 连接到流
    ///
    /// 探测失败、分辨率未知或ffmpeg无法启动都视为连接错误。
    pub async fn connect(uri: &str, options: FfmpegOptions) -> Result<Self> {
        let display_uri = redact_str(uri);
        info!("Connecting to stream via FFmpeg: {}", display_uri);

        let probe = probe_stream(uri, &options).await?;
        if probe.frame_size() == 0 {
            return Err(MonitorError::ConnectionError(format!(
                "stream {} reports no usable resolution",
                display_uri
            )));
        }

        info!(
            "Stream probed: {}x{}, reported fps: {}",
            probe.width,
            probe.height,
            probe
                .fps
                .map(|f| format!("{:.2}", f))
                .unwrap_or_else(|| "unknown".to_string())
        );

        let mut command = Command::new(&options.ffmpeg_path);
        command.args(["-hide_banner", "-loglevel", "error", "-nostdin"]);
        if options.realtime_input {
            command.arg("-re");
        }
        command
            .args(transport_args(uri, &options))
            .args(["-i", uri, "-an", "-f", "rawvideo", "-pix_fmt", "gray", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            MonitorError::ConnectionError(format!(
                "failed to execute {}: {}",
                options.ffmpeg_path, e
            ))
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            MonitorError::ConnectionError("ffmpeg stdout not captured".to_string())
        })?;

        let (tx, rx) = mpsc::channel(options.channel_capacity.max(1));
        let frame_size = probe.frame_size();
        let reader_task = tokio::spawn(async move {
            read_frames(stdout, frame_size, tx).await;
        });

        info!("✓ FFmpeg decoder started (frame size {} bytes)", frame_size);

        Ok(Self {
            display_uri,
            probe,
            child: Some(child),
            frames: rx,
            reader_task: Some(reader_task),
            read_timeout: options.read_timeout,
            open: true,
        })
    }

    pub fn probe(&self) -> &StreamProbe {
        &self.probe
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    fn is_open(&self) -> bool {
        self.open
    }

    async fn read_frame(&mut self) -> Result<FrameRead> {
        if !self.open {
            return Ok(FrameRead::Missed);
        }

        match tokio::time::timeout(self.read_timeout, self.frames.recv()).await {
            Ok(Some(Ok(frame))) => Ok(FrameRead::Frame(frame)),
            Ok(Some(Err(e))) => {
                self.open = false;
                Err(MonitorError::Source(format!(
                    "failed to read decoded frames from {}: {}",
                    self.display_uri, e
                )))
            }
            Ok(None) => {
                info!("Stream {} ended", self.display_uri);
                self.open = false;
                Ok(FrameRead::Missed)
            }
            Err(_) => {
                debug!(
                    "No frame within {:.3}s from {}",
                    self.read_timeout.as_secs_f64(),
                    self.display_uri
                );
                Ok(FrameRead::Missed)
            }
        }
    }

    fn reported_fps(&self) -> Option<f64> {
        self.probe.fps
    }

    async fn close(&mut self) {
        self.open = false;
        self.frames.close();

        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill FFmpeg process: {}", e);
            }
            info!("FFmpeg process terminated");
        }

        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
    }
}

/// 后台读帧循环：读满一帧后送入通道，EOF或接收端关闭时退出。
/// 其他读取错误转交给采样循环处理。
async fn read_frames(
    mut stdout: ChildStdout,
    frame_size: usize,
    tx: mpsc::Sender<std::io::Result<Bytes>>,
) {
    let mut frames_read: u64 = 0;
    loop {
        let mut buf = vec![0u8; frame_size];
        match stdout.read_exact(&mut buf).await {
            Ok(_) => {
                frames_read += 1;
                if tx.send(Ok(Bytes::from(buf))).await.is_err() {
                    debug!("Frame receiver dropped after {} frames", frames_read);
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                info!("FFmpeg output ended after {} frames", frames_read);
                break;
            }
            Err(e) => {
                error!("Failed to read FFmpeg output: {}", e);
                let _ = tx.send(Err(e)).await;
                break;
            }
        }
    }
}

fn transport_args(uri: &str, options: &FfmpegOptions) -> Vec<String> {
    if uri.starts_with("rtsp://") || uri.starts_with("rtsps://") {
        vec!["-rtsp_transport".to_string(), options.rtsp_transport.clone()]
    } else {
        Vec::new()
    }
}

async fn probe_stream(uri: &str, options: &FfmpegOptions) -> Result<StreamProbe> {
    let mut command = Command::new(&options.ffprobe_path);
    command
        .args(["-v", "error", "-select_streams", "v:0", "-show_streams", "-of", "json"])
        .args(transport_args(uri, options))
        .arg(uri)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let output = tokio::time::timeout(options.probe_timeout, command.output())
        .await
        .map_err(|_| {
            MonitorError::ConnectionError(format!(
                "ffprobe timed out after {:?}",
                options.probe_timeout
            ))
        })?
        .map_err(|e| {
            MonitorError::ConnectionError(format!(
                "failed to execute {}: {}",
                options.ffprobe_path, e
            ))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MonitorError::ConnectionError(format!(
            "ffprobe failed ({}): {}",
            output.status,
            stderr.trim()
        )));
    }

    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
}

/// 解析 `ffprobe -of json -show_streams` 的输出，取第一条视频流
pub(crate) fn parse_probe_output(json: &str) -> Result<StreamProbe> {
    let output: ProbeOutput = serde_json::from_str(json).map_err(|e| {
        MonitorError::ConnectionError(format!("unreadable ffprobe output: {}", e))
    })?;

    let stream = output
        .streams
        .into_iter()
        .find(|s| s.codec_type.as_deref().map_or(true, |t| t == "video"))
        .ok_or_else(|| MonitorError::ConnectionError("no video stream found".to_string()))?;

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rational)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rational));

    Ok(StreamProbe {
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
        fps,
    })
}

/// 解析 `num/den` 形式的帧率，`0/0` 等无效值返回None
pub(crate) fn parse_rational(text: &str) -> Option<f64> {
    let value = match text.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => text.trim().parse().ok()?,
    };

    if value.is_finite() && value > 0.0 {
        Some(value)
    } else {
        None
    }
}
