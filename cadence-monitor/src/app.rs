// 应用装配
//
// 按配置连接数据源、确定目标帧率、创建跟踪器与日志写入器，
// 然后运行采样主循环直到流关闭或收到Ctrl+C。

use common::{MonitorError, Result};
use tokio::sync::watch;
use tracing::{error, info};

use crate::cadence::{resolve_target_fps, CadenceTracker, TrackerSummary};
use crate::config::{AppConfig, SourceKind};
use crate::driver::{run_monitor, SystemClock};
use crate::logsink::HourlyLogSink;
use crate::source::{FfmpegFrameSource, FrameSource, SyntheticFrameSource};
use crate::uri::{build_stream_uri, redact_str};

const SYNTHETIC_URI: &str = "synthetic://local";

/// 运行一次完整的采样会话，返回结束时的统计摘要
pub async fn run(config: AppConfig) -> Result<TrackerSummary> {
    let (source_uri, mut source) = connect_source(&config).await?;
    info!("✓ Stream connected: {}", redact_str(&source_uri));

    let target_fps = match resolve_target_fps(config.stream.fps, source.reported_fps()) {
        Ok(fps) => fps,
        Err(e) => {
            source.close().await;
            return Err(e);
        }
    };
    let mut tracker = CadenceTracker::new(target_fps)?;
    let mut sink = HourlyLogSink::local(
        &config.logging.log_dir,
        redact_str(&source_uri),
        target_fps,
    );
    info!("✓ Logging to {:?}", sink.log_dir());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, stopping after the current poll");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    info!("✅ Cadence monitor running, press Ctrl+C to stop");
    run_monitor(
        &mut source,
        &mut tracker,
        &mut sink,
        &SystemClock,
        &config.driver_options(),
        shutdown_rx,
    )
    .await?;

    Ok(tracker.summary())
}

async fn connect_source(config: &AppConfig) -> Result<(String, Box<dyn FrameSource>)> {
    match config.source.kind {
        SourceKind::Ffmpeg => {
            let url = config.stream.url.as_deref().ok_or_else(|| {
                MonitorError::Config("stream.url is required for the ffmpeg source".to_string())
            })?;
            let uri = build_stream_uri(
                url,
                config.stream.username.as_deref(),
                config.stream.password.as_deref(),
            )?;
            let source = FfmpegFrameSource::connect(&uri, config.ffmpeg_options()).await?;
            Ok((uri, Box::new(source)))
        }
        SourceKind::Synthetic => {
            let source = SyntheticFrameSource::connect(config.synthetic_options()).await?;
            Ok((SYNTHETIC_URI.to_string(), Box::new(source)))
        }
    }
}
