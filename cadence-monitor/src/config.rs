// 配置加载
//
// 配置来源依次为：内置默认值、TOML配置文件、命令行参数与环境变量，
// 后者覆盖前者。

use clap::Parser;
use common::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::cadence::frame_period;
use crate::driver::DriverOptions;
use crate::source::{FfmpegOptions, SyntheticOptions};

/// 命令行参数，优先级高于配置文件
#[derive(Parser, Debug, Clone)]
#[command(name = "cadence-monitor", version, about = "Measure the frame cadence a live video stream delivers")]
pub struct Cli {
    /// TOML配置文件路径
    #[arg(long, env = "CONFIG_FILE", default_value = "config.toml")]
    pub config: PathBuf,

    /// 小时CSV日志目录
    #[arg(long, env = "DATA_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// 流地址
    #[arg(long)]
    pub url: Option<String>,

    /// 流用户名
    #[arg(long)]
    pub username: Option<String>,

    /// 流密码
    #[arg(long, env = "STREAM_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// 覆盖目标帧率
    #[arg(long)]
    pub fps: Option<f64>,

    /// 使用模拟数据源代替FFmpeg
    #[arg(long)]
    pub synthetic: bool,
}

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 流连接配置
    pub stream: StreamConfig,

    /// 数据源配置
    pub source: SourceConfig,

    /// 日志文件配置
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// 显式目标帧率，未设置时使用流报告的帧率
    pub fps: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Ffmpeg,
    Synthetic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub rtsp_transport: String,
    pub read_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    pub channel_capacity: usize,
    pub realtime_input: bool,
    pub synthetic: SyntheticConfig,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Ffmpeg,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            rtsp_transport: "tcp".to_string(),
            read_timeout_ms: 2000,
            probe_timeout_ms: 10_000,
            channel_capacity: 2,
            realtime_input: false,
            synthetic: SyntheticConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub fps: f64,
    pub repeat_every: Option<u64>,
    pub miss_every: Option<u64>,
    pub read_limit: Option<u64>,
    pub frame_size: usize,
}

impl Default for SyntheticConfig {
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

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    /// 节流门控关闭时单次休眠的上限
    pub max_idle_sleep_ms: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./log"),
            max_idle_sleep_ms: 50,
        }
    }
}

impl AppConfig {
    /// 从TOML文本解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| MonitorError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// 加载配置文件（若存在），应用命令行覆盖并校验
    pub async fn load(cli: &Cli) -> Result<Self> {
        let mut config = Self::load_file(&cli.config).await?;
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    async fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| MonitorError::Config(format!("Failed to read config file: {}", e)))?;
        info!("Loaded configuration from {:?}", path);
        Self::from_toml_str(&content)
    }

    /// 用命令行参数覆盖文件中的值
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(log_dir) = &cli.log_dir {
            self.logging.log_dir = log_dir.clone();
        }
        if let Some(url) = &cli.url {
            self.stream.url = Some(url.clone());
        }
        if let Some(username) = &cli.username {
            self.stream.username = Some(username.clone());
        }
        if let Some(password) = &cli.password {
            self.stream.password = Some(password.clone());
        }
        if let Some(fps) = cli.fps {
            self.stream.fps = Some(fps);
        }
        if cli.synthetic {
            self.source.kind = SourceKind::Synthetic;
        }
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.source.kind == SourceKind::Ffmpeg && self.stream.url.is_none() {
            return Err(MonitorError::Config(
                "stream.url is required for the ffmpeg source".to_string(),
            ));
        }

        if let Some(fps) = self.stream.fps {
            if frame_period(fps).is_none() {
                return Err(MonitorError::Config(format!(
                    "stream.fps must be a usable frame rate, got {}",
                    fps
                )));
            }
        }

        if self.source.kind == SourceKind::Synthetic
            && frame_period(self.source.synthetic.fps).is_none()
        {
            return Err(MonitorError::Config(format!(
                "source.synthetic.fps must be a usable frame rate, got {}",
                self.source.synthetic.fps
            )));
        }

        if self.source.read_timeout_ms == 0 {
            return Err(MonitorError::Config(
                "source.read_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.source.channel_capacity == 0 {
            return Err(MonitorError::Config(
                "source.channel_capacity must be greater than 0".to_string(),
            ));
        }

        if self.logging.log_dir.as_os_str().is_empty() {
            return Err(MonitorError::Config(
                "logging.log_dir must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn ffmpeg_options(&self) -> FfmpegOptions {
        FfmpegOptions {
            ffmpeg_path: self.source.ffmpeg_path.clone(),
            ffprobe_path: self.source.ffprobe_path.clone(),
            rtsp_transport: self.source.rtsp_transport.clone(),
            read_timeout: Duration::from_millis(self.source.read_timeout_ms),
            probe_timeout: Duration::from_millis(self.source.probe_timeout_ms),
            channel_capacity: self.source.channel_capacity,
            realtime_input: self.source.realtime_input,
        }
    }

    pub fn synthetic_options(&self) -> SyntheticOptions {
        let synthetic = &self.source.synthetic;
        SyntheticOptions {
            fps: synthetic.fps,
            repeat_every: synthetic.repeat_every,
            miss_every: synthetic.miss_every,
            read_limit: synthetic.read_limit,
            frame_size: synthetic.frame_size,
        }
    }

    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            max_idle_sleep: Duration::from_millis(self.logging.max_idle_sleep_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[stream]
url = "rtsp://camera.local:554/stream1"
username = "admin"
password = "secret"
fps = 10.0

[source]
read_timeout_ms = 500

[logging]
log_dir = "/var/log/cadence"
"#;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["cadence-monitor"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn test_parse_config_file() {
        let config = AppConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(
            config.stream.url.as_deref(),
            Some("rtsp://camera.local:554/stream1")
        );
        assert_eq!(config.stream.username.as_deref(), Some("admin"));
        assert_eq!(config.stream.fps, Some(10.0));
        assert_eq!(config.source.kind, SourceKind::Ffmpeg);
        assert_eq!(config.source.read_timeout_ms, 500);
        assert_eq!(config.source.ffmpeg_path, "ffmpeg");
        assert_eq!(config.logging.log_dir, PathBuf::from("/var/log/cadence"));
        assert_eq!(config.logging.max_idle_sleep_ms, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert!(config.stream.url.is_none());
        assert_eq!(config.logging.log_dir, PathBuf::from("./log"));
        assert_eq!(config.source.synthetic.fps, 30.0);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            AppConfig::from_toml_str("[stream\nurl = 1"),
            Err(MonitorError::Config(_))
        ));
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut config = AppConfig::from_toml_str(SAMPLE).unwrap();
        let cli = cli(&[
            "--url",
            "rtsp://other/stream",
            "--fps",
            "25",
            "--log-dir",
            "/tmp/logs",
        ]);
        config.apply_cli(&cli);

        assert_eq!(config.stream.url.as_deref(), Some("rtsp://other/stream"));
        assert_eq!(config.stream.fps, Some(25.0));
        assert_eq!(config.logging.log_dir, PathBuf::from("/tmp/logs"));
        // 未在命令行指定的值保持文件中的设置
        assert_eq!(config.stream.username.as_deref(), Some("admin"));
    }

    #[test]
    fn test_validation() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_err());

        config.source.kind = SourceKind::Synthetic;
        assert!(config.validate().is_ok());

        config.stream.fps = Some(-5.0);
        assert!(config.validate().is_err());

        config.stream.fps = Some(5.0);
        config.source.channel_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_unusable_fps() {
        let config = AppConfig::from_toml_str(&SAMPLE.replace("fps = 10.0", "fps = 1e-20")).unwrap();
        assert_eq!(config.stream.fps, Some(1e-20));
        assert!(matches!(config.validate(), Err(MonitorError::Config(_))));

        let mut config = AppConfig::default();
        config.source.kind = SourceKind::Synthetic;
        config.source.synthetic.fps = 1e-20;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_synthetic_flag() {
        let mut config = AppConfig::default();
        config.apply_cli(&cli(&["--synthetic"]));
        assert_eq!(config.source.kind, SourceKind::Synthetic);
    }

    #[test]
    fn test_option_conversions() {
        let config = AppConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.ffmpeg_options().read_timeout, Duration::from_millis(500));
        assert_eq!(config.driver_options().max_idle_sleep, Duration::from_millis(50));
        assert_eq!(config.synthetic_options().frame_size, 64);
    }

    #[tokio::test]
    async fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let cli = cli(&["--config", missing.to_str().unwrap(), "--synthetic"]);
        let config = AppConfig::load(&cli).await.unwrap();
        assert_eq!(config.source.kind, SourceKind::Synthetic);
    }

    #[tokio::test]
    async fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let cli = cli(&["--config", path.to_str().unwrap()]);
        let config = AppConfig::load(&cli).await.unwrap();
        assert_eq!(config.stream.password.as_deref(), Some("secret"));
    }
}
