use anyhow::Result;
use cadence_monitor::{app, AppConfig, Cli};
use clap::Parser;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志 - 使用环境变量 RUST_LOG 控制级别
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("📈 Cadence monitor starting...");

    let cli = Cli::parse();
    let config = AppConfig::load(&cli).await?;
    info!("✓ Configuration loaded");
    info!("  Source: {:?}", config.source.kind);
    info!("  Log dir: {:?}", config.logging.log_dir);

    let summary = app::run(config).await?;
    info!("✅ Cadence monitor finished: {}", summary);

    Ok(())
}
