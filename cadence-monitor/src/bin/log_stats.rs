// 离线统计：读取小时CSV日志并输出帧率汇总

use anyhow::Result;
use cadence_monitor::analysis::analyze_dir;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "log-stats", version, about = "Summarize frame cadence logs")]
struct Args {
    /// Directory containing log_<YYYYMMDD>_<HH>.csv files
    #[arg(env = "DATA_LOG_DIR", default_value = "./log")]
    log_dir: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    info!("Analyzing logs in {:?}", args.log_dir);
    let report = analyze_dir(&args.log_dir)?;

    println!("Files analyzed: {}", report.files.len());
    for file in &report.files {
        let last = file
            .last
            .as_ref()
            .map(|r| {
                format!(
                    "frames={}, unique={}, dropped={}",
                    r.frames, r.unique_frames, r.dropped
                )
            })
            .unwrap_or_else(|| "empty".to_string());
        println!("  {} ({} rows, {})", file.path.display(), file.rows, last);
    }
    println!("Total rows: {}", report.total_rows());
    println!("Drop ratio: {:.4}", report.drop_ratio());
    println!("Duplicate ratio: {:.4}", report.duplicate_ratio());

    match report.fps {
        Some(fps) => {
            println!("FPS samples: {}", fps.count);
            println!("Standard Deviation: {:.4}", fps.std_dev);
            println!("Median: {:.4}", fps.median);
            println!("Mean: {:.4}", fps.mean);
            println!("Minimum: {:.4}", fps.min);
            println!("Maximum: {:.4}", fps.max);
        }
        None => println!("No period samples found"),
    }

    Ok(())
}
