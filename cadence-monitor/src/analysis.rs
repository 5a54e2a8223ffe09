// 离线日志分析
//
// 读取采样循环写出的小时CSV日志，由 `period` 计算瞬时帧率并输出
// 汇总统计（均值、中位数、标准差、最小值、最大值）。

use common::{MonitorError, Result, SampleRecord};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// 帧率统计
#[derive(Debug, Clone, PartialEq)]
pub struct FpsStatistics {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    /// 样本标准差（n-1）
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

/// 单个日志文件的汇总
#[derive(Debug, Clone)]
pub struct LogFileSummary {
    pub path: PathBuf,
    pub rows: usize,
    pub successes: usize,
    pub duplicates: usize,
    pub last: Option<SampleRecord>,
}

/// 分析报告
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub files: Vec<LogFileSummary>,
    pub fps: Option<FpsStatistics>,
}

impl AnalysisReport {
    pub fn total_rows(&self) -> usize {
        self.files.iter().map(|f| f.rows).sum()
    }

    /// 失败轮询占全部轮询的比例
    pub fn drop_ratio(&self) -> f64 {
        let rows = self.total_rows();
        if rows == 0 {
            return 0.0;
        }
        let successes: usize = self.files.iter().map(|f| f.successes).sum();
        (rows - successes) as f64 / rows as f64
    }

    /// 重复帧占成功轮询的比例
    pub fn duplicate_ratio(&self) -> f64 {
        let successes: usize = self.files.iter().map(|f| f.successes).sum();
        if successes == 0 {
            return 0.0;
        }
        let duplicates: usize = self.files.iter().map(|f| f.duplicates).sum();
        duplicates as f64 / successes as f64
    }
}

/// 查找目录下的CSV日志文件（按文件名排序）
pub fn find_log_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("csv"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    debug!("Found {} log file(s) in {:?}", files.len(), dir);
    files
}

/// 读取单个日志文件，跳过注释行与表头行
pub fn read_log_file(path: &Path) -> Result<Vec<SampleRecord>> {
    let content = std::fs::read_to_string(path)?;
    parse_log(&content)
}

/// 解析日志内容
pub fn parse_log(content: &str) -> Result<Vec<SampleRecord>> {
    let header = SampleRecord::csv_header();
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#') && line != header
        })
        .map(|(i, line)| SampleRecord::from_csv_row(line, i + 1))
        .collect()
}

/// 由采样间隔计算帧率统计，零间隔被忽略
pub fn fps_statistics(periods: &[Duration]) -> Option<FpsStatistics> {
    let mut fps: Vec<f64> = periods
        .iter()
        .filter(|p| !p.is_zero())
        .map(|p| 1.0 / p.as_secs_f64())
        .collect();

    if fps.is_empty() {
        return None;
    }

    fps.sort_by(|a, b| a.total_cmp(b));
    let count = fps.len();
    let mean = fps.iter().sum::<f64>() / count as f64;
    let median = if count % 2 == 0 {
        (fps[count / 2 - 1] + fps[count / 2]) / 2.0
    } else {
        fps[count / 2]
    };
    let std_dev = if count > 1 {
        let variance = fps.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        variance.sqrt()
    } else {
        0.0
    };

    Some(FpsStatistics {
        count,
        mean,
        median,
        std_dev,
        min: fps[0],
        max: fps[count - 1],
    })
}

/// 成功读帧但唯一帧计数未增加，即重复帧
fn is_duplicate(previous: &SampleRecord, current: &SampleRecord) -> bool {
    current.success
        && current.frames > previous.frames
        && current.unique_frames == previous.unique_frames
}

/// 汇总单个文件
///
/// 计数器跨小时累计，`previous` 为上一个文件的最后一条记录，
/// 用于判定本文件首行是否为重复帧。
fn summarize(
    path: PathBuf,
    records: &[SampleRecord],
    previous: Option<&SampleRecord>,
) -> LogFileSummary {
    let successes = records.iter().filter(|r| r.success).count();
    let sequence: Vec<&SampleRecord> = previous.into_iter().chain(records).collect();
    let duplicates = sequence
        .windows(2)
        .filter(|pair| is_duplicate(pair[0], pair[1]))
        .count();

    LogFileSummary {
        path,
        rows: records.len(),
        successes,
        duplicates,
        last: records.last().cloned(),
    }
}

/// 分析目录下的全部日志
///
/// 无法解析的文件记录警告后跳过；目录不存在时返回错误。
pub fn analyze_dir(dir: &Path) -> Result<AnalysisReport> {
    if !dir.is_dir() {
        return Err(MonitorError::Config(format!(
            "log directory {:?} does not exist",
            dir
        )));
    }

    let mut files = Vec::new();
    let mut periods = Vec::new();
    let mut previous: Option<SampleRecord> = None;
    for path in find_log_files(dir) {
        match read_log_file(&path) {
            Ok(records) => {
                periods.extend(records.iter().filter_map(|r| r.period));
                files.push(summarize(path, &records, previous.as_ref()));
                if let Some(last) = records.last() {
                    previous = Some(last.clone());
                }
            }
            Err(e) => warn!("Skipping unreadable log file {:?}: {}", path, e),
        }
    }

    Ok(AnalysisReport {
        fps: fps_statistics(&periods),
        files,
    })
}
