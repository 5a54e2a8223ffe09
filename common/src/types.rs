use chrono::{DateTime, DurationRound, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{MonitorError, Result};
use crate::utils::{format_period, parse_period};

/// 日志文件的列名（顺序即写入顺序）
pub const CSV_COLUMNS: [&str; 6] = [
    "timestamp",
    "frames",
    "unique_frames",
    "dropped",
    "success",
    "period",
];

/// 采样记录
///
/// 每次未被节流的轮询产生一条记录，计数器均为自流启动以来的累计值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    /// 本次轮询时间（UTC）
    pub timestamp: DateTime<Utc>,
    /// 成功轮询累计次数
    pub frames: u64,
    /// 与上一帧内容不同的成功轮询累计次数
    pub unique_frames: u64,
    /// 失败轮询累计次数
    pub dropped: u64,
    /// 本次轮询是否拿到帧
    pub success: bool,
    /// 距上一次成功轮询的时长（首次成功时为空）
    pub period: Option<Duration>,
}

impl SampleRecord {
    /// CSV表头行
    pub fn csv_header() -> String {
        CSV_COLUMNS.join(",")
    }

    /// 编码为一行CSV（不含换行符）
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.frames,
            self.unique_frames,
            self.dropped,
            self.success,
            self.period.map(format_period).unwrap_or_default()
        )
    }

    /// 从一行CSV解析记录
    ///
    /// `line_no` 仅用于错误信息。
    pub fn from_csv_row(line: &str, line_no: usize) -> Result<Self> {
        let parse_err = |reason: String| MonitorError::Parse {
            line: line_no,
            reason,
        };

        let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(',').collect();
        if fields.len() != CSV_COLUMNS.len() {
            return Err(parse_err(format!(
                "expected {} fields, got {}",
                CSV_COLUMNS.len(),
                fields.len()
            )));
        }

        let timestamp = DateTime::parse_from_rfc3339(fields[0].trim())
            .map_err(|e| parse_err(format!("invalid timestamp '{}': {}", fields[0], e)))?
            .with_timezone(&Utc);

        let counter = |idx: usize| -> Result<u64> {
            fields[idx].trim().parse::<u64>().map_err(|e| {
                parse_err(format!("invalid {} '{}': {}", CSV_COLUMNS[idx], fields[idx], e))
            })
        };

        let success = match fields[4].trim() {
            "true" | "True" => true,
            "false" | "False" => false,
            other => return Err(parse_err(format!("invalid success '{}'", other))),
        };

        let period = match fields[5].trim() {
            "" => None,
            text => Some(
                parse_period(text).ok_or_else(|| parse_err(format!("invalid period '{}'", text)))?,
            ),
        };

        Ok(Self {
            timestamp,
            frames: counter(1)?,
            unique_frames: counter(2)?,
            dropped: counter(3)?,
            success,
            period,
        })
    }
}

/// 小时桶：按UTC自然小时划分日志文件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HourBucket {
    start: DateTime<Utc>,
}

impl HourBucket {
    /// 计算时间戳所在的小时桶
    pub fn of(ts: DateTime<Utc>) -> Self {
        let start = ts
            .duration_trunc(TimeDelta::hours(1))
            .unwrap_or(ts);
        Self { start }
    }

    /// 小时桶起始时间
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// 时间戳是否落在本小时桶内
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        Self::of(ts) == *self
    }

    /// 日志文件名：`log_<YYYYMMDD>_<HH>.csv`
    pub fn file_name(&self) -> String {
        format!("log_{}.csv", self.start.format("%Y%m%d_%H"))
    }
}

impl std::fmt::Display for HourBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.start.format("%Y-%m-%d %H:00 UTC"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32, m: u32, s: u32, micros: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
            + TimeDelta::microseconds(micros as i64)
    }

    #[test]
    fn test_csv_header() {
        assert_eq!(
            SampleRecord::csv_header(),
            "timestamp,frames,unique_frames,dropped,success,period"
        );
    }

    #[test]
    fn test_to_csv_row_with_period() {
        let record = SampleRecord {
            timestamp: ts(12, 0, 0, 110_000),
            frames: 2,
            unique_frames: 2,
            dropped: 0,
            success: true,
            period: Some(Duration::from_millis(110)),
        };
        assert_eq!(
            record.to_csv_row(),
            "2024-05-01T12:00:00.110000Z,2,2,0,true,0:00:00.110000"
        );
    }

    #[test]
    fn test_to_csv_row_failed_poll_has_empty_period() {
        let record = SampleRecord {
            timestamp: ts(12, 0, 1, 0),
            frames: 2,
            unique_frames: 1,
            dropped: 3,
            success: false,
            period: None,
        };
        assert_eq!(record.to_csv_row(), "2024-05-01T12:00:01.000000Z,2,1,3,false,");
    }

    #[test]
    fn test_from_csv_row() {
        let record =
            SampleRecord::from_csv_row("2024-05-01T12:00:00.110000Z,2,1,0,true,0:00:00.110000", 3)
                .unwrap();
        assert_eq!(record.timestamp, ts(12, 0, 0, 110_000));
        assert_eq!(record.frames, 2);
        assert_eq!(record.unique_frames, 1);
        assert_eq!(record.dropped, 0);
        assert!(record.success);
        assert_eq!(record.period, Some(Duration::from_millis(110)));
    }

    #[test]
    fn test_from_csv_row_rejects_bad_input() {
        let err = SampleRecord::from_csv_row("2024-05-01T12:00:00Z,1,1,0,true", 7).unwrap_err();
        assert!(matches!(err, MonitorError::Parse { line: 7, .. }));

        assert!(SampleRecord::from_csv_row("not-a-time,1,1,0,true,", 1).is_err());
        assert!(SampleRecord::from_csv_row("2024-05-01T12:00:00Z,x,1,0,true,", 1).is_err());
        assert!(SampleRecord::from_csv_row("2024-05-01T12:00:00Z,1,1,0,maybe,", 1).is_err());
        assert!(SampleRecord::from_csv_row("2024-05-01T12:00:00Z,1,1,0,true,soon", 1).is_err());
    }

    #[test]
    fn test_hour_bucket_file_name() {
        let bucket = HourBucket::of(ts(9, 59, 59, 999_999));
        assert_eq!(bucket.file_name(), "log_20240501_09.csv");
        assert_eq!(bucket.start(), ts(9, 0, 0, 0));
    }

    #[test]
    fn test_hour_bucket_boundary() {
        let bucket = HourBucket::of(ts(9, 30, 0, 0));
        assert!(bucket.contains(ts(9, 0, 0, 0)));
        assert!(bucket.contains(ts(9, 59, 59, 999_999)));
        assert!(!bucket.contains(ts(10, 0, 0, 0)));
        assert_ne!(bucket, HourBucket::of(ts(10, 0, 0, 0)));
    }
}
