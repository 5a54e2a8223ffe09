// 按小时轮换的日志写入器
//
// 每个UTC自然小时一个CSV文件。文件首次创建时写入描述性表头，
// 进程在同一小时内重启时以追加方式复用文件且不重复写表头。

use common::{HourBucket, MonitorError, Result, SampleRecord};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::store::{LocalLogStore, LogStore};

/// 当前打开的小时文件
struct OpenBucket<W> {
    bucket: HourBucket,
    path: PathBuf,
    writer: W,
}

/// 小时日志写入器
pub struct HourlyLogSink<S: LogStore = LocalLogStore> {
    store: S,
    log_dir: PathBuf,
    /// 写入文件头的流地址（已隐藏密码）
    source: String,
    target_fps: f64,
    current: Option<OpenBucket<S::Writer>>,
    rows_written: u64,
}

impl HourlyLogSink<LocalLogStore> {
    /// 使用本地文件系统创建写入器
    pub fn local(log_dir: impl Into<PathBuf>, source: impl Into<String>, target_fps: f64) -> Self {
        Self::new(LocalLogStore, log_dir, source, target_fps)
    }
}

impl<S: LogStore> HourlyLogSink<S> {
    pub fn new(
        store: S,
        log_dir: impl Into<PathBuf>,
        source: impl Into<String>,
        target_fps: f64,
    ) -> Self {
        Self {
            store,
            log_dir: log_dir.into(),
            source: source.into(),
            target_fps,
            current: None,
            rows_written: 0,
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// 当前打开的小时桶
    pub fn current_bucket(&self) -> Option<HourBucket> {
        self.current.as_ref().map(|open| open.bucket)
    }

    /// 当前文件路径
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|open| open.path.as_path())
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// 打开（必要时创建）小时桶对应的日志文件
    ///
    /// 仅当文件由本次打开新建时写入表头。任何IO错误都是致命的。
    pub fn open_bucket(&mut self, bucket: HourBucket) -> Result<PathBuf> {
        self.flush()?;
        self.current = None;

        let open = self.open_file(bucket)?;
        let path = open.path.clone();
        self.current = Some(open);
        Ok(path)
    }

    /// 追加一条采样记录
    ///
    /// 尚未打开文件时按记录时间戳打开对应的小时桶。
    pub fn append(&mut self, record: &SampleRecord) -> Result<()> {
        let open = match self.current.take() {
            Some(open) => open,
            None => self.open_file(HourBucket::of(record.timestamp))?,
        };
        let open = self.current.insert(open);

        writeln!(open.writer, "{}", record.to_csv_row())
            .and_then(|_| open.writer.flush())
            .map_err(|e| MonitorError::sink(&open.path, e))?;

        self.rows_written += 1;
        Ok(())
    }

    /// 刷新当前文件
    pub fn flush(&mut self) -> Result<()> {
        if let Some(open) = self.current.as_mut() {
            open.writer
                .flush()
                .map_err(|e| MonitorError::sink(&open.path, e))?;
            debug!("Flushed {}", open.path.display());
        }
        Ok(())
    }

    fn open_file(&self, bucket: HourBucket) -> Result<OpenBucket<S::Writer>> {
        self.store
            .ensure_dir(&self.log_dir)
            .map_err(|e| MonitorError::sink(&self.log_dir, e))?;

        let path = self.log_dir.join(bucket.file_name());
        let opened = self
            .store
            .open_append(&path)
            .map_err(|e| MonitorError::sink(&path, e))?;

        let mut writer = opened.writer;
        if opened.created {
            info!("Creating a new csv log file: {}", path.display());
            write_header(&mut writer, &self.source, self.target_fps)
                .map_err(|e| MonitorError::sink(&path, e))?;
        } else {
            info!("Appending to existing csv log file: {}", path.display());
        }

        Ok(OpenBucket {
            bucket,
            path,
            writer,
        })
    }
}

fn write_header<W: Write>(writer: &mut W, source: &str, target_fps: f64) -> std::io::Result<()> {
    writeln!(writer, "# source: {}", source)?;
    writeln!(writer, "# target-fps: {}", target_fps)?;
    writeln!(writer, "{}", SampleRecord::csv_header())?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logsink::store::memory::MemoryLogStore;
    use chrono::{DateTime, TimeZone, Utc};
    use std::time::Duration;

    fn ts(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 0).unwrap()
    }

    fn record(timestamp: DateTime<Utc>, frames: u64) -> SampleRecord {
        SampleRecord {
            timestamp,
            frames,
            unique_frames: frames,
            dropped: 0,
            success: true,
            period: (frames > 1).then(|| Duration::from_millis(100)),
        }
    }

    #[test]
    fn test_header_written_once_per_file() {
        let store = MemoryLogStore::default();
        let mut sink = HourlyLogSink::new(store.clone(), "/logs", "rtsp://cam/stream", 10.0);

        let path = sink.open_bucket(HourBucket::of(ts(12, 0))).unwrap();
        assert_eq!(path, PathBuf::from("/logs/log_20240501_12.csv"));
        assert!(store.has_dir(Path::new("/logs")));
        sink.append(&record(ts(12, 0), 1)).unwrap();

        // 同一小时内"重启"：新的写入器打开同一文件
        let mut restarted = HourlyLogSink::new(store.clone(), "/logs", "rtsp://cam/stream", 10.0);
        restarted.open_bucket(HourBucket::of(ts(12, 30))).unwrap();
        restarted.append(&record(ts(12, 30), 1)).unwrap();

        let content = store.contents(&path).unwrap();
        assert_eq!(content.matches("# source:").count(), 1);
        assert_eq!(content.matches("timestamp,frames").count(), 1);

        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "# source: rtsp://cam/stream");
        assert_eq!(lines[1], "# target-fps: 10");
        assert_eq!(lines[2], "timestamp,frames,unique_frames,dropped,success,period");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_append_opens_bucket_lazily() {
        let store = MemoryLogStore::default();
        let mut sink = HourlyLogSink::new(store.clone(), "/logs", "synthetic://", 30.0);

        assert!(sink.current_bucket().is_none());
        sink.append(&record(ts(8, 15), 1)).unwrap();
        assert_eq!(sink.current_bucket(), Some(HourBucket::of(ts(8, 0))));
        assert_eq!(sink.rows_written(), 1);
        assert_eq!(
            sink.current_path(),
            Some(Path::new("/logs/log_20240501_08.csv"))
        );
    }

    #[test]
    fn test_rotation_to_new_bucket() {
        let store = MemoryLogStore::default();
        let mut sink = HourlyLogSink::new(store.clone(), "/logs", "synthetic://", 30.0);

        sink.open_bucket(HourBucket::of(ts(12, 59))).unwrap();
        sink.append(&record(ts(12, 59), 1)).unwrap();
        sink.open_bucket(HourBucket::of(ts(13, 0))).unwrap();
        sink.append(&record(ts(13, 0), 2)).unwrap();

        assert_eq!(store.paths().len(), 2);
        let later = store
            .contents(Path::new("/logs/log_20240501_13.csv"))
            .unwrap();
        assert!(later.starts_with("# source: synthetic://"));
        assert!(later.ends_with(",2,2,0,true,0:00:00.100000\n"));
    }

    #[test]
    fn test_local_sink_restart_preserves_content() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("log");
        let bucket = HourBucket::of(ts(12, 0));

        let mut sink = HourlyLogSink::local(&log_dir, "rtsp://cam/stream", 10.0);
        let path = sink.open_bucket(bucket).unwrap();
        sink.append(&record(ts(12, 0), 1)).unwrap();
        drop(sink);

        let mut sink = HourlyLogSink::local(&log_dir, "rtsp://cam/stream", 10.0);
        sink.open_bucket(bucket).unwrap();
        sink.append(&record(ts(12, 1), 2)).unwrap();
        drop(sink);

        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 5);
        assert_eq!(content.matches("# target-fps").count(), 1);
    }

    #[test]
    fn test_unwritable_log_dir_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let mut sink = HourlyLogSink::local(&blocker, "rtsp://cam/stream", 10.0);
        let err = sink.open_bucket(HourBucket::of(ts(12, 0))).unwrap_err();
        assert!(matches!(err, MonitorError::SinkWriteError { .. }));
    }

    #[test]
    fn test_failed_lazy_open_leaves_no_file_open() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let mut sink = HourlyLogSink::local(&blocker, "rtsp://cam/stream", 10.0);
        let err = sink.append(&record(ts(12, 0), 1)).unwrap_err();
        assert!(matches!(err, MonitorError::SinkWriteError { .. }));
        assert!(sink.current_bucket().is_none());
        assert_eq!(sink.rows_written(), 0);
    }

    #[test]
    fn test_append_reuses_open_file() {
        let store = MemoryLogStore::default();
        let mut sink = HourlyLogSink::new(store.clone(), "/logs", "synthetic://", 30.0);

        sink.append(&record(ts(9, 0), 1)).unwrap();
        sink.append(&record(ts(9, 1), 2)).unwrap();
        sink.append(&record(ts(9, 2), 3)).unwrap();

        assert_eq!(sink.rows_written(), 3);
        let content = store
            .contents(Path::new("/logs/log_20240501_09.csv"))
            .unwrap();
        assert_eq!(content.matches("# source:").count(), 1);
        assert_eq!(content.lines().count(), 6);
    }
}
