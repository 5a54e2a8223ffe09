// 日志文件存储抽象
//
// 把"目录是否存在 / 文件是否由本次打开创建"做成显式操作，
// 便于在不接触真实文件系统的情况下测试表头写入逻辑。

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// 以追加模式打开的日志文件
pub struct OpenedLog<W> {
    pub writer: W,
    /// 文件是否由本次打开新建
    pub created: bool,
}

/// 日志存储接口
pub trait LogStore: Send {
    type Writer: Write + Send;

    /// 确保日志目录存在
    fn ensure_dir(&self, dir: &Path) -> io::Result<()>;

    /// 以追加模式打开文件，不存在时新建
    ///
    /// `created` 只在文件于本次调用之前不存在时为true。
    fn open_append(&self, path: &Path) -> io::Result<OpenedLog<Self::Writer>>;
}

/// 本地文件系统存储
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalLogStore;

impl LogStore for LocalLogStore {
    type Writer = BufWriter<File>;

    fn ensure_dir(&self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir)
    }

    fn open_append(&self, path: &Path) -> io::Result<OpenedLog<Self::Writer>> {
        // create_new 保证"是否新建"的判断与创建是同一个原子操作
        match OpenOptions::new().append(true).create_new(true).open(path) {
            Ok(file) => Ok(OpenedLog {
                writer: BufWriter::new(file),
                created: true,
            }),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let file = OpenOptions::new().append(true).open(path)?;
                Ok(OpenedLog {
                    writer: BufWriter::new(file),
                    created: false,
                })
            }
            Err(e) => Err(e),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_local_store_reports_creation_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalLogStore;
        let path = dir.path().join("log_20240501_12.csv");

        let mut first = store.open_append(&path).unwrap();
        assert!(first.created);
        first.writer.write_all(b"first\n").unwrap();
        first.writer.flush().unwrap();
        drop(first);

        let mut second = store.open_append(&path).unwrap();
        assert!(!second.created);
        second.writer.write_all(b"second\n").unwrap();
        second.writer.flush().unwrap();
        drop(second);

        let mut content = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn test_local_store_creates_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        LocalLogStore.ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
