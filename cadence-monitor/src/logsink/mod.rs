// 采样日志写入
//
// - `store`: 文件系统抽象（本地实现 + 测试用内存实现）
// - `rotator`: 按UTC小时选择文件、一次性写表头、逐行追加记录

pub mod rotator;
pub mod store;

pub use rotator::HourlyLogSink;
pub use store::{LocalLogStore, LogStore, OpenedLog};
