//! 时长格式化工具
//!
//! 日志中的 `period` 列使用 `H:MM:SS.ffffff` 格式，
//! 与常见离线分析工具的 timedelta 解析兼容。

use std::time::Duration;

/// 将时长格式化为 `H:MM:SS.ffffff`
pub fn format_period(period: Duration) -> String {
    let total_secs = period.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!(
        "{}:{:02}:{:02}.{:06}",
        hours,
        minutes,
        seconds,
        period.subsec_micros()
    )
}

/// 解析 `H:MM:SS[.ffffff]` 格式的时长
///
/// 小数部分不足6位时按微秒右补零。
pub fn parse_period(text: &str) -> Option<Duration> {
    let mut parts = text.trim().split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds_part = parts.next()?;
    if parts.next().is_some() || minutes >= 60 {
        return None;
    }

    let (whole, fraction) = match seconds_part.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (seconds_part, ""),
    };
    let seconds: u64 = whole.parse().ok()?;
    if seconds >= 60 || fraction.len() > 9 || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let nanos = if fraction.is_empty() {
        0
    } else {
        let padded = format!("{:0<9}", fraction);
        padded.parse::<u32>().ok()?
    };

    Some(Duration::new(hours * 3600 + minutes * 60 + seconds, nanos))
}
