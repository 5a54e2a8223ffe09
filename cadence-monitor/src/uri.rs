//! 流地址构造
//!
//! 将可选的用户名/密码合并进流URL，并去除URL中已有的凭据。

use common::{MonitorError, Result};
use tracing::debug;
use url::Url;

/// 构造带认证信息的流地址
///
/// - 已嵌入的 `user[:pass]@` 前缀总是被去除
/// - 提供用户名时写入 `username[:password]@`，密码为空则省略
pub fn build_stream_uri(url: &str, username: Option<&str>, password: Option<&str>) -> Result<String> {
    let invalid = |reason: String| MonitorError::InvalidUrl {
        url: redact_str(url),
        reason,
    };

    let mut parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;

    parsed
        .set_username("")
        .map_err(|_| invalid("URL cannot carry credentials".to_string()))?;
    parsed
        .set_password(None)
        .map_err(|_| invalid("URL cannot carry credentials".to_string()))?;

    if let Some(username) = username {
        parsed
            .set_username(username)
            .map_err(|_| invalid("failed to set username".to_string()))?;

        let password = password.filter(|p| !p.is_empty());
        parsed
            .set_password(password)
            .map_err(|_| invalid("failed to set password".to_string()))?;
    }

    debug!("Built stream uri: {}", redact(&parsed));
    Ok(parsed.to_string())
}

/// 隐藏URL中的密码，用于日志与文件头
pub fn redact(url: &Url) -> String {
    let mut url = url.clone();
    if url.password().is_some() {
        // 已有密码的URL必然可以设置密码
        let _ = url.set_password(Some("***"));
    }
    url.to_string()
}

/// 字符串形式的 [`redact`]，无法解析时原样返回
pub fn redact_str(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => redact(&parsed),
        Err(_) => url.to_string(),
    }
}
