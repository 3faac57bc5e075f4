//! 接收核心共享类型

use serde::Serialize;
use std::net::SocketAddr;

/// 分帧后进入解析队列的一行数据
#[derive(Debug, Clone)]
pub struct QueuedLine {
    /// 来源地址
    pub source: SocketAddr,
    /// 不含终止符的文本行
    pub line: String,
    /// 接收时间戳（毫秒）
    pub received_at_ms: i64,
}

/// 端口可用性探测结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindProbe {
    pub available: bool,
    pub message: String,
}

/// 获取当前时间戳（毫秒）
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
