//! 协议错误类型定义

use std::net::SocketAddr;

/// 接收核心错误
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// 端口已被占用（启动期致命错误，不重试）
    #[error("address already in use: {0}")]
    AddressInUse(SocketAddr),

    /// 无权限绑定端口（启动期致命错误，不重试）
    #[error("permission denied binding {0}")]
    PermissionDenied(SocketAddr),

    /// 其他绑定错误
    #[error("bind {addr} failed: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// 监听器已在运行
    #[error("listener already running")]
    AlreadyRunning,

    /// TLS 配置或握手错误
    #[error("tls error: {0}")]
    Tls(String),

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 配置解析错误
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// 超时错误
    #[error("timeout: {0}")]
    Timeout(String),

    /// 通道关闭
    #[error("channel closed")]
    ChannelClosed,
}

impl ProtocolError {
    /// 将绑定阶段的 IO 错误分类为致命的占用/权限错误。
    pub fn from_bind(addr: SocketAddr, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::AddrInUse => Self::AddressInUse(addr),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(addr),
            _ => Self::Bind { addr, source: err },
        }
    }
}
