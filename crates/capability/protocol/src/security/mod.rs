//! 安全网关
//!
//! 在数据进入分帧之前做准入判断：
//! - **限流**：TCP 连接尝试与 UDP 数据报按来源地址统一限流
//! - **白名单**（仅 UDP）：白名单外的数据报静默丢弃，单独计数
//! - **TLS**（仅 TCP）：每个被接受的连接单独握手，握手失败只影响该连接

pub mod rate_limit;
pub mod tls;

use crate::error::ProtocolError;
use crate::settings::{ConnectionSettings, TransportKind};
use std::collections::HashSet;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;
use tracing::warn;

pub use rate_limit::{RateLimitDenial, RateLimiter};

/// UDP 数据报准入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// 被限流拒绝
    Denied(RateLimitDenial),
    /// 不在白名单内
    Filtered,
}

/// TLS 握手完成后的会话信息
#[derive(Debug, Clone)]
pub struct TlsSessionInfo {
    pub protocol_version: String,
    pub cipher_suite: String,
}

/// 安全网关
pub struct SecurityGateway {
    rate_limiter: Option<RateLimiter>,
    allow_list: Option<HashSet<IpAddr>>,
    tls: Option<TlsAcceptor>,
    handshake_timeout: Duration,
}

impl SecurityGateway {
    /// 按连接配置构造；TLS 证书无法加载时返回错误（启动失败）。
    pub fn from_settings(settings: &ConnectionSettings) -> Result<Self, ProtocolError> {
        let rate_limiter = settings
            .rate_limit
            .enabled
            .then(|| RateLimiter::new(settings.rate_limit.clone()));

        let allow_list = (settings.allow_list.enabled && settings.transport == TransportKind::Udp)
            .then(|| settings.allow_list.addresses.clone());

        let tls = match (settings.tls.enabled, settings.transport) {
            (true, TransportKind::Tcp) => Some(tls::load_acceptor(&settings.tls)?),
            (true, TransportKind::Udp) => {
                warn!("tls_ignored_for_udp_transport");
                None
            }
            (false, _) => None,
        };

        Ok(Self {
            rate_limiter,
            allow_list,
            tls,
            handshake_timeout: Duration::from_millis(settings.tls.handshake_timeout_ms),
        })
    }

    pub fn tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// TCP 连接准入（读取任何字节之前调用）。
    pub fn admit_connection(&self, ip: IpAddr) -> Result<(), RateLimitDenial> {
        match &self.rate_limiter {
            Some(limiter) => limiter.check(ip),
            None => Ok(()),
        }
    }

    /// UDP 数据报准入：先限流，再检查白名单。
    pub fn admit_datagram(&self, ip: IpAddr) -> Admission {
        if let Err(denial) = self.admit_connection(ip) {
            return Admission::Denied(denial);
        }
        match &self.allow_list {
            Some(allowed) if !allowed.contains(&ip) => Admission::Filtered,
            _ => Admission::Admitted,
        }
    }

    /// 顺带清理限流状态；执行了清理返回 `true`。
    pub fn maybe_prune(&self) -> bool {
        match &self.rate_limiter {
            Some(limiter) => limiter.maybe_prune(Instant::now()),
            None => false,
        }
    }

    /// 对已接受的连接执行 TLS 握手。
    pub async fn handshake(
        &self,
        stream: TcpStream,
    ) -> Result<(TlsStream<TcpStream>, TlsSessionInfo), ProtocolError> {
        let acceptor = self
            .tls
            .as_ref()
            .ok_or_else(|| ProtocolError::Tls("tls not enabled".to_string()))?;

        let stream = timeout(self.handshake_timeout, acceptor.accept(stream))
            .await
            .map_err(|_| ProtocolError::Timeout("tls handshake".to_string()))?
            .map_err(|e| ProtocolError::Tls(format!("handshake failed: {e}")))?;

        let (_, connection) = stream.get_ref();
        let info = TlsSessionInfo {
            protocol_version: connection
                .protocol_version()
                .map(|version| format!("{version:?}"))
                .unwrap_or_default(),
            cipher_suite: connection
                .negotiated_cipher_suite()
                .map(|suite| format!("{:?}", suite.suite()))
                .unwrap_or_default(),
        };
        Ok((stream, info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn test_default_settings_admit_everything() {
        let gateway = SecurityGateway::from_settings(&ConnectionSettings::udp(0)).unwrap();
        assert!(gateway.admit_connection(ip(1)).is_ok());
        assert_eq!(gateway.admit_datagram(ip(1)), Admission::Admitted);
        assert!(!gateway.tls_enabled());
        assert!(!gateway.maybe_prune());
    }

    #[test]
    fn test_allow_list_filters_udp_only() {
        let mut settings = ConnectionSettings::udp(0);
        settings.allow_list.enabled = true;
        settings.allow_list.addresses.insert(ip(1));
        let gateway = SecurityGateway::from_settings(&settings).unwrap();
        assert_eq!(gateway.admit_datagram(ip(1)), Admission::Admitted);
        assert_eq!(gateway.admit_datagram(ip(2)), Admission::Filtered);

        settings.transport = TransportKind::Tcp;
        let gateway = SecurityGateway::from_settings(&settings).unwrap();
        assert_eq!(gateway.admit_datagram(ip(2)), Admission::Admitted);
    }

    #[test]
    fn test_rate_limit_applies_to_datagrams() {
        let mut settings = ConnectionSettings::udp(0);
        settings.rate_limit.enabled = true;
        settings.rate_limit.max_per_window = 1;
        settings.rate_limit.window_ms = 60_000;
        let gateway = SecurityGateway::from_settings(&settings).unwrap();
        assert_eq!(gateway.admit_datagram(ip(3)), Admission::Admitted);
        assert_eq!(
            gateway.admit_datagram(ip(3)),
            Admission::Denied(RateLimitDenial::ConnectionRateExceeded)
        );
        assert_eq!(gateway.admit_datagram(ip(4)), Admission::Admitted);
    }

    #[test]
    fn test_tls_enabled_without_certificate_fails() {
        let mut settings = ConnectionSettings::tcp(0);
        settings.tls.enabled = true;
        assert!(matches!(
            SecurityGateway::from_settings(&settings),
            Err(ProtocolError::Tls(_))
        ));
    }
}
