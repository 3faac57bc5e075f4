//! 连接配置
//!
//! 一个监听器实例在构造时接收 [`ConnectionSettings`]，此后只读；
//! 修改配置需要创建新的实例。
//!
//! ## 配置格式
//!
//! ```json
//! {
//!   "transport": "tcp",
//!   "port": 5602,
//!   "field_separator": ",",
//!   "field_mapping": ["event", "easting", "northing", "time"],
//!   "auto_detect": false,
//!   "tls": { "enabled": true, "certificate_path": "/etc/udo/server.pem" },
//!   "rate_limit": { "enabled": true, "max_per_window": 10, "window_ms": 1000 }
//! }
//! ```

use crate::error::ProtocolError;
use domain::FieldTag;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// 传输协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Tcp,
    Udp,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp => f.write_str("tcp"),
            Self::Udp => f.write_str("udp"),
        }
    }
}

/// 监听器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// 传输协议
    pub transport: TransportKind,
    /// 监听端口（0 表示由系统分配）
    pub port: u16,
    /// 绑定的本地网卡地址，缺省为 0.0.0.0
    #[serde(default)]
    pub bind_interface: Option<IpAddr>,
    /// 字段分隔符
    #[serde(default = "default_separator")]
    pub field_separator: char,
    /// 显式字段映射（按列顺序）
    #[serde(default)]
    pub field_mapping: Vec<FieldTag>,
    /// 自动识别字段
    #[serde(default = "default_auto_detect")]
    pub auto_detect: bool,
    /// 自动识别阈值
    #[serde(default)]
    pub thresholds: AutoDetectThresholds,
    /// TLS 配置（仅 TCP）
    #[serde(default)]
    pub tls: TlsSettings,
    /// 限流配置
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    /// UDP 组播/广播配置
    #[serde(default)]
    pub udp: UdpSettings,
    /// 来源地址白名单（仅 UDP）
    #[serde(default)]
    pub allow_list: AllowListSettings,
    /// 未结束行的最大缓冲长度（字节）
    #[serde(default = "default_max_line_len")]
    pub max_line_len: usize,
    /// 停止时等待后台任务退出的最长时间（毫秒）
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_ms: u64,
}

fn default_separator() -> char {
    ','
}

fn default_auto_detect() -> bool {
    true
}

fn default_max_line_len() -> usize {
    64 * 1024
}

fn default_stop_timeout() -> u64 {
    2000
}

impl ConnectionSettings {
    /// 使用默认值创建配置。
    pub fn new(transport: TransportKind, port: u16) -> Self {
        Self {
            transport,
            port,
            bind_interface: None,
            field_separator: default_separator(),
            field_mapping: Vec::new(),
            auto_detect: default_auto_detect(),
            thresholds: AutoDetectThresholds::default(),
            tls: TlsSettings::default(),
            rate_limit: RateLimitSettings::default(),
            udp: UdpSettings::default(),
            allow_list: AllowListSettings::default(),
            max_line_len: default_max_line_len(),
            stop_timeout_ms: default_stop_timeout(),
        }
    }

    pub fn tcp(port: u16) -> Self {
        Self::new(TransportKind::Tcp, port)
    }

    pub fn udp(port: u16) -> Self {
        Self::new(TransportKind::Udp, port)
    }

    /// 从 JSON 配置字符串解析
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(json).map_err(|e| ProtocolError::ConfigParse(e.to_string()))
    }

    /// 切换为显式字段映射模式。
    pub fn with_mapping(mut self, mapping: Vec<FieldTag>) -> Self {
        self.field_mapping = mapping;
        self.auto_detect = false;
        self
    }

    /// 监听地址。
    pub fn bind_addr(&self) -> SocketAddr {
        let ip = self
            .bind_interface
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        SocketAddr::new(ip, self.port)
    }

    /// 是否使用自动识别模式（显式开启或映射为空）。
    pub fn uses_auto_detect(&self) -> bool {
        self.auto_detect || self.field_mapping.is_empty()
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// 自动识别阈值。
///
/// 这些阈值来自现场经验，接近边界的合法值可能被误判，
/// 因此作为可配置常量而非协议规则。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoDetectThresholds {
    /// 事件号上界（不含）
    pub event_max: i64,
    /// 平面坐标绝对值下界（不含）
    pub planar_min: f64,
    /// 地理坐标绝对值上界
    pub geographic_max: f64,
    /// 地理坐标最少小数位数
    pub geographic_min_decimals: usize,
    /// 航向上界
    pub heading_max: f64,
    /// 姿态绝对值上界
    pub attitude_max: f64,
    /// 里程绝对值上界
    pub chainage_max: f64,
}

impl Default for AutoDetectThresholds {
    fn default() -> Self {
        Self {
            event_max: 100_000,
            planar_min: 100_000.0,
            geographic_max: 180.0,
            geographic_min_decimals: 6,
            heading_max: 360.0,
            attitude_max: 90.0,
            chainage_max: 1000.0,
        }
    }
}

/// TLS 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsSettings {
    pub enabled: bool,
    /// 服务端证书链（PEM）
    pub certificate_path: Option<PathBuf>,
    /// 私钥（PEM），缺省时从证书文件中读取
    pub private_key_path: Option<PathBuf>,
    /// 握手超时（毫秒）
    pub handshake_timeout_ms: u64,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            certificate_path: None,
            private_key_path: None,
            handshake_timeout_ms: 5000,
        }
    }
}

/// 限流配置（按来源地址的令牌桶）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub enabled: bool,
    /// 每个窗口内允许的最大准入次数
    pub max_per_window: u32,
    /// 窗口长度（毫秒）
    pub window_ms: u64,
    /// 令牌桶容量（突发上限）
    pub burst_capacity: u32,
    /// 每秒补充的令牌数
    pub refill_per_sec: f64,
    /// 空闲条目保留时间（毫秒），超过后被清理
    pub idle_retention_ms: u64,
    /// 两次清理之间的最短间隔（毫秒）
    pub cleanup_interval_ms: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_per_window: 100,
            window_ms: 1000,
            burst_capacity: 200,
            refill_per_sec: 100.0,
            idle_retention_ms: 60_000,
            cleanup_interval_ms: 30_000,
        }
    }
}

/// UDP 组播/广播配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpSettings {
    /// 接收广播
    pub broadcast: bool,
    /// 加入的组播组
    pub multicast_group: Option<Ipv4Addr>,
    /// 组播 TTL
    pub multicast_ttl: u32,
    /// 单个数据报的最大长度
    pub max_datagram_len: usize,
    /// 来源空闲超过该时间（毫秒）后丢弃其分帧缓冲
    pub source_idle_ms: u64,
}

impl Default for UdpSettings {
    fn default() -> Self {
        Self {
            broadcast: false,
            multicast_group: None,
            multicast_ttl: 1,
            max_datagram_len: 65_507,
            source_idle_ms: 60_000,
        }
    }
}

/// 来源地址白名单
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AllowListSettings {
    pub enabled: bool,
    pub addresses: HashSet<IpAddr>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "transport": "tcp",
            "port": 5602,
            "field_mapping": ["event", "easting", "northing", "time"],
            "auto_detect": false,
            "rate_limit": { "enabled": true, "max_per_window": 3 }
        }"#;
        let settings = ConnectionSettings::from_json(json).unwrap();
        assert_eq!(settings.transport, TransportKind::Tcp);
        assert_eq!(settings.port, 5602);
        assert_eq!(settings.field_separator, ',');
        assert_eq!(settings.field_mapping.len(), 4);
        assert!(!settings.uses_auto_detect());
        assert!(settings.rate_limit.enabled);
        assert_eq!(settings.rate_limit.max_per_window, 3);
        assert_eq!(settings.rate_limit.window_ms, 1000);
        assert!(!settings.tls.enabled);
        assert_eq!(settings.thresholds, AutoDetectThresholds::default());
    }

    #[test]
    fn test_empty_mapping_falls_back_to_auto_detect() {
        let mut settings = ConnectionSettings::udp(0);
        settings.auto_detect = false;
        assert!(settings.uses_auto_detect());
        let settings = settings.with_mapping(vec![FieldTag::Heading]);
        assert!(!settings.uses_auto_detect());
    }

    #[test]
    fn test_bind_addr_defaults_to_unspecified() {
        let settings = ConnectionSettings::tcp(9000);
        assert_eq!(settings.bind_addr().to_string(), "0.0.0.0:9000");
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            ConnectionSettings::from_json(r#"{"port": 1}"#),
            Err(ProtocolError::ConfigParse(_))
        ));
    }
}
