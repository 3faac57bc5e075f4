//! # UDO 接收核心
//!
//! 导航系统以"用户自定义输出"（UDO）分隔文本持续推送定位/姿态数据，
//! 本模块作为监听端接收并解码：
//! - **TCP**：监听端口，同一时刻只保留一个活动客户端，客户端断开后被动等待重连
//! - **UDP**：绑定端口，可选广播、组播与来源白名单
//!
//! ## 数据流
//!
//! ```text
//! 字节流 / 数据报
//!       │
//!       ▼
//! SecurityGateway（限流、白名单、TLS）
//!       │
//!       ▼
//! FrameAssembler（CR / LF / CRLF 分行）
//!       │
//!       ▼  无界行队列
//! ProtocolParser（自动识别 / 显式映射 + 报文分类）
//!       │
//!       ▼
//! ListenerEvent → 订阅者
//! ```
//!
//! 状态由 [`ConnectionStateMachine`] 维护，计数由 [`StatisticsCollector`] 累加。
//!
//! ## 配置格式
//!
//! ```json
//! {
//!   "transport": "tcp",
//!   "port": 4001,
//!   "field_separator": ",",
//!   "auto_detect": false,
//!   "field_mapping": ["time", "easting", "northing", "heading"],
//!   "rate_limit": { "enabled": true, "max_per_window": 10, "window_ms": 1000 }
//! }
//! ```

mod error;
mod events;
mod frame;
mod listener;
pub mod parser;
pub mod security;
mod settings;
mod state;
mod stats;
mod tcp_server;
mod types;
mod udp_server;

pub use error::ProtocolError;
pub use events::{EventBus, ListenerEvent, ListenerEventHandler};
pub use frame::FrameAssembler;
pub use listener::TransportListener;
pub use parser::{ParseWarning, ParsedLine, ParserMode, ProtocolParser, classify, render_line};
pub use security::{Admission, RateLimitDenial, RateLimiter, SecurityGateway, TlsSessionInfo};
pub use settings::{
    AllowListSettings, AutoDetectThresholds, ConnectionSettings, RateLimitSettings, TlsSettings,
    TransportKind, UdpSettings,
};
pub use state::{ConnectionState, ConnectionStateMachine};
pub use stats::{StatisticsCollector, StatisticsSnapshot};
pub use types::{BindProbe, QueuedLine, now_epoch_ms};
