//! 监听器事件分发
//!
//! 每个订阅者持有一个无界通道；事件按产生顺序投递给所有订阅者，
//! 接收端已关闭的订阅者在下一次发布时移除。

use crate::state::ConnectionState;
use async_trait::async_trait;
use domain::DecodedRecord;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

/// 监听器对外事件
#[derive(Debug, Clone)]
pub enum ListenerEvent {
    /// 解析得到的定位记录（所有记录都会发送）
    DataReceived(DecodedRecord),
    /// 事件标记
    EventMarker(DecodedRecord),
    /// 记录开始/停止
    LoggingStatusChanged { active: bool, record: DecodedRecord },
    /// 连接状态变化
    ConnectionStatusChanged {
        state: ConnectionState,
        description: String,
    },
    /// 错误通知
    ErrorOccurred { message: String },
    /// 解析前的原始行
    RawDataReceived { source: SocketAddr, line: String },
    /// 限流拒绝
    RateLimitViolation { addr: IpAddr, reason: String },
    /// TLS 握手完成
    EncryptionEstablished {
        peer: SocketAddr,
        protocol_version: String,
        cipher_suite: String,
    },
}

/// 监听器事件处理器
#[async_trait]
pub trait ListenerEventHandler: Send + Sync {
    async fn handle(&self, event: ListenerEvent);
}

/// 事件总线
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ListenerEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新增订阅者
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ListenerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// 向所有订阅者发布事件
    pub fn publish(&self, event: ListenerEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub(crate) fn connection_status(&self, state: ConnectionState) {
        self.publish(ListenerEvent::ConnectionStatusChanged {
            state,
            description: state.description().to_string(),
        });
    }

    pub(crate) fn error(&self, message: impl Into<String>) {
        self.publish(ListenerEvent::ErrorOccurred {
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_every_subscriber_in_order() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.error("one");
        bus.connection_status(ConnectionState::Listening);

        for rx in [&mut first, &mut second] {
            assert!(matches!(
                rx.try_recv(),
                Ok(ListenerEvent::ErrorOccurred { message }) if message == "one"
            ));
            assert!(matches!(
                rx.try_recv(),
                Ok(ListenerEvent::ConnectionStatusChanged {
                    state: ConnectionState::Listening,
                    ..
                })
            ));
        }
    }

    #[test]
    fn test_closed_subscribers_are_dropped() {
        let bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        bus.error("ping");
        assert_eq!(bus.subscriber_count(), 1);
        drop(kept);
    }
}
