//! 连接状态机
//!
//! ```text
//! Disconnected ─start─▶ Connecting ─bind─▶ Listening ─accept─▶ Connected
//!       ▲                    │ (UDP) ───────────────────────────▶ │
//!       │                                 Listening ◀─client lost─┘
//!       └──────────────── stop ─────────── (any) ──▶ Error（需显式重启）
//! ```
//!
//! 所有迁移都通过单个原子值上的 compare-and-swap 完成，
//! 避免 accept、接收与状态查询之间的竞争。

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Listening = 2,
    Connected = 3,
    Error = 4,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Listening,
            3 => Self::Connected,
            4 => Self::Error,
            _ => Self::Disconnected,
        }
    }

    /// 面向界面的状态描述。
    pub fn description(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "starting listener",
            Self::Listening => "waiting for navigation system",
            Self::Connected => "receiving data",
            Self::Error => "listener failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Listening => "Listening",
            Self::Connected => "Connected",
            Self::Error => "Error",
        };
        f.write_str(name)
    }
}

/// 原子状态机
#[derive(Debug)]
pub struct ConnectionStateMachine {
    state: AtomicU8,
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
        }
    }

    pub fn current(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// 仅当当前状态为 `from` 时迁移到 `to`；失败时返回实际状态。
    pub fn transition(
        &self,
        from: ConnectionState,
        to: ConnectionState,
    ) -> Result<(), ConnectionState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(ConnectionState::from_u8)
    }

    /// 无条件设置状态（停止时使用），返回之前的状态。
    pub fn force(&self, to: ConnectionState) -> ConnectionState {
        ConnectionState::from_u8(self.state.swap(to as u8, Ordering::AcqRel))
    }

    /// 传输层可用：Listening 或 Connected。
    pub fn is_transport_up(&self) -> bool {
        matches!(
            self.current(),
            ConnectionState::Listening | ConnectionState::Connected
        )
    }

    pub fn is_connected(&self) -> bool {
        self.current() == ConnectionState::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_tcp_lifecycle() {
        let machine = ConnectionStateMachine::new();
        assert_eq!(machine.current(), ConnectionState::Disconnected);
        assert!(!machine.is_transport_up());

        machine
            .transition(ConnectionState::Disconnected, ConnectionState::Connecting)
            .unwrap();
        machine
            .transition(ConnectionState::Connecting, ConnectionState::Listening)
            .unwrap();
        assert!(machine.is_transport_up());
        assert!(!machine.is_connected());

        machine
            .transition(ConnectionState::Listening, ConnectionState::Connected)
            .unwrap();
        assert!(machine.is_connected());

        machine
            .transition(ConnectionState::Connected, ConnectionState::Listening)
            .unwrap();
        assert_eq!(machine.force(ConnectionState::Disconnected), ConnectionState::Listening);
    }

    #[test]
    fn test_transition_rejects_wrong_source() {
        let machine = ConnectionStateMachine::new();
        assert_eq!(
            machine.transition(ConnectionState::Listening, ConnectionState::Connected),
            Err(ConnectionState::Disconnected)
        );
        assert_eq!(machine.current(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_only_one_racer_wins() {
        let machine = Arc::new(ConnectionStateMachine::new());
        machine.force(ConnectionState::Listening);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let machine = Arc::clone(&machine);
                std::thread::spawn(move || {
                    machine
                        .transition(ConnectionState::Listening, ConnectionState::Connected)
                        .is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
