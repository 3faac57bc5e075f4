//! 传输监听器
//!
//! 组合安全网关、分帧、解析、状态机与统计，对外提供启动、停止与状态查询。
//!
//! 每次运行包含两个 tokio 任务，共享同一个停止信号：
//! 1. 接收循环（TCP 接受循环或 UDP 接收循环），独占套接字
//! 2. 解析任务，消费无界行队列并分发事件
//!
//! `stop()` 发出信号后在限定时间内等待任务退出，超时则强制终止；
//! 任务被释放时其持有的套接字随之关闭。

use crate::error::ProtocolError;
use crate::events::{EventBus, ListenerEvent, ListenerEventHandler};
use crate::parser::ProtocolParser;
use crate::security::SecurityGateway;
use crate::settings::{ConnectionSettings, TransportKind};
use crate::state::{ConnectionState, ConnectionStateMachine};
use crate::stats::{StatisticsCollector, StatisticsSnapshot};
use crate::types::{BindProbe, QueuedLine};
use crate::{tcp_server, udp_server};
use domain::{DecodedRecord, MessageKind};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, warn};

/// 接收任务共享的运行上下文
pub(crate) struct Shared {
    pub(crate) settings: ConnectionSettings,
    pub(crate) gateway: SecurityGateway,
    pub(crate) stats: Arc<StatisticsCollector>,
    pub(crate) events: Arc<EventBus>,
    state: Arc<ConnectionStateMachine>,
    active_peer: Arc<Mutex<Option<SocketAddr>>>,
}

impl Shared {
    pub(crate) fn set_active_peer(&self, peer: Option<SocketAddr>) {
        *self
            .active_peer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = peer;
    }

    /// 状态迁移成功时发布状态变化事件。
    pub(crate) fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        match self.state.transition(from, to) {
            Ok(()) => {
                debug!(from = %from, to = %to, "connection_state_changed");
                self.events.connection_status(to);
                true
            }
            Err(actual) => {
                debug!(from = %from, to = %to, actual = %actual, "connection_state_transition_skipped");
                false
            }
        }
    }

    /// 不可恢复的运行期错误：进入 Error，需要显式重启。
    pub(crate) fn fail(&self, message: String) {
        self.state.force(ConnectionState::Error);
        self.set_active_peer(None);
        self.events.connection_status(ConnectionState::Error);
        self.events.error(message);
    }

    /// 顺带清理限流状态，并记录清理时间。
    pub(crate) fn prune_rate_limits(&self) {
        if self.gateway.maybe_prune() {
            self.stats.record_cleanup();
        }
    }
}

/// 一次运行的句柄
struct Running {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

/// UDO 数据监听器
pub struct TransportListener {
    settings: ConnectionSettings,
    state: Arc<ConnectionStateMachine>,
    stats: Arc<StatisticsCollector>,
    events: Arc<EventBus>,
    active_peer: Arc<Mutex<Option<SocketAddr>>>,
    running: tokio::sync::Mutex<Option<Running>>,
}

impl TransportListener {
    /// 创建空闲的监听器（Disconnected）。
    pub fn new(settings: ConnectionSettings) -> Self {
        Self {
            settings,
            state: Arc::new(ConnectionStateMachine::new()),
            stats: Arc::new(StatisticsCollector::new()),
            events: Arc::new(EventBus::new()),
            active_peer: Arc::new(Mutex::new(None)),
            running: tokio::sync::Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// 绑定配置的传输并启动接收任务，返回实际绑定的本地地址。
    ///
    /// 任何启动失败都会让状态回到 Disconnected 并发布错误事件，不会自动重试。
    pub async fn start(&self) -> Result<SocketAddr, ProtocolError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(ProtocolError::AlreadyRunning);
        }
        if self
            .state
            .transition(ConnectionState::Disconnected, ConnectionState::Connecting)
            .is_err()
        {
            return Err(ProtocolError::AlreadyRunning);
        }
        self.events.connection_status(ConnectionState::Connecting);

        match self.launch().await {
            Ok(launched) => {
                info!(
                    transport = %self.settings.transport,
                    local_addr = %launched.local_addr,
                    tls = self.settings.tls.enabled,
                    auto_detect = self.settings.uses_auto_detect(),
                    "listener_started"
                );
                let local_addr = launched.local_addr;
                *running = Some(launched);
                Ok(local_addr)
            }
            Err(e) => {
                error!(transport = %self.settings.transport, port = self.settings.port, error = %e, "listener_start_failed");
                self.state.force(ConnectionState::Disconnected);
                self.events.connection_status(ConnectionState::Disconnected);
                self.events.error(e.to_string());
                Err(e)
            }
        }
    }

    async fn launch(&self) -> Result<Running, ProtocolError> {
        let gateway = SecurityGateway::from_settings(&self.settings)?;
        let shared = Arc::new(Shared {
            settings: self.settings.clone(),
            gateway,
            stats: Arc::clone(&self.stats),
            events: Arc::clone(&self.events),
            state: Arc::clone(&self.state),
            active_peer: Arc::clone(&self.active_peer),
        });

        let (shutdown, shutdown_rx) = watch::channel(false);
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let parser = ProtocolParser::from_settings(&self.settings);

        let (local_addr, receiver) = match self.settings.transport {
            TransportKind::Tcp => {
                let listener = tcp_server::bind(self.settings.bind_addr()).await?;
                let local_addr = listener.local_addr()?;
                shared.transition(ConnectionState::Connecting, ConnectionState::Listening);
                let task = tokio::spawn(tcp_server::run(
                    listener,
                    Arc::clone(&shared),
                    line_tx,
                    shutdown_rx,
                ));
                (local_addr, task)
            }
            TransportKind::Udp => {
                let socket = udp_server::bind(&self.settings)?;
                let local_addr = socket.local_addr()?;
                shared.transition(ConnectionState::Connecting, ConnectionState::Connected);
                let task = tokio::spawn(udp_server::run(
                    socket,
                    Arc::clone(&shared),
                    line_tx,
                    shutdown_rx,
                ));
                (local_addr, task)
            }
        };

        let drain = tokio::spawn(drain_lines(
            line_rx,
            parser,
            Arc::clone(&self.stats),
            Arc::clone(&self.events),
        ));

        Ok(Running {
            local_addr,
            shutdown,
            tasks: vec![receiver, drain],
        })
    }

    /// 停止监听并释放所有套接字。未启动时调用不做任何事。
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        let _ = running.shutdown.send(true);

        let deadline = Instant::now() + self.settings.stop_timeout();
        for mut task in running.tasks {
            if timeout_at(deadline, &mut task).await.is_err() {
                warn!(local_addr = %running.local_addr, "listener_task_abort_after_timeout");
                task.abort();
                let _ = task.await;
            }
        }

        *self
            .active_peer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        let previous = self.state.force(ConnectionState::Disconnected);
        if previous != ConnectionState::Disconnected {
            self.events.connection_status(ConnectionState::Disconnected);
        }
        info!(local_addr = %running.local_addr, "listener_stopped");
    }

    /// 绑定后立即释放，探测端口是否可用。
    pub async fn test_bind(settings: &ConnectionSettings) -> BindProbe {
        let result = match settings.transport {
            TransportKind::Tcp => tcp_server::bind(settings.bind_addr())
                .await
                .and_then(|listener| Ok(listener.local_addr()?)),
            TransportKind::Udp => {
                udp_server::bind(settings).and_then(|socket| Ok(socket.local_addr()?))
            }
        };
        match result {
            Ok(addr) => BindProbe {
                available: true,
                message: format!("{} {addr} is available", settings.transport),
            },
            Err(e) => BindProbe {
                available: false,
                message: e.to_string(),
            },
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.current()
    }

    /// Listening 或 Connected。
    pub fn is_transport_up(&self) -> bool {
        self.state.is_transport_up()
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.stats.snapshot()
    }

    pub fn reset_statistics(&self) {
        self.stats.reset();
    }

    /// 当前活动客户端（TCP）或最近的数据报来源（UDP）。
    pub fn active_peer(&self) -> Option<SocketAddr> {
        *self
            .active_peer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// 订阅监听器事件。
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ListenerEvent> {
        self.events.subscribe()
    }

    /// 启动一个任务，将事件逐个交给处理器；监听器释放后任务结束。
    pub fn spawn_handler(&self, handler: Arc<dyn ListenerEventHandler>) -> JoinHandle<()> {
        let mut events = self.subscribe();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                handler.handle(event).await;
            }
        })
    }
}

/// 消费行队列：发布原始行、解析并分发记录。
async fn drain_lines(
    mut lines: mpsc::UnboundedReceiver<QueuedLine>,
    parser: ProtocolParser,
    stats: Arc<StatisticsCollector>,
    events: Arc<EventBus>,
) {
    while let Some(queued) = lines.recv().await {
        events.publish(ListenerEvent::RawDataReceived {
            source: queued.source,
            line: queued.line.clone(),
        });

        let parsed = parser.parse(&queued.line, queued.received_at_ms);
        for warning in &parsed.warnings {
            warn!(source = %queued.source, line = %queued.line, warning = %warning, "udo_line_parse_warning");
        }
        stats.record_parsed(parsed.warnings.len());
        dispatch(&events, parsed.record);
    }
    debug!("line_queue_drained");
}

/// 所有记录都发送 DataReceived，事件与记录状态额外发送对应通知。
fn dispatch(events: &EventBus, record: DecodedRecord) {
    let kind = record.kind;
    events.publish(ListenerEvent::DataReceived(record.clone()));
    match kind {
        MessageKind::Event => events.publish(ListenerEvent::EventMarker(record)),
        MessageKind::LoggingStatus => events.publish(ListenerEvent::LoggingStatusChanged {
            active: record.logging_active.unwrap_or(false),
            record,
        }),
        MessageKind::Position => {}
    }
}

impl Drop for TransportListener {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            let _ = running.shutdown.send(true);
            for task in running.tasks {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_on_idle_listener_is_noop() {
        let listener = TransportListener::new(ConnectionSettings::tcp(0));
        let mut events = listener.subscribe();
        listener.stop().await;
        listener.stop().await;
        assert_eq!(listener.state(), ConnectionState::Disconnected);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let listener = TransportListener::new(ConnectionSettings::tcp(0));
        listener.start().await.unwrap();
        assert!(matches!(
            listener.start().await,
            Err(ProtocolError::AlreadyRunning)
        ));
        assert_eq!(listener.state(), ConnectionState::Listening);
        listener.stop().await;
        assert_eq!(listener.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_udp_start_goes_straight_to_connected() {
        let mut settings = ConnectionSettings::udp(0);
        settings.bind_interface = Some("127.0.0.1".parse().unwrap());
        let listener = TransportListener::new(settings);
        listener.start().await.unwrap();
        assert!(listener.is_connected());
        listener.stop().await;
        assert!(!listener.is_transport_up());
    }

    #[test]
    fn test_dispatch_secondary_notifications() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        let mut record = DecodedRecord::new("LOG START".to_string(), 0);
        record.kind = MessageKind::LoggingStatus;
        record.logging_active = Some(true);
        dispatch(&bus, record);

        assert!(matches!(rx.try_recv(), Ok(ListenerEvent::DataReceived(_))));
        assert!(matches!(
            rx.try_recv(),
            Ok(ListenerEvent::LoggingStatusChanged { active: true, .. })
        ));
        assert!(rx.try_recv().is_err());
    }
}
