//! UDP 接收循环
//!
//! 套接字由 socket2 构造，以便在绑定前设置广播、组播与地址复用选项。
//! 每个数据报先经过限流与白名单检查，再按来源地址分别分帧。
//! 长时间没有数据的来源连同未结束的行一起被清理。

use crate::error::ProtocolError;
use crate::events::ListenerEvent;
use crate::frame::FrameAssembler;
use crate::listener::Shared;
use crate::security::Admission;
use crate::settings::ConnectionSettings;
use crate::types::{QueuedLine, now_epoch_ms};
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

/// 按配置绑定 UDP 套接字。
///
/// 配置了组播组时绑定到通配地址并在 `bind_interface`（未配置则为任意接口）上加入组播。
pub(crate) fn bind(settings: &ConnectionSettings) -> Result<UdpSocket, ProtocolError> {
    let group = settings.udp.multicast_group;
    if let Some(group) = group.filter(|group| !group.is_multicast()) {
        return Err(ProtocolError::ConfigParse(format!(
            "{group} is not a multicast address"
        )));
    }
    let addr = match group {
        Some(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), settings.port),
        None => settings.bind_addr(),
    };

    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    if group.is_some() {
        socket.set_reuse_address(true)?;
    }
    if settings.udp.broadcast {
        socket.set_broadcast(true)?;
    }
    socket
        .bind(&addr.into())
        .map_err(|e| ProtocolError::from_bind(addr, e))?;

    if let Some(group) = group {
        let interface = match settings.bind_interface {
            Some(IpAddr::V4(interface)) => interface,
            Some(IpAddr::V6(_)) => {
                return Err(ProtocolError::ConfigParse(
                    "ipv4 multicast requires an ipv4 interface".to_string(),
                ));
            }
            None => Ipv4Addr::UNSPECIFIED,
        };
        socket.join_multicast_v4(&group, &interface)?;
        socket.set_multicast_ttl_v4(settings.udp.multicast_ttl)?;
        info!(group = %group, interface = %interface, ttl = settings.udp.multicast_ttl, "udp_multicast_joined");
    }

    socket.set_nonblocking(true)?;
    let std_socket: std::net::UdpSocket = socket.into();
    Ok(UdpSocket::from_std(std_socket)?)
}

/// 单个来源的分帧状态
struct SourceFrame {
    assembler: FrameAssembler,
    last_seen: Instant,
}

/// 按来源地址分帧
struct SourceFrames {
    max_line_len: usize,
    idle: Duration,
    sweep_interval: Duration,
    last_sweep: Instant,
    sources: HashMap<SocketAddr, SourceFrame>,
}

impl SourceFrames {
    fn new(settings: &ConnectionSettings, now: Instant) -> Self {
        Self {
            max_line_len: settings.max_line_len,
            idle: Duration::from_millis(settings.udp.source_idle_ms),
            sweep_interval: Duration::from_millis(settings.rate_limit.cleanup_interval_ms),
            last_sweep: now,
            sources: HashMap::new(),
        }
    }

    /// 追加一个数据报，返回完整的行与新增的超长行数。
    fn push(&mut self, source: SocketAddr, bytes: &[u8], now: Instant) -> (Vec<String>, u64) {
        let max_line_len = self.max_line_len;
        let frame = self.sources.entry(source).or_insert_with(|| SourceFrame {
            assembler: FrameAssembler::new(max_line_len),
            last_seen: now,
        });
        frame.last_seen = now;

        let overflows_before = frame.assembler.overflows();
        let lines = frame.assembler.push(bytes);
        (lines, frame.assembler.overflows() - overflows_before)
    }

    /// 距上次清理超过间隔时清理空闲来源，返回清理的来源数。
    fn maybe_evict(&mut self, now: Instant) -> usize {
        if now.saturating_duration_since(self.last_sweep) < self.sweep_interval {
            return 0;
        }
        self.last_sweep = now;
        self.evict_idle(now)
    }

    fn evict_idle(&mut self, now: Instant) -> usize {
        let idle = self.idle;
        let before = self.sources.len();
        self.sources.retain(|source, frame| {
            let keep = now.saturating_duration_since(frame.last_seen) < idle;
            if !keep {
                debug!(source = %source, pending = frame.assembler.pending_len(), "udp_idle_source_evicted");
            }
            keep
        });
        before - self.sources.len()
    }

    fn len(&self) -> usize {
        self.sources.len()
    }
}

/// 运行 UDP 接收循环，直到收到停止信号、套接字失败或解析队列关闭。
pub(crate) async fn run(
    socket: UdpSocket,
    shared: Arc<Shared>,
    lines: mpsc::UnboundedSender<QueuedLine>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; shared.settings.udp.max_datagram_len.max(1)];
    let mut frames = SourceFrames::new(&shared.settings, Instant::now());

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            received = socket.recv_from(&mut buf) => {
                let (len, source) = match received {
                    Ok(received) => received,
                    Err(e) => {
                        error!(error = %e, "udp_receive_failed");
                        shared.fail(format!("udp receive failed: {e}"));
                        break;
                    }
                };

                match shared.gateway.admit_datagram(source.ip()) {
                    Admission::Admitted => {}
                    Admission::Denied(denial) => {
                        shared.stats.record_connection_rejected();
                        debug!(source = %source, reason = %denial, "udp_datagram_rate_limited");
                        shared.events.publish(ListenerEvent::RateLimitViolation {
                            addr: source.ip(),
                            reason: denial.to_string(),
                        });
                        continue;
                    }
                    Admission::Filtered => {
                        shared.stats.record_filtered();
                        continue;
                    }
                }
                shared.prune_rate_limits();
                shared.stats.record_packet(source.ip(), len);
                shared.set_active_peer(Some(source));

                let now = Instant::now();
                frames.maybe_evict(now);
                let (complete, overflowed) = frames.push(source, &buf[..len], now);
                if overflowed > 0 {
                    shared.stats.record_frame_overflows(overflowed);
                }

                let received_at_ms = now_epoch_ms();
                if !complete.is_empty() {
                    shared.stats.record_queued(complete.len());
                }
                let mut queue_closed = false;
                for line in complete {
                    if lines.send(QueuedLine { source, line, received_at_ms }).is_err() {
                        queue_closed = true;
                        break;
                    }
                }
                if queue_closed {
                    debug!("line_queue_closed_stopping_receive_loop");
                    break;
                }
            }
        }
    }

    info!(sources = frames.len(), "udp_receive_loop_stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)), port)
    }

    fn frames(idle_ms: u64, sweep_ms: u64, now: Instant) -> SourceFrames {
        let mut settings = ConnectionSettings::udp(0);
        settings.udp.source_idle_ms = idle_ms;
        settings.rate_limit.cleanup_interval_ms = sweep_ms;
        SourceFrames::new(&settings, now)
    }

    #[test]
    fn test_sources_framed_independently() {
        let now = Instant::now();
        let mut frames = frames(1000, 1000, now);
        assert!(frames.push(source(1), b"12,3", now).0.is_empty());
        assert!(frames.push(source(2), b"99,", now).0.is_empty());
        assert_eq!(frames.push(source(1), b"4\n", now).0, vec!["12,34"]);
        assert_eq!(frames.push(source(2), b"1\n", now).0, vec!["99,1"]);
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_idle_sources_evicted_with_partial_lines() {
        let start = Instant::now();
        let mut frames = frames(1000, 0, start);
        frames.push(source(1), b"12,3", start);
        frames.push(source(2), b"partial", start);

        let later = start + Duration::from_millis(600);
        frames.push(source(2), b" more", later);
        assert_eq!(frames.maybe_evict(later), 0);

        let idle = start + Duration::from_millis(1000);
        assert_eq!(frames.maybe_evict(idle), 1);
        assert_eq!(frames.len(), 1);

        // 被清理的来源重新开始分帧，不再拼接旧的半行
        assert_eq!(frames.push(source(1), b"4\n", idle).0, vec!["4"]);
        assert_eq!(frames.push(source(2), b"!\n", idle).0, vec!["partial more!"]);
    }

    #[test]
    fn test_eviction_waits_for_sweep_interval() {
        let start = Instant::now();
        let mut frames = frames(10, 5000, start);
        frames.push(source(1), b"x", start);

        let idle = start + Duration::from_millis(100);
        assert_eq!(frames.maybe_evict(idle), 0);
        assert_eq!(frames.len(), 1);

        let swept = start + Duration::from_millis(5000);
        assert_eq!(frames.maybe_evict(swept), 1);
        assert_eq!(frames.len(), 0);
    }
}
