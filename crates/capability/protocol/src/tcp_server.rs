//! TCP 接收循环
//!
//! 单活动客户端模型：接收循环任务独占监听套接字与当前会话。
//! 新连接通过准入检查后，先关闭并释放旧会话，再执行 TLS 握手（如启用），
//! 之后该会话的字节按到达顺序进入分帧。会话结束后回到 Listening，等待下一个客户端。

use crate::error::ProtocolError;
use crate::events::ListenerEvent;
use crate::frame::FrameAssembler;
use crate::listener::Shared;
use crate::state::ConnectionState;
use crate::types::{QueuedLine, now_epoch_ms};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_rustls::server::TlsStream;
use tracing::{Instrument, debug, info, info_span, warn};

const READ_BUFFER_LEN: usize = 8 * 1024;

/// 绑定 TCP 监听端口。
pub(crate) async fn bind(addr: SocketAddr) -> Result<TcpListener, ProtocolError> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| ProtocolError::from_bind(addr, e))
}

enum SessionStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl SessionStream {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(stream) => stream.read(buf).await,
            Self::Tls(stream) => stream.read(buf).await,
        }
    }
}

/// 当前活动会话
struct Session {
    id: String,
    peer: SocketAddr,
    stream: SessionStream,
    assembler: FrameAssembler,
}

/// 没有活动会话时永远挂起，让 select 只等待 accept 与停止信号。
async fn read_session(session: &mut Option<Session>, buf: &mut [u8]) -> io::Result<usize> {
    match session {
        Some(session) => session.stream.read(buf).await,
        None => std::future::pending().await,
    }
}

/// 运行 TCP 接收循环，直到收到停止信号或解析队列关闭。
pub(crate) async fn run(
    listener: TcpListener,
    shared: Arc<Shared>,
    lines: mpsc::UnboundedSender<QueuedLine>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut session: Option<Session> = None;
    let mut buf = vec![0u8; READ_BUFFER_LEN];

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
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "tcp_accept_failed");
                        shared.events.error(format!("accept failed: {e}"));
                        continue;
                    }
                };
                if let Some(new_session) = admit(&shared, &mut session, stream, peer).await {
                    session = Some(new_session);
                }
            }
            read = read_session(&mut session, &mut buf) => {
                match read {
                    Ok(0) => {
                        if let Some(closed) = session.take() {
                            info!(session_id = %closed.id, peer = %closed.peer, "tcp_session_closed_by_peer");
                            end_session(&shared, closed);
                        }
                    }
                    Ok(n) => {
                        let Some(active) = session.as_mut() else { continue };
                        if feed(&shared, active, &buf[..n], &lines).is_err() {
                            debug!("line_queue_closed_stopping_accept_loop");
                            break;
                        }
                    }
                    Err(e) => {
                        if let Some(failed) = session.take() {
                            warn!(session_id = %failed.id, peer = %failed.peer, error = %e, "tcp_session_read_failed");
                            shared.events.error(format!("session {} read failed: {e}", failed.peer));
                            end_session(&shared, failed);
                        }
                    }
                }
            }
        }
    }

    if let Some(active) = session.take() {
        debug!(session_id = %active.id, "tcp_session_dropped_on_stop");
        shared.set_active_peer(None);
    }
    info!("tcp_accept_loop_stopped");
}

/// 对新连接执行准入、会话替换与握手；返回新的活动会话。
async fn admit(
    shared: &Shared,
    session: &mut Option<Session>,
    stream: TcpStream,
    peer: SocketAddr,
) -> Option<Session> {
    if let Err(denial) = shared.gateway.admit_connection(peer.ip()) {
        shared.stats.record_connection_rejected();
        debug!(peer = %peer, reason = %denial, "tcp_connection_rate_limited");
        shared.events.publish(ListenerEvent::RateLimitViolation {
            addr: peer.ip(),
            reason: denial.to_string(),
        });
        return None;
    }
    shared.prune_rate_limits();

    if let Some(previous) = session.take() {
        info!(session_id = %previous.id, peer = %previous.peer, new_peer = %peer, "tcp_session_replaced");
        end_session(shared, previous);
    }

    let id = udo_telemetry::new_session_id();
    let span = info_span!("udo_session", session_id = %id, peer = %peer);

    let stream = if shared.gateway.tls_enabled() {
        match shared.gateway.handshake(stream).instrument(span.clone()).await {
            Ok((stream, tls_info)) => {
                span.in_scope(|| {
                    info!(
                        protocol_version = %tls_info.protocol_version,
                        cipher_suite = %tls_info.cipher_suite,
                        "tls_session_established"
                    )
                });
                shared.events.publish(ListenerEvent::EncryptionEstablished {
                    peer,
                    protocol_version: tls_info.protocol_version,
                    cipher_suite: tls_info.cipher_suite,
                });
                SessionStream::Tls(Box::new(stream))
            }
            Err(e) => {
                span.in_scope(|| warn!(error = %e, "tls_handshake_failed"));
                shared.stats.record_connection_rejected();
                shared.events.error(format!("tls handshake with {peer} failed: {e}"));
                return None;
            }
        }
    } else {
        SessionStream::Plain(stream)
    };

    shared.stats.record_connection_accepted();
    shared.set_active_peer(Some(peer));
    shared.transition(ConnectionState::Listening, ConnectionState::Connected);
    span.in_scope(|| info!("tcp_session_started"));

    Some(Session {
        id,
        peer,
        stream,
        assembler: FrameAssembler::new(shared.settings.max_line_len),
    })
}

/// 释放会话并回到 Listening。
fn end_session(shared: &Shared, session: Session) {
    drop(session);
    shared.set_active_peer(None);
    shared.transition(ConnectionState::Connected, ConnectionState::Listening);
}

/// 将读取到的字节送入分帧，完整的行进入解析队列。
fn feed(
    shared: &Shared,
    session: &mut Session,
    bytes: &[u8],
    lines: &mpsc::UnboundedSender<QueuedLine>,
) -> Result<(), ProtocolError> {
    shared.stats.record_packet(session.peer.ip(), bytes.len());

    let overflows_before = session.assembler.overflows();
    let complete = session.assembler.push(bytes);
    let overflowed = session.assembler.overflows() - overflows_before;
    if overflowed > 0 {
        shared.stats.record_frame_overflows(overflowed);
    }

    let received_at_ms = now_epoch_ms();
    let count = complete.len();
    if count > 0 {
        shared.stats.record_queued(count);
        debug!(session_id = %session.id, lines = count, "tcp_lines_queued");
    }
    for line in complete {
        lines
            .send(QueuedLine {
                source: session.peer,
                line,
                received_at_ms,
            })
            .map_err(|_| ProtocolError::ChannelClosed)?;
    }
    Ok(())
}
