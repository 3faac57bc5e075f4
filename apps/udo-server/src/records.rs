//! 监听器事件的日志处理器

use async_trait::async_trait;
use domain::DecodedRecord;
use tracing::{debug, info, warn};
use udo_protocol::{ListenerEvent, ListenerEventHandler};

/// 将监听器事件写入结构化日志
pub struct RecordLogger {
    log_records: bool,
}

impl RecordLogger {
    pub fn new(log_records: bool) -> Self {
        Self { log_records }
    }

    fn log_record(&self, record: &DecodedRecord) {
        if !self.log_records {
            return;
        }
        match serde_json::to_string(record) {
            Ok(json) => info!(target: "udo.records", kind = ?record.kind, record = %json, "record_decoded"),
            Err(err) => warn!(target: "udo.records", error = %err, "record_serialize_failed"),
        }
    }
}

#[async_trait]
impl ListenerEventHandler for RecordLogger {
    async fn handle(&self, event: ListenerEvent) {
        match event {
            ListenerEvent::DataReceived(record) => self.log_record(&record),
            ListenerEvent::EventMarker(record) => info!(
                target: "udo.records",
                event_number = ?record.event_number,
                event_text = ?record.event_text,
                "event_marker_received"
            ),
            ListenerEvent::LoggingStatusChanged { active, .. } => {
                info!(target: "udo.records", active, "logging_status_changed")
            }
            ListenerEvent::ConnectionStatusChanged { state, description } => {
                info!(state = %state, description = %description, "connection_status_changed")
            }
            ListenerEvent::ErrorOccurred { message } => warn!(message = %message, "listener_error"),
            ListenerEvent::RawDataReceived { source, line } => {
                debug!(source = %source, line = %line, "raw_line_received")
            }
            ListenerEvent::RateLimitViolation { addr, reason } => {
                debug!(addr = %addr, reason = %reason, "rate_limit_violation")
            }
            ListenerEvent::EncryptionEstablished {
                peer,
                protocol_version,
                cipher_suite,
            } => info!(
                peer = %peer,
                protocol_version = %protocol_version,
                cipher_suite = %cipher_suite,
                "encryption_established"
            ),
        }
    }
}
