//! 接收统计
//!
//! 计数器在实例生命周期内单调累加，只有调用方显式 [`StatisticsCollector::reset`] 才会清零。

use crate::types::now_epoch_ms;
use serde::Serialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// 统计快照
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    pub bytes_received: u64,
    pub packets_received: u64,
    pub packets_filtered: u64,
    pub messages_queued: u64,
    pub messages_parsed: u64,
    pub parse_warnings: u64,
    pub frame_overflows: u64,
    pub connections_accepted: u64,
    pub connections_rejected: u64,
    /// 按来源地址的包计数
    pub packets_by_source: HashMap<IpAddr, u64>,
    /// 最近一次限流状态清理时间（毫秒），从未清理为 `None`
    pub last_cleanup_ms: Option<i64>,
}

/// 线程安全的统计收集器
#[derive(Debug)]
pub struct StatisticsCollector {
    bytes_received: AtomicU64,
    packets_received: AtomicU64,
    packets_filtered: AtomicU64,
    messages_queued: AtomicU64,
    messages_parsed: AtomicU64,
    parse_warnings: AtomicU64,
    frame_overflows: AtomicU64,
    connections_accepted: AtomicU64,
    connections_rejected: AtomicU64,
    last_cleanup_ms: AtomicI64,
    packets_by_source: Mutex<HashMap<IpAddr, u64>>,
}

impl Default for StatisticsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticsCollector {
    pub fn new() -> Self {
        Self {
            bytes_received: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            packets_filtered: AtomicU64::new(0),
            messages_queued: AtomicU64::new(0),
            messages_parsed: AtomicU64::new(0),
            parse_warnings: AtomicU64::new(0),
            frame_overflows: AtomicU64::new(0),
            connections_accepted: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            last_cleanup_ms: AtomicI64::new(0),
            packets_by_source: Mutex::new(HashMap::new()),
        }
    }

    /// 记录一次读取/数据报：字节数、包数与来源计数。
    pub fn record_packet(&self, source: IpAddr, bytes: usize) {
        self.bytes_received
            .fetch_add(bytes as u64, Ordering::Relaxed);
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        let mut tally = self
            .packets_by_source
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *tally.entry(source).or_insert(0) += 1;
    }

    pub fn record_filtered(&self) {
        self.packets_filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queued(&self, count: usize) {
        self.messages_queued
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_parsed(&self, warnings: usize) {
        self.messages_parsed.fetch_add(1, Ordering::Relaxed);
        if warnings > 0 {
            self.parse_warnings
                .fetch_add(warnings as u64, Ordering::Relaxed);
        }
    }

    pub fn record_frame_overflows(&self, count: u64) {
        self.frame_overflows.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_connection_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cleanup(&self) {
        self.last_cleanup_ms
            .store(now_epoch_ms(), Ordering::Relaxed);
    }

    /// 读取快照。读取期间持有来源计数锁，来源计数与其他计数器在同一时刻读取。
    pub fn snapshot(&self) -> StatisticsSnapshot {
        let tally = self
            .packets_by_source
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let last_cleanup_ms = self.last_cleanup_ms.load(Ordering::Relaxed);
        StatisticsSnapshot {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_filtered: self.packets_filtered.load(Ordering::Relaxed),
            messages_queued: self.messages_queued.load(Ordering::Relaxed),
            messages_parsed: self.messages_parsed.load(Ordering::Relaxed),
            parse_warnings: self.parse_warnings.load(Ordering::Relaxed),
            frame_overflows: self.frame_overflows.load(Ordering::Relaxed),
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            packets_by_source: tally.clone(),
            last_cleanup_ms: (last_cleanup_ms > 0).then_some(last_cleanup_ms),
        }
    }

    /// 显式清零所有计数器。
    pub fn reset(&self) {
        let mut tally = self
            .packets_by_source
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        tally.clear();
        for counter in [
            &self.bytes_received,
            &self.packets_received,
            &self.packets_filtered,
            &self.messages_queued,
            &self.messages_parsed,
            &self.parse_warnings,
            &self.frame_overflows,
            &self.connections_accepted,
            &self.connections_rejected,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.last_cleanup_ms.store(0, Ordering::Relaxed);
    }
}
