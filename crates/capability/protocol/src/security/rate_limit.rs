//! 按来源地址限流
//!
//! 每个来源 IP 维护一个令牌桶和一个准入窗口，TCP 连接与 UDP 数据报使用同一套规则：
//!
//! 1. 当前窗口内的准入次数已达 `max_per_window` → [`RateLimitDenial::ConnectionRateExceeded`]
//! 2. 令牌桶为空 → [`RateLimitDenial::BurstExhausted`]
//!
//! 状态表由读写锁保护；空闲条目在 `cleanup_interval_ms` 间隔内顺带清理。

use crate::settings::RateLimitSettings;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// 拒绝原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDenial {
    /// 窗口内准入次数超限
    ConnectionRateExceeded,
    /// 突发令牌耗尽
    BurstExhausted,
}

impl RateLimitDenial {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionRateExceeded => "connection_rate_exceeded",
            Self::BurstExhausted => "burst_exhausted",
        }
    }
}

impl fmt::Display for RateLimitDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个来源地址的令牌桶状态
#[derive(Debug, Clone)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
    window_start: Instant,
    window_count: u32,
    last_seen: Instant,
}

impl BucketState {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
            window_start: now,
            window_count: 0,
            last_seen: now,
        }
    }

    fn refill(&mut self, capacity: f64, refill_per_sec: f64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_per_sec).min(capacity);
        self.last_refill = now;
    }
}

/// 按来源地址的令牌桶限流器
pub struct RateLimiter {
    config: RateLimitSettings,
    state: RwLock<HashMap<IpAddr, BucketState>>,
    last_cleanup: Mutex<Instant>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitSettings) -> Self {
        Self {
            config,
            state: RwLock::new(HashMap::new()),
            last_cleanup: Mutex::new(Instant::now()),
        }
    }

    fn window(&self) -> Duration {
        Duration::from_millis(self.config.window_ms.max(1))
    }

    fn capacity(&self) -> f64 {
        f64::from(self.config.burst_capacity.max(1))
    }

    /// 检查来源地址是否允许准入；允许时消耗一个令牌。
    pub fn check(&self, ip: IpAddr) -> Result<(), RateLimitDenial> {
        self.check_at(ip, Instant::now())
    }

    pub fn check_at(&self, ip: IpAddr, now: Instant) -> Result<(), RateLimitDenial> {
        let capacity = self.capacity();
        let window = self.window();

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let bucket = state
            .entry(ip)
            .or_insert_with(|| BucketState::new(capacity, now));

        bucket.last_seen = now;
        bucket.refill(capacity, self.config.refill_per_sec.max(0.0), now);
        if now.saturating_duration_since(bucket.window_start) >= window {
            bucket.window_start = now;
            bucket.window_count = 0;
        }

        if bucket.window_count >= self.config.max_per_window {
            return Err(RateLimitDenial::ConnectionRateExceeded);
        }
        if bucket.tokens < 1.0 {
            return Err(RateLimitDenial::BurstExhausted);
        }

        bucket.tokens -= 1.0;
        bucket.window_count += 1;
        Ok(())
    }

    /// 清理空闲时间超过保留期的条目，返回清理数量。
    pub fn prune_idle_at(&self, now: Instant) -> usize {
        let retention = Duration::from_millis(self.config.idle_retention_ms);
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let before = state.len();
        state.retain(|_, bucket| now.saturating_duration_since(bucket.last_seen) < retention);
        before - state.len()
    }

    /// 距上次清理超过清理间隔时执行一次清理；执行了清理返回 `true`。
    pub fn maybe_prune(&self, now: Instant) -> bool {
        let interval = Duration::from_millis(self.config.cleanup_interval_ms);
        {
            let mut last = self
                .last_cleanup
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if now.saturating_duration_since(*last) < interval {
                return false;
            }
            *last = now;
        }
        self.prune_idle_at(now);
        true
    }

    /// 当前跟踪的来源地址数量。
    #[must_use]
    pub fn tracked_ips(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
