//! 追踪初始化与会话 ID 生成。

use tracing_subscriber::{EnvFilter, fmt};

/// 未设置 `RUST_LOG` 时的默认过滤级别。
pub const DEFAULT_FILTER: &str = "info";

/// 初始化 tracing（默认 info）。重复调用不会报错。
pub fn init_tracing() {
    init_tracing_with(DEFAULT_FILTER);
}

/// 以指定的默认过滤规则初始化 tracing，`RUST_LOG` 优先。
pub fn init_tracing_with(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = fmt().with_env_filter(filter).try_init();
    tracing::debug!(default_filter, "tracing_initialized");
}

/// 为新接受的 TCP 会话生成 ID。
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
