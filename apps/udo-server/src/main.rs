//! UDO 接收服务：加载配置、启动监听器、记录解码结果，Ctrl-C 停止。
//!
//! `udo-server check` 只探测端口是否可绑定。

mod records;

use records::RecordLogger;
use std::sync::Arc;
use tracing::{error, info};
use udo_config::AppConfig;
use udo_protocol::TransportListener;
use udo_telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = AppConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    if std::env::args().nth(1).as_deref() == Some("check") {
        let probe = TransportListener::test_bind(&config.connection).await;
        info!(available = probe.available, message = %probe.message, "bind_probe");
        if !probe.available {
            return Err(probe.message.into());
        }
        return Ok(());
    }

    let listener = TransportListener::new(config.connection.clone());
    let handler = listener.spawn_handler(Arc::new(RecordLogger::new(config.log_records)));

    let local_addr = match listener.start().await {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, "udo_server_start_failed");
            return Err(e.into());
        }
    };
    info!(local_addr = %local_addr, "udo_server_running");

    tokio::signal::ctrl_c().await?;
    info!("udo_server_shutdown_requested");
    listener.stop().await;

    let stats = listener.statistics();
    info!(statistics = %serde_json::to_string(&stats)?, "udo_server_final_statistics");

    drop(listener);
    let _ = handler.await;
    Ok(())
}
