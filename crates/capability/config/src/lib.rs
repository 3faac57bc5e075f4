//! 应用运行配置加载。
//!
//! 设置了 `UDO_SETTINGS_FILE` 时从 JSON 文件读取完整的连接配置，
//! 否则逐项读取 `UDO_*` 环境变量，未设置的项使用默认值。

use domain::FieldTag;
use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use udo_protocol::{ConnectionSettings, TransportKind};

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
    #[error("read settings file {0}: {1}")]
    File(PathBuf, String),
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub connection: ConnectionSettings,
    /// 是否逐条记录解码结果（info 级别）
    pub log_records: bool,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let connection = match read_optional("UDO_SETTINGS_FILE") {
            Some(path) => load_settings_file(Path::new(&path))?,
            None => connection_from_env()?,
        };
        let log_records = read_bool_with_default("UDO_LOG_RECORDS", true);

        Ok(Self {
            connection,
            log_records,
        })
    }
}

/// 从 JSON 文件读取连接配置。
pub fn load_settings_file(path: &Path) -> Result<ConnectionSettings, ConfigError> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::File(path.to_path_buf(), e.to_string()))?;
    ConnectionSettings::from_json(&json)
        .map_err(|e| ConfigError::File(path.to_path_buf(), e.to_string()))
}

fn connection_from_env() -> Result<ConnectionSettings, ConfigError> {
    let transport = match read_optional("UDO_TRANSPORT") {
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "tcp" => TransportKind::Tcp,
            "udp" => TransportKind::Udp,
            _ => return Err(ConfigError::Invalid("UDO_TRANSPORT".to_string(), value)),
        },
        None => TransportKind::Tcp,
    };
    let port = read_u16("UDO_PORT")?;
    let mut settings = ConnectionSettings::new(transport, port);

    settings.bind_interface = read_optional_parsed::<IpAddr>("UDO_BIND_INTERFACE")?;
    if let Some(separator) = read_optional("UDO_FIELD_SEPARATOR") {
        settings.field_separator = parse_separator(&separator)
            .ok_or_else(|| ConfigError::Invalid("UDO_FIELD_SEPARATOR".to_string(), separator))?;
    }
    if let Some(mapping) = read_optional("UDO_FIELD_MAPPING") {
        settings.field_mapping = FieldTag::parse_list(&mapping)
            .map_err(|e| ConfigError::Invalid("UDO_FIELD_MAPPING".to_string(), e.to_string()))?;
    }
    settings.auto_detect =
        read_bool_with_default("UDO_AUTO_DETECT", settings.field_mapping.is_empty());

    settings.tls.enabled = read_bool_with_default("UDO_TLS_ENABLED", false);
    settings.tls.certificate_path = read_optional("UDO_TLS_CERT_PATH").map(PathBuf::from);
    settings.tls.private_key_path = read_optional("UDO_TLS_KEY_PATH").map(PathBuf::from);
    settings.tls.handshake_timeout_ms = read_u64_with_default(
        "UDO_TLS_HANDSHAKE_TIMEOUT_MS",
        settings.tls.handshake_timeout_ms,
    )?;

    let rate_limit = &mut settings.rate_limit;
    rate_limit.enabled = read_bool_with_default("UDO_RATE_LIMIT_ENABLED", false);
    rate_limit.max_per_window =
        read_u32_with_default("UDO_RATE_LIMIT_MAX_PER_WINDOW", rate_limit.max_per_window)?;
    rate_limit.window_ms = read_u64_with_default("UDO_RATE_LIMIT_WINDOW_MS", rate_limit.window_ms)?;
    rate_limit.burst_capacity =
        read_u32_with_default("UDO_RATE_LIMIT_BURST", rate_limit.burst_capacity)?;
    rate_limit.idle_retention_ms = read_u64_with_default(
        "UDO_RATE_LIMIT_IDLE_RETENTION_MS",
        rate_limit.idle_retention_ms,
    )?;
    rate_limit.refill_per_sec =
        read_f64_with_default("UDO_RATE_LIMIT_REFILL_PER_SEC", rate_limit.refill_per_sec)?;
    rate_limit.cleanup_interval_ms = read_u64_with_default(
        "UDO_RATE_LIMIT_CLEANUP_INTERVAL_MS",
        rate_limit.cleanup_interval_ms,
    )?;

    settings.udp.broadcast = read_bool_with_default("UDO_UDP_BROADCAST", false);
    settings.udp.multicast_group = read_optional_parsed::<Ipv4Addr>("UDO_UDP_MULTICAST_GROUP")?;
    settings.udp.multicast_ttl =
        read_u32_with_default("UDO_UDP_MULTICAST_TTL", settings.udp.multicast_ttl)?;
    settings.udp.source_idle_ms =
        read_u64_with_default("UDO_UDP_SOURCE_IDLE_MS", settings.udp.source_idle_ms)?;

    if let Some(sources) = read_optional("UDO_ALLOWED_SOURCES") {
        for source in sources.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let addr = source.parse::<IpAddr>().map_err(|_| {
                ConfigError::Invalid("UDO_ALLOWED_SOURCES".to_string(), source.to_string())
            })?;
            settings.allow_list.addresses.insert(addr);
        }
        settings.allow_list.enabled = !settings.allow_list.addresses.is_empty();
    }

    settings.max_line_len = read_usize_with_default("UDO_MAX_LINE_LEN", settings.max_line_len)?;
    settings.stop_timeout_ms =
        read_u64_with_default("UDO_STOP_TIMEOUT_MS", settings.stop_timeout_ms)?;

    Ok(settings)
}

/// 分隔符只允许单个字符；`tab` 与 `\t` 表示制表符。
fn parse_separator(value: &str) -> Option<char> {
    match value {
        "tab" | "\\t" => return Some('\t'),
        "space" => return Some(' '),
        _ => {}
    }
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

fn read_u16(key: &str) -> Result<u16, ConfigError> {
    let value = env::var(key).map_err(|_| ConfigError::Missing(key.to_string()))?;
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u32_with_default(key: &str, default: u32) -> Result<u32, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_usize_with_default(key: &str, default: usize) -> Result<usize, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<usize>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_f64_with_default(key: &str, default: f64) -> Result<f64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite() && *number >= 0.0)
        .ok_or_else(|| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_optional_parsed<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match read_optional(key) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(key.to_string(), value)),
        None => Ok(None),
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
