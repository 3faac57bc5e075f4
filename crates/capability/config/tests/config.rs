use domain::FieldTag;
use std::net::{IpAddr, Ipv4Addr};
use udo_config::{AppConfig, ConfigError, load_settings_file};
use udo_protocol::TransportKind;

#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::remove_var("UDO_SETTINGS_FILE");
        std::env::set_var("UDO_TRANSPORT", "udp");
        std::env::set_var("UDO_PORT", "4001");
        std::env::set_var("UDO_BIND_INTERFACE", "127.0.0.1");
        std::env::set_var("UDO_FIELD_SEPARATOR", ";");
        std::env::set_var("UDO_FIELD_MAPPING", "time,e,n,hdg");
        std::env::set_var("UDO_RATE_LIMIT_ENABLED", "true");
        std::env::set_var("UDO_RATE_LIMIT_MAX_PER_WINDOW", "5");
        std::env::set_var("UDO_RATE_LIMIT_REFILL_PER_SEC", "12.5");
        std::env::set_var("UDO_RATE_LIMIT_CLEANUP_INTERVAL_MS", "750");
        std::env::set_var("UDO_ALLOWED_SOURCES", "10.0.0.1, 10.0.0.2");
        std::env::set_var("UDO_LOG_RECORDS", "false");
    }

    let config = AppConfig::from_env().expect("config");
    let connection = &config.connection;
    assert_eq!(connection.transport, TransportKind::Udp);
    assert_eq!(connection.port, 4001);
    assert_eq!(
        connection.bind_interface,
        Some(IpAddr::V4(Ipv4Addr::LOCALHOST))
    );
    assert_eq!(connection.field_separator, ';');
    assert_eq!(
        connection.field_mapping,
        vec![
            FieldTag::Time,
            FieldTag::Easting,
            FieldTag::Northing,
            FieldTag::Heading
        ]
    );
    assert!(!connection.uses_auto_detect());
    assert!(connection.rate_limit.enabled);
    assert_eq!(connection.rate_limit.max_per_window, 5);
    assert_eq!(connection.rate_limit.refill_per_sec, 12.5);
    assert_eq!(connection.rate_limit.cleanup_interval_ms, 750);
    assert!(connection.allow_list.enabled);
    assert_eq!(connection.allow_list.addresses.len(), 2);
    assert!(!config.log_records);

    unsafe {
        std::env::set_var("UDO_RATE_LIMIT_REFILL_PER_SEC", "fast");
    }
    assert!(matches!(
        AppConfig::from_env(),
        Err(ConfigError::Invalid(key, _)) if key == "UDO_RATE_LIMIT_REFILL_PER_SEC"
    ));

    unsafe {
        std::env::remove_var("UDO_RATE_LIMIT_REFILL_PER_SEC");
        std::env::set_var("UDO_PORT", "not-a-port");
    }
    assert!(matches!(
        AppConfig::from_env(),
        Err(ConfigError::Invalid(key, _)) if key == "UDO_PORT"
    ));

    unsafe {
        std::env::remove_var("UDO_PORT");
    }
    assert!(matches!(
        AppConfig::from_env(),
        Err(ConfigError::Missing(key)) if key == "UDO_PORT"
    ));
}

#[test]
fn load_settings_from_json_file() {
    let path = std::env::temp_dir().join(format!("udo-settings-{}.json", std::process::id()));
    std::fs::write(
        &path,
        r#"{"transport":"tcp","port":4002,"field_mapping":["event","kp","cross_track"],"auto_detect":false}"#,
    )
    .expect("write settings");

    let settings = load_settings_file(&path).expect("settings");
    let _ = std::fs::remove_file(&path);
    assert_eq!(settings.transport, TransportKind::Tcp);
    assert_eq!(settings.port, 4002);
    assert_eq!(
        settings.field_mapping,
        vec![FieldTag::Event, FieldTag::Kp, FieldTag::CrossTrack]
    );
    assert_eq!(settings.field_separator, ',');
}

#[test]
fn missing_settings_file_is_reported() {
    let result = load_settings_file(std::path::Path::new("/nonexistent/udo.json"));
    assert!(matches!(result, Err(ConfigError::File(..))));
}
