use super::*;

use std::{
    collections::HashMap,
    env,
    time::{SystemTime, UNIX_EPOCH},
};

#[test]
fn defaults_point_at_local_server() {
    let settings = ClientSettings::default();
    assert_eq!(settings.api_url, "http://localhost:8080/api/v1");
    assert_eq!(settings.ws_url, "ws://localhost:8080/ws/websocket");
    settings.validate().expect("defaults are valid");
}

#[test]
fn file_values_override_defaults() {
    let mut settings = ClientSettings::default();
    apply_file(
        &mut settings,
        r#"
api_url = "https://chat.example.org/api/v1"
notification_queue_capacity = 8
"#,
    )
    .expect("toml");

    assert_eq!(settings.api_url, "https://chat.example.org/api/v1");
    assert_eq!(settings.notification_queue_capacity, 8);
    assert_eq!(settings.ws_url, ClientSettings::default().ws_url);
}

#[test]
fn app_prefixed_env_wins_over_plain_env() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("CHAT_WS_URL", "ws://plain:1/ws"),
        ("APP__WS_URL", "wss://prefixed:2/ws"),
        ("APP__REQUEST_TIMEOUT_SECONDS", "5"),
        ("APP__NOTIFICATION_QUEUE_CAPACITY", "not-a-number"),
    ]);
    let mut settings = ClientSettings::default();
    apply_env(&mut settings, |key| vars.get(key).map(|v| v.to_string()));

    assert_eq!(settings.ws_url, "wss://prefixed:2/ws");
    assert_eq!(settings.request_timeout(), Duration::from_secs(5));
    assert_eq!(
        settings.notification_queue_capacity,
        ClientSettings::default().notification_queue_capacity
    );
}

#[test]
fn validate_rejects_swapped_schemes_and_zero_queue() {
    let mut settings = ClientSettings {
        api_url: "ws://localhost:8080/api/v1".into(),
        ..ClientSettings::default()
    };
    assert!(settings.validate().is_err());

    settings.api_url = ClientSettings::default().api_url;
    settings.ws_url = "http://localhost:8080/ws".into();
    assert!(settings.validate().is_err());

    settings.ws_url = ClientSettings::default().ws_url;
    settings.notification_queue_capacity = 0;
    assert!(settings.validate().is_err());
}

#[test]
fn load_settings_from_reads_explicit_file() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = env::temp_dir().join(format!("chat_client_config_{suffix}.toml"));
    fs::write(&path, "request_timeout_seconds = 12\n").expect("write");

    let settings = load_settings_from(&path).expect("load");
    assert_eq!(settings.request_timeout_seconds, 12);

    fs::remove_file(path).expect("cleanup");
}
