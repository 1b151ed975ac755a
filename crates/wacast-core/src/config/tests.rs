use super::*;
use std::collections::HashMap;

#[test]
fn test_defaults_when_sections_missing() {
    let cfg: Config = toml::from_str("").unwrap();
    assert_eq!(cfg.wacast.prefix, ".");
    assert_eq!(cfg.wacast.default_country_code, "254");
    assert_eq!(cfg.jobs.flush_every, 5);
    assert_eq!(cfg.jobs.min_delay_secs, 30);
    assert_eq!(cfg.jobs.max_delay_secs, 60);
    assert!(cfg.whatsapp.enabled);
    assert_eq!(cfg.api.port, 3000);
    assert!(cfg.keepalive.enabled);
}

#[test]
fn test_partial_jobs_section() {
    let toml_str = r#"
        [jobs]
        min_delay_secs = 60
        max_delay_secs = 120
    "#;
    let cfg: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(cfg.jobs.min_delay_secs, 60);
    assert_eq!(cfg.jobs.max_delay_secs, 120);
    assert_eq!(cfg.jobs.flush_every, 5, "unset fields keep defaults");
}

#[test]
fn test_country_code_from_toml() {
    let toml_str = r#"
        [wacast]
        default_country_code = "255"
        prefix = "!"
    "#;
    let cfg: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(cfg.wacast.default_country_code, "255");
    assert_eq!(cfg.wacast.prefix, "!");
    assert!(validate(&cfg).is_ok());
}

#[test]
fn test_validate_rejects_inverted_delays() {
    let mut cfg = Config::default();
    cfg.jobs.min_delay_secs = 90;
    cfg.jobs.max_delay_secs = 30;
    assert!(matches!(validate(&cfg), Err(WacastError::Config(_))));
}

#[test]
fn test_validate_rejects_zero_flush() {
    let mut cfg = Config::default();
    cfg.jobs.flush_every = 0;
    assert!(validate(&cfg).is_err());
}

#[test]
fn test_validate_rejects_bad_country_code() {
    let mut cfg = Config::default();
    cfg.wacast.default_country_code = "+254".to_string();
    assert!(validate(&cfg).is_err());
    cfg.wacast.default_country_code = "0254".to_string();
    assert!(validate(&cfg).is_err());
}

#[test]
fn test_apply_overrides() {
    let env: HashMap<&str, &str> = [
        ("WACAST_BRIDGE_TOKEN", "tok"),
        ("WACAST_API_KEY", "key"),
        ("PORT", "8080"),
    ]
    .into_iter()
    .collect();
    let mut cfg = Config::default();
    apply_overrides(&mut cfg, |k| env.get(k).map(|v| v.to_string()));
    assert_eq!(cfg.whatsapp.bridge_token, "tok");
    assert_eq!(cfg.api.api_key, "key");
    assert_eq!(cfg.api.port, 8080);
}

#[test]
fn test_apply_overrides_ignores_bad_port() {
    let mut cfg = Config::default();
    apply_overrides(&mut cfg, |k| (k == "PORT").then(|| "not-a-port".to_string()));
    assert_eq!(cfg.api.port, 3000);
}

#[test]
fn test_api_base_url() {
    let mut api = ApiConfig::default();
    assert_eq!(api.base_url(), "http://0.0.0.0:3000");
    api.public_url = "https://bot.example.com/".to_string();
    assert_eq!(api.base_url(), "https://bot.example.com");
}

#[test]
fn test_load_missing_file_uses_defaults() {
    let cfg = load("/nonexistent/__wacast_config__.toml").unwrap();
    assert_eq!(cfg.wacast.name, "wacast");
}

#[test]
fn test_ensure_layout_creates_subdirs() {
    let tmp = std::env::temp_dir().join(format!("__wacast_layout_{}__", std::process::id()));
    let _ = std::fs::remove_dir_all(&tmp);

    let base = ensure_layout(tmp.to_str().unwrap());
    assert!(base.join("jobs").is_dir());
    assert!(base.join("logs").is_dir());
    assert!(base.join("uploads").is_dir());

    let _ = std::fs::remove_dir_all(&tmp);
}

#[test]
fn test_shellexpand_passthrough() {
    assert_eq!(shellexpand("/abs/path"), "/abs/path");
}

#[test]
fn test_validate_rejects_zero_item_timeout() {
    let mut cfg = Config::default();
    cfg.jobs.item_timeout_secs = 0;
    assert!(matches!(validate(&cfg), Err(WacastError::Config(_))));
}

#[test]
fn test_validate_rejects_zero_request_timeout() {
    let mut cfg = Config::default();
    cfg.whatsapp.request_timeout_secs = 0;
    assert!(validate(&cfg).is_err());
}

#[test]
fn test_default_item_timeout_covers_bridge_retries() {
    let cfg = Config::default();
    let budget = cfg.whatsapp.send_budget();
    // Presence plus three attempts at 10s, with 0.5s + 1s of backoff.
    assert_eq!(budget, std::time::Duration::from_millis(41_500));
    assert!(std::time::Duration::from_secs(cfg.jobs.item_timeout_secs) >= budget);
    assert!(validate(&cfg).is_ok());
}

#[test]
fn test_validate_rejects_item_timeout_shorter_than_send_retries() {
    let mut cfg = Config::default();
    cfg.whatsapp.request_timeout_secs = 30;
    let err = validate(&cfg).unwrap_err().to_string();
    assert!(err.contains("item_timeout_secs"), "{err}");

    cfg.jobs.item_timeout_secs = 125;
    assert!(validate(&cfg).is_ok());
}

#[test]
fn test_request_timeout_from_toml() {
    let cfg: Config = toml::from_str("[whatsapp]\nrequest_timeout_secs = 5\n").unwrap();
    assert_eq!(cfg.whatsapp.request_timeout_secs, 5);
    assert!(cfg.whatsapp.enabled);
}
