//! Default value functions used by serde for config deserialization.

pub fn default_name() -> String {
    "wacast".to_string()
}

pub fn default_owner_name() -> String {
    "owner".to_string()
}

pub fn default_data_dir() -> String {
    "~/.wacast".to_string()
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_prefix() -> String {
    ".".to_string()
}

pub fn default_country_code() -> String {
    "254".to_string()
}

pub fn default_true() -> bool {
    true
}

pub fn default_bridge_url() -> String {
    "http://127.0.0.1:8085".to_string()
}

pub fn default_bridge_request_timeout_secs() -> u64 {
    10
}

pub fn default_flush_every() -> usize {
    5
}

pub fn default_min_delay_secs() -> u64 {
    30
}

pub fn default_max_delay_secs() -> u64 {
    60
}

pub fn default_item_timeout_secs() -> u64 {
    45
}

pub fn default_progress_every() -> usize {
    5
}

pub fn default_broadcast_message() -> String {
    "Hello {name}, thanks for staying in touch. Please save my number.".to_string()
}

pub fn default_greeting() -> String {
    "Hello {name}, I'm another status viewer. Can we be friends? \
     Please save my number. Your contact is already saved in my phone."
        .to_string()
}

pub fn default_upload_timeout_secs() -> u64 {
    300
}

pub fn default_max_download_bytes() -> usize {
    10 * 1024 * 1024
}

pub fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

pub fn default_api_port() -> u16 {
    3000
}

pub fn default_keepalive_interval() -> u64 {
    300
}
