use crate::record::Attribute;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_path: String,
    pub bind_addr: String,
    pub port: u16,
    pub timeline_buckets: usize,
    pub primary: Attribute,
    pub secondary: Attribute,
    pub request_timeout_ms: u64,
    pub max_body_bytes: usize,
    /// Upper bound on a per-request `timeline_buckets` override.
    pub max_timeline_buckets: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_path: "data/incidents.csv".to_string(),
            bind_addr: "127.0.0.1".to_string(),
            port: 8765,
            timeline_buckets: 100,
            primary: Attribute::SharkType,
            secondary: Attribute::VictimActivity,
            request_timeout_ms: 5000,
            max_body_bytes: 1 << 20,
            max_timeline_buckets: 1_000,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            data_path: std::env::var("DATA_PATH").unwrap_or(d.data_path),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(d.bind_addr),
            port: env_parse("PORT").unwrap_or(d.port),
            timeline_buckets: env_parse("TIMELINE_BUCKETS").unwrap_or(d.timeline_buckets),
            primary: env_parse("PRIMARY_VAR").unwrap_or(d.primary),
            secondary: env_parse("SECONDARY_VAR").unwrap_or(d.secondary),
            request_timeout_ms: env_parse("REQUEST_TIMEOUT_MS").unwrap_or(d.request_timeout_ms),
            max_body_bytes: env_parse("MAX_BODY_BYTES").unwrap_or(d.max_body_bytes),
            max_timeline_buckets: env_parse("MAX_TIMELINE_BUCKETS")
                .unwrap_or(d.max_timeline_buckets),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
