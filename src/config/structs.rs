//! Static configuration, loaded once at startup.
//!
//! Priority: ENV > config.toml > defaults.
//! ENV prefix `LG`, separator `__`, e.g. `LG__SERVER__PORT=9999`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StaticConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub domains: DomainsConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl StaticConfig {
    /// Load from `config.toml` (optional) with `LG__`-prefixed env overrides.
    pub fn load() -> Self {
        use config::{Config, Environment, File};

        let path = "config.toml";

        let builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("LG")
                    .separator("__")
                    .try_parsing(true),
            );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<StaticConfig>() {
                Ok(config) => {
                    if std::path::Path::new(path).exists() {
                        eprintln!("[INFO] Configuration loaded from: {}", path);
                    }
                    config
                }
                Err(e) => {
                    eprintln!("[ERROR] Failed to deserialize config: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("[ERROR] Failed to build config: {}", e);
                Self::default()
            }
        }
    }

    /// Generate a sample TOML configuration file
    pub fn generate_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config)
            .unwrap_or_else(|e| format!("Error generating sample config: {}", e))
    }

    pub fn save_to_file<P: AsRef<std::path::Path>>(
        &self,
        path: P,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default)]
    pub unix_socket: Option<String>,
    #[serde(default = "default_cpu_count")]
    pub cpu_count: usize,
    /// CIDR ranges whose forwarded headers are trusted. Private/loopback
    /// peers are always trusted so local reverse proxies work untouched.
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_database_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_database_timeout")]
    pub timeout: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

/// Shared KV + click buffer backend. When `enabled` is false every KV-backed
/// feature (rate limiting, de-dup, buffering) falls back to the in-process
/// implementations, which is only sensible for a single instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_redis_key_prefix")]
    pub key_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainsConfig {
    /// First-party apex, e.g. "slugy.co"; bio/app/admin/assets subdomains
    /// hang off this.
    #[serde(default = "default_root_domain")]
    pub root_domain: String,
    /// Where `GET /` on the root domain is sent.
    #[serde(default = "default_app_url")]
    pub app_redirect_url: String,
    /// Landing page for expired links without their own expiration URL.
    #[serde(default = "default_expired_url")]
    pub expired_fallback_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    #[serde(default = "default_api_max_requests")]
    pub api_max_requests: u64,
    #[serde(default = "default_api_window_secs")]
    pub api_window_secs: u64,
    #[serde(default = "default_fast_max_requests")]
    pub fast_max_requests: u64,
    #[serde(default = "default_fast_window_secs")]
    pub fast_window_secs: u64,
    /// Regexes selecting the higher-throughput tier for cheap endpoints.
    #[serde(default = "default_fast_patterns")]
    pub fast_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_cookie")]
    pub cookie_name: String,
    /// HS256 key for the session cookie. Empty disables session resolution
    /// (every protected route sees no session).
    #[serde(default)]
    pub jwt_secret: String,
    /// Paths and prefixes that never trigger session resolution.
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Per-(ip, slug) suppression window for double-fires.
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,
    /// External usage-increment endpoint. None = apply increments in
    /// process against the local usage cache.
    #[serde(default)]
    pub usage_endpoint: Option<String>,
    #[serde(default)]
    pub warehouse: WarehouseConfig,
}

/// Columnar warehouse ingest over HTTP (NDJSON rows appended to a named
/// datasource). Absent endpoint means events are logged instead of shipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_warehouse_datasource")]
    pub datasource: String,
    #[serde(default = "default_warehouse_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Window covered when the cron endpoint does not supply one.
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u64,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Hard cap on one workspace group's transaction.
    #[serde(default = "default_txn_timeout_secs")]
    pub txn_timeout_secs: u64,
    /// HS256 key the cron trigger must sign its requests with. Empty
    /// disables the endpoint.
    #[serde(default)]
    pub signing_key: String,
    /// Internal schedule in seconds; 0 = externally triggered only.
    #[serde(default)]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_link_capacity")]
    pub link_capacity: u64,
    #[serde(default = "default_link_ttl_secs")]
    pub link_ttl_secs: u64,
    #[serde(default = "default_classifier_capacity")]
    pub classifier_capacity: u64,
    #[serde(default = "default_usage_capacity")]
    pub usage_capacity: u64,
    #[serde(default = "default_usage_ttl_secs")]
    pub usage_ttl_secs: u64,
    #[serde(default = "default_domain_capacity")]
    pub domain_capacity: u64,
    #[serde(default = "default_domain_ttl_secs")]
    pub domain_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// GeoLite2-City.mmdb path. Readable file enables local lookups for
    /// clients that arrive without trusted geo headers.
    #[serde(default)]
    pub maxminddb_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_log_file")]
    pub file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_enable_rotation")]
    pub enable_rotation: bool,
}

// ============================================================
// Default value functions
// ============================================================

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_cpu_count() -> usize {
    num_cpus::get()
}

fn default_database_url() -> String {
    "linkgate.db".to_string()
}

fn default_database_pool_size() -> u32 {
    10
}

fn default_database_timeout() -> u64 {
    30
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    2000
}

fn default_redis_enabled() -> bool {
    false
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

fn default_redis_key_prefix() -> String {
    "linkgate:".to_string()
}

fn default_root_domain() -> String {
    "slugy.co".to_string()
}

fn default_app_url() -> String {
    "https://app.slugy.co".to_string()
}

fn default_expired_url() -> String {
    "https://slugy.co/expired".to_string()
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_api_max_requests() -> u64 {
    10
}

fn default_api_window_secs() -> u64 {
    10
}

fn default_fast_max_requests() -> u64 {
    50
}

fn default_fast_window_secs() -> u64 {
    10
}

fn default_fast_patterns() -> Vec<String> {
    vec![
        "^/api/redirect/".to_string(),
        "^/api/links/exists".to_string(),
        "^/api/metadata".to_string(),
    ]
}

fn default_session_cookie() -> String {
    "lg_session".to_string()
}

fn default_public_paths() -> Vec<String> {
    vec![
        "/".to_string(),
        "/login".to_string(),
        "/register".to_string(),
        "/pricing".to_string(),
        "/health".to_string(),
        "/api/auth/".to_string(),
        "/api/redirect/".to_string(),
        "/api/analytics/".to_string(),
        "/api/cron/".to_string(),
    ]
}

fn default_dedup_window_secs() -> u64 {
    5
}

fn default_warehouse_datasource() -> String {
    "click_events".to_string()
}

fn default_warehouse_timeout_secs() -> u64 {
    5
}

fn default_lookback_hours() -> u64 {
    4
}

fn default_max_batch_size() -> usize {
    1000
}

fn default_txn_timeout_secs() -> u64 {
    10
}

fn default_link_capacity() -> u64 {
    10_000
}

fn default_link_ttl_secs() -> u64 {
    60
}

fn default_classifier_capacity() -> u64 {
    4096
}

fn default_usage_capacity() -> u64 {
    4096
}

fn default_usage_ttl_secs() -> u64 {
    30
}

fn default_domain_capacity() -> u64 {
    2048
}

fn default_domain_ttl_secs() -> u64 {
    120
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_file() -> Option<String> {
    None
}

fn default_max_backups() -> u32 {
    5
}

fn default_enable_rotation() -> bool {
    true
}

// ============================================================
// Default implementations
// ============================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            unix_socket: None,
            cpu_count: default_cpu_count(),
            trusted_proxies: Vec::new(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            pool_size: default_database_pool_size(),
            timeout: default_database_timeout(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: default_redis_url(),
            key_prefix: default_redis_key_prefix(),
        }
    }
}

impl Default for DomainsConfig {
    fn default() -> Self {
        Self {
            root_domain: default_root_domain(),
            app_redirect_url: default_app_url(),
            expired_fallback_url: default_expired_url(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            api_max_requests: default_api_max_requests(),
            api_window_secs: default_api_window_secs(),
            fast_max_requests: default_fast_max_requests(),
            fast_window_secs: default_fast_window_secs(),
            fast_patterns: default_fast_patterns(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_session_cookie(),
            jwt_secret: String::new(),
            public_paths: default_public_paths(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: default_dedup_window_secs(),
            usage_endpoint: None,
            warehouse: WarehouseConfig::default(),
        }
    }
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            token: None,
            datasource: default_warehouse_datasource(),
            timeout_secs: default_warehouse_timeout_secs(),
        }
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            lookback_hours: default_lookback_hours(),
            max_batch_size: default_max_batch_size(),
            txn_timeout_secs: default_txn_timeout_secs(),
            signing_key: String::new(),
            interval_secs: 0,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            link_capacity: default_link_capacity(),
            link_ttl_secs: default_link_ttl_secs(),
            classifier_capacity: default_classifier_capacity(),
            usage_capacity: default_usage_capacity(),
            usage_ttl_secs: default_usage_ttl_secs(),
            domain_capacity: default_domain_capacity(),
            domain_ttl_secs: default_domain_ttl_secs(),
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            maxminddb_path: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: default_log_file(),
            max_backups: default_max_backups(),
            enable_rotation: default_enable_rotation(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let config = StaticConfig::default();
        assert_eq!(config.domains.root_domain, "slugy.co");
        assert_eq!(config.rate_limit.api_max_requests, 10);
        assert!(config.rate_limit.fast_max_requests > config.rate_limit.api_max_requests);
        assert_eq!(config.reconciler.lookback_hours, 4);
        assert!(config.cache.link_capacity > 0);
    }

    #[test]
    fn sample_config_round_trips() {
        let sample = StaticConfig::generate_sample_config();
        let parsed: StaticConfig = toml::from_str(&sample).expect("sample must parse");
        assert_eq!(parsed.domains.root_domain, "slugy.co");
        assert_eq!(parsed.dispatch.dedup_window_secs, 5);
    }

    #[test]
    fn fast_patterns_default_nonempty() {
        let config = RateLimitConfig::default();
        assert!(!config.fast_patterns.is_empty());
        for p in &config.fast_patterns {
            assert!(p.starts_with('^'), "patterns are anchored: {}", p);
        }
    }
}
