use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `NOTIFY__` and an optional TOML config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub nats: NatsConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_urls")]
    pub urls: Vec<String>,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_lock_prefix")]
    pub lock_prefix: String,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LockBackend {
    #[default]
    Local,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockConfig {
    #[serde(default)]
    pub backend: LockBackend,
    /// Lease length; a holder that crashes loses the lock after this long.
    #[serde(default = "default_lock_ttl_secs")]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    #[default]
    Local,
    Nats,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub backend: QueueBackend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    #[serde(default = "default_nats_urls")]
    pub urls: Vec<String>,
    #[serde(default = "default_subject")]
    pub subject: String,
    #[serde(default = "default_queue_group")]
    pub queue_group: String,
    #[serde(default = "default_nats_max_reconnects")]
    pub max_reconnects: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_count")]
    pub count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_enabled")]
    pub enabled: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

// ─── Rate Limits ────────────────────────────────────────────────────────────

/// Longest accepted rate-limit window: one leap year.
pub const MAX_RATE_LIMIT_WINDOW_SECS: u64 = 366 * 24 * 60 * 60;

/// `limit` sends per rolling `window_secs` for a single recipient.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub limit: u32,
    pub window_secs: u64,
}

impl RateLimitPolicy {
    pub fn per_hour(limit: u32) -> Self {
        Self {
            limit,
            window_secs: 3600,
        }
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::per_hour(100)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitsConfig {
    #[serde(default = "default_limited")]
    pub email: Option<RateLimitPolicy>,
    #[serde(default = "default_limited")]
    pub chat: Option<RateLimitPolicy>,
    #[serde(default)]
    pub sms: Option<RateLimitPolicy>,
    #[serde(default)]
    pub webhook: Option<RateLimitPolicy>,
}

// ─── Channels ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub email: EmailChannelConfig,
    #[serde(default)]
    pub chat: ChatChannelConfig,
    #[serde(default)]
    pub sms: SmsChannelConfig,
    #[serde(default)]
    pub webhook: WebhookChannelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailChannelConfig {
    #[serde(default = "default_from_address")]
    pub from_address: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    #[serde(default = "default_subject_line")]
    pub default_subject: String,
    /// HTTP mail API endpoint. Required when `mock` is false.
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default = "default_mock")]
    pub mock: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChannelConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_chat_username")]
    pub username: String,
    #[serde(default = "default_mock")]
    pub mock: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmsChannelConfig {
    #[serde(default = "default_from_number")]
    pub from_number: String,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default = "default_mock")]
    pub mock: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookChannelConfig {
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_mock")]
    pub mock: bool,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_redis_urls() -> Vec<String> {
    vec!["redis://localhost:6379".to_string()]
}
fn default_key_prefix() -> String {
    "notify".to_string()
}
fn default_lock_prefix() -> String {
    "notify:lock".to_string()
}
fn default_lock_ttl_secs() -> u64 {
    300
}
fn default_nats_urls() -> Vec<String> {
    vec!["nats://localhost:4222".to_string()]
}
fn default_subject() -> String {
    "notifications.send".to_string()
}
fn default_queue_group() -> String {
    "send-workers".to_string()
}
fn default_nats_max_reconnects() -> usize {
    60
}
fn default_worker_count() -> usize {
    4
}
fn default_retry_enabled() -> bool {
    true
}
fn default_max_retries() -> u32 {
    3
}
fn default_sweep_interval_secs() -> u64 {
    300
}
fn default_limited() -> Option<RateLimitPolicy> {
    Some(RateLimitPolicy::default())
}
fn default_from_address() -> String {
    "noreply@notifications.local".to_string()
}
fn default_from_name() -> String {
    "Notifications".to_string()
}
fn default_subject_line() -> String {
    "Notification".to_string()
}
fn default_chat_username() -> String {
    "Notification Bot".to_string()
}
fn default_from_number() -> String {
    "+10000000000".to_string()
}
fn default_http_timeout_secs() -> u64 {
    10
}
fn default_mock() -> bool {
    true
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            urls: default_redis_urls(),
            key_prefix: default_key_prefix(),
            lock_prefix: default_lock_prefix(),
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            backend: LockBackend::default(),
            ttl_secs: default_lock_ttl_secs(),
        }
    }
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            urls: default_nats_urls(),
            subject: default_subject(),
            queue_group: default_queue_group(),
            max_reconnects: default_nats_max_reconnects(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_retry_enabled(),
            max_retries: default_max_retries(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            email: default_limited(),
            chat: default_limited(),
            sms: None,
            webhook: None,
        }
    }
}

impl Default for EmailChannelConfig {
    fn default() -> Self {
        Self {
            from_address: default_from_address(),
            from_name: default_from_name(),
            default_subject: default_subject_line(),
            api_url: None,
            mock: default_mock(),
        }
    }
}

impl Default for ChatChannelConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            username: default_chat_username(),
            mock: default_mock(),
        }
    }
}

impl Default for SmsChannelConfig {
    fn default() -> Self {
        Self {
            from_number: default_from_number(),
            api_url: None,
            mock: default_mock(),
        }
    }
}

impl Default for WebhookChannelConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout_secs(),
            mock: default_mock(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            store: StoreConfig::default(),
            redis: RedisConfig::default(),
            lock: LockConfig::default(),
            queue: QueueConfig::default(),
            nats: NatsConfig::default(),
            workers: WorkerConfig::default(),
            retry: RetryConfig::default(),
            rate_limits: RateLimitsConfig::default(),
            channels: ChannelsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file, overridden by
    /// environment variables. The result is validated before it is returned.
    pub fn load_from(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("NOTIFY")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("redis.urls")
                .with_list_parse_key("nats.urls"),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or panic the timers built from them.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.retry.sweep_interval_secs == 0 {
            return Err(config::ConfigError::Message(
                "retry.sweep_interval_secs must be greater than zero".into(),
            ));
        }
        if self.lock.ttl_secs == 0 {
            return Err(config::ConfigError::Message(
                "lock.ttl_secs must be greater than zero".into(),
            ));
        }
        let limits = [
            ("email", self.rate_limits.email),
            ("chat", self.rate_limits.chat),
            ("sms", self.rate_limits.sms),
            ("webhook", self.rate_limits.webhook),
        ];
        for (channel, policy) in limits {
            let Some(policy) = policy else { continue };
            if policy.window_secs == 0 || policy.window_secs > MAX_RATE_LIMIT_WINDOW_SECS {
                return Err(config::ConfigError::Message(format!(
                    "rate_limits.{channel}.window_secs must be between 1 and {MAX_RATE_LIMIT_WINDOW_SECS}"
                )));
            }
        }
        Ok(())
    }
}
