use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration, loaded from `config.yaml` (or `$CONFIG_PATH`)
/// with an environment-variable overlay (spec.md §6 "Configuration").
///
/// Env overrides use `PRICE_SVC` as the prefix and `__` as the path
/// separator, e.g. `PRICE_SVC_POSTGRES__POOL_MAX=20` overrides
/// `postgres.pool_max`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub log: Log,
    pub postgres: Postgres,
    pub grpc: Grpc,
    #[serde(default)]
    pub redis: Redis,
    pub coingecko: Coingecko,
    pub resolver: Resolver,
    #[serde(default)]
    pub fx: Fx,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
    pub url: String,
    #[serde(default = "default_pool_max")]
    pub pool_max: u32,
    #[serde(default = "default_conn_timeout")]
    pub conn_timeout_secs: u64,
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
    #[serde(default = "default_conn_attempts")]
    pub conn_attempts: u32,
}

fn default_pool_max() -> u32 {
    10
}
fn default_conn_timeout() -> u64 {
    3
}
fn default_attempt_timeout() -> u64 {
    1
}
fn default_conn_attempts() -> u32 {
    3
}

impl Postgres {
    pub fn conn_timeout(&self) -> Duration {
        Duration::from_secs(self.conn_timeout_secs)
    }
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Grpc {
    pub addr: String,
}

impl Grpc {
    pub fn socket_addr(&self) -> SocketAddr {
        self.addr.parse().expect("invalid grpc.addr")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Redis {
    pub url: Option<String>,
    #[serde(default = "default_redis_pool_max")]
    pub pool_max: u32,
    #[serde(default = "default_redis_jitter")]
    pub jitter_secs: u64,
}

impl Default for Redis {
    fn default() -> Self {
        Self {
            url: None,
            pool_max: default_redis_pool_max(),
            jitter_secs: default_redis_jitter(),
        }
    }
}

fn default_redis_pool_max() -> u32 {
    4
}
fn default_redis_jitter() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct Coingecko {
    pub api_key: String,
    pub base_url: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub rate_limit_per_min: u32,
    pub granularity_policy: GranularityPolicy,
    /// See SPEC_FULL.md §C.3 (Open Question 3): whether a point-count
    /// mismatch on a day fetch is a hard `ProviderBadResponse` or a
    /// best-effort partial fill.
    #[serde(default)]
    pub strict_point_count: bool,
}

fn default_currency() -> String {
    "usd".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct GranularityPolicy {
    #[serde(rename = "5minutes")]
    pub five_minutes_secs: u64,
    #[serde(rename = "1hour")]
    pub one_hour_secs: u64,
}

impl GranularityPolicy {
    pub fn five_minutes(&self) -> Duration {
        Duration::from_secs(self.five_minutes_secs)
    }
    pub fn one_hour(&self) -> Duration {
        Duration::from_secs(self.one_hour_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Resolver {
    pub path: String,
}

/// Per-FX-source scheduling. Keyed by currency code (`RUB`, `KZT`, ...).
/// Not named explicitly in spec.md §6, which only describes the schedule
/// shape (§4.3); defaults match the original's `20:00` local fire time.
#[derive(Debug, Clone, Deserialize)]
pub struct Fx {
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default)]
    pub sources: HashMap<String, FxSourceSchedule>,
}

impl Default for Fx {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout_secs(),
            sources: HashMap::new(),
        }
    }
}

fn default_http_timeout_secs() -> u64 {
    10
}

impl Fx {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FxSourceSchedule {
    #[serde(default = "default_schedule_hour")]
    pub hour: u32,
    #[serde(default)]
    pub minute: u32,
}

fn default_schedule_hour() -> u32 {
    20
}

impl Config {
    /// Load configuration from `$CONFIG_PATH` (default `config.yaml`)
    /// layered under environment overrides, after loading `.env` in
    /// non-production environments.
    pub fn load() -> Result<Self, config::ConfigError> {
        if std::env::var("APP_ENV").as_deref() != Ok("prod") {
            dotenvy::dotenv().ok();
        }

        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".into());

        let cfg = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix("PRICE_SVC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        cfg.try_deserialize()
    }
}
