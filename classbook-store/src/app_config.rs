use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub business_rules: BusinessRules,
    #[serde(default)]
    pub refund: RefundConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// Retained by the platform on every refund
    pub service_fee: Decimal,
    /// Minimum notice for a refund, inclusive
    #[serde(default = "default_refund_window")]
    pub refund_window_hours: i64,
}

fn default_refund_window() -> i64 { 24 }

#[derive(Debug, Deserialize, Clone)]
pub struct RefundConfig {
    /// Latency of the simulated gateway
    pub simulated_delay_ms: u64,
}

impl Default for RefundConfig {
    fn default() -> Self {
        Self { simulated_delay_ms: 1500 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SnapshotConfig {
    pub enabled: bool,
    pub path: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "data/bookings.json".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `CLASSBOOK__BUSINESS_RULES__SERVICE_FEE=2.50`
            .add_source(config::Environment::with_prefix("CLASSBOOK").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Build from an inline TOML document (tests, embedded defaults)
    pub fn from_toml(source: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}
