use std::{str::FromStr, time::Duration};

use anyhow::{Context, Result};
use companies_core::UpdatePolicy;
use config::{Config, File, FileFormat};
use serde::Deserialize;

pub const CONFIG_PATH_VAR: &str = "COMPANIES_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/companies.yaml";

/// Environment variables that override a config-file key of the same meaning.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("DB_USER", "db.user"),
    ("DB_PASSWORD", "db.password"),
    ("DB_HOST", "db.host"),
    ("DB_PORT", "db.port"),
    ("DB_NAME", "db.name"),
    ("DB_MAX_CONNECTIONS", "db.max_connections"),
    ("DB_READINESS_MAX_WAIT_SECONDS", "db.readiness.max_wait_seconds"),
    ("DB_READINESS_POLL_INTERVAL_MS", "db.readiness.poll_interval_ms"),
    ("REDIS_URL", "bus.redis_url"),
    ("EVENTS_TOPIC", "bus.topic"),
    ("EVENTS_PUBLISH_TIMEOUT_MS", "bus.publish_timeout_ms"),
    ("BUS_READINESS_MAX_WAIT_SECONDS", "bus.readiness.max_wait_seconds"),
    ("BUS_READINESS_POLL_INTERVAL_MS", "bus.readiness.poll_interval_ms"),
    ("HTTP_HOST", "http.host"),
    ("HTTP_PORT", "http.port"),
    ("HTTP_REQUEST_TIMEOUT_SECONDS", "http.request_timeout_seconds"),
    ("JWT_SECRET", "auth.jwt_secret"),
    ("JWT_TTL_SECONDS", "auth.token_ttl_seconds"),
    ("AUTH_USERNAME", "auth.username"),
    ("AUTH_PASSWORD", "auth.password"),
    ("UPDATE_POLICY", "records.update_policy"),
    ("STORE_BACKEND", "records.store_backend"),
];

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub db: DbConfig,
    pub bus: BusConfig,
    pub http: HttpConfig,
    pub auth: AuthConfig,
    pub records: RecordsConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub max_wait_seconds: u64,
    pub poll_interval_ms: u64,
}

impl ReadinessConfig {
    fn waiting(max_wait_seconds: u64) -> Self {
        Self {
            max_wait_seconds,
            poll_interval_ms: 500,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.max_wait_seconds)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self::waiting(30)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub readiness: ReadinessConfig,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            name: "companies".to_string(),
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            max_connections: 10,
            acquire_timeout_seconds: 5,
            readiness: ReadinessConfig::waiting(30),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub redis_url: String,
    pub topic: String,
    pub publish_timeout_ms: u64,
    pub readiness: ReadinessConfig,
}

impl BusConfig {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            topic: "data-changed".to_string(),
            publish_timeout_ms: 5_000,
            readiness: ReadinessConfig::waiting(60),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_seconds: u64,
}

impl HttpConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_seconds: 15,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_seconds: i64,
    pub username: String,
    pub password: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "default-secret".to_string(),
            token_ttl_seconds: 3600,
            username: "admin".to_string(),
            password: "password".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(try_from = "String")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown store backend {other:?}")),
        }
    }
}

impl TryFrom<String> for StoreBackend {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RecordsConfig {
    pub update_policy: UpdatePolicy,
    pub store_backend: StoreBackend,
}

impl ServiceConfig {
    /// Loads the YAML file named by `COMPANIES_CONFIG` (optional) and applies
    /// environment overrides on top of it.
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let file = File::new(&path, FileFormat::Yaml).required(false);

        Self::build(Config::builder().add_source(file), |key| {
            std::env::var(key).ok()
        })
        .with_context(|| format!("failed to load configuration from {path}"))
    }

    /// Same as [`ServiceConfig::load`] with the file contents and the
    /// environment supplied by the caller.
    pub fn from_yaml<F>(yaml: &str, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::build(
            Config::builder().add_source(File::from_str(yaml, FileFormat::Yaml)),
            env,
        )
    }

    fn build<F>(
        mut builder: config::ConfigBuilder<config::builder::DefaultState>,
        env: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // A partial `readiness` table would otherwise fall back to
        // `ReadinessConfig::default()` instead of the per-dependency wait.
        builder = builder
            .set_default(
                "db.readiness.max_wait_seconds",
                DbConfig::default().readiness.max_wait_seconds,
            )?
            .set_default(
                "bus.readiness.max_wait_seconds",
                BusConfig::default().readiness.max_wait_seconds,
            )?;

        for (var, key) in ENV_OVERRIDES {
            let value = env(var).filter(|value| !value.is_empty());
            builder = builder
                .set_override_option(*key, value)
                .with_context(|| format!("invalid override {var}"))?;
        }

        builder
            .build()
            .context("failed to merge configuration sources")?
            .try_deserialize()
            .context("failed to deserialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const YAML: &str = r#"
db:
  host: db.internal
  port: 6543
  name: registry
  user: svc
  password: secret
  readiness:
    max_wait_seconds: 12
bus:
  redis_url: redis://bus.internal:6379
http:
  port: 9090
records:
  update_policy: merge
"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn file_values_fill_in_over_defaults() {
        let config = ServiceConfig::from_yaml(YAML, env(&[])).unwrap();

        assert_eq!(config.db.host, "db.internal");
        assert_eq!(config.db.port, 6543);
        assert_eq!(config.db.max_connections, 10);
        assert_eq!(config.db.readiness.timeout(), Duration::from_secs(12));
        assert_eq!(config.db.readiness.interval(), Duration::from_millis(500));
        assert_eq!(config.bus.topic, "data-changed");
        assert_eq!(config.bus.readiness.max_wait_seconds, 60);
        assert_eq!(config.http.bind_addr(), "0.0.0.0:9090");
        assert_eq!(config.records.update_policy, UpdatePolicy::Merge);
        assert_eq!(config.records.store_backend, StoreBackend::Postgres);
    }

    #[test]
    fn environment_wins_over_file() {
        let config = ServiceConfig::from_yaml(
            YAML,
            env(&[
                ("DB_HOST", "override.internal"),
                ("DB_PORT", "7000"),
                ("HTTP_PORT", "8081"),
                ("JWT_SECRET", "s3cr3t"),
                ("UPDATE_POLICY", "overwrite"),
                ("STORE_BACKEND", "memory"),
            ]),
        )
        .unwrap();

        assert_eq!(config.db.host, "override.internal");
        assert_eq!(config.db.port, 7000);
        assert_eq!(config.db.name, "registry");
        assert_eq!(config.http.port, 8081);
        assert_eq!(config.auth.jwt_secret, "s3cr3t");
        assert_eq!(config.records.update_policy, UpdatePolicy::Overwrite);
        assert_eq!(config.records.store_backend, StoreBackend::Memory);
    }

    #[test]
    fn empty_environment_value_is_ignored() {
        let config = ServiceConfig::from_yaml(YAML, env(&[("DB_USER", "")])).unwrap();

        assert_eq!(config.db.user, "svc");
    }

    #[test]
    fn unparsable_override_is_an_error() {
        let result = ServiceConfig::from_yaml(YAML, env(&[("HTTP_PORT", "eighty")]));

        assert!(result.is_err());
    }

    #[test]
    fn partial_readiness_override_keeps_dependency_wait() {
        let config = ServiceConfig::from_yaml(
            "",
            env(&[
                ("BUS_READINESS_POLL_INTERVAL_MS", "250"),
                ("DB_READINESS_POLL_INTERVAL_MS", "100"),
            ]),
        )
        .unwrap();

        assert_eq!(config.bus.readiness.interval(), Duration::from_millis(250));
        assert_eq!(config.bus.readiness.max_wait_seconds, 60);
        assert_eq!(config.db.readiness.interval(), Duration::from_millis(100));
        assert_eq!(config.db.readiness.max_wait_seconds, 30);
    }

    #[test]
    fn partial_readiness_table_in_file_keeps_dependency_wait() {
        let yaml = "bus:\n  readiness:\n    poll_interval_ms: 1000\n";

        let config = ServiceConfig::from_yaml(yaml, env(&[])).unwrap();

        assert_eq!(config.bus.readiness.max_wait_seconds, 60);
        assert_eq!(config.bus.readiness.poll_interval_ms, 1000);
    }

    #[test]
    fn enum_overrides_ignore_case() {
        let config = ServiceConfig::from_yaml(
            "",
            env(&[("UPDATE_POLICY", "Merge"), ("STORE_BACKEND", "MEMORY")]),
        )
        .unwrap();

        assert_eq!(config.records.update_policy, UpdatePolicy::Merge);
        assert_eq!(config.records.store_backend, StoreBackend::Memory);
    }

    #[test]
    fn unknown_update_policy_is_an_error() {
        let result = ServiceConfig::from_yaml("", env(&[("UPDATE_POLICY", "replace")]));

        assert!(result.is_err());
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = ServiceConfig::from_yaml("", env(&[])).unwrap();

        assert_eq!(config.db.readiness.max_wait_seconds, 30);
        assert_eq!(config.bus.publish_timeout(), Duration::from_secs(5));
        assert_eq!(config.auth.token_ttl_seconds, 3600);
        assert_eq!(config.http.request_timeout(), Duration::from_secs(15));
    }
}
