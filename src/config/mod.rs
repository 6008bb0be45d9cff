//! Runtime configuration (environment-style key/value, `.env` aware).

use std::fmt;
use std::time::Duration;

use bon::Builder;

use crate::error::{Result, ThreadlineError};

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
/// Default service name reported to the tracing collector.
pub const DEFAULT_SERVICE_NAME: &str = "threadline";

/// Complete configuration for a [`SessionRuntime`](crate::session::SessionRuntime).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub model: ModelConfig,
    pub database: DatabaseConfig,
    pub telemetry: TelemetryConfig,
}

impl RuntimeConfig {
    /// Load from process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    ///
    /// Missing database parameters are fatal; everything else has a default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let temperature = match get("TEMPERATURE") {
            Some(raw) => raw.trim().parse::<f64>().map_err(|_| {
                ThreadlineError::Configuration(format!("TEMPERATURE is not a number: '{raw}'"))
            })?,
            None => DEFAULT_TEMPERATURE,
        };
        let model = ModelConfig {
            model: get("MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature,
            system_instructions: get("SYSTEM_PROMPT"),
        };

        let target = match get("PG_URI") {
            Some(url) => ConnectionTarget::Url(url),
            None => {
                let require = |key: &'static str| {
                    get(key).ok_or_else(|| {
                        ThreadlineError::Configuration(format!(
                            "missing required setting {key} (or PG_URI)"
                        ))
                    })
                };
                ConnectionTarget::Fields {
                    host: require("DATABASE_HOST")?,
                    port: parse_or("DATABASE_PORT", get("DATABASE_PORT"), 5432u16)?,
                    database: require("DATABASE")?,
                    user: require("DATABASE_USER")?,
                    password: require("DATABASE_PASSWORD")?,
                }
            }
        };
        let database = DatabaseConfig {
            target,
            pool: PoolPolicy {
                pre_ping: parse_bool("DATABASE_POOL_PRE_PING", get("DATABASE_POOL_PRE_PING"), true)?,
                recycle_secs: parse_or(
                    "DATABASE_POOL_RECYCLE_SECS",
                    get("DATABASE_POOL_RECYCLE_SECS"),
                    PoolPolicy::DEFAULT_RECYCLE_SECS,
                )?,
                max_connections: parse_or(
                    "DATABASE_MAX_CONNECTIONS",
                    get("DATABASE_MAX_CONNECTIONS"),
                    PoolPolicy::DEFAULT_MAX_CONNECTIONS,
                )?,
                acquire_timeout_secs: parse_or(
                    "DATABASE_ACQUIRE_TIMEOUT_SECS",
                    get("DATABASE_ACQUIRE_TIMEOUT_SECS"),
                    PoolPolicy::DEFAULT_ACQUIRE_TIMEOUT_SECS,
                )?,
            },
        };
        database.validate()?;

        let telemetry = TelemetryConfig {
            endpoint: get("OTEL_EXPORTER_OTLP_ENDPOINT"),
            headers: get("OTEL_EXPORTER_OTLP_HEADERS")
                .map(|raw| parse_headers(&raw))
                .transpose()?
                .unwrap_or_default(),
            service_name: get("OTEL_SERVICE_NAME")
                .or_else(|| get("SERVICE_NAME"))
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
        };

        Ok(Self {
            model,
            database,
            telemetry,
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ThreadlineError::Configuration(format!("{key} is invalid: '{raw}'"))),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, raw: Option<String>, default: bool) -> Result<bool> {
    match raw.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(ThreadlineError::Configuration(format!(
            "{key} is not a boolean: '{v}'"
        ))),
    }
}

/// Parse `k=v,k2=v2` (the OTLP headers convention).
fn parse_headers(raw: &str) -> Result<Vec<(String, String)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                ThreadlineError::Configuration(format!("malformed OTLP header '{pair}'"))
            })?;
            Ok((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Model binding handed to the dialogue engine.
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct ModelConfig {
    #[builder(into, default = DEFAULT_MODEL.to_string())]
    pub model: String,
    #[builder(default = DEFAULT_TEMPERATURE)]
    pub temperature: f64,
    #[builder(into)]
    pub system_instructions: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Where the persistence backend connects.
#[derive(Clone, PartialEq)]
pub enum ConnectionTarget {
    Url(String),
    Fields {
        host: String,
        port: u16,
        database: String,
        user: String,
        password: String,
    },
}

impl fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionTarget::Url(_) => f.debug_tuple("Url").field(&"..").finish(),
            ConnectionTarget::Fields {
                host,
                port,
                database,
                user,
                ..
            } => f
                .debug_struct("Fields")
                .field("host", host)
                .field("port", port)
                .field("database", database)
                .field("user", user)
                .field("password", &"..")
                .finish(),
        }
    }
}

/// Connection pool policy.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolPolicy {
    /// Validate a connection before handing it out.
    pub pre_ping: bool,
    /// Close connections idle for longer than this.
    pub recycle_secs: u64,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl PoolPolicy {
    pub const DEFAULT_RECYCLE_SECS: u64 = 300;
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
    pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

    pub fn recycle_after(&self) -> Duration {
        Duration::from_secs(self.recycle_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

impl Default for PoolPolicy {
    fn default() -> Self {
        Self {
            pre_ping: true,
            recycle_secs: Self::DEFAULT_RECYCLE_SECS,
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
            acquire_timeout_secs: Self::DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

/// Persistence backend connection parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub target: ConnectionTarget,
    pub pool: PoolPolicy,
}

impl DatabaseConfig {
    /// Parameters for a URL target with the default pool policy.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            target: ConnectionTarget::Url(url.into()),
            pool: PoolPolicy::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let ConnectionTarget::Url(url) = &self.target {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(ThreadlineError::Configuration(
                    "PG_URI must be a postgres:// or postgresql:// URL".into(),
                ));
            }
        }
        if self.pool.max_connections == 0 {
            return Err(ThreadlineError::Configuration(
                "DATABASE_MAX_CONNECTIONS must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Tracing exporter settings. No endpoint means tracing export is off.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryConfig {
    pub endpoint: Option<String>,
    pub headers: Vec<(String, String)>,
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            headers: Vec::new(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}
