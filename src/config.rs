use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_CACHE_TTL_SECS: u64 = 30;
const DEFAULT_STORE_TIMEOUT_MS: u64 = 2000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} missing, it is required")]
    Missing(&'static str),
    #[error("{name} must be a valid {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub admin_api_key: String,
    pub cache_ttl: Duration,
    pub store_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv().is_ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = parse(&lookup, "PORT", "u16 number")?.ok_or(ConfigError::Missing("PORT"))?;

        let admin_api_key = lookup("ADMIN_API_KEY")
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::Missing("ADMIN_API_KEY"))?;

        let cache_ttl_secs = parse(&lookup, "CACHE_TTL_SECS", "number of seconds")?
            .unwrap_or(DEFAULT_CACHE_TTL_SECS);
        let store_timeout_ms = parse(&lookup, "STORE_TIMEOUT_MS", "number of milliseconds")?
            .unwrap_or(DEFAULT_STORE_TIMEOUT_MS);

        Ok(Self {
            port,
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            admin_api_key,
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            store_timeout: Duration::from_millis(store_timeout_ms),
        })
    }

    pub fn addr(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    expected: &'static str,
) -> Result<Option<T>, ConfigError> {
    lookup(name)
        .map(|value| {
            value.parse().map_err(|_| ConfigError::Invalid {
                name,
                expected,
                value,
            })
        })
        .transpose()
}
