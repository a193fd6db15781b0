use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid value {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Process configuration, read from `BANGUMI_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: String,
    pub data_url: String,
    pub cache_ttl: Duration,
    pub fetch_timeout: Duration,
    pub require_api_key: bool,
    pub api_keys: Vec<String>,
    pub cors_origins: Vec<String>,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            data_url: bangumi_catalog::DEFAULT_DATA_URL.to_string(),
            cache_ttl: Duration::from_secs(3600),
            fetch_timeout: Duration::from_secs(30),
            require_api_key: false,
            api_keys: Vec::new(),
            cors_origins: vec!["*".to_string()],
            log_format: LogFormat::Text,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unset or blank variables keep
    /// their defaults; malformed ones are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(bind) = get("BANGUMI_BIND") {
            config.bind = bind;
        }
        if let Some(url) = get("BANGUMI_DATA_URL") {
            config.data_url = url;
        }
        if let Some(v) = get("BANGUMI_CACHE_TTL") {
            config.cache_ttl = Duration::from_secs(parse_secs("BANGUMI_CACHE_TTL", &v)?);
        }
        if let Some(v) = get("BANGUMI_FETCH_TIMEOUT") {
            let secs = parse_secs("BANGUMI_FETCH_TIMEOUT", &v)?;
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    var: "BANGUMI_FETCH_TIMEOUT",
                    value: v,
                    reason: "must be at least 1 second",
                });
            }
            config.fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = get("BANGUMI_REQUIRE_API_KEY") {
            config.require_api_key = parse_bool("BANGUMI_REQUIRE_API_KEY", &v)?;
        }
        if let Some(v) = get("BANGUMI_API_KEYS") {
            config.api_keys = split_list(&v);
        }
        if let Some(v) = get("BANGUMI_CORS_ORIGINS") {
            config.cors_origins = split_list(&v);
        }
        if let Some(v) = get("BANGUMI_LOG_FORMAT") {
            config.log_format = match v.trim().to_ascii_lowercase().as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "BANGUMI_LOG_FORMAT",
                        value: v,
                        reason: "expected text or json",
                    });
                }
            };
        }

        Ok(config)
    }
}

fn parse_secs(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: "expected a whole number of seconds",
    })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "expected true or false",
        }),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.cache_ttl, Duration::from_secs(3600));
        assert_eq!(config.cors_origins, vec!["*"]);
    }

    #[test]
    fn reads_all_variables() {
        let config = config_from(&[
            ("BANGUMI_BIND", "127.0.0.1:9000"),
            ("BANGUMI_DATA_URL", "http://localhost/data.json"),
            ("BANGUMI_CACHE_TTL", "60"),
            ("BANGUMI_FETCH_TIMEOUT", "5"),
            ("BANGUMI_REQUIRE_API_KEY", "true"),
            ("BANGUMI_API_KEYS", "alpha, beta,,"),
            ("BANGUMI_CORS_ORIGINS", "https://a.example,https://b.example"),
            ("BANGUMI_LOG_FORMAT", "JSON"),
        ])
        .unwrap();

        assert_eq!(config.bind, "127.0.0.1:9000");
        assert_eq!(config.data_url, "http://localhost/data.json");
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.fetch_timeout, Duration::from_secs(5));
        assert!(config.require_api_key);
        assert_eq!(config.api_keys, vec!["alpha", "beta"]);
        assert_eq!(config.cors_origins.len(), 2);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn malformed_values_are_errors() {
        let err = config_from(&[("BANGUMI_CACHE_TTL", "an hour")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "BANGUMI_CACHE_TTL", .. }));

        assert!(config_from(&[("BANGUMI_REQUIRE_API_KEY", "maybe")]).is_err());
        assert!(config_from(&[("BANGUMI_FETCH_TIMEOUT", "0")]).is_err());
        assert!(config_from(&[("BANGUMI_LOG_FORMAT", "xml")]).is_err());
    }

    #[test]
    fn blank_values_keep_defaults() {
        let config = config_from(&[("BANGUMI_CACHE_TTL", "  "), ("BANGUMI_BIND", "")]).unwrap();
        assert_eq!(config.cache_ttl, Duration::from_secs(3600));
        assert_eq!(config.bind, "0.0.0.0:8000");
    }
}
