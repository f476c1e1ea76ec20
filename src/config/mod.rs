use std::env;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub fixtures: FixtureConfig,
    pub latency: LatencyConfig,
    pub validation: ValidationConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
}

/// Listener configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Seed data configuration
#[derive(Debug, Clone)]
pub struct FixtureConfig {
    pub seed: u64,
    pub source_count: usize,
    pub plugin_count: usize,
    pub versions_per_source: usize,
}

/// Artificial network delay applied to every request
#[derive(Debug, Clone, PartialEq)]
pub struct LatencyConfig {
    pub min_ms: u64,
    pub max_ms: u64,
}

/// Server-side checks that the dashboard normally performs client-side
#[derive(Debug, Clone, Default)]
pub struct ValidationConfig {
    /// Reject tier policies with `from_tier_id == to_tier_id` and
    /// composite policies with fewer than two children.
    pub strict: bool,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Typed client request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let server = ServerConfig {
            host: env::var("MOCK_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env_parse("MOCK_PORT", 8765),
        };

        let fixtures = FixtureConfig {
            seed: env_parse("FIXTURE_SEED", 42),
            source_count: env_parse("FIXTURE_SOURCE_COUNT", 8),
            plugin_count: env_parse("FIXTURE_PLUGIN_COUNT", 24),
            versions_per_source: env_parse("FIXTURE_VERSIONS_PER_SOURCE", 4),
        };

        let latency = LatencyConfig {
            min_ms: env_parse("MOCK_DELAY_MIN_MS", 50),
            max_ms: env_parse("MOCK_DELAY_MAX_MS", 250),
        };
        if latency.min_ms > latency.max_ms {
            return Err(AppError::Config {
                message: format!(
                    "MOCK_DELAY_MIN_MS ({}) exceeds MOCK_DELAY_MAX_MS ({})",
                    latency.min_ms, latency.max_ms
                ),
            });
        }

        let validation = ValidationConfig {
            strict: matches!(
                env::var("MOCK_STRICT_VALIDATION")
                    .unwrap_or_default()
                    .to_lowercase()
                    .as_str(),
                "1" | "true" | "yes"
            ),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env_parse("REQUEST_TIMEOUT_MS", 30000),
        };

        Ok(Config {
            server,
            fixtures,
            latency,
            validation,
            logging,
            request,
        })
    }

    /// Socket address string for the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            fixtures: FixtureConfig::default(),
            latency: LatencyConfig::default(),
            validation: ValidationConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
            request: RequestConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
        }
    }
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            source_count: 8,
            plugin_count: 24,
            versions_per_source: 4,
        }
    }
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            min_ms: 50,
            max_ms: 250,
        }
    }
}

impl LatencyConfig {
    /// No artificial delay.
    pub fn disabled() -> Self {
        Self {
            min_ms: 0,
            max_ms: 0,
        }
    }

    /// Whether any delay will be applied.
    pub fn is_enabled(&self) -> bool {
        self.max_ms > 0
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self { timeout_ms: 30000 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8765);
        assert_eq!(config.fixtures.seed, 42);
        assert_eq!(config.latency, LatencyConfig { min_ms: 50, max_ms: 250 });
        assert!(!config.validation.strict);
        assert_eq!(config.bind_address(), "127.0.0.1:8765");
    }

    #[test]
    fn test_latency_disabled() {
        let latency = LatencyConfig::disabled();
        assert!(!latency.is_enabled());
        assert!(LatencyConfig::default().is_enabled());
    }
}
