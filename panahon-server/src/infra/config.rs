use std::{fmt, time::Duration as StdDuration};

use clap::Args;
use panahon_core::auth::{TokenCodec, TokenTtls};
use thiserror::Error;
use zeroize::Zeroizing;

pub const DEFAULT_GLABS_BASE_URL: &str = "https://developer.globelabs.com.ph";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TOKEN_SYMMETRIC_KEY must be exactly {expected} bytes, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },
    #[error("invalid token lifetimes: {0}")]
    InvalidTtl(String),
    #[error("API_BASE_PATH must start with '/' and not end with one, got {0:?}")]
    InvalidBasePath(String),
    #[error("{0} is required")]
    Missing(&'static str),
}

/// Startup configuration, read from flags or the environment.
#[derive(Args, Clone)]
pub struct ConfigArgs {
    /// Address to bind
    #[arg(long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind
    #[arg(short, long, env = "SERVER_PORT", default_value_t = 8080)]
    pub port: u16,

    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub db_max_connections: u32,

    /// Prefix for every API route
    #[arg(long, env = "API_BASE_PATH", default_value = "/api/v1")]
    pub api_base_path: String,

    /// Symmetric key for session tokens (32 bytes)
    #[arg(long, env = "TOKEN_SYMMETRIC_KEY", hide_env_values = true)]
    pub token_symmetric_key: Option<String>,

    #[arg(
        long,
        env = "ACCESS_TOKEN_DURATION",
        default_value = "15m",
        value_parser = humantime::parse_duration
    )]
    pub access_token_duration: StdDuration,

    #[arg(
        long,
        env = "REFRESH_TOKEN_DURATION",
        default_value = "24h",
        value_parser = humantime::parse_duration
    )]
    pub refresh_token_duration: StdDuration,

    #[arg(long, env = "GLABS_APP_ID", default_value = "")]
    pub glabs_app_id: String,

    #[arg(long, env = "GLABS_APP_SECRET", default_value = "", hide_env_values = true)]
    pub glabs_app_secret: String,

    #[arg(long, env = "GLABS_BASE_URL", default_value = DEFAULT_GLABS_BASE_URL)]
    pub glabs_base_url: String,
}

impl fmt::Debug for ConfigArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigArgs")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("api_base_path", &self.api_base_path)
            .finish_non_exhaustive()
    }
}

impl ConfigArgs {
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let key = self
            .token_symmetric_key
            .ok_or(ConfigError::Missing("TOKEN_SYMMETRIC_KEY"))?;

        let config = Config {
            server: ServerConfig {
                host: self.host,
                port: self.port,
                api_base_path: self.api_base_path,
            },
            database: DatabaseConfig {
                url: self.database_url,
                max_connections: self.db_max_connections,
            },
            auth: AuthConfig {
                token_symmetric_key: Zeroizing::new(key.into_bytes()),
                access_token_duration: self.access_token_duration,
                refresh_token_duration: self.refresh_token_duration,
            },
            glabs: GlabsConfig {
                app_id: self.glabs_app_id,
                app_secret: Zeroizing::new(self.glabs_app_secret),
                base_url: self.glabs_base_url.trim_end_matches('/').to_string(),
            },
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub glabs: GlabsConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub api_base_path: String,
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url_set", &self.url.is_some())
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

#[derive(Clone)]
pub struct AuthConfig {
    pub token_symmetric_key: Zeroizing<Vec<u8>>,
    pub access_token_duration: StdDuration,
    pub refresh_token_duration: StdDuration,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_token_duration", &self.access_token_duration)
            .field("refresh_token_duration", &self.refresh_token_duration)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct GlabsConfig {
    pub app_id: String,
    pub app_secret: Zeroizing<String>,
    pub base_url: String,
}

impl fmt::Debug for GlabsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlabsConfig")
            .field("app_id", &self.app_id)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GlabsConfig {
    /// Web opt-in needs both credentials.
    pub fn is_configured(&self) -> bool {
        !self.app_id.is_empty() && !self.app_secret.is_empty()
    }
}

impl Config {
    /// Checks that are fatal at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let actual = self.auth.token_symmetric_key.len();
        if actual != TokenCodec::KEY_SIZE {
            return Err(ConfigError::InvalidKeySize {
                expected: TokenCodec::KEY_SIZE,
                actual,
            });
        }

        let access = self.auth.access_token_duration;
        let refresh = self.auth.refresh_token_duration;
        if access.is_zero() || refresh.is_zero() {
            return Err(ConfigError::InvalidTtl("durations must be non-zero".into()));
        }
        if access >= refresh {
            return Err(ConfigError::InvalidTtl(format!(
                "access token duration ({}) must be shorter than refresh token duration ({})",
                humantime::format_duration(access),
                humantime::format_duration(refresh)
            )));
        }
        // Out-of-range durations would otherwise fail at first issue.
        self.token_ttls()?;

        let base = &self.server.api_base_path;
        if !base.starts_with('/') || (base.len() > 1 && base.ends_with('/')) {
            return Err(ConfigError::InvalidBasePath(base.clone()));
        }
        Ok(())
    }

    pub fn token_ttls(&self) -> Result<TokenTtls, ConfigError> {
        let convert = |d: StdDuration| {
            chrono::Duration::from_std(d)
                .map_err(|_| ConfigError::InvalidTtl(format!("{d:?} is out of range")))
        };
        Ok(TokenTtls {
            access: convert(self.auth.access_token_duration)?,
            refresh: convert(self.auth.refresh_token_duration)?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Configuration for tests and local tooling.
    pub fn for_tests(token_symmetric_key: &[u8]) -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 0,
                api_base_path: "/api/v1".into(),
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 1,
            },
            auth: AuthConfig {
                token_symmetric_key: Zeroizing::new(token_symmetric_key.to_vec()),
                access_token_duration: StdDuration::from_secs(15 * 60),
                refresh_token_duration: StdDuration::from_secs(24 * 60 * 60),
            },
            glabs: GlabsConfig {
                app_id: String::new(),
                app_secret: Zeroizing::new(String::new()),
                base_url: DEFAULT_GLABS_BASE_URL.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: ConfigArgs,
    }

    fn parse(extra: &[&str]) -> ConfigArgs {
        let mut argv = vec!["panahon-server"];
        argv.extend_from_slice(extra);
        TestCli::parse_from(argv).args
    }

    const KEY: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn defaults_apply() {
        let config = parse(&["--token-symmetric-key", KEY]).into_config().unwrap();
        assert_eq!(config.server.api_base_path, "/api/v1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.max_connections, 10);
        let ttls = config.token_ttls().unwrap();
        assert_eq!(ttls.access, chrono::Duration::minutes(15));
        assert_eq!(ttls.refresh, chrono::Duration::hours(24));
        assert!(!config.glabs.is_configured());
    }

    #[test]
    fn short_key_is_fatal() {
        let err = parse(&["--token-symmetric-key", "too-short"])
            .into_config()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidKeySize {
                expected: 32,
                actual: 9
            }
        ));
    }

    #[test]
    fn missing_key_is_fatal() {
        assert!(matches!(
            parse(&[]).into_config(),
            Err(ConfigError::Missing("TOKEN_SYMMETRIC_KEY"))
        ));
    }

    #[test]
    fn access_must_be_shorter_than_refresh() {
        let err = parse(&[
            "--token-symmetric-key",
            KEY,
            "--access-token-duration",
            "2h",
            "--refresh-token-duration",
            "1h",
        ])
        .into_config()
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTtl(_)));

        let err = parse(&[
            "--token-symmetric-key",
            KEY,
            "--access-token-duration",
            "0s",
        ])
        .into_config()
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTtl(_)));
    }

    #[test]
    fn base_path_must_be_rooted() {
        let err = parse(&["--token-symmetric-key", KEY, "--api-base-path", "api/"])
            .into_config()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBasePath(_)));
    }

    #[test]
    fn debug_hides_secrets() {
        let config = parse(&["--token-symmetric-key", KEY]).into_config().unwrap();
        assert!(!format!("{config:?}").contains(KEY));
    }
}
