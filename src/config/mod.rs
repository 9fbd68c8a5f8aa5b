use anyhow::Context;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub origin: OriginConfig,
    pub visits: VisitConfig,
    pub headers: HeaderNames,
    pub cache: CacheConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// A configured secret. `Debug` never prints the value.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([redacted])")
    }
}

#[derive(Debug, Clone)]
pub struct OriginConfig {
    /// Header the edge layer injects the shared secret into
    pub header: String,
    pub secret: Secret,
}

#[derive(Debug, Clone)]
pub struct VisitConfig {
    /// Span during which a repeated fingerprint is not recounted
    pub dedup_window: Duration,
    /// Optional key turning the fingerprint into an HMAC
    pub fingerprint_salt: Option<Secret>,
}

/// Names of the edge-supplied viewer headers
#[derive(Debug, Clone)]
pub struct HeaderNames {
    pub address: String,
    pub user_agent: String,
    pub country: String,
    pub mobile: String,
    pub tablet: String,
}

impl Default for HeaderNames {
    fn default() -> Self {
        Self {
            address: "cloudfront-viewer-address".to_string(),
            user_agent: "user-agent".to_string(),
            country: "cloudfront-viewer-country".to_string(),
            mobile: "cloudfront-is-mobile-viewer".to_string(),
            tablet: "cloudfront-is-tablet-viewer".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Lifetime of a cached totals snapshot; zero disables the cache
    pub stats_ttl_secs: u64,
}

impl CacheConfig {
    pub const DEFAULT_TTL_SECS: u64 = 10;
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Single allowed origin; `None` allows any origin
    pub allowed_origin: Option<String>,
}

impl VisitConfig {
    pub const DEFAULT_WINDOW_SECS: u64 = 1800;
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            "memory" => DatabaseBackend::Memory,
            "sqlite" => DatabaseBackend::Sqlite,
            other => {
                tracing::warn!(
                    "Unknown DATABASE_BACKEND '{other}', falling back to 'sqlite'. Supported values: sqlite, postgres, memory"
                );
                DatabaseBackend::Sqlite
            }
        };

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./footfall.db".to_string());

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u32>()
            .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?;

        let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let api_port = std::env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("API_PORT must be a valid port number")?;

        let secret = std::env::var("ORIGIN_SECRET")
            .context("ORIGIN_SECRET must be set to the value the edge injects")?;
        if secret.is_empty() {
            anyhow::bail!("ORIGIN_SECRET must not be empty");
        }
        let origin_header = std::env::var("ORIGIN_VERIFY_HEADER")
            .unwrap_or_else(|_| "x-origin-verify".to_string())
            .to_lowercase();

        let window_secs = parse_secs(
            "DEDUP_WINDOW_SECS",
            std::env::var("DEDUP_WINDOW_SECS").ok().as_deref(),
            VisitConfig::DEFAULT_WINDOW_SECS,
        )?;

        let fingerprint_salt = std::env::var("FINGERPRINT_SALT")
            .ok()
            .filter(|s| !s.is_empty())
            .map(Secret::new);

        let stats_ttl_secs = parse_secs(
            "STATS_CACHE_TTL_SECS",
            std::env::var("STATS_CACHE_TTL_SECS").ok().as_deref(),
            CacheConfig::DEFAULT_TTL_SECS,
        )?;

        let defaults = HeaderNames::default();
        let header = |key: &str, fallback: String| {
            std::env::var(key)
                .map(|v| v.to_lowercase())
                .unwrap_or(fallback)
        };
        let headers = HeaderNames {
            address: header("ADDRESS_HEADER", defaults.address),
            user_agent: defaults.user_agent,
            country: header("COUNTRY_HEADER", defaults.country),
            mobile: header("MOBILE_HEADER", defaults.mobile),
            tablet: header("TABLET_HEADER", defaults.tablet),
        };

        let allowed_origin = std::env::var("CORS_ALLOWED_ORIGIN")
            .ok()
            .filter(|s| !s.is_empty());

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
            },
            origin: OriginConfig {
                header: origin_header,
                secret: Secret::new(secret),
            },
            visits: VisitConfig {
                dedup_window: Duration::from_secs(window_secs),
                fingerprint_salt,
            },
            headers,
            cache: CacheConfig { stats_ttl_secs },
            cors: CorsConfig { allowed_origin },
        })
    }
}

/// Unset means `default`; anything that is not a whole number of seconds is an error
fn parse_secs(key: &str, raw: Option<&str>, default: u64) -> anyhow::Result<u64> {
    match raw {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{key} must be a number of seconds")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_secs() {
        assert_eq!(parse_secs("STATS_CACHE_TTL_SECS", None, 10).unwrap(), 10);
        assert_eq!(parse_secs("STATS_CACHE_TTL_SECS", Some("0"), 10).unwrap(), 0);
        assert_eq!(parse_secs("DEDUP_WINDOW_SECS", Some(" 60 "), 1800).unwrap(), 60);

        let err = parse_secs("STATS_CACHE_TTL_SECS", Some("ten"), 10).unwrap_err();
        assert!(err.to_string().contains("STATS_CACHE_TTL_SECS"));
        assert!(parse_secs("STATS_CACHE_TTL_SECS", Some("-1"), 10).is_err());
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let origin = OriginConfig {
            header: "x-origin-verify".to_string(),
            secret: Secret::new("abc123"),
        };

        let rendered = format!("{:?}", origin);
        assert!(!rendered.contains("abc123"));
        assert!(rendered.contains("redacted"));
    }

    #[test]
    fn test_default_header_names_are_lowercase() {
        let names = HeaderNames::default();
        for name in [
            &names.address,
            &names.user_agent,
            &names.country,
            &names.mobile,
            &names.tablet,
        ] {
            assert_eq!(name, &name.to_lowercase());
        }
    }
}
