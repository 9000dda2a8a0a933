use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "tsgate.toml";

/// Prefix for environment overrides, e.g. `TSGATE__HTTP__LISTEN`
pub const ENV_PREFIX: &str = "TSGATE__";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Address the HTTP server binds to
    pub listen: String,
    /// Largest accepted request body in bytes
    pub max_body_size: usize,
    /// Requests running longer than this are aborted
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            max_body_size: 16 * 1024 * 1024, // 16MB
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Unit of the timestamps found in line-protocol input
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
    #[serde(rename = "ns")]
    Nanoseconds,
    #[serde(rename = "us")]
    Microseconds,
    #[default]
    #[serde(rename = "ms")]
    Milliseconds,
    #[serde(rename = "s")]
    Seconds,
}

impl Precision {
    /// Convert a timestamp in this precision to milliseconds.
    ///
    /// Finer precisions are truncated towards negative infinity; `None` on
    /// overflow.
    pub fn to_millis(self, timestamp: i64) -> Option<i64> {
        match self {
            Self::Nanoseconds => Some(timestamp.div_euclid(1_000_000)),
            Self::Microseconds => Some(timestamp.div_euclid(1_000)),
            Self::Milliseconds => Some(timestamp),
            Self::Seconds => timestamp.checked_mul(1_000),
        }
    }
}

impl std::str::FromStr for Precision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ns" | "n" => Ok(Self::Nanoseconds),
            "us" | "u" => Ok(Self::Microseconds),
            "ms" => Ok(Self::Milliseconds),
            "s" => Ok(Self::Seconds),
            other => Err(format!(
                "unsupported precision '{other}', expected one of ns, us, ms, s"
            )),
        }
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Nanoseconds => "ns",
            Self::Microseconds => "us",
            Self::Milliseconds => "ms",
            Self::Seconds => "s",
        };
        write!(f, "{s}")
    }
}

/// What to do with a record that carries no integer or float field
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NonNumericPolicy {
    /// Store the sample with value 0.0
    #[default]
    Zero,
    /// Fail the whole request
    Reject,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Precision assumed when a request does not name one
    pub precision: Precision,
    pub non_numeric: NonNumericPolicy,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage backend DSN, e.g. `memory://`
    pub dsn: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("memory://"),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Configuration {
    /// HTTP server configuration
    pub http: HttpConfig,
    /// Line-protocol ingestion configuration
    pub ingest: IngestConfig,
    /// Backing store configuration
    pub storage: StorageConfig,
}

impl Configuration {
    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
    }

    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config = Self::figment()
            .merge(Toml::file(DEFAULT_CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        let config = Self::figment()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    /// Check values that deserialize fine but cannot work at runtime
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.http.listen.parse::<std::net::SocketAddr>().is_err() {
            anyhow::bail!("Invalid listen address: {}", self.http.listen);
        }

        if self.http.max_body_size == 0 {
            anyhow::bail!("max_body_size must be greater than zero");
        }

        if self.http.request_timeout.is_zero() {
            anyhow::bail!("request_timeout must be greater than zero");
        }

        if self.storage.dsn.is_empty() {
            anyhow::bail!("Storage DSN cannot be empty");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_configuration() {
        let config = Configuration::default();

        assert_eq!(config.http.listen, "0.0.0.0:8080");
        assert_eq!(config.http.request_timeout, Duration::from_secs(30));
        assert_eq!(config.ingest.precision, Precision::Milliseconds);
        assert_eq!(config.ingest.non_numeric, NonNumericPolicy::Zero);
        assert_eq!(config.storage.dsn, "memory://");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_configless_operation() {
        Jail::expect_with(|_jail| {
            let config = Configuration::load().map_err(|e| *e)?;
            assert_eq!(config.http.listen, "0.0.0.0:8080");
            assert_eq!(config.storage.dsn, "memory://");
            Ok(())
        });
    }

    #[test]
    fn test_toml_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
                [http]
                listen = "127.0.0.1:9090"
                request_timeout = "5s"

                [ingest]
                precision = "ns"
                non_numeric = "reject"
                "#,
            )?;

            let config = Configuration::load().map_err(|e| *e)?;
            assert_eq!(config.http.listen, "127.0.0.1:9090");
            assert_eq!(config.http.request_timeout, Duration::from_secs(5));
            assert_eq!(config.http.max_body_size, 16 * 1024 * 1024);
            assert_eq!(config.ingest.precision, Precision::Nanoseconds);
            assert_eq!(config.ingest.non_numeric, NonNumericPolicy::Reject);
            Ok(())
        });
    }

    #[test]
    fn test_explicit_path() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "[storage]\ndsn = \"memory://custom\"\n")?;

            let config =
                Configuration::load_from_path(Path::new("custom.toml")).map_err(|e| *e)?;
            assert_eq!(config.storage.dsn, "memory://custom");
            Ok(())
        });
    }

    #[test]
    fn test_env_var_override() {
        Jail::expect_with(|jail| {
            jail.create_file(DEFAULT_CONFIG_FILE, "[http]\nlisten = \"127.0.0.1:9090\"\n")?;
            jail.set_env("TSGATE__HTTP__LISTEN", "127.0.0.1:7070");
            jail.set_env("TSGATE__INGEST__PRECISION", "s");

            let config = Configuration::load().map_err(|e| *e)?;
            assert_eq!(config.http.listen, "127.0.0.1:7070");
            assert_eq!(config.ingest.precision, Precision::Seconds);
            Ok(())
        });
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Configuration::default();
        config.http.listen = "not-an-address".to_string();
        assert!(config.validate().is_err());

        let mut config = Configuration::default();
        config.http.request_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = Configuration::default();
        config.storage.dsn = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_precision_conversion() {
        assert_eq!(Precision::Nanoseconds.to_millis(1_500_000_000), Some(1_500));
        assert_eq!(Precision::Microseconds.to_millis(1_500_000), Some(1_500));
        assert_eq!(Precision::Milliseconds.to_millis(1_500), Some(1_500));
        assert_eq!(Precision::Seconds.to_millis(2), Some(2_000));
        assert_eq!(Precision::Seconds.to_millis(i64::MAX), None);
        assert_eq!(Precision::Nanoseconds.to_millis(-1), Some(-1));
    }

    #[test]
    fn test_precision_from_str() {
        assert_eq!("ns".parse::<Precision>(), Ok(Precision::Nanoseconds));
        assert_eq!("u".parse::<Precision>(), Ok(Precision::Microseconds));
        assert_eq!("s".parse::<Precision>(), Ok(Precision::Seconds));
        assert!("h".parse::<Precision>().is_err());
        assert_eq!(Precision::Microseconds.to_string(), "us");
    }
}
