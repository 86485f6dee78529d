use serde::Deserialize;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

const DEFAULT_PROVISION_DELAY_MS: u64 = 500;
const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
    #[error("Port cannot be 0")]
    InvalidPort,
    #[error("Provision delay must be greater than zero")]
    ZeroProvisionDelay,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub listener: Listener,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Value of `Access-Control-Allow-Origin` on every response.
    #[serde(default = "default_cors_origin")]
    pub cors_allow_origin: String,
    /// Without it, account provisioning is unavailable.
    #[serde(default)]
    pub identity: Option<IdentityConfig>,
    #[serde(default = "default_provision_delay_ms")]
    pub provision_delay_ms: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DatabaseConfig {
    Mongodb {
        uri: String,
        database: String,
        #[serde(default)]
        use_transactions: bool,
    },
    Dynamodb {
        /// Custom endpoint, e.g. LocalStack.
        #[serde(default)]
        endpoint_url: Option<String>,
    },
    Memory,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig::Mongodb {
            uri: "mongodb://localhost:27017".to_string(),
            database: "reference_db".to_string(),
            use_transactions: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct IdentityConfig {
    pub base_url: String,
    pub service_key: String,
}

fn default_cors_origin() -> String {
    "*".to_string()
}

fn default_provision_delay_ms() -> u64 {
    DEFAULT_PROVISION_DELAY_MS
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: Config = serde_yaml::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from named variables, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let database = match var("DATABASE_TYPE", "mongodb").as_str() {
            "dynamodb" => DatabaseConfig::Dynamodb {
                endpoint_url: lookup("AWS_ENDPOINT_URL"),
            },
            "memory" => DatabaseConfig::Memory,
            "mongodb" => DatabaseConfig::Mongodb {
                uri: var("MONGODB_URI", "mongodb://localhost:27017"),
                database: var("MONGODB_DATABASE", "reference_db"),
                use_transactions: parse_var("MONGODB_TRANSACTIONS", &var("MONGODB_TRANSACTIONS", "false"))?,
            },
            other => {
                return Err(ConfigError::InvalidValue {
                    name: "DATABASE_TYPE",
                    reason: format!("expected mongodb, dynamodb or memory, got '{other}'"),
                })
            }
        };

        let identity = match (lookup("IDENTITY_URL"), lookup("IDENTITY_SERVICE_KEY")) {
            (Some(base_url), Some(service_key)) => Some(IdentityConfig { base_url, service_key }),
            _ => None,
        };

        let config = Config {
            listener: Listener {
                host: var("LISTEN_HOST", "0.0.0.0"),
                port: parse_var("LISTEN_PORT", &var("LISTEN_PORT", "8080"))?,
            },
            database,
            cors_allow_origin: var("CORS_ALLOW_ORIGIN", "*"),
            identity,
            provision_delay_ms: parse_var(
                "PROVISION_DELAY_MS",
                &var("PROVISION_DELAY_MS", &DEFAULT_PROVISION_DELAY_MS.to_string()),
            )?,
            max_body_bytes: parse_var(
                "MAX_BODY_BYTES",
                &var("MAX_BODY_BYTES", &DEFAULT_MAX_BODY_BYTES.to_string()),
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listener.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.provision_delay_ms == 0 {
            return Err(ConfigError::ZeroProvisionDelay);
        }
        Ok(())
    }
}

fn parse_var<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        name,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn yaml_config() {
        let yaml = r#"
            listener:
                host: 127.0.0.1
                port: 9000
            database:
                type: mongodb
                uri: mongodb://db.internal:27017
                database: reference
                use_transactions: true
            identity:
                base_url: https://auth.internal
                service_key: secret
            provision_delay_ms: 250
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");
        assert_eq!(config.listener.port, 9000);
        assert_eq!(
            config.database,
            DatabaseConfig::Mongodb {
                uri: "mongodb://db.internal:27017".into(),
                database: "reference".into(),
                use_transactions: true,
            }
        );
        assert_eq!(config.identity.unwrap().base_url, "https://auth.internal");
        assert_eq!(config.provision_delay_ms, 250);
        assert_eq!(config.cors_allow_origin, "*");
    }

    #[test]
    fn yaml_rejects_port_zero() {
        let tmp = write_tmp_file("listener:\n  host: 0.0.0.0\n  port: 0\n");
        assert!(matches!(Config::from_file(tmp.path()), Err(ConfigError::InvalidPort)));
    }

    #[test]
    fn env_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.listener, Listener::default());
        assert_eq!(config.database, DatabaseConfig::default());
        assert_eq!(config.provision_delay_ms, DEFAULT_PROVISION_DELAY_MS);
        assert!(config.identity.is_none());
    }

    #[test]
    fn env_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_TYPE", "dynamodb"),
            ("AWS_ENDPOINT_URL", "http://localhost:4566"),
            ("LISTEN_PORT", "3000"),
            ("IDENTITY_URL", "https://auth.example.com"),
            ("IDENTITY_SERVICE_KEY", "k"),
        ]))
        .unwrap();
        assert_eq!(
            config.database,
            DatabaseConfig::Dynamodb { endpoint_url: Some("http://localhost:4566".into()) }
        );
        assert_eq!(config.listener.port, 3000);
        assert!(config.identity.is_some());
    }

    #[test]
    fn env_rejects_bad_values() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("DATABASE_TYPE", "postgres")])),
            Err(ConfigError::InvalidValue { name: "DATABASE_TYPE", .. })
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("LISTEN_PORT", "eighty")])),
            Err(ConfigError::InvalidValue { name: "LISTEN_PORT", .. })
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("PROVISION_DELAY_MS", "0")])),
            Err(ConfigError::ZeroProvisionDelay)
        ));
    }
}
