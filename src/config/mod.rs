use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Echo request bodies, response bodies and debug values in the access log.
    pub debug: bool,
}

const DEFAULT_CONFIG_PATH: &str = "config/default.yaml";

/// Plain environment variables that override a single key.
const ENV_OVERRIDES: [(&str, &str); 2] = [("HOST", "server.host"), ("PORT", "server.port")];

impl AppConfig {
    /// Loads from `CONFIG_PATH` (default `config/default.yaml`), then
    /// `GATEWAY_*` variables, then `HOST` and `PORT`.
    pub fn load() -> Result<Self> {
        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path, |var| std::env::var(var).ok())
    }

    /// Same as [`AppConfig::load`] with an explicit file and override lookup.
    /// A missing file is not an error.
    pub fn load_from(path: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut builder = Self::defaults()?
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("GATEWAY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        for (var, key) in ENV_OVERRIDES {
            if let Some(value) = lookup(var) {
                builder = builder.set_override(key, value)?;
            }
        }

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.server.timeout_seconds > 0,
            "server.timeout_seconds must be positive"
        );
        Ok(())
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(config::Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.timeout_seconds", 30)?
            .set_default("logging.debug", false)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_deserialize_without_a_file() {
        let config: AppConfig = AppConfig::defaults()
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.timeout_seconds, 30);
        assert!(!config.logging.debug);
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        let yaml = "server:\n  port: 8080\nlogging:\n  debug: true\n";
        let config: AppConfig = AppConfig::defaults()
            .unwrap()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(config.logging.debug);
    }

    #[test]
    fn missing_file_and_no_overrides_yield_defaults() {
        let config = AppConfig::load_from("config/does-not-exist", |_| None).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert!(!config.logging.debug);
    }

    #[test]
    fn host_and_port_overrides_win() {
        let config = AppConfig::load_from("config/does-not-exist", |var| match var {
            "HOST" => Some("0.0.0.0".to_string()),
            "PORT" => Some("8081".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8081);
    }

    #[test]
    fn bad_port_override_is_rejected() {
        let result = AppConfig::load_from("config/does-not-exist", |var| {
            (var == "PORT").then(|| "not-a-port".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config: AppConfig = AppConfig::defaults()
            .unwrap()
            .set_override("server.timeout_seconds", 0)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert!(config.validate().is_err());
    }
}
