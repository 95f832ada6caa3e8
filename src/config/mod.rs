// Configuration module entry point
// Loads layered configuration and holds the immutable runtime state

mod state;
mod types;

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

pub use state::AppState;
pub use types::{Config, HttpConfig, LoggingConfig, PerformanceConfig, ServerConfig};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
/// Prefix of environment variables read by the configuration layer
pub const ENV_PREFIX: &str = "FILESERVER";
/// Config file looked up in the working directory when none is given
const DEFAULT_CONFIG_NAME: &str = "fileserver";

const LOG_LEVELS: [&str; 4] = ["error", "warn", "info", "debug"];

pub fn default_server_name() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// Values that take precedence over every other configuration source
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub config_file: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub root: Option<PathBuf>,
}

impl Config {
    /// Load configuration: defaults, then the config file, then `FILESERVER_*`
    /// environment variables, then the given overrides.
    pub fn load(overrides: &ConfigOverrides) -> Result<Self, config::ConfigError> {
        let file = match overrides.config_file.as_deref() {
            Some(path) => config::File::with_name(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("http.index_files"),
            )
            .set_override_option("server.host", overrides.host.clone())?
            .set_override_option("server.port", overrides.port.map(i64::from))?
            .set_override_option(
                "server.root",
                overrides
                    .root
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned()),
            )?
            .build()?;

        let cfg: Self = settings.try_deserialize()?;
        cfg.validate().map_err(config::ConfigError::Message)?;
        Ok(cfg)
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<(), String> {
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid logging.level '{}', expected one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            ));
        }
        if self.performance.keep_alive_timeout == 0 {
            return Err("performance.keep_alive_timeout must be greater than 0".to_string());
        }
        if self.performance.header_read_timeout == 0 {
            return Err("performance.header_read_timeout must be greater than 0".to_string());
        }
        if self.http.read_buffer_size == 0 {
            return Err("http.read_buffer_size must be greater than 0".to_string());
        }
        if self.server.workers == Some(0) {
            return Err("server.workers must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        (self.server.host.as_str(), self.server.port)
            .to_socket_addrs()
            .map_err(|e| format!("Invalid address {}:{}: {e}", self.server.host, self.server.port))?
            .next()
            .ok_or_else(|| {
                format!(
                    "Address {}:{} did not resolve",
                    self.server.host, self.server.port
                )
            })
    }
}
