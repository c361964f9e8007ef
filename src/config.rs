use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use tracing::warn;

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self::from_source(&env_string)
    }

    fn from_source(source: &impl Fn(&str) -> Option<String>) -> Self {
        Self {
            api: ApiConfig::from_source(source),
            engine: EngineConfig::from_source(source),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const HOST_VAR: &'static str = "STOW_IT_NOW_API_HOST";
    const PORT_VAR: &'static str = "STOW_IT_NOW_API_PORT";
    const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    const DEFAULT_PORT: u16 = 8000;

    fn from_source(source: &impl Fn(&str) -> Option<String>) -> Self {
        let (bind_ip, display_host) = match source(Self::HOST_VAR) {
            Some(raw) => match raw.parse::<IpAddr>() {
                Ok(ip) => (ip, raw),
                Err(err) => {
                    warn!(
                        var = Self::HOST_VAR,
                        value = %raw,
                        error = %err,
                        "could not parse host, using {}",
                        Self::DEFAULT_HOST
                    );
                    (Self::DEFAULT_HOST, Self::DEFAULT_HOST.to_string())
                }
            },
            None => (Self::DEFAULT_HOST, Self::DEFAULT_HOST.to_string()),
        };

        let port = load_with_warning(
            source,
            Self::PORT_VAR,
            Self::DEFAULT_PORT,
            |port: &u16| *port != 0,
            "must not be 0",
        );

        Self {
            bind_ip,
            display_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }
}

/// Configuration of the inventory engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    sim_epoch: DateTime<Utc>,
    state_file: Option<PathBuf>,
}

impl EngineConfig {
    const EPOCH_VAR: &'static str = "STOW_IT_NOW_SIM_EPOCH";
    const STATE_FILE_VAR: &'static str = "STOW_IT_NOW_STATE_FILE";

    fn from_source(source: &impl Fn(&str) -> Option<String>) -> Self {
        let sim_epoch = match source(Self::EPOCH_VAR) {
            Some(raw) => parse_epoch(&raw).unwrap_or_else(|| {
                warn!(
                    var = Self::EPOCH_VAR,
                    value = %raw,
                    "expected an RFC 3339 timestamp, starting the clock now"
                );
                Utc::now()
            }),
            None => Utc::now(),
        };

        Self {
            sim_epoch,
            state_file: source(Self::STATE_FILE_VAR).map(PathBuf::from),
        }
    }

    /// Initial value of the simulated clock for a fresh inventory.
    pub fn sim_epoch(&self) -> DateTime<Utc> {
        self.sim_epoch
    }

    /// JSON file the inventory is loaded from and saved to, if persistence is enabled.
    pub fn state_file(&self) -> Option<&PathBuf> {
        self.state_file.as_ref()
    }
}

/// Log output settings. Read separately so logging is up before the rest of the configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogConfig {
    pub json: bool,
}

impl LogConfig {
    const JSON_VAR: &'static str = "STOW_IT_NOW_LOG_JSON";

    pub fn from_env() -> Self {
        let json = env_string(Self::JSON_VAR)
            .and_then(|raw| parse_bool(&raw, Self::JSON_VAR))
            .unwrap_or(false);
        Self { json }
    }
}

fn parse_epoch(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!(var = name, error = %err, "could not read variable, using default value");
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            warn!(var = var_name, value = other, "not a boolean, using default value");
            None
        }
    }
}

fn load_with_warning<T>(
    source: &impl Fn(&str) -> Option<String>,
    var_name: &str,
    default: T,
    validator: impl Fn(&T) -> bool,
    invalid_hint: &str,
) -> T
where
    T: FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    let Some(raw) = source(var_name) else {
        return default;
    };
    match raw.parse::<T>() {
        Ok(value) if validator(&value) => value,
        Ok(_) => {
            warn!(var = var_name, value = %raw, "{}, using {}", invalid_hint, default);
            default
        }
        Err(err) => {
            warn!(var = var_name, value = %raw, error = %err, "could not parse, using {}", default);
            default
        }
    }
}
