// Configuration loading and parsing (config/bridge.toml).

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::model::IdentityScheme;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },
}

// ---------------------------------------------------------------------------
// bridge.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire bridge.toml file.
#[derive(Debug, Clone, Deserialize)]
struct BridgeFile {
    coordinator: CoordinatorConfig,
    vmix: VmixConfig,
    event: EventConfig,
}

/// Connection parameters for the remote scoring authority.
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    pub host: String,
    #[serde(default = "default_coordinator_port")]
    pub port: u16,
    /// Which player-identity scheme this deployment uses. The scheme is fixed
    /// for the whole session; index and id keys never coexist.
    pub identity_scheme: IdentityScheme,
    /// Bounded timeout applied to every HTTP request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Roster endpoint path. Deployment-dependent: some coordinators serve
    /// the selected card at `/players/card`, others at `/players/focused`.
    #[serde(default = "default_roster_path")]
    pub roster_path: String,
}

impl CoordinatorConfig {
    /// Base URL for HTTP reads and commands.
    pub fn http_base(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// The outbound video-mixer endpoint (fire-and-forget collaborator).
#[derive(Debug, Clone, Deserialize)]
pub struct VmixConfig {
    pub host: String,
    #[serde(default = "default_vmix_port")]
    pub port: u16,
}

impl VmixConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Event-level settings supplied by the operator.
#[derive(Debug, Clone, Deserialize)]
pub struct EventConfig {
    pub event_id: String,
    /// One-based display round to start from.
    #[serde(default = "default_round")]
    pub round: u32,
    /// Zero-based hole to start from.
    #[serde(default)]
    pub hole: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub coordinator: CoordinatorConfig,
    pub vmix: VmixConfig,
    pub event: EventConfig,
}

fn default_coordinator_port() -> u16 {
    8000
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_roster_path() -> String {
    "/players/focused".to_string()
}

fn default_vmix_port() -> u16 {
    8099
}

fn default_round() -> u32 {
    1
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/bridge.toml` relative to the
/// given `base_dir`.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join("bridge.toml");
    let text = std::fs::read_to_string(&path).map_err(|_| ConfigError::FileNotFound {
        path: path.clone(),
    })?;
    parse_config(&text, &path)
}

/// Convenience wrapper: loads config relative to the current working
/// directory.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    load_config_from(&cwd)
}

fn parse_config(text: &str, path: &Path) -> Result<Config, ConfigError> {
    let file: BridgeFile = toml::from_str(text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config = Config {
        coordinator: file.coordinator,
        vmix: file.vmix,
        event: file.event,
    };

    validate(&config)?;

    Ok(config)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.coordinator.host.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "coordinator.host".into(),
            message: "must not be empty".into(),
        });
    }
    if config.coordinator.request_timeout_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "coordinator.request_timeout_secs".into(),
            message: "must be at least 1 second".into(),
        });
    }
    if !config.coordinator.roster_path.starts_with('/') {
        return Err(ConfigError::ValidationError {
            field: "coordinator.roster_path".into(),
            message: "must be an absolute path starting with `/`".into(),
        });
    }
    if config.vmix.host.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "vmix.host".into(),
            message: "must not be empty".into(),
        });
    }
    if config.event.event_id.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "event.event_id".into(),
            message: "must not be empty".into(),
        });
    }
    if config.event.round == 0 {
        return Err(ConfigError::ValidationError {
            field: "event.round".into(),
            message: "rounds are displayed one-based; minimum is 1".into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
        [coordinator]
        host = "10.170.122.114"
        identity_scheme = "id"

        [vmix]
        host = "10.170.120.134"

        [event]
        event_id = "a57b4ed6-f64a-4710-8f20-f93e82d4fe79"
    "#;

    fn parse(text: &str) -> Result<Config, ConfigError> {
        parse_config(text, Path::new("bridge.toml"))
    }

    #[test]
    fn valid_config_parses_with_defaults() {
        let config = parse(VALID).unwrap();
        assert_eq!(config.coordinator.port, 8000);
        assert_eq!(config.coordinator.request_timeout_secs, 5);
        assert_eq!(config.coordinator.roster_path, "/players/focused");
        assert_eq!(config.coordinator.identity_scheme, IdentityScheme::Id);
        assert_eq!(config.vmix.port, 8099);
        assert_eq!(config.event.round, 1);
        assert_eq!(config.event.hole, 0);
        assert_eq!(
            config.coordinator.http_base(),
            "http://10.170.122.114:8000"
        );
        assert_eq!(config.vmix.addr(), "10.170.120.134:8099");
    }

    #[test]
    fn index_scheme_parses() {
        let text = VALID.replace("\"id\"", "\"index\"");
        let config = parse(&text).unwrap();
        assert_eq!(config.coordinator.identity_scheme, IdentityScheme::Index);
    }

    #[test]
    fn empty_host_rejected() {
        let text = VALID.replace("10.170.122.114", "");
        let err = parse(&text).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { field, .. } if field == "coordinator.host"));
    }

    #[test]
    fn zero_round_rejected() {
        let text = format!("{VALID}\nround = 0\n");
        let err = parse(&text).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { field, .. } if field == "event.round"));
    }

    #[test]
    fn relative_roster_path_rejected() {
        let text = VALID.replace(
            "identity_scheme = \"id\"",
            "identity_scheme = \"id\"\nroster_path = \"players/card\"",
        );
        let err = parse(&text).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { field, .. } if field == "coordinator.roster_path"));
    }

    #[test]
    fn missing_section_is_parse_error() {
        let err = parse("[coordinator]\nhost = \"x\"\nidentity_scheme = \"id\"").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }
}
