//! Configuration loading from disk and the environment.

use std::fs;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::path::{Path, PathBuf};

use crate::config::schema::{AgentConfig, AppConfig, SyncMode};
use crate::config::validation::{validate_config, ValidationError};

const DEFAULT_LOCAL_IP: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    ParseYaml(serde_yaml::Error),
    UnsupportedFormat(PathBuf),
    Validation(Vec<ValidationError>),
    NotFound,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::ParseYaml(e) => write!(f, "Parse error: {}", e),
            ConfigError::UnsupportedFormat(path) => {
                write!(f, "Unsupported config format: {}", path.display())
            }
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
            ConfigError::NotFound => write!(
                f,
                "No configuration found (--config, APOLLO_* variables, ~/.lapollo/app.yaml, ./app.yaml)"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Where the active configuration came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigOrigin {
    File(PathBuf),
    Environment,
}

/// Load and validate configuration from a TOML or YAML file.
pub fn load_config(path: &Path) -> Result<AgentConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let mut config: AgentConfig = match extension.as_deref() {
        Some("toml") => toml::from_str(&content).map_err(ConfigError::Parse)?,
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&content).map_err(ConfigError::ParseYaml)?
        }
        _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
    };

    // `logging.directory` wins over the legacy top-level `logPath`.
    let legacy_log_path = config.log_path.take();
    if config.logging.directory.is_none() {
        config.logging.directory = legacy_log_path;
    }

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Build a single-application configuration from `APOLLO_*` variables.
///
/// Returns `None` unless cluster, host, env path, app id and namespace are
/// all set. The lookup is injected so tests do not touch the process env.
pub fn config_from_env<F>(lookup: F) -> Option<AgentConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    let cluster = var("APOLLO_CLUSTER")?;
    let host = var("APOLLO_HOST")?;
    let env_path = var("APOLLO_ENV_PATH")?;
    let app_id = var("APOLLO_APP_ID")?;
    let namespaces: Vec<String> = var("APOLLO_NAMESPACE")?
        .split(',')
        .map(|ns| ns.trim().to_string())
        .filter(|ns| !ns.is_empty())
        .collect();

    let mut config = AgentConfig {
        cluster,
        mode: SyncMode::Hot,
        host,
        ip: Some(detect_host_ip().to_string()),
        apps: vec![AppConfig {
            path: PathBuf::from(env_path),
            app_id,
            namespaces,
        }],
        ..AgentConfig::default()
    };
    config.logging.directory = var("APOLLO_CLIENT_LOG_PATH").map(PathBuf::from);

    Some(config)
}

/// Resolve the configuration the agent should start with.
///
/// Order: explicit path, environment variables, `$HOME/.lapollo/app.yaml`,
/// then `app.yaml` beside the executable.
pub fn discover(explicit: Option<&Path>) -> Result<(AgentConfig, ConfigOrigin), ConfigError> {
    if let Some(path) = explicit {
        let config = load_config(path)?;
        return Ok((config, ConfigOrigin::File(path.to_path_buf())));
    }

    if let Some(config) = config_from_env(|name| std::env::var(name).ok()) {
        validate_config(&config).map_err(ConfigError::Validation)?;
        return Ok((config, ConfigOrigin::Environment));
    }

    for candidate in candidate_files() {
        if candidate.is_file() {
            let config = load_config(&candidate)?;
            return Ok((config, ConfigOrigin::File(candidate)));
        }
    }

    Err(ConfigError::NotFound)
}

fn candidate_files() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(home) = std::env::var_os("HOME").filter(|h| !h.is_empty()) {
        candidates.push(PathBuf::from(home).join(".lapollo").join("app.yaml"));
    }
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidates.push(dir.join("app.yaml"));
    }
    candidates
}

/// First non-loopback IPv4 address of this host, or 127.0.0.1.
///
/// Connecting a UDP socket only selects a route; no packet is sent.
pub fn detect_host_ip() -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(10, 254, 254, 254), 1))?;
        Ok(socket.local_addr()?.ip())
    };

    match probe() {
        Ok(IpAddr::V4(ip)) if !ip.is_loopback() && !ip.is_unspecified() => IpAddr::V4(ip),
        _ => IpAddr::V4(DEFAULT_LOCAL_IP),
    }
}
