use super::types::{Config, QueueServiceConfig};

use anyhow::Context;
use std::fs;
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    load_config_from_string(&content)
}

/// Load configuration from a string
pub fn load_config_from_string(content: &str) -> anyhow::Result<Config> {
    let config: Config = toml::from_str(content)?;
    Ok(config)
}

/// Load configuration from a file if it exists, falling back to defaults,
/// then apply `MQ_*` environment overrides.
pub fn load_config_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let mut config = if path.exists() {
        load_config(path)?
    } else {
        tracing::warn!("Config file '{}' not found, using defaults", path.display());
        Config::default()
    };

    apply_env_overrides(&mut config.queue_service, |key| std::env::var(key).ok());
    Ok(config)
}

/// Override connection settings from `MQ_HOST`, `MQ_PORT`, `MQ_QMGR`,
/// `MQ_CHANNEL`, `MQ_USER` and `MQ_PASSWORD`.
pub fn apply_env_overrides<F>(config: &mut QueueServiceConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("MQ_HOST") {
        config.host = host;
    }
    if let Some(port) = lookup("MQ_PORT") {
        match port.parse() {
            Ok(port) => config.port = port,
            Err(_) => tracing::warn!("Ignoring invalid MQ_PORT '{}'", port),
        }
    }
    if let Some(manager) = lookup("MQ_QMGR") {
        config.manager = manager;
    }
    if let Some(channel) = lookup("MQ_CHANNEL") {
        config.channel = channel;
    }
    if let Some(user) = lookup("MQ_USER") {
        config.user = Some(user);
    }
    if let Some(password) = lookup("MQ_PASSWORD") {
        config.password = Some(password);
    }
}
