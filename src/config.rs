use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    // Update server endpoints
    pub version_url: String,
    pub firmware_url: String,
    pub auth_token: String,

    // The release this binary ships as
    pub current_version: String,

    // Update cadence and HTTP timeouts
    pub poll_interval_secs: u64,
    pub metadata_timeout_secs: u64,
    pub firmware_timeout_secs: u64,

    // Staging slot for downloaded images
    pub slot_dir: PathBuf,
    pub slot_capacity_bytes: u64,

    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        // Endpoints and the shared secret come from environment variables set
        // by build.rs, which reads update_config.h (not committed to git)
        let auth_token = env!("UPDATE_AUTH_TOKEN");

        Self {
            version_url: env!("UPDATE_VERSION_URL").to_string(),
            firmware_url: env!("UPDATE_FIRMWARE_URL").to_string(),
            auth_token: auth_token.to_string(),
            current_version: env!("CARGO_PKG_VERSION").to_string(),
            poll_interval_secs: 60,
            metadata_timeout_secs: 30,
            firmware_timeout_secs: 60,
            slot_dir: PathBuf::from("firmware-slot"),
            slot_capacity_bytes: 4 * 1024 * 1024,
            log_level: "debug".to_string(),
        }
    }
}

/// Load the agent configuration from `path`, falling back to the
/// compiled-in defaults when the file is missing or unreadable.
pub fn load_or_default(path: &Path) -> AgentConfig {
    match load_from_file(path) {
        Ok(config) => {
            log::info!("Loaded configuration from {}", path.display());
            config
        }
        Err(e) => {
            log::warn!(
                "Failed to load config from {}: {:#}, using defaults",
                path.display(),
                e
            );
            AgentConfig::default()
        }
    }
}

fn load_from_file(path: &Path) -> Result<AgentConfig> {
    let data = fs::read(path)?;
    let config: AgentConfig = serde_json::from_slice(&data)?;
    Ok(config)
}
