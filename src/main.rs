use anyhow::Result;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use log::info;

use ota_agent::config;
use ota_agent::logging;
use ota_agent::network::connectivity::{Connectivity, NetworkProbe};
use ota_agent::network::transport::HttpTransport;
use ota_agent::ota::manager::{CycleOutcome, UpdateManager};
use ota_agent::ota::writer::FileSlotWriter;

const CONFIG_FILE: &str = "ota-agent.json";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const NETWORK_WAIT_SECS: u32 = 30;

// How often the cadence gate is re-examined
const TICK: Duration = Duration::from_secs(1);

fn main() -> Result<()> {
    // Initialize our logger with colors and timestamps
    logging::init_logger().expect("Failed to initialize logger");

    info!("OTA update agent {} starting", env!("CARGO_PKG_VERSION"));

    let config = config::load_or_default(Path::new(CONFIG_FILE));
    if !logging::set_max_level_from_str(&config.log_level) {
        log::warn!("Unknown log level {:?}, keeping debug", config.log_level);
    }
    if config.auth_token.is_empty() {
        log::warn!("Auth token is empty, update requests will be unauthenticated");
    }
    info!("Update server: {}", config.version_url);
    info!(
        "Checking every {}s, staging slot: {}",
        config.poll_interval_secs,
        config.slot_dir.display()
    );

    let mut probe = NetworkProbe::from_url(&config.version_url, PROBE_TIMEOUT)?;
    wait_for_network(&mut probe, NETWORK_WAIT_SECS);

    let transport = HttpTransport::new(
        Duration::from_secs(config.metadata_timeout_secs),
        Duration::from_secs(config.firmware_timeout_secs),
    )?;
    let writer = FileSlotWriter::new(config.slot_dir.clone(), config.slot_capacity_bytes);
    let mut manager = UpdateManager::new(config, probe, transport, writer)?;

    info!("Running firmware {}", manager.current_version());

    loop {
        if let Some(outcome) = manager.poll(Instant::now()) {
            match outcome {
                CycleOutcome::NoUpdate => {}
                CycleOutcome::Rebooting { new_version } => {
                    info!("Shutting down to restart into firmware {new_version}");
                    // The supervisor relaunches us from the staged image.
                    return Ok(());
                }
                // Already logged by the manager; the next due cycle
                // starts fresh.
                CycleOutcome::Failed(_) => {}
            }
        }
        thread::sleep(TICK);
    }
}

/// Block until the update server answers a TCP dial, up to
/// `max_wait_secs`. The agent still starts without a network; cycles
/// skip until the link comes back.
fn wait_for_network<C: Connectivity>(conn: &mut C, max_wait_secs: u32) {
    match conn.connect() {
        Ok(()) => {
            info!("Network connected");
            return;
        }
        Err(e) => log::debug!("Initial connect failed: {e}"),
    }

    info!("Network not reachable, waiting up to {max_wait_secs} seconds...");
    for i in 0..max_wait_secs {
        thread::sleep(Duration::from_secs(1));

        if conn.connect().is_ok() {
            info!("Network connected after {} seconds", i + 1);
            return;
        }

        if (i + 1) % 5 == 0 {
            info!("Still waiting for network... ({}/{})", i + 1, max_wait_secs);
        }
    }

    log::warn!("Network unreachable after {max_wait_secs}s, starting anyway");
}
