//! OTA Agent - device-resident firmware update client
//!
//! Periodically asks an update server for the latest release, and when a
//! newer one is announced, streams the image into the inactive firmware
//! slot, verifies it and restarts into it. Network access and flash
//! access sit behind traits so the whole cycle runs on the host in tests.

pub mod config;
pub mod logging;
pub mod network;
pub mod ota;
pub mod version;

pub use config::AgentConfig;
pub use network::connectivity::{Connectivity, NetworkProbe};
pub use network::transport::{HttpTransport, TransportError, UpdateTransport};
pub use ota::manager::{CycleOutcome, UpdateError, UpdateManager, UpdateState};
pub use ota::writer::{FileSlotWriter, FirmwareWriter};
pub use version::FirmwareVersion;
