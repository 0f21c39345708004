// Update orchestrator - drives the periodic check/download/flash cycle

use std::time::{Duration, Instant};

use serde::Deserialize;
use thiserror::Error;

use super::session::{SessionOutcome, UpdateSession};
use super::writer::{FirmwareWriter, FlashCommitFailed, FlashWriteError, InsufficientSpace};
use crate::config::AgentConfig;
use crate::network::connectivity::Connectivity;
use crate::network::transport::{FirmwareDownload, TransportError, UpdateTransport};
use crate::version::{FirmwareVersion, InvalidVersionFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    CheckingVersion,
    NoUpdate,
    Downloading,
    Flashing,
    Rebooting,
    Failed,
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("network unreachable")]
    NetworkUnavailable,
    #[error("version check failed, HTTP code: {0}")]
    MetadataFetchFailed(u16),
    #[error("malformed update metadata: {0}")]
    MalformedMetadata(#[from] serde_json::Error),
    #[error(transparent)]
    InvalidVersionFormat(#[from] InvalidVersionFormat),
    #[error("firmware download failed, HTTP code: {0}")]
    DownloadFailed(u16),
    #[error(transparent)]
    InsufficientSpace(#[from] InsufficientSpace),
    #[error("update incomplete: wrote {written} of {expected} bytes")]
    SizeMismatch { written: u64, expected: u64 },
    #[error(transparent)]
    FlashWriteFailed(#[from] FlashWriteError),
    #[error(transparent)]
    FlashCommitFailed(#[from] FlashCommitFailed),
    #[error("flashed image failed readiness check")]
    UpdateIncomplete,
    #[error("firmware checksum mismatch (expected {expected}, got {actual})")]
    ChecksumMismatch { expected: String, actual: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// What the version endpoint announces. `checksum` is the hex SHA-256
/// of the firmware image and gates the commit.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateManifest {
    pub version: String,
    pub checksum: String,
}

/// Result of one due cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    NoUpdate,
    Rebooting { new_version: FirmwareVersion },
    Failed(UpdateError),
}

/// The update agent itself. Owns the capabilities it drives and runs
/// one blocking cycle at a time; a failed cycle changes nothing and the
/// next one starts from scratch.
pub struct UpdateManager<C, T, W>
where
    C: Connectivity,
    T: UpdateTransport,
    W: FirmwareWriter,
{
    current: FirmwareVersion,
    connectivity: C,
    transport: T,
    writer: W,
    state: UpdateState,
    last_check: Instant,
    config: AgentConfig,
}

impl<C, T, W> UpdateManager<C, T, W>
where
    C: Connectivity,
    T: UpdateTransport,
    W: FirmwareWriter,
{
    pub fn new(
        config: AgentConfig,
        connectivity: C,
        transport: T,
        writer: W,
    ) -> Result<Self, InvalidVersionFormat> {
        let current = FirmwareVersion::parse(&config.current_version)?;
        Ok(Self {
            current,
            connectivity,
            transport,
            writer,
            state: UpdateState::Idle,
            last_check: Instant::now(),
            config,
        })
    }

    pub fn state(&self) -> UpdateState {
        self.state
    }

    pub fn current_version(&self) -> FirmwareVersion {
        self.current
    }

    /// Cadence gate. Runs a cycle when the poll interval has elapsed
    /// since the last one; the first cycle comes one full interval after
    /// construction. Returns None while the gate is closed or after a
    /// completed update left the manager waiting for restart.
    pub fn poll(&mut self, now: Instant) -> Option<CycleOutcome> {
        if self.state == UpdateState::Rebooting {
            return None;
        }
        if now.saturating_duration_since(self.last_check) < self.poll_interval() {
            return None;
        }
        self.last_check = now;
        Some(self.check_and_update())
    }

    /// One full cycle: ask the server for the latest version and, when
    /// it is newer than ours, download, verify and stage it.
    pub fn check_and_update(&mut self) -> CycleOutcome {
        if !self.connectivity.is_connected() {
            log::info!("Network unreachable, skipping update check");
            return CycleOutcome::Failed(UpdateError::NetworkUnavailable);
        }

        self.state = UpdateState::CheckingVersion;
        log::info!("Checking for firmware updates...");

        match self.check_remote_version() {
            Ok(None) => {
                self.state = UpdateState::NoUpdate;
                log::info!("Already running the latest version ({})", self.current);
                self.state = UpdateState::Idle;
                CycleOutcome::NoUpdate
            }
            Ok(Some((manifest, candidate))) => match self.download_and_flash(&manifest) {
                Ok(()) => {
                    log::info!("Update to {candidate} completed successfully, restarting...");
                    self.state = UpdateState::Rebooting;
                    self.writer.restart();
                    CycleOutcome::Rebooting {
                        new_version: candidate,
                    }
                }
                Err(e) => {
                    self.state = UpdateState::Failed;
                    log::error!("Update to {candidate} failed: {e}");
                    self.state = UpdateState::Idle;
                    CycleOutcome::Failed(e)
                }
            },
            Err(e) => {
                self.state = UpdateState::Failed;
                log::warn!("Update check failed: {e}");
                self.state = UpdateState::Idle;
                CycleOutcome::Failed(e)
            }
        }
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.config.poll_interval_secs)
    }

    fn check_remote_version(
        &mut self,
    ) -> Result<Option<(UpdateManifest, FirmwareVersion)>, UpdateError> {
        let response = self
            .transport
            .fetch_metadata(&self.config.version_url, &self.config.auth_token)?;
        if !is_http_success(response.status) {
            return Err(UpdateError::MetadataFetchFailed(response.status));
        }

        log::debug!(
            "Version response: {}",
            String::from_utf8_lossy(&response.body)
        );
        let manifest: UpdateManifest = serde_json::from_slice(&response.body)?;
        let candidate = FirmwareVersion::parse(&manifest.version)?;

        log::info!("Current firmware {}, server offers {}", self.current, candidate);

        if candidate.is_newer_than(&self.current) {
            Ok(Some((manifest, candidate)))
        } else {
            Ok(None)
        }
    }

    fn download_and_flash(&mut self, manifest: &UpdateManifest) -> Result<(), UpdateError> {
        self.state = UpdateState::Downloading;
        log::info!("New firmware available, starting update...");

        let mut download = self
            .transport
            .fetch_firmware(&self.config.firmware_url, &self.config.auth_token)?;
        if !is_http_success(download.status) {
            return Err(UpdateError::DownloadFailed(download.status));
        }

        let mut session = UpdateSession::new(download.declared_len, manifest.checksum.clone());
        let result = self.flash(&mut download, &mut session);
        match &result {
            Ok(()) => session.resolve(SessionOutcome::Success),
            Err(e) => session.resolve(SessionOutcome::for_error(e)),
        }
        result
    }

    fn flash(
        &mut self,
        download: &mut FirmwareDownload,
        session: &mut UpdateSession,
    ) -> Result<(), UpdateError> {
        self.writer.begin_write(session.declared_len())?;
        self.state = UpdateState::Flashing;
        log::info!(
            "Writing {} byte image to the inactive slot...",
            session.declared_len()
        );

        session.consume(&mut *download.body, &mut self.writer)?;

        let written = session.bytes_written();
        let expected = session.declared_len();
        if written != expected {
            log::error!("Update incomplete: wrote {written} of {expected} bytes");
            // The slot is still closed out so it is left sealed rather
            // than mid-write.
            if let Err(e) = self.writer.finalize() {
                log::warn!("Closing the slot after a short write also failed: {e}");
            }
            return Err(UpdateError::SizeMismatch { written, expected });
        }

        session.verify_checksum()?;
        self.writer.finalize()?;

        if !self.writer.is_ready() {
            return Err(UpdateError::UpdateIncomplete);
        }

        log::info!("Firmware written successfully ({written} bytes)");
        Ok(())
    }
}

fn is_http_success(status: u16) -> bool {
    (200..300).contains(&status)
}
