// Firmware writer - stages downloaded images into the inactive slot

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("not enough space for update: image is {required} bytes, slot holds {available}")]
pub struct InsufficientSpace {
    pub required: u64,
    pub available: u64,
}

#[derive(Debug, Clone, Error)]
#[error("flash write failed: {0}")]
pub struct FlashWriteError(pub String);

#[derive(Debug, Clone, Error)]
#[error("flash commit failed (code {code})")]
pub struct FlashCommitFailed {
    pub code: i32,
}

/// Staged write into the inactive firmware slot. The running image is
/// never touched; a failed or abandoned write leaves the device exactly
/// as it was, and `begin_write` on the next attempt starts clean.
pub trait FirmwareWriter {
    /// Reserve the slot for an image of `declared_size` bytes.
    fn begin_write(&mut self, declared_size: u64) -> Result<(), InsufficientSpace>;

    /// Append one chunk. Chunks arrive in order and exactly once.
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), FlashWriteError>;

    /// Seal the staged image and mark it for boot.
    fn finalize(&mut self) -> Result<(), FlashCommitFailed>;

    /// True once a complete image has been committed.
    fn is_ready(&self) -> bool;

    /// Hand control to the staged image.
    fn restart(&mut self);
}

// Commit failure codes mirrored in logs
const COMMIT_NO_WRITE: i32 = -1;
const COMMIT_SHORT_IMAGE: i32 = -2;
const COMMIT_IO: i32 = -3;

const STAGING_NAME: &str = "firmware.staging";
const IMAGE_NAME: &str = "firmware.next";

/// File-backed slot. Bytes land in a staging file that is fsynced and
/// renamed into place on finalize, so `firmware.next` is only ever a
/// complete image.
pub struct FileSlotWriter {
    slot_dir: PathBuf,
    capacity: u64,
    staging: Option<File>,
    declared: Option<u64>,
    written: u64,
    ready: bool,
    restart_requested: bool,
}

impl FileSlotWriter {
    pub fn new(slot_dir: impl Into<PathBuf>, capacity: u64) -> Self {
        Self {
            slot_dir: slot_dir.into(),
            capacity,
            staging: None,
            declared: None,
            written: 0,
            ready: false,
            restart_requested: false,
        }
    }

    pub fn image_path(&self) -> PathBuf {
        self.slot_dir.join(IMAGE_NAME)
    }

    pub fn restart_requested(&self) -> bool {
        self.restart_requested
    }

    fn staging_path(&self) -> PathBuf {
        self.slot_dir.join(STAGING_NAME)
    }

    fn open_staging(&self) -> Result<File, FlashWriteError> {
        fs::create_dir_all(&self.slot_dir)
            .map_err(|e| FlashWriteError(format!("create slot dir: {e}")))?;
        File::create(self.staging_path())
            .map_err(|e| FlashWriteError(format!("create staging file: {e}")))
    }

    fn discard_staging(&self) {
        let _ = fs::remove_file(self.staging_path());
    }
}

impl FirmwareWriter for FileSlotWriter {
    fn begin_write(&mut self, declared_size: u64) -> Result<(), InsufficientSpace> {
        if declared_size > self.capacity {
            return Err(InsufficientSpace {
                required: declared_size,
                available: self.capacity,
            });
        }

        // Leftovers from an earlier failed attempt must not leak into
        // this one.
        self.staging = None;
        self.discard_staging();
        self.declared = Some(declared_size);
        self.written = 0;
        self.ready = false;

        log::debug!(
            "Slot reserved for {} byte image (capacity {})",
            declared_size,
            self.capacity
        );
        Ok(())
    }

    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), FlashWriteError> {
        if self.declared.is_none() {
            return Err(FlashWriteError("no write in progress".to_string()));
        }

        if self.written + chunk.len() as u64 > self.capacity {
            return Err(FlashWriteError(format!(
                "write past slot capacity ({} bytes)",
                self.capacity
            )));
        }

        if self.staging.is_none() {
            self.staging = Some(self.open_staging()?);
        }
        let file = self
            .staging
            .as_mut()
            .ok_or_else(|| FlashWriteError("staging file not open".to_string()))?;
        file.write_all(chunk)
            .map_err(|e| FlashWriteError(format!("write staging file: {e}")))?;

        self.written += chunk.len() as u64;
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), FlashCommitFailed> {
        let declared = self.declared.take().ok_or(FlashCommitFailed {
            code: COMMIT_NO_WRITE,
        })?;

        if let Some(file) = self.staging.take() {
            file.sync_all().map_err(io_commit_error)?;
        }

        // An image shorter or longer than announced never becomes bootable.
        if self.written != declared {
            self.discard_staging();
            return Err(FlashCommitFailed {
                code: COMMIT_SHORT_IMAGE,
            });
        }

        fs::rename(self.staging_path(), self.image_path()).map_err(io_commit_error)?;
        self.ready = true;

        log::info!(
            "Committed {} byte image to {}",
            self.written,
            self.image_path().display()
        );
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn restart(&mut self) {
        log::info!("Restart requested to boot the staged image");
        self.restart_requested = true;
    }
}

fn io_commit_error(err: std::io::Error) -> FlashCommitFailed {
    FlashCommitFailed {
        code: err.raw_os_error().unwrap_or(COMMIT_IO),
    }
}
