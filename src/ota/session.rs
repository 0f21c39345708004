// Update session - per-attempt download ledger and integrity check

use std::io::Read;

use sha2::{Digest, Sha256};

use super::manager::UpdateError;
use super::writer::FirmwareWriter;
use crate::network::transport::TransportError;

// Matches the HTTP read buffer used elsewhere in the agent
const CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Pending,
    Success,
    SizeMismatch,
    WriteError,
    InsufficientSpace,
    TransportError,
    ChecksumMismatch,
}

impl SessionOutcome {
    /// Classification of a failed attempt for the session ledger.
    pub fn for_error(err: &UpdateError) -> Self {
        match err {
            UpdateError::Transport(_) => SessionOutcome::TransportError,
            UpdateError::InsufficientSpace(_) => SessionOutcome::InsufficientSpace,
            UpdateError::SizeMismatch { .. } => SessionOutcome::SizeMismatch,
            UpdateError::ChecksumMismatch { .. } => SessionOutcome::ChecksumMismatch,
            UpdateError::FlashWriteFailed(_)
            | UpdateError::FlashCommitFailed(_)
            | UpdateError::UpdateIncomplete => SessionOutcome::WriteError,
            _ => SessionOutcome::Pending,
        }
    }
}

/// Ledger for one download-and-flash attempt. Bytes are hashed as they
/// stream through so verification needs no second pass over the image.
/// Each attempt gets a fresh session; nothing carries over.
pub struct UpdateSession {
    declared_len: u64,
    bytes_written: u64,
    expected_checksum: String,
    hasher: Sha256,
    outcome: SessionOutcome,
}

impl UpdateSession {
    pub fn new(declared_len: u64, expected_checksum: String) -> Self {
        Self {
            declared_len,
            bytes_written: 0,
            expected_checksum,
            hasher: Sha256::new(),
            outcome: SessionOutcome::Pending,
        }
    }

    pub fn declared_len(&self) -> u64 {
        self.declared_len
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn outcome(&self) -> SessionOutcome {
        self.outcome
    }

    pub fn resolve(&mut self, outcome: SessionOutcome) {
        self.outcome = outcome;
    }

    /// Pump the download body into the writer in fixed-size chunks,
    /// hashing every byte on the way through.
    pub fn consume(
        &mut self,
        body: &mut dyn Read,
        writer: &mut dyn FirmwareWriter,
    ) -> Result<u64, UpdateError> {
        let mut buf = [0u8; CHUNK_SIZE];

        loop {
            let n = body
                .read(&mut buf)
                .map_err(|e| UpdateError::Transport(TransportError::from_read(&e)))?;
            if n == 0 {
                break;
            }

            self.hasher.update(&buf[..n]);
            writer.write_chunk(&buf[..n])?;

            let before = self.bytes_written;
            self.bytes_written += n as u64;

            if self.declared_len > 0 {
                let prev_decile = before * 10 / self.declared_len;
                let cur_decile = self.bytes_written * 10 / self.declared_len;
                if cur_decile > prev_decile {
                    log::debug!(
                        "Download progress: {}% ({}/{} bytes)",
                        self.bytes_written * 100 / self.declared_len,
                        self.bytes_written,
                        self.declared_len
                    );
                }
            }
        }

        Ok(self.bytes_written)
    }

    /// Compare the streamed digest against the manifest checksum.
    /// Consumes the hasher; call once, after the stream is drained.
    pub fn verify_checksum(&mut self) -> Result<(), UpdateError> {
        let digest = format!("{:x}", std::mem::take(&mut self.hasher).finalize());
        let expected = self.expected_checksum.trim();

        if digest.eq_ignore_ascii_case(expected) {
            log::debug!("Firmware checksum verified ({digest})");
            Ok(())
        } else {
            Err(UpdateError::ChecksumMismatch {
                expected: expected.to_string(),
                actual: digest,
            })
        }
    }
}

impl Drop for UpdateSession {
    fn drop(&mut self) {
        log::debug!(
            "Update session closed: {}/{} bytes, outcome {:?}",
            self.bytes_written,
            self.declared_len,
            self.outcome
        );
    }
}
