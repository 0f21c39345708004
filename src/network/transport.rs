// HTTP transport for the update endpoints

use std::io::Read;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("response did not declare a content length")]
    MissingContentLength,
}

impl TransportError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Connection(err.to_string())
        }
    }

    /// Classify a failure surfaced while reading a response body.
    pub(crate) fn from_read(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                TransportError::Timeout
            }
            _ => TransportError::Connection(err.to_string()),
        }
    }
}

/// Version metadata reply, body undecoded. Non-2xx statuses are returned
/// here rather than as errors so the caller can log the code.
#[derive(Debug)]
pub struct MetadataResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// An open firmware download. `declared_len` is the server's
/// Content-Length; the body streams so the image never sits in RAM whole.
pub struct FirmwareDownload {
    pub status: u16,
    pub declared_len: u64,
    pub body: Box<dyn Read>,
}

/// The two fetches an update cycle performs. Both attach the shared
/// secret verbatim in the Authorization header.
pub trait UpdateTransport {
    fn fetch_metadata(
        &mut self,
        url: &str,
        auth_token: &str,
    ) -> Result<MetadataResponse, TransportError>;

    fn fetch_firmware(
        &mut self,
        url: &str,
        auth_token: &str,
    ) -> Result<FirmwareDownload, TransportError>;
}

/// Blocking HTTP client pair. Metadata requests get a shorter deadline
/// than firmware downloads, which cover multi-megabyte transfers.
pub struct HttpTransport {
    metadata_client: reqwest::blocking::Client,
    firmware_client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(
        metadata_timeout: Duration,
        firmware_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let metadata_client = reqwest::blocking::Client::builder()
            .timeout(metadata_timeout)
            .build()
            .map_err(TransportError::from_reqwest)?;
        let firmware_client = reqwest::blocking::Client::builder()
            .timeout(firmware_timeout)
            .build()
            .map_err(TransportError::from_reqwest)?;

        Ok(Self {
            metadata_client,
            firmware_client,
        })
    }
}

impl UpdateTransport for HttpTransport {
    fn fetch_metadata(
        &mut self,
        url: &str,
        auth_token: &str,
    ) -> Result<MetadataResponse, TransportError> {
        let response = self
            .metadata_client
            .get(url)
            .header("Authorization", auth_token)
            .send()
            .map_err(TransportError::from_reqwest)?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(TransportError::from_reqwest)?
            .to_vec();

        Ok(MetadataResponse { status, body })
    }

    fn fetch_firmware(
        &mut self,
        url: &str,
        auth_token: &str,
    ) -> Result<FirmwareDownload, TransportError> {
        let response = self
            .firmware_client
            .get(url)
            .header("Authorization", auth_token)
            .send()
            .map_err(TransportError::from_reqwest)?;

        let status = response.status().as_u16();
        let declared_len = match response.content_length() {
            Some(len) => len,
            // The flash slot is sized up front from this value, so a
            // successful response without it is unusable.
            None if (200..300).contains(&status) => {
                return Err(TransportError::MissingContentLength)
            }
            None => 0,
        };

        Ok(FirmwareDownload {
            status,
            declared_len,
            body: Box::new(response),
        })
    }
}
