// Network reachability checks for the update server

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("network connect failed: {0}")]
pub struct ConnectError(pub String);

/// Link-layer view the update loop depends on. A check cycle is skipped
/// entirely while `is_connected` reports false.
pub trait Connectivity {
    fn is_connected(&self) -> bool;
    fn connect(&mut self) -> Result<(), ConnectError>;
}

/// Reachability probe that dials the update server's TCP port.
/// No state is kept; every question goes to the network.
pub struct NetworkProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl NetworkProbe {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    /// Build a probe aimed at the host serving `url`.
    pub fn from_url(url: &str, timeout: Duration) -> Result<Self, ConnectError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| ConnectError(format!("bad server url {url:?}: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| ConnectError(format!("no host in server url {url:?}")))?
            .to_string();
        let port = parsed.port_or_known_default().unwrap_or(80);
        Ok(Self::new(host, port, timeout))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn probe(&self) -> Result<(), String> {
        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| format!("resolve {}:{}: {e}", self.host, self.port))?;

        let mut last_err = format!("no addresses for {}:{}", self.host, self.port);
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(_) => return Ok(()),
                Err(e) => last_err = format!("dial {addr}: {e}"),
            }
        }
        Err(last_err)
    }
}

impl Connectivity for NetworkProbe {
    fn is_connected(&self) -> bool {
        self.probe().is_ok()
    }

    fn connect(&mut self) -> Result<(), ConnectError> {
        self.probe().map_err(ConnectError)
    }
}
