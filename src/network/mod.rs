pub mod connectivity;
pub mod transport;

pub use connectivity::{ConnectError, Connectivity, NetworkProbe};
pub use transport::{FirmwareDownload, HttpTransport, MetadataResponse, TransportError, UpdateTransport};
