// OTA (Over-The-Air) update module

pub mod manager;
pub mod session;
pub mod writer;

pub use manager::{CycleOutcome, UpdateError, UpdateManager, UpdateManifest, UpdateState};
pub use session::{SessionOutcome, UpdateSession};
pub use writer::{FileSlotWriter, FirmwareWriter};

// Update cycle:
// 1. Cadence tick fires a version check
// 2. Fetch the manifest, compare against the running version
// 3. Stream the new image into the inactive slot
// 4. Verify length and SHA-256 against the manifest
// 5. Commit the slot, confirm readiness, restart
