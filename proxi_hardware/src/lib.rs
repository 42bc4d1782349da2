//! Hardware-side collaborators for the proximity core: driver error codes,
//! a simulated ranging sensor and the key/value stores calibration is
//! persisted in.

pub mod error;
pub mod sim;
pub mod store;
pub mod util;

pub use error::HwError;
pub use sim::{SimControl, SimFaults, SimScene, SimulatedSensor};
pub use store::{FileStore, MemoryStore};
