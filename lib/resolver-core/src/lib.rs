//! Core service directory functionality
//!
//! This library provides:
//! - The in-memory service directory keyed by qualified service name
//! - Per-name address bookkeeping with TTL expiry and round-robin rotation
//! - The address probe capability used by the background health sweep

pub mod directory;
pub mod entry;
pub mod error;
pub mod probe;

pub use directory::{DirectoryConfig, ServiceDirectory};
pub use entry::{ServiceEntry, MIN_NEXT_CALL_WAIT};
pub use error::{CoreError, Result};
pub use probe::{AddressProbe, AlwaysReachable};
