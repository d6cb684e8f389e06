//! Client side of the miniresolver directory
//!
//! This library provides:
//! - `DirectoryApi` with remote (`DirectoryClient`) and in-process (`LocalDirectory`) access
//! - `ResolutionPoller` keeping a target's addresses fresh
//! - `WatchBus` carrying refresh signals from failing calls to pollers
//! - `Channel` for calls to resolved targets
//! - `Registrar` renewing local services with the directory
//! - `MiniResolver`, the facade tying them together

pub mod channel;
pub mod client;
pub mod error;
pub mod poller;
pub mod registration;
pub mod resolver;
pub mod watch;

pub use channel::Channel;
pub use client::{DirectoryApi, DirectoryClient, LocalDirectory};
pub use error::{ClientError, Result};
pub use poller::{PollerConfig, PollerHandle, ResolutionPoller, ResolveMode, ResolvedState};
pub use registration::{Registrar, RegistrarConfig};
pub use resolver::MiniResolver;
pub use watch::{Watch, WatchBus, REFRESH_SEND_TIMEOUT};
