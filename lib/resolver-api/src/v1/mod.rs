/// API version v1 of the miniresolver directory protocol

pub mod service;

pub use service::{
    DefaultResponse, Empty, ResolveRequest, ResolverDefaultResponse, ResultStatus, ServiceData,
    ServiceResponse, ServicesResponse,
};

/// Fully qualified name of the directory service
pub const SERVICE_NAME: &str = "miniresolver.MiniResolver";

/// Method path for the liveness probe
pub const PING: &str = "/miniresolver.MiniResolver/Ping";
/// Method path for registering or renewing an address
pub const ADD_SERVICE: &str = "/miniresolver.MiniResolver/AddService";
/// Method path for deregistering an address
pub const REMOVE_SERVICE: &str = "/miniresolver.MiniResolver/RemoveService";
/// Method path for resolving one address
pub const RESOLVE_SERVICE: &str = "/miniresolver.MiniResolver/ResolveService";
/// Method path for resolving every known address
pub const RESOLVE_SERVICES: &str = "/miniresolver.MiniResolver/ResolveServices";

/// Metadata key carrying the routing domain of a call
pub const DOMAIN_METADATA_KEY: &str = "domain";
/// Header carrying the numeric status code of a call; failed calls carry the
/// status message as a plain-text body
pub const STATUS_HEADER: &str = "rpc-status";

/// Acknowledgement returned by `Ping`
pub const PONG: &str = "pong";
