//! Miniresolver API types
//!
//! This library defines the wire contract between the directory and its clients:
//! - Request and response messages for the five directory RPCs
//! - Status codes carried with every call
//! - Method paths and metadata keys
//! - The `miniresolver:` target grammar

pub mod v1;
pub mod status;
pub mod target;

pub use status::{Code, Status};
pub use target::{
    domain_of, qualified_name, service_from_method, target_for_method, Target, TargetError, SCHEME,
};
pub use v1::{
    DefaultResponse, Empty, ResolveRequest, ResolverDefaultResponse, ResultStatus, ServiceData,
    ServiceResponse, ServicesResponse,
};
