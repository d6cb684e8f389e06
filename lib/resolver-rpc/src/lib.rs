//! RPC plumbing for the miniresolver directory
//!
//! This library provides:
//! - JSON unary calls over HTTP/1.1 (`RpcTransport`, `RpcServer`)
//! - The directory service endpoint (`DirectoryRpc`)
//! - Client and server interceptors for domain routing
//! - Ping-based address probing and client-side load balancing

pub mod codec;
pub mod directory;
pub mod error;
pub mod interceptor;
pub mod load_balancer;
pub mod metadata;
pub mod probe;
pub mod server;
pub mod transport;

pub use directory::{peer_host, service_address, DirectoryRpc};
pub use error::{Result, RpcError};
pub use interceptor::{
    CallContext, ClientDomainInterceptor, Interceptor, InterceptorChain, LoggingInterceptor,
    RefreshTarget, ServerDomainInterceptor,
};
pub use load_balancer::{LoadBalancer, LoadBalancingStrategy};
pub use metadata::Metadata;
pub use probe::{PingProbe, ProbeConfig};
pub use server::{RpcRequest, RpcServer, RpcService};
pub use transport::{RpcTransport, DEFAULT_CALL_TIMEOUT};
