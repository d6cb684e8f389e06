//! Liveness probing of registered addresses with the `Ping` RPC

use crate::metadata::Metadata;
use crate::transport::RpcTransport;
use hyper::body::Bytes;
use resolver_api::v1::PING;
use resolver_api::Code;
use resolver_core::AddressProbe;
use std::time::Duration;
use tracing::{debug, warn};

/// Probe configuration
#[derive(Clone, Debug)]
pub struct ProbeConfig {
    /// Deadline for a single ping
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

/// Pings each address and reports it unreachable only when the call fails
/// with `Unavailable`.
///
/// Services that do not implement `Ping` answer `Unimplemented`, which still
/// proves the address is alive.
pub struct PingProbe {
    transport: RpcTransport,
}

impl PingProbe {
    pub fn new(config: ProbeConfig) -> Self {
        Self {
            transport: RpcTransport::new(config.timeout),
        }
    }
}

impl Default for PingProbe {
    fn default() -> Self {
        Self::new(ProbeConfig::default())
    }
}

#[async_trait::async_trait]
impl AddressProbe for PingProbe {
    async fn is_reachable(&self, address: &str) -> bool {
        match self
            .transport
            .unary(address, PING, &Metadata::new(), Bytes::from_static(b"{}"))
            .await
        {
            Ok(_) => {
                debug!("Address {} answered ping", address);
                true
            }
            Err(status) if status.code() == Code::Unavailable => {
                warn!("Address {} is unavailable: {}", address, status.message());
                false
            }
            Err(status) => {
                debug!("Address {} answered ping with {}", address, status);
                true
            }
        }
    }
}
