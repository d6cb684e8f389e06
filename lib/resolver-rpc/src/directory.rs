//! The `miniresolver.MiniResolver` service on top of a [`ServiceDirectory`]

use crate::codec::encode;
use crate::server::{RpcRequest, RpcService};
use hyper::body::Bytes;
use resolver_api::v1::{PONG, SERVICE_NAME};
use resolver_api::{
    DefaultResponse, ResolveRequest, ResolverDefaultResponse, ServiceData, ServiceResponse,
    ServicesResponse, Status,
};
use resolver_core::ServiceDirectory;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::debug;

/// RPC front of the service directory
#[derive(Clone)]
pub struct DirectoryRpc {
    directory: ServiceDirectory,
}

impl DirectoryRpc {
    pub fn new(directory: ServiceDirectory) -> Self {
        Self { directory }
    }

    pub fn directory(&self) -> &ServiceDirectory {
        &self.directory
    }

    pub fn ping(&self) -> DefaultResponse {
        DefaultResponse::ok(PONG)
    }

    pub async fn add_service(
        &self,
        data: &ServiceData,
        peer: Option<&str>,
    ) -> Result<ResolverDefaultResponse, Status> {
        let address = service_address(data, peer)?;
        let wait = self
            .directory
            .add_service(&data.service, &address, &data.domains, data.single)
            .await
            .map_err(|e| Status::invalid_argument(e.to_string()))?;
        debug!(
            "Service {} at {} added for domains {:?}",
            data.service, address, data.domains
        );
        Ok(ResolverDefaultResponse {
            response: DefaultResponse::ok(format!(
                "service '{}' - '{}' added",
                data.service, address
            )),
            next_call_wait: wait_seconds(wait),
        })
    }

    pub async fn remove_service(
        &self,
        data: &ServiceData,
        peer: Option<&str>,
    ) -> Result<DefaultResponse, Status> {
        let address = service_address(data, peer)?;
        self.directory
            .remove_service(&data.service, &address, &data.domains)
            .await;
        debug!(
            "Service {} at {} removed for domains {:?}",
            data.service, address, data.domains
        );
        Ok(DefaultResponse::ok(format!(
            "service '{}' - '{}' removed",
            data.service, address
        )))
    }

    pub async fn resolve_service(&self, request: &ResolveRequest) -> Result<ServiceResponse, Status> {
        let (address, wait) = self.directory.resolve_service(&request.name).await;
        match address {
            Some(addr) => {
                debug!("Resolved {} to {}", request.name, addr);
                Ok(ServiceResponse {
                    addr,
                    next_call_wait: wait_seconds(wait),
                })
            }
            None => Err(Status::not_found(format!(
                "service '{}' not found",
                request.name
            ))),
        }
    }

    /// All live addresses; an unknown name yields an empty list, not an error
    pub async fn resolve_services(
        &self,
        request: &ResolveRequest,
    ) -> Result<ServicesResponse, Status> {
        let (addrs, wait) = self.directory.resolve_services(&request.name).await;
        debug!("Resolved {} to {:?}", request.name, addrs);
        Ok(ServicesResponse {
            addrs,
            next_call_wait: wait_seconds(wait),
        })
    }
}

#[async_trait::async_trait]
impl RpcService for DirectoryRpc {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    async fn call(&self, method: &str, request: RpcRequest) -> Result<Bytes, Status> {
        let peer = request.peer.as_deref();
        match method {
            "Ping" => encode(&self.ping()),
            "AddService" => encode(&self.add_service(&request.decode()?, peer).await?),
            "RemoveService" => encode(&self.remove_service(&request.decode()?, peer).await?),
            "ResolveService" => encode(&self.resolve_service(&request.decode()?).await?),
            "ResolveServices" => encode(&self.resolve_services(&request.decode()?).await?),
            other => Err(Status::unimplemented(format!(
                "unknown method {}/{}",
                SERVICE_NAME, other
            ))),
        }
    }
}

/// Address a registration refers to: the explicit host, or the caller's
/// source IP combined with the registered port.
pub fn service_address(data: &ServiceData, peer: Option<&str>) -> Result<String, Status> {
    if let Some(address) = data.explicit_address() {
        return Ok(address);
    }
    let peer = peer.ok_or_else(|| Status::invalid_argument("cannot get peer from context"))?;
    let host = peer_host(peer)?;
    Ok(format!("{}:{}", host, data.port))
}

/// Host part of a `ip:port` peer address; IPv6 hosts come back bracketed
pub fn peer_host(peer: &str) -> Result<String, Status> {
    let addr: SocketAddr = peer
        .parse()
        .map_err(|e| Status::invalid_argument(format!("cannot split host port of '{}': {}", peer, e)))?;
    Ok(match addr.ip() {
        IpAddr::V4(ip) => ip.to_string(),
        IpAddr::V6(ip) => match ip.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => format!("[{}]", ip),
        },
    })
}

fn wait_seconds(wait: Duration) -> i64 {
    i64::try_from(wait.as_secs()).unwrap_or(i64::MAX)
}
