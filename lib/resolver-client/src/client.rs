//! Access to the directory's five operations, remote or in-process

use crate::channel::Channel;
use resolver_api::v1::{ADD_SERVICE, PING, REMOVE_SERVICE, RESOLVE_SERVICE, RESOLVE_SERVICES};
use resolver_api::{
    DefaultResponse, Empty, ResolveRequest, ResolverDefaultResponse, ServiceData, ServiceResponse,
    ServicesResponse, Status,
};
use resolver_rpc::{DirectoryRpc, InterceptorChain, RpcTransport};

/// The directory operations used by pollers and registrars
#[async_trait::async_trait]
pub trait DirectoryApi: Send + Sync {
    async fn ping(&self) -> Result<DefaultResponse, Status>;

    async fn add_service(&self, data: &ServiceData) -> Result<ResolverDefaultResponse, Status>;

    async fn remove_service(&self, data: &ServiceData) -> Result<DefaultResponse, Status>;

    /// One address for `name`; `NotFound` when nothing is registered
    async fn resolve_service(&self, name: &str) -> Result<ServiceResponse, Status>;

    /// Every live address for `name`, possibly none
    async fn resolve_services(&self, name: &str) -> Result<ServicesResponse, Status>;
}

/// Directory reached over the network
#[derive(Clone)]
pub struct DirectoryClient {
    channel: Channel,
}

impl DirectoryClient {
    pub fn new(address: &str, transport: RpcTransport, interceptors: InterceptorChain) -> Self {
        Self {
            channel: Channel::to_address(address, transport, interceptors),
        }
    }

    pub fn address(&self) -> &str {
        self.channel.target()
    }
}

#[async_trait::async_trait]
impl DirectoryApi for DirectoryClient {
    async fn ping(&self) -> Result<DefaultResponse, Status> {
        self.channel.call(PING, &Empty {}).await
    }

    async fn add_service(&self, data: &ServiceData) -> Result<ResolverDefaultResponse, Status> {
        self.channel.call(ADD_SERVICE, data).await
    }

    async fn remove_service(&self, data: &ServiceData) -> Result<DefaultResponse, Status> {
        self.channel.call(REMOVE_SERVICE, data).await
    }

    async fn resolve_service(&self, name: &str) -> Result<ServiceResponse, Status> {
        self.channel
            .call(RESOLVE_SERVICE, &ResolveRequest::new(name))
            .await
    }

    async fn resolve_services(&self, name: &str) -> Result<ServicesResponse, Status> {
        self.channel
            .call(RESOLVE_SERVICES, &ResolveRequest::new(name))
            .await
    }
}

/// Directory living in the same process.
///
/// Registrations without an explicit host use the configured peer address,
/// standing in for the source address a remote directory would observe.
#[derive(Clone)]
pub struct LocalDirectory {
    rpc: DirectoryRpc,
    peer: Option<String>,
}

impl LocalDirectory {
    pub fn new(rpc: DirectoryRpc) -> Self {
        Self { rpc, peer: None }
    }

    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = Some(peer.into());
        self
    }
}

#[async_trait::async_trait]
impl DirectoryApi for LocalDirectory {
    async fn ping(&self) -> Result<DefaultResponse, Status> {
        Ok(self.rpc.ping())
    }

    async fn add_service(&self, data: &ServiceData) -> Result<ResolverDefaultResponse, Status> {
        self.rpc.add_service(data, self.peer.as_deref()).await
    }

    async fn remove_service(&self, data: &ServiceData) -> Result<DefaultResponse, Status> {
        self.rpc.remove_service(data, self.peer.as_deref()).await
    }

    async fn resolve_service(&self, name: &str) -> Result<ServiceResponse, Status> {
        self.rpc.resolve_service(&ResolveRequest::new(name)).await
    }

    async fn resolve_services(&self, name: &str) -> Result<ServicesResponse, Status> {
        self.rpc.resolve_services(&ResolveRequest::new(name)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resolver_api::Code;
    use resolver_core::{AlwaysReachable, DirectoryConfig, ServiceDirectory};
    use std::sync::Arc;

    fn local() -> LocalDirectory {
        LocalDirectory::new(DirectoryRpc::new(ServiceDirectory::new(
            DirectoryConfig::default(),
            Arc::new(AlwaysReachable),
        )))
    }

    fn calc(host: Option<&str>) -> ServiceData {
        ServiceData {
            service: "calc".to_string(),
            host: host.map(str::to_string),
            port: 9000,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_local_directory_lifecycle() {
        let directory = local();
        assert_eq!(directory.ping().await.unwrap().message, "pong");

        let added = directory.add_service(&calc(Some("10.0.0.1"))).await.unwrap();
        assert_eq!(added.next_call_wait, 200);

        let resolved = directory.resolve_service("calc").await.unwrap();
        assert_eq!(resolved.addr, "10.0.0.1:9000");
        assert!(resolved.next_call_wait >= 10);

        directory.remove_service(&calc(Some("10.0.0.1"))).await.unwrap();
        let err = directory.resolve_service("calc").await.unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
    }

    #[tokio::test]
    async fn test_local_directory_implicit_host() {
        let err = local().add_service(&calc(None)).await.unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);

        let directory = local().with_peer("[::1]:50000");
        directory.add_service(&calc(None)).await.unwrap();
        let all = directory.resolve_services("calc").await.unwrap();
        assert_eq!(all.addrs, vec!["[::1]:9000"]);
    }
}
