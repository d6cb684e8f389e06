//! Client channel to one target, resolved or fixed

use crate::poller::PollerHandle;
use hyper::body::Bytes;
use resolver_api::Status;
use resolver_rpc::codec;
use resolver_rpc::{CallContext, InterceptorChain, LoadBalancer, Metadata, RpcTransport};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

enum AddressSource {
    Fixed(String),
    Resolved(PollerHandle),
}

struct ChannelInner {
    target: String,
    source: AddressSource,
    transport: RpcTransport,
    balancer: LoadBalancer,
    interceptors: InterceptorChain,
}

/// Issues unary calls to whatever address currently backs a target.
///
/// Every call runs through the client interceptor chain. Cloning is cheap and
/// shares the underlying resolver.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    /// Channel to a fixed `host:port`
    pub fn to_address(address: &str, transport: RpcTransport, interceptors: InterceptorChain) -> Self {
        Self::build(
            address.to_string(),
            AddressSource::Fixed(address.to_string()),
            transport,
            LoadBalancer::default(),
            interceptors,
        )
    }

    /// Channel following the addresses published by a resolution poller
    pub fn resolved(
        poller: PollerHandle,
        transport: RpcTransport,
        balancer: LoadBalancer,
        interceptors: InterceptorChain,
    ) -> Self {
        Self::build(
            poller.target().to_string(),
            AddressSource::Resolved(poller),
            transport,
            balancer,
            interceptors,
        )
    }

    fn build(
        target: String,
        source: AddressSource,
        transport: RpcTransport,
        balancer: LoadBalancer,
        interceptors: InterceptorChain,
    ) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                target,
                source,
                transport,
                balancer,
                interceptors,
            }),
        }
    }

    /// Target string the channel was created for
    pub fn target(&self) -> &str {
        &self.inner.target
    }

    /// Addresses currently backing the channel, waiting for the first resolution
    pub async fn addresses(&self) -> Result<Vec<String>, Status> {
        match &self.inner.source {
            AddressSource::Fixed(address) => Ok(vec![address.clone()]),
            AddressSource::Resolved(poller) => {
                let state = poller.resolved().await?;
                if state.addresses.is_empty() {
                    let reason = state
                        .error
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "no address registered".to_string());
                    return Err(Status::unavailable(format!(
                        "no address for {}: {}",
                        self.inner.target, reason
                    )));
                }
                Ok(state.addresses)
            }
        }
    }

    async fn pick(&self) -> Result<String, Status> {
        let addresses = self.addresses().await?;
        self.inner
            .balancer
            .select(&addresses)
            .map(str::to_string)
            .ok_or_else(|| Status::unavailable(format!("no address for {}", self.inner.target)))
    }

    /// Raw unary call of `method` with explicit metadata
    pub async fn unary(&self, method: &str, metadata: Metadata, body: Bytes) -> Result<Bytes, Status> {
        let inner = &self.inner;
        let mut context = CallContext::new(&inner.target, method, metadata);
        inner.interceptors.on_request(&mut context).await?;

        let result = match self.pick().await {
            Ok(address) => {
                debug!("Calling {} on {} via {}", method, address, inner.target);
                inner
                    .transport
                    .unary(&address, method, &context.metadata, body)
                    .await
            }
            Err(status) => Err(status),
        };

        inner
            .interceptors
            .on_response(&context, result.as_ref().err())
            .await;
        result.map_err(|status| {
            status.with_context(format!(
                "RPC: {}{} :: {}",
                inner.target,
                method,
                context.domain().unwrap_or_default()
            ))
        })
    }

    /// Typed unary call with explicit metadata
    pub async fn call_with_metadata<Req, Resp>(
        &self,
        method: &str,
        metadata: Metadata,
        request: &Req,
    ) -> Result<Resp, Status>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let body = codec::encode(request)?;
        let reply = self.unary(method, metadata, body).await?;
        codec::decode_response(&reply)
    }

    /// Typed unary call
    pub async fn call<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp, Status>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        self.call_with_metadata(method, Metadata::new(), request)
            .await
    }

    /// Whether the resolver behind the channel was closed
    pub fn is_closed(&self) -> bool {
        match &self.inner.source {
            AddressSource::Fixed(_) => false,
            AddressSource::Resolved(poller) => poller.is_closed(),
        }
    }

    /// Stop resolving; fixed channels have nothing to release
    pub async fn close(&self) {
        if let AddressSource::Resolved(poller) = &self.inner.source {
            poller.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::DirectoryApi;
    use crate::poller::{PollerConfig, ResolutionPoller};
    use crate::watch::WatchBus;
    use resolver_api::{
        Code, DefaultResponse, ResolverDefaultResponse, ServiceData, ServiceResponse,
        ServicesResponse, Target,
    };
    use resolver_rpc::ClientDomainInterceptor;
    use std::time::Duration;

    struct NothingRegistered;

    #[async_trait::async_trait]
    impl DirectoryApi for NothingRegistered {
        async fn ping(&self) -> Result<DefaultResponse, Status> {
            Ok(DefaultResponse::ok("pong"))
        }

        async fn add_service(&self, _data: &ServiceData) -> Result<ResolverDefaultResponse, Status> {
            Err(Status::unimplemented("add"))
        }

        async fn remove_service(&self, _data: &ServiceData) -> Result<DefaultResponse, Status> {
            Err(Status::unimplemented("remove"))
        }

        async fn resolve_service(&self, name: &str) -> Result<ServiceResponse, Status> {
            Err(Status::not_found(format!("service '{}' not found", name)))
        }

        async fn resolve_services(&self, _name: &str) -> Result<ServicesResponse, Status> {
            Ok(ServicesResponse {
                addrs: vec![],
                next_call_wait: 10,
            })
        }
    }

    #[tokio::test]
    async fn test_unresolved_target_is_unavailable_and_refreshes() {
        let bus = WatchBus::new();
        let target: Target = "miniresolver:ubbasel.calc.Calculator".parse().unwrap();
        let poller = ResolutionPoller::new(target, Arc::new(NothingRegistered), bus.clone(), PollerConfig::default())
            .spawn()
            .await;
        let interceptors =
            InterceptorChain::new().add(ClientDomainInterceptor::with_refresher(Arc::new(bus.clone())));
        let channel = Channel::resolved(
            poller,
            RpcTransport::new(Duration::from_secs(1)),
            LoadBalancer::default(),
            interceptors,
        );

        let err = channel
            .unary("/calc.Calculator/Add", Metadata::new(), Bytes::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
        assert!(err.message().starts_with("RPC: miniresolver:ubbasel.calc.Calculator/calc.Calculator/Add :: ubbasel"));

        assert!(!channel.is_closed());
        channel.close().await;
        assert!(channel.is_closed());
        assert!(bus.is_empty().await);
    }

    #[tokio::test]
    async fn test_fixed_channel_addresses() {
        let channel = Channel::to_address("127.0.0.1:7777", RpcTransport::default(), InterceptorChain::new());
        assert_eq!(channel.target(), "127.0.0.1:7777");
        assert_eq!(channel.addresses().await.unwrap(), vec!["127.0.0.1:7777"]);
        channel.close().await;
        assert!(!channel.is_closed());
    }
}
