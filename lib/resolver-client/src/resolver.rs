//! Client facade: directory access, channels and registration in one place

use crate::channel::Channel;
use crate::client::{DirectoryApi, DirectoryClient};
use crate::error::{ClientError, Result};
use crate::poller::{PollerConfig, ResolutionPoller, ResolveMode};
use crate::registration::{Registrar, RegistrarConfig};
use crate::watch::WatchBus;
use resolver_api::{qualified_name, Target};
use resolver_rpc::{
    ClientDomainInterceptor, InterceptorChain, LoadBalancer, LoadBalancingStrategy,
    LoggingInterceptor, RpcTransport,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Client side of miniresolver.
///
/// Channels are created once per qualified name and shared afterwards.
/// Names listed in the client map bypass resolution and dial a fixed address.
pub struct MiniResolver {
    directory: Option<Arc<dyn DirectoryApi>>,
    bus: WatchBus,
    poller_config: PollerConfig,
    client_map: HashMap<String, String>,
    transport: RpcTransport,
    interceptors: InterceptorChain,
    channels: Mutex<HashMap<String, Channel>>,
}

impl MiniResolver {
    /// Facade talking to the directory at `directory_addr`; `None` restricts
    /// it to the client map
    pub fn new(
        directory_addr: Option<&str>,
        client_map: HashMap<String, String>,
        transport: RpcTransport,
        poller_config: PollerConfig,
    ) -> Self {
        let bus = WatchBus::new();
        let interceptors = client_interceptors(&bus);
        let directory = directory_addr.map(|addr| {
            Arc::new(DirectoryClient::new(addr, transport.clone(), interceptors.clone()))
                as Arc<dyn DirectoryApi>
        });
        Self::build(directory, bus, interceptors, client_map, transport, poller_config)
    }

    /// Facade over an already constructed directory, e.g. a [`crate::LocalDirectory`]
    pub fn with_directory(
        directory: Arc<dyn DirectoryApi>,
        client_map: HashMap<String, String>,
        transport: RpcTransport,
        poller_config: PollerConfig,
    ) -> Self {
        let bus = WatchBus::new();
        let interceptors = client_interceptors(&bus);
        Self::build(Some(directory), bus, interceptors, client_map, transport, poller_config)
    }

    fn build(
        directory: Option<Arc<dyn DirectoryApi>>,
        bus: WatchBus,
        interceptors: InterceptorChain,
        client_map: HashMap<String, String>,
        transport: RpcTransport,
        poller_config: PollerConfig,
    ) -> Self {
        Self {
            directory,
            bus,
            poller_config,
            client_map,
            transport,
            interceptors,
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn directory(&self) -> Result<&Arc<dyn DirectoryApi>> {
        self.directory.as_ref().ok_or(ClientError::NoDirectory)
    }

    pub fn watch_bus(&self) -> &WatchBus {
        &self.bus
    }

    /// Client interceptors applied to every channel this facade creates
    pub fn interceptors(&self) -> &InterceptorChain {
        &self.interceptors
    }

    /// Ping the directory and return its acknowledgement
    pub async fn ping(&self) -> Result<String> {
        let response = self.directory()?.ping().await?;
        info!("Directory answered ping: {}", response.message);
        Ok(response.message)
    }

    /// Channel to `service` reached through `domain` (empty for none)
    pub async fn channel(&self, service: &str, domain: &str) -> Result<Channel> {
        let name = qualified_name(domain, service);
        let mut channels = self.channels.lock().await;
        if let Some(channel) = channels.get(&name) {
            if !channel.is_closed() {
                return Ok(channel.clone());
            }
            debug!("Channel for {} was closed, building a new one", name);
            channels.remove(&name);
        }

        let channel = if let Some(address) = self.client_map.get(&name) {
            debug!("Using mapped address {} for {}", address, name);
            Channel::to_address(address, self.transport.clone(), self.interceptors.clone())
        } else {
            let directory = self
                .directory
                .clone()
                .ok_or_else(|| ClientError::NoAddress(name.clone()))?;
            let poller = ResolutionPoller::new(
                Target::new(name.clone()),
                directory,
                self.bus.clone(),
                self.poller_config.clone(),
            )
            .spawn()
            .await;
            let strategy = match self.poller_config.mode {
                ResolveMode::Single => LoadBalancingStrategy::PickFirst,
                ResolveMode::All => LoadBalancingStrategy::RoundRobin,
            };
            Channel::resolved(
                poller,
                self.transport.clone(),
                LoadBalancer::new(strategy),
                self.interceptors.clone(),
            )
        };

        channels.insert(name, channel.clone());
        Ok(channel)
    }

    /// One channel per domain, keyed by domain
    pub async fn channels(&self, service: &str, domains: &[String]) -> Result<HashMap<String, Channel>> {
        let mut result = HashMap::new();
        for domain in domains {
            result.insert(domain.clone(), self.channel(service, domain).await?);
        }
        Ok(result)
    }

    /// Registrar keeping `config.services` registered with the directory
    pub fn registrar(&self, config: RegistrarConfig) -> Result<Registrar> {
        Ok(Registrar::new(self.directory()?.clone(), config))
    }

    /// Close every channel created so far
    pub async fn close(&self) {
        let channels: Vec<Channel> = self.channels.lock().await.drain().map(|(_, c)| c).collect();
        for channel in channels {
            channel.close().await;
        }
        info!("Closed miniresolver client");
    }
}

fn client_interceptors(bus: &WatchBus) -> InterceptorChain {
    InterceptorChain::new()
        .add(ClientDomainInterceptor::with_refresher(Arc::new(bus.clone())))
        .add(LoggingInterceptor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::LocalDirectory;
    use resolver_api::{Code, ServiceData};
    use resolver_core::{AlwaysReachable, DirectoryConfig, ServiceDirectory};
    use resolver_rpc::DirectoryRpc;

    fn local() -> Arc<dyn DirectoryApi> {
        Arc::new(LocalDirectory::new(DirectoryRpc::new(ServiceDirectory::new(
            DirectoryConfig::default(),
            Arc::new(AlwaysReachable),
        ))))
    }

    #[tokio::test]
    async fn test_client_map_bypasses_resolution() {
        let mut client_map = HashMap::new();
        client_map.insert("ubbasel.calc".to_string(), "10.0.0.1:9000".to_string());
        let resolver = MiniResolver::new(None, client_map, RpcTransport::default(), PollerConfig::default());

        let channel = resolver.channel("calc", "ubbasel").await.unwrap();
        assert_eq!(channel.addresses().await.unwrap(), vec!["10.0.0.1:9000"]);
        assert!(resolver.watch_bus().is_empty().await);

        assert!(matches!(
            resolver.channel("calc", "other").await,
            Err(ClientError::NoAddress(name)) if name == "other.calc"
        ));
        assert!(matches!(resolver.ping().await, Err(ClientError::NoDirectory)));
    }

    #[tokio::test]
    async fn test_channels_are_shared_per_name() {
        let directory = local();
        directory
            .add_service(&ServiceData {
                service: "calc".to_string(),
                host: Some("10.0.0.1".to_string()),
                port: 9000,
                domains: vec!["a".to_string(), "b".to_string()],
                single: false,
            })
            .await
            .unwrap();
        let resolver = MiniResolver::with_directory(
            directory,
            HashMap::new(),
            RpcTransport::default(),
            PollerConfig::default(),
        );
        assert_eq!(resolver.ping().await.unwrap(), "pong");
        assert_eq!(resolver.interceptors().len(), 2);

        let channels = resolver
            .channels("calc", &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels["a"].target(), "miniresolver:a.calc");
        assert_eq!(channels["b"].addresses().await.unwrap(), vec!["10.0.0.1:9000"]);

        let again = resolver.channel("calc", "a").await.unwrap();
        assert_eq!(again.target(), channels["a"].target());
        assert_eq!(resolver.watch_bus().len().await, 2);

        resolver.close().await;
        assert!(resolver.watch_bus().is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_service_is_unavailable() {
        let resolver = MiniResolver::with_directory(
            local(),
            HashMap::new(),
            RpcTransport::default(),
            PollerConfig::default(),
        );
        let channel = resolver.channel("calc", "").await.unwrap();
        let err = channel.addresses().await.unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
        resolver.close().await;
    }

    #[tokio::test]
    async fn test_closed_channel_is_rebuilt() {
        let directory = local();
        let resolver = MiniResolver::with_directory(
            directory.clone(),
            HashMap::new(),
            RpcTransport::default(),
            PollerConfig::default(),
        );
        let first = resolver.channel("calc", "").await.unwrap();
        assert!(first.addresses().await.is_err());
        first.close().await;
        assert!(!resolver.watch_bus().is_watched("miniresolver:calc").await);

        directory
            .add_service(&ServiceData {
                service: "calc".to_string(),
                host: Some("10.0.0.1".to_string()),
                port: 9000,
                ..Default::default()
            })
            .await
            .unwrap();

        let second = resolver.channel("calc", "").await.unwrap();
        assert!(!second.is_closed());
        assert!(resolver.watch_bus().is_watched("miniresolver:calc").await);
        assert_eq!(second.addresses().await.unwrap(), vec!["10.0.0.1:9000"]);

        resolver.close().await;
        assert!(resolver.watch_bus().is_empty().await);
    }
}
