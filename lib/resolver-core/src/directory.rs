//! Service directory mapping qualified service names to live addresses

use crate::{AddressProbe, CoreError, Result, ServiceEntry, MIN_NEXT_CALL_WAIT};
use futures::future::join_all;
use resolver_api::qualified_name;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Directory timing configuration
#[derive(Clone, Debug)]
pub struct DirectoryConfig {
    /// Maximum age of an address before it is dropped on read
    pub service_ttl: Duration,
    /// Interval between health sweeps
    pub sweep_interval: Duration,
    /// Probe newly registered addresses and drop them if unreachable
    pub check_new_addresses: bool,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            service_ttl: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(60),
            check_new_addresses: true,
        }
    }
}

/// ServiceDirectory holds every registered address, keyed by qualified name.
///
/// A single lock guards all entries. Cloning yields another handle to the
/// same directory.
#[derive(Clone)]
pub struct ServiceDirectory {
    services: Arc<Mutex<HashMap<String, ServiceEntry>>>,
    config: DirectoryConfig,
    probe: Arc<dyn AddressProbe>,
    shutdown: CancellationToken,
}

impl ServiceDirectory {
    pub fn new(config: DirectoryConfig, probe: Arc<dyn AddressProbe>) -> Self {
        Self {
            services: Arc::new(Mutex::new(HashMap::new())),
            config,
            probe,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Suggested renewal interval: two thirds of the TTL, never below the minimum wait
    pub fn registration_wait(&self) -> Duration {
        (self.config.service_ttl / 3 * 2).max(MIN_NEXT_CALL_WAIT)
    }

    /// Register `address` under every domain-qualified variant of `service`.
    ///
    /// A known address is only refreshed. With `single`, a new address
    /// replaces everything previously registered under that name.
    pub async fn add_service(
        &self,
        service: &str,
        address: &str,
        domains: &[String],
        single: bool,
    ) -> Result<Duration> {
        validate(service, address)?;
        let now = Instant::now();

        let mut added = Vec::new();
        let mut services = self.services.lock().await;
        for domain in domain_list(domains) {
            let name = qualified_name(domain, service);
            let entry = services
                .entry(name.clone())
                .or_insert_with(|| ServiceEntry::new(name.clone()));

            if entry.refresh_address(address, now) {
                debug!("Refreshed {} at {}", name, address);
                continue;
            }
            if single && !entry.is_empty() {
                debug!("Single service {}: replacing {:?}", name, entry.addresses());
                entry.clear();
            }
            entry.add_address(address, now);
            debug!("Registered {} at {} ({} known)", name, address, entry.len());
            added.push(name);
        }
        services.retain(|_, entry| !entry.is_empty());
        drop(services);

        if self.config.check_new_addresses && !added.is_empty() {
            self.spawn_admission_check(added, address.to_string());
        }
        Ok(self.registration_wait())
    }

    /// Probe a freshly registered address in the background and withdraw it
    /// from `names` if it does not answer.
    fn spawn_admission_check(&self, names: Vec<String>, address: String) {
        let directory = self.clone();
        tokio::spawn(async move {
            if directory.probe.is_reachable(&address).await || directory.shutdown.is_cancelled() {
                return;
            }
            warn!("{} not available on registration, dropping it from {:?}", address, names);
            let mut services = directory.services.lock().await;
            for name in &names {
                if let Some(entry) = services.get_mut(name) {
                    entry.remove_addresses([&address]);
                    if entry.is_empty() {
                        services.remove(name);
                    }
                }
            }
        });
    }

    /// Remove `address` from every domain-qualified variant of `service`
    pub async fn remove_service(&self, service: &str, address: &str, domains: &[String]) {
        let mut services = self.services.lock().await;
        for domain in domain_list(domains) {
            let name = qualified_name(domain, service);
            let Some(entry) = services.get_mut(&name) else {
                continue;
            };
            entry.remove_addresses([address]);
            debug!("Deregistered {} at {}", name, address);
            if entry.is_empty() {
                services.remove(&name);
                debug!("Dropped empty service {}", name);
            }
        }
    }

    /// Serve one address for `name` round-robin, evicting expired ones first
    pub async fn resolve_service(&self, name: &str) -> (Option<String>, Duration) {
        let now = Instant::now();
        let ttl = self.config.service_ttl;

        let mut services = self.services.lock().await;
        let Some(entry) = services.get_mut(name) else {
            return (None, MIN_NEXT_CALL_WAIT);
        };
        let served = entry.next_address(ttl, now);
        if entry.is_empty() {
            services.remove(name);
        }

        match served {
            Some((address, wait)) => (Some(address), wait),
            None => (None, MIN_NEXT_CALL_WAIT),
        }
    }

    /// Every live address for `name`, in rotation order, without rotating
    pub async fn resolve_services(&self, name: &str) -> (Vec<String>, Duration) {
        let now = Instant::now();
        let ttl = self.config.service_ttl;

        let mut services = self.services.lock().await;
        let Some(entry) = services.get_mut(name) else {
            return (Vec::new(), MIN_NEXT_CALL_WAIT);
        };
        let (addresses, wait) = entry.all_addresses(ttl, now);
        if entry.is_empty() {
            services.remove(name);
        }
        (addresses, wait)
    }

    /// Probe every registered address and evict the unreachable ones.
    ///
    /// Each distinct address is probed once, all of them concurrently and
    /// without holding the lock. Returns the number of evictions.
    pub async fn sweep_unavailable(&self) -> usize {
        let snapshot: Vec<(String, Vec<String>)> = {
            let services = self.services.lock().await;
            services
                .iter()
                .map(|(name, entry)| (name.clone(), entry.addresses()))
                .collect()
        };

        let mut distinct: Vec<&str> = snapshot
            .iter()
            .flat_map(|(_, addresses)| addresses.iter().map(String::as_str))
            .collect();
        distinct.sort_unstable();
        distinct.dedup();
        let answers = join_all(distinct.iter().map(|address| self.probe.is_reachable(address))).await;
        let reachable: HashMap<&str, bool> = distinct.into_iter().zip(answers).collect();

        let mut unavailable: Vec<(String, String)> = Vec::new();
        for (name, addresses) in &snapshot {
            for address in addresses {
                if !reachable.get(address.as_str()).copied().unwrap_or(true) {
                    debug!("{}::{} not available", name, address);
                    unavailable.push((name.clone(), address.clone()));
                }
            }
        }

        if unavailable.is_empty() {
            return 0;
        }

        let mut evicted = 0;
        let mut services = self.services.lock().await;
        for (name, address) in &unavailable {
            if let Some(entry) = services.get_mut(name) {
                if entry.contains(address) {
                    entry.remove_addresses([address]);
                    evicted += 1;
                }
                if entry.is_empty() {
                    services.remove(name);
                }
            }
        }
        evicted
    }

    /// Run [`sweep_unavailable`](Self::sweep_unavailable) every sweep interval until closed
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let directory = self.clone();
        let period = self.config.sweep_interval;
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!("Directory sweep started with interval: {:?}", period);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Directory sweep stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = directory.sweep_unavailable().await;
                        if evicted > 0 {
                            info!("Evicted {} unreachable addresses", evicted);
                        }
                    }
                }
            }
        })
    }

    /// Stop the sweeper and release every entry
    pub async fn close(&self) {
        self.shutdown.cancel();
        self.services.lock().await.clear();
    }

    /// Qualified names currently known, sorted
    pub async fn service_names(&self) -> Vec<String> {
        let services = self.services.lock().await;
        let mut names: Vec<String> = services.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of qualified names currently known
    pub async fn len(&self) -> usize {
        self.services.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.services.lock().await.is_empty()
    }
}

fn domain_list(domains: &[String]) -> Vec<&str> {
    if domains.is_empty() {
        vec![""]
    } else {
        domains.iter().map(String::as_str).collect()
    }
}

fn validate(service: &str, address: &str) -> Result<()> {
    if service.trim().is_empty() {
        return Err(CoreError::InvalidService(service.to_string()));
    }
    if address.trim().is_empty() || !address.contains(':') {
        return Err(CoreError::InvalidAddress {
            service: service.to_string(),
            address: address.to_string(),
        });
    }
    Ok(())
}
