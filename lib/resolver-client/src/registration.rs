//! Registration lifecycle: keep local services registered until shutdown

use crate::client::DirectoryApi;
use resolver_api::ServiceData;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// What to register and how often
#[derive(Clone, Debug)]
pub struct RegistrarConfig {
    /// Service names exposed by the local server
    pub services: Vec<String>,
    /// Explicit host; `None` lets the directory use the source address it sees
    pub host: Option<String>,
    pub port: u16,
    pub domains: Vec<String>,
    pub single: bool,
    /// Wait used when the directory returns a zero wait
    pub fallback_wait: Duration,
    /// Wait used when no registration succeeded
    pub retry_wait: Duration,
    /// Deadline for the deregistration calls on shutdown
    pub deregister_timeout: Duration,
}

impl RegistrarConfig {
    pub fn new(services: Vec<String>, port: u16) -> Self {
        Self {
            services,
            host: None,
            port,
            domains: Vec::new(),
            single: false,
            fallback_wait: Duration::from_secs(5 * 60),
            retry_wait: Duration::from_secs(10),
            deregister_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_domains(mut self, domains: Vec<String>) -> Self {
        self.domains = domains;
        self
    }

    pub fn with_single(mut self, single: bool) -> Self {
        self.single = single;
        self
    }
}

/// Registers every configured service, renews on the directory's schedule and
/// deregisters once on shutdown.
pub struct Registrar {
    directory: Arc<dyn DirectoryApi>,
    config: RegistrarConfig,
}

impl Registrar {
    pub fn new(directory: Arc<dyn DirectoryApi>, config: RegistrarConfig) -> Self {
        Self { directory, config }
    }

    pub fn config(&self) -> &RegistrarConfig {
        &self.config
    }

    fn kind(&self) -> &'static str {
        if self.config.single {
            "single service"
        } else {
            "service"
        }
    }

    fn service_data(&self, service: &str) -> ServiceData {
        ServiceData {
            service: service.to_string(),
            host: self.config.host.clone(),
            port: self.config.port,
            domains: self.config.domains.clone(),
            single: self.config.single,
        }
    }

    /// Register every service once and return the wait before the next round.
    ///
    /// The wait is the smallest one the directory returned; zero falls back to
    /// `fallback_wait`, no success at all to `retry_wait`.
    pub async fn register_all(&self) -> Duration {
        let mut wait: Option<Duration> = None;
        for service in &self.config.services {
            info!(
                "Registering {} {:?}.{} on port {}",
                self.kind(),
                self.config.domains,
                service,
                self.config.port
            );
            match self.directory.add_service(&self.service_data(service)).await {
                Ok(response) => {
                    info!("{} registered: {}", self.kind(), response.response.message);
                    let returned = Duration::from_secs(u64::try_from(response.next_call_wait).unwrap_or(0));
                    let returned = if returned.is_zero() {
                        self.config.fallback_wait
                    } else {
                        returned
                    };
                    wait = Some(wait.map_or(returned, |w| w.min(returned)));
                }
                Err(status) => error!("Cannot register {} {}: {}", self.kind(), service, status),
            }
        }
        wait.unwrap_or(self.config.retry_wait)
    }

    /// Best-effort removal of every service, bounded by `deregister_timeout`
    pub async fn deregister_all(&self) {
        let removals = self.config.services.iter().map(|service| async move {
            info!("Unregistering {} {:?}.{}", self.kind(), self.config.domains, service);
            match self.directory.remove_service(&self.service_data(service)).await {
                Ok(response) => info!("{} unregistered: {}", self.kind(), response.message),
                Err(status) => error!("Cannot unregister {} {}: {}", self.kind(), service, status),
            }
        });

        if tokio::time::timeout(self.config.deregister_timeout, futures::future::join_all(removals))
            .await
            .is_err()
        {
            error!(
                "Deregistration did not finish within {}s, leaving entries to expire",
                self.config.deregister_timeout.as_secs()
            );
        }
    }

    /// Renew until `shutdown` is cancelled, then deregister
    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            let wait = self.register_all().await;
            debug!("Waiting {} seconds for refreshing services", wait.as_secs());
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Ending registration refresh loop");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
        self.deregister_all().await;
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resolver_api::{
        DefaultResponse, ResolverDefaultResponse, ServiceResponse, ServicesResponse, Status,
    };
    use std::sync::Mutex;

    /// Directory recording calls and answering with fixed waits per service
    struct Recorder {
        waits: Vec<(String, Result<i64, Status>)>,
        calls: Mutex<Vec<String>>,
        stall_removal: bool,
    }

    impl Recorder {
        fn new(waits: Vec<(&str, Result<i64, Status>)>) -> Arc<Self> {
            Arc::new(Self {
                waits: waits.into_iter().map(|(s, w)| (s.to_string(), w)).collect(),
                calls: Mutex::new(Vec::new()),
                stall_removal: false,
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl DirectoryApi for Recorder {
        async fn ping(&self) -> Result<DefaultResponse, Status> {
            Ok(DefaultResponse::ok("pong"))
        }

        async fn add_service(&self, data: &ServiceData) -> Result<ResolverDefaultResponse, Status> {
            self.calls.lock().unwrap().push(format!("add {}", data.service));
            let wait = self
                .waits
                .iter()
                .find(|(s, _)| *s == data.service)
                .map(|(_, w)| w.clone())
                .unwrap_or(Ok(0))?;
            Ok(ResolverDefaultResponse {
                response: DefaultResponse::ok("added"),
                next_call_wait: wait,
            })
        }

        async fn remove_service(&self, data: &ServiceData) -> Result<DefaultResponse, Status> {
            self.calls.lock().unwrap().push(format!("remove {}", data.service));
            if self.stall_removal {
                std::future::pending::<()>().await;
            }
            Ok(DefaultResponse::ok("removed"))
        }

        async fn resolve_service(&self, _name: &str) -> Result<ServiceResponse, Status> {
            Err(Status::unimplemented("resolve"))
        }

        async fn resolve_services(&self, _name: &str) -> Result<ServicesResponse, Status> {
            Err(Status::unimplemented("resolve"))
        }
    }

    fn config(services: &[&str]) -> RegistrarConfig {
        RegistrarConfig::new(services.iter().map(|s| s.to_string()).collect(), 9000)
            .with_domains(vec!["ubbasel".to_string()])
    }

    #[test]
    fn test_config_defaults() {
        let config = RegistrarConfig::new(vec!["calc".to_string()], 9000)
            .with_host("10.0.0.1")
            .with_single(true);
        assert_eq!(config.fallback_wait, Duration::from_secs(300));
        assert_eq!(config.deregister_timeout, Duration::from_secs(5));
        assert_eq!(config.host.as_deref(), Some("10.0.0.1"));
        assert!(config.single);
    }

    #[tokio::test]
    async fn test_wait_is_the_smallest_returned() {
        let directory = Recorder::new(vec![("a", Ok(200)), ("b", Ok(30)), ("c", Ok(0))]);
        let registrar = Registrar::new(directory.clone(), config(&["a", "b", "c"]));
        assert_eq!(registrar.register_all().await, Duration::from_secs(30));
        assert_eq!(directory.calls(), vec!["add a", "add b", "add c"]);
    }

    #[tokio::test]
    async fn test_zero_wait_falls_back() {
        let directory = Recorder::new(vec![("a", Ok(0))]);
        let registrar = Registrar::new(directory, config(&["a"]));
        assert_eq!(registrar.register_all().await, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_failures_retry_sooner() {
        let directory = Recorder::new(vec![
            ("a", Err(Status::unavailable("down"))),
            ("b", Ok(200)),
        ]);
        let registrar = Registrar::new(directory.clone(), config(&["a", "b"]));
        assert_eq!(registrar.register_all().await, Duration::from_secs(200));

        let registrar = Registrar::new(directory, config(&["a"]));
        assert_eq!(registrar.register_all().await, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_renews_then_deregisters() {
        let directory = Recorder::new(vec![("a", Ok(20))]);
        let shutdown = CancellationToken::new();
        let handle = Registrar::new(directory.clone(), config(&["a"])).spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_secs(45)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(directory.calls(), vec!["add a", "add a", "add a", "remove a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deregistration_is_bounded() {
        let directory = Arc::new(Recorder {
            waits: vec![],
            calls: Mutex::new(Vec::new()),
            stall_removal: true,
        });
        let registrar = Registrar::new(directory.clone(), config(&["a", "b"]));

        let started = tokio::time::Instant::now();
        registrar.deregister_all().await;
        assert_eq!(started.elapsed(), Duration::from_secs(5));
        assert_eq!(directory.calls(), vec!["remove a", "remove b"]);
    }
}
