//! Resolution poller: keeps the address set of one target fresh

use crate::client::DirectoryApi;
use crate::watch::{Watch, WatchBus};
use resolver_api::{Code, Status, Target};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Which directory operation the poller issues
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResolveMode {
    /// `ResolveService`: one address, rotated by the directory
    #[default]
    Single,
    /// `ResolveServices`: every live address
    All,
}

/// Poller timing
#[derive(Clone, Debug)]
pub struct PollerConfig {
    /// Floor of the wait after addresses were found
    pub check_timeout: Duration,
    /// Wait after an empty or not-found answer
    pub not_found_timeout: Duration,
    /// Wait after any other failure
    pub error_retry: Duration,
    pub mode: ResolveMode,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            check_timeout: Duration::from_secs(4 * 60),
            not_found_timeout: Duration::from_secs(3),
            error_retry: Duration::from_secs(10),
            mode: ResolveMode::default(),
        }
    }
}

impl PollerConfig {
    /// Replace zero durations with the defaults
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if self.check_timeout.is_zero() {
            self.check_timeout = defaults.check_timeout;
        }
        if self.not_found_timeout.is_zero() {
            self.not_found_timeout = defaults.not_found_timeout;
        }
        if self.error_retry.is_zero() {
            self.error_retry = defaults.error_retry;
        }
        self
    }

    /// Wait after a successful poll returning `found` addresses
    fn success_wait(&self, found: bool, next_call_wait: i64) -> Duration {
        let hint = Duration::from_secs(u64::try_from(next_call_wait).unwrap_or(0));
        if found {
            hint.max(self.check_timeout)
        } else {
            hint.max(self.not_found_timeout)
        }
    }

    fn failure_wait(&self, status: &Status) -> Duration {
        if status.code() == Code::NotFound {
            self.not_found_timeout
        } else {
            self.error_retry
        }
    }
}

/// What the poller last learned about its target
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedState {
    /// Last known addresses; kept across failed polls
    pub addresses: Vec<String>,
    /// Failure of the most recent poll
    pub error: Option<Status>,
    /// Number of completed polls
    pub generation: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PollerState {
    Polling,
    Waiting(Duration),
    Closed,
}

/// Background task resolving one target until closed
pub struct ResolutionPoller {
    target: Target,
    directory: Arc<dyn DirectoryApi>,
    bus: WatchBus,
    config: PollerConfig,
}

impl ResolutionPoller {
    pub fn new(
        target: Target,
        directory: Arc<dyn DirectoryApi>,
        bus: WatchBus,
        config: PollerConfig,
    ) -> Self {
        Self {
            target,
            directory,
            bus,
            config: config.normalized(),
        }
    }

    /// Register the target on the watch bus and start polling
    pub async fn spawn(self) -> PollerHandle {
        let target = self.target.to_string();
        let refresh = self.bus.watch(&target).await;
        let (state_tx, state_rx) = watch::channel(ResolvedState::default());
        let shutdown = CancellationToken::new();

        info!("Start resolving {}", target);
        let task = tokio::spawn(self.run(refresh, state_tx, shutdown.clone()));

        PollerHandle {
            target,
            state: state_rx,
            shutdown,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    async fn run(
        self,
        mut refresh: Watch,
        state_tx: watch::Sender<ResolvedState>,
        shutdown: CancellationToken,
    ) {
        let target = self.target.to_string();
        let mut state = PollerState::Polling;

        loop {
            state = match state {
                PollerState::Polling => PollerState::Waiting(self.poll(&state_tx).await),
                PollerState::Waiting(wait) => {
                    debug!("Resolving {} again in {}s", target, wait.as_secs());
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => PollerState::Closed,
                        Some(()) = refresh.recv() => {
                            debug!("Refresh target {}", target);
                            PollerState::Polling
                        }
                        _ = tokio::time::sleep(wait) => PollerState::Polling,
                    }
                }
                PollerState::Closed => break,
            };
        }

        let id = refresh.id();
        drop(refresh);
        self.bus.release(&target, id).await;
        info!("Closed resolver for {}", target);
    }

    /// One resolution round; publishes the outcome and returns the next wait
    async fn poll(&self, state_tx: &watch::Sender<ResolvedState>) -> Duration {
        let name = self.target.endpoint();
        debug!("Start resolver for {}", name);

        let result = match self.config.mode {
            ResolveMode::Single => self.directory.resolve_service(name).await.map(|r| {
                let addresses = if r.addr.is_empty() { Vec::new() } else { vec![r.addr] };
                (addresses, r.next_call_wait)
            }),
            ResolveMode::All => self
                .directory
                .resolve_services(name)
                .await
                .map(|r| (r.addrs, r.next_call_wait)),
        };

        match result {
            Ok((addresses, next_call_wait)) => {
                let wait = self.config.success_wait(!addresses.is_empty(), next_call_wait);
                if addresses.is_empty() {
                    debug!("No service found for {}", name);
                } else {
                    debug!("Resolved {} to {:?}", name, addresses);
                }
                state_tx.send_modify(|state| {
                    state.addresses = addresses;
                    state.error = None;
                    state.generation += 1;
                });
                wait
            }
            Err(status) => {
                error!("Cannot resolve {}: {}", name, status);
                let wait = self.config.failure_wait(&status);
                state_tx.send_modify(|state| {
                    state.error = Some(status.with_context(format!("cannot resolve {}", name)));
                    state.generation += 1;
                });
                wait
            }
        }
    }
}

/// Handle to a running [`ResolutionPoller`]. Cloning shares the poller.
#[derive(Clone)]
pub struct PollerHandle {
    target: String,
    state: watch::Receiver<ResolvedState>,
    shutdown: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl PollerHandle {
    /// Target string as registered on the watch bus
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Latest published state, possibly before the first poll finished
    pub fn current(&self) -> ResolvedState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ResolvedState> {
        self.state.clone()
    }

    /// State after at least one completed poll
    pub async fn resolved(&self) -> Result<ResolvedState, Status> {
        let mut state = self.state.clone();
        state
            .wait_for(|s| s.generation > 0)
            .await
            .map(|s| s.clone())
            .map_err(|_| Status::unavailable(format!("resolver for {} is closed", self.target)))
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop polling and wait for the poller to release its watch
    pub async fn close(&self) {
        self.shutdown.cancel();
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Resolver task for {} failed: {}", self.target, e);
            }
        }
    }
}
