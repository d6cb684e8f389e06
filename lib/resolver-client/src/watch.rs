//! Watch/refresh signal bus between failing calls and resolution pollers

use resolver_rpc::RefreshTarget;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

/// Longest a refresh waits for room in a watcher's channel
pub const REFRESH_SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// One registration on the bus, receiving refresh signals for its target
#[derive(Debug)]
pub struct Watch {
    id: u64,
    signals: mpsc::Receiver<()>,
}

impl Watch {
    /// Tells this registration apart from later ones for the same target
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next refresh signal; `None` once the bus dropped this registration
    pub async fn recv(&mut self) -> Option<()> {
        self.signals.recv().await
    }
}

/// Maps target strings to the refresh channel of the poller watching them.
///
/// Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct WatchBus {
    watchers: Arc<RwLock<HashMap<String, (u64, mpsc::Sender<()>)>>>,
    next_id: Arc<AtomicU64>,
}

impl WatchBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a watcher for `target`, replacing any previous one
    pub async fn watch(&self, target: &str) -> Watch {
        let (tx, rx) = mpsc::channel(1);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut watchers = self.watchers.write().await;
        if watchers.insert(target.to_string(), (id, tx)).is_some() {
            debug!("Replaced watcher for {}", target);
        }
        Watch { id, signals: rx }
    }

    /// Drop whatever watcher `target` has
    pub async fn unwatch(&self, target: &str) {
        if self.watchers.write().await.remove(target).is_some() {
            debug!("Stopped watching {}", target);
        }
    }

    /// Drop the watcher of `target` only if it is still registration `id`
    pub async fn release(&self, target: &str, id: u64) -> bool {
        let mut watchers = self.watchers.write().await;
        match watchers.get(target) {
            Some((current, _)) if *current == id => {
                watchers.remove(target);
                debug!("Stopped watching {}", target);
                true
            }
            Some(_) => {
                debug!("Watcher {} for {} already replaced", id, target);
                false
            }
            None => false,
        }
    }

    /// Ask the watcher of `target` to resolve again.
    ///
    /// Returns whether the signal was delivered. Unknown targets and watchers
    /// that stay busy for [`REFRESH_SEND_TIMEOUT`] drop the signal.
    pub async fn refresh_resolver(&self, target: &str) -> bool {
        let sender = match self.watchers.read().await.get(target) {
            Some((_, sender)) => sender.clone(),
            None => {
                debug!("No watcher for {}, refresh dropped", target);
                return false;
            }
        };
        match sender.send_timeout((), REFRESH_SEND_TIMEOUT).await {
            Ok(()) => {
                debug!("Refresh sent to {}", target);
                true
            }
            Err(e) => {
                debug!("Refresh for {} dropped: {}", target, e);
                false
            }
        }
    }

    pub async fn is_watched(&self, target: &str) -> bool {
        self.watchers.read().await.contains_key(target)
    }

    pub async fn len(&self) -> usize {
        self.watchers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.watchers.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl RefreshTarget for WatchBus {
    async fn refresh(&self, target: &str) {
        self.refresh_resolver(target).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_refresh_reaches_watcher() {
        let bus = WatchBus::new();
        let mut rx = bus.watch("miniresolver:calc").await;
        assert!(bus.is_watched("miniresolver:calc").await);

        assert!(bus.refresh_resolver("miniresolver:calc").await);
        assert_eq!(rx.recv().await, Some(()));
    }

    #[tokio::test]
    async fn test_refresh_without_watcher_is_dropped() {
        let bus = WatchBus::new();
        assert!(!bus.refresh_resolver("miniresolver:calc").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_to_busy_watcher_times_out() {
        let bus = WatchBus::new();
        let _rx = bus.watch("miniresolver:calc").await;

        // the first signal fills the channel; the second gives up after the timeout
        assert!(bus.refresh_resolver("miniresolver:calc").await);
        let started = tokio::time::Instant::now();
        assert!(!bus.refresh_resolver("miniresolver:calc").await);
        assert_eq!(started.elapsed(), REFRESH_SEND_TIMEOUT);
    }

    #[tokio::test]
    async fn test_unwatch_and_replace() {
        let bus = WatchBus::new();
        let mut first = bus.watch("miniresolver:calc").await;
        let mut second = bus.watch("miniresolver:calc").await;
        assert_eq!(bus.len().await, 1);

        // the replaced watcher's sender is gone
        assert_eq!(first.recv().await, None);
        assert!(bus.refresh_resolver("miniresolver:calc").await);
        assert_eq!(second.recv().await, Some(()));

        bus.unwatch("miniresolver:calc").await;
        assert!(bus.is_empty().await);
        assert!(!bus.refresh_resolver("miniresolver:calc").await);
    }

    #[tokio::test]
    async fn test_closed_watcher_drops_refresh() {
        let bus = WatchBus::new();
        drop(bus.watch("miniresolver:calc").await);
        assert!(!bus.refresh_resolver("miniresolver:calc").await);
    }

    #[tokio::test]
    async fn test_release_leaves_newer_watcher_alone() {
        let bus = WatchBus::new();
        let old = bus.watch("miniresolver:calc").await;
        let mut new = bus.watch("miniresolver:calc").await;
        assert_ne!(old.id(), new.id());

        assert!(!bus.release("miniresolver:calc", old.id()).await);
        assert!(bus.is_watched("miniresolver:calc").await);
        assert!(bus.refresh_resolver("miniresolver:calc").await);
        assert_eq!(new.recv().await, Some(()));

        assert!(bus.release("miniresolver:calc", new.id()).await);
        assert!(bus.is_empty().await);
    }
}
