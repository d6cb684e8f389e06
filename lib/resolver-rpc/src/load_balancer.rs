//! Picking one address out of a resolved address list

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Load balancing strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadBalancingStrategy {
    /// Always the first address; the directory already rotates single-address answers
    #[default]
    PickFirst,
    /// Distribute calls evenly across every resolved address
    RoundRobin,
}

/// Load balancer selecting an address per call
#[derive(Clone, Debug, Default)]
pub struct LoadBalancer {
    strategy: LoadBalancingStrategy,
    round_robin_counter: Arc<AtomicUsize>,
}

impl LoadBalancer {
    pub fn new(strategy: LoadBalancingStrategy) -> Self {
        Self {
            strategy,
            round_robin_counter: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn strategy(&self) -> LoadBalancingStrategy {
        self.strategy
    }

    pub fn select<'a>(&self, addresses: &'a [String]) -> Option<&'a str> {
        if addresses.is_empty() {
            return None;
        }

        match self.strategy {
            LoadBalancingStrategy::PickFirst => addresses.first().map(String::as_str),
            LoadBalancingStrategy::RoundRobin => {
                let current = self.round_robin_counter.fetch_add(1, Ordering::Relaxed);
                addresses.get(current % addresses.len()).map(String::as_str)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addresses() -> Vec<String> {
        vec!["a:1".to_string(), "b:1".to_string(), "c:1".to_string()]
    }

    #[test]
    fn test_empty_list() {
        let lb = LoadBalancer::new(LoadBalancingStrategy::RoundRobin);
        assert_eq!(lb.select(&[]), None);
    }

    #[test]
    fn test_pick_first() {
        let lb = LoadBalancer::default();
        assert_eq!(lb.strategy(), LoadBalancingStrategy::PickFirst);
        let addresses = addresses();
        assert_eq!(lb.select(&addresses), Some("a:1"));
        assert_eq!(lb.select(&addresses), Some("a:1"));
    }

    #[test]
    fn test_round_robin() {
        let lb = LoadBalancer::new(LoadBalancingStrategy::RoundRobin);
        let addresses = addresses();
        let picked: Vec<&str> = (0..4).filter_map(|_| lb.select(&addresses)).collect();
        assert_eq!(picked, vec!["a:1", "b:1", "c:1", "a:1"]);
    }
}
