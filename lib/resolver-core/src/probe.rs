//! Reachability probing for registered addresses

use async_trait::async_trait;

/// Answers whether a registered address still accepts calls.
///
/// The directory only evicts on a `false` answer, so implementations should
/// report `false` for transport-level unavailability only and treat any
/// application-level reply as proof of life.
#[async_trait]
pub trait AddressProbe: Send + Sync {
    async fn is_reachable(&self, address: &str) -> bool;
}

/// Probe that never evicts anything
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysReachable;

#[async_trait]
impl AddressProbe for AlwaysReachable {
    async fn is_reachable(&self, _address: &str) -> bool {
        true
    }
}
