//! Address bookkeeping for one qualified service name

use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

/// Lower bound for every wait hint handed out by the directory
pub const MIN_NEXT_CALL_WAIT: Duration = Duration::from_secs(10);

/// Slack added to the youngest address age when all addresses are handed out
const ALL_ADDRESSES_SLACK: Duration = Duration::from_secs(2);

/// Live addresses registered under one qualified name.
///
/// `last_seen` and `order` always hold the same address set. The front of
/// `order` is served next; served addresses move to the back.
#[derive(Clone, Debug)]
pub struct ServiceEntry {
    name: String,
    last_seen: HashMap<String, Instant>,
    order: VecDeque<String>,
}

impl ServiceEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            last_seen: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.last_seen.contains_key(address)
    }

    /// Addresses in rotation order
    pub fn addresses(&self) -> Vec<String> {
        self.order.iter().cloned().collect()
    }

    /// Bump `last_seen` of a known address; returns false if the address is unknown
    pub fn refresh_address(&mut self, address: &str, now: Instant) -> bool {
        match self.last_seen.get_mut(address) {
            Some(seen) => {
                *seen = now;
                true
            }
            None => false,
        }
    }

    /// Add an address at the head of the rotation, or refresh it if already known
    pub fn add_address(&mut self, address: &str, now: Instant) {
        if self.last_seen.insert(address.to_string(), now).is_none() {
            self.order.push_front(address.to_string());
        }
    }

    pub fn remove_addresses<I, S>(&mut self, addresses: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for address in addresses {
            let address = address.as_ref();
            if self.last_seen.remove(address).is_some() {
                self.order.retain(|a| a != address);
            }
        }
    }

    pub fn clear(&mut self) {
        self.last_seen.clear();
        self.order.clear();
    }

    /// Drop addresses not seen within `ttl`; returns what was dropped
    pub fn remove_expired(&mut self, ttl: Duration, now: Instant) -> Vec<String> {
        let expired: Vec<String> = self
            .order
            .iter()
            .filter(|a| {
                self.last_seen
                    .get(a.as_str())
                    .is_some_and(|seen| now.saturating_duration_since(*seen) >= ttl)
            })
            .cloned()
            .collect();
        self.remove_addresses(&expired);
        expired
    }

    /// Serve the head address and rotate it to the tail.
    ///
    /// The wait hint is the age of the served address, floored at
    /// [`MIN_NEXT_CALL_WAIT`].
    pub fn next_address(&mut self, ttl: Duration, now: Instant) -> Option<(String, Duration)> {
        self.remove_expired(ttl, now);
        let address = self.order.pop_front()?;
        self.order.push_back(address.clone());

        let age = self
            .last_seen
            .get(&address)
            .map(|seen| now.saturating_duration_since(*seen))
            .unwrap_or_default();
        Some((address, age.max(MIN_NEXT_CALL_WAIT)))
    }

    /// Every live address in rotation order, without rotating
    pub fn all_addresses(&mut self, ttl: Duration, now: Instant) -> (Vec<String>, Duration) {
        self.remove_expired(ttl, now);
        (self.addresses(), self.next_call_wait(now))
    }

    fn next_call_wait(&self, now: Instant) -> Duration {
        let youngest = self
            .last_seen
            .values()
            .map(|seen| now.saturating_duration_since(*seen))
            .min();
        match youngest {
            Some(age) => (age + ALL_ADDRESSES_SLACK).max(MIN_NEXT_CALL_WAIT),
            None => MIN_NEXT_CALL_WAIT,
        }
    }
}
