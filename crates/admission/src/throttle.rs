//! Per-origin request spacing.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use ingest_core::OriginKey;

struct OriginSlot {
    interval: Duration,
    last_grant: Instant,
}

/// Enforces a minimum interval between grants to the same origin.
///
/// Slots are reserved under the lock and waited on outside it, so
/// concurrent callers for one origin queue up one interval apart.
pub struct OriginThrottle {
    slots: Mutex<HashMap<OriginKey, OriginSlot>>,
    default_interval: Duration,
    overrides: HashMap<String, Duration>,
}

impl OriginThrottle {
    pub fn new(default_interval: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            default_interval,
            overrides: HashMap::new(),
        }
    }

    /// Sets a specific interval for one origin.
    pub fn with_override(mut self, origin: impl Into<String>, interval: Duration) -> Self {
        self.overrides.insert(origin.into(), interval);
        self
    }

    pub fn interval_for(&self, origin: &OriginKey) -> Duration {
        self.overrides
            .get(origin.as_str())
            .copied()
            .unwrap_or(self.default_interval)
    }

    /// Reserves the next grant time for `origin`.
    pub fn reserve(&self, origin: &OriginKey) -> Instant {
        let now = Instant::now();
        let interval = self.interval_for(origin);
        let mut slots = self.slots.lock();

        let grant = match slots.get(origin) {
            Some(slot) => (slot.last_grant + slot.interval).max(now),
            None => now,
        };
        slots.insert(
            origin.clone(),
            OriginSlot {
                interval,
                last_grant: grant,
            },
        );
        grant
    }

    /// Waits until `origin` may be contacted again.
    pub async fn acquire(&self, origin: &OriginKey) {
        let grant = self.reserve(origin);
        tokio::time::sleep_until(grant).await;
    }

    /// Drops origins whose interval has fully elapsed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| slot.last_grant + slot.interval > now);
        before - slots.len()
    }

    /// Number of origins currently tracked.
    pub fn tracked(&self) -> usize {
        self.slots.lock().len()
    }
}
