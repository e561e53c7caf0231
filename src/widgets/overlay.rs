use dashmap::DashMap;

/// Default time-to-live of a fresh overlay, in updates
pub const DEFAULT_TTL_MAX: u32 = 20;

/// Lifecycle of one (entity, event type) overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayState {
    Absent,
    /// Just created or refreshed; fully opaque
    Active,
    /// Fading out with the remaining ttl
    Fading(u32),
}

/// Outcome of one overlay step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayStep {
    Created,
    Refreshed,
    Faded(u32),
    Removed,
    Untouched,
}

/// Time-to-live counters keyed by overlay id.
///
/// Event overlays step through [`OverlayTracker::advance`]; attribute
/// markers, which are never removed, use `refresh`/`decay`/`expire`.
#[derive(Debug)]
pub struct OverlayTracker {
    ttl_max: u32,
    ttls: DashMap<String, u32>,
}

impl Default for OverlayTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_MAX)
    }
}

impl OverlayTracker {
    pub fn new(ttl_max: u32) -> Self {
        Self {
            ttl_max: ttl_max.max(1),
            ttls: DashMap::new(),
        }
    }

    pub fn ttl_max(&self) -> u32 {
        self.ttl_max
    }

    pub fn ttl(&self, key: &str) -> Option<u32> {
        self.ttls.get(key).map(|ttl| *ttl)
    }

    pub fn state(&self, key: &str) -> OverlayState {
        match self.ttl(key) {
            None => OverlayState::Absent,
            Some(ttl) if ttl >= self.ttl_max => OverlayState::Active,
            Some(ttl) => OverlayState::Fading(ttl),
        }
    }

    /// Opacity for a ttl
    pub fn opacity(&self, ttl: u32) -> f64 {
        f64::from(ttl) / f64::from(self.ttl_max)
    }

    /// Reset `key` to the maximum ttl. Returns true when it was not tracked.
    pub fn refresh(&self, key: &str) -> bool {
        self.ttls.insert(key.to_string(), self.ttl_max).is_none()
    }

    /// Decrement the ttl of `key`, stopping at zero. Returns the new ttl,
    /// or `None` when it is not tracked.
    pub fn decay(&self, key: &str) -> Option<u32> {
        self.ttls.get_mut(key).map(|mut ttl| {
            *ttl = ttl.saturating_sub(1);
            *ttl
        })
    }

    /// Set the ttl of `key` to zero, tracking it if needed
    pub fn expire(&self, key: &str) {
        self.ttls.insert(key.to_string(), 0);
    }

    pub fn remove(&self, key: &str) -> Option<u32> {
        self.ttls.remove(key).map(|(_, ttl)| ttl)
    }

    pub fn clear(&self) {
        self.ttls.clear();
    }

    pub fn len(&self) -> usize {
        self.ttls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ttls.is_empty()
    }

    /// One update of an event overlay.
    ///
    /// Present events create or refresh the overlay at the maximum ttl.
    /// Absent events fade a tracked overlay by one step; an overlay already
    /// at zero is removed.
    pub fn advance(&self, key: &str, present: bool) -> OverlayStep {
        if present {
            return if self.refresh(key) {
                OverlayStep::Created
            } else {
                OverlayStep::Refreshed
            };
        }

        match self.ttl(key) {
            None => OverlayStep::Untouched,
            Some(0) => {
                self.ttls.remove(key);
                OverlayStep::Removed
            }
            Some(_) => self.decay(key).map_or(OverlayStep::Untouched, OverlayStep::Faded),
        }
    }
}
