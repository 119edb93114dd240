//! Request pacing for sequential batch retrieval
//!
//! Pure timing policy, kept separate from the fetch loop so tests can run
//! without sleeping.

use std::time::Duration;

/// Delay policy applied between consecutive provider requests
pub trait Pacer: Send + Sync {
    /// Block until the next request may be issued
    fn pause(&self);
}

/// Sleep a fixed interval between requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay(pub Duration);

impl FixedDelay {
    /// Default spacing between message fetches
    pub const DEFAULT: FixedDelay = FixedDelay(Duration::from_millis(100));

    pub fn from_millis(millis: u64) -> Self {
        Self(Duration::from_millis(millis))
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Pacer for FixedDelay {
    fn pause(&self) {
        if !self.0.is_zero() {
            std::thread::sleep(self.0);
        }
    }
}

/// No pacing at all
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoDelay;

impl Pacer for NoDelay {
    fn pause(&self) {}
}

/// Pacer for a configured delay; zero means no pacing
pub fn pacer_for(delay: Duration) -> Box<dyn Pacer> {
    if delay.is_zero() {
        Box::new(NoDelay)
    } else {
        Box::new(FixedDelay(delay))
    }
}
