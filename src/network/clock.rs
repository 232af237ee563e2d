use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Logical time, counted in ticks.
pub type Tick = u64;

pub trait Clock: Send + Sync {
    fn now(&self) -> Tick;
}

/// Monotonic tick counter shared by every node of a simulation.
///
/// Clones observe the same counter.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    tick: Arc<AtomicU64>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves time forward by one tick and returns the new value.
    pub fn advance(&self) -> Tick {
        self.tick.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Clock for SimClock {
    fn now(&self) -> Tick {
        self.tick.load(Ordering::SeqCst)
    }
}
