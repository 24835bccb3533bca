//! The single time budget shared by every blocking step of a session.

use std::time::Duration;
use tokio::time::Instant;

/// Default session budget when the caller does not supply one.
pub const DEFAULT_BUDGET: Duration = Duration::from_secs(60);

/// An absolute expiry for a whole session: connect plus every command.
///
/// Created once with [`Deadline::start`] and only ever read afterwards, so a
/// slow early command leaves less time for the ones that follow.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    budget: Duration,
}

impl Deadline {
    /// Start the clock now with a fixed `budget`.
    pub fn start(budget: Duration) -> Self {
        Self {
            start: Instant::now(),
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time left in the budget, saturating at zero once it is spent.
    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }
}
