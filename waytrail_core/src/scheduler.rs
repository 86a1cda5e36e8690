//! Scheduler Adapter - periodic callbacks on a shared base clock.
//!
//! Sessions register one task each, keyed by operator and kind. The
//! scheduler owns no callbacks; [`TickScheduler::advance`] returns which
//! keys are due and the engine dispatches them. A canceled key is gone
//! from the table immediately and never comes back from `advance`.

use std::collections::BTreeMap;
use waytrail_env::OperatorId;

/// Which session a task drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskKind {
    Capture,
    Playback,
}

/// Identity of a periodic task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    pub operator: OperatorId,
    pub kind: TaskKind,
}

impl TaskKey {
    pub fn capture(operator: OperatorId) -> Self {
        Self {
            operator,
            kind: TaskKind::Capture,
        }
    }

    pub fn playback(operator: OperatorId) -> Self {
        Self {
            operator,
            kind: TaskKind::Playback,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Registration {
    period: u64,
    next_due: u64,
}

/// Base-clock scheduler with fixed-period registrations.
#[derive(Debug, Default)]
pub struct TickScheduler {
    /// Base ticks elapsed
    tick: u64,

    /// Ordered so dispatch order is deterministic
    tasks: BTreeMap<TaskKey, Registration>,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `key` to fire on the next base tick and then every
    /// `period` ticks. Re-registering replaces the old schedule.
    ///
    /// Returns true if an existing registration was replaced.
    pub fn register(&mut self, key: TaskKey, period: u64) -> bool {
        let registration = Registration {
            period: period.max(1),
            next_due: self.tick + 1,
        };
        self.tasks.insert(key, registration).is_some()
    }

    /// Removes a registration. Returns true if one existed.
    pub fn cancel(&mut self, key: &TaskKey) -> bool {
        self.tasks.remove(key).is_some()
    }

    pub fn is_registered(&self, key: &TaskKey) -> bool {
        self.tasks.contains_key(key)
    }

    /// Advances the base clock one tick and returns the keys due on it.
    pub fn advance(&mut self) -> Vec<TaskKey> {
        self.tick += 1;
        let now = self.tick;

        let mut due = Vec::new();
        for (key, registration) in self.tasks.iter_mut() {
            if registration.next_due <= now {
                registration.next_due = now + registration.period;
                due.push(*key);
            }
        }
        due
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
