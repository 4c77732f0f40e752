//! One-shot position triggers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A named timestamp that fires once when playback crosses it going forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionTrigger {
    pub name: String,
    pub target: Duration,
}

#[derive(Debug)]
struct Armed {
    trigger: PositionTrigger,
    /// Position when the trigger was armed. Targets at or behind it never
    /// fire until a seek moves the baseline.
    armed_at: Duration,
}

/// Pending triggers plus the position seen on the previous tick.
///
/// A trigger fires when `previous < target <= current`, so a tick that lands
/// exactly on the target fires and one that starts there does not.
///
/// Every rebaseline bumps `epoch`. A tick samples the epoch before reading the
/// engine position and is discarded if a seek landed in between.
#[derive(Debug, Default)]
pub(crate) struct PositionTriggers {
    pending: Vec<Armed>,
    last: Duration,
    epoch: u64,
}

impl PositionTriggers {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Arm `name` at `target`, replacing an earlier trigger with that name.
    pub(crate) fn register(&mut self, name: String, target: Duration, current: Duration) {
        self.pending.retain(|a| a.trigger.name != name);
        self.pending.push(Armed {
            trigger: PositionTrigger { name, target },
            armed_at: current,
        });
    }

    pub(crate) fn remove(&mut self, name: &str) -> bool {
        let before = self.pending.len();
        self.pending.retain(|a| a.trigger.name != name);
        before != self.pending.len()
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Record a tick at `current`, sampled while `epoch` was current.
    /// Returns `None` for a tick overtaken by a rebaseline.
    pub(crate) fn advance_from(
        &mut self,
        epoch: u64,
        current: Duration,
    ) -> Option<Vec<PositionTrigger>> {
        (epoch == self.epoch).then(|| self.advance(current))
    }

    /// Record a tick at `current` and return the triggers it crossed, in
    /// target order.
    fn advance(&mut self, current: Duration) -> Vec<PositionTrigger> {
        if current < self.last {
            self.rebaseline(current);
            return Vec::new();
        }

        let previous = self.last;
        self.last = current;

        let mut fired = Vec::new();
        self.pending.retain(|armed| {
            let target = armed.trigger.target;
            let crossed = previous < target && target <= current && armed.armed_at < target;
            if crossed {
                fired.push(armed.trigger.clone());
            }
            !crossed
        });
        fired.sort_by_key(|t| t.target);
        fired
    }

    /// Move the baseline without firing anything (seek, stop).
    pub(crate) fn rebaseline(&mut self, position: Duration) {
        self.epoch = self.epoch.wrapping_add(1);
        self.last = position;
        for armed in &mut self.pending {
            armed.armed_at = position;
        }
    }

    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }

    pub(crate) fn pending(&self) -> Vec<PositionTrigger> {
        self.pending.iter().map(|a| a.trigger.clone()).collect()
    }
}
