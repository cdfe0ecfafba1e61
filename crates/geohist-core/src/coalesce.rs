//! Threshold coalescing of raw child transitions into checkpoints.
//!
//! # Rules
//!
//! | Rule | Effect |
//! |------|--------|
//! | Self-changeset | Transitions made in the parent's own changeset are absorbed into the running state; they never produce a checkpoint on their own |
//! | Grouping | A transition sharing the open group's latest timestamp, or less than `threshold` after it, joins the group; the checkpoint is dated at the group's last transition |
//! | No-op | A group whose resulting state is materially identical to the previous checkpoint is discarded |

use crate::checkpoint::Checkpoint;
use crate::feature::{same_slot, ChangesetId, Child, Versioned};
use crate::merge::Event;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Turns a chronological event stream into checkpoints.
#[derive(Debug, Clone, Copy)]
pub struct Coalescer {
    changeset: ChangesetId,
    threshold: Duration,
}

struct Pending<'a, C> {
    event: Event<'a, C>,
    absorbed: bool,
}

impl Coalescer {
    /// Coalescer for a parent edited in `changeset`.
    ///
    /// Negative thresholds are treated as zero.
    #[must_use]
    pub fn new(changeset: ChangesetId, threshold: Duration) -> Self {
        Self {
            changeset,
            threshold: threshold.max(Duration::zero()),
        }
    }

    /// Whether a transition at `at` starts a new group after one ending at `end`.
    fn closes(&self, end: DateTime<Utc>, at: DateTime<Utc>) -> bool {
        let gap = at - end;
        gap > Duration::zero() && gap >= self.threshold
    }

    /// Coalesce `events` starting from `baseline`, one slot per reference position.
    pub fn run<'a, C, I>(&self, baseline: &[Option<C>], events: I) -> Vec<Checkpoint<C>>
    where
        C: Child,
        I: IntoIterator<Item = Event<'a, C>>,
    {
        let mut state = RunState::new(baseline);
        let mut pending = VecDeque::new();
        let mut group_end = None;

        for event in events {
            let absorbed = event.version.changeset_id() == self.changeset;

            if !absorbed {
                if let Some(end) = group_end {
                    if self.closes(end, event.timestamp) {
                        state.flush(&mut pending, end);
                    }
                }
                group_end = Some(event.timestamp);
            }

            pending.push_back(Pending { event, absorbed });
        }

        if let Some(end) = group_end {
            state.flush(&mut pending, end);
        }

        state.checkpoints
    }
}

struct RunState<C> {
    /// Latest version per position, including suppressed and absorbed ones
    current: Vec<Option<C>>,
    /// Whether the latest version per position came from the parent's changeset
    absorbed: Vec<bool>,
    /// State of the last emitted checkpoint (or the baseline)
    emitted: Vec<Option<C>>,
    checkpoints: Vec<Checkpoint<C>>,
}

impl<C: Child> RunState<C> {
    fn new(baseline: &[Option<C>]) -> Self {
        Self {
            current: baseline.to_vec(),
            absorbed: vec![false; baseline.len()],
            emitted: baseline.to_vec(),
            checkpoints: Vec::new(),
        }
    }

    /// Apply every pending transition up to `cutoff` and emit a checkpoint if
    /// the state moved away from the last checkpoint through at least one
    /// transition outside the parent's changeset.
    fn flush(&mut self, pending: &mut VecDeque<Pending<'_, C>>, cutoff: DateTime<Utc>) {
        while pending
            .front()
            .is_some_and(|p| p.event.timestamp <= cutoff)
        {
            let Some(Pending { event, absorbed }) = pending.pop_front() else {
                break;
            };
            self.current[event.position] = event.state().cloned();
            self.absorbed[event.position] = absorbed;
        }

        let changed: Vec<usize> = self
            .current
            .iter()
            .zip(&self.emitted)
            .enumerate()
            .filter(|(_, (now, before))| !same_slot(now.as_ref(), before.as_ref()))
            .map(|(position, _)| position)
            .collect();

        if !changed.iter().any(|&position| !self.absorbed[position]) {
            tracing::trace!(
                at = %cutoff,
                changed = changed.len(),
                "Suppressed checkpoint with no material change"
            );
            return;
        }

        self.emitted.clone_from(&self.current);
        self.checkpoints.push(Checkpoint {
            timestamp: cutoff,
            state: self.current.clone(),
            changed,
        });
    }
}
