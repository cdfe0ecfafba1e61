//! Checkpoints and the materialized reconciliation of one parent version.

use crate::coalesce::Coalescer;
use crate::feature::{Child, ElementId, Parent};
use crate::merge::EventMerger;
use crate::timeline::Timeline;
use crate::window::ValidityWindow;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The reconciled state of every reference position at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint<C> {
    /// Instant the state took effect
    pub timestamp: DateTime<Utc>,
    /// Child version per reference position; `None` if absent
    pub state: Vec<Option<C>>,
    /// Positions that differ from the previous checkpoint
    pub changed: Vec<usize>,
}

impl<C> Checkpoint<C> {
    /// Child version at `position`, if present.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<&C> {
        self.state.get(position).and_then(Option::as_ref)
    }

    /// The changed positions paired with their new state.
    pub fn changes(&self) -> impl Iterator<Item = (usize, Option<&C>)> + '_ {
        self.changed.iter().map(|&position| (position, self.get(position)))
    }

    /// Number of reference positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.len()
    }

    /// Whether the parent references no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }
}

/// Reconciled history of one parent version.
///
/// The baseline is the state at the start of the window and is what the caller
/// writes back onto the parent's references. `updates` are the subsequent
/// checkpoints in time order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation<C> {
    /// Parent version this applies to
    pub parent: ElementId,
    /// Window the parent version was in effect
    pub window: ValidityWindow,
    /// State at `window.start`
    pub baseline: Checkpoint<C>,
    /// Later checkpoints, strictly increasing in time
    pub updates: Vec<Checkpoint<C>>,
}

impl<C> Reconciliation<C> {
    /// Result for a parent with nothing to reconcile.
    #[must_use]
    pub fn empty(parent: ElementId, window: ValidityWindow, positions: usize) -> Self {
        Self {
            parent,
            window,
            baseline: Checkpoint {
                timestamp: window.start,
                state: std::iter::repeat_with(|| None).take(positions).collect(),
                changed: Vec::new(),
            },
            updates: Vec::new(),
        }
    }

    /// The checkpoint in effect at `at`, if `at` is inside the window.
    #[must_use]
    pub fn state_at(&self, at: DateTime<Utc>) -> Option<&Checkpoint<C>> {
        if !self.window.contains(at) {
            return None;
        }

        let idx = self.updates.partition_point(|c| c.timestamp <= at);
        Some(idx.checked_sub(1).map_or(&self.baseline, |i| &self.updates[i]))
    }

    /// The last known state of the window.
    #[must_use]
    pub fn latest(&self) -> &Checkpoint<C> {
        self.updates.last().unwrap_or(&self.baseline)
    }
}

/// Reconcile one parent version against the timelines of its references.
///
/// `timelines` and `tracked` are aligned with `parent.refs()`. Untracked
/// positions keep their baseline state for the whole window.
#[must_use]
pub fn materialize<P, C>(
    parent: &P,
    window: ValidityWindow,
    timelines: &[&Timeline<C>],
    tracked: &[bool],
    threshold: Duration,
) -> Reconciliation<C>
where
    P: Parent,
    C: Child,
{
    let state: Vec<Option<C>> = timelines
        .iter()
        .map(|timeline| timeline.at(window.start).cloned())
        .collect();
    let changed = state
        .iter()
        .enumerate()
        .filter_map(|(position, slot)| slot.as_ref().map(|_| position))
        .collect();

    let lanes: Vec<Option<&Timeline<C>>> = timelines
        .iter()
        .zip(tracked)
        .map(|(timeline, &tracked)| tracked.then_some(*timeline))
        .collect();

    let events = EventMerger::new(window, &lanes);
    let updates = Coalescer::new(parent.changeset_id(), threshold).run(&state, events);

    tracing::debug!(
        parent = %parent.element_id(),
        positions = state.len(),
        updates = updates.len(),
        open = window.is_open(),
        "Materialized parent"
    );

    Reconciliation {
        parent: parent.element_id(),
        window,
        baseline: Checkpoint {
            timestamp: window.start,
            state,
            changed,
        },
        updates,
    }
}
