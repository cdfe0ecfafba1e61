//! Validity windows of parent versions.

use crate::feature::Parent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The half-open interval `[start, end)` during which a parent version is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindow {
    /// Effective timestamp of the parent version
    pub start: DateTime<Utc>,
    /// Effective timestamp of the next version; `None` if unbounded
    pub end: Option<DateTime<Utc>>,
}

impl ValidityWindow {
    /// Create a window, collapsing it to empty if `end` is not after `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Self {
        let end = end.map(|end| end.max(start));
        Self { start, end }
    }

    /// Resolve the window of `parent`.
    ///
    /// The start is the committed timestamp rather than the nominal edit
    /// timestamp; only the committed one is causally consistent with child
    /// timestamps from the same store.
    #[must_use]
    pub fn resolve<P: Parent>(parent: &P, next_effective: Option<DateTime<Utc>>) -> Self {
        let start = parent.effective_timestamp();

        if parent.committed().is_some() && start != parent.timestamp() {
            tracing::debug!(
                parent = %parent.element_id(),
                nominal = %parent.timestamp(),
                committed = %start,
                "Committed timestamp diverges from nominal"
            );
        }

        if let Some(next) = next_effective {
            if next <= start {
                tracing::debug!(
                    parent = %parent.element_id(),
                    start = %start,
                    next = %next,
                    "Next version takes effect before this one, window is empty"
                );
            }
        }

        Self::new(start, next_effective)
    }

    /// Whether the window has no upper bound.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Whether the window contains no instant at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end.is_some_and(|end| end <= self.start)
    }

    /// Whether `at` lies within `[start, end)`.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && self.end.map_or(true, |end| at < end)
    }

    /// Whether `at` lies strictly after the start and before the end.
    #[must_use]
    pub fn admits_transition(&self, at: DateTime<Utc>) -> bool {
        at > self.start && self.end.map_or(true, |end| at < end)
    }

    /// The remainder of this window from `from` onward.
    #[must_use]
    pub fn tail(&self, from: DateTime<Utc>) -> Self {
        Self::new(from.max(self.start), self.end)
    }
}
