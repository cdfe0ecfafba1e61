//! Options recognized by a reconciliation batch.

use crate::error::{Error, Result};
use crate::feature::FeatureId;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default number of history fetches allowed in flight at once.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 16;

/// Predicate selecting which children are tracked for updates.
pub type ChildFilter = Arc<dyn Fn(FeatureId) -> bool + Send + Sync>;

/// Batch options.
#[derive(Clone)]
pub struct Options {
    /// Minimum spacing between emitted checkpoints
    pub threshold: Duration,
    /// Maximum simultaneous history fetches
    pub concurrency_limit: usize,
    /// Children rejected by the filter keep their baseline state and never
    /// produce checkpoints
    pub child_filter: Option<ChildFilter>,
    /// Fail when a visible parent references a child absent at its start
    pub require_visible_children: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            threshold: Duration::ZERO,
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            child_filter: None,
            require_visible_children: false,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("threshold", &self.threshold)
            .field("concurrency_limit", &self.concurrency_limit)
            .field("child_filter", &self.child_filter.is_some())
            .field("require_visible_children", &self.require_visible_children)
            .finish()
    }
}

impl Options {
    /// Options with the given threshold and defaults otherwise.
    #[must_use]
    pub fn with_threshold(threshold: Duration) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    /// Set the concurrency limit.
    #[must_use]
    pub fn concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    /// Only track children accepted by `filter`.
    #[must_use]
    pub fn child_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(FeatureId) -> bool + Send + Sync + 'static,
    {
        self.child_filter = Some(Arc::new(filter));
        self
    }

    /// Require every child of a visible parent to be present at its start.
    #[must_use]
    pub fn require_visible_children(mut self, require: bool) -> Self {
        self.require_visible_children = require;
        self
    }

    /// Whether updates are computed for `id`.
    #[must_use]
    pub fn tracks(&self, id: FeatureId) -> bool {
        self.child_filter.as_ref().map_or(true, |filter| filter(id))
    }

    /// Validate the options and return the threshold as a chrono duration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOptions`] if the concurrency limit is zero or the
    /// threshold is too large to represent.
    pub fn validate(&self) -> Result<chrono::Duration> {
        if self.concurrency_limit == 0 {
            return Err(Error::InvalidOptions(
                "concurrency limit must be positive".to_string(),
            ));
        }

        chrono::Duration::from_std(self.threshold).map_err(|_| {
            Error::InvalidOptions(format!("threshold {:?} out of range", self.threshold))
        })
    }
}
