//! Errors surfaced by the reconciliation engine.

use crate::feature::{ElementId, FeatureId};
use chrono::{DateTime, Utc};

/// Boxed error returned by a history source.
pub type SourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias for engine operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while reconciling a batch of parents.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A referenced child has an empty version set
    #[error("malformed history for {child}: no versions recorded")]
    MalformedHistory {
        /// The child with no versions
        child: FeatureId,
        /// First parent referencing it, when known
        parent: Option<ElementId>,
    },
    /// The history source failed with something other than not-found
    #[error("history retrieval failed for {child}: {source}")]
    Retrieval {
        /// The child being fetched
        child: FeatureId,
        /// Underlying source error
        #[source]
        source: SourceError,
    },
    /// The cancel signal fired before the batch completed
    #[error("reconciliation cancelled")]
    Cancelled,
    /// A visible parent references a child that is absent at its start
    #[error("{parent} references {child} which is not visible at {at}")]
    NoVisibleChild {
        /// The parent version
        parent: ElementId,
        /// The absent child
        child: FeatureId,
        /// Start of the parent's validity window
        at: DateTime<Utc>,
    },
    /// Options failed validation
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    /// A fetch task terminated abnormally
    #[error("fetch task failed: {0}")]
    Task(String),
}

impl Error {
    /// The parent version that triggered the failure, if identifiable.
    #[must_use]
    pub fn parent(&self) -> Option<ElementId> {
        match self {
            Error::MalformedHistory { parent, .. } => *parent,
            Error::NoVisibleChild { parent, .. } => Some(*parent),
            _ => None,
        }
    }

    /// The child feature involved in the failure, if any.
    #[must_use]
    pub fn child(&self) -> Option<FeatureId> {
        match self {
            Error::MalformedHistory { child, .. }
            | Error::Retrieval { child, .. }
            | Error::NoVisibleChild { child, .. } => Some(*child),
            _ => None,
        }
    }
}
