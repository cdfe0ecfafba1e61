//! Annotation errors.

use chrono::{DateTime, Utc};
use geohist_core::{ElementId, FeatureId};

/// Errors that can occur while annotating ways or relations.
#[derive(Debug, thiserror::Error)]
pub enum AnnotateError {
    /// A referenced child has no versions at all
    #[error("no history recorded for {child}")]
    NoHistory {
        /// The child without history
        child: FeatureId,
        /// First parent referencing it, when known
        parent: Option<ElementId>,
    },

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

    /// Annotation was cancelled before it completed
    #[error("annotation cancelled")]
    Cancelled,

    /// Any other reconciliation failure
    #[error(transparent)]
    Reconcile(geohist_core::Error),
}

impl From<geohist_core::Error> for AnnotateError {
    fn from(err: geohist_core::Error) -> Self {
        use geohist_core::Error;

        match err {
            Error::MalformedHistory { child, parent } => Self::NoHistory { child, parent },
            Error::NoVisibleChild { parent, child, at } => {
                Self::NoVisibleChild { parent, child, at }
            }
            Error::Cancelled => Self::Cancelled,
            other => Self::Reconcile(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_history_maps_to_no_history() {
        let parent = FeatureId::way(1).at_version(2);
        let err = AnnotateError::from(geohist_core::Error::MalformedHistory {
            child: FeatureId::node(5),
            parent: Some(parent),
        });

        assert!(matches!(
            err,
            AnnotateError::NoHistory { child, parent: Some(p) }
                if child == FeatureId::node(5) && p == parent
        ));
        assert_eq!(err.to_string(), "no history recorded for node/5");
    }

    #[test]
    fn other_errors_pass_through() {
        let err = AnnotateError::from(geohist_core::Error::InvalidOptions("bad".to_string()));
        assert!(matches!(
            err,
            AnnotateError::Reconcile(geohist_core::Error::InvalidOptions(_))
        ));
        assert_eq!(err.to_string(), "invalid options: bad");
    }
}
