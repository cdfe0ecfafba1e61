//! # geohist Core
//!
//! Version reconciliation engine for composite features whose children are
//! versioned independently.
//!
//! A parent (for example a way referencing an ordered list of nodes) only records
//! edits to its own reference list. This crate reconstructs what the parent
//! actually looked like over time:
//! - Timelines of each child's versions, ordered and gap-aware
//! - The validity window of one parent version
//! - A k-way merge of child transitions clipped to that window
//! - Threshold coalescing with self-changeset and no-op suppression
//! - A baseline state plus ordered checkpoints returned to the caller
//!
//! The [`compute::reconcile`] batch operation drives all of the above, fetching
//! child histories concurrently through a [`HistorySource`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod checkpoint;
pub mod coalesce;
pub mod compute;
pub mod error;
pub mod feature;
pub mod merge;
pub mod options;
pub mod source;
pub mod timeline;
pub mod window;

pub use cancel::CancelSignal;
pub use checkpoint::{materialize, Checkpoint, Reconciliation};
pub use compute::reconcile;
pub use error::{Error, Result};
pub use feature::{ChangesetId, Child, ElementId, FeatureId, FeatureKind, Parent, Versioned};
pub use options::{ChildFilter, Options};
pub use source::HistorySource;
pub use timeline::Timeline;
pub use window::ValidityWindow;
