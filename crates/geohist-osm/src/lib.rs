//! # geohist OSM adapter
//!
//! OSM-style nodes, ways and relations on top of the reconciliation engine in
//! `geohist-core`.
//!
//! - [`annotate_ways`] fills every way node with the node version in effect at
//!   the way's timestamp and lists later node changes as [`Update`]s.
//! - [`annotate_relations`] does the same for relation members of any kind.
//! - [`HistoryDatasource`] is an in-memory history source built from an
//!   [`OsmDocument`].
//!
//! ```no_run
//! # async fn run(doc: geohist_osm::OsmDocument, mut ways: Vec<geohist_osm::Way>)
//! # -> Result<(), geohist_osm::AnnotateError> {
//! use geohist_core::{CancelSignal, Options};
//! use geohist_osm::{annotate_ways, HistoryDatasource};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let source = Arc::new(HistoryDatasource::from_document(doc));
//! annotate_ways(
//!     &mut ways,
//!     source,
//!     Duration::from_secs(30 * 60),
//!     &Options::default(),
//!     &CancelSignal::new(),
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod document;
pub mod error;
pub mod history;
pub mod model;
pub mod relations;
pub mod ways;

pub use document::OsmDocument;
pub use error::AnnotateError;
pub use history::{DatasourceError, HistoryDatasource};
pub use model::{ChildFeature, Member, Node, Relation, Tags, Update, Way, WayNode};
pub use relations::annotate_relations;
pub use ways::annotate_ways;
