//! The history source contract the engine consumes.

use crate::feature::{Child, FeatureId};
use async_trait::async_trait;

/// Retrieves the full version history of a child feature.
///
/// Implementations own retry policy, caching and transport. The engine only
/// needs to tell "this child has no recorded history" apart from every other
/// failure, which it does through [`HistorySource::is_not_found`].
#[async_trait]
pub trait HistorySource<C: Child>: Send + Sync + 'static {
    /// Error produced by the source.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch every known version of `id`, in any order.
    async fn fetch_history(&self, id: FeatureId) -> Result<Vec<C>, Self::Error>;

    /// Whether `err` means the feature has no recorded history.
    fn is_not_found(&self, err: &Self::Error) -> bool;
}

