//! Way annotation.

use crate::error::AnnotateError;
use crate::model::{Node, Update, Way};
use chrono::{DateTime, Utc};
use geohist_core::{
    reconcile, CancelSignal, ChangesetId, FeatureId, HistorySource, Options, Parent,
    Reconciliation, Versioned,
};
use std::sync::Arc;
use std::time::Duration;

/// Views a [`Way`] as a reconciliation parent over its node references.
struct WayParent<'a> {
    way: &'a Way,
    refs: Vec<FeatureId>,
}

impl<'a> WayParent<'a> {
    fn new(way: &'a Way) -> Self {
        Self {
            way,
            refs: way.node_ids(),
        }
    }
}

impl Versioned for WayParent<'_> {
    fn feature_id(&self) -> FeatureId {
        self.way.feature_id()
    }

    fn version(&self) -> u32 {
        self.way.version
    }

    fn changeset_id(&self) -> ChangesetId {
        self.way.changeset_id
    }

    fn visible(&self) -> bool {
        self.way.visible
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.way.timestamp
    }
}

impl Parent for WayParent<'_> {
    fn committed(&self) -> Option<DateTime<Utc>> {
        self.way.committed
    }

    fn refs(&self) -> &[FeatureId] {
        &self.refs
    }
}

/// Annotate `ways` with the node versions in effect while each way version
/// was current.
///
/// Each way node receives the version, changeset and location of the node at
/// the way's effective timestamp. Later node changes are recorded in
/// `way.updates`, spaced at least `threshold` apart. When `ways` holds several
/// versions of the same way, each version's window ends where the next begins.
///
/// `threshold` overrides the threshold in `options`.
///
/// # Errors
///
/// - [`AnnotateError::NoHistory`] if the source returns no versions for a node
/// - [`AnnotateError::NoVisibleChild`] under `require_visible_children`
/// - [`AnnotateError::Cancelled`] if `cancel` fires first
/// - [`AnnotateError::Reconcile`] for retrieval and option failures
///
/// On error no way is modified.
pub async fn annotate_ways<S>(
    ways: &mut [Way],
    source: Arc<S>,
    threshold: Duration,
    options: &Options,
    cancel: &CancelSignal,
) -> Result<(), AnnotateError>
where
    S: HistorySource<Node>,
{
    let options = Options {
        threshold,
        ..options.clone()
    };

    let results = {
        let parents: Vec<WayParent<'_>> = ways.iter().map(WayParent::new).collect();
        reconcile(&parents, source, &options, cancel).await?
    };

    for (way, result) in ways.iter_mut().zip(&results) {
        apply(way, result);
    }

    tracing::debug!(ways = ways.len(), "Annotated ways");
    Ok(())
}

fn apply(way: &mut Way, result: &Reconciliation<Node>) {
    for (way_node, node) in way.nodes.iter_mut().zip(&result.baseline.state) {
        if let Some(node) = node {
            way_node.annotate(node);
        }
    }

    way.updates = Update::collect(result);
}
