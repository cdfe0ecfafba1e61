//! Relation annotation.

use crate::error::AnnotateError;
use crate::model::{ChildFeature, Relation, Update};
use chrono::{DateTime, Utc};
use geohist_core::{
    reconcile, CancelSignal, ChangesetId, FeatureId, HistorySource, Options, Parent,
    Reconciliation, Versioned,
};
use std::sync::Arc;
use std::time::Duration;

struct RelationParent<'a> {
    relation: &'a Relation,
    refs: Vec<FeatureId>,
}

impl<'a> RelationParent<'a> {
    fn new(relation: &'a Relation) -> Self {
        Self {
            relation,
            refs: relation.member_ids(),
        }
    }
}

impl Versioned for RelationParent<'_> {
    fn feature_id(&self) -> FeatureId {
        self.relation.feature_id()
    }

    fn version(&self) -> u32 {
        self.relation.version
    }

    fn changeset_id(&self) -> ChangesetId {
        self.relation.changeset_id
    }

    fn visible(&self) -> bool {
        self.relation.visible
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.relation.timestamp
    }
}

impl Parent for RelationParent<'_> {
    fn committed(&self) -> Option<DateTime<Utc>> {
        self.relation.committed
    }

    fn refs(&self) -> &[FeatureId] {
        &self.refs
    }
}

/// Annotate `relations` with the member versions in effect while each
/// relation version was current.
///
/// Members of every kind receive version and changeset; node members also
/// receive their location. Node members change state when they move, other
/// members whenever they get a new version. Use [`Options::child_filter`] to
/// restrict updates to certain member kinds.
///
/// # Errors
///
/// Same as [`annotate_ways`](crate::annotate_ways).
pub async fn annotate_relations<S>(
    relations: &mut [Relation],
    source: Arc<S>,
    threshold: Duration,
    options: &Options,
    cancel: &CancelSignal,
) -> Result<(), AnnotateError>
where
    S: HistorySource<ChildFeature>,
{
    let options = Options {
        threshold,
        ..options.clone()
    };

    let results = {
        let parents: Vec<RelationParent<'_>> =
            relations.iter().map(RelationParent::new).collect();
        reconcile(&parents, source, &options, cancel).await?
    };

    for (relation, result) in relations.iter_mut().zip(&results) {
        apply(relation, result);
    }

    tracing::debug!(relations = relations.len(), "Annotated relations");
    Ok(())
}

fn apply(relation: &mut Relation, result: &Reconciliation<ChildFeature>) {
    for (member, child) in relation.members.iter_mut().zip(&result.baseline.state) {
        if let Some(child) = child {
            member.annotate(child);
        }
    }

    relation.updates = Update::collect(result);
}
