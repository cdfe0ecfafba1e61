//! Batch orchestration: fetch child histories, then reconcile every parent.

use crate::cancel::CancelSignal;
use crate::checkpoint::{materialize, Reconciliation};
use crate::error::{Error, Result};
use crate::feature::{Child, FeatureId, Parent};
use crate::options::Options;
use crate::source::HistorySource;
use crate::timeline::Timeline;
use crate::window::ValidityWindow;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Reconcile a batch of parent versions.
///
/// Every distinct child referenced by a visible parent is fetched once, with at
/// most `options.concurrency_limit` fetches in flight. Once all histories are
/// in, each parent is reconciled over its validity window. The window of a
/// parent ends where the next higher version of the same feature in `parents`
/// takes effect.
///
/// Results are positionally aligned with `parents`. The batch is all or
/// nothing: the first error (or cancellation) discards every result.
///
/// # Errors
///
/// - [`Error::InvalidOptions`] if the options fail validation
/// - [`Error::Retrieval`] if the source fails with anything but not-found
/// - [`Error::MalformedHistory`] if the source returns no versions for a child
/// - [`Error::NoVisibleChild`] if `require_visible_children` is set and violated
/// - [`Error::Cancelled`] if `cancel` fires first
pub async fn reconcile<P, C, S>(
    parents: &[P],
    source: Arc<S>,
    options: &Options,
    cancel: &CancelSignal,
) -> Result<Vec<Reconciliation<C>>>
where
    P: Parent,
    C: Child,
    S: HistorySource<C>,
{
    let threshold = options.validate()?;
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let children: BTreeSet<FeatureId> = parents
        .iter()
        .filter(|p| p.visible())
        .flat_map(|p| p.refs().iter().copied())
        .collect();

    tracing::info!(
        parents = parents.len(),
        children = children.len(),
        concurrency = options.concurrency_limit,
        "Reconciling batch"
    );

    let timelines = fetch_timelines(children, source, options.concurrency_limit, cancel)
        .await
        .map_err(|err| attach_parent(err, parents))?;

    let next = next_effective(parents);
    let mut results = Vec::with_capacity(parents.len());
    for (parent, next) in parents.iter().zip(next) {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        results.push(reconcile_parent(parent, next, &timelines, options, threshold)?);
    }

    tracing::info!(
        parents = results.len(),
        updates = results.iter().map(|r| r.updates.len()).sum::<usize>(),
        "Batch reconciled"
    );

    Ok(results)
}

/// Fetch and build the timeline of every id, bounded by `limit` concurrent fetches.
async fn fetch_timelines<C, S>(
    ids: BTreeSet<FeatureId>,
    source: Arc<S>,
    limit: usize,
    cancel: &CancelSignal,
) -> Result<HashMap<FeatureId, Timeline<C>>>
where
    C: Child,
    S: HistorySource<C>,
{
    let mut queue = ids.into_iter();
    let mut tasks = JoinSet::new();
    let mut timelines = HashMap::new();

    loop {
        while tasks.len() < limit {
            let Some(id) = queue.next() else {
                break;
            };
            let source = Arc::clone(&source);
            tasks.spawn(async move { (id, source.fetch_history(id).await) });
        }

        let joined = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            joined = tasks.join_next() => Some(joined),
        };
        let Some(joined) = joined else {
            tracing::info!(in_flight = tasks.len(), "Cancelled while fetching histories");
            tasks.abort_all();
            return Err(Error::Cancelled);
        };
        let Some(joined) = joined else {
            break;
        };

        let (id, fetched) = joined.map_err(|e| Error::Task(e.to_string()))?;
        let timeline = match fetched {
            Ok(versions) => {
                tracing::debug!(child = %id, versions = versions.len(), "Fetched history");
                Timeline::build(id, versions)?
            }
            Err(err) if source.is_not_found(&err) => {
                tracing::warn!(child = %id, "No history recorded, treating child as absent");
                Timeline::missing(id)
            }
            Err(err) => {
                tracing::error!(child = %id, error = %err, "History retrieval failed");
                return Err(Error::Retrieval {
                    child: id,
                    source: Box::new(err),
                });
            }
        };
        timelines.insert(id, timeline);
    }

    Ok(timelines)
}

/// Effective timestamp of the next higher version of each parent's feature.
fn next_effective<P: Parent>(parents: &[P]) -> Vec<Option<DateTime<Utc>>> {
    let mut by_feature: HashMap<FeatureId, Vec<(u32, DateTime<Utc>)>> = HashMap::new();
    for parent in parents {
        by_feature
            .entry(parent.feature_id())
            .or_default()
            .push((parent.version(), parent.effective_timestamp()));
    }
    for versions in by_feature.values_mut() {
        versions.sort_unstable();
    }

    parents
        .iter()
        .map(|parent| {
            let versions = by_feature.get(&parent.feature_id())?;
            let idx = versions.partition_point(|(version, _)| *version <= parent.version());
            versions.get(idx).map(|(_, at)| *at)
        })
        .collect()
}

fn reconcile_parent<P, C>(
    parent: &P,
    next: Option<DateTime<Utc>>,
    timelines: &HashMap<FeatureId, Timeline<C>>,
    options: &Options,
    threshold: Duration,
) -> Result<Reconciliation<C>>
where
    P: Parent,
    C: Child,
{
    let window = ValidityWindow::resolve(parent, next);
    let refs = parent.refs();

    if !parent.visible() {
        tracing::debug!(parent = %parent.element_id(), "Parent is deleted, nothing to reconcile");
        return Ok(Reconciliation::empty(parent.element_id(), window, refs.len()));
    }

    let lanes = refs
        .iter()
        .map(|id| {
            timelines
                .get(id)
                .ok_or_else(|| Error::Task(format!("no timeline fetched for {id}")))
        })
        .collect::<Result<Vec<_>>>()?;
    let tracked: Vec<bool> = refs.iter().map(|id| options.tracks(*id)).collect();

    let result = materialize(parent, window, &lanes, &tracked, threshold);

    if options.require_visible_children {
        if let Some(position) = result.baseline.state.iter().position(Option::is_none) {
            return Err(Error::NoVisibleChild {
                parent: parent.element_id(),
                child: refs[position],
                at: window.start,
            });
        }
    }

    Ok(result)
}

/// Name the first parent referencing the child of a malformed history.
fn attach_parent<P: Parent>(err: Error, parents: &[P]) -> Error {
    match err {
        Error::MalformedHistory {
            child,
            parent: None,
        } => Error::MalformedHistory {
            child,
            parent: parents
                .iter()
                .find(|p| p.visible() && p.refs().contains(&child))
                .map(|p| p.element_id()),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{ChangesetId, Versioned};
    use crate::timeline::tests::{child, deleted, ts, TestChild};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    #[derive(Debug, Clone)]
    struct TestWay {
        id: i64,
        version: u32,
        changeset: i64,
        visible: bool,
        at: DateTime<Utc>,
        committed: Option<DateTime<Utc>>,
        refs: Vec<FeatureId>,
    }

    impl TestWay {
        fn new(version: u32, at: i64, nodes: &[i64]) -> Self {
            Self {
                id: 1,
                version,
                changeset: 500 + i64::from(version),
                visible: true,
                at: ts(at),
                committed: None,
                refs: nodes.iter().map(|n| FeatureId::node(*n)).collect(),
            }
        }
    }

    impl Versioned for TestWay {
        fn feature_id(&self) -> FeatureId {
            FeatureId::way(self.id)
        }
        fn version(&self) -> u32 {
            self.version
        }
        fn changeset_id(&self) -> ChangesetId {
            ChangesetId(self.changeset)
        }
        fn visible(&self) -> bool {
            self.visible
        }
        fn timestamp(&self) -> DateTime<Utc> {
            self.at
        }
    }

    impl Parent for TestWay {
        fn committed(&self) -> Option<DateTime<Utc>> {
            self.committed
        }
        fn refs(&self) -> &[FeatureId] {
            &self.refs
        }
    }

    #[derive(Debug, thiserror::Error)]
    enum TestError {
        #[error("not found")]
        NotFound,
        #[error("unavailable")]
        Unavailable,
    }

    #[derive(Default)]
    struct TestSource {
        histories: HashMap<FeatureId, Vec<TestChild>>,
        failing: Option<FeatureId>,
        stall: bool,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        fetches: AtomicUsize,
    }

    impl TestSource {
        fn with(histories: Vec<TestChild>) -> Self {
            let mut map: HashMap<FeatureId, Vec<TestChild>> = HashMap::new();
            for version in histories {
                map.entry(FeatureId::node(version.id)).or_default().push(version);
            }
            Self {
                histories: map,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl HistorySource<TestChild> for TestSource {
        type Error = TestError;

        async fn fetch_history(&self, id: FeatureId) -> Result<Vec<TestChild>, TestError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if self.stall {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing == Some(id) {
                return Err(TestError::Unavailable);
            }
            self.histories.get(&id).cloned().ok_or(TestError::NotFound)
        }

        fn is_not_found(&self, err: &TestError) -> bool {
            matches!(err, TestError::NotFound)
        }
    }

    #[tokio::test]
    async fn example_single_move_produces_one_checkpoint() {
        let source = Arc::new(TestSource::with(vec![
            child(1, 1, -1, 10),
            child(1, 2, 5, 20),
            child(2, 1, -100, 1),
        ]));
        let parents = vec![TestWay::new(1, 0, &[1, 2])];

        let results = reconcile(&parents, source, &Options::default(), &CancelSignal::new())
            .await
            .unwrap();

        let result = &results[0];
        assert_eq!(result.baseline.get(0).unwrap().version, 1);
        assert_eq!(result.updates.len(), 1);
        assert_eq!(result.updates[0].timestamp, ts(5));
        assert_eq!(result.updates[0].changed, vec![0]);
    }

    #[tokio::test]
    async fn example_parent_changeset_suppresses_checkpoint() {
        let mut moved = child(1, 2, 5, 20);
        moved.changeset = 501;
        let source = Arc::new(TestSource::with(vec![
            child(1, 1, -1, 10),
            moved,
            child(2, 1, -100, 1),
        ]));
        let parents = vec![TestWay::new(1, 0, &[1, 2])];

        let results = reconcile(&parents, source, &Options::default(), &CancelSignal::new())
            .await
            .unwrap();

        assert!(results[0].updates.is_empty());
    }

    #[tokio::test]
    async fn example_threshold_coalesces_burst() {
        let source = Arc::new(TestSource::with(vec![
            child(1, 1, -1, 0),
            child(1, 2, 1, 1),
            child(1, 3, 2, 2),
            child(1, 4, 4, 3),
        ]));
        let parents = vec![TestWay::new(1, 0, &[1])];
        let options = Options::with_threshold(StdDuration::from_secs(3));

        let results = reconcile(&parents, source, &options, &CancelSignal::new())
            .await
            .unwrap();

        let updates = &results[0].updates;
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].timestamp, ts(4));
        assert_eq!(updates[0].get(0).unwrap().version, 4);
    }

    #[tokio::test]
    async fn next_version_bounds_window() {
        let source = Arc::new(TestSource::with(vec![
            child(1, 1, -1, 0),
            child(1, 2, 5, 1),
            child(1, 3, 15, 2),
        ]));
        let parents = vec![TestWay::new(2, 10, &[1]), TestWay::new(1, 0, &[1])];

        let results = reconcile(&parents, source, &Options::default(), &CancelSignal::new())
            .await
            .unwrap();

        // Aligned with input order: v2 first, v1 second.
        assert_eq!(results[0].parent.version, 2);
        assert!(results[0].window.is_open());
        assert_eq!(results[0].updates.len(), 1);
        assert_eq!(results[0].updates[0].timestamp, ts(15));

        assert_eq!(results[1].window.end, Some(ts(10)));
        assert_eq!(results[1].updates.len(), 1);
        assert_eq!(results[1].updates[0].timestamp, ts(5));
    }

    #[tokio::test]
    async fn committed_timestamp_sets_window_start() {
        let source = Arc::new(TestSource::with(vec![
            child(1, 1, -1, 0),
            child(1, 2, 5, 1),
        ]));
        let mut way = TestWay::new(1, 0, &[1]);
        way.committed = Some(ts(6));

        let results = reconcile(&[way], source, &Options::default(), &CancelSignal::new())
            .await
            .unwrap();

        // The move at +5 predates the committed time, so it is baseline state.
        assert_eq!(results[0].baseline.timestamp, ts(6));
        assert_eq!(results[0].baseline.get(0).unwrap().version, 2);
        assert!(results[0].updates.is_empty());
    }

    #[tokio::test]
    async fn not_found_child_is_absent_throughout() {
        let source = Arc::new(TestSource::with(vec![child(1, 1, -1, 0), child(1, 2, 3, 1)]));
        let parents = vec![TestWay::new(1, 0, &[1, 99])];

        let results = reconcile(&parents, source, &Options::default(), &CancelSignal::new())
            .await
            .unwrap();

        let result = &results[0];
        assert!(result.baseline.get(1).is_none());
        assert!(result.updates.iter().all(|c| c.get(1).is_none()));
        assert_eq!(result.updates.len(), 1);
    }

    #[tokio::test]
    async fn retrieval_failure_fails_batch() {
        let mut source = TestSource::with(vec![child(1, 1, -1, 0), child(2, 1, -1, 0)]);
        source.failing = Some(FeatureId::node(2));
        let parents = vec![TestWay::new(1, 0, &[1]), TestWay::new(2, 0, &[2])];

        let err = reconcile(&parents, Arc::new(source), &Options::default(), &CancelSignal::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Retrieval { child, .. } if child == FeatureId::node(2)));
    }

    #[tokio::test]
    async fn empty_history_is_malformed_and_names_parent() {
        let mut source = TestSource::with(vec![child(1, 1, -1, 0)]);
        source.histories.insert(FeatureId::node(3), Vec::new());
        let parents = vec![TestWay::new(1, 0, &[1, 3])];

        let err = reconcile(&parents, Arc::new(source), &Options::default(), &CancelSignal::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::MalformedHistory { .. }));
        assert_eq!(err.child(), Some(FeatureId::node(3)));
        assert_eq!(err.parent(), Some(FeatureId::way(1).at_version(1)));
    }

    #[tokio::test]
    async fn deleted_parent_is_not_fetched() {
        let source = Arc::new(TestSource::with(vec![child(1, 1, -1, 0)]));
        let mut way = TestWay::new(2, 0, &[1]);
        way.visible = false;

        let results = reconcile(
            &[way],
            Arc::clone(&source),
            &Options::default(),
            &CancelSignal::new(),
        )
        .await
        .unwrap();

        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
        assert!(results[0].baseline.state.iter().all(Option::is_none));
        assert!(results[0].updates.is_empty());
    }

    #[tokio::test]
    async fn require_visible_children_rejects_absent_child() {
        let source = Arc::new(TestSource::with(vec![
            child(1, 1, -1, 0),
            deleted(2, 1, -1),
        ]));
        let parents = vec![TestWay::new(1, 0, &[1, 2])];
        let options = Options::default().require_visible_children(true);

        let err = reconcile(&parents, source, &options, &CancelSignal::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::NoVisibleChild { child, .. } if child == FeatureId::node(2)
        ));
    }

    #[tokio::test]
    async fn child_filter_freezes_untracked_children() {
        let source = Arc::new(TestSource::with(vec![
            child(1, 1, -1, 0),
            child(1, 2, 3, 1),
            child(2, 1, -1, 0),
            child(2, 2, 4, 1),
        ]));
        let parents = vec![TestWay::new(1, 0, &[1, 2])];
        let options = Options::default().child_filter(|id| id == FeatureId::node(2));

        let results = reconcile(&parents, source, &options, &CancelSignal::new())
            .await
            .unwrap();

        let updates = &results[0].updates;
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].changed, vec![1]);
        assert_eq!(updates[0].get(0).unwrap().version, 1);
    }

    #[tokio::test]
    async fn fetches_are_bounded_and_deduplicated() {
        let histories = (1..=12).map(|n| child(n, 1, -1, 0)).collect();
        let source = Arc::new(TestSource::with(histories));
        let parents = vec![
            TestWay::new(1, 0, &[1, 2, 3, 4, 5, 6, 7, 8]),
            TestWay::new(2, 10, &[5, 6, 7, 8, 9, 10, 11, 12, 1]),
        ];
        let options = Options::default().concurrency_limit(3);

        reconcile(&parents, Arc::clone(&source), &options, &CancelSignal::new())
            .await
            .unwrap();

        assert_eq!(source.fetches.load(Ordering::SeqCst), 12);
        assert!(source.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn cancellation_aborts_in_flight_fetches() {
        let mut source = TestSource::with(vec![child(1, 1, -1, 0)]);
        source.stall = true;
        let parents = vec![TestWay::new(1, 0, &[1])];
        let cancel = CancelSignal::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(StdDuration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = reconcile(&parents, Arc::new(source), &Options::default(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn already_cancelled_returns_immediately() {
        let source = Arc::new(TestSource::with(vec![child(1, 1, -1, 0)]));
        let cancel = CancelSignal::new();
        cancel.cancel();

        let err = reconcile(
            &[TestWay::new(1, 0, &[1])],
            Arc::clone(&source),
            &Options::default(),
            &cancel,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
    }
}
