//! Per-child validity timelines.
//!
//! Each version is valid from its own timestamp until the next version's
//! timestamp. The last version is valid indefinitely, and an invisible version
//! marks the child as gone until a later version recreates it.

use crate::error::{Error, Result};
use crate::feature::{Child, FeatureId};
use chrono::{DateTime, Utc};

/// The ordered version history of one child.
#[derive(Debug, Clone)]
pub struct Timeline<C> {
    id: FeatureId,
    versions: Vec<C>,
}

impl<C: Child> Timeline<C> {
    /// Build a timeline from an unordered version set.
    ///
    /// Versions are ordered by timestamp, then by version number.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedHistory`] if `versions` is empty.
    pub fn build(id: FeatureId, mut versions: Vec<C>) -> Result<Self> {
        if versions.is_empty() {
            return Err(Error::MalformedHistory {
                child: id,
                parent: None,
            });
        }

        versions.sort_by(|a, b| {
            a.timestamp()
                .cmp(&b.timestamp())
                .then_with(|| a.version().cmp(&b.version()))
        });

        Ok(Self { id, versions })
    }

    /// The timeline of a child with no recorded history; absent at every instant.
    #[must_use]
    pub fn missing(id: FeatureId) -> Self {
        Self {
            id,
            versions: Vec::new(),
        }
    }

    /// Child this timeline belongs to.
    #[must_use]
    pub fn id(&self) -> FeatureId {
        self.id
    }

    /// Versions in timeline order.
    #[must_use]
    pub fn versions(&self) -> &[C] {
        &self.versions
    }

    /// Whether no history was recorded.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        self.versions.is_empty()
    }

    /// Number of versions at or before `at`.
    pub(crate) fn position_after(&self, at: DateTime<Utc>) -> usize {
        self.versions.partition_point(|v| v.timestamp() <= at)
    }

    /// The version in effect at `at`, if any.
    ///
    /// Returns the latest version with timestamp `<= at`, or `None` if the child
    /// did not exist yet or that version is a deletion.
    #[must_use]
    pub fn at(&self, at: DateTime<Utc>) -> Option<&C> {
        let idx = self.position_after(at);
        let version = self.versions[..idx].last()?;
        version.visible().then_some(version)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::feature::{ChangesetId, Versioned};
    use chrono::TimeZone;

    /// Minimal child used across the engine's unit tests.
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct TestChild {
        pub id: i64,
        pub version: u32,
        pub changeset: i64,
        pub visible: bool,
        pub at: DateTime<Utc>,
        pub value: i32,
    }

    impl Versioned for TestChild {
        fn feature_id(&self) -> FeatureId {
            FeatureId::node(self.id)
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

    impl Child for TestChild {
        fn same_state(&self, other: &Self) -> bool {
            self.visible == other.visible && self.value == other.value
        }
    }

    pub(crate) fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_600_000_000 + secs, 0).unwrap()
    }

    pub(crate) fn child(id: i64, version: u32, secs: i64, value: i32) -> TestChild {
        TestChild {
            id,
            version,
            changeset: 1000 + i64::from(version),
            visible: true,
            at: ts(secs),
            value,
        }
    }

    pub(crate) fn deleted(id: i64, version: u32, secs: i64) -> TestChild {
        TestChild {
            visible: false,
            ..child(id, version, secs, 0)
        }
    }

    #[test]
    fn build_sorts_by_timestamp_then_version() {
        let timeline = Timeline::build(
            FeatureId::node(1),
            vec![child(1, 3, 30, 3), child(1, 2, 10, 2), child(1, 1, 10, 1)],
        )
        .unwrap();

        let versions: Vec<u32> = timeline.versions().iter().map(|v| v.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
    }

    #[test]
    fn build_rejects_empty_history() {
        let result = Timeline::<TestChild>::build(FeatureId::node(1), Vec::new());
        assert!(matches!(
            result,
            Err(Error::MalformedHistory { child, parent: None }) if child == FeatureId::node(1)
        ));
    }

    #[test]
    fn at_returns_latest_version_not_after_instant() {
        let timeline = Timeline::build(
            FeatureId::node(1),
            vec![child(1, 1, 0, 10), child(1, 2, 5, 20)],
        )
        .unwrap();

        assert!(timeline.at(ts(-1)).is_none());
        assert_eq!(timeline.at(ts(0)).unwrap().version, 1);
        assert_eq!(timeline.at(ts(4)).unwrap().version, 1);
        assert_eq!(timeline.at(ts(5)).unwrap().version, 2);
        assert_eq!(timeline.at(ts(500)).unwrap().version, 2);
    }

    #[test]
    fn deleted_child_is_absent_until_recreated() {
        let timeline = Timeline::build(
            FeatureId::node(1),
            vec![child(1, 1, 0, 10), deleted(1, 2, 5), child(1, 3, 9, 30)],
        )
        .unwrap();

        assert!(timeline.at(ts(6)).is_none());
        assert_eq!(timeline.at(ts(9)).unwrap().version, 3);
    }

    #[test]
    fn missing_timeline_is_always_absent() {
        let timeline = Timeline::<TestChild>::missing(FeatureId::node(4));
        assert!(timeline.is_missing());
        assert!(timeline.at(ts(0)).is_none());
        assert_eq!(timeline.id(), FeatureId::node(4));
    }
}
