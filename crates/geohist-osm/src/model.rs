//! OSM-style feature model.
//!
//! Field names follow the OSM JSON conventions: `ref` for member and way-node
//! references, `type` for member kinds, `changeset` for changeset ids.

use chrono::{DateTime, Utc};
use geohist_core::{ChangesetId, Child, FeatureId, FeatureKind, Reconciliation, Versioned};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Free-form key/value tags.
pub type Tags = BTreeMap<String, String>;

fn visible_default() -> bool {
    true
}

/// One version of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node id
    pub id: i64,
    /// Version number
    pub version: u32,
    /// Changeset the version was created in
    #[serde(rename = "changeset")]
    pub changeset_id: ChangesetId,
    /// `false` for a deletion
    #[serde(default = "visible_default")]
    pub visible: bool,
    /// Edit timestamp
    pub timestamp: DateTime<Utc>,
    /// Latitude in degrees
    #[serde(default)]
    pub lat: f64,
    /// Longitude in degrees
    #[serde(default)]
    pub lon: f64,
    /// Tags
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: Tags,
}

impl Versioned for Node {
    fn feature_id(&self) -> FeatureId {
        FeatureId::node(self.id)
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn changeset_id(&self) -> ChangesetId {
        self.changeset_id
    }

    fn visible(&self) -> bool {
        self.visible
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Child for Node {
    /// Nodes are materially equal when their location and visibility match.
    /// Tag-only edits do not move the geometry of the parent.
    #[allow(clippy::float_cmp)]
    fn same_state(&self, other: &Self) -> bool {
        self.visible == other.visible && self.lat == other.lat && self.lon == other.lon
    }
}

/// A node reference inside a way, annotated with the node version in effect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WayNode {
    /// Referenced node id
    #[serde(rename = "ref")]
    pub id: i64,
    /// Node version at the way's timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    /// Changeset of that node version
    #[serde(default, rename = "changeset", skip_serializing_if = "Option::is_none")]
    pub changeset_id: Option<ChangesetId>,
    /// Latitude of that node version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    /// Longitude of that node version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
}

impl WayNode {
    /// Unannotated reference to node `id`.
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Referenced feature.
    #[must_use]
    pub fn feature_id(&self) -> FeatureId {
        FeatureId::node(self.id)
    }

    pub(crate) fn annotate(&mut self, node: &Node) {
        self.version = Some(node.version);
        self.changeset_id = Some(node.changeset_id);
        self.lat = Some(node.lat);
        self.lon = Some(node.lon);
    }
}

/// A change to a referenced child that happened while the parent version was
/// current.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Position in the parent's reference list
    pub index: usize,
    /// When the child change took effect
    pub timestamp: DateTime<Utc>,
    /// New child version; `None` if the child was deleted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    /// Changeset of the new child version
    #[serde(default, rename = "changeset", skip_serializing_if = "Option::is_none")]
    pub changeset_id: Option<ChangesetId>,
    /// New latitude, for node children
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    /// New longitude, for node children
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    /// `false` if the child is absent from this point on
    #[serde(default = "visible_default")]
    pub visible: bool,
}

impl Update {
    pub(crate) fn new<C: Located>(
        index: usize,
        timestamp: DateTime<Utc>,
        state: Option<&C>,
    ) -> Self {
        let Some(child) = state else {
            return Self {
                index,
                timestamp,
                version: None,
                changeset_id: None,
                lat: None,
                lon: None,
                visible: false,
            };
        };

        let (lat, lon) = child.location().unzip();
        Self {
            index,
            timestamp,
            version: Some(child.version()),
            changeset_id: Some(child.changeset_id()),
            lat,
            lon,
            visible: true,
        }
    }

    /// Flatten the checkpoints of a reconciliation into per-position updates,
    /// ordered by time and then position.
    pub(crate) fn collect<C: Located>(result: &Reconciliation<C>) -> Vec<Self> {
        result
            .updates
            .iter()
            .flat_map(|checkpoint| {
                checkpoint
                    .changes()
                    .map(move |(index, state)| Self::new(index, checkpoint.timestamp, state))
            })
            .collect()
    }
}

/// One version of a way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Way {
    /// Way id
    pub id: i64,
    /// Version number
    pub version: u32,
    /// Changeset the version was created in
    #[serde(rename = "changeset")]
    pub changeset_id: ChangesetId,
    /// `false` for a deletion
    #[serde(default = "visible_default")]
    pub visible: bool,
    /// Nominal edit timestamp
    pub timestamp: DateTime<Utc>,
    /// Time the edit was committed, when it differs from the nominal timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committed: Option<DateTime<Utc>>,
    /// Ordered node references
    #[serde(default)]
    pub nodes: Vec<WayNode>,
    /// Tags
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: Tags,
    /// Node changes while this version was current
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updates: Vec<Update>,
}

impl Way {
    /// Ids of the referenced nodes, in order.
    #[must_use]
    pub fn node_ids(&self) -> Vec<FeatureId> {
        self.nodes.iter().map(WayNode::feature_id).collect()
    }
}

impl Versioned for Way {
    fn feature_id(&self) -> FeatureId {
        FeatureId::way(self.id)
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn changeset_id(&self) -> ChangesetId {
        self.changeset_id
    }

    fn visible(&self) -> bool {
        self.visible
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// A relation member, annotated with the member version in effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// Kind of the member feature
    #[serde(rename = "type")]
    pub kind: FeatureKind,
    /// Member id
    #[serde(rename = "ref")]
    pub id: i64,
    /// Role of the member in the relation
    #[serde(default)]
    pub role: String,
    /// Member version at the relation's timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    /// Changeset of that member version
    #[serde(default, rename = "changeset", skip_serializing_if = "Option::is_none")]
    pub changeset_id: Option<ChangesetId>,
    /// Latitude, for node members
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    /// Longitude, for node members
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
}

impl Member {
    /// Unannotated member.
    #[must_use]
    pub fn new(kind: FeatureKind, id: i64, role: impl Into<String>) -> Self {
        Self {
            kind,
            id,
            role: role.into(),
            version: None,
            changeset_id: None,
            lat: None,
            lon: None,
        }
    }

    /// Referenced feature.
    #[must_use]
    pub fn feature_id(&self) -> FeatureId {
        FeatureId::new(self.kind, self.id)
    }

    pub(crate) fn annotate(&mut self, child: &ChildFeature) {
        self.version = Some(child.version());
        self.changeset_id = Some(child.changeset_id());
        if let Some((lat, lon)) = child.location() {
            self.lat = Some(lat);
            self.lon = Some(lon);
        }
    }
}

/// One version of a relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// Relation id
    pub id: i64,
    /// Version number
    pub version: u32,
    /// Changeset the version was created in
    #[serde(rename = "changeset")]
    pub changeset_id: ChangesetId,
    /// `false` for a deletion
    #[serde(default = "visible_default")]
    pub visible: bool,
    /// Nominal edit timestamp
    pub timestamp: DateTime<Utc>,
    /// Time the edit was committed, when it differs from the nominal timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committed: Option<DateTime<Utc>>,
    /// Ordered members
    #[serde(default)]
    pub members: Vec<Member>,
    /// Tags
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: Tags,
    /// Member changes while this version was current
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updates: Vec<Update>,
}

impl Relation {
    /// Ids of the members, in order.
    #[must_use]
    pub fn member_ids(&self) -> Vec<FeatureId> {
        self.members.iter().map(Member::feature_id).collect()
    }
}

impl Versioned for Relation {
    fn feature_id(&self) -> FeatureId {
        FeatureId::relation(self.id)
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn changeset_id(&self) -> ChangesetId {
        self.changeset_id
    }

    fn visible(&self) -> bool {
        self.visible
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// A version of any feature kind, used as the child of a relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChildFeature {
    /// A node version
    Node(Node),
    /// A way version
    Way(Way),
    /// A relation version
    Relation(Relation),
}

impl ChildFeature {
    /// The node, if this is one.
    #[must_use]
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Self::Node(node) => Some(node),
            _ => None,
        }
    }

    fn inner(&self) -> &dyn Versioned {
        match self {
            Self::Node(node) => node,
            Self::Way(way) => way,
            Self::Relation(relation) => relation,
        }
    }
}

impl From<Node> for ChildFeature {
    fn from(node: Node) -> Self {
        Self::Node(node)
    }
}

impl From<Way> for ChildFeature {
    fn from(way: Way) -> Self {
        Self::Way(way)
    }
}

impl From<Relation> for ChildFeature {
    fn from(relation: Relation) -> Self {
        Self::Relation(relation)
    }
}

impl Versioned for ChildFeature {
    fn feature_id(&self) -> FeatureId {
        self.inner().feature_id()
    }

    fn version(&self) -> u32 {
        self.inner().version()
    }

    fn changeset_id(&self) -> ChangesetId {
        self.inner().changeset_id()
    }

    fn visible(&self) -> bool {
        self.inner().visible()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.inner().timestamp()
    }
}

impl Child for ChildFeature {
    /// Node members compare by location; way and relation members compare by
    /// version, since their own geometry is annotated separately.
    fn same_state(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Node(a), Self::Node(b)) => a.same_state(b),
            (a, b) => {
                a.feature_id() == b.feature_id()
                    && a.version() == b.version()
                    && a.visible() == b.visible()
            }
        }
    }
}

/// Children whose location is copied onto the parent's references.
pub(crate) trait Located: Child {
    fn location(&self) -> Option<(f64, f64)>;
}

impl Located for Node {
    fn location(&self) -> Option<(f64, f64)> {
        Some((self.lat, self.lon))
    }
}

impl Located for ChildFeature {
    fn location(&self) -> Option<(f64, f64)> {
        self.as_node().and_then(Located::location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn node(version: u32, lat: f64, lon: f64) -> Node {
        Node {
            id: 1,
            version,
            changeset_id: ChangesetId(i64::from(version) * 10),
            visible: true,
            timestamp: Utc.timestamp_opt(1_500_000_000, 0).unwrap(),
            lat,
            lon,
            tags: Tags::new(),
        }
    }

    #[test]
    fn node_state_ignores_tags_and_version() {
        let a = node(1, 52.5, 13.4);
        let mut b = node(2, 52.5, 13.4);
        b.tags.insert("name".to_string(), "Mitte".to_string());

        assert!(a.same_state(&b));
        assert!(!a.same_state(&node(3, 52.6, 13.4)));
    }

    #[test]
    fn deserializes_way_with_defaults() {
        let way: Way = serde_json::from_str(
            r#"{
                "id": 7,
                "version": 2,
                "changeset": 300,
                "timestamp": "2017-07-14T02:40:00Z",
                "nodes": [{"ref": 1}, {"ref": 2}]
            }"#,
        )
        .unwrap();

        assert!(way.visible);
        assert!(way.committed.is_none());
        assert_eq!(way.node_ids(), vec![FeatureId::node(1), FeatureId::node(2)]);
        assert!(way.updates.is_empty());
    }

    #[test]
    fn member_kind_uses_type_field() {
        let member: Member =
            serde_json::from_str(r#"{"type": "way", "ref": 9, "role": "outer"}"#).unwrap();

        assert_eq!(member.feature_id(), FeatureId::way(9));
        assert_eq!(member.role, "outer");
    }

    #[test]
    fn child_feature_compares_non_nodes_by_version() {
        let way = Way {
            id: 3,
            version: 1,
            changeset_id: ChangesetId(1),
            visible: true,
            timestamp: Utc.timestamp_opt(1_500_000_000, 0).unwrap(),
            committed: None,
            nodes: vec![WayNode::new(1)],
            tags: Tags::new(),
            updates: Vec::new(),
        };
        let mut retagged = way.clone();
        retagged.version = 2;

        let a = ChildFeature::from(way.clone());
        assert!(a.same_state(&ChildFeature::from(way)));
        assert!(!a.same_state(&ChildFeature::from(retagged)));
        assert!(!a.same_state(&ChildFeature::from(node(1, 0.0, 0.0))));
    }

    #[test]
    fn deletion_update_has_no_payload() {
        let at = Utc.timestamp_opt(1_500_000_100, 0).unwrap();
        let update = Update::new::<Node>(3, at, None);

        assert!(!update.visible);
        assert!(update.version.is_none());
        assert!(update.lat.is_none());

        let moved = node(4, 1.5, 2.5);
        let update = Update::new(0, at, Some(&moved));
        assert_eq!(update.version, Some(4));
        assert_eq!(update.changeset_id, Some(ChangesetId(40)));
        assert_eq!((update.lat, update.lon), (Some(1.5), Some(2.5)));
    }
}
