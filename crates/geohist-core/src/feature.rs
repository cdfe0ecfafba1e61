//! Identity vocabulary and the capability traits the engine is generic over.
//!
//! Concrete feature types (nodes, ways, relations, or anything else with an
//! independent version history) are wrapped by the caller so that they expose:
//! - Identity (feature kind + numeric ref)
//! - Version number and edit changeset
//! - Visibility (a `false` version marks a deletion)
//! - Timestamp of the edit
//!
//! Parents additionally expose their committed timestamp and ordered child refs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of a versioned feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    /// A point feature
    Node,
    /// An ordered list of nodes
    Way,
    /// A collection of members of any kind
    Relation,
}

impl FeatureKind {
    /// Lowercase name used in display and parsing.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKind::Node => "node",
            FeatureKind::Way => "way",
            FeatureKind::Relation => "relation",
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a feature across all of its versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FeatureId {
    /// Feature kind
    pub kind: FeatureKind,
    /// Numeric reference, unique within the kind
    #[serde(rename = "ref")]
    pub ref_: i64,
}

impl FeatureId {
    /// Create a feature id.
    #[must_use]
    pub fn new(kind: FeatureKind, ref_: i64) -> Self {
        Self { kind, ref_ }
    }

    /// Shorthand for a node id.
    #[must_use]
    pub fn node(ref_: i64) -> Self {
        Self::new(FeatureKind::Node, ref_)
    }

    /// Shorthand for a way id.
    #[must_use]
    pub fn way(ref_: i64) -> Self {
        Self::new(FeatureKind::Way, ref_)
    }

    /// Shorthand for a relation id.
    #[must_use]
    pub fn relation(ref_: i64) -> Self {
        Self::new(FeatureKind::Relation, ref_)
    }

    /// Pair this id with a version number.
    #[must_use]
    pub fn at_version(self, version: u32) -> ElementId {
        ElementId {
            feature: self,
            version,
        }
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.ref_)
    }
}

impl FromStr for FeatureId {
    type Err = FeatureIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, ref_) = s
            .split_once('/')
            .ok_or_else(|| FeatureIdError::Malformed(s.to_string()))?;

        let kind = match kind {
            "node" => FeatureKind::Node,
            "way" => FeatureKind::Way,
            "relation" => FeatureKind::Relation,
            other => return Err(FeatureIdError::UnknownKind(other.to_string())),
        };
        let ref_ = ref_
            .parse()
            .map_err(|_| FeatureIdError::Malformed(s.to_string()))?;

        Ok(Self { kind, ref_ })
    }
}

/// Errors that can occur when parsing a [`FeatureId`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum FeatureIdError {
    /// Input is not of the form `kind/ref`
    #[error("malformed feature id: {0}")]
    Malformed(String),
    /// Kind prefix is not node, way or relation
    #[error("unknown feature kind: {0}")]
    UnknownKind(String),
}

/// Identity of one specific version of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementId {
    /// The feature
    pub feature: FeatureId,
    /// Version number
    pub version: u32,
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.feature, self.version)
    }
}

/// Identifier of the changeset an edit was made in.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChangesetId(pub i64);

impl fmt::Display for ChangesetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capabilities shared by parent and child versions.
pub trait Versioned {
    /// Feature identity.
    fn feature_id(&self) -> FeatureId;

    /// Version number of this edit.
    fn version(&self) -> u32;

    /// Changeset the edit was made in.
    fn changeset_id(&self) -> ChangesetId;

    /// `false` if this version deletes the feature.
    fn visible(&self) -> bool;

    /// Nominal edit timestamp.
    fn timestamp(&self) -> DateTime<Utc>;

    /// Identity of this particular version.
    fn element_id(&self) -> ElementId {
        self.feature_id().at_version(self.version())
    }
}

/// A composite feature version referencing an ordered list of children.
pub trait Parent: Versioned {
    /// Committed timestamp, if the store recorded one.
    ///
    /// May lag the nominal timestamp when history was corrected retroactively.
    fn committed(&self) -> Option<DateTime<Utc>>;

    /// Ordered child references. Fixed for this version.
    fn refs(&self) -> &[FeatureId];

    /// Timestamp the version took effect: committed if known, else nominal.
    fn effective_timestamp(&self) -> DateTime<Utc> {
        self.committed().unwrap_or_else(|| self.timestamp())
    }
}

/// A child feature version.
pub trait Child: Versioned + Clone + fmt::Debug + Send + Sync + 'static {
    /// Whether `other` describes the same material state as `self`.
    ///
    /// Defaults to identical version and visibility. Implementations with a
    /// payload (e.g. coordinates) should compare that payload instead so that
    /// edits which leave it untouched do not produce checkpoints.
    fn same_state(&self, other: &Self) -> bool {
        self.version() == other.version() && self.visible() == other.visible()
    }
}

/// Material equality of two optional child states; `None` is absent.
pub(crate) fn same_slot<C: Child>(a: Option<&C>, b: Option<&C>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.same_state(b),
        _ => false,
    }
}
