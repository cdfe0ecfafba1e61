//! JSON document holding any mix of node, way and relation versions.

use crate::model::{Node, Relation, Way};
use serde::{Deserialize, Serialize};

/// A set of feature versions, as read from or written to disk.
///
/// The same shape carries full version histories (input to a history store)
/// and batches of parents to annotate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OsmDocument {
    /// Node versions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<Node>,
    /// Way versions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ways: Vec<Way>,
    /// Relation versions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relations: Vec<Relation>,
}

impl OsmDocument {
    /// Parse a document from JSON.
    ///
    /// # Errors
    ///
    /// Returns error if the input is not a valid document.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Render the document as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Total number of feature versions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len() + self.ways.len() + self.relations.len()
    }

    /// Whether the document holds no versions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
