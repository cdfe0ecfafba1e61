//! In-memory version history of nodes, ways and relations.

use crate::document::OsmDocument;
use crate::model::{ChildFeature, Node, Relation, Way};
use async_trait::async_trait;
use geohist_core::{FeatureId, FeatureKind, HistorySource};
use std::collections::HashMap;

/// Errors returned by [`HistoryDatasource`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DatasourceError {
    /// No versions are recorded for the feature
    #[error("{0} not found")]
    NotFound(FeatureId),
    /// The feature is not of the kind the caller asked for
    #[error("{id} is not a {expected}")]
    UnexpectedKind {
        /// Requested feature
        id: FeatureId,
        /// Kind the caller can handle
        expected: FeatureKind,
    },
}

/// Every known version of each feature, held in memory.
#[derive(Debug, Clone, Default)]
pub struct HistoryDatasource {
    nodes: HashMap<i64, Vec<Node>>,
    ways: HashMap<i64, Vec<Way>>,
    relations: HashMap<i64, Vec<Relation>>,
}

impl HistoryDatasource {
    /// Create an empty datasource.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every version in `doc`.
    #[must_use]
    pub fn from_document(doc: OsmDocument) -> Self {
        let mut ds = Self::new();
        ds.extend(doc);
        ds
    }

    /// Index every version in `doc`, alongside those already known.
    pub fn extend(&mut self, doc: OsmDocument) {
        doc.nodes.into_iter().for_each(|n| self.insert_node(n));
        doc.ways.into_iter().for_each(|w| self.insert_way(w));
        doc.relations
            .into_iter()
            .for_each(|r| self.insert_relation(r));
    }

    /// Record a node version.
    pub fn insert_node(&mut self, node: Node) {
        self.nodes.entry(node.id).or_default().push(node);
    }

    /// Record a way version.
    pub fn insert_way(&mut self, way: Way) {
        self.ways.entry(way.id).or_default().push(way);
    }

    /// Record a relation version.
    pub fn insert_relation(&mut self, relation: Relation) {
        self.relations
            .entry(relation.id)
            .or_default()
            .push(relation);
    }

    /// Versions of node `id`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`DatasourceError::NotFound`] if nothing is recorded.
    pub fn node_history(&self, id: i64) -> Result<&[Node], DatasourceError> {
        lookup(&self.nodes, id, FeatureId::node(id))
    }

    /// Versions of way `id`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`DatasourceError::NotFound`] if nothing is recorded.
    pub fn way_history(&self, id: i64) -> Result<&[Way], DatasourceError> {
        lookup(&self.ways, id, FeatureId::way(id))
    }

    /// Versions of relation `id`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`DatasourceError::NotFound`] if nothing is recorded.
    pub fn relation_history(&self, id: i64) -> Result<&[Relation], DatasourceError> {
        lookup(&self.relations, id, FeatureId::relation(id))
    }

    /// Versions of any feature.
    ///
    /// # Errors
    ///
    /// Returns [`DatasourceError::NotFound`] if nothing is recorded.
    pub fn history(&self, id: FeatureId) -> Result<Vec<ChildFeature>, DatasourceError> {
        let versions = match id.kind {
            FeatureKind::Node => into_children(self.node_history(id.ref_)?),
            FeatureKind::Way => into_children(self.way_history(id.ref_)?),
            FeatureKind::Relation => into_children(self.relation_history(id.ref_)?),
        };
        Ok(versions)
    }
}

fn lookup<'a, T>(
    map: &'a HashMap<i64, Vec<T>>,
    id: i64,
    feature: FeatureId,
) -> Result<&'a [T], DatasourceError> {
    map.get(&id)
        .filter(|versions| !versions.is_empty())
        .map(Vec::as_slice)
        .ok_or(DatasourceError::NotFound(feature))
}

fn into_children<T>(versions: &[T]) -> Vec<ChildFeature>
where
    T: Clone + Into<ChildFeature>,
{
    versions.iter().cloned().map(Into::into).collect()
}

#[async_trait]
impl HistorySource<Node> for HistoryDatasource {
    type Error = DatasourceError;

    async fn fetch_history(&self, id: FeatureId) -> Result<Vec<Node>, Self::Error> {
        if id.kind != FeatureKind::Node {
            return Err(DatasourceError::UnexpectedKind {
                id,
                expected: FeatureKind::Node,
            });
        }
        Ok(self.node_history(id.ref_)?.to_vec())
    }

    fn is_not_found(&self, err: &Self::Error) -> bool {
        matches!(err, DatasourceError::NotFound(_))
    }
}

#[async_trait]
impl HistorySource<ChildFeature> for HistoryDatasource {
    type Error = DatasourceError;

    async fn fetch_history(&self, id: FeatureId) -> Result<Vec<ChildFeature>, Self::Error> {
        self.history(id)
    }

    fn is_not_found(&self, err: &Self::Error) -> bool {
        matches!(err, DatasourceError::NotFound(_))
    }
}
