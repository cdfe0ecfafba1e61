//! `SQLite` history store.

use async_trait::async_trait;
use geohist_core::{FeatureId, FeatureKind, HistorySource, Versioned};
use geohist_osm::{ChildFeature, Node, OsmDocument};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Errors returned by [`SqliteHistoryStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No versions are stored for the feature
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

    /// Database failure
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored version could not be encoded or decoded
    #[error("invalid version record: {0}")]
    Record(#[from] serde_json::Error),

    /// A previous holder of the connection panicked
    #[error("database connection poisoned")]
    Poisoned,
}

/// Feature versions persisted as JSON rows keyed by kind, id and version.
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
    /// Open or create a history database.
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened or initialized.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Create an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be created.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Store every version in `doc`, replacing versions already present.
    ///
    /// Returns the number of versions written.
    ///
    /// # Errors
    ///
    /// Returns error if a write fails; nothing is stored in that case.
    pub fn import(&self, doc: &OsmDocument) -> Result<usize, StoreError> {
        let features = doc
            .nodes
            .iter()
            .cloned()
            .map(ChildFeature::from)
            .chain(doc.ways.iter().cloned().map(ChildFeature::from))
            .chain(doc.relations.iter().cloned().map(ChildFeature::from));

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                r"
                INSERT OR REPLACE INTO feature_versions (kind, feature_ref, version, body)
                VALUES (?1, ?2, ?3, ?4)
                ",
            )?;

            for feature in features {
                let id = feature.feature_id();
                let body = serde_json::to_string(&feature)?;
                stmt.execute(params![id.kind.as_str(), id.ref_, feature.version(), body])?;
                written += 1;
            }
        }
        tx.commit()?;

        tracing::info!(versions = written, "Imported feature versions");
        Ok(written)
    }

    /// Every stored version of `id`, ordered by version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if nothing is stored for `id`.
    pub fn versions(&self, id: FeatureId) -> Result<Vec<ChildFeature>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r"
            SELECT body FROM feature_versions
            WHERE kind = ?1 AND feature_ref = ?2
            ORDER BY version ASC
            ",
        )?;

        let bodies = stmt
            .query_map(params![id.kind.as_str(), id.ref_], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        if bodies.is_empty() {
            return Err(StoreError::NotFound(id));
        }

        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(StoreError::from))
            .collect()
    }

    /// Total number of stored versions.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM feature_versions", [], |row| {
            row.get::<_, usize>(0)
        })?;
        Ok(count)
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r"
        -- One row per feature version, body is the version as JSON
        CREATE TABLE IF NOT EXISTS feature_versions (
            kind TEXT NOT NULL,
            feature_ref INTEGER NOT NULL,
            version INTEGER NOT NULL,
            body TEXT NOT NULL,
            PRIMARY KEY (kind, feature_ref, version)
        );
        ",
    )
}

#[async_trait]
impl HistorySource<ChildFeature> for SqliteHistoryStore {
    type Error = StoreError;

    async fn fetch_history(&self, id: FeatureId) -> Result<Vec<ChildFeature>, Self::Error> {
        self.versions(id)
    }

    fn is_not_found(&self, err: &Self::Error) -> bool {
        matches!(err, StoreError::NotFound(_))
    }
}

#[async_trait]
impl HistorySource<Node> for SqliteHistoryStore {
    type Error = StoreError;

    async fn fetch_history(&self, id: FeatureId) -> Result<Vec<Node>, Self::Error> {
        let unexpected = || StoreError::UnexpectedKind {
            id,
            expected: FeatureKind::Node,
        };
        if id.kind != FeatureKind::Node {
            return Err(unexpected());
        }

        self.versions(id)?
            .into_iter()
            .map(|feature| match feature {
                ChildFeature::Node(node) => Ok(node),
                _ => Err(unexpected()),
            })
            .collect()
    }

    fn is_not_found(&self, err: &Self::Error) -> bool {
        matches!(err, StoreError::NotFound(_))
    }
}
