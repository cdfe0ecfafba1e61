//! Command execution.

use crate::config::CliConfig;
use crate::store::SqliteHistoryStore;
use anyhow::{Context, Result};
use geohist_core::CancelSignal;
use geohist_osm::{annotate_relations, annotate_ways, HistoryDatasource, OsmDocument};
use std::path::Path;
use std::sync::Arc;

/// Where child histories are read from.
enum History {
    File(HistoryDatasource),
    Database(SqliteHistoryStore),
}

/// Executes CLI commands against the configured history.
pub struct Runtime {
    config: CliConfig,
    cancel: CancelSignal,
}

impl Runtime {
    /// Create a runtime for `config`.
    #[must_use]
    pub fn new(config: CliConfig) -> Self {
        Self {
            config,
            cancel: CancelSignal::new(),
        }
    }

    /// Signal that cancels any in-flight annotation.
    #[must_use]
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// Load the history document at `path` into the database.
    ///
    /// # Errors
    ///
    /// Returns error if the document cannot be read or stored.
    pub fn import(&self, path: &Path) -> Result<usize> {
        let doc = read_document(path)?;
        let store = self.open_store()?;
        let imported = store.import(&doc).context("Failed to import history")?;
        tracing::info!(imported, total = store.count()?, "History database updated");
        Ok(imported)
    }

    /// Annotate the ways of the document at `input`.
    ///
    /// # Errors
    ///
    /// Returns error if the input or history cannot be read, or annotation fails.
    pub async fn ways(&self, input: &Path) -> Result<OsmDocument> {
        let mut doc = read_document(input)?;
        let options = self.config.options();
        let threshold = self.config.threshold;

        tracing::info!(ways = doc.ways.len(), ?threshold, "Annotating ways");
        match self.history()? {
            History::File(ds) => {
                let source = Arc::new(ds);
                annotate_ways(&mut doc.ways, source, threshold, &options, &self.cancel).await
            }
            History::Database(store) => {
                let source = Arc::new(store);
                annotate_ways(&mut doc.ways, source, threshold, &options, &self.cancel).await
            }
        }
        .context("Failed to annotate ways")?;

        Ok(doc)
    }

    /// Annotate the relations of the document at `input`.
    ///
    /// # Errors
    ///
    /// Returns error if the input or history cannot be read, or annotation fails.
    pub async fn relations(&self, input: &Path) -> Result<OsmDocument> {
        let mut doc = read_document(input)?;
        let options = self.config.options();
        let threshold = self.config.threshold;

        tracing::info!(relations = doc.relations.len(), ?threshold, "Annotating relations");
        match self.history()? {
            History::File(ds) => {
                let source = Arc::new(ds);
                annotate_relations(&mut doc.relations, source, threshold, &options, &self.cancel)
                    .await
            }
            History::Database(store) => {
                let source = Arc::new(store);
                annotate_relations(&mut doc.relations, source, threshold, &options, &self.cancel)
                    .await
            }
        }
        .context("Failed to annotate relations")?;

        Ok(doc)
    }

    fn history(&self) -> Result<History> {
        match &self.config.history_file {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Reading history from file");
                Ok(History::File(HistoryDatasource::from_document(
                    read_document(path)?,
                )))
            }
            None => Ok(History::Database(self.open_store()?)),
        }
    }

    fn open_store(&self) -> Result<SqliteHistoryStore> {
        let path = &self.config.db_path;
        SqliteHistoryStore::open(path)
            .with_context(|| format!("Failed to open history database {}", path.display()))
    }
}

fn read_document(path: &Path) -> Result<OsmDocument> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    OsmDocument::from_json(&json).with_context(|| format!("Invalid document {}", path.display()))
}
