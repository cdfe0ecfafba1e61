//! CLI configuration.

use anyhow::{Context, Result};
use geohist_core::options::DEFAULT_CONCURRENCY_LIMIT;
use geohist_core::Options;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Minimum spacing between emitted updates
    pub threshold: Duration,

    /// Maximum simultaneous history lookups
    pub concurrency_limit: usize,

    /// `SQLite` history database
    pub db_path: PathBuf,

    /// JSON history document to use instead of the database
    pub history_file: Option<PathBuf>,

    /// Fail when a parent references a child with no visible version
    pub require_visible: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            threshold: Duration::from_secs(30 * 60),
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            db_path: PathBuf::from("./geohist.db"),
            history_file: None,
            require_visible: false,
        }
    }
}

impl CliConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `GEOHIST_THRESHOLD_SECS`: update spacing in seconds
    /// - `GEOHIST_CONCURRENCY`: maximum simultaneous lookups
    /// - `GEOHIST_DB_PATH`: `SQLite` history database path
    /// - `GEOHIST_HISTORY_FILE`: JSON history document, bypasses the database
    /// - `GEOHIST_REQUIRE_VISIBLE`: `true` to reject parents with absent children
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set to an unparsable value.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(secs) = var("GEOHIST_THRESHOLD_SECS") {
            let secs: u64 = secs
                .parse()
                .context("Invalid GEOHIST_THRESHOLD_SECS")?;
            config.threshold = Duration::from_secs(secs);
        }

        if let Some(limit) = var("GEOHIST_CONCURRENCY") {
            config.concurrency_limit = limit.parse().context("Invalid GEOHIST_CONCURRENCY")?;
        }

        if let Some(db_path) = var("GEOHIST_DB_PATH") {
            config.db_path = PathBuf::from(db_path);
        }

        if let Some(file) = var("GEOHIST_HISTORY_FILE") {
            config.history_file = Some(PathBuf::from(file));
        }

        if let Some(flag) = var("GEOHIST_REQUIRE_VISIBLE") {
            config.require_visible = flag
                .parse()
                .context("Invalid GEOHIST_REQUIRE_VISIBLE, expected true or false")?;
        }

        Ok(config)
    }

    /// Reconciliation options for this configuration.
    #[must_use]
    pub fn options(&self) -> Options {
        Options::with_threshold(self.threshold)
            .concurrency_limit(self.concurrency_limit)
            .require_visible_children(self.require_visible)
    }
}
