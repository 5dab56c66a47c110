//! State shared between the phases of the inliner.
use crate::config::InlinerConfig;
use types::Database;

/// The state of the program being optimized.
pub struct State {
    pub config: InlinerConfig,
    pub db: Database,
}

impl State {
    pub fn new(config: InlinerConfig) -> Self {
        Self { config, db: Database::new() }
    }

    pub fn with_database(config: InlinerConfig, db: Database) -> Self {
        Self { config, db }
    }
}
