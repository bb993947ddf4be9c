use crewgrid_history::DEFAULT_DEPTH;
use serde::{Deserialize, Serialize};

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of undo levels
    pub history_depth: usize,
    /// Refetch loaded weeks after a failed remote write
    pub refresh_on_failure: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_depth: DEFAULT_DEPTH,
            refresh_on_failure: true,
        }
    }
}
