//! Scene configuration.

use serde::{Deserialize, Serialize};

/// Options for a [`Scene`](crate::scene::Scene).
///
/// Deserializes from partial JSON; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Reject documents naming component kinds that are not registered.
    /// When `false` such components are skipped with a warning.
    pub strict_components: bool,
    /// Generate UIDs from this seed instead of randomly.
    pub uid_seed: Option<u64>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            strict_components: true,
            uid_seed: None,
        }
    }
}
