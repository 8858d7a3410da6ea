use crate::ids::Team;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Options a builder needs to construct a fresh engine instance.
///
/// `teams` lets the networking layer validate `NetworkingCreateGameOptions.players`
/// against the number of teams the engine will actually have, without
/// understanding any of the game-specific fields packed into `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineOptions {
    pub teams: Vec<Team>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default)]
    pub extra: Value,
}

impl EngineOptions {
    pub fn new(teams: Vec<Team>) -> Self {
        Self {
            teams,
            variant: None,
            seed: None,
            extra: Value::Null,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }
}
