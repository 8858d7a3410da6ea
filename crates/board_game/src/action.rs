use crate::ids::Team;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Something a player (or the server, on timeout) did to a game in progress.
///
/// `action_type` and `more_details` are opaque to everything outside the
/// engine that defined them; the networking layer only ever looks at `team`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<Team>,
    #[serde(default)]
    pub more_details: Value,
}

impl Action {
    pub fn new(action_type: impl Into<String>, team: Option<Team>, more_details: Value) -> Self {
        Self {
            action_type: action_type.into(),
            team,
            more_details,
        }
    }
}
