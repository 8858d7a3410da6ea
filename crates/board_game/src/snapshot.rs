use crate::action::Action;
use crate::ids::Team;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An immutable view of an engine's state at one instant, as handed back by
/// [`crate::engine::BoardGame::snapshot`] after every action.
///
/// `targets` is intentionally untyped: engines that support the autoplay
/// fallback (§4.4.2's "nobody acts before the clock runs out" case) populate
/// it with something that deserializes as `Vec<Action>`; engines that don't
/// support autoplay may leave it `Value::Null`, and the caller treats a
/// decode failure the same as "no legal actions to choose from".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub teams: Vec<Team>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn: Option<Team>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub targets: Value,
    #[serde(default)]
    pub winners: Vec<Team>,
}

impl Snapshot {
    pub fn is_finished(&self) -> bool {
        !self.winners.is_empty()
    }

    /// Best-effort decode of `targets` as a list of legal next actions.
    /// Returns `None` if the engine didn't populate `targets` in that shape.
    pub fn targets_as_actions(&self) -> Option<Vec<Action>> {
        serde_json::from_value(self.targets.clone()).ok()
    }
}
