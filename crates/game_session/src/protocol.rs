use board_game::{GameId, GameKind, PlayerId, PlayerName, Snapshot, Team};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// A frame received from a connected client. `action_type` is matched
/// against the server-action table first (`SetTeam`, `SetOpenTeam`, `Reset`,
/// `Undo`, `Resign`, `Chat`); anything else falls through to the engine as a
/// [`board_game::Action`] built from `action_type`/`more_details` plus the
/// sender's registered team.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "ActionType")]
    pub action_type: String,
    #[serde(default, rename = "Team")]
    pub team: Option<Team>,
    #[serde(default, rename = "MoreDetails")]
    pub more_details: Value,
}

pub mod server_action {
    pub const SET_TEAM: &str = "SetTeam";
    pub const SET_OPEN_TEAM: &str = "SetOpenTeam";
    pub const RESET: &str = "Reset";
    pub const UNDO: &str = "Undo";
    pub const RESIGN: &str = "Resign";
    pub const CHAT: &str = "Chat";
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetTeamDetails {
    #[serde(rename = "Team")]
    pub team: Team,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResetDetails {
    #[serde(default, rename = "Seed")]
    pub seed: Option<u64>,
    #[serde(default, rename = "Variant")]
    pub variant: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatDetails {
    #[serde(rename = "Msg")]
    pub msg: String,
}

/// A frame sent to a connected client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "Type", content = "Payload")]
pub enum OutboundMessage {
    Game(Snapshot),
    Network(NetworkUpdate),
    Chat(ChatMessage),
    Connected(HashMap<PlayerName, Option<Team>>),
    Error(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkUpdate {
    pub game_kind: GameKind,
    pub game_id: GameId,
    pub players: HashMap<Team, Vec<PlayerId>>,
    pub single_device: bool,
    pub name: PlayerName,
    #[serde(with = "duration_secs_opt")]
    pub turn_time_left: Option<Duration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub name: PlayerName,
    pub msg: String,
}

/// §6: `Network.Payload`'s `TurnTimeLeft` is a string, not a number — this
/// mirrors Go's `time.Duration.String()` closely enough for a client to
/// parse or just display (`"1m30s"`, `"4.2s"`, `"0s"`).
mod duration_secs_opt {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&format_duration(*d)),
            None => s.serialize_none(),
        }
    }

    fn format_duration(d: Duration) -> String {
        let total_secs = d.as_secs();
        let minutes = total_secs / 60;
        let secs = d.as_secs_f64() - (minutes * 60) as f64;
        if minutes > 0 {
            format!("{minutes}m{secs:.0}s")
        } else if secs.fract() == 0.0 {
            format!("{secs:.0}s")
        } else {
            format!("{secs:.1}s")
        }
    }
}
