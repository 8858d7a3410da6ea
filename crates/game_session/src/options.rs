use crate::store::StoredRecord;
use board_game::{EngineOptions, GameId, GameKind, Notation, PlayerId, PlayerName, Team};
use std::collections::HashMap;
use std::time::Duration;

/// What a game should be created from. Exactly one variant applies per
/// create call: a fresh engine build from options, a reconstruction from
/// notation (requires a notation-capable builder), or a hydration of an
/// already-persisted record.
#[derive(Debug, Clone)]
pub enum CreateGameSource {
    Engine(EngineOptions),
    Notation(Notation),
    Stored(StoredRecord),
}

/// Fields the networking layer itself needs, independent of the engine.
#[derive(Debug, Clone)]
pub struct NetworkingCreateGameOptions {
    pub game_kind: GameKind,
    pub game_id: GameId,
    pub players: HashMap<Team, Vec<PlayerId>>,
    pub turn_length: Option<Duration>,
    pub single_device: bool,
}

#[derive(Debug, Clone)]
pub struct CreateGameOptions {
    pub networking: NetworkingCreateGameOptions,
    pub source: CreateGameSource,
}

/// Identifies a caller's join attempt; which team (if any) it resolves to is
/// decided by the instance itself (§4.4's join handshake), not the caller.
#[derive(Debug, Clone)]
pub struct JoinGameOptions {
    pub game_kind: GameKind,
    pub game_id: GameId,
    pub player_id: PlayerId,
    pub player_name: PlayerName,
}
