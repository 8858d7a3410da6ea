use board_game::{EngineError, GameId, GameKind, Team};
use thiserror::Error;

/// Errors that can arise while a single player's action is routed through a
/// [`crate::game_server::GameServer`].
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("team {0} is not open for new players")]
    TeamNotOpen(Team),
    #[error("no open team is available")]
    NoOpenTeam,
    #[error("that action belongs to a different team than the sender's")]
    WrongTeamAction,
    #[error("chat history is full")]
    ChatFull,
    #[error("this game does not support resetting/undoing from notation")]
    BgnUnsupported,
    #[error("invalid create game options: {0}")]
    InvalidCreateOptions(String),
    #[error("malformed action payload: {0}")]
    MalformedAction(String),
    #[error("the game instance has shut down")]
    InstanceGone,
    #[error("this player is already connected to this game")]
    PlayerAlreadyConnected,
    #[error("this player is not part of this game's roster")]
    PlayerUnauthorized,
    #[error("that action is not allowed in the current mode")]
    ActionNotAllowed,
}

/// Errors a [`crate::hub::Hub`] can surface for create/join/lookup calls.
#[derive(Debug, Error)]
pub enum HubError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("game {0} already exists")]
    GameAlreadyExists(GameId),
    #[error("game {0} not found")]
    GameNotFound(GameId),
    #[error("hub is shutting down, no new games are accepted")]
    Closing,
    #[error("number of teams in Players is inconsistent with the engine's team count")]
    InconsistentTeams,
    #[error("invalid create game options: {0}")]
    InvalidCreateOptions(String),
    #[error("this engine does not support board-game notation")]
    BgnUnsupported,
}

/// Errors a [`crate::network::Network`] can surface.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error(transparent)]
    Hub(#[from] HubError),
    #[error("unknown game kind {0}")]
    UnknownGameKind(GameKind),
    #[error("game {1} not found in kind {0}")]
    GameNotFound(GameKind, GameId),
    #[error("one or more hubs failed to close within their deadline: {}", format_kinds(.0))]
    HubClosure(Vec<GameKind>),
}

fn format_kinds(kinds: &[GameKind]) -> String {
    kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
}

/// Errors a [`crate::store::GameStore`] implementation can return.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("durable storage is not enabled for this game kind")]
    NotEnabled,
    #[error("game not found in store")]
    NotFound,
    #[error("store connection error: {0}")]
    Connection(String),
    #[error("store select error: {0}")]
    Select(String),
    #[error("store insert error: {0}")]
    Insert(String),
}
