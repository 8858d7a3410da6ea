//! Engine-facing types: the board-game contract a networking layer drives,
//! independent of any transport or persistence concern.

pub mod action;
pub mod engine;
pub mod error;
pub mod ids;
pub mod notation;
pub mod options;
pub mod snapshot;

pub use action::Action;
pub use engine::{BoardGame, BoardGameBuilder, BoardGameWithNotationBuilder, NotationCapable};
pub use error::EngineError;
pub use ids::{GameId, GameKind, PlayerId, PlayerName, Team};
pub use notation::{Notation, NotationError};
pub use options::EngineOptions;
pub use snapshot::Snapshot;

#[cfg(any(test, feature = "mock"))]
pub mod mock;
