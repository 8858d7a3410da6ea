use thiserror::Error;

/// Errors an engine can hand back from [`crate::engine::BoardGame::apply`] or
/// the builders' `create`/`load`.
#[derive(Debug, Error)]
pub enum EngineError {
    /// `options.teams` doesn't make sense for this game (wrong count, duplicate names, ...).
    #[error("invalid create options: {0}")]
    InvalidOptions(String),
    /// `builder.load` was handed notation this engine can't reconstruct from.
    #[error("invalid notation: {0}")]
    InvalidNotation(String),
    /// The action was well-formed but illegal in the current position.
    #[error("illegal action: {0}")]
    IllegalAction(String),
}
