use crate::options::{CreateGameOptions, NetworkingCreateGameOptions};
use board_game::Snapshot;

/// A collaborator notified of a game instance's lifecycle, e.g. for
/// analytics or matchmaking bookkeeping. Never on the critical path: a hub
/// calls these only after its own state transition has already committed.
pub trait Adapter: Send + Sync + 'static {
    /// Called once, only for a user-initiated `Create` (not a hydration of
    /// an existing record from the store).
    fn on_game_start(&self, options: &CreateGameOptions);

    /// Called once the instance has a final snapshot (finished or expired).
    fn on_game_end(&self, snapshot: &Snapshot, options: &NetworkingCreateGameOptions);
}

/// An [`Adapter`] that does nothing, for embedders with no collaborator.
pub struct NoopAdapter;

impl Adapter for NoopAdapter {
    fn on_game_start(&self, _options: &CreateGameOptions) {}
    fn on_game_end(&self, _snapshot: &Snapshot, _options: &NetworkingCreateGameOptions) {}
}
