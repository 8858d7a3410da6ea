use crate::action::Action;
use crate::error::EngineError;
use crate::notation::Notation;
use crate::options::EngineOptions;
use crate::snapshot::Snapshot;
use crate::ids::Team;

/// A single in-progress game instance. One `GameServer` in the networking
/// layer owns exactly one `BoardGame`, mutating it only from its own worker
/// task (see the workspace's `game_session` crate).
pub trait BoardGame: Send + 'static {
    /// Applies an already-validated action (the caller has already confirmed
    /// the acting team matches whoever is on turn) and returns the error
    /// propagated to the sender on failure.
    fn apply(&mut self, action: &Action) -> Result<(), EngineError>;

    /// A point-in-time view, optionally redacted for `team`'s eyes (engines
    /// with hidden information, e.g. unrevealed hands, use this; engines with
    /// full information ignore `team` and return the same view for everyone).
    fn snapshot(&self, team: Option<&Team>) -> Snapshot;

    /// Exposes this engine as [`NotationCapable`] if it implements it.
    /// Lets a caller that is only generic over `BoardGame` (a networking
    /// layer hosting arbitrary engines) discover the capability at runtime
    /// instead of needing a second generic parameter everywhere. Engines
    /// implementing `NotationCapable` override this to return `Some(self)`.
    fn as_notation_capable(&self) -> Option<&dyn NotationCapable> {
        None
    }
}

/// Opt-in capability: an engine whose full state can be serialized to and
/// restored from [`Notation`]. Only engines implementing this can back a
/// durable instance, survive `Undo`, or answer `GetNotation`.
pub trait NotationCapable: BoardGame {
    fn notation(&self) -> Notation;
}

/// Constructs fresh engine instances for one [`crate::ids::GameKind`].
pub trait BoardGameBuilder: Send + Sync + 'static {
    type Engine: BoardGame;

    /// The key this builder registers under, e.g. `"chess"`.
    fn key(&self) -> crate::ids::GameKind;

    fn create(&self, options: &EngineOptions) -> Result<Self::Engine, EngineError>;
}

/// A [`BoardGameBuilder`] whose engine also implements [`NotationCapable`],
/// unlocking `load`. Kept as a separate trait (rather than a method every
/// builder must implement) so that a builder for a history-free game can
/// simply not implement it; the networking layer checks for this capability
/// once, at registration time, rather than failing on every load attempt.
pub trait BoardGameWithNotationBuilder: BoardGameBuilder
where
    Self::Engine: NotationCapable,
{
    fn load(&self, notation: &Notation) -> Result<Self::Engine, EngineError>;
}
