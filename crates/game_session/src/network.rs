//! Top-level registry of per-kind [`Hub`]s (§4.6): case-insensitive lookup
//! by [`GameKind`], hydrate-on-miss from the store, aggregate stats, and a
//! deadline-bounded shutdown.

use crate::error::{HubError, NetworkError};
use crate::game_server::GameServerHandle;
use crate::hub::{Hub, HubStats};
use crate::options::{CreateGameOptions, CreateGameSource, JoinGameOptions, NetworkingCreateGameOptions};
use crate::player_session::PlayerSession;
use crate::store::GameStore;
use board_game::{GameId, GameKind, Notation, Snapshot, Team};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// `GetStats`'s return shape (§6): per-kind active game and player counts.
#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub active_games: HashMap<GameKind, usize>,
    pub active_players: HashMap<GameKind, usize>,
}

/// The process-wide entry point (§4.6). Built once from the hubs an
/// embedder has already spawned via [`Hub::spawn`] — one call per
/// registered engine type, since each is monomorphized over a distinct
/// [`board_game::BoardGame`] implementation that `Network` itself need not
/// know about.
pub struct Network {
    hubs: HashMap<GameKind, Hub>,
    store: Option<Arc<dyn GameStore>>,
}

impl Network {
    pub fn new(hubs: impl IntoIterator<Item = Hub>, store: Option<Arc<dyn GameStore>>) -> Self {
        let hubs = hubs.into_iter().map(|hub| (hub.kind().clone(), hub)).collect();
        Self { hubs, store }
    }

    fn hub(&self, kind: &GameKind) -> Result<&Hub, NetworkError> {
        self.hubs.get(kind).ok_or_else(|| NetworkError::UnknownGameKind(kind.clone()))
    }

    fn source_team_count(source: &CreateGameSource) -> usize {
        match source {
            CreateGameSource::Engine(options) => options.teams.len(),
            CreateGameSource::Notation(notation) => notation.teams().len(),
            CreateGameSource::Stored(record) => record.notation.teams().len(),
        }
    }

    /// §6 `CreateGame`: validates `len(Players) == 0 || len(Players) ==
    /// len(EngineOptions.Teams)` before delegating, since only the caller's
    /// declared team set (not yet a built engine) is available here.
    pub async fn create_game(&self, options: CreateGameOptions) -> Result<(), NetworkError> {
        let hub = self.hub(&options.networking.game_kind)?;
        let team_count = Self::source_team_count(&options.source);
        if !options.networking.players.is_empty() && options.networking.players.len() != team_count {
            return Err(HubError::InconsistentTeams.into());
        }
        hub.create(options).await.map_err(NetworkError::from)
    }

    /// §6 `JoinGame`: hydrates an in-memory instance from the store on a
    /// miss. Two concurrent hydration attempts race; the loser's `Create`
    /// sees `GameAlreadyExists` and simply proceeds to join the winner's
    /// instance (§9 "Hydration race").
    pub async fn join_game(&self, options: JoinGameOptions, session: Arc<PlayerSession>) -> Result<(), NetworkError> {
        let handle = self.resolve_or_hydrate(&options.game_kind, &options.game_id).await?;
        handle.join(session).await.map_err(|e| HubError::from(e).into())
    }

    /// Resolves (hydrating from the store if needed) the running instance's
    /// handle without joining it. A caller upgrading a transport needs this
    /// first: [`crate::player_session::PlayerSession::spawn`] must be handed
    /// this exact handle's `process`/`leave` senders so its reader actually
    /// feeds the right event loop, before [`Network::join_game`] performs
    /// the handshake on the same handle.
    pub async fn resolve(&self, kind: &GameKind, id: &GameId) -> Result<GameServerHandle, NetworkError> {
        self.resolve_or_hydrate(kind, id).await
    }

    pub async fn get_snapshot(&self, kind: &GameKind, id: &GameId, team: Option<Team>) -> Result<Snapshot, NetworkError> {
        let handle = self.resolve_or_hydrate(kind, id).await?;
        handle.get_snapshot(team).await.map_err(|e| HubError::from(e).into())
    }

    pub async fn get_notation(&self, kind: &GameKind, id: &GameId) -> Result<Notation, NetworkError> {
        let handle = self.resolve_or_hydrate(kind, id).await?;
        handle.get_notation().await.map_err(|e| HubError::from(e).into())
    }

    async fn resolve_or_hydrate(&self, kind: &GameKind, id: &GameId) -> Result<GameServerHandle, NetworkError> {
        let hub = self.hub(kind)?;
        if let Some(handle) = hub.lookup(id).await {
            return Ok(handle);
        }
        let store = self.store.as_ref().ok_or_else(|| NetworkError::GameNotFound(kind.clone(), id.clone()))?;
        let record = store
            .get_game(kind, id)
            .await
            .map_err(HubError::from)?
            .ok_or_else(|| NetworkError::GameNotFound(kind.clone(), id.clone()))?;
        let networking = NetworkingCreateGameOptions {
            game_kind: kind.clone(),
            game_id: id.clone(),
            players: HashMap::new(),
            turn_length: None,
            single_device: false,
        };
        match hub.create_from_store(networking, record).await {
            Ok(()) | Err(HubError::GameAlreadyExists(_)) => {}
            Err(err) => return Err(err.into()),
        }
        hub.lookup(id).await.ok_or_else(|| NetworkError::GameNotFound(kind.clone(), id.clone()))
    }

    pub async fn get_active_game_ids(&self) -> HashMap<GameKind, Vec<GameId>> {
        let mut out = HashMap::with_capacity(self.hubs.len());
        for (kind, hub) in &self.hubs {
            out.insert(kind.clone(), hub.active_ids().await);
        }
        out
    }

    pub async fn get_stats(&self) -> NetworkStats {
        let mut stats = NetworkStats::default();
        for (kind, hub) in &self.hubs {
            let HubStats { active_games, active_players } = hub.stats().await;
            stats.active_games.insert(kind.clone(), active_games);
            stats.active_players.insert(kind.clone(), active_players);
        }
        stats
    }

    /// §6 `Close`: every hub gets the same deadline, concurrently, since one
    /// hung hub shouldn't eat into the time the others get. Kinds whose hub
    /// didn't confirm closing within the deadline are collected into
    /// `HubClosure`.
    pub async fn close(&self, deadline: Duration) -> Result<(), NetworkError> {
        let tasks: Vec<_> = self
            .hubs
            .iter()
            .map(|(kind, hub)| {
                let kind = kind.clone();
                let hub = hub.clone();
                tokio::spawn(async move { (kind, hub.close(deadline).await) })
            })
            .collect();

        let mut failed = Vec::new();
        for task in tasks {
            match task.await {
                Ok((_, Ok(()))) => {}
                Ok((kind, Err(_))) => failed.push(kind),
                Err(_) => {} // the task itself panicked; its hub is already logged as unresponsive
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(NetworkError::HubClosure(failed))
        }
    }
}
