//! Per-[`GameKind`] registry (§4.5): owns the `GameID → GameServerHandle`
//! map for one game kind, serializes `Create`/lookup/cleanup against that
//! map on its own worker, and runs the once-a-minute expiry sweep.

use crate::adapter::Adapter;
use crate::error::HubError;
use crate::game_server::{self, EngineFactory, GameServerHandle, RebuildSource};
use crate::options::{CreateGameOptions, CreateGameSource, NetworkingCreateGameOptions};
use crate::store::{GameStore, StoredRecord};
use board_game::{BoardGame, GameId, GameKind, Notation};
use log::{debug, error, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

/// Aggregate counters [`crate::network::Network::get_stats`] reports per kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct HubStats {
    pub active_games: usize,
    pub active_players: usize,
}

enum HubRequest {
    Create {
        options: CreateGameOptions,
        reply: oneshot::Sender<Result<(), HubError>>,
    },
    Lookup {
        id: GameId,
        reply: oneshot::Sender<Option<GameServerHandle>>,
    },
    ActiveIds {
        reply: oneshot::Sender<Vec<GameId>>,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
    Close {
        deadline: Duration,
        reply: oneshot::Sender<Result<(), HubError>>,
    },
    /// §4.4.3/§7: a game server's engine panicked and entered degraded mode;
    /// drop it from the registry now instead of waiting for the next expiry
    /// sweep. No persistence, unlike `Close`/expiry — a degraded engine has
    /// no snapshot worth trusting.
    Cleanup {
        id: GameId,
    },
}

/// Forwards lifecycle events to every adapter a hub was built with. `Hub`
/// itself calls `on_game_start` directly (only for user-initiated creates,
/// outside the worker); this is what a [`crate::game_server::Worker`] holds
/// so `on_game_end` reaches every collaborator regardless of how the
/// instance came to exist.
struct CompositeAdapter(Vec<Arc<dyn Adapter>>);

impl Adapter for CompositeAdapter {
    fn on_game_start(&self, options: &CreateGameOptions) {
        for adapter in &self.0 {
            adapter.on_game_start(options);
        }
    }

    fn on_game_end(&self, snapshot: &board_game::Snapshot, options: &NetworkingCreateGameOptions) {
        for adapter in &self.0 {
            adapter.on_game_end(snapshot, options);
        }
    }
}

/// A handle to a running per-kind hub worker. Cloning is cheap; clones share
/// the same underlying registry.
#[derive(Clone)]
pub struct Hub {
    kind: GameKind,
    request_tx: mpsc::UnboundedSender<HubRequest>,
    adapters: Vec<Arc<dyn Adapter>>,
}

impl Hub {
    pub fn kind(&self) -> &GameKind {
        &self.kind
    }

    /// Spawns the worker backing one game kind's registry. `factory` builds
    /// and (optionally) loads engines of the concrete type `E` this hub is
    /// monomorphized over; a `load` of `None` marks this kind as lacking
    /// notation capability (§4.3/§9's tagged-builder design note).
    pub fn spawn<E: BoardGame>(
        kind: GameKind,
        factory: EngineFactory<E>,
        adapters: Vec<Arc<dyn Adapter>>,
        store: Option<Arc<dyn GameStore>>,
        expiry: Duration,
    ) -> Hub {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (cleanup_tx, cleanup_rx) = mpsc::unbounded_channel();
        let worker = HubWorker {
            kind: kind.clone(),
            factory,
            adapter: Arc::new(CompositeAdapter(adapters.clone())),
            games: HashMap::new(),
            store,
            expiry,
            request_rx,
            cleanup_tx,
            cleanup_rx,
        };
        tokio::spawn(worker.run());
        Hub {
            kind,
            request_tx,
            adapters,
        }
    }

    /// §4.5 `Create`: rejects an existing `GameID`, otherwise builds and
    /// starts a fresh instance. `OnGameStart` fires after the reply, outside
    /// the worker's critical section, and only for this user-initiated path
    /// (§9 Open Question (a)) — hydration from the store never calls it.
    pub async fn create(&self, options: CreateGameOptions) -> Result<(), HubError> {
        let (reply, rx) = oneshot::channel();
        self.request_tx
            .send(HubRequest::Create {
                options: options.clone(),
                reply,
            })
            .map_err(|_| HubError::Closing)?;
        let result = rx.await.map_err(|_| HubError::Closing)?;
        if result.is_ok() {
            for adapter in &self.adapters {
                adapter.on_game_start(&options);
            }
        }
        result
    }

    /// Hydrates a record from the store into a live instance without firing
    /// `OnGameStart` (§9 Open Question (a)): used when a `Join`/`GetSnapshot`
    /// finds no in-memory instance but the store has a record.
    pub async fn create_from_store(
        &self,
        networking: NetworkingCreateGameOptions,
        record: StoredRecord,
    ) -> Result<(), HubError> {
        let (reply, rx) = oneshot::channel();
        self.request_tx
            .send(HubRequest::Create {
                options: CreateGameOptions {
                    networking,
                    source: CreateGameSource::Stored(record),
                },
                reply,
            })
            .map_err(|_| HubError::Closing)?;
        rx.await.map_err(|_| HubError::Closing)?
    }

    pub async fn lookup(&self, id: &GameId) -> Option<GameServerHandle> {
        let (reply, rx) = oneshot::channel();
        if self
            .request_tx
            .send(HubRequest::Lookup { id: id.clone(), reply })
            .is_err()
        {
            return None;
        }
        rx.await.ok().flatten()
    }

    pub async fn active_ids(&self) -> Vec<GameId> {
        let (reply, rx) = oneshot::channel();
        if self.request_tx.send(HubRequest::ActiveIds { reply }).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn stats(&self) -> HubStats {
        let (reply, rx) = oneshot::channel();
        if self.request_tx.send(HubRequest::Stats { reply }).is_err() {
            return HubStats::default();
        }
        rx.await.unwrap_or_default()
    }

    /// §6 `Close`: persists every in-flight instance with meaningful history,
    /// then stops the worker. Returns an error naming this kind if the
    /// worker couldn't be reached at all; [`crate::network::Network::close`]
    /// aggregates these into `HubClosure`.
    pub async fn close(&self, deadline: Duration) -> Result<(), HubError> {
        let (reply, rx) = oneshot::channel();
        if self.request_tx.send(HubRequest::Close { deadline, reply }).is_err() {
            return Err(HubError::Closing);
        }
        rx.await.map_err(|_| HubError::Closing)?
    }
}

struct HubWorker<E: BoardGame> {
    kind: GameKind,
    factory: EngineFactory<E>,
    adapter: Arc<dyn Adapter>,
    games: HashMap<GameId, GameServerHandle>,
    store: Option<Arc<dyn GameStore>>,
    expiry: Duration,
    request_rx: mpsc::UnboundedReceiver<HubRequest>,
    cleanup_tx: mpsc::UnboundedSender<GameId>,
    cleanup_rx: mpsc::UnboundedReceiver<GameId>,
}

impl<E: BoardGame> HubWorker<E> {
    async fn run(mut self) {
        let mut expiry_tick = tokio::time::interval(Duration::from_secs(60));
        expiry_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Panics in this loop are not caught (unlike a game server's, which
        // wraps engine calls): the registry bookkeeping here never touches
        // engine code. A panic here is a bug in the hub itself, and it's
        // better to let the worker die loudly than to limp on with a
        // half-updated `games` map.
        loop {
            tokio::select! {
                Some(request) = self.request_rx.recv() => {
                    if self.handle(request).await {
                        break;
                    }
                }
                Some(id) = self.cleanup_rx.recv() => {
                    self.handle(HubRequest::Cleanup { id }).await;
                }
                _ = expiry_tick.tick() => self.sweep_expired().await,
                else => break,
            }
        }
    }

    async fn handle(&mut self, request: HubRequest) -> bool {
        match request {
            HubRequest::Create { options, reply } => {
                let result = self.create(options);
                let _ = reply.send(result);
                false
            }
            HubRequest::Lookup { id, reply } => {
                let _ = reply.send(self.games.get(&id).cloned());
                false
            }
            HubRequest::ActiveIds { reply } => {
                let _ = reply.send(self.games.keys().cloned().collect());
                false
            }
            HubRequest::Stats { reply } => {
                let mut active_players = 0;
                for handle in self.games.values() {
                    if let Ok(meta) = handle.meta().await {
                        active_players += meta.player_count;
                    }
                }
                let _ = reply.send(HubStats {
                    active_games: self.games.len(),
                    active_players,
                });
                false
            }
            HubRequest::Close { deadline, reply } => {
                let result = self.close(deadline).await;
                let _ = reply.send(result);
                true
            }
            HubRequest::Cleanup { id } => {
                self.cleanup(id).await;
                false
            }
        }
    }

    fn create(&mut self, options: CreateGameOptions) -> Result<(), HubError> {
        let id = options.networking.game_id.clone();
        if self.games.contains_key(&id) {
            return Err(HubError::GameAlreadyExists(id));
        }
        let (engine, rebuild_source) = match options.source {
            CreateGameSource::Engine(engine_options) => {
                let engine = (self.factory.create)(&engine_options).map_err(crate::error::SessionError::Engine)?;
                (engine, RebuildSource::Engine(engine_options))
            }
            CreateGameSource::Notation(notation) => {
                let load = self.factory.load.as_ref().ok_or(HubError::BgnUnsupported)?;
                let engine = load(&notation).map_err(crate::error::SessionError::Engine)?;
                (engine, RebuildSource::Notation(notation))
            }
            CreateGameSource::Stored(record) => {
                let load = self.factory.load.as_ref().ok_or(HubError::BgnUnsupported)?;
                let engine = load(&record.notation).map_err(crate::error::SessionError::Engine)?;
                (engine, RebuildSource::Notation(record.notation))
            }
        };
        let handle = game_server::spawn(
            engine,
            self.factory.clone(),
            rebuild_source,
            options.networking,
            self.adapter.clone(),
            self.cleanup_tx.clone(),
        );
        self.games.insert(id, handle);
        Ok(())
    }

    /// §4.4.3/§7: a degraded instance has nothing worth persisting, so this
    /// just drops it and stops its worker, unlike the expiry sweep's
    /// persist-then-remove.
    async fn cleanup(&mut self, id: GameId) {
        if let Some(handle) = self.games.remove(&id) {
            debug!("cleaning up degraded '{}' with id '{}'", self.kind, id);
            let _ = handle.stop().await;
        }
    }

    /// §4.5 expiry sweep: anything past `max(updated_at, created_at) +
    /// expiry` with meaningful history (played at least one action, or
    /// replayed from one) is persisted before being cleaned up. Store
    /// failures are logged and the sweep moves on (§7: logged and skipped).
    async fn sweep_expired(&mut self) {
        let now = Instant::now();
        let mut expired = Vec::new();
        for (id, handle) in self.games.iter() {
            let Ok(meta) = handle.meta().await else { continue };
            let last_active = meta.updated_at.max(meta.created_at);
            if now.duration_since(last_active) > self.expiry {
                expired.push((id.clone(), meta));
            }
        }
        for (id, meta) in expired {
            debug!("cleaning '{}' with id '{}'", self.kind, id);
            if let Some(handle) = self.games.remove(&id) {
                if meta.action_count > 0 || meta.play_count > 0 {
                    if let Ok(final_state) = handle.stop().await {
                        if let Some(notation) = final_state.notation {
                            self.persist(&id, notation, meta.play_count).await;
                        }
                    }
                } else {
                    let _ = handle.stop().await;
                }
            }
        }
    }

    async fn persist(&self, id: &GameId, notation: Notation, play_count: u64) {
        let Some(store) = &self.store else { return };
        let now = Instant::now();
        let record = StoredRecord {
            game_kind: self.kind.clone(),
            game_id: id.clone(),
            notation,
            created_at: now,
            updated_at: now,
            play_count,
        };
        if let Err(err) = store.store(record).await {
            warn!("failed to persist expiring game '{}/{}': {err}", self.kind, id);
        }
    }

    /// §6 `Close`: store every instance with history, then drop the map.
    /// All games collectively share `deadline`; a slow store does not get a
    /// fresh deadline per game.
    async fn close(&mut self, deadline: Duration) -> Result<(), HubError> {
        let outcome = tokio::time::timeout(deadline, async {
            let ids: Vec<GameId> = self.games.keys().cloned().collect();
            for id in ids {
                let Some(handle) = self.games.remove(&id) else { continue };
                let play_count = handle.meta().await.map(|meta| meta.play_count).unwrap_or(0);
                let Ok(final_state) = handle.stop().await else { continue };
                if let Some(notation) = final_state.notation {
                    if !final_state.snapshot.actions.is_empty() {
                        self.persist(&id, notation, play_count).await;
                    }
                }
            }
        })
        .await;
        match outcome {
            Ok(()) => Ok(()),
            Err(_) => {
                error!("hub '{}' did not close within its deadline", self.kind);
                Err(HubError::Closing)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::InMemoryGameStore;
    use board_game::mock::{NimBuilder, NimGame};
    use board_game::{Action, BoardGameBuilder, BoardGameWithNotationBuilder, EngineOptions, Team};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn factory() -> EngineFactory<NimGame> {
        let create_builder = Arc::new(NimBuilder);
        let load_builder = create_builder.clone();
        EngineFactory {
            create: Arc::new(move |options| create_builder.create(options)),
            load: Some(Arc::new(move |notation| load_builder.load(notation))),
        }
    }

    fn factory_without_load() -> EngineFactory<NimGame> {
        let builder = Arc::new(NimBuilder);
        EngineFactory {
            create: Arc::new(move |options| builder.create(options)),
            load: None,
        }
    }

    fn options(id: &str) -> CreateGameOptions {
        CreateGameOptions {
            networking: NetworkingCreateGameOptions {
                game_kind: GameKind::new("nim"),
                game_id: GameId(id.to_owned()),
                players: HashMap::new(),
                turn_length: None,
                single_device: false,
            },
            source: CreateGameSource::Engine(EngineOptions::new(vec![Team::from("a"), Team::from("b")])),
        }
    }

    fn played_notation() -> Notation {
        let mut tags = BTreeMap::new();
        tags.insert("Teams".to_owned(), "a, b".to_owned());
        tags.insert("Pile".to_owned(), "13".to_owned());
        Notation::new(
            tags,
            vec![Action::new("take", Some(Team::from("a")), json!({ "count": 2 }))],
        )
    }

    #[tokio::test]
    async fn create_then_lookup_succeeds() {
        let hub = Hub::spawn(GameKind::new("nim"), factory(), Vec::new(), None, Duration::from_secs(3600));
        hub.create(options("g1")).await.unwrap();
        assert!(hub.lookup(&GameId("g1".to_owned())).await.is_some());
        assert_eq!(hub.active_ids().await, vec![GameId("g1".to_owned())]);
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let hub = Hub::spawn(GameKind::new("nim"), factory(), Vec::new(), None, Duration::from_secs(3600));
        hub.create(options("g1")).await.unwrap();
        let err = hub.create(options("g1")).await.unwrap_err();
        assert!(matches!(err, HubError::GameAlreadyExists(id) if id == GameId("g1".to_owned())));
    }

    #[tokio::test]
    async fn notation_source_without_a_load_capable_factory_is_rejected() {
        let hub = Hub::spawn(
            GameKind::new("nim"),
            factory_without_load(),
            Vec::new(),
            None,
            Duration::from_secs(3600),
        );
        let mut create = options("g1");
        create.source = CreateGameSource::Notation(played_notation());
        let err = hub.create(create).await.unwrap_err();
        assert!(matches!(err, HubError::BgnUnsupported));
    }

    #[tokio::test]
    async fn lookup_of_an_unknown_id_is_none() {
        let hub = Hub::spawn(GameKind::new("nim"), factory(), Vec::new(), None, Duration::from_secs(3600));
        assert!(hub.lookup(&GameId("missing".to_owned())).await.is_none());
    }

    #[tokio::test]
    async fn close_removes_a_fresh_game_without_persisting_it() {
        let store = Arc::new(InMemoryGameStore::new());
        let hub = Hub::spawn(
            GameKind::new("nim"),
            factory(),
            Vec::new(),
            Some(store.clone()),
            Duration::from_secs(3600),
        );
        hub.create(options("g1")).await.unwrap();
        hub.close(Duration::from_millis(500)).await.unwrap();
        assert!(hub.lookup(&GameId("g1".to_owned())).await.is_none());
        let stored = store.get_game(&GameKind::new("nim"), &GameId("g1".to_owned())).await.unwrap();
        assert!(stored.is_none());
    }

    #[tokio::test]
    async fn close_persists_a_game_created_from_notation_with_history() {
        let store = Arc::new(InMemoryGameStore::new());
        let hub = Hub::spawn(
            GameKind::new("nim"),
            factory(),
            Vec::new(),
            Some(store.clone()),
            Duration::from_secs(3600),
        );
        let mut create = options("g1");
        create.source = CreateGameSource::Notation(played_notation());
        hub.create(create).await.unwrap();

        hub.close(Duration::from_millis(500)).await.unwrap();

        let stored = store
            .get_game(&GameKind::new("nim"), &GameId("g1".to_owned()))
            .await
            .unwrap();
        assert!(stored.is_some());
        assert_eq!(stored.unwrap().notation.actions.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_sweep_persists_and_removes_idle_games_with_history() {
        let store = Arc::new(InMemoryGameStore::new());
        let hub = Hub::spawn(
            GameKind::new("nim"),
            factory(),
            Vec::new(),
            Some(store.clone()),
            Duration::from_millis(0),
        );
        let mut create = options("g1");
        create.source = CreateGameSource::Notation(played_notation());
        hub.create(create).await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert!(hub.lookup(&GameId("g1".to_owned())).await.is_none());
        let stored = store
            .get_game(&GameKind::new("nim"), &GameId("g1".to_owned()))
            .await
            .unwrap();
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn stats_reports_zero_for_an_empty_hub() {
        let hub = Hub::spawn(GameKind::new("nim"), factory(), Vec::new(), None, Duration::from_secs(3600));
        let stats = hub.stats().await;
        assert_eq!(stats.active_games, 0);
        assert_eq!(stats.active_players, 0);
    }

    /// An engine whose every call blocks the worker thread, standing in for
    /// §8 scenario 6's "engine hangs for 10s inside a Do" during shutdown.
    struct HangingGame(Duration);

    impl board_game::BoardGame for HangingGame {
        fn apply(&mut self, _action: &Action) -> Result<(), board_game::EngineError> {
            std::thread::sleep(self.0);
            Ok(())
        }

        fn snapshot(&self, _team: Option<&Team>) -> board_game::Snapshot {
            std::thread::sleep(self.0);
            board_game::Snapshot {
                teams: vec![Team::from("a"), Team::from("b")],
                turn: Some(Team::from("a")),
                actions: Vec::new(),
                targets: serde_json::Value::Null,
                winners: Vec::new(),
            }
        }
    }

    fn hanging_factory(hang_for: Duration) -> EngineFactory<HangingGame> {
        EngineFactory {
            create: Arc::new(move |_options| Ok(HangingGame(hang_for))),
            load: None,
        }
    }

    /// §8 scenario 6: a hub holding an instance whose engine hangs well past
    /// the close deadline must still return within that deadline (as a
    /// reported failure), rather than block the caller indefinitely.
    #[tokio::test(flavor = "multi_thread")]
    async fn close_reports_failure_rather_than_hang_on_a_stuck_engine() {
        let hub = Hub::spawn(
            GameKind::new("nim"),
            hanging_factory(Duration::from_secs(10)),
            Vec::new(),
            None,
            Duration::from_secs(3600),
        );
        hub.create(CreateGameOptions {
            networking: NetworkingCreateGameOptions {
                game_kind: GameKind::new("nim"),
                game_id: GameId("stuck".to_owned()),
                players: HashMap::new(),
                turn_length: None,
                single_device: false,
            },
            source: CreateGameSource::Engine(EngineOptions::new(vec![Team::from("a"), Team::from("b")])),
        })
        .await
        .unwrap();

        let started = std::time::Instant::now();
        let result = hub.close(Duration::from_millis(50)).await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    /// An engine whose `snapshot` always panics, standing in for an engine
    /// bug caught by `safe_snapshot`'s `catch_unwind`.
    struct PanickingGame;

    impl board_game::BoardGame for PanickingGame {
        fn apply(&mut self, _action: &Action) -> Result<(), board_game::EngineError> {
            Ok(())
        }

        fn snapshot(&self, _team: Option<&Team>) -> board_game::Snapshot {
            panic!("engine bug");
        }
    }

    fn panicking_factory() -> EngineFactory<PanickingGame> {
        EngineFactory {
            create: Arc::new(|_options| Ok(PanickingGame)),
            load: None,
        }
    }

    /// §4.4.3/§7: once an engine panics and the instance goes degraded, the
    /// hub drops it from its registry on its own, without waiting for the
    /// next expiry sweep.
    #[tokio::test]
    async fn a_degraded_game_is_cleaned_up_without_waiting_for_expiry() {
        let hub = Hub::spawn(
            GameKind::new("nim"),
            panicking_factory(),
            Vec::new(),
            None,
            Duration::from_secs(3600),
        );
        hub.create(options("g1")).await.unwrap();
        let handle = hub.lookup(&GameId("g1".to_owned())).await.unwrap();

        let _ = handle.get_snapshot(None).await;

        for _ in 0..100 {
            if hub.lookup(&GameId("g1".to_owned())).await.is_none() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("degraded game was not cleaned up from the hub");
    }
}
