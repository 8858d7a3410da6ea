use crate::adapter::Adapter;
use crate::error::SessionError;
use crate::options::NetworkingCreateGameOptions;
use crate::player_session::{ClientMessage, PlayerSession};
use crate::protocol::{server_action, ChatDetails, NetworkUpdate, OutboundMessage, ResetDetails, SetTeamDetails};
use crate::timer::{Alarm, Timer};
use board_game::{Action, BoardGame, EngineError, EngineOptions, GameId, Notation, Snapshot, Team};
use log::{debug, error, warn};
use rand::Rng;
use server_util::PtrKey;
use std::cell::Cell;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot};

/// Chat history above this size is rejected rather than trimmed, matching
/// the source server's fixed 250-message cap.
const CHAT_CAP: usize = 250;

/// Where a fresh engine instance comes from when it needs rebuilding
/// (`Undo`, `Reset`). Collapsed from [`crate::options::CreateGameSource`] at
/// construction time: a `Stored` source always rebuilds via `Notation`.
#[derive(Debug, Clone)]
pub enum RebuildSource {
    Engine(EngineOptions),
    Notation(Notation),
}

/// The create/load closures a [`GameServer`] needs to rebuild its engine,
/// supplied by whichever [`crate::hub::Hub`] spawned it (the hub is the one
/// that actually knows about the concrete [`board_game::BoardGameBuilder`]).
pub struct EngineFactory<E> {
    pub create: Arc<dyn Fn(&EngineOptions) -> Result<E, EngineError> + Send + Sync>,
    pub load: Option<Arc<dyn Fn(&Notation) -> Result<E, EngineError> + Send + Sync>>,
}

impl<E> Clone for EngineFactory<E> {
    fn clone(&self) -> Self {
        Self {
            create: self.create.clone(),
            load: self.load.clone(),
        }
    }
}

pub struct FinalState {
    pub snapshot: Snapshot,
    pub notation: Option<Notation>,
}

struct JoinRequest {
    session: Arc<PlayerSession>,
    reply: oneshot::Sender<Result<(), SessionError>>,
}

enum ControlRequest {
    GetSnapshot {
        team: Option<Team>,
        reply: oneshot::Sender<Snapshot>,
    },
    GetNotation {
        reply: oneshot::Sender<Result<Notation, SessionError>>,
    },
    Stop {
        reply: oneshot::Sender<FinalState>,
    },
    Meta {
        reply: oneshot::Sender<GameMeta>,
    },
}

/// Bookkeeping a [`crate::hub::Hub`] needs to run its expiry sweep without
/// reaching into instance-private state: when this instance last saw any
/// activity, and whether it has history worth persisting.
#[derive(Debug, Clone)]
pub struct GameMeta {
    pub created_at: Instant,
    pub updated_at: Instant,
    pub play_count: u64,
    pub action_count: usize,
    pub player_count: usize,
}

/// A handle to a running game instance's worker task. Cloning is cheap; all
/// clones talk to the same instance.
#[derive(Clone)]
pub struct GameServerHandle {
    process_tx: mpsc::UnboundedSender<ClientMessage>,
    leave_tx: mpsc::UnboundedSender<Arc<PlayerSession>>,
    join_tx: mpsc::UnboundedSender<JoinRequest>,
    control_tx: mpsc::UnboundedSender<ControlRequest>,
}

impl GameServerHandle {
    pub fn process_sender(&self) -> mpsc::UnboundedSender<ClientMessage> {
        self.process_tx.clone()
    }

    pub fn leave_sender(&self) -> mpsc::UnboundedSender<Arc<PlayerSession>> {
        self.leave_tx.clone()
    }

    pub async fn join(&self, session: Arc<PlayerSession>) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        if self.join_tx.send(JoinRequest { session, reply }).is_err() {
            return Err(SessionError::InstanceGone);
        }
        rx.await.unwrap_or(Err(SessionError::InstanceGone))
    }

    pub async fn get_snapshot(&self, team: Option<Team>) -> Result<Snapshot, SessionError> {
        let (reply, rx) = oneshot::channel();
        if self
            .control_tx
            .send(ControlRequest::GetSnapshot { team, reply })
            .is_err()
        {
            return Err(SessionError::InstanceGone);
        }
        rx.await.map_err(|_| SessionError::InstanceGone)
    }

    pub async fn get_notation(&self) -> Result<Notation, SessionError> {
        let (reply, rx) = oneshot::channel();
        if self
            .control_tx
            .send(ControlRequest::GetNotation { reply })
            .is_err()
        {
            return Err(SessionError::InstanceGone);
        }
        rx.await.unwrap_or(Err(SessionError::InstanceGone))
    }

    pub async fn stop(&self) -> Result<FinalState, SessionError> {
        let (reply, rx) = oneshot::channel();
        if self.control_tx.send(ControlRequest::Stop { reply }).is_err() {
            return Err(SessionError::InstanceGone);
        }
        rx.await.map_err(|_| SessionError::InstanceGone)
    }

    pub async fn meta(&self) -> Result<GameMeta, SessionError> {
        let (reply, rx) = oneshot::channel();
        if self.control_tx.send(ControlRequest::Meta { reply }).is_err() {
            return Err(SessionError::InstanceGone);
        }
        rx.await.map_err(|_| SessionError::InstanceGone)
    }
}

/// Spawns the worker task backing one game instance and returns a handle to
/// it. The task runs until [`GameServerHandle::stop`] is called or every
/// channel into it is dropped.
///
/// `cleanup_tx` is the owning [`crate::hub::Hub`]'s cleanup channel (§4.4.3):
/// the worker sends its own `GameId` on it exactly once, the moment it first
/// enters degraded mode, so the hub can drop it from its registry instead of
/// waiting on the next expiry sweep.
pub fn spawn<E: BoardGame>(
    engine: E,
    factory: EngineFactory<E>,
    rebuild_source: RebuildSource,
    networking: NetworkingCreateGameOptions,
    adapter: Arc<dyn Adapter>,
    cleanup_tx: mpsc::UnboundedSender<GameId>,
) -> GameServerHandle {
    let (process_tx, process_rx) = mpsc::unbounded_channel();
    let (leave_tx, leave_rx) = mpsc::unbounded_channel();
    let (join_tx, join_rx) = mpsc::unbounded_channel();
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (alarm_tx, alarm_rx) = mpsc::unbounded_channel();

    let worker = Worker {
        engine,
        factory,
        rebuild_source,
        networking,
        adapter,
        cleanup_tx,
        roster: HashMap::new(),
        open_teams: Vec::new(),
        chat_history: Vec::new(),
        play_count: 0,
        created_at: Instant::now(),
        updated_at: Instant::now(),
        last_good_snapshot: None,
        degraded: Cell::new(false),
        timer: Timer::new(alarm_tx),
        process_rx,
        leave_rx,
        join_rx,
        control_rx,
        alarm_rx,
    };
    tokio::spawn(worker.run());

    GameServerHandle {
        process_tx,
        leave_tx,
        join_tx,
        control_tx,
    }
}

struct Worker<E: BoardGame> {
    engine: E,
    factory: EngineFactory<E>,
    rebuild_source: RebuildSource,
    networking: NetworkingCreateGameOptions,
    adapter: Arc<dyn Adapter>,
    cleanup_tx: mpsc::UnboundedSender<GameId>,
    roster: HashMap<PtrKey<PlayerSession>, Option<Team>>,
    open_teams: Vec<Team>,
    chat_history: Vec<(board_game::PlayerName, String)>,
    play_count: u64,
    created_at: Instant,
    updated_at: Instant,
    last_good_snapshot: Option<Snapshot>,
    degraded: Cell<bool>,
    timer: Timer,
    process_rx: mpsc::UnboundedReceiver<ClientMessage>,
    leave_rx: mpsc::UnboundedReceiver<Arc<PlayerSession>>,
    join_rx: mpsc::UnboundedReceiver<JoinRequest>,
    control_rx: mpsc::UnboundedReceiver<ControlRequest>,
    alarm_rx: mpsc::UnboundedReceiver<Alarm>,
}

impl<E: BoardGame> Worker<E> {
    async fn run(mut self) {
        self.open_teams = self.safe_snapshot(None).teams;
        self.last_good_snapshot = Some(self.safe_snapshot(None));

        // Roster-mode instances are "online" from the moment they exist —
        // every participant is already known, unlike an open lobby waiting
        // for its first join — so the turn clock starts immediately rather
        // than waiting for the first action.
        if !self.open_lobby() {
            if let Some(turn_length) = self.networking.turn_length {
                self.timer.start(turn_length);
            }
        }

        loop {
            tokio::select! {
                Some(request) = self.join_rx.recv() => self.handle_join(request),
                Some(session) = self.leave_rx.recv() => self.handle_leave(session),
                Some(message) = self.process_rx.recv(), if !self.degraded.get() => self.handle_process(message),
                Some(alarm) = self.alarm_rx.recv(), if !self.degraded.get() => self.handle_alarm(alarm),
                Some(request) = self.control_rx.recv() => {
                    if self.handle_control(request) {
                        break;
                    }
                }
                else => break,
            }
        }

        for key in self.roster.keys() {
            key.close();
        }
    }

    /// Implements §4.4's join handshake: roster-mode instances bind the
    /// session to whichever team its `PlayerId` is enumerated under (or
    /// reject it), open lobbies admit anyone as teamless. Order matters here
    /// — the joiner gets its `Network` then `Game` message before anyone
    /// (including itself) receives the `Connected` broadcast.
    fn handle_join(&mut self, request: JoinRequest) {
        let session = request.session;
        if self.degraded.get() {
            let _ = request.reply.send(Err(SessionError::InstanceGone));
            return;
        }
        let key = PtrKey::new(session.clone());
        if self.roster.contains_key(&key) {
            let _ = request.reply.send(Err(SessionError::PlayerAlreadyConnected));
            return;
        }
        let team = if self.networking.players.is_empty() {
            None
        } else {
            let assigned = self
                .networking
                .players
                .iter()
                .find(|(_, players)| players.contains(&session.player_id))
                .map(|(team, _)| team.clone());
            match assigned {
                Some(team) => Some(team),
                None => {
                    let _ = request.reply.send(Err(SessionError::PlayerUnauthorized));
                    return;
                }
            }
        };
        if let Some(team) = &team {
            self.open_teams.retain(|t| t != team);
        }
        self.roster.insert(key, team.clone());
        debug!("player {} joined as {:?}", session.player_id, team);
        let _ = request.reply.send(Ok(()));

        self.send_network_ack(&session);
        let snapshot = self.safe_snapshot(team.as_ref());
        self.send_or_evict(&session, OutboundMessage::Game(snapshot));
        self.broadcast_connected();
    }

    fn handle_leave(&mut self, session: Arc<PlayerSession>) {
        let key = PtrKey::new(session.clone());
        if let Some(team) = self.roster.remove(&key) {
            if let Some(team) = team {
                self.open_teams.push(team);
            }
            self.broadcast_connected();
        }
    }

    fn handle_process(&mut self, message: ClientMessage) {
        let ClientMessage { session, message } = message;
        self.updated_at = Instant::now();
        let result = match message.action_type.as_str() {
            server_action::SET_TEAM => self.set_team(&session, message.more_details),
            server_action::SET_OPEN_TEAM => self.set_open_team(&session),
            server_action::RESET => self.reset(message.more_details),
            server_action::UNDO => self.undo(),
            server_action::RESIGN => self.resign(),
            server_action::CHAT => self.chat(&session, message.more_details),
            other => self.engine_action(&session, other, message.team, message.more_details),
        };
        if let Err(err) = result {
            self.reply_error(&session, err);
        }
    }

    /// §4.4.1: `SetTeam`/`SetOpenTeam`/`Undo`/`Reset` only make sense when
    /// anyone may self-assign a team; roster-mode instances bind teams at
    /// join time instead and reject these.
    fn open_lobby(&self) -> bool {
        self.networking.players.is_empty()
    }

    fn set_team(&mut self, session: &Arc<PlayerSession>, details: serde_json::Value) -> Result<(), SessionError> {
        if !self.open_lobby() {
            return Err(SessionError::ActionNotAllowed);
        }
        let details: SetTeamDetails =
            serde_json::from_value(details).map_err(|e| SessionError::MalformedAction(e.to_string()))?;
        let teams = self.last_good_snapshot.as_ref().map(|s| s.teams.clone()).unwrap_or_default();
        if !teams.contains(&details.team) {
            return Err(SessionError::TeamNotOpen(details.team));
        }
        if !self.open_teams.contains(&details.team) {
            return Err(SessionError::TeamNotOpen(details.team));
        }
        let team = details.team;
        self.assign_team(session, Some(team.clone()))?;
        let snapshot = self.safe_snapshot(Some(&team));
        self.send_or_evict(session, OutboundMessage::Game(snapshot));
        self.broadcast_connected();
        Ok(())
    }

    fn set_open_team(&mut self, session: &Arc<PlayerSession>) -> Result<(), SessionError> {
        if !self.open_lobby() {
            return Err(SessionError::ActionNotAllowed);
        }
        if self.open_teams.is_empty() {
            return Err(SessionError::NoOpenTeam);
        }
        let team = self.open_teams.remove(0);
        self.assign_team(session, Some(team.clone()))?;
        let snapshot = self.safe_snapshot(Some(&team));
        self.send_or_evict(session, OutboundMessage::Game(snapshot));
        self.broadcast_connected();
        Ok(())
    }

    /// §9 "Resign": reserved. A no-op in roster mode (the game continues
    /// unaffected); rejected outright in an open lobby, where there is no
    /// fixed seat to resign from.
    fn resign(&mut self) -> Result<(), SessionError> {
        if self.open_lobby() {
            return Err(SessionError::ActionNotAllowed);
        }
        Ok(())
    }

    /// Shared assignment logic for `SetTeam`/`SetOpenTeam` (re-assigning an
    /// already-joined, open-lobby session). Returns the player's previous
    /// team, if any, which has already been returned to the open pool.
    fn assign_team(&mut self, session: &Arc<PlayerSession>, team: Option<Team>) -> Result<Option<Team>, SessionError> {
        if let Some(team) = &team {
            self.open_teams.retain(|t| t != team);
        }
        let key = PtrKey::new(session.clone());
        let previous = self.roster.insert(key, team);
        if let Some(Some(previous_team)) = &previous {
            self.open_teams.push(previous_team.clone());
        }
        Ok(previous.flatten())
    }

    fn reset(&mut self, details: serde_json::Value) -> Result<(), SessionError> {
        if !self.open_lobby() {
            return Err(SessionError::ActionNotAllowed);
        }
        let details: ResetDetails = if details.is_null() {
            ResetDetails::default()
        } else {
            serde_json::from_value(details).map_err(|e| SessionError::MalformedAction(e.to_string()))?
        };
        let seed = details.seed.filter(|&s| s != 0).unwrap_or_else(wall_clock_seed);
        let fresh = match &mut self.rebuild_source {
            RebuildSource::Engine(options) => {
                options.seed = Some(seed);
                if let Some(variant) = details.variant.clone() {
                    options.variant = Some(variant);
                }
                (self.factory.create)(options).map_err(SessionError::Engine)?
            }
            RebuildSource::Notation(notation) => {
                let load = self.factory.load.as_ref().ok_or(SessionError::BgnUnsupported)?;
                notation.tags.insert("Seed".to_owned(), seed.to_string());
                if let Some(variant) = details.variant.clone() {
                    notation.tags.insert("Variant".to_owned(), variant);
                }
                notation.actions.clear();
                load(notation).map_err(SessionError::Engine)?
            }
        };
        self.engine = fresh;
        self.open_teams = self.safe_snapshot(None).teams;
        self.timer.stop();
        self.after_action();
        Ok(())
    }

    fn undo(&mut self) -> Result<(), SessionError> {
        if !self.open_lobby() {
            return Err(SessionError::ActionNotAllowed);
        }
        let history = self.safe_snapshot(None).actions;
        if history.is_empty() {
            return Err(SessionError::Engine(EngineError::IllegalAction(
                "no actions to undo".into(),
            )));
        }
        let replay = &history[..history.len() - 1];
        let mut fresh = match &self.rebuild_source {
            RebuildSource::Engine(options) => (self.factory.create)(options).map_err(SessionError::Engine)?,
            RebuildSource::Notation(notation) => {
                let load = self.factory.load.as_ref().ok_or(SessionError::BgnUnsupported)?;
                load(notation).map_err(SessionError::Engine)?
            }
        };
        for action in replay {
            fresh.apply(action).map_err(SessionError::Engine)?;
        }
        // Only commit once the full replay has succeeded; a mid-replay
        // failure leaves `self.engine` exactly as it was.
        self.engine = fresh;
        self.after_action();
        Ok(())
    }

    fn chat(&mut self, session: &Arc<PlayerSession>, details: serde_json::Value) -> Result<(), SessionError> {
        if self.chat_history.len() >= CHAT_CAP {
            return Err(SessionError::ChatFull);
        }
        let details: ChatDetails =
            serde_json::from_value(details).map_err(|e| SessionError::MalformedAction(e.to_string()))?;
        self.chat_history.push((session.player_name.clone(), details.msg.clone()));
        self.broadcast(OutboundMessage::Chat(crate::protocol::ChatMessage {
            name: session.player_name.clone(),
            msg: details.msg,
        }));
        Ok(())
    }

    fn engine_action(
        &mut self,
        session: &Arc<PlayerSession>,
        action_type: &str,
        claimed_team: Option<Team>,
        more_details: serde_json::Value,
    ) -> Result<(), SessionError> {
        let key = PtrKey::new(session.clone());
        let team = self
            .roster
            .get(&key)
            .cloned()
            .flatten()
            .ok_or(SessionError::WrongTeamAction)?;
        if !self.open_lobby() {
            if let Some(claimed_team) = &claimed_team {
                if claimed_team != &team {
                    return Err(SessionError::WrongTeamAction);
                }
            }
        }
        let action = Action::new(action_type, Some(team), more_details);
        self.safe_apply(&action).map_err(SessionError::Engine)?;
        self.after_action();
        Ok(())
    }

    fn handle_alarm(&mut self, alarm: Alarm) {
        if !self.timer.is_current(alarm.generation) {
            return;
        }
        let starting = self.safe_snapshot(None);
        if starting.is_finished() {
            return;
        }
        let starting_turn = starting.turn.clone();
        loop {
            let snapshot = self.safe_snapshot(None);
            if !snapshot.winners.is_empty() || snapshot.turn != starting_turn {
                break;
            }
            let Some(candidates) = snapshot.targets_as_actions() else {
                break;
            };
            if candidates.is_empty() {
                break;
            }
            let choice = candidates[rand::thread_rng().gen_range(0..candidates.len())].clone();
            if self.safe_apply(&choice).is_err() {
                break;
            }
        }
        self.after_action();
    }

    /// Common bookkeeping after any successful mutation: refresh the cached
    /// snapshot, fire `on_game_end` exactly once on the finish transition,
    /// (re)start or stop the turn timer, and broadcast the new state.
    fn after_action(&mut self) {
        let was_finished = self
            .last_good_snapshot
            .as_ref()
            .map(|s| s.is_finished())
            .unwrap_or(false);
        let snapshot = self.safe_snapshot(None);
        let turn_changed = self.last_good_snapshot.as_ref().map(|s| s.turn != snapshot.turn).unwrap_or(true);
        self.last_good_snapshot = Some(snapshot.clone());

        if snapshot.is_finished() {
            if !was_finished {
                self.play_count += 1;
                self.timer.stop();
                self.adapter.on_game_end(&snapshot, &self.networking);
            }
        } else if turn_changed {
            if let Some(turn_length) = self.networking.turn_length {
                self.timer.start(turn_length);
            }
        }
        self.broadcast_game();
    }

    fn handle_control(&mut self, request: ControlRequest) -> bool {
        match request {
            ControlRequest::GetSnapshot { team, reply } => {
                let _ = reply.send(self.safe_snapshot(team.as_ref()));
                false
            }
            ControlRequest::GetNotation { reply } => {
                let result = match self.engine.as_notation_capable() {
                    Some(capable) => Ok(capable.notation()),
                    None => Err(SessionError::BgnUnsupported),
                };
                let _ = reply.send(result);
                false
            }
            ControlRequest::Stop { reply } => {
                let snapshot = self.safe_snapshot(None);
                let notation = self.engine.as_notation_capable().map(|c| c.notation());
                let _ = reply.send(FinalState { snapshot, notation });
                true
            }
            ControlRequest::Meta { reply } => {
                let action_count = self.last_good_snapshot.as_ref().map(|s| s.actions.len()).unwrap_or(0);
                let _ = reply.send(GameMeta {
                    created_at: self.created_at,
                    updated_at: self.updated_at,
                    play_count: self.play_count,
                    action_count,
                    player_count: self.roster.len(),
                });
                false
            }
        }
    }

    fn broadcast_game(&mut self) {
        let roster: Vec<(Arc<PlayerSession>, Option<Team>)> = self
            .roster
            .iter()
            .map(|(k, v)| (k.0.clone(), v.clone()))
            .collect();
        for (session, team) in roster {
            let snapshot = self.safe_snapshot(team.as_ref());
            self.send_or_evict(&session, OutboundMessage::Game(snapshot));
        }
    }

    fn broadcast(&mut self, message: OutboundMessage) {
        let roster: Vec<Arc<PlayerSession>> = self.roster.keys().map(|k| k.0.clone()).collect();
        for session in roster {
            self.send_or_evict(&session, message.clone());
        }
    }

    fn broadcast_connected(&mut self) {
        let connected: HashMap<board_game::PlayerName, Option<Team>> = self
            .roster
            .iter()
            .map(|(k, v)| (k.0.player_name.clone(), v.clone()))
            .collect();
        self.broadcast(OutboundMessage::Connected(connected));
    }

    fn send_network_ack(&mut self, session: &Arc<PlayerSession>) {
        let update = NetworkUpdate {
            game_kind: self.networking.game_kind.clone(),
            game_id: self.networking.game_id.clone(),
            players: self.networking.players.clone(),
            single_device: self.networking.single_device,
            name: session.player_name.clone(),
            turn_time_left: self.networking.turn_length.map(|_| self.timer.remaining()),
        };
        self.send_or_evict(session, OutboundMessage::Network(update));
    }

    fn send_or_evict(&mut self, session: &Arc<PlayerSession>, message: OutboundMessage) {
        if session.try_send(message).is_err() {
            warn!("evicting slow consumer {}", session.player_id);
            session.close();
            let key = PtrKey::new(session.clone());
            if let Some(Some(team)) = self.roster.remove(&key) {
                self.open_teams.push(team);
            }
        }
    }

    fn reply_error(&mut self, session: &Arc<PlayerSession>, err: SessionError) {
        self.send_or_evict(session, OutboundMessage::Error(err.to_string()));
    }

    /// Marks this instance degraded and, the first time this fires, tells
    /// the owning hub to clean it up (§4.4.3) rather than leaving it to
    /// linger until the next once-a-minute expiry sweep.
    fn enter_degraded(&self) {
        if !self.degraded.replace(true) {
            let _ = self.cleanup_tx.send(self.networking.game_id.clone());
        }
    }

    fn safe_apply(&mut self, action: &Action) -> Result<(), EngineError> {
        let engine = &mut self.engine;
        match std::panic::catch_unwind(AssertUnwindSafe(|| engine.apply(action))) {
            Ok(result) => result,
            Err(_) => {
                error!("engine panicked applying an action; entering degraded mode");
                self.enter_degraded();
                Err(EngineError::IllegalAction("engine panicked".into()))
            }
        }
    }

    fn safe_snapshot(&self, team: Option<&Team>) -> Snapshot {
        match std::panic::catch_unwind(AssertUnwindSafe(|| self.engine.snapshot(team))) {
            Ok(snapshot) => snapshot,
            Err(_) => {
                error!("engine panicked producing a snapshot; entering degraded mode");
                self.enter_degraded();
                self.last_good_snapshot.clone().unwrap_or(Snapshot {
                    teams: Vec::new(),
                    turn: None,
                    actions: Vec::new(),
                    targets: serde_json::Value::Null,
                    winners: Vec::new(),
                })
            }
        }
    }
}

fn wall_clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::adapter::NoopAdapter;
    use crate::options::NetworkingCreateGameOptions;
    use crate::player_session::PlayerSession;
    use crate::protocol::InboundMessage;
    use crate::transport::{InboundFrame, TransportError, TransportReader, TransportWriter};
    use async_trait::async_trait;
    use board_game::mock::{NimBuilder, NimGame};
    use board_game::{BoardGameBuilder, GameId, GameKind, PlayerId, PlayerName};
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    struct EmptyReader;

    #[async_trait]
    impl TransportReader for EmptyReader {
        async fn recv(&mut self) -> Option<Result<InboundFrame, TransportError>> {
            std::future::pending().await
        }
    }

    #[derive(Default, Clone)]
    struct CapturingWriter {
        sent: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl TransportWriter for CapturingWriter {
        async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(text);
            Ok(())
        }
        async fn send_ping(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
        async fn send_close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    async fn spawn_session(id: &str, name: &str) -> (Arc<PlayerSession>, Arc<StdMutex<Vec<String>>>) {
        let writer = CapturingWriter::default();
        let sent = writer.sent.clone();
        let (process_tx, _process_rx) = mpsc::unbounded_channel();
        let (leave_tx, _leave_rx) = mpsc::unbounded_channel();
        let session = PlayerSession::spawn(
            PlayerId(id.to_owned()),
            PlayerName(name.to_owned()),
            Box::new(EmptyReader),
            Box::new(writer),
            process_tx,
            leave_tx,
        )
        .await;
        (session, sent)
    }

    fn nim_factory() -> EngineFactory<NimGame> {
        let create_builder = Arc::new(NimBuilder);
        let load_builder = create_builder.clone();
        EngineFactory {
            create: Arc::new(move |options| create_builder.create(options)),
            load: Some(Arc::new(move |notation| load_builder.load(notation))),
        }
    }

    fn nim_options() -> EngineOptions {
        EngineOptions::new(vec![Team::from("a"), Team::from("b")])
    }

    fn networking(players: HashMap<Team, Vec<PlayerId>>, turn_length: Option<std::time::Duration>) -> NetworkingCreateGameOptions {
        NetworkingCreateGameOptions {
            game_kind: GameKind::new("nim"),
            game_id: GameId("g1".to_owned()),
            players,
            turn_length,
            single_device: false,
        }
    }

    fn spawn_nim(networking_opts: NetworkingCreateGameOptions) -> GameServerHandle {
        let factory = nim_factory();
        let options = nim_options();
        let engine = (factory.create)(&options).unwrap();
        let (cleanup_tx, _cleanup_rx) = mpsc::unbounded_channel();
        spawn(
            engine,
            factory,
            RebuildSource::Engine(options),
            networking_opts,
            Arc::new(NoopAdapter),
            cleanup_tx,
        )
    }

    fn inbound(action_type: &str, more_details: serde_json::Value) -> InboundMessage {
        InboundMessage {
            action_type: action_type.to_owned(),
            team: None,
            more_details,
        }
    }

    async fn settle() {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn set_team_broadcasts_connected_to_every_session() {
        let handle = spawn_nim(networking(HashMap::new(), None));
        let (alice, _alice_sent) = spawn_session("alice", "Alice").await;
        let (bob, bob_sent) = spawn_session("bob", "Bob").await;
        handle.join(alice.clone()).await.unwrap();
        handle.join(bob.clone()).await.unwrap();

        handle
            .process_sender()
            .send(ClientMessage {
                session: alice.clone(),
                message: inbound(server_action::SET_TEAM, json!({"Team": "a"})),
            })
            .unwrap();
        settle().await;

        let saw_connected_with_a = bob_sent
            .lock()
            .unwrap()
            .iter()
            .any(|m| m.contains("\"Connected\"") && m.contains("\"a\""));
        assert!(saw_connected_with_a);
    }

    #[tokio::test]
    async fn engine_action_broadcasts_updated_snapshot() {
        let handle = spawn_nim(networking(HashMap::new(), Some(std::time::Duration::from_secs(30))));
        let (alice, alice_sent) = spawn_session("alice", "Alice").await;
        handle.join(alice.clone()).await.unwrap();
        handle
            .process_sender()
            .send(ClientMessage {
                session: alice.clone(),
                message: inbound(server_action::SET_TEAM, json!({"Team": "a"})),
            })
            .unwrap();
        settle().await;

        handle
            .process_sender()
            .send(ClientMessage {
                session: alice.clone(),
                message: inbound("take", json!({"count": 2})),
            })
            .unwrap();
        settle().await;

        let saw_updated_game = alice_sent.lock().unwrap().iter().any(|m| m.contains("\"Game\""));
        assert!(saw_updated_game);
        let snapshot = handle.get_snapshot(None).await.unwrap();
        assert_eq!(snapshot.actions.len(), 1);
    }

    #[tokio::test]
    async fn chat_is_capped_at_250_and_errors_the_sender_past_it() {
        let handle = spawn_nim(networking(HashMap::new(), None));
        let (alice, alice_sent) = spawn_session("alice", "Alice").await;
        handle.join(alice.clone()).await.unwrap();

        for _ in 0..251 {
            handle
                .process_sender()
                .send(ClientMessage {
                    session: alice.clone(),
                    message: inbound(server_action::CHAT, json!({"Msg": "hi"})),
                })
                .unwrap();
        }
        settle().await;

        let messages = alice_sent.lock().unwrap();
        let chat_count = messages.iter().filter(|m| m.contains("\"Chat\"")).count();
        let error_count = messages.iter().filter(|m| m.contains("chat history is full")).count();
        assert_eq!(chat_count, 250);
        assert_eq!(error_count, 1);
    }

    #[tokio::test]
    async fn undo_rebuilds_the_engine_and_replays_all_but_the_last_action() {
        let handle = spawn_nim(networking(HashMap::new(), None));
        let (alice, _) = spawn_session("alice", "Alice").await;
        let (bob, _) = spawn_session("bob", "Bob").await;
        handle.join(alice.clone()).await.unwrap();
        handle.join(bob.clone()).await.unwrap();
        handle
            .process_sender()
            .send(ClientMessage {
                session: alice.clone(),
                message: inbound(server_action::SET_TEAM, json!({"Team": "a"})),
            })
            .unwrap();
        handle
            .process_sender()
            .send(ClientMessage {
                session: bob.clone(),
                message: inbound(server_action::SET_TEAM, json!({"Team": "b"})),
            })
            .unwrap();
        settle().await;

        handle
            .process_sender()
            .send(ClientMessage {
                session: alice.clone(),
                message: inbound("take", json!({"count": 2})),
            })
            .unwrap();
        settle().await;
        handle
            .process_sender()
            .send(ClientMessage {
                session: bob.clone(),
                message: inbound("take", json!({"count": 1})),
            })
            .unwrap();
        settle().await;

        handle
            .process_sender()
            .send(ClientMessage {
                session: alice.clone(),
                message: inbound(server_action::UNDO, serde_json::Value::Null),
            })
            .unwrap();
        settle().await;

        let snapshot = handle.get_snapshot(None).await.unwrap();
        assert_eq!(snapshot.actions.len(), 1);
        assert_eq!(snapshot.turn, Some(Team::from("b")));
    }

    #[tokio::test(start_paused = true)]
    async fn alarm_autoplays_when_nobody_acts_before_the_clock() {
        let players: HashMap<Team, Vec<PlayerId>> = [
            (Team::from("a"), vec![PlayerId("alice".to_owned())]),
            (Team::from("b"), vec![PlayerId("bob".to_owned())]),
        ]
        .into_iter()
        .collect();
        let handle = spawn_nim(networking(players, Some(std::time::Duration::from_millis(100))));
        let (alice, _) = spawn_session("alice", "Alice").await;
        handle.join(alice.clone()).await.unwrap();

        let before = handle.get_snapshot(None).await.unwrap();
        tokio::time::advance(std::time::Duration::from_millis(150)).await;
        settle().await;
        let after = handle.get_snapshot(None).await.unwrap();

        assert_ne!(before.turn, None);
        assert_eq!(after.actions.len(), 1);
    }

    #[tokio::test]
    async fn roster_mode_rejects_lobby_only_actions() {
        let players: HashMap<Team, Vec<PlayerId>> = [(Team::from("a"), vec![PlayerId("alice".to_owned())])]
            .into_iter()
            .collect();
        let handle = spawn_nim(networking(players, None));
        let (alice, alice_sent) = spawn_session("alice", "Alice").await;
        handle.join(alice.clone()).await.unwrap();

        handle
            .process_sender()
            .send(ClientMessage {
                session: alice.clone(),
                message: inbound(server_action::SET_TEAM, json!({"Team": "b"})),
            })
            .unwrap();
        settle().await;

        let saw_rejection = alice_sent
            .lock()
            .unwrap()
            .iter()
            .any(|m| m.contains("not allowed in the current mode"));
        assert!(saw_rejection);
    }

    #[tokio::test]
    async fn join_rejects_unknown_player_and_duplicate_join() {
        let players: HashMap<Team, Vec<PlayerId>> = [(Team::from("a"), vec![PlayerId("alice".to_owned())])]
            .into_iter()
            .collect();
        let handle = spawn_nim(networking(players, None));
        let (alice, _) = spawn_session("alice", "Alice").await;
        let (mallory, _) = spawn_session("mallory", "Mallory").await;

        assert!(handle.join(alice.clone()).await.is_ok());
        assert!(matches!(
            handle.join(alice.clone()).await,
            Err(SessionError::PlayerAlreadyConnected)
        ));
        assert!(matches!(
            handle.join(mallory.clone()).await,
            Err(SessionError::PlayerUnauthorized)
        ));
    }
}
