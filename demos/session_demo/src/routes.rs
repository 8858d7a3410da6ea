//! HTTP surface for the demo binary, mirroring the original `/game/create`,
//! `/game/join`, `/game/bgn`, `/game/stats` route names (the core crates
//! name no routes at all — see §6).

use crate::transport::{AxumReader, AxumWriter};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use board_game::{EngineOptions, GameId, GameKind, PlayerId, PlayerName, Team};
use futures::StreamExt;
use game_session::{
    CreateGameOptions, CreateGameSource, Network, NetworkingCreateGameOptions, PlayerSession,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub type SharedNetwork = Arc<Network>;

#[derive(Deserialize)]
pub struct CreateGameRequest {
    pub teams: Vec<String>,
    #[serde(default)]
    pub players: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub turn_length_secs: Option<u64>,
    #[serde(default)]
    pub single_device: bool,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub seed: Option<u64>,
}

pub async fn create_game(
    State(network): State<SharedNetwork>,
    Path((kind, id)): Path<(String, String)>,
    Json(request): Json<CreateGameRequest>,
) -> Response {
    let mut engine_options = EngineOptions::new(request.teams.iter().map(|t| Team::from(t.as_str())).collect());
    engine_options.variant = request.variant;
    engine_options.seed = request.seed;

    let players = request
        .players
        .into_iter()
        .map(|(team, ids)| (Team::from(team.as_str()), ids.into_iter().map(PlayerId).collect()))
        .collect();

    let options = CreateGameOptions {
        networking: NetworkingCreateGameOptions {
            game_kind: GameKind::new(kind),
            game_id: GameId(id),
            players,
            turn_length: request.turn_length_secs.map(Duration::from_secs),
            single_device: request.single_device,
        },
        source: CreateGameSource::Engine(engine_options),
    };

    match network.create_game(options).await {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(err) => (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
    }
}

#[derive(Deserialize)]
pub struct JoinQuery {
    pub player_id: String,
    pub name: String,
}

pub async fn join_game(
    State(network): State<SharedNetwork>,
    Path((kind, id)): Path<(String, String)>,
    Query(query): Query<JoinQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let game_kind = GameKind::new(kind);
    let game_id = GameId(id);

    // Resolved once here, before the session is built, so the reader task
    // we're about to spawn forwards frames straight into this instance's
    // own event loop rather than a channel pair nobody is listening on.
    let handle = match network.resolve(&game_kind, &game_id).await {
        Ok(handle) => handle,
        Err(err) => return (StatusCode::NOT_FOUND, err.to_string()).into_response(),
    };

    ws.on_upgrade(move |socket| async move {
        let (write, read) = socket.split();
        let session = PlayerSession::spawn(
            PlayerId(query.player_id),
            PlayerName(query.name),
            Box::new(AxumReader(read)),
            Box::new(AxumWriter(write)),
            handle.process_sender(),
            handle.leave_sender(),
        )
        .await;

        if handle.join(session.clone()).await.is_err() {
            session.close();
        }
    })
}

pub async fn get_bgn(State(network): State<SharedNetwork>, Path((kind, id)): Path<(String, String)>) -> Response {
    match network.get_notation(&GameKind::new(kind), &GameId(id)).await {
        Ok(notation) => notation.render().into_response(),
        Err(err) => (StatusCode::NOT_FOUND, err.to_string()).into_response(),
    }
}

#[derive(Serialize)]
pub struct KindStats {
    pub kind: String,
    pub active_games: usize,
    pub active_players: usize,
}

pub async fn get_stats(State(network): State<SharedNetwork>) -> Json<Vec<KindStats>> {
    let stats = network.get_stats().await;
    let active_players = stats.active_players;
    let out = stats
        .active_games
        .into_iter()
        .map(|(kind, active_games)| KindStats {
            active_players: active_players.get(&kind).copied().unwrap_or(0),
            kind: kind.as_str().to_owned(),
            active_games,
        })
        .collect();
    Json(out)
}

pub async fn health() -> &'static str {
    "ok"
}
