//! A thin axum binary proving the `game_session`/`board_game` core is wired
//! correctly end to end. Not part of the tested core surface (§6) — just
//! the router, CLI, and logger setup a real deployment's collaborators
//! would supply.

mod routes;
mod transport;

use axum::routing::{get, post};
use axum::Router;
use board_game::mock::NimBuilder;
use board_game::{BoardGameBuilder, BoardGameWithNotationBuilder, GameKind};
use game_session::{Adapter, Hub, InMemoryGameStore, Network, NoopAdapter};
use log::{info, LevelFilter};
use routes::SharedNetwork;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use structopt::StructOpt;
use tower_http::cors::CorsLayer;

/// Demo server options, to be specified as arguments.
#[derive(Debug, StructOpt)]
struct Options {
    /// Port to listen on.
    #[structopt(long, default_value = "8080")]
    port: u16,
    /// Idle duration after which an instance is swept and persisted.
    #[structopt(long, default_value = "3600")]
    expiry_secs: u64,
    /// Log level for `game_session`/`board_game`.
    #[cfg_attr(debug_assertions, structopt(long, default_value = "debug"))]
    #[cfg_attr(not(debug_assertions), structopt(long, default_value = "info"))]
    debug_game: LevelFilter,
    /// Log level for everything else (axum, tower, hyper).
    #[structopt(long, default_value = "warn")]
    debug_http: LevelFilter,
    /// Grace period given to in-flight games to persist on shutdown before
    /// the process is terminated abruptly.
    #[structopt(long, default_value = "5000")]
    shutdown_deadline_ms: u64,
}

fn build_network(expiry: Duration) -> SharedNetwork {
    let store = Arc::new(InMemoryGameStore::new());
    let adapters: Vec<Arc<dyn Adapter>> = vec![Arc::new(NoopAdapter)];

    let nim_builder = Arc::new(NimBuilder);
    let create_builder = nim_builder.clone();
    let load_builder = nim_builder;
    let factory: game_session::EngineFactory<board_game::mock::NimGame> = game_session::EngineFactory {
        create: Arc::new(move |options| create_builder.create(options)),
        load: Some(Arc::new(move |notation| load_builder.load(notation))),
    };
    let nim_hub = Hub::spawn(GameKind::new("nim"), factory, adapters, Some(store.clone()), expiry);

    Arc::new(Network::new(vec![nim_hub], Some(store)))
}

#[tokio::main]
async fn main() {
    let options = Options::from_args();

    let levels = server_util::log::LogLevels {
        default: options.debug_http,
        game_session: Some(options.debug_game),
        board_game: Some(options.debug_game),
    };
    server_util::log::init_logger(&levels);

    let network = build_network(Duration::from_secs(options.expiry_secs));
    let shutdown_network = network.clone();
    let shutdown_deadline = Duration::from_millis(options.shutdown_deadline_ms);

    let app = Router::new()
        .route("/game/:kind/:id/create", post(routes::create_game))
        .route("/game/:kind/:id/join", get(routes::join_game))
        .route("/game/:kind/:id/bgn", get(routes::get_bgn))
        .route("/game/stats", get(routes::get_stats))
        .route("/health", get(routes::health))
        .layer(CorsLayer::permissive())
        .with_state(network);

    let addr = SocketAddr::from(([0, 0, 0, 0], options.port));
    info!("session_demo listening on {addr}");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
        .expect("server failed");

    // §5 "Cancellation and timeouts": the watchdog gives every hub
    // `shutdown_deadline` to persist in-flight games, then escalates to an
    // abrupt exit rather than hang on a wedged game engine.
    match server_util::watch(shutdown_deadline, "network close", shutdown_network.close(shutdown_deadline)).await {
        server_util::WatchdogOutcome::Completed(Ok(())) => info!("all games persisted cleanly"),
        server_util::WatchdogOutcome::Completed(Err(err)) => {
            log::warn!("some hubs failed to close cleanly: {err}")
        }
        server_util::WatchdogOutcome::TimedOut => server_util::escalate("network shutdown"),
    }
}

async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, draining games");
}
