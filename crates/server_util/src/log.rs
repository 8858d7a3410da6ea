use log::LevelFilter;

/// Per-module log level overrides, set the way a deployment's top-level
/// binary would configure them (see `demos/session_demo`). The core crates
/// never call this themselves; they only ever log through the `log` facade.
#[derive(Debug, Clone)]
pub struct LogLevels {
    pub default: LevelFilter,
    pub game_session: Option<LevelFilter>,
    pub board_game: Option<LevelFilter>,
}

impl Default for LogLevels {
    fn default() -> Self {
        Self {
            default: LevelFilter::Info,
            game_session: None,
            board_game: None,
        }
    }
}

/// Initializes `env_logger` with module filters layered on top of `default`.
pub fn init_logger(levels: &LogLevels) {
    let mut builder = env_logger::builder();
    builder.filter_level(levels.default);
    if let Some(level) = levels.game_session {
        builder.filter_module("game_session", level);
    }
    if let Some(level) = levels.board_game {
        builder.filter_module("board_game", level);
    }
    let _ = builder.try_init();
}
