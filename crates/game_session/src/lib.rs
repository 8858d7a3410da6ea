//! Session runtime: per-instance game servers grouped under per-kind hubs,
//! grouped under one process-wide network (§2's three-level hierarchy).

pub mod adapter;
pub mod error;
pub mod game_server;
pub mod hub;
pub mod network;
pub mod options;
pub mod player_session;
pub mod protocol;
pub mod store;
pub mod timer;
pub mod transport;

pub use adapter::{Adapter, NoopAdapter};
pub use error::{HubError, NetworkError, SessionError, StoreError};
pub use game_server::{EngineFactory, FinalState, GameMeta, GameServerHandle, RebuildSource};
pub use hub::{Hub, HubStats};
pub use network::{Network, NetworkStats};
pub use options::{CreateGameOptions, CreateGameSource, JoinGameOptions, NetworkingCreateGameOptions};
pub use player_session::{ClientMessage, PlayerSession};
pub use protocol::{ChatMessage, InboundMessage, NetworkUpdate, OutboundMessage};
pub use store::{GameStore, InMemoryGameStore, StoredRecord, StoreStats};
pub use timer::{Alarm, Timer};
pub use transport::{InboundFrame, TransportError, TransportReader, TransportWriter};
