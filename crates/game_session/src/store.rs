use crate::error::StoreError;
use async_trait::async_trait;
use board_game::{GameId, GameKind, Notation};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A durable record of one game instance, as handed to and read back from a
/// [`GameStore`].
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub game_kind: GameKind,
    pub game_id: GameId,
    pub notation: Notation,
    pub created_at: Instant,
    pub updated_at: Instant,
    pub play_count: u64,
}

/// §6 `Store.GetStats`'s return shape: per-kind counts, keyed the same way
/// as [`crate::network::NetworkStats`] but sourced from durable history
/// rather than in-memory instances.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub games_created: HashMap<GameKind, u64>,
    pub games_played: HashMap<GameKind, u64>,
}

/// Durable persistence for completed or expired game instances. An instance
/// whose engine isn't [`board_game::NotationCapable`] never reaches a store;
/// the hub treats that case as "nothing to persist", not an error.
#[async_trait]
pub trait GameStore: Send + Sync + 'static {
    async fn get_game(&self, kind: &GameKind, id: &GameId) -> Result<Option<StoredRecord>, StoreError>;
    async fn get_stats(&self, kinds: &[GameKind]) -> Result<StoreStats, StoreError>;
    async fn store(&self, record: StoredRecord) -> Result<(), StoreError>;
    async fn close(&self, deadline: Duration) -> Result<(), StoreError>;
}

/// A `GameStore` backed by an in-process map, for tests and deployments with
/// no durable backing store. Keyed by `(kind, id)`; games played/completed
/// counts are tracked approximately by `play_count`.
#[derive(Default)]
pub struct InMemoryGameStore {
    records: Mutex<HashMap<(GameKind, GameId), StoredRecord>>,
}

impl InMemoryGameStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GameStore for InMemoryGameStore {
    async fn get_game(&self, kind: &GameKind, id: &GameId) -> Result<Option<StoredRecord>, StoreError> {
        let records = self.records.lock().unwrap();
        Ok(records.get(&(kind.clone(), id.clone())).cloned())
    }

    async fn get_stats(&self, kinds: &[GameKind]) -> Result<StoreStats, StoreError> {
        let records = self.records.lock().unwrap();
        let mut stats = StoreStats::default();
        for ((kind, _), record) in records.iter() {
            if kinds.is_empty() || kinds.contains(kind) {
                *stats.games_created.entry(kind.clone()).or_default() += 1;
                if record.play_count > 0 {
                    *stats.games_played.entry(kind.clone()).or_default() += 1;
                }
            }
        }
        Ok(stats)
    }

    async fn store(&self, record: StoredRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        records.insert((record.game_kind.clone(), record.game_id.clone()), record);
        Ok(())
    }

    async fn close(&self, _deadline: Duration) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use board_game::Notation;

    fn record(id: &str) -> StoredRecord {
        StoredRecord {
            game_kind: GameKind::new("nim"),
            game_id: GameId(id.to_owned()),
            notation: Notation::default(),
            created_at: Instant::now(),
            updated_at: Instant::now(),
            play_count: 1,
        }
    }

    #[tokio::test]
    async fn stores_and_retrieves_by_kind_and_id() {
        let store = InMemoryGameStore::new();
        store.store(record("g1")).await.unwrap();
        let found = store
            .get_game(&GameKind::new("nim"), &GameId("g1".to_owned()))
            .await
            .unwrap();
        assert!(found.is_some());
        let missing = store
            .get_game(&GameKind::new("nim"), &GameId("missing".to_owned()))
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
