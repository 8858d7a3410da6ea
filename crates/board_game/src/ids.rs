use serde::{Deserialize, Serialize};
use std::fmt;

/// The key a [`crate::engine::BoardGameBuilder`] registers under, e.g. `"chess"`.
///
/// Comparisons and hashing are case-insensitive, matching the networking layer's
/// `strings.ToLower(key)` lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameKind(String);

impl GameKind {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn normalized(&self) -> String {
        self.0.to_lowercase()
    }
}

impl PartialEq for GameKind {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}
impl Eq for GameKind {}

impl std::hash::Hash for GameKind {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.normalized().hash(state)
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GameKind {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameId(pub String);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub String);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A session's display name, distinct from [`PlayerId`]: the id gates which
/// team a roster-mode session is bound to, the name is only ever shown to
/// other players (`Connected`/`Chat` payloads). Two sessions may share a
/// name; only id collisions are meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerName(pub String);

impl fmt::Display for PlayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A team name as the engine defines it. Engines are free to use whatever
/// labels make sense for them (`"white"`/`"black"`, `"0"`/`"1"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Team(pub String);

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Team {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn game_kind_is_case_insensitive() {
        assert_eq!(GameKind::new("Chess"), GameKind::new("chess"));
        assert_eq!(GameKind::new("CHESS"), GameKind::new("chess"));
        assert_ne!(GameKind::new("chess"), GameKind::new("checkers"));
    }
}
