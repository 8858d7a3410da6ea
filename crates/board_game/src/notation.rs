use crate::action::Action;
use crate::ids::Team;
use std::collections::BTreeMap;
use thiserror::Error;

/// Portable text serialization of a [`crate::engine::NotationCapable`] engine's
/// full history, in the spirit of the BGN notation a complete instance is
/// reconstructed from: a header of `[Key "Value"]` tags (stable-sorted, so two
/// renders of the same state are byte-identical), followed by one JSON-encoded
/// action per line.
///
/// Well-known tags this crate reads: `Teams` (comma-separated team list),
/// `Seed`, `Variant`, `Game` (the [`crate::ids::GameKind`] that produced it).
/// Engines may add their own tags; unknown tags round-trip unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Notation {
    pub tags: BTreeMap<String, String>,
    pub actions: Vec<Action>,
}

#[derive(Debug, Error)]
pub enum NotationError {
    #[error("malformed tag header line: {0:?}")]
    MalformedTag(String),
    #[error("malformed action line {line}: {source}")]
    MalformedAction {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl Notation {
    pub fn new(tags: BTreeMap<String, String>, actions: Vec<Action>) -> Self {
        Self { tags, actions }
    }

    pub fn teams(&self) -> Vec<Team> {
        self.tags
            .get("Teams")
            .map(|s| s.split(',').map(|t| Team(t.trim().to_owned())).collect())
            .unwrap_or_default()
    }

    pub fn seed(&self) -> Option<u64> {
        self.tags.get("Seed").and_then(|s| s.parse().ok())
    }

    pub fn variant(&self) -> Option<&str> {
        self.tags.get("Variant").map(String::as_str)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.tags {
            out.push('[');
            out.push_str(key);
            out.push_str(" \"");
            out.push_str(&value.replace('\\', "\\\\").replace('"', "\\\""));
            out.push_str("\"]\n");
        }
        for action in &self.actions {
            // Actions are serde_json-encoded, so this never fails.
            out.push_str(&serde_json::to_string(action).expect("Action always serializes"));
            out.push('\n');
        }
        out
    }

    pub fn parse(text: &str) -> Result<Self, NotationError> {
        let mut tags = BTreeMap::new();
        let mut actions = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix('[') {
                let rest = rest
                    .strip_suffix(']')
                    .ok_or_else(|| NotationError::MalformedTag(line.to_owned()))?;
                let (key, quoted) = rest
                    .split_once(' ')
                    .ok_or_else(|| NotationError::MalformedTag(line.to_owned()))?;
                let value = quoted
                    .strip_prefix('"')
                    .and_then(|s| s.strip_suffix('"'))
                    .ok_or_else(|| NotationError::MalformedTag(line.to_owned()))?;
                let value = value.replace("\\\"", "\"").replace("\\\\", "\\");
                tags.insert(key.to_owned(), value);
            } else {
                let action: Action = serde_json::from_str(line)
                    .map_err(|source| NotationError::MalformedAction { line: idx, source })?;
                actions.push(action);
            }
        }
        Ok(Self { tags, actions })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_tags_and_actions() {
        let mut tags = BTreeMap::new();
        tags.insert("Game".to_owned(), "chess".to_owned());
        tags.insert("Teams".to_owned(), "white, black".to_owned());
        tags.insert("Seed".to_owned(), "42".to_owned());
        let actions = vec![
            Action::new("move", Some(Team::from("white")), json!({"from": "e2", "to": "e4"})),
            Action::new("move", Some(Team::from("black")), json!({"from": "e7", "to": "e5"})),
        ];
        let notation = Notation::new(tags, actions);
        let rendered = notation.render();
        let parsed = Notation::parse(&rendered).unwrap();
        assert_eq!(parsed, notation);
        assert_eq!(parsed.seed(), Some(42));
        assert_eq!(parsed.teams(), vec![Team::from("white"), Team::from("black")]);
    }

    #[test]
    fn escapes_quotes_in_tag_values() {
        let mut tags = BTreeMap::new();
        tags.insert("Note".to_owned(), "says \"hi\"".to_owned());
        let notation = Notation::new(tags, vec![]);
        let parsed = Notation::parse(&notation.render()).unwrap();
        assert_eq!(parsed, notation);
    }

    #[test]
    fn rejects_malformed_action_line() {
        let err = Notation::parse("[Game \"chess\"]\nnot json\n").unwrap_err();
        assert!(matches!(err, NotationError::MalformedAction { .. }));
    }
}
