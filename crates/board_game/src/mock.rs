//! A minimal two-team nim-style engine (take 1-3 stones from a pile, whoever
//! takes the last stone wins), used to exercise the networking layer in
//! integration tests without depending on a real rule set.

use crate::action::Action;
use crate::engine::{BoardGame, BoardGameBuilder, BoardGameWithNotationBuilder, NotationCapable};
use crate::error::EngineError;
use crate::ids::{GameKind, Team};
use crate::notation::Notation;
use crate::options::EngineOptions;
use crate::snapshot::Snapshot;
use serde_json::json;
use std::collections::BTreeMap;

pub struct NimGame {
    teams: Vec<Team>,
    pile: u32,
    turn: usize,
    history: Vec<Action>,
    winners: Vec<Team>,
}

impl NimGame {
    fn new(teams: Vec<Team>, pile: u32) -> Self {
        Self {
            teams,
            pile,
            turn: 0,
            history: Vec::new(),
            winners: Vec::new(),
        }
    }

    fn replay(teams: Vec<Team>, pile: u32, actions: &[Action]) -> Result<Self, EngineError> {
        let mut game = Self::new(teams, pile);
        for action in actions {
            game.apply(action)?;
        }
        Ok(game)
    }
}

impl BoardGame for NimGame {
    fn apply(&mut self, action: &Action) -> Result<(), EngineError> {
        if !self.winners.is_empty() {
            return Err(EngineError::IllegalAction("game already finished".into()));
        }
        if action.action_type != "take" {
            return Err(EngineError::IllegalAction(format!(
                "unknown action {:?}",
                action.action_type
            )));
        }
        let expected_team = &self.teams[self.turn];
        if action.team.as_ref() != Some(expected_team) {
            return Err(EngineError::IllegalAction("not this team's turn".into()));
        }
        let count = action
            .more_details
            .get("count")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| EngineError::IllegalAction("missing count".into()))?;
        if !(1..=3).contains(&count) || count as u32 > self.pile {
            return Err(EngineError::IllegalAction(format!("cannot take {count}")));
        }
        self.pile -= count as u32;
        self.history.push(action.clone());
        if self.pile == 0 {
            self.winners = vec![expected_team.clone()];
        } else {
            self.turn = (self.turn + 1) % self.teams.len();
        }
        Ok(())
    }

    fn snapshot(&self, _team: Option<&Team>) -> Snapshot {
        let targets: Vec<Action> = if self.winners.is_empty() {
            let team = self.teams[self.turn].clone();
            (1..=self.pile.min(3))
                .map(|count| Action::new("take", Some(team.clone()), json!({ "count": count })))
                .collect()
        } else {
            Vec::new()
        };
        Snapshot {
            teams: self.teams.clone(),
            turn: self.winners.is_empty().then(|| self.teams[self.turn].clone()),
            actions: self.history.clone(),
            targets: serde_json::to_value(&targets).unwrap_or_default(),
            winners: self.winners.clone(),
        }
    }

    fn as_notation_capable(&self) -> Option<&dyn NotationCapable> {
        Some(self)
    }
}

impl NotationCapable for NimGame {
    fn notation(&self) -> Notation {
        let mut tags = BTreeMap::new();
        tags.insert("Game".to_owned(), "nim".to_owned());
        tags.insert(
            "Teams".to_owned(),
            self.teams
                .iter()
                .map(|t| t.0.clone())
                .collect::<Vec<_>>()
                .join(", "),
        );
        tags.insert("Pile".to_owned(), (self.pile + pile_taken(&self.history)).to_string());
        Notation::new(tags, self.history.clone())
    }
}

fn pile_taken(history: &[Action]) -> u32 {
    history
        .iter()
        .filter_map(|a| a.more_details.get("count").and_then(|v| v.as_u64()))
        .map(|c| c as u32)
        .sum()
}

pub struct NimBuilder;

impl BoardGameBuilder for NimBuilder {
    type Engine = NimGame;

    fn key(&self) -> GameKind {
        GameKind::new("nim")
    }

    fn create(&self, options: &EngineOptions) -> Result<Self::Engine, EngineError> {
        if options.teams.len() < 2 {
            return Err(EngineError::InvalidOptions(
                "nim requires at least 2 teams".into(),
            ));
        }
        let pile = options
            .extra
            .get("pile")
            .and_then(|v| v.as_u64())
            .unwrap_or(13) as u32;
        Ok(NimGame::new(options.teams.clone(), pile))
    }
}

impl BoardGameWithNotationBuilder for NimBuilder {
    fn load(&self, notation: &Notation) -> Result<Self::Engine, EngineError> {
        let teams = notation.teams();
        if teams.is_empty() {
            return Err(EngineError::InvalidNotation("missing Teams tag".into()));
        }
        let pile = notation
            .tags
            .get("Pile")
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| EngineError::InvalidNotation("missing Pile tag".into()))?;
        NimGame::replay(teams, pile, &notation.actions)
            .map_err(|e| EngineError::InvalidNotation(e.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn options() -> EngineOptions {
        EngineOptions::new(vec![Team::from("a"), Team::from("b")])
    }

    #[test]
    fn plays_to_a_winner() {
        let builder = NimBuilder;
        let mut game = builder.create(&options()).unwrap();
        game.apply(&Action::new("take", Some(Team::from("a")), json!({"count": 3})))
            .unwrap();
        game.apply(&Action::new("take", Some(Team::from("b")), json!({"count": 3})))
            .unwrap();
        game.apply(&Action::new("take", Some(Team::from("a")), json!({"count": 3})))
            .unwrap();
        game.apply(&Action::new("take", Some(Team::from("b")), json!({"count": 3})))
            .unwrap();
        game.apply(&Action::new("take", Some(Team::from("a")), json!({"count": 1})))
            .unwrap();
        let snapshot = game.snapshot(None);
        assert_eq!(snapshot.winners, vec![Team::from("a")]);
    }

    #[test]
    fn rejects_out_of_turn_action() {
        let builder = NimBuilder;
        let mut game = builder.create(&options()).unwrap();
        let err = game
            .apply(&Action::new("take", Some(Team::from("b")), json!({"count": 1})))
            .unwrap_err();
        assert!(matches!(err, EngineError::IllegalAction(_)));
    }

    #[test]
    fn notation_round_trips_through_load() {
        let builder = NimBuilder;
        let mut game = builder.create(&options()).unwrap();
        game.apply(&Action::new("take", Some(Team::from("a")), json!({"count": 2})))
            .unwrap();
        let notation = game.notation();
        let reloaded = builder.load(&notation).unwrap();
        assert_eq!(reloaded.snapshot(None).turn, game.snapshot(None).turn);
    }
}
