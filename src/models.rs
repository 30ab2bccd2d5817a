use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Display name used for the seat played by the local simulation.
pub const SIMULATED_OPPONENT: &str = "Computer";

pub const MAX_OCCUPANTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mark {
    X,
    O,
}

impl Mark {
    #[must_use]
    pub fn opponent(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }
}

impl std::fmt::Display for Mark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mark::X => f.write_str("X"),
            Mark::O => f.write_str("O"),
        }
    }
}

pub type Cell = Option<Mark>;

/// Seat assignment. An empty seat is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Players {
    #[serde(rename = "X", default, deserialize_with = "empty_as_none")]
    pub x: Option<String>,
    #[serde(rename = "O", default, deserialize_with = "empty_as_none")]
    pub o: Option<String>,
}

impl Players {
    pub fn new(x: Option<String>, o: Option<String>) -> Self {
        Players { x, o }
    }

    pub fn get(&self, mark: Mark) -> Option<&str> {
        match mark {
            Mark::X => self.x.as_deref(),
            Mark::O => self.o.as_deref(),
        }
    }

    pub fn set(&mut self, mark: Mark, name: Option<String>) {
        match mark {
            Mark::X => self.x = name,
            Mark::O => self.o = name,
        }
    }

    pub fn mark_of(&self, name: &str) -> Option<Mark> {
        if self.x.as_deref() == Some(name) {
            Some(Mark::X)
        } else if self.o.as_deref() == Some(name) {
            Some(Mark::O)
        } else {
            None
        }
    }

    /// The seated name that is not `name`, if any.
    pub fn other_than(&self, name: &str) -> Option<&str> {
        [self.x.as_deref(), self.o.as_deref()]
            .into_iter()
            .flatten()
            .find(|seated| *seated != name)
    }

    /// Label shown for a seat: the player's name, or the simulated opponent.
    pub fn label(&self, mark: Mark) -> String {
        self.get(mark).unwrap_or(SIMULATED_OPPONENT).to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub board: [Cell; 9],
    pub current_turn: Mark,
    pub game_over: bool,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub winner: Option<String>,
    #[serde(default)]
    pub winning_combination: Vec<usize>,
    #[serde(default)]
    pub players: Players,
}

impl GameState {
    pub fn is_draw(&self) -> bool {
        self.game_over && self.winner.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.board.iter().all(Option::is_none)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub players: Vec<String>,
    #[serde(default)]
    pub spectators: usize,
    #[serde(default)]
    pub is_private: bool,
}

impl Room {
    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_OCCUPANTS
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Message {
            id: Uuid::new_v4().to_string(),
            sender: sender.into(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_state_reads_server_shape() {
        let json = r#"{
            "board": ["X", null, null, null, "O", null, null, null, null],
            "currentTurn": "X",
            "gameOver": false,
            "winner": "",
            "winningCombination": [],
            "players": {"X": "alice", "O": ""}
        }"#;
        let state: GameState = serde_json::from_str(json).unwrap();
        assert_eq!(state.board[0], Some(Mark::X));
        assert_eq!(state.board[4], Some(Mark::O));
        assert_eq!(state.winner, None);
        assert_eq!(state.players.x.as_deref(), Some("alice"));
        assert_eq!(state.players.o, None);
    }

    #[test]
    fn other_than_skips_the_sender() {
        let players = Players::new(Some("alice".into()), Some("bob".into()));
        assert_eq!(players.other_than("alice"), Some("bob"));
        assert_eq!(players.other_than("bob"), Some("alice"));

        let alone = Players::new(Some("alice".into()), None);
        assert_eq!(alone.other_than("alice"), None);
        assert_eq!(alone.label(Mark::O), SIMULATED_OPPONENT);
    }

    #[test]
    fn room_defaults_missing_fields() {
        let room: Room = serde_json::from_str(r#"{"id": "r1", "name": "Lobby"}"#).unwrap();
        assert!(room.players.is_empty());
        assert!(!room.is_private);
        assert!(!room.is_full());
    }
}
