use crate::error::{ClientError, Result};
use crate::models::{GameState, Mark, Message, Players, Room};

/// A room owned by the local simulation: listing, game and chat log.
#[derive(Debug, Clone)]
pub struct SimRoom {
    pub info: Room,
    pub game: GameState,
    pub chat: Vec<Message>,
}

impl SimRoom {
    pub fn new(id: String, name: String, is_private: bool, creator: &str) -> Self {
        SimRoom {
            info: Room {
                id,
                name,
                players: vec![creator.to_string()],
                spectators: 0,
                is_private,
            },
            game: GameState::new(Players::new(Some(creator.to_string()), None)),
            chat: Vec::new(),
        }
    }

    pub fn has_participant(&self, name: &str) -> bool {
        self.info.players.iter().any(|player| player == name)
    }

    /// Seats `name` in the first free seat. Returns the seat, or `RoomFull`
    /// without touching the room.
    pub fn add_participant(&mut self, name: &str) -> Result<Mark> {
        if let Some(mark) = self.game.players.mark_of(name) {
            return Ok(mark);
        }
        if self.info.is_full() {
            return Err(ClientError::RoomFull);
        }

        let mark = if self.game.players.x.is_none() {
            Mark::X
        } else {
            Mark::O
        };
        self.info.players.push(name.to_string());
        self.game.players.set(mark, Some(name.to_string()));
        Ok(mark)
    }

    /// Frees the seat held by `name` and starts a fresh board for whoever
    /// remains. A player left alone in seat O moves to X so the side to move
    /// is never an empty seat facing a seated player.
    pub fn remove_participant(&mut self, name: &str) -> bool {
        let Some(position) = self.info.players.iter().position(|player| player == name) else {
            return false;
        };
        self.info.players.remove(position);
        if let Some(mark) = self.game.players.mark_of(name) {
            self.game.players.set(mark, None);
        }
        if self.game.players.x.is_none() {
            self.game.players.x = self.game.players.o.take();
        }
        self.game = self.game.restarted();
        true
    }

    pub fn is_empty(&self) -> bool {
        self.info.players.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> SimRoom {
        SimRoom::new("sim-1".into(), "Test".into(), false, "alice")
    }

    #[test]
    fn creator_is_sole_occupant_in_seat_x() {
        let room = room();
        assert_eq!(room.info.players, vec!["alice".to_string()]);
        assert_eq!(room.game.players.x.as_deref(), Some("alice"));
        assert_eq!(room.game.players.o, None);
    }

    #[test]
    fn third_participant_is_rejected_without_mutation() {
        let mut room = room();
        assert_eq!(room.add_participant("bob").unwrap(), Mark::O);
        let before = room.info.clone();

        assert!(matches!(room.add_participant("carol"), Err(ClientError::RoomFull)));
        assert_eq!(room.info, before);
        assert_eq!(room.add_participant("bob").unwrap(), Mark::O);
    }

    #[test]
    fn leaving_frees_the_seat() {
        let mut room = room();
        room.add_participant("bob").unwrap();
        assert!(room.remove_participant("alice"));
        assert_eq!(room.game.players.x.as_deref(), Some("bob"));
        assert_eq!(room.game.players.o, None);
        assert_eq!(room.add_participant("carol").unwrap(), Mark::O);
        assert!(!room.remove_participant("nobody"));
    }
}
