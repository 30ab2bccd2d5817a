//! Offline stand-in for the game server.
//!
//! Operations return a [`Step`]: the pushes the server would have sent plus
//! any delayed work. The simulation never owns timers; the caller sleeps for
//! [`Scheduled::delay`] and hands the action back through [`LocalSimulation::fire`].

use std::time::Duration;

use log::{debug, info};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};

use crate::config::SimulationConfig;
use crate::error::{ClientError, Result};
use crate::game::empty_cells;
use crate::messages::ServerMessage;
use crate::models::{Message, Room, SIMULATED_OPPONENT};
use crate::room::SimRoom;

const ROOM_ID_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deferred {
    OpponentMove { room_id: String },
    ChatReply { room_id: String, sender: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheduled {
    pub delay: Duration,
    pub action: Deferred,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Step {
    pub events: Vec<ServerMessage>,
    pub scheduled: Vec<Scheduled>,
}

impl Step {
    fn push(&mut self, event: ServerMessage) {
        self.events.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.scheduled.is_empty()
    }
}

pub struct LocalSimulation {
    config: SimulationConfig,
    rooms: Vec<SimRoom>,
    rng: Box<dyn RngCore + Send>,
}

impl LocalSimulation {
    pub fn new(config: SimulationConfig, rng: Box<dyn RngCore + Send>) -> Self {
        LocalSimulation {
            config,
            rooms: Vec::new(),
            rng,
        }
    }

    pub fn with_entropy(config: SimulationConfig) -> Self {
        Self::new(config, Box::new(StdRng::from_entropy()))
    }

    /// Drops every simulated room.
    pub fn reset(&mut self) {
        self.rooms.clear();
    }

    pub fn rooms(&self) -> Vec<Room> {
        self.rooms.iter().map(|room| room.info.clone()).collect()
    }

    pub fn room(&self, room_id: &str) -> Option<&SimRoom> {
        self.rooms.iter().find(|room| room.info.id == room_id)
    }

    fn room_mut(&mut self, room_id: &str) -> Option<&mut SimRoom> {
        self.rooms.iter_mut().find(|room| room.info.id == room_id)
    }

    fn room_list(&self) -> ServerMessage {
        ServerMessage::RoomList(self.rooms())
    }

    fn generate_room_id(&mut self) -> String {
        loop {
            let suffix: String = (&mut self.rng)
                .sample_iter(&Alphanumeric)
                .take(ROOM_ID_LEN)
                .map(char::from)
                .collect();
            let id = format!("sim-{}", suffix.to_uppercase());
            if self.room(&id).is_none() {
                return id;
            }
        }
    }

    pub fn create_room(&mut self, creator: &str, name: &str, is_private: bool) -> Step {
        let id = self.generate_room_id();
        let room = SimRoom::new(id.clone(), name.to_string(), is_private, creator);
        info!("Simulated room {} ({}) created by {}", id, name, creator);

        let mut step = Step::default();
        step.push(ServerMessage::RoomJoined {
            room: room.info.clone(),
        });
        step.push(ServerMessage::GameState(room.game.clone()));
        self.rooms.push(room);
        step.push(self.room_list());
        step
    }

    pub fn join_room(&mut self, room_id: &str, name: &str) -> Result<Step> {
        let room = self.room_mut(room_id).ok_or(ClientError::RoomNotFound)?;
        let already_seated = room.has_participant(name);
        room.add_participant(name)?;

        let mut step = Step::default();
        step.push(ServerMessage::RoomJoined {
            room: room.info.clone(),
        });
        if !already_seated {
            step.push(ServerMessage::PlayerJoined {
                name: name.to_string(),
            });
        }
        step.push(ServerMessage::GameState(room.game.clone()));
        step.push(self.room_list());
        Ok(step)
    }

    /// Joins the first public room with a free seat, or opens a new one.
    pub fn join_random(&mut self, name: &str) -> Step {
        let open = self
            .rooms
            .iter()
            .find(|room| !room.info.is_private && !room.info.is_full() && !room.has_participant(name))
            .map(|room| room.info.id.clone());

        if let Some(room_id) = open {
            if let Ok(step) = self.join_room(&room_id, name) {
                return step;
            }
        }
        self.create_room(name, &format!("{name}'s room"), false)
    }

    pub fn leave_room(&mut self, room_id: &str, name: &str) -> Step {
        let mut step = Step::default();
        let Some(room) = self.room_mut(room_id) else {
            return step;
        };
        if !room.remove_participant(name) {
            return step;
        }

        let emptied = room.is_empty();
        let game = room.game.clone();
        if emptied {
            debug!("Simulated room {} is empty; removing it", room_id);
            self.rooms.retain(|room| room.info.id != room_id);
        } else {
            step.push(ServerMessage::GameState(game));
        }
        step.push(ServerMessage::PlayerLeft {
            name: name.to_string(),
        });
        step.push(self.room_list());
        step
    }

    /// Moves that are out of turn, onto an occupied cell or after the game
    /// ended yield an empty step.
    pub fn make_move(&mut self, room_id: &str, name: &str, index: usize) -> Step {
        let opponent_delay = self.config.opponent_delay;
        let mut step = Step::default();
        let Some(room) = self.room_mut(room_id) else {
            return step;
        };
        if room.game.players.mark_of(name) != Some(room.game.current_turn) {
            debug!("Ignoring out-of-turn move by {}", name);
            return step;
        }
        let Some(next) = room.game.apply_move(index) else {
            debug!("Ignoring move by {} on cell {}", name, index);
            return step;
        };

        room.game = next.clone();
        let opponent_seat_empty = next.players.get(next.current_turn).is_none();
        if !next.game_over && opponent_seat_empty {
            step.scheduled.push(Scheduled {
                delay: opponent_delay,
                action: Deferred::OpponentMove {
                    room_id: room_id.to_string(),
                },
            });
        }
        step.push(ServerMessage::GameState(next));
        step
    }

    pub fn send_message(&mut self, room_id: &str, sender: &str, text: &str) -> Result<Step> {
        let reply_delay = self.config.reply_delay;
        let room = self.room_mut(room_id).ok_or(ClientError::NotInRoom)?;
        let message = Message::new(sender, text);
        room.chat.push(message.clone());

        let mut step = Step::default();
        step.push(ServerMessage::NewMessage(message));
        step.scheduled.push(Scheduled {
            delay: reply_delay,
            action: Deferred::ChatReply {
                room_id: room_id.to_string(),
                sender: sender.to_string(),
            },
        });
        Ok(step)
    }

    pub fn restart_game(&mut self, room_id: &str) -> Step {
        let mut step = Step::default();
        if let Some(room) = self.room_mut(room_id) {
            room.game = room.game.restarted();
            step.push(ServerMessage::GameState(room.game.clone()));
        }
        step
    }

    /// Runs delayed work. Work whose room vanished or whose game moved on is
    /// dropped.
    pub fn fire(&mut self, action: Deferred) -> Step {
        match action {
            Deferred::OpponentMove { room_id } => self.opponent_move(&room_id),
            Deferred::ChatReply { room_id, sender } => self.chat_reply(&room_id, &sender),
        }
    }

    fn opponent_move(&mut self, room_id: &str) -> Step {
        let mut step = Step::default();
        let cells = match self.room(room_id) {
            Some(room)
                if !room.game.game_over
                    && room.game.players.get(room.game.current_turn).is_none() =>
            {
                empty_cells(&room.game.board)
            }
            _ => return step,
        };
        let Some(&index) = cells.choose(&mut self.rng) else {
            return step;
        };

        if let Some(room) = self.room_mut(room_id) {
            if let Some(next) = room.game.apply_move(index) {
                debug!("Simulated opponent plays cell {}", index);
                room.game = next.clone();
                step.push(ServerMessage::GameState(next));
            }
        }
        step
    }

    fn chat_reply(&mut self, room_id: &str, sender: &str) -> Step {
        let mut step = Step::default();
        let Some(text) = self.config.replies.choose(&mut self.rng).cloned() else {
            return step;
        };
        let Some(room) = self.room_mut(room_id) else {
            return step;
        };
        let author = room
            .game
            .players
            .other_than(sender)
            .unwrap_or(SIMULATED_OPPONENT)
            .to_string();
        let message = Message::new(author, text);
        room.chat.push(message.clone());
        step.push(ServerMessage::NewMessage(message));
        step
    }
}
