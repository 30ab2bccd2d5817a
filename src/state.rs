//! Session state and its transition function.
//!
//! [`SessionState::apply`] is the only way session data changes. Each call
//! consumes the old state and returns its full replacement.

use crate::messages::ServerMessage;
use crate::models::{GameState, Message, Room};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Offline,
    Connecting,
    Online,
    Simulated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    LoggedOut,
    Connecting,
    Connected,
    OfflineSimulated,
    InRoom,
    GameInProgress,
    GameOver,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    LoginStarted { name: String },
    ConnectionEstablished,
    ConnectionFailed,
    ConnectionLost,
    Server(ServerMessage),
    /// A create or join was sent to the server. `room_id` is known only for
    /// a join by code.
    RoomRequested { room_id: Option<String> },
    /// The link came back on a different server; nothing from the old one
    /// carries over.
    ServerChanged { endpoint: String },
    RoomLeft,
    Notice(String),
    ClearNotice,
    LoggedOut,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub name: Option<String>,
    pub mode: Mode,
    pub room_id: Option<String>,
    /// In a room the server has not named yet. Resolved from the first room
    /// list that seats this player.
    pub room_pending: bool,
    pub rooms: Vec<Room>,
    pub game: Option<GameState>,
    pub chat: Vec<Message>,
    pub notice: Option<String>,
    /// Bumped on every mode switch and teardown. Asynchronous results tagged
    /// with an older epoch are discarded.
    pub epoch: u64,
}

impl SessionState {
    pub fn phase(&self) -> Phase {
        if self.name.is_none() {
            return Phase::LoggedOut;
        }
        match self.mode {
            Mode::Offline => return Phase::LoggedOut,
            Mode::Connecting => return Phase::Connecting,
            Mode::Online | Mode::Simulated => {}
        }
        if !self.in_room() {
            return if self.mode == Mode::Online {
                Phase::Connected
            } else {
                Phase::OfflineSimulated
            };
        }
        match &self.game {
            Some(game) if game.game_over => Phase::GameOver,
            Some(game) if !game.is_empty() => Phase::GameInProgress,
            _ => Phase::InRoom,
        }
    }

    pub fn in_room(&self) -> bool {
        self.room_id.is_some() || self.room_pending
    }

    pub fn is_simulated(&self) -> bool {
        self.mode == Mode::Simulated
    }

    #[must_use]
    pub fn apply(self, event: SessionEvent) -> SessionState {
        match event {
            SessionEvent::LoginStarted { name } => SessionState {
                name: Some(name),
                mode: Mode::Connecting,
                epoch: self.epoch + 1,
                ..SessionState::default()
            },
            SessionEvent::ConnectionEstablished if self.mode == Mode::Connecting => SessionState {
                mode: Mode::Online,
                ..self
            },
            SessionEvent::ConnectionFailed if self.mode == Mode::Connecting => {
                self.switch_to_simulation(None)
            }
            SessionEvent::ConnectionLost if self.mode == Mode::Online => {
                self.switch_to_simulation(Some("Connection lost; playing offline".to_string()))
            }
            SessionEvent::Server(message) if self.mode != Mode::Offline => self.absorb(message),
            SessionEvent::RoomRequested { room_id } if self.mode == Mode::Online => {
                if room_id.is_some() && room_id == self.room_id {
                    return self;
                }
                SessionState {
                    room_pending: room_id.is_none(),
                    room_id,
                    game: None,
                    chat: Vec::new(),
                    ..self
                }
            }
            SessionEvent::ServerChanged { endpoint } if self.mode == Mode::Online => SessionState {
                room_id: None,
                room_pending: false,
                rooms: Vec::new(),
                game: None,
                chat: Vec::new(),
                notice: Some(format!("Reconnected to {endpoint}; previous room closed")),
                ..self
            },
            SessionEvent::RoomLeft => SessionState {
                room_id: None,
                room_pending: false,
                game: None,
                chat: Vec::new(),
                epoch: self.epoch + 1,
                ..self
            },
            SessionEvent::Notice(notice) => SessionState {
                notice: Some(notice),
                ..self
            },
            SessionEvent::ClearNotice => SessionState {
                notice: None,
                ..self
            },
            SessionEvent::LoggedOut => SessionState {
                epoch: self.epoch + 1,
                ..SessionState::default()
            },
            _ => self,
        }
    }

    fn switch_to_simulation(self, notice: Option<String>) -> SessionState {
        SessionState {
            name: self.name,
            mode: Mode::Simulated,
            notice,
            epoch: self.epoch + 1,
            ..SessionState::default()
        }
    }

    fn absorb(mut self, message: ServerMessage) -> SessionState {
        match message {
            ServerMessage::GameState(game) => {
                if self.in_room() {
                    self.game = Some(game);
                }
            }
            ServerMessage::RoomList(rooms) => {
                if self.room_pending {
                    let name = self.name.as_deref();
                    if let Some(room) = rooms
                        .iter()
                        .find(|room| room.players.iter().any(|player| Some(player.as_str()) == name))
                    {
                        self.room_id = Some(room.id.clone());
                        self.room_pending = false;
                    }
                }
                self.rooms = rooms;
            }
            ServerMessage::NewMessage(message) => {
                if self.in_room() {
                    self.chat.push(message);
                }
            }
            ServerMessage::PlayerJoined { name } => self.notice = Some(format!("{name} joined")),
            ServerMessage::PlayerLeft { name } => self.notice = Some(format!("{name} left")),
            ServerMessage::RoomJoined { room } => {
                if matches!(&self.room_id, Some(current) if *current != room.id) {
                    self.game = None;
                    self.chat.clear();
                }
                self.room_id = Some(room.id);
                self.room_pending = false;
            }
            ServerMessage::Error { message } => {
                // A rejection before the first board cancels the pending entry.
                if self.game.is_none() {
                    self.room_id = None;
                    self.room_pending = false;
                }
                self.notice = Some(message);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Mark, Players};

    fn room(id: &str) -> Room {
        Room {
            id: id.into(),
            name: "Test".into(),
            players: vec!["alice".into()],
            spectators: 0,
            is_private: false,
        }
    }

    fn online() -> SessionState {
        SessionState::default()
            .apply(SessionEvent::LoginStarted { name: "alice".into() })
            .apply(SessionEvent::ConnectionEstablished)
    }

    fn in_room(state: SessionState) -> SessionState {
        state
            .apply(SessionEvent::Server(ServerMessage::RoomJoined { room: room("r1") }))
            .apply(SessionEvent::Server(ServerMessage::GameState(GameState::new(
                Players::new(Some("alice".into()), None),
            ))))
    }

    #[test]
    fn walks_the_phases() {
        let state = SessionState::default();
        assert_eq!(state.phase(), Phase::LoggedOut);

        let state = state.apply(SessionEvent::LoginStarted { name: "alice".into() });
        assert_eq!(state.phase(), Phase::Connecting);

        let state = state.apply(SessionEvent::ConnectionEstablished);
        assert_eq!(state.phase(), Phase::Connected);

        let state = in_room(state);
        assert_eq!(state.phase(), Phase::InRoom);

        let game = state.game.clone().unwrap();
        let state = state.apply(SessionEvent::Server(ServerMessage::GameState(
            game.apply_move(4).unwrap(),
        )));
        assert_eq!(state.phase(), Phase::GameInProgress);

        let mut over = state.game.clone().unwrap();
        over.game_over = true;
        let state = state.apply(SessionEvent::Server(ServerMessage::GameState(over)));
        assert_eq!(state.phase(), Phase::GameOver);

        let restarted = state.game.clone().unwrap().restarted();
        let state = state.apply(SessionEvent::Server(ServerMessage::GameState(restarted)));
        assert_eq!(state.phase(), Phase::InRoom);

        let state = state.apply(SessionEvent::LoggedOut);
        assert_eq!(state.phase(), Phase::LoggedOut);
    }

    #[test]
    fn failure_degrades_and_bumps_epoch() {
        let connecting =
            SessionState::default().apply(SessionEvent::LoginStarted { name: "alice".into() });
        let epoch = connecting.epoch;
        let offline = connecting.apply(SessionEvent::ConnectionFailed);
        assert_eq!(offline.phase(), Phase::OfflineSimulated);
        assert_eq!(offline.epoch, epoch + 1);
        assert_eq!(offline.name.as_deref(), Some("alice"));
    }

    #[test]
    fn connecting_never_reverts_on_its_own() {
        let connecting =
            SessionState::default().apply(SessionEvent::LoginStarted { name: "alice".into() });
        let after = connecting.clone().apply(SessionEvent::ConnectionLost);
        assert_eq!(after, connecting);
    }

    #[test]
    fn lost_connection_discards_server_owned_state() {
        let state = in_room(online()).apply(SessionEvent::Server(ServerMessage::RoomList(vec![
            room("r1"),
        ])));
        let epoch = state.epoch;

        let state = state.apply(SessionEvent::ConnectionLost);
        assert!(state.is_simulated());
        assert!(state.rooms.is_empty());
        assert!(state.room_id.is_none());
        assert!(state.game.is_none());
        assert!(state.notice.is_some());
        assert_eq!(state.epoch, epoch + 1);
    }

    #[test]
    fn game_state_is_replaced_and_chat_appended() {
        let state = in_room(online());
        let mut game = GameState::new(Players::default());
        game.current_turn = Mark::O;
        let state = state
            .apply(SessionEvent::Server(ServerMessage::GameState(game.clone())))
            .apply(SessionEvent::Server(ServerMessage::NewMessage(Message::new("bob", "one"))))
            .apply(SessionEvent::Server(ServerMessage::NewMessage(Message::new("bob", "two"))));
        assert_eq!(state.game, Some(game));
        let texts: Vec<&str> = state.chat.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[test]
    fn join_by_code_takes_pushes_without_a_room_ack() {
        let state = online()
            .apply(SessionEvent::RoomRequested { room_id: Some("r1".into()) })
            .apply(SessionEvent::Server(ServerMessage::GameState(GameState::new(
                Players::new(Some("bob".into()), Some("alice".into())),
            ))))
            .apply(SessionEvent::Server(ServerMessage::NewMessage(Message::new("bob", "hi"))));
        assert_eq!(state.room_id.as_deref(), Some("r1"));
        assert!(state.game.is_some());
        assert_eq!(state.chat.len(), 1);
        assert_eq!(state.phase(), Phase::InRoom);
    }

    #[test]
    fn created_room_is_named_by_the_next_room_list() {
        let state = online().apply(SessionEvent::RoomRequested { room_id: None });
        assert_eq!(state.phase(), Phase::InRoom);

        let state = state.apply(SessionEvent::Server(ServerMessage::GameState(GameState::new(
            Players::new(Some("alice".into()), None),
        ))));
        assert!(state.game.is_some());

        let mut other = room("r0");
        other.players = vec!["bob".into()];
        let state = state.apply(SessionEvent::Server(ServerMessage::RoomList(vec![
            other,
            room("r2"),
        ])));
        assert_eq!(state.room_id.as_deref(), Some("r2"));
        assert!(!state.room_pending);
    }

    #[test]
    fn rejection_before_first_board_cancels_the_entry() {
        let state = online()
            .apply(SessionEvent::RoomRequested { room_id: Some("nope".into()) })
            .apply(SessionEvent::Server(ServerMessage::Error {
                message: "Room not found".into(),
            }));
        assert_eq!(state.room_id, None);
        assert_eq!(state.phase(), Phase::Connected);
        assert_eq!(state.notice.as_deref(), Some("Room not found"));

        let state = in_room(online()).apply(SessionEvent::Server(ServerMessage::Error {
            message: "Not your turn".into(),
        }));
        assert_eq!(state.room_id.as_deref(), Some("r1"));
    }

    #[test]
    fn server_change_discards_the_old_room() {
        let state = in_room(online()).apply(SessionEvent::Server(ServerMessage::RoomList(vec![
            room("r1"),
        ])));
        let epoch = state.epoch;

        let state = state.apply(SessionEvent::ServerChanged {
            endpoint: "ws://b".into(),
        });
        assert_eq!(state.phase(), Phase::Connected);
        assert!(state.rooms.is_empty());
        assert!(state.game.is_none());
        assert!(state.chat.is_empty());
        assert_eq!(state.epoch, epoch);
    }

    #[test]
    fn pushes_are_ignored_when_logged_out() {
        let state = SessionState::default()
            .apply(SessionEvent::Server(ServerMessage::RoomList(vec![room("r1")])));
        assert!(state.rooms.is_empty());
    }

    #[test]
    fn logout_resets_but_epoch_keeps_climbing() {
        let state = in_room(online());
        let epoch = state.epoch;
        let state = state.apply(SessionEvent::LoggedOut);
        assert_eq!(state.name, None);
        assert_eq!(state.room_id, None);
        assert!(state.rooms.is_empty());
        assert_eq!(state.epoch, epoch + 1);
    }
}
