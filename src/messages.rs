use serde::{Deserialize, Serialize};

use crate::models::{GameState, Message, Room};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "connect")]
    Connect { name: String },
    #[serde(rename = "create_room")]
    CreateRoom {
        name: String,
        #[serde(rename = "isPrivate")]
        is_private: bool,
    },
    #[serde(rename = "join_room")]
    JoinRoom {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    #[serde(rename = "join_random")]
    JoinRandom,
    #[serde(rename = "leave_room")]
    LeaveRoom,
    #[serde(rename = "move")]
    Move { index: usize },
    #[serde(rename = "send_message")]
    SendMessage { text: String },
    #[serde(rename = "restart_game")]
    RestartGame,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    #[serde(rename = "game_state")]
    GameState(GameState),
    #[serde(rename = "room_list")]
    RoomList(Vec<Room>),
    #[serde(rename = "new_message")]
    NewMessage(Message),
    #[serde(rename = "player_joined")]
    PlayerJoined { name: String },
    #[serde(rename = "player_left")]
    PlayerLeft { name: String },
    #[serde(rename = "room_joined")]
    RoomJoined { room: Room },
    #[serde(rename = "error")]
    Error { message: String },
}

impl ClientMessage {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ServerMessage {
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
