use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Invalid message: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection attempt timed out after {0:?}")]
    Timeout(Duration),
    #[error("All {attempts} connection attempts failed")]
    Exhausted { attempts: usize },
    #[error("Connection attempt superseded")]
    Superseded,
    #[error("Not connected")]
    NotConnected,
    #[error("Room not found")]
    RoomNotFound,
    #[error("Room is full")]
    RoomFull,
    #[error("Not in a room")]
    NotInRoom,
    #[error("Display name must be between 3 and 15 characters")]
    InvalidName,
    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
