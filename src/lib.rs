pub mod config;
pub mod connection;
pub mod error;
pub mod game;
pub mod messages;
pub mod models;
pub mod room;
pub mod session;
pub mod simulation;
pub mod state;
pub mod store;
pub mod transport;

pub use config::Config;
pub use connection::{ConnectionManager, ConnectionStatus, Subscription};
pub use error::ClientError;
pub use models::{GameState, Mark, Message, Room};
pub use session::Session;
pub use simulation::LocalSimulation;
pub use state::{Mode, Phase, SessionState};
