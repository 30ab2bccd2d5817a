//! Session driver: routes user intents to the server or the local simulation
//! and folds everything that comes back into one [`SessionState`].

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::config::Config;
use crate::connection::{ConnectionManager, ConnectionStatus, Presence, Subscription};
use crate::error::{ClientError, Result};
use crate::messages::ServerMessage;
use crate::simulation::{Deferred, LocalSimulation, Scheduled, Step};
use crate::state::{Mode, SessionEvent, SessionState};
use crate::store::{FileNameStore, NameStore};
use crate::transport::WsConnector;

pub const MIN_NAME_LEN: usize = 3;
pub const MAX_NAME_LEN: usize = 15;

pub fn validate_name(name: &str) -> Result<()> {
    let len = name.chars().count();
    if (MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) {
        Ok(())
    } else {
        Err(ClientError::InvalidName)
    }
}

#[derive(Debug)]
enum InboundKind {
    Server(ServerMessage),
    Status(ConnectionStatus),
    Timer(Deferred),
}

#[derive(Debug)]
struct Inbound {
    epoch: u64,
    kind: InboundKind,
}

fn forwarder(
    inbox: mpsc::UnboundedSender<Inbound>,
    epoch: u64,
) -> impl Fn(InboundKind) + Clone + Send + Sync + 'static {
    move |kind| {
        let _ = inbox.send(Inbound { epoch, kind });
    }
}

pub struct Session {
    state: SessionState,
    publisher: watch::Sender<SessionState>,
    connection: ConnectionManager,
    simulation: LocalSimulation,
    store: Arc<dyn NameStore>,
    inbox_tx: mpsc::UnboundedSender<Inbound>,
    inbox_rx: mpsc::UnboundedReceiver<Inbound>,
    subscriptions: Vec<Subscription>,
    timers: Vec<JoinHandle<()>>,
}

impl Session {
    pub fn new(
        connection: ConnectionManager,
        simulation: LocalSimulation,
        store: Arc<dyn NameStore>,
    ) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (publisher, _) = watch::channel(SessionState::default());
        Session {
            state: SessionState::default(),
            publisher,
            connection,
            simulation,
            store,
            inbox_tx,
            inbox_rx,
            subscriptions: Vec::new(),
            timers: Vec::new(),
        }
    }

    /// Websocket transport, file-backed name store, entropy-seeded simulation.
    pub fn from_config(config: &Config) -> Self {
        let store: Arc<dyn NameStore> = Arc::new(FileNameStore::new(&config.state_file));
        let connection = ConnectionManager::new(
            config.connection.clone(),
            Arc::new(WsConnector),
            Arc::clone(&store),
        );
        let simulation = LocalSimulation::with_entropy(config.simulation.clone());
        Session::new(connection, simulation, store)
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Receives a full copy of the state after every accepted change.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.publisher.subscribe()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    fn commit(&mut self, event: SessionEvent) {
        let epoch = self.state.epoch;
        self.state = std::mem::take(&mut self.state).apply(event);
        if self.state.epoch != epoch {
            self.rebind();
        }
        self.publisher.send_replace(self.state.clone());
    }

    /// Releases every listener and timer from the previous epoch.
    fn rebind(&mut self) {
        self.subscriptions.clear();
        for timer in self.timers.drain(..) {
            timer.abort();
        }
        if matches!(self.state.mode, Mode::Connecting | Mode::Online) {
            self.subscribe_connection();
        }
    }

    fn subscribe_connection(&mut self) {
        let post = forwarder(self.inbox_tx.clone(), self.state.epoch);
        let connection = &self.connection;

        let on_game = post.clone();
        let on_rooms = post.clone();
        let on_chat = post.clone();
        let on_presence = post.clone();
        let on_joined = post.clone();
        let on_notice = post.clone();
        let subscriptions = vec![
            connection.on_game_state(move |game| {
                on_game(InboundKind::Server(ServerMessage::GameState(game.clone())));
            }),
            connection.on_room_list(move |rooms| {
                on_rooms(InboundKind::Server(ServerMessage::RoomList(rooms.to_vec())));
            }),
            connection.on_message(move |message| {
                on_chat(InboundKind::Server(ServerMessage::NewMessage(message.clone())));
            }),
            connection.on_presence(move |presence| {
                let message = match presence {
                    Presence::Joined(name) => ServerMessage::PlayerJoined { name: name.clone() },
                    Presence::Left(name) => ServerMessage::PlayerLeft { name: name.clone() },
                };
                on_presence(InboundKind::Server(message));
            }),
            connection.on_room_joined(move |room| {
                on_joined(InboundKind::Server(ServerMessage::RoomJoined { room: room.clone() }));
            }),
            connection.on_notice(move |message| {
                on_notice(InboundKind::Server(ServerMessage::Error {
                    message: message.to_string(),
                }));
            }),
            connection.on_status(move |status| post(InboundKind::Status(status.clone()))),
        ];
        self.subscriptions.extend(subscriptions);
    }

    /// Logs in with the stored display name, if there is one.
    pub async fn restore(&mut self) -> Result<Option<Mode>> {
        match self.store.load().await {
            Some(name) => self.login(&name).await.map(Some),
            None => Ok(None),
        }
    }

    /// Connects as `name`, or falls back to the local simulation. Only an
    /// invalid name is an error.
    pub async fn login(&mut self, name: &str) -> Result<Mode> {
        let name = name.trim();
        validate_name(name)?;

        self.commit(SessionEvent::LoginStarted {
            name: name.to_string(),
        });
        if self.connection.connect(name).await {
            self.commit(SessionEvent::ConnectionEstablished);
        } else {
            info!("Playing offline as {}", name);
            self.simulation.reset();
            self.commit(SessionEvent::ConnectionFailed);
            self.commit(SessionEvent::Server(ServerMessage::RoomList(
                self.simulation.rooms(),
            )));
        }
        Ok(self.state.mode)
    }

    pub async fn logout(&mut self) {
        self.connection.disconnect().await;
        if let Err(e) = self.store.clear().await {
            warn!("Failed to clear stored display name: {}", e);
        }
        self.simulation.reset();
        self.commit(SessionEvent::LoggedOut);
    }

    /// Waits for one server push, connection status change or timer and
    /// applies it.
    pub async fn next(&mut self) -> &SessionState {
        if let Some(inbound) = self.inbox_rx.recv().await {
            self.process(inbound);
        }
        &self.state
    }

    fn process(&mut self, inbound: Inbound) {
        if inbound.epoch != self.state.epoch {
            debug!(
                "Discarding {:?} from epoch {} (current {})",
                inbound.kind, inbound.epoch, self.state.epoch
            );
            return;
        }

        match inbound.kind {
            InboundKind::Server(message) => self.commit(SessionEvent::Server(message)),
            InboundKind::Status(ConnectionStatus::Connected { endpoint }) => {
                debug!("Session bound to {}", endpoint);
            }
            InboundKind::Status(ConnectionStatus::Dropped) => {
                self.commit(SessionEvent::Notice("Connection dropped; reconnecting".into()));
            }
            InboundKind::Status(ConnectionStatus::Reconnected { endpoint, previous }) => {
                if endpoint == previous {
                    self.commit(SessionEvent::Notice(format!("Reconnected to {endpoint}")));
                } else {
                    info!("Switched servers from {} to {}", previous, endpoint);
                    self.commit(SessionEvent::ServerChanged { endpoint });
                }
            }
            InboundKind::Status(ConnectionStatus::Lost) => self.degrade(),
            InboundKind::Timer(action) => {
                if self.state.is_simulated() {
                    let step = self.simulation.fire(action);
                    self.absorb(step);
                }
            }
        }
    }

    fn degrade(&mut self) {
        warn!("Server connection lost; switching to offline play");
        self.simulation.reset();
        self.commit(SessionEvent::ConnectionLost);
        self.commit(SessionEvent::Server(ServerMessage::RoomList(
            self.simulation.rooms(),
        )));
    }

    fn absorb(&mut self, step: Step) {
        for event in step.events {
            self.commit(SessionEvent::Server(event));
        }
        for scheduled in step.scheduled {
            self.schedule(scheduled);
        }
    }

    fn schedule(&mut self, scheduled: Scheduled) {
        let post = forwarder(self.inbox_tx.clone(), self.state.epoch);
        self.timers.retain(|timer| !timer.is_finished());
        self.timers.push(tokio::spawn(async move {
            sleep(scheduled.delay).await;
            post(InboundKind::Timer(scheduled.action));
        }));
    }

    fn player(&self) -> Result<String> {
        self.state.name.clone().ok_or(ClientError::NotConnected)
    }

    fn ensure_in_room(&self) -> Result<()> {
        if self.state.in_room() {
            Ok(())
        } else {
            Err(ClientError::NotInRoom)
        }
    }

    fn current_room(&self) -> Result<String> {
        self.state.room_id.clone().ok_or(ClientError::NotInRoom)
    }

    fn reject(&mut self, error: ClientError) -> Result<()> {
        info!("Room action rejected: {}", error);
        self.commit(SessionEvent::Notice(error.to_string()));
        Err(error)
    }

    /// Leaves the current simulated room before entering another one.
    fn vacate_simulated_room(&mut self, player: &str) {
        if let Some(room_id) = self.state.room_id.clone() {
            self.simulation.leave_room(&room_id, player);
            self.commit(SessionEvent::RoomLeft);
        }
    }

    pub fn create_room(&mut self, name: &str, is_private: bool) -> Result<()> {
        let player = self.player()?;
        match self.state.mode {
            Mode::Online => {
                self.connection.create_room(name, is_private);
                self.commit(SessionEvent::RoomRequested { room_id: None });
            }
            Mode::Simulated => {
                self.vacate_simulated_room(&player);
                let step = self.simulation.create_room(&player, name, is_private);
                self.absorb(step);
            }
            Mode::Offline | Mode::Connecting => return Err(ClientError::NotConnected),
        }
        Ok(())
    }

    pub fn join_room(&mut self, room_id: &str) -> Result<()> {
        let player = self.player()?;
        match self.state.mode {
            Mode::Online => {
                self.connection.join_room(room_id);
                self.commit(SessionEvent::RoomRequested {
                    room_id: Some(room_id.to_string()),
                });
            }
            Mode::Simulated => {
                if self.state.room_id.as_deref() == Some(room_id) {
                    return Ok(());
                }
                // Check before vacating so a rejected join keeps the current room.
                match self.simulation.room(room_id).map(|room| room.info.is_full()) {
                    None => return self.reject(ClientError::RoomNotFound),
                    Some(true) => return self.reject(ClientError::RoomFull),
                    Some(false) => {}
                }
                self.vacate_simulated_room(&player);
                match self.simulation.join_room(room_id, &player) {
                    Ok(step) => self.absorb(step),
                    Err(e) => return self.reject(e),
                }
            }
            Mode::Offline | Mode::Connecting => return Err(ClientError::NotConnected),
        }
        Ok(())
    }

    pub fn join_random(&mut self) -> Result<()> {
        let player = self.player()?;
        match self.state.mode {
            Mode::Online => {
                self.connection.join_random();
                self.commit(SessionEvent::RoomRequested { room_id: None });
            }
            Mode::Simulated => {
                self.vacate_simulated_room(&player);
                let step = self.simulation.join_random(&player);
                self.absorb(step);
            }
            Mode::Offline | Mode::Connecting => return Err(ClientError::NotConnected),
        }
        Ok(())
    }

    pub fn leave_room(&mut self) -> Result<()> {
        let player = self.player()?;
        self.ensure_in_room()?;
        match self.state.mode {
            Mode::Online => {
                self.connection.leave_room();
                self.commit(SessionEvent::RoomLeft);
            }
            Mode::Simulated => {
                let room_id = self.current_room()?;
                self.simulation.leave_room(&room_id, &player);
                self.commit(SessionEvent::RoomLeft);
                self.commit(SessionEvent::Server(ServerMessage::RoomList(
                    self.simulation.rooms(),
                )));
            }
            Mode::Offline | Mode::Connecting => return Err(ClientError::NotConnected),
        }
        Ok(())
    }

    /// Invalid moves are ignored without an error.
    pub fn make_move(&mut self, index: usize) -> Result<()> {
        let player = self.player()?;
        self.ensure_in_room()?;
        match self.state.mode {
            Mode::Online => self.connection.make_move(index),
            Mode::Simulated => {
                let room_id = self.current_room()?;
                let step = self.simulation.make_move(&room_id, &player, index);
                self.absorb(step);
            }
            Mode::Offline | Mode::Connecting => return Err(ClientError::NotConnected),
        }
        Ok(())
    }

    pub fn send_message(&mut self, text: &str) -> Result<()> {
        let player = self.player()?;
        self.ensure_in_room()?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        match self.state.mode {
            Mode::Online => self.connection.send_message(text),
            Mode::Simulated => {
                let room_id = self.current_room()?;
                let step = self.simulation.send_message(&room_id, &player, text)?;
                self.absorb(step);
            }
            Mode::Offline | Mode::Connecting => return Err(ClientError::NotConnected),
        }
        Ok(())
    }

    pub fn restart_game(&mut self) -> Result<()> {
        self.ensure_in_room()?;
        match self.state.mode {
            Mode::Online => self.connection.restart_game(),
            Mode::Simulated => {
                let room_id = self.current_room()?;
                let step = self.simulation.restart_game(&room_id);
                self.absorb(step);
            }
            Mode::Offline | Mode::Connecting => return Err(ClientError::NotConnected),
        }
        Ok(())
    }

    pub fn clear_notice(&mut self) {
        if self.state.notice.is_some() {
            self.commit(SessionEvent::ClearNotice);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for timer in self.timers.drain(..) {
            timer.abort();
        }
    }
}
