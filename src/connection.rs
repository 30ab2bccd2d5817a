//! Connection to the remote game server.
//!
//! [`ConnectionManager`] walks an ordered list of candidate servers, keeps at
//! most one live link, fans inbound pushes out to subscribers, and performs a
//! single delayed reconnect when a link drops without the user asking for it.
//! Every link and reconnect task is tagged with a generation; anything from a
//! superseded generation is discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use crate::config::ConnectionConfig;
use crate::error::{ClientError, Result};
use crate::messages::{ClientMessage, ServerMessage};
use crate::models::{GameState, Message, Room};
use crate::store::NameStore;
use crate::transport::{Connector, Transport};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected { endpoint: String },
    /// The link closed unexpectedly; a reconnect is scheduled.
    Dropped,
    /// `previous` is the endpoint whose link dropped.
    Reconnected { endpoint: String, previous: String },
    /// The reconnect attempt failed. No further attempts are made.
    Lost,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
    Joined(String),
    Left(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Server(ServerMessage),
    Status(ConnectionStatus),
}

type Listener = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Listener)>>,
}

impl Listeners {
    fn entries(&self) -> MutexGuard<'_, Vec<(u64, Listener)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add(&self, listener: Listener) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries().push((id, listener));
        id
    }

    fn remove(&self, id: u64) {
        self.entries().retain(|(entry_id, _)| *entry_id != id);
    }

    fn len(&self) -> usize {
        self.entries().len()
    }

    fn dispatch(&self, event: &ConnectionEvent) {
        // Listeners run outside the lock so they may subscribe or unsubscribe.
        let snapshot: Vec<Listener> = self
            .entries()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }
}

/// Handle for a registered listener. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.remove(self.id);
        }
    }
}

struct Link {
    commands: mpsc::UnboundedSender<ClientMessage>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
    endpoint: usize,
}

#[derive(Default)]
struct LinkState {
    generation: u64,
    name: Option<String>,
    last_good: usize,
    link: Option<Link>,
    reconnect: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkEnd {
    Closed,
    Dropped,
}

struct Shared {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    store: Arc<dyn NameStore>,
    listeners: Arc<Listeners>,
    state: Mutex<LinkState>,
}

#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(
        config: ConnectionConfig,
        connector: Arc<dyn Connector>,
        store: Arc<dyn NameStore>,
    ) -> Self {
        ConnectionManager {
            shared: Arc::new(Shared {
                config,
                connector,
                store,
                listeners: Arc::new(Listeners::default()),
                state: Mutex::new(LinkState::default()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_connected(&self) -> bool {
        self.lock().link.is_some()
    }

    /// Endpoint of the live link, if any.
    pub fn endpoint(&self) -> Option<String> {
        let state = self.lock();
        state
            .link
            .as_ref()
            .map(|link| self.shared.config.candidates[link.endpoint].clone())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    /// Connects as `name`, failing over through the candidate list.
    ///
    /// Resolves `false` once every candidate has failed on every pass; it
    /// never returns an error so the caller can fall back to simulation.
    pub async fn connect(&self, name: &str) -> bool {
        let already = {
            let state = self.lock();
            state.link.is_some() && state.name.as_deref() == Some(name)
        };
        if already {
            debug!("Already connected as {}", name);
            return true;
        }

        self.disconnect().await;

        let generation = {
            let mut state = self.lock();
            state.generation += 1;
            state.name = Some(name.to_string());
            state.generation
        };

        match self
            .establish(name, generation, 0, self.shared.config.max_passes, false)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!("No game server reachable for {}: {}", name, e);
                false
            }
        }
    }

    /// User-initiated disconnect. Cancels any pending reconnect.
    pub async fn disconnect(&self) {
        let (link, reconnect) = {
            let mut state = self.lock();
            state.generation += 1;
            state.name = None;
            (state.link.take(), state.reconnect.take())
        };

        if let Some(task) = reconnect {
            task.abort();
        }

        if let Some(mut link) = link {
            info!(
                "Disconnecting from {}",
                self.shared.config.candidates[link.endpoint]
            );
            if let Some(shutdown) = link.shutdown.take() {
                let _ = shutdown.send(());
            }
            if timeout(SHUTDOWN_TIMEOUT, &mut link.task).await.is_err() {
                link.task.abort();
            }
        }
    }

    async fn establish(
        &self,
        name: &str,
        generation: u64,
        start: usize,
        passes: usize,
        reconnecting: bool,
    ) -> Result<usize> {
        let candidates = &self.shared.config.candidates;
        let mut attempts = 0;

        for pass in 0..passes {
            for offset in 0..candidates.len() {
                if !self.is_current(generation) {
                    return Err(ClientError::Superseded);
                }
                let index = (start + offset) % candidates.len();
                let endpoint = &candidates[index];
                attempts += 1;
                debug!("Connecting to {} (pass {}, attempt {})", endpoint, pass + 1, attempts);

                match self.open(endpoint, name).await {
                    Ok(transport) => {
                        let status = if reconnecting {
                            ConnectionStatus::Reconnected {
                                endpoint: endpoint.clone(),
                                previous: candidates[start].clone(),
                            }
                        } else {
                            ConnectionStatus::Connected {
                                endpoint: endpoint.clone(),
                            }
                        };
                        return self.install(transport, name, generation, index, status).await;
                    }
                    Err(e) => warn!("Server {} unavailable: {}", endpoint, e),
                }
            }
        }

        Err(ClientError::Exhausted { attempts })
    }

    async fn open(&self, endpoint: &str, name: &str) -> Result<Box<dyn Transport>> {
        let limit = self.shared.config.connect_timeout;
        let attempt = async {
            let mut transport = self.shared.connector.connect(endpoint).await?;
            let hello = ClientMessage::Connect {
                name: name.to_string(),
            }
            .encode()?;
            transport.send(hello).await?;
            Ok::<_, ClientError>(transport)
        };
        timeout(limit, attempt)
            .await
            .map_err(|_| ClientError::Timeout(limit))?
    }

    /// Registers the link and announces `status` before the link task reads
    /// its first frame, so subscribers never see a push or a drop ahead of it.
    async fn install(
        &self,
        transport: Box<dyn Transport>,
        name: &str,
        generation: u64,
        index: usize,
        status: ConnectionStatus,
    ) -> Result<usize> {
        let (ready, ready_rx) = oneshot::channel::<()>();
        let superseded = {
            let mut state = self.lock();
            if state.generation == generation {
                let (commands, command_rx) = mpsc::unbounded_channel();
                let (shutdown, shutdown_rx) = oneshot::channel();
                let manager = self.clone();
                let listeners = Arc::clone(&self.shared.listeners);
                let task = tokio::spawn(async move {
                    if ready_rx.await.is_err() {
                        return;
                    }
                    let end = link_loop(transport, command_rx, shutdown_rx, &listeners).await;
                    if end == LinkEnd::Dropped {
                        manager.handle_drop(generation);
                    }
                });
                state.link = Some(Link {
                    commands,
                    shutdown: Some(shutdown),
                    task,
                    endpoint: index,
                });
                state.last_good = index;
                None
            } else {
                Some(transport)
            }
        };

        if let Some(mut transport) = superseded {
            let _ = transport.close().await;
            return Err(ClientError::Superseded);
        }

        self.emit(status);
        let _ = ready.send(());

        info!(
            "Connected to {} as {}",
            self.shared.config.candidates[index], name
        );
        if let Err(e) = self.shared.store.save(name).await {
            warn!("Failed to persist display name: {}", e);
        }
        Ok(index)
    }

    fn handle_drop(&self, generation: u64) {
        {
            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            if let Some(link) = state.link.take() {
                warn!(
                    "Connection to {} dropped",
                    self.shared.config.candidates[link.endpoint]
                );
            }
            let Some(name) = state.name.clone() else {
                return;
            };
            let start = state.last_good;
            state.reconnect = Some(tokio::spawn(self.clone().reconnect(name, generation, start)));
        }
        self.emit(ConnectionStatus::Dropped);
    }

    fn reconnect(self, name: String, generation: u64, start: usize) -> BoxFuture<'static, ()> {
        async move {
            sleep(self.shared.config.reconnect_delay).await;
            {
                let mut state = self.lock();
                if state.generation != generation {
                    return;
                }
                state.reconnect = None;
            }

            info!("Reconnecting as {}", name);
            match self.establish(&name, generation, start, 1, true).await {
                Ok(_) => {}
                Err(ClientError::Superseded) => debug!("Reconnect superseded"),
                Err(e) => {
                    warn!("Reconnect failed: {}", e);
                    if self.is_current(generation) {
                        self.emit(ConnectionStatus::Lost);
                    }
                }
            }
        }
        .boxed()
    }

    fn emit(&self, status: ConnectionStatus) {
        self.shared
            .listeners
            .dispatch(&ConnectionEvent::Status(status));
    }

    fn send(&self, message: ClientMessage) {
        let state = self.lock();
        match state.link.as_ref() {
            Some(link) => {
                if link.commands.send(message).is_err() {
                    debug!("Link is closing; message dropped");
                }
            }
            None => debug!("Not connected; ignoring {:?}", message),
        }
    }

    pub fn create_room(&self, name: &str, is_private: bool) {
        self.send(ClientMessage::CreateRoom {
            name: name.to_string(),
            is_private,
        });
    }

    pub fn join_room(&self, room_id: &str) {
        self.send(ClientMessage::JoinRoom {
            room_id: room_id.to_string(),
        });
    }

    pub fn join_random(&self) {
        self.send(ClientMessage::JoinRandom);
    }

    pub fn leave_room(&self) {
        self.send(ClientMessage::LeaveRoom);
    }

    pub fn make_move(&self, index: usize) {
        self.send(ClientMessage::Move { index });
    }

    pub fn send_message(&self, text: &str) {
        self.send(ClientMessage::SendMessage {
            text: text.to_string(),
        });
    }

    pub fn restart_game(&self) {
        self.send(ClientMessage::RestartGame);
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        let id = self.shared.listeners.add(Arc::new(listener));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.shared.listeners),
        }
    }

    pub fn on_game_state<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&GameState) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let ConnectionEvent::Server(ServerMessage::GameState(state)) = event {
                listener(state);
            }
        })
    }

    pub fn on_room_list<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&[Room]) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let ConnectionEvent::Server(ServerMessage::RoomList(rooms)) = event {
                listener(rooms);
            }
        })
    }

    pub fn on_message<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let ConnectionEvent::Server(ServerMessage::NewMessage(message)) = event {
                listener(message);
            }
        })
    }

    pub fn on_presence<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Presence) + Send + Sync + 'static,
    {
        self.subscribe(move |event| match event {
            ConnectionEvent::Server(ServerMessage::PlayerJoined { name }) => {
                listener(&Presence::Joined(name.clone()));
            }
            ConnectionEvent::Server(ServerMessage::PlayerLeft { name }) => {
                listener(&Presence::Left(name.clone()));
            }
            _ => {}
        })
    }

    pub fn on_room_joined<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Room) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let ConnectionEvent::Server(ServerMessage::RoomJoined { room }) = event {
                listener(room);
            }
        })
    }

    pub fn on_notice<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let ConnectionEvent::Server(ServerMessage::Error { message }) = event {
                listener(message);
            }
        })
    }

    pub fn on_status<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let ConnectionEvent::Status(status) = event {
                listener(status);
            }
        })
    }
}

async fn link_loop(
    mut transport: Box<dyn Transport>,
    mut commands: mpsc::UnboundedReceiver<ClientMessage>,
    mut shutdown: oneshot::Receiver<()>,
    listeners: &Listeners,
) -> LinkEnd {
    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(message) => match message.encode() {
                        Ok(json) => {
                            if let Err(e) = transport.send(json).await {
                                error!("Failed to send message: {}", e);
                                return LinkEnd::Dropped;
                            }
                        }
                        Err(e) => error!("Failed to encode {:?}: {}", message, e),
                    },
                    None => {
                        let _ = transport.close().await;
                        return LinkEnd::Closed;
                    }
                }
            }
            _ = &mut shutdown => {
                let _ = transport.close().await;
                return LinkEnd::Closed;
            }
            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => match ServerMessage::decode(&text) {
                        Ok(message) => listeners.dispatch(&ConnectionEvent::Server(message)),
                        Err(e) => warn!("Ignoring unreadable server message: {} ({})", e, text),
                    },
                    Some(Err(e)) => {
                        error!("Connection error: {}", e);
                        return LinkEnd::Dropped;
                    }
                    None => {
                        info!("Server closed the connection");
                        return LinkEnd::Dropped;
                    }
                }
            }
        }
    }
}
