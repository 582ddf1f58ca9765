use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::FeedConfig;
use crate::live::batch::MessageBuffer;
use crate::live::priority::priority_subset;
use crate::notice::NoticeSender;
use crate::store::SharedStore;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Inbound commands for the manager's event loop.
#[derive(Debug)]
pub enum FeedCommand {
    Connect,
    Disconnect,
    WentOnline,
    WentOffline,
    Shutdown,
}

#[derive(Debug)]
enum SocketEvent {
    Closed { clean: bool },
}

/// Decision from the reconnect spacing gate.
#[derive(Debug, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Defer(Duration),
}

/// Enforces a minimum spacing between connection attempts so reconnect storms
/// never hammer the feed endpoint.
#[derive(Debug)]
pub struct AttemptGate {
    delay: Duration,
    last_attempt: Option<Instant>,
}

impl AttemptGate {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_attempt: None,
        }
    }

    /// Stamp and proceed, or report how long the caller must defer.
    pub fn check(&mut self, now: Instant) -> GateDecision {
        if let Some(last) = self.last_attempt {
            let elapsed = now.duration_since(last);
            if elapsed < self.delay {
                return GateDecision::Defer(self.delay - elapsed);
            }
        }
        self.last_attempt = Some(now);
        GateDecision::Proceed
    }

    /// Fresh user intent (e.g. the host came back online) clears the spacing.
    pub fn reset(&mut self) {
        self.last_attempt = None;
    }
}

/// Cloneable handle to a running [`ConnectionManager`] task.
#[derive(Clone)]
pub struct FeedHandle {
    commands: mpsc::UnboundedSender<FeedCommand>,
    state: watch::Receiver<ConnectionState>,
}

impl FeedHandle {
    pub fn connect(&self) {
        let _ = self.commands.send(FeedCommand::Connect);
    }

    pub fn disconnect(&self) {
        let _ = self.commands.send(FeedCommand::Disconnect);
    }

    pub fn went_online(&self) {
        let _ = self.commands.send(FeedCommand::WentOnline);
    }

    pub fn went_offline(&self) {
        let _ = self.commands.send(FeedCommand::WentOffline);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Stop the manager, closing any open socket and cancelling timers.
    pub fn shutdown(&self) {
        let _ = self.commands.send(FeedCommand::Shutdown);
    }
}

/// Owns the single live-feed connection: connect/reconnect state machine,
/// priority subscription selection, rate-limited reconnection, and
/// online/offline awareness. Commands and socket events are consumed by one
/// `select!` loop; the reconnect deadline is a single owned value, replaced on
/// every reschedule, never stacked.
pub struct ConnectionManager {
    config: FeedConfig,
    store: SharedStore,
    buffer: MessageBuffer,
    notices: NoticeSender,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    gate: AttemptGate,
    online: bool,
    reconnect_at: Option<Instant>,
    reader: Option<JoinHandle<()>>,
    events_tx: mpsc::UnboundedSender<SocketEvent>,
}

impl ConnectionManager {
    pub fn spawn(
        config: FeedConfig,
        store: SharedStore,
        buffer: MessageBuffer,
        notices: NoticeSender,
    ) -> (FeedHandle, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let gate = AttemptGate::new(config.reconnect_delay());
        let manager = Self {
            config,
            store,
            buffer,
            notices,
            state: ConnectionState::Disconnected,
            state_tx,
            gate,
            online: true,
            reconnect_at: None,
            reader: None,
            events_tx,
        };

        let task = tokio::spawn(manager.run(commands_rx, events_rx));
        let handle = FeedHandle {
            commands: commands_tx,
            state: state_rx,
        };
        (handle, task)
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<FeedCommand>,
        mut events: mpsc::UnboundedReceiver<SocketEvent>,
    ) {
        loop {
            let reconnect_at = self.reconnect_at;
            tokio::select! {
                command = commands.recv() => match command {
                    Some(FeedCommand::Connect) => self.try_connect(false).await,
                    Some(FeedCommand::Disconnect) => self.teardown(),
                    Some(FeedCommand::WentOnline) => {
                        self.online = true;
                        // Treated as fresh user intent: spacing does not apply.
                        self.try_connect(true).await;
                    }
                    Some(FeedCommand::WentOffline) => self.online = false,
                    Some(FeedCommand::Shutdown) | None => break,
                },
                event = events.recv() => {
                    if let Some(SocketEvent::Closed { clean }) = event {
                        self.handle_close(clean);
                    }
                }
                _ = async { tokio::time::sleep_until(reconnect_at.unwrap()).await },
                    if reconnect_at.is_some() =>
                {
                    self.reconnect_at = None;
                    self.try_connect(false).await;
                }
            }
        }
        self.teardown();
    }

    async fn try_connect(&mut self, user_intent: bool) {
        if self.state == ConnectionState::Connecting {
            return;
        }
        if user_intent {
            self.gate.reset();
        }
        match self.gate.check(Instant::now()) {
            GateDecision::Proceed => {}
            GateDecision::Defer(wait) => {
                log::debug!("connect attempted too soon, deferring {:?}", wait);
                self.reconnect_at = Some(Instant::now() + wait);
                return;
            }
        }

        self.set_state(ConnectionState::Connecting);
        // Any prior handle is torn down before a new attempt.
        self.abort_reader();

        let snapshot = self.store.snapshot();
        let subset = priority_subset(
            &snapshot.assets,
            &self.config.default_symbols,
            self.config.subscription_limit,
        );
        let asset_ids: Vec<String> = subset
            .iter()
            .filter_map(|a| a.id.as_deref())
            .map(|id| id.to_lowercase())
            .collect();

        if asset_ids.is_empty() {
            log::info!("no assets eligible for a live feed slot, skipping connect");
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        let url = format!("{}?assets={}", self.config.ws_url, asset_ids.join(","));
        log::info!("connecting live feed for {}", asset_ids.join(","));

        match connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                self.buffer.lock().unwrap().clear();
                self.set_state(ConnectionState::Connected);
                self.notices.success(
                    "Live updates connected",
                    format!("Receiving price updates for {} assets", subset.len()),
                );
                let buffer = Arc::clone(&self.buffer);
                let events = self.events_tx.clone();
                self.reader = Some(tokio::spawn(read_socket(socket, buffer, events)));
            }
            Err(err) => {
                log::warn!("live feed connection failed: {}", err);
                self.set_state(ConnectionState::Disconnected);
                self.notices.error(
                    "Live updates disconnected",
                    "Will attempt to reconnect shortly...",
                );
                // Escalated delay after a failed attempt, mirroring the
                // error-close path.
                self.reconnect_at = Some(Instant::now() + self.config.reconnect_delay() * 2);
            }
        }
    }

    fn handle_close(&mut self, clean: bool) {
        self.set_state(ConnectionState::Disconnected);
        self.abort_reader();

        if !self.online {
            log::info!("host offline; reconnect waits for the online signal");
            return;
        }

        let delay = if clean {
            self.config.reconnect_delay()
        } else {
            // The socket reached a definitively closed state via an error;
            // this is the one place a user-visible notification is emitted.
            self.notices.error(
                "Live updates disconnected",
                "Will attempt to reconnect shortly...",
            );
            self.config.reconnect_delay() * 2
        };
        log::info!("live feed closed (clean: {}), reconnecting in {:?}", clean, delay);
        self.reconnect_at = Some(Instant::now() + delay);
    }

    fn teardown(&mut self) {
        self.reconnect_at = None;
        self.abort_reader();
        self.set_state(ConnectionState::Disconnected);
    }

    fn abort_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        let _ = self.state_tx.send(state);
    }
}

/// Pushes every text frame into the buffer unprocessed so the delivery path
/// never blocks on parsing, then reports how the stream ended.
async fn read_socket(
    mut socket: WsStream,
    buffer: MessageBuffer,
    events: mpsc::UnboundedSender<SocketEvent>,
) {
    let clean = loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => buffer.lock().unwrap().push(text),
            Some(Ok(Message::Close(_))) | None => break true,
            Some(Ok(_)) => continue,
            Some(Err(err)) => {
                log::warn!("live feed socket error: {}", err);
                break false;
            }
        }
    };
    let _ = events.send(SocketEvent::Closed { clean });
}
