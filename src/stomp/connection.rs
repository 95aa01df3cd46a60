// STOMP connection management for the push channel
// Contains connect, the reconnect loop, publish and disconnect for StompTransport

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex as TokioMutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use super::frame::{decode_all, Frame};
use super::PushChannel;
use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::models::{ConnectionState, MessageDraft, UserId, WireMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const INBOUND_CAPACITY: usize = 100;
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a live connection ended
#[derive(Debug, PartialEq)]
enum Closed {
    Requested,
    Dropped,
}

/// One logical STOMP session per authenticated user, reconnecting forever
pub struct StompTransport {
    state_tx: Arc<watch::Sender<ConnectionState>>,
    state_rx: watch::Receiver<ConnectionState>,
    outbound: mpsc::UnboundedSender<Frame>,
    shutdown: watch::Sender<bool>,
    supervisor: TokioMutex<Option<JoinHandle<()>>>,
    send_destination: String,
}

/// State owned by the supervisor task
struct Link {
    config: ChatConfig,
    user: UserId,
    token: String,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    inbound_tx: mpsc::Sender<WireMessage>,
    outbound_rx: mpsc::UnboundedReceiver<Frame>,
    shutdown_rx: watch::Receiver<bool>,
}

impl StompTransport {
    /// Start the connection loop. Must be called from within a tokio runtime.
    pub fn connect(config: &ChatConfig, user: UserId, token: &str) -> (Self, mpsc::Receiver<WireMessage>) {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let state_tx = Arc::new(state_tx);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let link = Link {
            config: config.clone(),
            user,
            token: token.to_string(),
            state_tx: state_tx.clone(),
            inbound_tx,
            outbound_rx,
            shutdown_rx,
        };
        let handle = tokio::spawn(link.supervise());

        (
            StompTransport {
                state_tx,
                state_rx,
                outbound,
                shutdown,
                supervisor: TokioMutex::new(Some(handle)),
                send_destination: config.send_destination.clone(),
            },
            inbound_rx,
        )
    }
}

#[async_trait]
impl PushChannel for StompTransport {
    fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    fn publish(&self, draft: &MessageDraft) -> crate::error::Result<()> {
        if self.state() != ConnectionState::Connected {
            return Err(ChatError::NotConnected);
        }
        let json = serde_json::to_string(draft)?;
        self.outbound
            .send(Frame::send(&self.send_destination, json))
            .map_err(|_| ChatError::TransportClosed)
    }

    async fn disconnect(&self) {
        info!("Disconnecting push channel");
        let _ = self.shutdown.send(true);
        let handle = self.supervisor.lock().await.take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(DISCONNECT_TIMEOUT, &mut handle).await.is_err() {
                warn!("Push channel did not shut down within {:?}, aborting", DISCONNECT_TIMEOUT);
                handle.abort();
                self.state_tx.send_replace(ConnectionState::Disconnected);
            }
        }
    }
}

impl Link {
    fn set_state(&self, next: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            debug!("Push channel state -> {:?}", next);
        }
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    async fn supervise(mut self) {
        let delay = self.config.reconnect_delay();
        loop {
            if self.shutdown_requested() {
                break;
            }
            self.set_state(ConnectionState::Connecting);
            match self.run_once().await {
                Ok(Closed::Requested) => break,
                Ok(Closed::Dropped) => warn!("Push channel dropped, reconnecting in {:?}", delay),
                Err(e) => warn!("Push channel failed: {}, reconnecting in {:?}", e, delay),
            }
            self.set_state(ConnectionState::Disconnected);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown_rx.changed() => break,
            }
        }
        self.set_state(ConnectionState::Disconnected);
        info!("Push channel stopped");
    }

    async fn run_once(&mut self) -> Result<Closed> {
        // Shutdown wins over a connect or handshake still in progress
        let mut ws = tokio::select! {
            opened = Self::open(&self.config, &self.token, self.user) => opened?,
            _ = self.shutdown_rx.changed() => {
                debug!("Shutdown requested while connecting");
                return Ok(Closed::Requested);
            }
        };

        self.discard_stale_outbound();
        self.set_state(ConnectionState::Connected);
        info!("Push channel connected, subscribed to {}", self.config.inbox_for(self.user));

        loop {
            tokio::select! {
                incoming = ws.next() => match incoming {
                    Some(Ok(WsMessage::Text(text))) => handle_payload(&self.inbound_tx, text.as_str()).await?,
                    Some(Ok(WsMessage::Close(frame))) => {
                        debug!("Server closed the socket: {:?}", frame);
                        return Ok(Closed::Dropped);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(anyhow!("WebSocket error: {}", e)),
                    None => return Ok(Closed::Dropped),
                },
                Some(frame) = self.outbound_rx.recv() => {
                    ws.send(WsMessage::text(frame.encode()))
                        .await
                        .map_err(|e| anyhow!("Failed to publish frame: {}", e))?;
                }
                _ = self.shutdown_rx.changed() => {
                    Self::close(ws).await;
                    return Ok(Closed::Requested);
                }
            }
        }
    }

    /// WebSocket connect, CONNECT/CONNECTED handshake and inbox SUBSCRIBE
    async fn open(config: &ChatConfig, token: &str, user: UserId) -> Result<WsStream> {
        let url = config.ws_url.as_str();
        let timeout = config.handshake_timeout();
        info!("Connecting to {}", url);

        let (mut ws, _response) = tokio::time::timeout(timeout, connect_async(url))
            .await
            .map_err(|_| anyhow!("Timed out opening {}", url))?
            .map_err(|e| anyhow!("WebSocket connect to {} failed: {}", url, e))?;

        let connect = Frame::connect(&config.stomp_host(), token);
        ws.send(WsMessage::text(connect.encode()))
            .await
            .map_err(|e| anyhow!("Failed to send CONNECT: {}", e))?;

        tokio::time::timeout(timeout, Self::await_connected(&mut ws))
            .await
            .map_err(|_| anyhow!("STOMP handshake timed out after {:?}", timeout))??;

        let inbox = config.inbox_for(user);
        let subscribe = Frame::subscribe(&format!("sub-{}", user), &inbox);
        ws.send(WsMessage::text(subscribe.encode()))
            .await
            .map_err(|e| anyhow!("Failed to subscribe to {}: {}", inbox, e))?;

        Ok(ws)
    }

    async fn await_connected(ws: &mut WsStream) -> Result<()> {
        while let Some(incoming) = ws.next().await {
            let text = match incoming {
                Ok(WsMessage::Text(text)) => text,
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => return Err(anyhow!("WebSocket error during handshake: {}", e)),
            };
            for frame in decode_all(text.as_str())? {
                match frame.command.as_str() {
                    "CONNECTED" => {
                        debug!("STOMP session established (version {:?})", frame.get("version"));
                        return Ok(());
                    }
                    "ERROR" => {
                        let reason = frame.get("message").unwrap_or("no reason given");
                        return Err(anyhow!("Broker rejected CONNECT: {}", reason));
                    }
                    other => debug!("Ignoring {} frame during handshake", other),
                }
            }
        }
        Err(anyhow!("Socket closed during STOMP handshake"))
    }

    /// Frames queued while the previous connection was dying are not replayed
    fn discard_stale_outbound(&mut self) {
        let mut dropped = 0;
        while self.outbound_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!("Discarded {} frame(s) queued before reconnect", dropped);
        }
    }

    async fn close(mut ws: WsStream) {
        let receipt = Uuid::new_v4().to_string();
        if let Err(e) = ws.send(WsMessage::text(Frame::disconnect(&receipt).encode())).await {
            warn!("Failed to send DISCONNECT: {}", e);
        }
        if let Err(e) = ws.close(None).await {
            debug!("Error closing socket: {}", e);
        }
    }
}

async fn handle_payload(inbound_tx: &mpsc::Sender<WireMessage>, payload: &str) -> Result<()> {
    let frames = match decode_all(payload) {
        Ok(frames) => frames,
        Err(e) => {
            warn!("Skipping undecodable STOMP payload: {}", e);
            return Ok(());
        }
    };

    for frame in frames {
        match frame.command.as_str() {
            "MESSAGE" => match serde_json::from_str::<WireMessage>(&frame.body) {
                Ok(message) => {
                    if inbound_tx.send(message).await.is_err() {
                        debug!("Inbound receiver gone, dropping pushed message");
                    }
                }
                Err(e) => warn!("Skipping MESSAGE with invalid body: {}", e),
            },
            "ERROR" => {
                let reason = frame.get("message").unwrap_or("no reason given");
                error!("Broker sent ERROR: {}", reason);
                return Err(anyhow!("Broker error: {}", reason));
            }
            "RECEIPT" => debug!("Receipt {:?}", frame.get("receipt-id")),
            other => debug!("Ignoring {} frame", other),
        }
    }
    Ok(())
}
