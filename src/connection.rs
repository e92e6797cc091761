#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::sync::Arc;

use backoff::backoff::Backoff as _;
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::config::Config;
use crate::handler::ConnectionHandler;
use crate::{Result, error::Error, error::WsError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Readiness of the managed connection, mirroring the transport lifecycle.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// A connection attempt is in flight, or the manager is waiting out a
    /// retry delay with no live socket. The source behavior left the
    /// no-socket gap unspecified; reporting `Connecting` here is a
    /// deliberate deviation.
    Connecting,
    /// The connection is established and payloads can be sent
    Open,
    /// The server initiated a close that has not yet completed
    Closing,
    /// No connection, and none in flight
    Closed,
}

impl ReadyState {
    /// Check if payloads can currently be sent.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Why an established connection stopped being driven.
enum Disconnect {
    /// The server closed the connection or the transport failed
    Lost,
    /// [`ConnectionManager::close`] was called, or every manager handle
    /// was dropped
    ShuttingDown,
}

/// Manages a WebSocket connection's lifecycle and reconnection.
///
/// The manager dials the endpoint as soon as it is constructed and owns at
/// most one socket at a time. When the connection is lost, for any reason,
/// it waits out an exponentially growing delay (see [`Config`]) and dials
/// again, forever by default. A successful connection resets the delay.
/// Lifecycle events and inbound payloads are delivered to the caller's
/// [`ConnectionHandler`].
///
/// Cloning the manager produces another handle to the same connection.
///
/// # Example
///
/// ```ignore
/// let manager = ConnectionManager::new(
///     "wss://rt.example.com:9090/".to_owned(),
///     Config::default(),
///     MyHandler,
/// )?;
///
/// manager.send(payload)?;
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    /// Watch channel sender for readiness changes (enables `state_receiver`)
    state_tx: watch::Sender<ReadyState>,
    /// Watch channel receiver for checking the current readiness
    state_rx: watch::Receiver<ReadyState>,
    /// Sender channel for outgoing payloads
    sender_tx: mpsc::UnboundedSender<Bytes>,
    /// Holds the current handler; replaced whole on `set_handler`
    handler_tx: watch::Sender<Arc<dyn ConnectionHandler>>,
    /// Signals the connection loop to stop retrying
    shutdown_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &*self.state_rx.borrow())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a new connection manager and start connecting.
    ///
    /// The first connection attempt begins immediately on a background
    /// task. Construction only fails on an invalid endpoint; connection
    /// failures surface later through the handler's `on_error` and the
    /// retry loop.
    pub fn new<H>(endpoint: String, config: Config, handler: H) -> Result<Self>
    where
        H: ConnectionHandler,
    {
        let parsed = Url::parse(&endpoint)?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(Error::validation(format!(
                "endpoint must use a ws or wss scheme, got {}",
                parsed.scheme()
            )));
        }

        let (sender_tx, sender_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ReadyState::Connecting);
        let (handler_tx, handler_rx) =
            watch::channel(Arc::new(handler) as Arc<dyn ConnectionHandler>);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let state_tx_clone = state_tx.clone();

        tokio::spawn(async move {
            Self::connection_loop(
                endpoint,
                config,
                sender_rx,
                handler_rx,
                state_tx_clone,
                shutdown_rx,
            )
            .await;
        });

        Ok(Self {
            state_tx,
            state_rx,
            sender_tx,
            handler_tx,
            shutdown_tx,
        })
    }

    /// Main connection loop with automatic reconnection.
    async fn connection_loop(
        endpoint: String,
        config: Config,
        mut sender_rx: mpsc::UnboundedReceiver<Bytes>,
        handler_rx: watch::Receiver<Arc<dyn ConnectionHandler>>,
        state_tx: watch::Sender<ReadyState>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut attempt = 0_u32;
        let mut backoff: backoff::ExponentialBackoff = config.clone().into();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            _ = state_tx.send(ReadyState::Connecting);

            let connected = tokio::select! {
                res = connect_async(&endpoint) => res,
                _ = shutdown_rx.changed() => break,
            };

            match connected {
                Ok((ws_stream, _)) => {
                    attempt = 0;
                    backoff.reset();
                    _ = state_tx.send(ReadyState::Open);
                    Self::current_handler(&handler_rx).on_open();

                    let disconnect = Self::drive_connection(
                        ws_stream,
                        &mut sender_rx,
                        &handler_rx,
                        &state_tx,
                        &mut shutdown_rx,
                    )
                    .await;

                    if matches!(disconnect, Disconnect::ShuttingDown) {
                        break;
                    }
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(%endpoint, error = %e, "Unable to connect");
                    attempt = attempt.saturating_add(1);
                    Self::current_handler(&handler_rx).on_error(WsError::Connection(e));
                }
            }

            _ = state_tx.send(ReadyState::Closed);

            // Payloads accepted while the socket was up but never written are
            // dropped here, not replayed on the next connection.
            while sender_rx.try_recv().is_ok() {}

            // Check if we should stop reconnecting
            if let Some(max) = config.max_attempts
                && attempt >= max
            {
                break;
            }

            // Wait with exponential backoff. The delay for this retry is the
            // pre-doubling interval; next_backoff grows it afterwards.
            if let Some(delay) = backoff.next_backoff() {
                #[cfg(feature = "tracing")]
                tracing::debug!(?delay, attempt, "Scheduling reconnect");
                _ = state_tx.send(ReadyState::Connecting);
                tokio::select! {
                    () = sleep(delay) => {}
                    _ = shutdown_rx.changed() => break,
                }
            }
        }

        _ = state_tx.send(ReadyState::Closed);
    }

    /// Drive an established connection until it is lost or shut down.
    async fn drive_connection(
        ws_stream: WsStream,
        sender_rx: &mut mpsc::UnboundedReceiver<Bytes>,
        handler_rx: &watch::Receiver<Arc<dyn ConnectionHandler>>,
        state_tx: &watch::Sender<ReadyState>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Disconnect {
        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                // Inbound frames
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Binary(payload))) => {
                            Self::current_handler(handler_rx).on_message(payload);
                        }
                        Some(Ok(Message::Text(text))) => {
                            // Binary-mode transport; text frames are passed
                            // through as their raw bytes.
                            Self::current_handler(handler_rx).on_message(Bytes::from(text));
                        }
                        Some(Ok(Message::Close(_))) => {
                            _ = state_tx.send(ReadyState::Closing);
                            return Disconnect::Lost;
                        }
                        Some(Ok(_)) => {
                            // PING/PONG frames are answered by the transport.
                        }
                        Some(Err(e)) => {
                            Self::current_handler(handler_rx).on_error(WsError::Connection(e));
                            return Disconnect::Lost;
                        }
                        None => return Disconnect::Lost,
                    }
                }

                // Outbound payloads from `send`
                Some(payload) = sender_rx.recv() => {
                    if let Err(e) = write.send(Message::Binary(payload)).await {
                        Self::current_handler(handler_rx).on_error(WsError::Connection(e));
                        return Disconnect::Lost;
                    }
                }

                // Shutdown requested, or every manager handle dropped
                res = shutdown_rx.changed() => {
                    if res.is_err() || *shutdown_rx.borrow() {
                        _ = write.send(Message::Close(None)).await;
                        return Disconnect::ShuttingDown;
                    }
                }
            }
        }
    }

    /// Snapshot the current handler without holding the watch lock across
    /// the callback.
    fn current_handler(
        handler_rx: &watch::Receiver<Arc<dyn ConnectionHandler>>,
    ) -> Arc<dyn ConnectionHandler> {
        handler_rx.borrow().clone()
    }

    /// Send a binary payload over the connection.
    ///
    /// The connection must currently be open; nothing is buffered while
    /// disconnected, and a send during a reconnection gap is rejected with
    /// [`WsError::NotOpen`]. Delivery is asynchronous and best-effort.
    pub fn send<P: Into<Bytes>>(&self, payload: P) -> Result<()> {
        if !self.state_rx.borrow().is_open() {
            return Err(WsError::NotOpen.into());
        }
        self.sender_tx
            .send(payload.into())
            .map_err(|_e| WsError::ConnectionClosed)?;
        Ok(())
    }

    /// Get the current readiness of the connection.
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        *self.state_rx.borrow()
    }

    /// Replace the event handler.
    ///
    /// Last write wins; the new handler takes effect on the next event
    /// delivered by the connection.
    pub fn set_handler<H: ConnectionHandler>(&self, handler: H) {
        _ = self.handler_tx.send(Arc::new(handler));
    }

    /// Subscribe to readiness changes.
    ///
    /// Returns a receiver that notifies on every transition, useful for
    /// awaiting the first open or detecting reconnections.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ReadyState> {
        self.state_tx.subscribe()
    }

    /// Stop reconnecting and close any live connection.
    ///
    /// Without this call the manager retries forever. After `close` the
    /// readiness settles at [`ReadyState::Closed`] and subsequent sends
    /// fail. Closing an already-closed manager is a no-op.
    pub fn close(&self) {
        _ = self.shutdown_tx.send(true);
    }
}
