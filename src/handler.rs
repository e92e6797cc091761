//! Caller-facing observer for connection lifecycle events.

use tokio_tungstenite::tungstenite::Bytes;

use crate::error::WsError;

/// Observer for events delivered by a [`ConnectionManager`].
///
/// Every method defaults to a no-op, so implementors only override the
/// events they care about. Callbacks run on the connection task, in the
/// order the transport delivers the underlying events; a slow callback
/// delays subsequent events rather than reordering them.
///
/// # Example
///
/// ```ignore
/// struct Printer;
///
/// impl ConnectionHandler for Printer {
///     fn on_message(&self, payload: Bytes) {
///         println!("received {} bytes", payload.len());
///     }
/// }
/// ```
///
/// [`ConnectionManager`]: crate::connection::ConnectionManager
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Called once each time a connection is successfully established,
    /// including after a reconnect.
    fn on_open(&self) {}

    /// Called with each inbound payload, unmodified, in arrival order.
    fn on_message(&self, _payload: Bytes) {}

    /// Called with each transport error. Errors never transition the
    /// connection state by themselves; the close that typically follows
    /// drives the retry.
    fn on_error(&self, _error: WsError) {}
}

/// Handler that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl ConnectionHandler for NoopHandler {}
