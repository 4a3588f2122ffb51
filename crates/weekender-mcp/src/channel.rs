//! The duplex message channel a [`Session`](crate::Session) speaks over.

use crate::error::TransportError;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`Channel`] operations.
pub type ChannelFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// A framed, ordered, bidirectional message stream to one server.
///
/// Messages are single JSON-RPC lines without the trailing newline. Dyn-compatible
/// so a session can run over a child process or an in-memory fake.
pub trait Channel: Send {
    /// Write one message to the server.
    fn send(&mut self, message: String) -> ChannelFuture<'_, ()>;

    /// Wait for the next message from the server.
    ///
    /// Returns `Ok(None)` once the server side has closed its output.
    /// Must be cancel safe: dropping the future loses no message.
    fn recv(&mut self) -> ChannelFuture<'_, Option<String>>;

    /// Close both halves. Sends after this fail with [`TransportError::Closed`].
    fn close(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}
