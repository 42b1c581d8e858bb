//! Transport seam between the connection manager and the wire.

use async_trait::async_trait;
use hub_core::Notification;

use crate::StreamResult;

/// Opens authenticated push links.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Perform the handshake with `token` and return the live link.
    ///
    /// The manager bounds this call with its connect timeout.
    async fn connect(&self, token: &str) -> StreamResult<Box<dyn PushLink>>;
}

/// One live push connection.
#[async_trait]
pub trait PushLink: Send {
    /// Wait for the next notification.
    ///
    /// Returns `Ok(None)` once the peer closed the link. Must be cancel safe:
    /// the manager drops this future whenever another event wins the race.
    async fn next_notification(&mut self) -> StreamResult<Option<Notification>>;

    /// Close the link. Errors are not reported; the link is gone either way.
    async fn close(&mut self);
}
