//! Transport seam between the session and the network.
//!
//! A [`Connector`] opens a [`TransportLink`]: a pair of channels carrying
//! text frames out and [`TransportEvent`]s in. Dropping the link closes the
//! underlying connection.

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use url::Url;

use crate::errors::ParleyError;

pub mod memory;
pub mod ws;

pub use memory::{MemoryConnector, MemoryServer, PendingAttempt};
pub use ws::WsConnector;

/// Something the transport observed on the inbound side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One text frame from the server.
    Frame(String),
    /// The connection ended. `reason` is set for abnormal closes.
    Closed { reason: Option<String> },
}

/// An open connection.
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens connections to a server endpoint.
///
/// The endpoint already carries the identity query parameter. The returned
/// future resolves once the connection is usable, or with a `Connection`
/// error (including authentication rejection).
pub trait Connector: Send + Sync + 'static {
    fn open(&self, endpoint: Url) -> BoxFuture<'static, Result<TransportLink, ParleyError>>;
}
