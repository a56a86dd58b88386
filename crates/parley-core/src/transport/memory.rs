//! In-process transport.
//!
//! Each `open` call becomes a [`PendingAttempt`] that the owner of the
//! connector accepts or rejects, which lets tests (and embedders running the
//! server in the same process) control exactly when a connection settles.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::{Mutex, mpsc, oneshot};
use url::Url;

use super::{Connector, TransportEvent, TransportLink};
use crate::errors::ParleyError;
use crate::protocol::{ClientIntent, ServerPush};

#[derive(Clone)]
pub struct MemoryConnector {
    attempts_tx: mpsc::UnboundedSender<PendingAttempt>,
    attempts_rx: Arc<Mutex<mpsc::UnboundedReceiver<PendingAttempt>>>,
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConnector {
    pub fn new() -> Self {
        let (attempts_tx, attempts_rx) = mpsc::unbounded_channel();
        Self {
            attempts_tx,
            attempts_rx: Arc::new(Mutex::new(attempts_rx)),
        }
    }

    /// Wait for the next connection attempt.
    pub async fn next_attempt(&self) -> Option<PendingAttempt> {
        self.attempts_rx.lock().await.recv().await
    }

    /// Non-blocking variant of [`next_attempt`](Self::next_attempt).
    pub async fn try_next_attempt(&self) -> Option<PendingAttempt> {
        self.attempts_rx.lock().await.try_recv().ok()
    }

    /// Wait for the next attempt and accept it.
    pub async fn accept(&self) -> Option<MemoryServer> {
        Some(self.next_attempt().await?.accept())
    }
}

impl Connector for MemoryConnector {
    fn open(&self, endpoint: Url) -> BoxFuture<'static, Result<TransportLink, ParleyError>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let queued = self
            .attempts_tx
            .send(PendingAttempt {
                endpoint,
                reply: reply_tx,
            })
            .is_ok();
        Box::pin(async move {
            if !queued {
                return Err(ParleyError::Connection("memory connector closed".into()));
            }
            reply_rx
                .await
                .map_err(|_| ParleyError::Connection("connection attempt abandoned".into()))?
        })
    }
}

/// A connection attempt waiting for the server side to decide.
pub struct PendingAttempt {
    endpoint: Url,
    reply: oneshot::Sender<Result<TransportLink, ParleyError>>,
}

impl PendingAttempt {
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The identity the client authenticated with.
    pub fn identity(&self) -> Option<String> {
        self.endpoint
            .query_pairs()
            .find(|(k, _)| k == "username")
            .map(|(_, v)| v.into_owned())
    }

    pub fn accept(self) -> MemoryServer {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let link = TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        };
        if self.reply.send(Ok(link)).is_err() {
            tracing::debug!("memory client gave up before accept");
        }
        MemoryServer {
            endpoint: self.endpoint,
            from_client: out_rx,
            to_client: in_tx,
        }
    }

    /// Refuse the connection, as a server rejecting authentication would.
    pub fn reject(self, reason: impl Into<String>) {
        let _ = self
            .reply
            .send(Err(ParleyError::Connection(reason.into())));
    }
}

/// Server end of an accepted in-memory connection.
pub struct MemoryServer {
    endpoint: Url,
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<TransportEvent>,
}

impl MemoryServer {
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Push an event to the client. Returns false once the client is gone.
    pub fn push(&self, push: &ServerPush) -> bool {
        match push.to_frame() {
            Ok(frame) => self.push_raw(frame),
            Err(e) => {
                tracing::warn!("memory server could not encode push: {e}");
                false
            }
        }
    }

    pub fn push_raw(&self, frame: impl Into<String>) -> bool {
        self.to_client.send(TransportEvent::Frame(frame.into())).is_ok()
    }

    /// Drop the connection from the server side.
    pub fn close(&self, reason: Option<String>) -> bool {
        self.to_client.send(TransportEvent::Closed { reason }).is_ok()
    }

    /// True once the client dropped its end of the link.
    pub fn is_closed(&self) -> bool {
        self.to_client.is_closed()
    }

    /// Next raw frame from the client, `None` once the client hung up.
    pub async fn next_frame(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next decodable intent from the client, `None` once the client hung up.
    pub async fn next_intent(&mut self) -> Option<ClientIntent> {
        while let Some(frame) = self.from_client.recv().await {
            match ClientIntent::from_frame(&frame) {
                Ok(intent) => return Some(intent),
                Err(e) => tracing::warn!("memory server skipped frame: {e}"),
            }
        }
        None
    }

    /// An intent already sent by the client, without waiting.
    pub fn try_next_intent(&mut self) -> Option<ClientIntent> {
        while let Ok(frame) = self.from_client.try_recv() {
            match ClientIntent::from_frame(&frame) {
                Ok(intent) => return Some(intent),
                Err(e) => tracing::warn!("memory server skipped frame: {e}"),
            }
        }
        None
    }
}
