use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{
    self, Message,
    protocol::{CloseFrame, frame::coding::CloseCode},
};
use url::Url;

use super::{Connector, TransportEvent, TransportLink};
use crate::errors::ParleyError;

/// Opens text-frame WebSocket connections with tokio-tungstenite.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(&self, endpoint: Url) -> BoxFuture<'static, Result<TransportLink, ParleyError>> {
        Box::pin(async move {
            tracing::info!("opening websocket to {}", endpoint.host_str().unwrap_or_default());

            let (stream, _response) = tokio_tungstenite::connect_async(endpoint.as_str())
                .await
                .map_err(map_connect_error)?;
            let (mut sink, mut source) = stream.split();

            let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
            let (in_tx, in_rx) = mpsc::unbounded_channel();

            tokio::spawn(async move {
                while let Some(frame) = out_rx.recv().await {
                    if let Err(e) = sink.send(Message::text(frame)).await {
                        tracing::warn!("websocket write failed: {e}");
                        return;
                    }
                }
                // Link dropped by the session: close politely.
                if let Err(e) = sink.close().await {
                    tracing::debug!("websocket close: {e}");
                }
                tracing::debug!("websocket writer ended");
            });

            tokio::spawn(async move {
                let reason = loop {
                    match source.next().await {
                        Some(Ok(Message::Text(text))) => {
                            if in_tx.send(TransportEvent::Frame(text.to_string())).is_err() {
                                return;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => break close_reason(frame),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => break Some(e.to_string()),
                        None => break Some("connection lost".to_string()),
                    }
                };
                let _ = in_tx.send(TransportEvent::Closed { reason });
                tracing::debug!("websocket reader ended");
            });

            Ok(TransportLink {
                outbound: out_tx,
                inbound: in_rx,
            })
        })
    }
}

fn map_connect_error(e: tungstenite::Error) -> ParleyError {
    match e {
        tungstenite::Error::Http(response) => ParleyError::Connection(format!(
            "server rejected connection: {}",
            response.status()
        )),
        other => ParleyError::Connection(other.to_string()),
    }
}

fn close_reason(frame: Option<CloseFrame>) -> Option<String> {
    match frame {
        Some(frame) if frame.code != CloseCode::Normal => Some(format!(
            "closed by server ({}): {}",
            u16::from(frame.code),
            frame.reason.as_str()
        )),
        _ => None,
    }
}
