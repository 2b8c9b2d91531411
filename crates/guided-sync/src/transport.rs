use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use guided_types::events::{GatewayCommand, GatewayEvent};

use crate::error::ConnectError;

/// An open gateway link: frames go out on `outgoing`, arrive on `incoming`.
///
/// Dropping `outgoing` closes the link from our side. `incoming` yields
/// `None` once the peer is gone.
pub struct Link {
    pub outgoing: mpsc::UnboundedSender<GatewayCommand>,
    pub incoming: mpsc::UnboundedReceiver<GatewayEvent>,
}

/// Opens gateway links. The connection manager owns the only instance.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Link, ConnectError>;
}

/// Gateway over a WebSocket carrying JSON text frames.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Link, ConnectError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
        let (mut sink, mut stream) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<GatewayCommand>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<GatewayEvent>();

        // Writer: commands -> socket. Ends when the manager drops its sender.
        tokio::spawn(async move {
            while let Some(cmd) = out_rx.recv().await {
                let text = match serde_json::to_string(&cmd) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to encode gateway command: {}", e);
                        continue;
                    }
                };
                trace!("-> {}", text);
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
            debug!("gateway writer finished");
        });

        // Reader: socket -> events. Ends on close, error, or when nobody listens.
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        trace!("<- {}", text.as_str());
                        match serde_json::from_str::<GatewayEvent>(&text) {
                            Ok(event) => {
                                if in_tx.send(event).is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(
                                    "Skipping unrecognized gateway frame: {} -- raw: {}",
                                    e,
                                    text.chars().take(200).collect::<String>()
                                );
                            }
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Gateway socket error: {}", e);
                        break;
                    }
                }
            }
            debug!("gateway reader finished");
        });

        Ok(Link {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}
