use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use realtime_channel::{ChannelEvent, RealtimeChannel};
use tokio::{
    sync::{broadcast, oneshot, watch, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};

const WEBSOCKET_TRANSPORT: &str = "websocket";
const EVENT_BUFFER: usize = 64;

/// Maps an `http(s)://` server url onto its `ws(s)://` counterpart.
pub fn ws_url_for(server_url: &str) -> Result<String> {
    let ws_url = if server_url.starts_with("https://") {
        server_url.replacen("https://", "wss://", 1)
    } else if server_url.starts_with("http://") {
        server_url.replacen("http://", "ws://", 1)
    } else {
        return Err(anyhow!("server_url must start with http:// or https://"));
    };
    Ok(format!("{}/ws", ws_url.trim_end_matches('/')))
}

/// Real-time channel over a single WebSocket connection. Inbound frames are
/// drained but not interpreted; only the lifecycle is surfaced.
pub struct WebSocketChannel {
    transport: Arc<watch::Sender<Option<String>>>,
    events: broadcast::Sender<ChannelEvent>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketChannel {
    pub async fn connect(ws_url: &str) -> Result<Arc<Self>> {
        let (ws_stream, _) = connect_async(ws_url)
            .await
            .with_context(|| format!("failed to connect websocket: {ws_url}"))?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        let channel = Arc::new(Self {
            transport: Arc::new(watch::Sender::new(Some(WEBSOCKET_TRANSPORT.to_string()))),
            events,
            shutdown: Mutex::new(Some(shutdown_tx)),
            reader: Mutex::new(None),
        });
        info!(ws_url, "channel: websocket connected");
        let _ = channel.events.send(ChannelEvent::Connect {
            transport: WEBSOCKET_TRANSPORT.to_string(),
        });

        let transport = Arc::clone(&channel.transport);
        let events = channel.events.clone();
        let reader = tokio::spawn(async move {
            let reason = loop {
                tokio::select! {
                    msg = ws_reader.next() => match msg {
                        Some(Ok(Message::Close(_))) | None => break "transport close".to_string(),
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            warn!(error = %err, "channel: websocket receive failed");
                            break format!("transport error: {err}");
                        }
                    },
                    _ = &mut shutdown_rx => {
                        let _ = ws_writer.send(Message::Close(None)).await;
                        break "io client disconnect".to_string();
                    }
                }
            };
            transport.send_replace(None);
            info!(reason = %reason, "channel: websocket disconnected");
            let _ = events.send(ChannelEvent::Disconnect { reason });
        });
        *channel.reader.lock().await = Some(reader);

        Ok(channel)
    }
}

#[async_trait]
impl RealtimeChannel for WebSocketChannel {
    fn current_transport(&self) -> Option<String> {
        self.transport.borrow().clone()
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    async fn close(&self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.lock().await.take() {
            let _ = shutdown.send(());
        }
        if let Some(reader) = self.reader.lock().await.take() {
            reader.await.context("websocket reader task failed")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/websocket_tests.rs"]
mod tests;
