use std::sync::Arc;

use realtime_channel::{ChannelEvent, RealtimeChannel};
use shared::domain::ConnectionStatus;
use tokio::{
    sync::{broadcast::error::RecvError, watch},
    task::JoinHandle,
};
use tracing::{info, warn};

/// Next status after `event`. Upgrades only rename the transport of a live
/// connection.
pub fn apply_channel_event(current: &ConnectionStatus, event: &ChannelEvent) -> ConnectionStatus {
    match event {
        ChannelEvent::Connect { transport } => ConnectionStatus::connected(transport.clone()),
        ChannelEvent::Upgrade { transport } if current.connected => {
            ConnectionStatus::connected(transport.clone())
        }
        ChannelEvent::Upgrade { .. } => current.clone(),
        ChannelEvent::Disconnect { .. } => ConnectionStatus::disconnected(),
    }
}

fn status_of(channel: &dyn RealtimeChannel) -> ConnectionStatus {
    channel
        .current_transport()
        .map(ConnectionStatus::connected)
        .unwrap_or_default()
}

/// Mirrors a channel's lifecycle into a [`ConnectionStatus`].
///
/// The event pump is aborted when the observer drops, so each mount holds
/// exactly one subscription. Must be created inside a Tokio runtime.
pub struct ConnectionObserver {
    status: watch::Receiver<ConnectionStatus>,
    pump: JoinHandle<()>,
}

impl ConnectionObserver {
    pub fn subscribe(channel: Arc<dyn RealtimeChannel>) -> Self {
        // Register before sampling so nothing between the two is lost.
        let mut events = channel.subscribe_events();
        let initial = status_of(channel.as_ref());
        if initial.connected {
            info!(transport = %initial.transport, "connection: already connected at subscribe");
        }
        let (tx, status) = watch::channel(initial);

        let pump = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        tx.send_if_modified(|current| {
                            let next = apply_channel_event(current, &event);
                            if next == *current {
                                return false;
                            }
                            info!(
                                connected = next.connected,
                                transport = %next.transport,
                                "connection: status changed"
                            );
                            *current = next;
                            true
                        });
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "connection: observer lagged, resyncing from channel");
                        // Drop the retained backlog; it predates the resync.
                        events = events.resubscribe();
                        tx.send_replace(status_of(channel.as_ref()));
                    }
                    Err(RecvError::Closed) => {
                        tx.send_replace(ConnectionStatus::disconnected());
                        break;
                    }
                }
            }
        });

        Self { status, pump }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    pub fn unsubscribe(self) {}
}

impl Drop for ConnectionObserver {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

#[cfg(test)]
#[path = "tests/connection_tests.rs"]
mod tests;
