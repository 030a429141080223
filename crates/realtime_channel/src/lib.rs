//! Lifecycle surface of the page's real-time channel.
//!
//! The channel itself (framing, reconnects, rooms) belongs to whoever owns the
//! connection. Consumers only see lifecycle events and the current transport.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::debug;

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ChannelEvent {
    Connect { transport: String },
    /// Transport swapped while the channel stays connected.
    Upgrade { transport: String },
    Disconnect { reason: String },
}

#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Name of the active transport, `None` while disconnected.
    fn current_transport(&self) -> Option<String>;

    fn is_connected(&self) -> bool {
        self.current_transport().is_some()
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ChannelEvent>;

    async fn close(&self) -> anyhow::Result<()>;
}

/// In-process channel driven by explicit calls. Used when no server channel
/// is configured and as the fake in tests.
pub struct LoopbackChannel {
    transport: watch::Sender<Option<String>>,
    events: broadcast::Sender<ChannelEvent>,
}

impl LoopbackChannel {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            transport: watch::Sender::new(None),
            events,
        }
    }

    pub fn connected(transport: impl Into<String>) -> Self {
        let channel = Self::new();
        channel.connect(transport);
        channel
    }

    pub fn connect(&self, transport: impl Into<String>) {
        let transport = transport.into();
        debug!(transport = %transport, "channel: connect");
        // State first, then the event: a subscriber that registers between the
        // two still reads the new state.
        self.transport.send_replace(Some(transport.clone()));
        let _ = self.events.send(ChannelEvent::Connect { transport });
    }

    /// Returns `false` (and emits nothing) while disconnected.
    pub fn upgrade(&self, transport: impl Into<String>) -> bool {
        let transport = transport.into();
        let upgraded = self.transport.send_if_modified(|current| match current {
            Some(active) => {
                *active = transport.clone();
                true
            }
            None => false,
        });
        if upgraded {
            debug!(transport = %transport, "channel: upgrade");
            let _ = self.events.send(ChannelEvent::Upgrade { transport });
        }
        upgraded
    }

    pub fn disconnect(&self, reason: impl Into<String>) {
        if self.transport.send_replace(None).is_none() {
            return;
        }
        let reason = reason.into();
        debug!(reason = %reason, "channel: disconnect");
        let _ = self.events.send(ChannelEvent::Disconnect { reason });
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }
}

impl Default for LoopbackChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealtimeChannel for LoopbackChannel {
    fn current_transport(&self) -> Option<String> {
        self.transport.borrow().clone()
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.disconnect("io client disconnect");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
