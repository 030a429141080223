use std::{sync::Mutex, time::Duration};

use async_trait::async_trait;
use realtime_channel::LoopbackChannel;
use tokio::sync::broadcast;

use super::*;

async fn wait_for_status(
    observer: &ConnectionObserver,
    predicate: impl FnMut(&ConnectionStatus) -> bool,
) -> ConnectionStatus {
    let mut rx = observer.watch();
    let status = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(predicate))
        .await
        .expect("status change timed out")
        .expect("observer dropped")
        .clone();
    status
}

async fn wait_for_subscribers(channel: &LoopbackChannel, expected: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while channel.subscriber_count() != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("subscriber count timed out");
}

/// Channel whose reported transport and event stream are driven separately,
/// so the backlog can disagree with the current state.
struct SplitChannel {
    transport: Mutex<Option<String>>,
    events: broadcast::Sender<ChannelEvent>,
}

impl SplitChannel {
    fn new(transport: &str, buffer: usize) -> Self {
        let (events, _) = broadcast::channel(buffer);
        Self {
            transport: Mutex::new(Some(transport.to_string())),
            events,
        }
    }

    fn set_transport(&self, transport: &str) {
        *self.transport.lock().expect("transport lock") = Some(transport.to_string());
    }
}

#[async_trait]
impl RealtimeChannel for SplitChannel {
    fn current_transport(&self) -> Option<String> {
        self.transport.lock().expect("transport lock").clone()
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[test]
fn upgrade_keeps_connected_flag() {
    let status = apply_channel_event(
        &ConnectionStatus::connected("polling"),
        &ChannelEvent::Upgrade {
            transport: "websocket".into(),
        },
    );
    assert_eq!(status, ConnectionStatus::connected("websocket"));
}

#[test]
fn upgrade_while_disconnected_changes_nothing() {
    let status = apply_channel_event(
        &ConnectionStatus::disconnected(),
        &ChannelEvent::Upgrade {
            transport: "websocket".into(),
        },
    );
    assert_eq!(status, ConnectionStatus::disconnected());
}

#[test]
fn disconnect_resets_to_defaults() {
    let status = apply_channel_event(
        &ConnectionStatus::connected("websocket"),
        &ChannelEvent::Disconnect {
            reason: "transport close".into(),
        },
    );
    assert!(!status.connected);
    assert_eq!(status.transport, "N/A");
}

#[tokio::test]
async fn already_connected_channel_is_reported_immediately() {
    let channel = Arc::new(LoopbackChannel::connected("websocket"));
    let observer = ConnectionObserver::subscribe(channel);

    assert_eq!(observer.status(), ConnectionStatus::connected("websocket"));
}

#[tokio::test]
async fn follows_connect_upgrade_disconnect() {
    let channel = Arc::new(LoopbackChannel::new());
    let observer = ConnectionObserver::subscribe(channel.clone());
    assert_eq!(observer.status(), ConnectionStatus::disconnected());

    channel.connect("polling");
    let status = wait_for_status(&observer, |status| status.connected).await;
    assert_eq!(status.transport, "polling");

    channel.upgrade("websocket");
    wait_for_status(&observer, |status| status.transport == "websocket").await;
    assert!(observer.status().connected);

    channel.disconnect("ping timeout");
    let status = wait_for_status(&observer, |status| !status.connected).await;
    assert_eq!(status, ConnectionStatus::disconnected());
}

#[tokio::test]
async fn resyncs_after_lagging_behind_the_channel() {
    let channel = Arc::new(LoopbackChannel::connected("polling"));
    let observer = ConnectionObserver::subscribe(channel.clone());

    for n in 0..200 {
        channel.upgrade(format!("transport-{n}"));
    }

    let status = wait_for_status(&observer, |status| status.transport == "transport-199").await;
    assert!(status.connected);
}

#[tokio::test]
async fn backlog_older_than_the_resync_is_discarded() {
    let channel = Arc::new(SplitChannel::new("polling", 4));
    let observer = ConnectionObserver::subscribe(channel.clone());

    // The pump has not run yet; overflow the buffer with stale events, then
    // move the channel on without emitting anything.
    for n in 0..16 {
        let _ = channel.events.send(ChannelEvent::Connect {
            transport: format!("stale-{n}"),
        });
    }
    channel.set_transport("fresh");

    wait_for_status(&observer, |status| status.transport == "fresh").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(observer.status(), ConnectionStatus::connected("fresh"));
}

#[tokio::test]
async fn dropping_the_observer_releases_its_subscription() {
    let channel = Arc::new(LoopbackChannel::new());

    let first = ConnectionObserver::subscribe(channel.clone());
    assert_eq!(channel.subscriber_count(), 1);
    drop(first);
    wait_for_subscribers(&channel, 0).await;

    let remounted = ConnectionObserver::subscribe(channel.clone());
    assert_eq!(channel.subscriber_count(), 1);
    remounted.unsubscribe();
    wait_for_subscribers(&channel, 0).await;
}
