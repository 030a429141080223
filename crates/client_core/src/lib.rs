use std::{path::Path, sync::Arc};

use realtime_channel::RealtimeChannel;
use shared::domain::{ConnectionStatus, StagedScoreFile};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

pub mod connection;
pub mod epson_auth;
pub mod intake;
pub mod object_url;
pub mod websocket;

pub use connection::ConnectionObserver;
pub use epson_auth::{
    AuthDialogState, AuthFlowError, ClickTarget, DeviceAuthorizationFlow, EpsonAuthApi,
    EpsonAuthError, HttpEpsonAuthApi,
};
pub use intake::{IntakeController, IntakeError, RawFile};
pub use object_url::{ObjectUrl, ObjectUrlRegistry};
pub use websocket::{ws_url_for, WebSocketChannel};

const PAGE_EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone)]
pub enum PageEvent {
    FilesStaged { added: usize, total: usize },
    AuthDialogChanged(AuthDialogState),
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("no score files are staged")]
    NothingStaged,
    #[error("notation conversion is not available yet")]
    Unavailable,
}

/// Page-level state container: staged files, channel status, and the
/// Epson Connect dialog. Dropping the page tears all three down.
pub struct ScorePage {
    intake: IntakeController,
    connection: ConnectionObserver,
    channel: Arc<dyn RealtimeChannel>,
    auth: Arc<DeviceAuthorizationFlow>,
    events: broadcast::Sender<PageEvent>,
}

impl ScorePage {
    /// Must be called inside a Tokio runtime.
    pub fn mount(channel: Arc<dyn RealtimeChannel>, auth_api: Arc<dyn EpsonAuthApi>) -> Self {
        let (events, _) = broadcast::channel(PAGE_EVENT_BUFFER);
        let connection = ConnectionObserver::subscribe(Arc::clone(&channel));
        let auth = Arc::new(DeviceAuthorizationFlow::new(auth_api, events.clone()));
        Self {
            intake: IntakeController::new(ObjectUrlRegistry::new()),
            connection,
            channel,
            auth,
            events,
        }
    }

    pub fn add_files(&mut self, selection: impl IntoIterator<Item = RawFile>) -> usize {
        let added = self.intake.add_files(selection);
        self.announce_staged(added);
        added
    }

    pub async fn add_paths<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<usize, IntakeError> {
        let added = self.intake.add_paths(paths).await?;
        self.announce_staged(added);
        Ok(added)
    }

    pub fn list_files(&self) -> Vec<StagedScoreFile> {
        self.intake.list_files()
    }

    pub fn resolve(&self, url: &str) -> Option<Arc<[u8]>> {
        self.intake.resolve(url)
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.watch()
    }

    pub fn auth(&self) -> Arc<DeviceAuthorizationFlow> {
        Arc::clone(&self.auth)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PageEvent> {
        self.events.subscribe()
    }

    pub fn convert(&self) -> Result<(), ConvertError> {
        if self.intake.is_empty() {
            return Err(ConvertError::NothingStaged);
        }
        warn!(
            staged = self.intake.len(),
            "convert requested but no notation converter is wired in"
        );
        Err(ConvertError::Unavailable)
    }

    /// Releases staged files and the channel subscription, then closes the
    /// channel.
    pub async fn unmount(mut self) -> anyhow::Result<()> {
        self.intake.dispose();
        let channel = Arc::clone(&self.channel);
        drop(self);
        channel.close().await?;
        info!("score page unmounted");
        Ok(())
    }

    fn announce_staged(&self, added: usize) {
        if added > 0 {
            let _ = self.events.send(PageEvent::FilesStaged {
                added,
                total: self.intake.len(),
            });
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
