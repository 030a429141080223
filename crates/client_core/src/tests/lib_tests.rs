use std::time::Duration;

use async_trait::async_trait;
use realtime_channel::LoopbackChannel;
use serde_json::{json, Value};
use shared::protocol::EpsonAuthRequest;
use tokio::sync::Mutex;

use super::*;

#[derive(Default)]
struct RecordingAuthApi {
    requests: Mutex<Vec<EpsonAuthRequest>>,
}

#[async_trait]
impl EpsonAuthApi for RecordingAuthApi {
    async fn authenticate(&self, request: &EpsonAuthRequest) -> Result<Value, EpsonAuthError> {
        self.requests.lock().await.push(request.clone());
        if request.email.ends_with("@epsonconnect.com") {
            Ok(json!({ "ok": true }))
        } else {
            Err(EpsonAuthError::Rejected {
                status: 401,
                payload: json!({ "error": "unknown account" }),
            })
        }
    }
}

fn mount(channel: Arc<LoopbackChannel>) -> (ScorePage, Arc<RecordingAuthApi>) {
    let api = Arc::new(RecordingAuthApi::default());
    let page = ScorePage::mount(channel, Arc::clone(&api) as Arc<dyn EpsonAuthApi>);
    (page, api)
}

#[tokio::test]
async fn stages_png_then_pdf_for_the_viewer() {
    let (mut page, _) = mount(Arc::new(LoopbackChannel::new()));
    let mut events = page.subscribe_events();

    page.add_files(vec![
        RawFile::new("page-1.png", "image/png", b"png".to_vec()),
        RawFile::new("page-2.pdf", "application/pdf", b"pdf".to_vec()),
    ]);

    let staged = page.list_files();
    assert_eq!(staged.len(), 2);
    assert_eq!(staged[0].mime_type, "image/png");
    assert_eq!(staged[1].mime_type, "application/pdf");

    let encoded = serde_json::to_value(&staged[0]).expect("encode");
    assert_eq!(encoded["type"], "image/png");
    assert_eq!(encoded["url"], staged[0].url.as_str());

    assert!(matches!(
        events.try_recv(),
        Ok(PageEvent::FilesStaged { added: 2, total: 2 })
    ));
}

#[tokio::test]
async fn empty_selection_announces_nothing() {
    let (mut page, _) = mount(Arc::new(LoopbackChannel::new()));
    let mut events = page.subscribe_events();

    assert_eq!(page.add_files(Vec::new()), 0);
    assert!(matches!(
        events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn mounting_on_a_live_channel_reports_connected() {
    let channel = Arc::new(LoopbackChannel::connected("polling"));
    let (page, _) = mount(Arc::clone(&channel));
    assert_eq!(
        page.connection_status(),
        ConnectionStatus::connected("polling")
    );

    channel.upgrade("websocket");
    let mut status = page.watch_connection();
    tokio::time::timeout(
        Duration::from_secs(2),
        status.wait_for(|status| status.transport == "websocket"),
    )
    .await
    .expect("upgrade timed out")
    .expect("observer alive");
}

#[tokio::test]
async fn convert_is_a_stub() {
    let (mut page, _) = mount(Arc::new(LoopbackChannel::new()));
    assert!(matches!(page.convert(), Err(ConvertError::NothingStaged)));

    page.add_files(Some(RawFile::new("page.png", "image/png", vec![1])));
    assert!(matches!(page.convert(), Err(ConvertError::Unavailable)));
}

#[tokio::test]
async fn auth_flow_runs_through_the_page() {
    let (page, api) = mount(Arc::new(LoopbackChannel::new()));
    let auth = page.auth();

    auth.open().await;
    auth.submit("someone@example.com")
        .await
        .expect_err("unknown account");
    assert!(matches!(
        auth.state().await,
        AuthDialogState::OpenWithError(EpsonAuthError::Rejected { status: 401, .. })
    ));

    auth.submit("user@epsonconnect.com")
        .await
        .expect("registered account");
    assert_eq!(auth.state().await, AuthDialogState::Closed);

    let requests = api.requests.lock().await;
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1], EpsonAuthRequest::for_email("user@epsonconnect.com"));
}

#[tokio::test]
async fn unmount_releases_files_and_closes_the_channel() {
    let channel = Arc::new(LoopbackChannel::connected("websocket"));
    let (mut page, _) = mount(Arc::clone(&channel));
    page.add_files(vec![RawFile::new("page.png", "image/png", vec![1])]);
    let url = page.list_files()[0].url.clone();
    let registry = page.intake.registry();
    assert!(registry.resolve(&url).is_some());

    page.unmount().await.expect("unmount");

    assert!(!channel.is_connected());
    assert!(registry.resolve(&url).is_none());
    tokio::time::timeout(Duration::from_secs(2), async {
        while channel.subscriber_count() != 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("observer subscription released");
}
