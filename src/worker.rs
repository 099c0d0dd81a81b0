use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ports::{ClientWindows, NotificationSurface};
use crate::types::push::Payload;
use crate::types::worker::{ClientInfo, Notification, NotificationOptions};

const EVENT_QUEUE_DEPTH: usize = 32;

/// Page opened when a notification carries no url.
const FALLBACK_URL: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    Installed,
    Activated,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Install,
    Activate,
    Push(Vec<u8>),
    NotificationClick(Notification),
}

impl WorkerEvent {
    fn name(&self) -> &'static str {
        match self {
            WorkerEvent::Install => "install",
            WorkerEvent::Activate => "activate",
            WorkerEvent::Push(_) => "push",
            WorkerEvent::NotificationClick(_) => "notificationclick",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Installed,
    Activated { claimed: usize },
    Shown(Notification),
    Routed { client: ClientInfo, cleared: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("malformed push payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
    #[error("failed to display notification: {0}")]
    Display(String),
    #[error("failed to route notification click: {0}")]
    Routing(String),
    #[error("worker cannot handle {event} while {state:?}")]
    InvalidState {
        event: &'static str,
        state: WorkerState,
    },
    #[error("worker has stopped")]
    Stopped,
}

/// `{title, body, ...data}` view of an inbound push.
#[derive(Debug, Deserialize)]
struct IncomingPush {
    title: String,
    #[serde(default)]
    body: String,
    #[serde(flatten)]
    data: Map<String, JsonValue>,
}

/// Turns push messages into notifications and routes clicks back into the app.
///
/// Only `title`, `body` and `url` are read; every other payload field is
/// attached to the notification untouched.
pub struct DeliveryWorker<N, C> {
    state: WorkerState,
    surface: N,
    clients: C,
}

impl<N, C> DeliveryWorker<N, C>
where
    N: NotificationSurface,
    C: ClientWindows,
{
    pub fn new(surface: N, clients: C) -> Self {
        Self {
            state: WorkerState::Installing,
            surface,
            clients,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub async fn handle(&mut self, event: WorkerEvent) -> Result<EventOutcome, WorkerError> {
        let name = event.name();
        match (self.state, event) {
            (WorkerState::Installing, WorkerEvent::Install) => {
                // Skip waiting: a new version takes over without every tab closing first.
                self.state = WorkerState::Installed;
                Ok(EventOutcome::Installed)
            }
            (WorkerState::Installed, WorkerEvent::Activate) => {
                self.clients.claim().await;
                self.state = WorkerState::Activated;
                let claimed = self.clients.match_all().await.len();
                info!(claimed, "delivery worker activated");
                Ok(EventOutcome::Activated { claimed })
            }
            (WorkerState::Activated, WorkerEvent::Push(bytes)) => self.show_push(&bytes).await,
            (WorkerState::Activated, WorkerEvent::NotificationClick(notification)) => {
                self.route_click(notification).await
            }
            (state, _) => Err(WorkerError::InvalidState { event: name, state }),
        }
    }

    async fn show_push(&self, bytes: &[u8]) -> Result<EventOutcome, WorkerError> {
        display_push(&self.surface, bytes).await.map(EventOutcome::Shown)
    }

    async fn route_click(&self, notification: Notification) -> Result<EventOutcome, WorkerError> {
        let (client, cleared) =
            open_notification(&self.surface, &self.clients, notification).await?;
        Ok(EventOutcome::Routed { client, cleared })
    }
}

/// Shows the notification a push message describes.
///
/// Used by the worker and, when push is declarative, directly by the host.
pub async fn display_push<N: NotificationSurface>(
    surface: &N,
    bytes: &[u8],
) -> Result<Notification, WorkerError> {
    let push: IncomingPush = serde_json::from_slice(bytes)?;
    let kind = Payload::from_slice(bytes)
        .map(|payload| payload.data.kind())
        .unwrap_or("untyped");
    debug!(kind, data = ?push.data, "received push notification");
    let options = NotificationOptions {
        body: push.body,
        data: JsonValue::Object(push.data),
    };
    surface
        .show(&push.title, options)
        .await
        .map_err(|err| WorkerError::Display(err.to_string()))
}

/// Closes a clicked notification, brings a page to its url and clears the rest
/// of the tray. Returns the page and the number of notifications cleared.
pub async fn open_notification<N, C>(
    surface: &N,
    clients: &C,
    notification: Notification,
) -> Result<(ClientInfo, usize), WorkerError>
where
    N: NotificationSurface,
    C: ClientWindows,
{
    surface.close(notification.id).await;
    let url = notification.url().unwrap_or(FALLBACK_URL).to_string();

    let mut windows = clients.match_all().await;
    windows.sort_by_key(|client| !client.focused);
    let client = match windows.into_iter().next() {
        Some(existing) => {
            clients
                .focus(existing.id)
                .await
                .map_err(|err| WorkerError::Routing(err.to_string()))?;
            clients
                .navigate(existing.id, &url)
                .await
                .map_err(|err| WorkerError::Routing(err.to_string()))?
        }
        None => clients
            .open_window(&url)
            .await
            .map_err(|err| WorkerError::Routing(err.to_string()))?,
    };

    // Whatever else is pending is outdated once the user acted on one.
    let stale = surface.pending().await;
    let cleared = stale.len();
    for other in stale {
        surface.close(other.id).await;
    }
    info!(url = %url, client = client.id.0, cleared, "notification click routed");
    Ok((client, cleared))
}

struct Envelope {
    event: WorkerEvent,
    settled: oneshot::Sender<Result<EventOutcome, WorkerError>>,
}

/// Running delivery worker: a single task draining its own event queue.
pub struct WorkerHandle {
    sender: mpsc::Sender<Envelope>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn spawn<N, C>(worker: DeliveryWorker<N, C>) -> Self
    where
        N: NotificationSurface,
        C: ClientWindows,
    {
        let (sender, receiver) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let task = tokio::spawn(run_worker(worker, receiver));
        Self { sender, task }
    }

    /// Queues an event and waits until its handling settles.
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome, WorkerError> {
        let (settled, outcome) = oneshot::channel();
        self.sender
            .send(Envelope { event, settled })
            .await
            .map_err(|_| WorkerError::Stopped)?;
        outcome.await.map_err(|_| WorkerError::Stopped)?
    }

    /// Installs and immediately activates the worker.
    pub async fn start(&self) -> Result<usize, WorkerError> {
        self.dispatch(WorkerEvent::Install).await?;
        match self.dispatch(WorkerEvent::Activate).await? {
            EventOutcome::Activated { claimed } => Ok(claimed),
            _ => Ok(0),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn run_worker<N, C>(
    mut worker: DeliveryWorker<N, C>,
    mut receiver: mpsc::Receiver<Envelope>,
) where
    N: NotificationSurface,
    C: ClientWindows,
{
    while let Some(Envelope { event, settled }) = receiver.recv().await {
        let name = event.name();
        let result = worker.handle(event).await;
        if let Err(err) = &result {
            warn!(event = name, error = %err, "worker event failed");
        }
        let _ = settled.send(result);
    }
    debug!("delivery worker event queue closed");
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryClients, MemoryTray};
    use crate::ports::TimeProvider;
    use serde_json::json;
    use time::OffsetDateTime;
    use time::format_description::well_known::Rfc3339;

    #[derive(Clone)]
    struct FixedTime(OffsetDateTime);

    impl TimeProvider for FixedTime {
        fn now(&self) -> OffsetDateTime {
            self.0
        }
    }

    fn fixed_time() -> FixedTime {
        FixedTime(OffsetDateTime::parse("2025-01-14T09:30:00Z", &Rfc3339).expect("parse now"))
    }

    fn day_three_payload() -> Vec<u8> {
        json!({
            "title": "Basho Day 3",
            "body": "Marten now ranked #4, 2 points behind the leader.",
            "url": "/basho/202501/day/3",
            "type": "DayResult",
            "basho_id": "202501",
            "day": 3
        })
        .to_string()
        .into_bytes()
    }

    async fn started(tray: &MemoryTray<FixedTime>, clients: &MemoryClients) -> WorkerHandle {
        let handle = WorkerHandle::spawn(DeliveryWorker::new(tray.clone(), clients.clone()));
        handle.start().await.expect("start worker");
        handle
    }

    #[tokio::test]
    async fn start__should_activate_immediately_and_claim_open_pages() {
        // Given
        let tray = MemoryTray::new(fixed_time());
        let clients = MemoryClients::default();
        clients.add("/basho/202501");

        // When
        let handle = WorkerHandle::spawn(DeliveryWorker::new(tray, clients.clone()));
        let claimed = handle.start().await.expect("start worker");

        // Then
        assert_eq!(claimed, 1);
        assert!(clients.list().iter().all(|client| client.controlled));
    }

    #[tokio::test]
    async fn handle__should_reject_push_before_activation() {
        // Given
        let mut worker =
            DeliveryWorker::new(MemoryTray::new(fixed_time()), MemoryClients::default());

        // When
        let result = worker.handle(WorkerEvent::Push(day_three_payload())).await;

        // Then
        assert!(matches!(
            result,
            Err(WorkerError::InvalidState {
                event: "push",
                state: WorkerState::Installing
            })
        ));
        assert_eq!(worker.state(), WorkerState::Installing);
    }

    #[tokio::test]
    async fn push__should_show_notification_with_remaining_fields_as_data() {
        // Given
        let tray = MemoryTray::new(fixed_time());
        let clients = MemoryClients::default();
        let handle = started(&tray, &clients).await;

        // When
        let outcome = handle
            .dispatch(WorkerEvent::Push(day_three_payload()))
            .await
            .expect("push handled");

        // Then
        let notification = match outcome {
            EventOutcome::Shown(notification) => notification,
            other => panic!("unexpected outcome: {other:?}"),
        };
        assert_eq!(notification.title, "Basho Day 3");
        assert_eq!(
            notification.body,
            "Marten now ranked #4, 2 points behind the leader."
        );
        assert_eq!(notification.url(), Some("/basho/202501/day/3"));
        assert_eq!(notification.data["type"], "DayResult");
        assert!(notification.data.get("title").is_none());
        assert_eq!(tray.pending_now().len(), 1);
    }

    #[tokio::test]
    async fn push__should_settle_with_error_and_keep_running_on_malformed_payload() {
        // Given
        let tray = MemoryTray::new(fixed_time());
        let clients = MemoryClients::default();
        let handle = started(&tray, &clients).await;

        // When
        let malformed = handle
            .dispatch(WorkerEvent::Push(b"{not json".to_vec()))
            .await;
        let missing_title = handle
            .dispatch(WorkerEvent::Push(br#"{"body":"no title"}"#.to_vec()))
            .await;
        let valid = handle
            .dispatch(WorkerEvent::Push(day_three_payload()))
            .await;

        // Then
        assert!(matches!(malformed, Err(WorkerError::MalformedPayload(_))));
        assert!(matches!(missing_title, Err(WorkerError::MalformedPayload(_))));
        assert!(matches!(valid, Ok(EventOutcome::Shown(_))));
        assert!(!handle.is_finished());
    }

    #[tokio::test]
    async fn click__should_navigate_existing_page_and_clear_other_notifications() {
        // Given
        let tray = MemoryTray::new(fixed_time());
        let clients = MemoryClients::default();
        let page = clients.add("/basho/202501");
        let handle = started(&tray, &clients).await;
        let older = json!({"title": "Day 2 Results", "body": "", "url": "/basho/202501/day/2"});
        handle
            .dispatch(WorkerEvent::Push(older.to_string().into_bytes()))
            .await
            .expect("older push");
        let clicked = match handle
            .dispatch(WorkerEvent::Push(day_three_payload()))
            .await
            .expect("push")
        {
            EventOutcome::Shown(notification) => notification,
            other => panic!("unexpected outcome: {other:?}"),
        };

        // When
        let outcome = handle
            .dispatch(WorkerEvent::NotificationClick(clicked))
            .await
            .expect("click handled");

        // Then
        match outcome {
            EventOutcome::Routed { client, cleared } => {
                assert_eq!(client.id, page.id);
                assert_eq!(client.url, "/basho/202501/day/3");
                assert!(client.focused);
                assert_eq!(cleared, 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(tray.pending_now().is_empty());
        assert_eq!(clients.list().len(), 1);
    }

    #[tokio::test]
    async fn click__should_open_new_page_when_none_is_open() {
        // Given
        let tray = MemoryTray::new(fixed_time());
        let clients = MemoryClients::default();
        let handle = started(&tray, &clients).await;
        let shown = match handle
            .dispatch(WorkerEvent::Push(day_three_payload()))
            .await
            .expect("push")
        {
            EventOutcome::Shown(notification) => notification,
            other => panic!("unexpected outcome: {other:?}"),
        };

        // When
        let outcome = handle
            .dispatch(WorkerEvent::NotificationClick(shown))
            .await
            .expect("click handled");

        // Then
        match outcome {
            EventOutcome::Routed { client, cleared } => {
                assert_eq!(client.url, "/basho/202501/day/3");
                assert_eq!(cleared, 0);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(clients.list().len(), 1);
    }

    #[tokio::test]
    async fn click__should_fall_back_to_root_without_url() {
        // Given
        let tray = MemoryTray::new(fixed_time());
        let clients = MemoryClients::default();
        let handle = started(&tray, &clients).await;
        let shown = match handle
            .dispatch(WorkerEvent::Push(br#"{"title":"Test","body":"It worked!"}"#.to_vec()))
            .await
            .expect("push")
        {
            EventOutcome::Shown(notification) => notification,
            other => panic!("unexpected outcome: {other:?}"),
        };

        // When
        let outcome = handle
            .dispatch(WorkerEvent::NotificationClick(shown))
            .await
            .expect("click handled");

        // Then
        assert!(matches!(
            outcome,
            EventOutcome::Routed { ref client, .. } if client.url == "/"
        ));
    }
}
