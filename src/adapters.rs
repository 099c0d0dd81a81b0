use std::sync::{Arc, Mutex, MutexGuard};

use reqwest::header::COOKIE;
use reqwest::{StatusCode, Url};
use time::OffsetDateTime;
use tracing::{debug, info};
use web_push::SubscriptionInfo;

use crate::ports;
use crate::push::ApplicationServerKey;
use crate::push::keys::KeyError;
use crate::types::push::{PushType, Registration, SendStats, SubscriptionState};
use crate::types::worker::{
    ClientId, ClientInfo, Notification, NotificationId, NotificationOptions,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimeProvider;

impl ports::TimeProvider for TokioTimeProvider {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("invalid url '{0}'")]
    InvalidUrl(String),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    /// Non-success response; the server answers with a plain-text message.
    #[error("{message}")]
    Status { status: StatusCode, message: String },
    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Talks to the application's `/push/*` endpoints with the player's session cookie.
///
/// Endpoint paths are resolved relative to `base`, so a server mounted under a
/// path prefix keeps it.
#[derive(Debug, Clone)]
pub struct HttpPushServer {
    base: Url,
    client: reqwest::Client,
    session_cookie: Option<String>,
}

impl HttpPushServer {
    pub fn new(mut base: Url, session_cookie: Option<String>) -> Result<Self, HttpError> {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            base,
            client,
            session_cookie,
        })
    }

    fn url(&self, path: &str) -> Result<Url, HttpError> {
        self.base
            .join(path)
            .map_err(|_| HttpError::InvalidUrl(format!("{}{}", self.base, path)))
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<reqwest::RequestBuilder, HttpError> {
        let mut request = self.client.request(method, self.url(path)?);
        if let Some(cookie) = &self.session_cookie {
            request = request.header(COOKIE, cookie);
        }
        Ok(request)
    }

    /// Reads the application server key from the index page's meta tag.
    pub async fn fetch_application_key(&self) -> Result<Option<ApplicationServerKey>, HttpError> {
        let response = self.request(reqwest::Method::GET, "")?.send().await?;
        let html = expect_success(response).await?.text().await?;
        Ok(ApplicationServerKey::from_html(&html).transpose()?)
    }
}

async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, HttpError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    let message = if message.trim().is_empty() {
        status.to_string()
    } else {
        message.trim().to_string()
    };
    Err(HttpError::Status { status, message })
}

impl ports::PushServer for HttpPushServer {
    type Error = HttpError;

    async fn register(
        &self,
        registration: &Registration,
    ) -> Result<SubscriptionState, Self::Error> {
        let response = self
            .request(reqwest::Method::POST, "push/register")?
            .json(registration)
            .send()
            .await?;
        Ok(expect_success(response).await?.json().await?)
    }

    async fn check(
        &self,
        subscription: &SubscriptionInfo,
    ) -> Result<Option<SubscriptionState>, Self::Error> {
        let response = self
            .request(reqwest::Method::POST, "push/check")?
            .json(subscription)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(endpoint = %subscription.endpoint, "server has no record of subscription");
            return Ok(None);
        }
        Ok(Some(expect_success(response).await?.json().await?))
    }

    async fn send_test(&self) -> Result<(), Self::Error> {
        let response = self
            .request(reqwest::Method::POST, "push/test")?
            .send()
            .await?;
        expect_success(response).await?;
        Ok(())
    }

    async fn trigger(&self, push_type: &PushType) -> Result<SendStats, Self::Error> {
        let response = self
            .request(reqwest::Method::POST, "push/trigger")?
            .json(push_type)
            .send()
            .await?;
        Ok(expect_success(response).await?.json().await?)
    }
}

#[derive(Debug, Default)]
struct TrayState {
    next_id: u64,
    shown: Vec<Notification>,
}

/// In-process notification tray.
#[derive(Debug, Clone)]
pub struct MemoryTray<T> {
    time: T,
    state: Arc<Mutex<TrayState>>,
}

impl<T: ports::TimeProvider> MemoryTray<T> {
    pub fn new(time: T) -> Self {
        Self {
            time,
            state: Arc::new(Mutex::new(TrayState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrayState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn pending_now(&self) -> Vec<Notification> {
        self.lock().shown.clone()
    }

    pub fn find(&self, id: NotificationId) -> Option<Notification> {
        self.lock().shown.iter().find(|n| n.id == id).cloned()
    }
}

impl<T: ports::TimeProvider> ports::NotificationSurface for MemoryTray<T> {
    type Error = std::convert::Infallible;

    async fn show(
        &self,
        title: &str,
        options: NotificationOptions,
    ) -> Result<Notification, Self::Error> {
        let shown_at = self.time.now();
        let mut state = self.lock();
        state.next_id += 1;
        let notification = Notification {
            id: NotificationId(state.next_id),
            title: title.to_string(),
            body: options.body,
            data: options.data,
            shown_at,
        };
        state.shown.push(notification.clone());
        info!(
            id = notification.id.0,
            title = %notification.title,
            body = %notification.body,
            "notification shown"
        );
        Ok(notification)
    }

    async fn close(&self, id: NotificationId) {
        self.lock().shown.retain(|n| n.id != id);
    }

    async fn pending(&self) -> Vec<Notification> {
        self.pending_now()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientsError {
    #[error("no open page with id {0}")]
    UnknownClient(u64),
}

#[derive(Debug, Default)]
struct ClientsState {
    next_id: u64,
    windows: Vec<ClientInfo>,
}

/// In-process set of the application's open pages.
#[derive(Debug, Clone, Default)]
pub struct MemoryClients {
    state: Arc<Mutex<ClientsState>>,
}

impl MemoryClients {
    fn lock(&self) -> MutexGuard<'_, ClientsState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers an already open, not yet controlled page.
    pub fn add(&self, url: &str) -> ClientInfo {
        let mut state = self.lock();
        state.next_id += 1;
        let client = ClientInfo {
            id: ClientId(state.next_id),
            url: url.to_string(),
            focused: false,
            controlled: false,
        };
        state.windows.push(client.clone());
        client
    }

    pub fn list(&self) -> Vec<ClientInfo> {
        self.lock().windows.clone()
    }

    fn update(
        &self,
        id: ClientId,
        change: impl FnOnce(&mut ClientInfo),
    ) -> Result<ClientInfo, ClientsError> {
        let mut state = self.lock();
        let client = state
            .windows
            .iter_mut()
            .find(|client| client.id == id)
            .ok_or(ClientsError::UnknownClient(id.0))?;
        change(client);
        Ok(client.clone())
    }
}

impl ports::ClientWindows for MemoryClients {
    type Error = ClientsError;

    async fn match_all(&self) -> Vec<ClientInfo> {
        self.list()
    }

    async fn focus(&self, id: ClientId) -> Result<ClientInfo, Self::Error> {
        {
            let mut state = self.lock();
            for client in state.windows.iter_mut() {
                client.focused = false;
            }
        }
        self.update(id, |client| client.focused = true)
    }

    async fn navigate(&self, id: ClientId, url: &str) -> Result<ClientInfo, Self::Error> {
        self.update(id, |client| client.url = url.to_string())
    }

    async fn open_window(&self, url: &str) -> Result<ClientInfo, Self::Error> {
        let mut state = self.lock();
        state.next_id += 1;
        for client in state.windows.iter_mut() {
            client.focused = false;
        }
        let client = ClientInfo {
            id: ClientId(state.next_id),
            url: url.to_string(),
            focused: true,
            controlled: true,
        };
        state.windows.push(client.clone());
        Ok(client)
    }

    async fn claim(&self) {
        for client in self.lock().windows.iter_mut() {
            client.controlled = true;
        }
    }
}
