use crate::types::worker::{ClientId, ClientInfo, Notification, NotificationId, NotificationOptions};

pub trait NotificationSurface: Clone + Send + Sync + 'static {
    type Error: std::fmt::Display + Send + Sync + 'static;

    fn show(
        &self,
        title: &str,
        options: NotificationOptions,
    ) -> impl Future<Output = Result<Notification, Self::Error>> + Send;

    fn close(&self, id: NotificationId) -> impl Future<Output = ()> + Send;

    /// Notifications still displayed, oldest first.
    fn pending(&self) -> impl Future<Output = Vec<Notification>> + Send;
}

/// The application's open pages, as seen from the worker.
pub trait ClientWindows: Clone + Send + Sync + 'static {
    type Error: std::fmt::Display + Send + Sync + 'static;

    /// All window clients of the application, controlled or not.
    fn match_all(&self) -> impl Future<Output = Vec<ClientInfo>> + Send;

    fn focus(&self, id: ClientId) -> impl Future<Output = Result<ClientInfo, Self::Error>> + Send;

    fn navigate(
        &self,
        id: ClientId,
        url: &str,
    ) -> impl Future<Output = Result<ClientInfo, Self::Error>> + Send;

    fn open_window(&self, url: &str)
    -> impl Future<Output = Result<ClientInfo, Self::Error>> + Send;

    /// Takes control of every open page.
    fn claim(&self) -> impl Future<Output = ()> + Send;
}
