#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("Push notifications are not supported in this browser.")]
    PermissionUnavailable,
    #[error("Please check browser settings to allow notifications from this site.")]
    PermissionDenied,
    #[error("Could not enable push notifications. Please check your browser settings.\n\n{0}")]
    SubscriptionFailed(String),
    #[error("Could not register push notifications with the server: {0}")]
    RegistrationFailed(String),
    #[error("Could not check push notification status: {0}")]
    StatusCheckFailed(String),
    /// Advisory only: the server forgot the subscription and it was removed locally.
    #[error("Push notification registration has been lost. Please re-subscribe.")]
    StaleSubscription,
    #[error("push platform error: {0}")]
    Platform(String),
    #[error("request failed: {0}")]
    Request(String),
}
