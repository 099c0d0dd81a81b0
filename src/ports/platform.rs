use web_push::SubscriptionInfo;

use crate::permission::{NotificationPermission, PermissionSignal};
use crate::push::keys::ApplicationServerKey;

/// Handle to the browser's push capability for one profile.
///
/// The three permission checks mirror the independent platform surfaces
/// (push manager, notification API, permissions query) and may disagree.
pub trait PushPlatform: Clone + Send + Sync + 'static {
    type Error: std::fmt::Display + Send + Sync + 'static;

    /// False when the profile has no push manager or no notification API.
    fn push_supported(&self) -> bool;

    fn push_permission(
        &self,
        key: &ApplicationServerKey,
    ) -> impl Future<Output = PermissionSignal> + Send;

    fn notification_permission(&self) -> NotificationPermission;

    fn query_permission(&self) -> impl Future<Output = PermissionSignal> + Send;

    /// Asks the user unless a decision already exists.
    fn request_permission(
        &self,
    ) -> impl Future<Output = Result<NotificationPermission, Self::Error>> + Send;

    fn subscribe(
        &self,
        key: &ApplicationServerKey,
    ) -> impl Future<Output = Result<SubscriptionInfo, Self::Error>> + Send;

    fn get_subscription(
        &self,
    ) -> impl Future<Output = Result<Option<SubscriptionInfo>, Self::Error>> + Send;

    /// Returns whether a subscription was removed.
    fn unsubscribe(&self) -> impl Future<Output = Result<bool, Self::Error>> + Send;
}
