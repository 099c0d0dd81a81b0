use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ports::PushPlatform;
use crate::push::keys::ApplicationServerKey;

/// Reconciled notification permission of the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
    Unavailable,
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
            PermissionState::Prompt => "prompt",
            PermissionState::Unavailable => "unavailable",
        })
    }
}

/// Answer of the push manager permission check and of the permissions query API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionSignal {
    Granted,
    Denied,
    #[default]
    Prompt,
}

/// Answer of the notification API's permission flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPermission {
    #[default]
    Default,
    Granted,
    Denied,
}

impl From<NotificationPermission> for PermissionSignal {
    fn from(permission: NotificationPermission) -> Self {
        match permission {
            NotificationPermission::Default => PermissionSignal::Prompt,
            NotificationPermission::Granted => PermissionSignal::Granted,
            NotificationPermission::Denied => PermissionSignal::Denied,
        }
    }
}

/// Any source reporting `granted` wins; otherwise the query API is the source of truth.
///
/// Some browsers (Safari in particular) report divergent answers across the
/// three surfaces, and at least one of them having seen the user allow
/// notifications is enough.
pub fn reconcile(
    push: PermissionSignal,
    notification: NotificationPermission,
    query: PermissionSignal,
) -> PermissionState {
    if push == PermissionSignal::Granted
        || notification == NotificationPermission::Granted
        || query == PermissionSignal::Granted
    {
        return PermissionState::Granted;
    }
    match query {
        PermissionSignal::Granted => PermissionState::Granted,
        PermissionSignal::Denied => PermissionState::Denied,
        PermissionSignal::Prompt => PermissionState::Prompt,
    }
}

/// Queries all three platform sources afresh and reconciles them.
pub async fn resolve<P: PushPlatform>(platform: &P, key: &ApplicationServerKey) -> PermissionState {
    if !platform.push_supported() {
        return PermissionState::Unavailable;
    }
    let push = platform.push_permission(key).await;
    let notification = platform.notification_permission();
    let query = platform.query_permission().await;
    let state = reconcile(push, notification, query);
    tracing::debug!(?push, ?notification, ?query, %state, "resolved notification permission");
    state
}
