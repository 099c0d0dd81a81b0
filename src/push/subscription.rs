use tracing::{debug, error, info, warn};

use super::PushError;
use super::keys::ApplicationServerKey;
use crate::permission::{self, NotificationPermission, PermissionState};
use crate::ports::{PushPlatform, PushServer};
use crate::types::push::{Category, PushType, Registration, SendStats, SubscriptionState};

/// Outcome of a status check against the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusCheck {
    /// The profile has no push subscription.
    NotSubscribed,
    Active(SubscriptionState),
    /// The server had no record; the local subscription has been removed.
    Stale,
}

impl StatusCheck {
    pub fn into_state(self) -> Option<SubscriptionState> {
        match self {
            StatusCheck::Active(state) => Some(state),
            StatusCheck::NotSubscribed | StatusCheck::Stale => None,
        }
    }
}

/// Owns the profile's single push subscription and keeps it in step with the server.
///
/// Calls are not serialized here; callers must not overlap mutating calls.
#[derive(Debug, Clone)]
pub struct SubscriptionManager<P, S> {
    platform: P,
    server: S,
    app_key: ApplicationServerKey,
}

impl<P, S> SubscriptionManager<P, S>
where
    P: PushPlatform,
    S: PushServer,
{
    pub fn new(platform: P, server: S, app_key: ApplicationServerKey) -> Self {
        Self {
            platform,
            server,
            app_key,
        }
    }

    pub async fn permission_state(&self) -> PermissionState {
        permission::resolve(&self.platform, &self.app_key).await
    }

    /// Subscribes on the platform and registers with the server.
    ///
    /// A failed registration unsubscribes the platform subscription before the
    /// error is returned, unless that subscription existed before this call.
    pub async fn subscribe(&self, opt_in: &[Category]) -> Result<SubscriptionState, PushError> {
        if !self.platform.push_supported() {
            return Err(PushError::PermissionUnavailable);
        }

        let decision = self
            .platform
            .request_permission()
            .await
            .map_err(|err| PushError::Platform(err.to_string()))?;
        if decision == NotificationPermission::Denied {
            return Err(PushError::PermissionDenied);
        }

        let existing = self
            .platform
            .get_subscription()
            .await
            .map_err(|err| PushError::Platform(err.to_string()))?;
        let subscription = self
            .platform
            .subscribe(&self.app_key)
            .await
            .map_err(|err| PushError::SubscriptionFailed(err.to_string()))?;
        let created = existing.is_none();
        debug!(endpoint = %subscription.endpoint, created, "platform push subscription ready");

        let registration = Registration {
            subscription,
            opt_in: opt_in.to_vec(),
        };
        match self.server.register(&registration).await {
            Ok(state) => {
                info!(opt_in = ?state.opt_in, "push subscription registered");
                Ok(state)
            }
            Err(err) => {
                warn!(
                    error = %err,
                    endpoint = %registration.subscription.endpoint,
                    created,
                    "push registration failed"
                );
                if created {
                    if let Err(rollback) = self.platform.unsubscribe().await {
                        error!(error = %rollback, "failed to roll back platform subscription");
                    }
                }
                Err(PushError::RegistrationFailed(err.to_string()))
            }
        }
    }

    /// Removes the local subscription. Returns false when there was none.
    pub async fn unsubscribe(&self) -> Result<bool, PushError> {
        let existing = self
            .platform
            .get_subscription()
            .await
            .map_err(|err| PushError::Platform(err.to_string()))?;
        if existing.is_none() {
            return Ok(false);
        }
        let removed = self
            .platform
            .unsubscribe()
            .await
            .map_err(|err| PushError::Platform(err.to_string()))?;
        if removed {
            info!("push subscription removed");
        }
        Ok(removed)
    }

    /// Server-side opt-in state of the local subscription, if both exist.
    pub async fn check_status(&self) -> Result<Option<SubscriptionState>, PushError> {
        self.check_subscription().await.map(StatusCheck::into_state)
    }

    pub async fn check_subscription(&self) -> Result<StatusCheck, PushError> {
        let subscription = match self
            .platform
            .get_subscription()
            .await
            .map_err(|err| PushError::Platform(err.to_string()))?
        {
            Some(subscription) => subscription,
            None => return Ok(StatusCheck::NotSubscribed),
        };

        match self.server.check(&subscription).await {
            Ok(Some(state)) => Ok(StatusCheck::Active(state)),
            Ok(None) => {
                warn!(
                    endpoint = %subscription.endpoint,
                    "server lost the push subscription; unsubscribing locally"
                );
                self.platform
                    .unsubscribe()
                    .await
                    .map_err(|err| PushError::Platform(err.to_string()))?;
                Ok(StatusCheck::Stale)
            }
            Err(err) => Err(PushError::StatusCheckFailed(err.to_string())),
        }
    }

    pub async fn send_test(&self) -> Result<(), PushError> {
        self.server
            .send_test()
            .await
            .map_err(|err| PushError::Request(err.to_string()))
    }

    pub async fn trigger(&self, push_type: &PushType) -> Result<SendStats, PushError> {
        let stats = self
            .server
            .trigger(push_type)
            .await
            .map_err(|err| PushError::Request(err.to_string()))?;
        info!(?push_type, %stats, "push triggered");
        Ok(stats)
    }
}
