//! State behind the notification settings dialog.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::permission::PermissionState;
use crate::ports::{PushPlatform, PushServer};
use crate::push::{PushError, StatusCheck, SubscriptionManager};
use crate::types::push::{Category, SubscriptionState};

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("another settings action is still in progress")]
    Busy,
    #[error("not subscribed to push notifications")]
    NotSubscribed,
    #[error(transparent)]
    Push(#[from] PushError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub is_error: bool,
    pub text: String,
}

impl Message {
    fn info(text: impl Into<String>) -> Self {
        Self {
            is_error: false,
            text: text.into(),
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            text: text.into(),
        }
    }
}

/// What the dialog renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsView {
    pub busy: bool,
    pub permission: Option<PermissionState>,
    pub subscription: Option<SubscriptionState>,
    pub test_enabled: bool,
    pub message: Option<Message>,
}

/// Builds the opt-in list from `(category, checked)` pairs in display order.
pub fn opt_in_from_checkboxes<'a>(
    checkboxes: impl IntoIterator<Item = (&'a Category, bool)>,
) -> Vec<Category> {
    checkboxes
        .into_iter()
        .filter(|(_, checked)| *checked)
        .map(|(category, _)| category.clone())
        .collect()
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct Shown {
    permission: Option<PermissionState>,
    subscription: Option<SubscriptionState>,
    message: Option<Message>,
}

/// Drives the settings dialog on top of a [`SubscriptionManager`].
///
/// At most one action runs at a time; an overlapping call fails with
/// [`ControllerError::Busy`] instead of waiting.
pub struct SettingsController<P, S> {
    manager: SubscriptionManager<P, S>,
    busy: AtomicBool,
    shown: Mutex<Shown>,
}

impl<P, S> SettingsController<P, S>
where
    P: PushPlatform,
    S: PushServer,
{
    pub fn new(manager: SubscriptionManager<P, S>) -> Self {
        Self {
            manager,
            busy: AtomicBool::new(false),
            shown: Mutex::new(Shown::default()),
        }
    }

    fn begin(&self) -> Result<BusyGuard<'_>, ControllerError> {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map(|_| BusyGuard(&self.busy))
            .map_err(|_| ControllerError::Busy)
    }

    fn shown(&self) -> MutexGuard<'_, Shown> {
        self.shown.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn show_message(&self, message: Option<Message>) {
        self.shown().message = message;
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn is_subscribed(&self) -> bool {
        self.shown().subscription.is_some()
    }

    /// Whether the checkbox for `category` should be ticked.
    pub fn checked(&self, category: &Category) -> bool {
        self.shown()
            .subscription
            .as_ref()
            .is_some_and(|state| state.is_opted_in(category))
    }

    pub fn view(&self) -> SettingsView {
        let busy = self.is_busy();
        let shown = self.shown();
        SettingsView {
            busy,
            permission: shown.permission,
            subscription: shown.subscription.clone(),
            test_enabled: !busy && shown.subscription.is_some(),
            message: shown.message.clone(),
        }
    }

    /// Re-reads permission and, when granted, the server-side subscription state.
    pub async fn refresh(&self) -> Result<Option<SubscriptionState>, ControllerError> {
        let _busy = self.begin()?;
        self.reload().await
    }

    async fn reload(&self) -> Result<Option<SubscriptionState>, ControllerError> {
        let permission = self.manager.permission_state().await;
        let subscription = if permission == PermissionState::Granted {
            match self.manager.check_subscription().await {
                Ok(StatusCheck::Active(state)) => Some(state),
                Ok(StatusCheck::NotSubscribed) => None,
                Ok(StatusCheck::Stale) => {
                    self.show_message(Some(Message::error(
                        PushError::StaleSubscription.to_string(),
                    )));
                    None
                }
                Err(err) => {
                    self.show_message(Some(Message::error(err.to_string())));
                    let mut shown = self.shown();
                    shown.permission = Some(permission);
                    shown.subscription = None;
                    return Err(err.into());
                }
            }
        } else {
            None
        };
        debug!(%permission, subscribed = subscription.is_some(), "settings refreshed");

        let mut shown = self.shown();
        shown.permission = Some(permission);
        shown.subscription = subscription.clone();
        Ok(subscription)
    }

    /// Subscribes with `selected` when not subscribed, unsubscribes otherwise.
    pub async fn toggle(
        &self,
        selected: &[Category],
    ) -> Result<Option<SubscriptionState>, ControllerError> {
        let _busy = self.begin()?;
        self.show_message(None);
        let result = if self.is_subscribed() {
            self.manager.unsubscribe().await.map(|_| None)
        } else {
            self.manager.subscribe(selected).await.map(Some)
        };
        self.settle(result, "Notification settings updated.").await
    }

    /// Stores the selection; an empty selection removes the subscription.
    pub async fn save(
        &self,
        selected: &[Category],
    ) -> Result<Option<SubscriptionState>, ControllerError> {
        let _busy = self.begin()?;
        self.show_message(None);
        let result = if selected.is_empty() {
            self.manager.unsubscribe().await.map(|_| None)
        } else {
            self.manager.subscribe(selected).await.map(Some)
        };
        self.settle(result, "Settings have been saved.").await
    }

    async fn settle(
        &self,
        result: Result<Option<SubscriptionState>, PushError>,
        success: &str,
    ) -> Result<Option<SubscriptionState>, ControllerError> {
        match result {
            Ok(_) => {
                self.show_message(Some(Message::info(success)));
                self.reload().await
            }
            Err(err) => {
                self.show_message(Some(Message::error(err.to_string())));
                // The error already shown takes precedence over a failed reload.
                let _ = self.reload().await;
                Err(err.into())
            }
        }
    }

    pub async fn send_test(&self) -> Result<(), ControllerError> {
        let _busy = self.begin()?;
        if !self.is_subscribed() {
            return Err(ControllerError::NotSubscribed);
        }
        match self.manager.send_test().await {
            Ok(()) => {
                self.show_message(Some(Message::info("Test notification sent.")));
                Ok(())
            }
            Err(err) => {
                self.show_message(Some(Message::error(err.to_string())));
                Err(err.into())
            }
        }
    }
}
