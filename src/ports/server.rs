use web_push::SubscriptionInfo;

use crate::types::push::{PushType, Registration, SendStats, SubscriptionState};

pub trait PushServer: Clone + Send + Sync + 'static {
    type Error: std::fmt::Display + Send + Sync + 'static;

    fn register(
        &self,
        registration: &Registration,
    ) -> impl Future<Output = Result<SubscriptionState, Self::Error>> + Send;

    /// `Ok(None)` when the server has no record of the subscription.
    fn check(
        &self,
        subscription: &SubscriptionInfo,
    ) -> impl Future<Output = Result<Option<SubscriptionState>, Self::Error>> + Send;

    fn send_test(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn trigger(
        &self,
        push_type: &PushType,
    ) -> impl Future<Output = Result<SendStats, Self::Error>> + Send;
}
