mod error;
pub mod keys;
pub(crate) mod subscription;

pub use error::PushError;
pub use keys::ApplicationServerKey;
pub use subscription::{StatusCheck, SubscriptionManager};
