pub mod adapters;
pub mod app;
pub mod config;
pub mod permission;
pub mod ports;
pub mod profile;
pub mod push;
pub mod settings;
pub mod state;
pub mod types;
pub mod worker;

pub use app::{router, serve};
pub use permission::PermissionState;
pub use push::{ApplicationServerKey, PushError, SubscriptionManager};
pub use settings::SettingsController;
pub use worker::{DeliveryWorker, WorkerHandle};
