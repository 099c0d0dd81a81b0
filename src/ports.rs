pub mod platform;
pub mod server;
pub mod time;
pub mod worker;

pub use platform::PushPlatform;
pub use server::PushServer;
pub use time::TimeProvider;
pub use worker::{ClientWindows, NotificationSurface};
