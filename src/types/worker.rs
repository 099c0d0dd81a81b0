use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub u64);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationOptions {
    pub body: String,
    /// Opaque data attached to the notification, handed back on click.
    pub data: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub body: String,
    pub data: JsonValue,
    #[serde(with = "time::serde::rfc3339")]
    pub shown_at: OffsetDateTime,
}

impl Notification {
    pub fn url(&self) -> Option<&str> {
        self.data.get("url").and_then(JsonValue::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub id: ClientId,
    pub url: String,
    pub focused: bool,
    pub controlled: bool,
}
