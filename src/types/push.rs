use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub type PlayerId = i64;
pub type Day = u8;

/// Opt-in tag for one kind of notification, as stored by the server.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Category {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

/// Server-side view of a subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionState {
    pub opt_in: BTreeSet<Category>,
}

impl SubscriptionState {
    pub fn is_opted_in(&self, category: &Category) -> bool {
        self.opt_in.contains(category)
    }
}

/// Body of `POST /push/register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub subscription: web_push::SubscriptionInfo,
    pub opt_in: Vec<Category>,
}

/// Delivery counts reported by `POST /push/trigger`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendStats {
    pub success: usize,
    pub invalid: usize,
    pub fail: usize,
    pub players: usize,
}

impl fmt::Display for SendStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} delivered, {} invalid, {} failed across {} players",
            self.success, self.invalid, self.fail, self.players
        )
    }
}

/// Tournament identifier, written as `YYYYMM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BashoId {
    pub year: i32,
    pub month: u8,
}

impl BashoId {
    pub fn id(self) -> String {
        format!("{:04}{:02}", self.year, self.month)
    }

    pub fn url_path(self) -> String {
        format!("/basho/{}", self.id())
    }
}

impl fmt::Display for BashoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid basho id '{0}'; expected YYYYMM")]
pub struct InvalidBashoId(String);

impl FromStr for BashoId {
    type Err = InvalidBashoId;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidBashoId(raw.to_string());
        if raw.len() != 6 || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let year: i32 = raw[..4].parse().map_err(|_| invalid())?;
        let month: u8 = raw[4..].parse().map_err(|_| invalid())?;
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }
        Ok(Self { year, month })
    }
}

impl Serialize for BashoId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.id())
    }
}

impl<'de> Deserialize<'de> for BashoId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// What an admin asks the server to push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PushType {
    Test,
    Announcement(String),
    EntriesOpen(BashoId),
    BashoStartCountdown(BashoId),
    DayResult(BashoId, PlayerId, Day),
    BashoResult(BashoId, PlayerId),
}

impl PushType {
    /// Opt-in category a subscription needs to receive this push.
    pub fn category(&self) -> Category {
        let tag = match self {
            PushType::Test => "Test",
            PushType::Announcement(_) => "Announcement",
            PushType::EntriesOpen(_) => "EntriesOpen",
            PushType::BashoStartCountdown(_) => "BashoStartCountdown",
            PushType::DayResult(..) => "DayResult",
            PushType::BashoResult(..) => "BashoResult",
        };
        Category::new(tag)
    }

    pub fn ttl(&self) -> Duration {
        const HOUR: u64 = 60 * 60;
        const DAY: u64 = 24 * HOUR;
        let secs = match self {
            PushType::Test => 10 * 60,
            PushType::Announcement(_) => DAY,
            PushType::EntriesOpen(_) => DAY,
            PushType::BashoStartCountdown(_) => 12 * HOUR,
            PushType::DayResult(..) => DAY,
            PushType::BashoResult(..) => 7 * DAY,
        };
        Duration::from_secs(secs)
    }
}

/// Inbound push message as sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub title: String,
    pub body: String,
    pub url: String,
    #[serde(flatten)]
    pub data: PayloadData,
}

impl Payload {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PayloadData {
    Empty,
    EntriesOpen {
        basho_id: BashoId,
        start_date: i64,
    },
    BashoStartCountdown {
        basho_id: BashoId,
        start_date: i64,
    },
    DayResult {
        basho_id: BashoId,
        name: String,
        day: Day,
        rikishi: Vec<RikishiDayResult>,
        rank: u16,
        score: u8,
        leader_score: u8,
    },
}

impl PayloadData {
    pub fn kind(&self) -> &'static str {
        match self {
            PayloadData::Empty => "Empty",
            PayloadData::EntriesOpen { .. } => "EntriesOpen",
            PayloadData::BashoStartCountdown { .. } => "BashoStartCountdown",
            PayloadData::DayResult { .. } => "DayResult",
        }
    }

    pub fn basho_id(&self) -> Option<BashoId> {
        match self {
            PayloadData::Empty => None,
            PayloadData::EntriesOpen { basho_id, .. }
            | PayloadData::BashoStartCountdown { basho_id, .. }
            | PayloadData::DayResult { basho_id, .. } => Some(*basho_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RikishiDayResult {
    pub name: String,
    pub win: Option<bool>,
}
