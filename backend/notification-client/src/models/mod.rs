use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

/// A notification as the backend reports it.
///
/// The client only ever holds a cached, possibly stale, copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    pub title: String,
    #[serde(alias = "body")]
    pub message: String,
    /// Older backend revisions call this `readStatus`
    #[serde(default, alias = "readStatus")]
    pub read: bool,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
}

impl Notification {
    /// Parse a pushed payload
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn is_unread(&self) -> bool {
        !self.read
    }
}

/// `GET /notifications/unread-count`
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountResponse {
    #[serde(default)]
    pub unread_notifications: u64,
}

/// `GET /notifications/all`, either paginated or a bare array
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NotificationListResponse {
    Page { content: Vec<Notification> },
    List(Vec<Notification>),
}

impl NotificationListResponse {
    pub fn into_notifications(self) -> Vec<Notification> {
        match self {
            NotificationListResponse::Page { content } => content,
            NotificationListResponse::List(items) => items,
        }
    }
}

/// Audience of a broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Students,
    Staff,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Students => "students",
            Audience::Staff => "staff",
        }
    }
}

/// `POST /notifications/broadcast/{students|staff}`
#[derive(Debug, Clone, Serialize, Validate)]
pub struct BroadcastRequest {
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub title: String,
    #[validate(length(min = 1, message = "message must not be empty"))]
    pub message: String,
}

/// `POST /notifications/send`
#[derive(Debug, Clone, Serialize, Validate)]
pub struct SendNotificationRequest {
    #[validate(length(min = 1, message = "at least one recipient is required"))]
    pub recipients: Vec<String>,
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub title: String,
    #[validate(length(min = 1, message = "message must not be empty"))]
    pub message: String,
}

/// `POST /auth/refresh`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Ids are opaque: accept JSON strings and numbers alike
fn opaque_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Text(s) => Ok(s),
        RawId::Number(n) => Ok(n.to_string()),
    }
}

/// RFC 3339 or a zone-less local timestamp, which is taken as UTC
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };

    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}
