use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Conversation space kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Direct,
    Group,
}

/// A remote conversation space. Remote identity is authoritative: refreshed
/// by re-fetch, never diffed field-by-field locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: RoomKind,
    #[serde(default)]
    pub is_locked: bool,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub last_activity: Option<DateTime<Utc>>,
}

/// A person on the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonRef {
    pub id: String,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

impl PersonRef {
    /// Primary address, if the platform reported one.
    pub fn email(&self) -> Option<&str> {
        self.emails.first().map(String::as_str)
    }
}

/// A person's membership in a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipRef {
    pub id: String,
    pub room_id: String,
    pub person_id: String,
    #[serde(default)]
    pub person_email: String,
    #[serde(default)]
    pub person_display_name: String,
    #[serde(default)]
    pub is_moderator: bool,
    pub created: DateTime<Utc>,
}

/// A message fetched from the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    pub room_id: String,
    pub person_id: String,
    #[serde(default)]
    pub person_email: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub markdown: Option<String>,
    /// Person ids mentioned in the message.
    #[serde(default)]
    pub mentioned_people: Vec<String>,
    /// Attachment content URLs.
    #[serde(default)]
    pub files: Vec<String>,
    pub created: DateTime<Utc>,
}

/// An outgoing message: plain text, rich markdown, or either with one
/// attached file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl OutgoingMessage {
    /// Plain text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Rich markdown message.
    pub fn markdown(markdown: impl Into<String>) -> Self {
        Self {
            markdown: Some(markdown.into()),
            ..Self::default()
        }
    }

    /// Attach a file by content URL.
    pub fn with_file(mut self, url: impl Into<String>) -> Self {
        self.file = Some(url.into());
        self
    }
}

/// A remote event subscription (webhook registration).
///
/// `name` encodes the owning runtime's identity and, for room-scoped
/// subscriptions, the room id — see [`webhook_name`] / [`webhook_owner`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRef {
    pub id: String,
    pub name: String,
    pub target_url: String,
    pub resource: String,
    pub event: String,
    #[serde(default)]
    pub filter: Option<String>,
}

impl WebhookRef {
    /// The room id this subscription is scoped to, if any.
    pub fn room_scope(&self) -> Option<&str> {
        webhook_scope(&self.name)
    }
}

/// Request body for creating a subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRequest {
    pub name: String,
    pub target_url: String,
    pub resource: String,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// A submitted card/attachment action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentAction {
    pub id: String,
    #[serde(rename = "type", default)]
    pub action_type: String,
    pub message_id: String,
    pub room_id: String,
    pub person_id: String,
    #[serde(default)]
    pub inputs: serde_json::Value,
    pub created: DateTime<Utc>,
}

/// Separator between owner identity and room scope in subscription names.
const WEBHOOK_SCOPE_SEP: char = ':';

/// Compose a subscription name from the owner identity and an optional room
/// scope: `"{owner}"` or `"{owner}:{room_id}"`.
pub fn webhook_name(owner: &str, room_id: Option<&str>) -> String {
    match room_id {
        Some(room) => format!("{owner}{WEBHOOK_SCOPE_SEP}{room}"),
        None => owner.to_string(),
    }
}

/// The owner identity encoded in a subscription name.
pub fn webhook_owner(name: &str) -> &str {
    name.split(WEBHOOK_SCOPE_SEP).next().unwrap_or(name)
}

/// The room scope encoded in a subscription name, if any.
pub fn webhook_scope(name: &str) -> Option<&str> {
    name.split_once(WEBHOOK_SCOPE_SEP).map(|(_, scope)| scope)
}
