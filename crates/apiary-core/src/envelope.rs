//! Canonical inbound event envelope.
//!
//! Both transports (webhook endpoint and push socket) decode into this one
//! shape, so the dispatcher and its tests are transport-agnostic.

use serde::{Deserialize, Serialize};

/// The bare identifiers carried by an inbound envelope. The full object is
/// always re-fetched by id before dispatch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeData {
    pub id: String,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub person_id: Option<String>,
    #[serde(default)]
    pub person_email: Option<String>,
}

/// One inbound platform event, as delivered by either transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Resource the event concerns (e.g. "rooms", "messages").
    pub resource: String,
    /// Event verb (e.g. "created", "deleted").
    pub event: String,
    pub data: EnvelopeData,
    /// Subscription name, present on subscription-sourced envelopes.
    /// Used to confirm the envelope belongs to this runtime.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub filter: Option<String>,
}

/// Canonical event taxonomy. Envelopes with any other (resource, event)
/// pair are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    RoomCreated,
    RoomUpdated,
    MembershipCreated,
    MembershipUpdated,
    MembershipDeleted,
    MessageCreated,
    MessageDeleted,
    AttachmentActionCreated,
}

impl EventKind {
    /// Resolve a (resource, event) pair to a canonical kind.
    pub fn from_parts(resource: &str, event: &str) -> Option<Self> {
        match (resource, event) {
            ("rooms", "created") => Some(Self::RoomCreated),
            ("rooms", "updated") => Some(Self::RoomUpdated),
            ("memberships", "created") => Some(Self::MembershipCreated),
            ("memberships", "updated") => Some(Self::MembershipUpdated),
            ("memberships", "deleted") => Some(Self::MembershipDeleted),
            ("messages", "created") => Some(Self::MessageCreated),
            ("messages", "deleted") => Some(Self::MessageDeleted),
            ("attachmentActions", "created") => Some(Self::AttachmentActionCreated),
            _ => None,
        }
    }
}
