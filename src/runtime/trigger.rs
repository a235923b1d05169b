//! Trigger building — one enriched command context per inbound message.
//!
//! A trigger is ephemeral: built after self-message suppression, handed to
//! every matched handler, and dropped when dispatch finishes.

use apiary_core::error::Result;
use apiary_core::traits::Platform;
use apiary_core::types::{MessageRef, PersonRef, RoomKind};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Punctuation stripped from token edges during normalization.
const EDGE_PUNCTUATION: &[char] = &[
    '.', ',', '!', '?', ';', ':', '(', ')', '[', ']', '{', '}', '"', '\'',
];

/// The message author, with address split into username/domain.
#[derive(Debug, Clone)]
pub struct TriggerPerson {
    pub id: String,
    pub email: String,
    pub username: String,
    pub domain: String,
    pub display_name: String,
}

/// The room the message arrived in.
#[derive(Debug, Clone)]
pub struct TriggerRoom {
    pub id: String,
    pub kind: RoomKind,
}

/// A resolved file attachment.
#[derive(Debug, Clone)]
pub struct TriggerFile {
    pub url: String,
    pub data: Vec<u8>,
}

/// Enriched command context for one inbound message.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub person: TriggerPerson,
    pub room: TriggerRoom,
    pub message_id: String,
    /// Raw message text as the platform delivered it.
    pub text: String,
    /// Case-folded, whitespace-collapsed, punctuation-stripped text with any
    /// leading self-mention removed.
    pub normalized: String,
    /// Normalized text split into ordered tokens.
    pub tokens: Vec<String>,
    /// De-duplicated token set.
    pub words: HashSet<String>,
    /// Mentioned people resolved to full objects (failures dropped).
    pub mentioned: Vec<PersonRef>,
    /// Attachments resolved to content (failures dropped).
    pub files: Vec<TriggerFile>,
    pub created: DateTime<Utc>,
    pub built_at: DateTime<Utc>,
}

/// Case-fold, collapse whitespace and newlines, and strip the fixed
/// punctuation set at word boundaries.
pub fn normalize_text(raw: &str) -> String {
    raw.to_lowercase()
        .split_whitespace()
        .map(|token| token.trim_matches(EDGE_PUNCTUATION))
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strip a leading mention of the runtime itself from an already-normalized
/// token stream: the full display name as a prefix, the first word of the
/// display name, or any of the runtime's own addresses as the first token.
pub fn strip_self_mention(normalized: &str, identity: &PersonRef) -> String {
    let tokens: Vec<&str> = normalized.split(' ').filter(|t| !t.is_empty()).collect();
    if tokens.is_empty() {
        return String::new();
    }

    let name_tokens: Vec<String> = normalize_text(&identity.display_name)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    let skip = if !name_tokens.is_empty()
        && tokens.len() >= name_tokens.len()
        && tokens
            .iter()
            .zip(&name_tokens)
            .all(|(token, name)| token == name)
    {
        name_tokens.len()
    } else if name_tokens.first().is_some_and(|first| tokens[0] == first) {
        1
    } else if identity
        .emails
        .iter()
        .any(|email| tokens[0] == email.to_lowercase())
    {
        1
    } else {
        0
    };

    tokens[skip..].join(" ")
}

/// Build a trigger for an inbound message.
///
/// Mention and attachment resolution failures drop that item rather than
/// failing the whole trigger.
pub async fn build(
    platform: &Arc<dyn Platform>,
    identity: &PersonRef,
    room_id: &str,
    room_kind: RoomKind,
    message: &MessageRef,
) -> Result<Trigger> {
    let person_ref = platform.person(&message.person_id).await?;
    let email = if message.person_email.is_empty() {
        person_ref.email().unwrap_or_default().to_string()
    } else {
        message.person_email.clone()
    };
    let (username, domain) = email
        .split_once('@')
        .map(|(u, d)| (u.to_string(), d.to_string()))
        .unwrap_or_default();

    let normalized = strip_self_mention(&normalize_text(&message.text), identity);
    let tokens: Vec<String> = normalized
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    let words: HashSet<String> = tokens.iter().cloned().collect();

    let mut mentioned = Vec::new();
    for person_id in &message.mentioned_people {
        if person_id == &identity.id {
            continue;
        }
        match platform.person(person_id).await {
            Ok(person) => mentioned.push(person),
            Err(e) => debug!("dropping unresolvable mention {person_id}: {e}"),
        }
    }

    let mut files = Vec::new();
    for url in &message.files {
        match platform.content(url).await {
            Ok(data) => files.push(TriggerFile {
                url: url.clone(),
                data,
            }),
            Err(e) => debug!("dropping unresolvable attachment {url}: {e}"),
        }
    }

    Ok(Trigger {
        person: TriggerPerson {
            id: message.person_id.clone(),
            email,
            username,
            domain,
            display_name: person_ref.display_name,
        },
        room: TriggerRoom {
            id: room_id.to_string(),
            kind: room_kind,
        },
        message_id: message.id.clone(),
        text: message.text.clone(),
        normalized,
        tokens,
        words,
        mentioned,
        files,
        created: message.created,
        built_at: Utc::now(),
    })
}

/// Bare trigger over a raw text line, for matcher tests.
#[cfg(test)]
pub(crate) fn test_trigger(text: &str) -> Trigger {
    let normalized = normalize_text(text);
    let tokens: Vec<String> = normalized
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    let words = tokens.iter().cloned().collect();
    Trigger {
        person: TriggerPerson {
            id: "p-test".into(),
            email: "tester@example.com".into(),
            username: "tester".into(),
            domain: "example.com".into(),
            display_name: "Tester".into(),
        },
        room: TriggerRoom {
            id: "room-test".into(),
            kind: RoomKind::Group,
        },
        message_id: "msg-test".into(),
        text: text.to_string(),
        normalized,
        tokens,
        words,
        mentioned: Vec::new(),
        files: Vec::new(),
        created: Utc::now(),
        built_at: Utc::now(),
    }
}
