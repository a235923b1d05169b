//! Scripted platform double for runtime tests.
//!
//! Holds an injectable snapshot of remote state (rooms, webhooks,
//! memberships, messages) and records every mutation, so a single
//! reconciliation tick or dispatch can be asserted deterministically.

use apiary_core::error::{ApiaryError, Result};
use apiary_core::traits::Platform;
use apiary_core::types::{
    AttachmentAction, MembershipRef, MessageRef, OutgoingMessage, PersonRef, RoomKind, RoomRef,
    WebhookRef, WebhookRequest,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
pub(crate) struct FakeState {
    pub rooms: Vec<RoomRef>,
    pub webhooks: Vec<WebhookRef>,
    pub memberships: Vec<MembershipRef>,
    pub messages: HashMap<String, MessageRef>,
    pub people: HashMap<String, PersonRef>,
    pub content: HashMap<String, Vec<u8>>,
    /// Addresses whose add_membership call fails remotely.
    pub failing_adds: Vec<String>,
    /// When set, the room list fetch fails (network error).
    pub fail_rooms: bool,

    // Recorded mutations.
    pub created_webhooks: Vec<WebhookRequest>,
    pub deleted_webhooks: Vec<String>,
    pub added_memberships: Vec<(String, String)>,
    pub deleted_memberships: Vec<String>,
    pub deleted_rooms: Vec<String>,
    pub sent: Vec<(String, OutgoingMessage)>,
    next_id: u64,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

pub(crate) struct FakePlatform {
    pub me: PersonRef,
    pub state: Mutex<FakeState>,
}

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            me: person("p-bot", "helper@bots.example.com", "Helper Bot"),
            state: Mutex::new(FakeState::default()),
        })
    }

    /// Seed a room plus the runtime's own membership in it.
    pub async fn seed_room(&self, id: &str) {
        let mut state = self.state.lock().await;
        state.rooms.push(room(id));
        let membership_id = state.next_id("m");
        state.memberships.push(MembershipRef {
            id: membership_id,
            room_id: id.to_string(),
            person_id: self.me.id.clone(),
            person_email: self.me.emails[0].clone(),
            person_display_name: self.me.display_name.clone(),
            is_moderator: false,
            created: Utc::now(),
        });
    }
}

pub(crate) fn room(id: &str) -> RoomRef {
    RoomRef {
        id: id.to_string(),
        title: format!("Room {id}"),
        kind: RoomKind::Group,
        is_locked: false,
        created: Utc::now(),
        last_activity: None,
    }
}

pub(crate) fn person(id: &str, email: &str, display_name: &str) -> PersonRef {
    PersonRef {
        id: id.to_string(),
        emails: vec![email.to_string()],
        display_name: display_name.to_string(),
        created: Some(Utc::now()),
    }
}

pub(crate) fn message(id: &str, room_id: &str, author: &PersonRef, text: &str) -> MessageRef {
    MessageRef {
        id: id.to_string(),
        room_id: room_id.to_string(),
        person_id: author.id.clone(),
        person_email: author.emails.first().cloned().unwrap_or_default(),
        text: text.to_string(),
        markdown: None,
        mentioned_people: Vec::new(),
        files: Vec::new(),
        created: Utc::now(),
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn me(&self) -> Result<PersonRef> {
        Ok(self.me.clone())
    }

    async fn person(&self, id: &str) -> Result<PersonRef> {
        if id == self.me.id {
            return Ok(self.me.clone());
        }
        self.state
            .lock()
            .await
            .people
            .get(id)
            .cloned()
            .ok_or_else(|| ApiaryError::Platform(format!("no such person {id}")))
    }

    async fn room(&self, id: &str) -> Result<RoomRef> {
        self.state
            .lock()
            .await
            .rooms
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| ApiaryError::Platform(format!("no such room {id}")))
    }

    async fn rooms(&self) -> Result<Vec<RoomRef>> {
        let state = self.state.lock().await;
        if state.fail_rooms {
            return Err(ApiaryError::Platform("room list unavailable".into()));
        }
        Ok(state.rooms.clone())
    }

    async fn delete_room(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.rooms.retain(|r| r.id != id);
        state.deleted_rooms.push(id.to_string());
        Ok(())
    }

    async fn membership(&self, id: &str) -> Result<MembershipRef> {
        self.state
            .lock()
            .await
            .memberships
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| ApiaryError::Platform(format!("no such membership {id}")))
    }

    async fn memberships(&self, room_id: &str) -> Result<Vec<MembershipRef>> {
        Ok(self
            .state
            .lock()
            .await
            .memberships
            .iter()
            .filter(|m| m.room_id == room_id)
            .cloned()
            .collect())
    }

    async fn add_membership(&self, room_id: &str, email: &str) -> Result<MembershipRef> {
        let mut state = self.state.lock().await;
        if state.failing_adds.iter().any(|e| e == email) {
            return Err(ApiaryError::Platform(format!("add rejected for {email}")));
        }
        let membership = MembershipRef {
            id: state.next_id("m"),
            room_id: room_id.to_string(),
            person_id: state.next_id("p"),
            person_email: email.to_string(),
            person_display_name: String::new(),
            is_moderator: false,
            created: Utc::now(),
        };
        state.memberships.push(membership.clone());
        state
            .added_memberships
            .push((room_id.to_string(), email.to_string()));
        Ok(membership)
    }

    async fn delete_membership(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.memberships.retain(|m| m.id != id);
        state.deleted_memberships.push(id.to_string());
        Ok(())
    }

    async fn message(&self, id: &str) -> Result<MessageRef> {
        self.state
            .lock()
            .await
            .messages
            .get(id)
            .cloned()
            .ok_or_else(|| ApiaryError::Platform(format!("no such message {id}")))
    }

    async fn send_to_room(&self, room_id: &str, msg: &OutgoingMessage) -> Result<MessageRef> {
        let mut state = self.state.lock().await;
        state.sent.push((room_id.to_string(), msg.clone()));
        let id = state.next_id("msg");
        Ok(MessageRef {
            id,
            room_id: room_id.to_string(),
            person_id: self.me.id.clone(),
            person_email: self.me.emails[0].clone(),
            text: msg.text.clone().unwrap_or_default(),
            markdown: msg.markdown.clone(),
            mentioned_people: Vec::new(),
            files: Vec::new(),
            created: Utc::now(),
        })
    }

    async fn send_to_person(&self, email: &str, msg: &OutgoingMessage) -> Result<MessageRef> {
        let mut state = self.state.lock().await;
        state.sent.push((email.to_string(), msg.clone()));
        let id = state.next_id("msg");
        Ok(MessageRef {
            id,
            room_id: format!("direct-{email}"),
            person_id: self.me.id.clone(),
            person_email: self.me.emails[0].clone(),
            text: msg.text.clone().unwrap_or_default(),
            markdown: msg.markdown.clone(),
            mentioned_people: Vec::new(),
            files: Vec::new(),
            created: Utc::now(),
        })
    }

    async fn webhooks(&self) -> Result<Vec<WebhookRef>> {
        Ok(self.state.lock().await.webhooks.clone())
    }

    async fn create_webhook(&self, request: &WebhookRequest) -> Result<WebhookRef> {
        let mut state = self.state.lock().await;
        let webhook = WebhookRef {
            id: state.next_id("wh"),
            name: request.name.clone(),
            target_url: request.target_url.clone(),
            resource: request.resource.clone(),
            event: request.event.clone(),
            filter: request.filter.clone(),
        };
        state.webhooks.push(webhook.clone());
        state.created_webhooks.push(request.clone());
        Ok(webhook)
    }

    async fn delete_webhook(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.webhooks.retain(|w| w.id != id);
        state.deleted_webhooks.push(id.to_string());
        Ok(())
    }

    async fn attachment_action(&self, id: &str) -> Result<AttachmentAction> {
        Err(ApiaryError::Platform(format!(
            "no such attachment action {id}"
        )))
    }

    async fn content(&self, url: &str) -> Result<Vec<u8>> {
        self.state
            .lock()
            .await
            .content
            .get(url)
            .cloned()
            .ok_or_else(|| ApiaryError::Platform(format!("no content at {url}")))
    }
}
