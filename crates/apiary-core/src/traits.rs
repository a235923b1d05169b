use crate::error::Result;
use crate::types::{
    AttachmentAction, MembershipRef, MessageRef, OutgoingMessage, PersonRef, RoomRef,
    WebhookRef, WebhookRequest,
};
use async_trait::async_trait;

/// Remote messaging platform — the world the runtime converges against.
///
/// Consumed as an opaque contract: every call either returns the fetched or
/// mutated object, or fails. The reqwest-backed implementation lives in
/// `apiary-client`; tests inject scripted fakes.
#[async_trait]
pub trait Platform: Send + Sync {
    /// The runtime's own platform account.
    async fn me(&self) -> Result<PersonRef>;

    async fn person(&self, id: &str) -> Result<PersonRef>;

    async fn room(&self, id: &str) -> Result<RoomRef>;

    /// Authoritative list of rooms this account occupies.
    async fn rooms(&self) -> Result<Vec<RoomRef>>;

    async fn delete_room(&self, id: &str) -> Result<()>;

    async fn membership(&self, id: &str) -> Result<MembershipRef>;

    /// All memberships in a room.
    async fn memberships(&self, room_id: &str) -> Result<Vec<MembershipRef>>;

    async fn add_membership(&self, room_id: &str, email: &str) -> Result<MembershipRef>;

    async fn delete_membership(&self, id: &str) -> Result<()>;

    async fn message(&self, id: &str) -> Result<MessageRef>;

    async fn send_to_room(&self, room_id: &str, message: &OutgoingMessage) -> Result<MessageRef>;

    async fn send_to_person(&self, email: &str, message: &OutgoingMessage) -> Result<MessageRef>;

    /// Authoritative list of this account's subscriptions.
    async fn webhooks(&self) -> Result<Vec<WebhookRef>>;

    async fn create_webhook(&self, request: &WebhookRequest) -> Result<WebhookRef>;

    async fn delete_webhook(&self, id: &str) -> Result<()>;

    async fn attachment_action(&self, id: &str) -> Result<AttachmentAction>;

    /// Fetch attachment content bytes by URL.
    async fn content(&self, url: &str) -> Result<Vec<u8>>;
}

/// Pluggable persistence backend, namespaced by scope (a room id).
///
/// Omitting `key` addresses the whole scope.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store a value under `scope`/`key`, returning the stored value.
    async fn create(
        &self,
        scope: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<serde_json::Value>;

    /// Read one key, or the whole scope as an object when `key` is `None`.
    /// Missing keys and scopes are a [`crate::ApiaryError::Storage`] failure.
    async fn read(&self, scope: &str, key: Option<&str>) -> Result<serde_json::Value>;

    /// Delete one key, or the whole scope when `key` is `None`.
    async fn delete(&self, scope: &str, key: Option<&str>) -> Result<()>;
}
