//! Bot instance — the runtime's local representative for one room.
//!
//! Exposes room-scoped operations (messaging, membership, teardown) and a
//! private key/value memory namespaced by room id. Exactly one instance
//! exists per live room; the reconciliation loop enforces that invariant.

use crate::runtime::scheduler::Scheduler;
use apiary_core::address::is_valid_email;
use apiary_core::config::SchedulerConfig;
use apiary_core::error::{ApiaryError, BatchReport, Result};
use apiary_core::traits::{Platform, Storage};
use apiary_core::types::{
    MembershipRef, MessageRef, OutgoingMessage, PersonRef, RoomRef, WebhookRef,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Pause between items of a batch membership operation, to stay under
/// platform rate limits.
const MEMBERSHIP_PACING: std::time::Duration = std::time::Duration::from_millis(250);

/// Per-occupant settle time `implode` waits for removals to be reflected
/// remotely before deleting the room.
const IMPLODE_SETTLE_PER_OCCUPANT: std::time::Duration = std::time::Duration::from_millis(300);

/// The runtime's local representative for one room.
pub struct Bot {
    room_id: String,
    room: Mutex<RoomRef>,
    membership: MembershipRef,
    identity: PersonRef,
    platform: Arc<dyn Platform>,
    storage: Arc<dyn Storage>,
    scheduler: Scheduler,
    /// Named subscriptions owned by this instance, detached on destroy.
    subscriptions: Mutex<Vec<WebhookRef>>,
    active: AtomicBool,
}

impl Bot {
    pub(crate) fn new(
        room: RoomRef,
        membership: MembershipRef,
        identity: PersonRef,
        platform: Arc<dyn Platform>,
        storage: Arc<dyn Storage>,
        scheduler_config: SchedulerConfig,
    ) -> Self {
        Self {
            room_id: room.id.clone(),
            room: Mutex::new(room),
            membership,
            identity,
            platform,
            storage,
            scheduler: Scheduler::new(scheduler_config),
            subscriptions: Mutex::new(Vec::new()),
            active: AtomicBool::new(true),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Current snapshot of the room. Refreshed wholesale from remote state,
    /// never diffed field-by-field.
    pub async fn room(&self) -> RoomRef {
        self.room.lock().await.clone()
    }

    pub(crate) async fn replace_room(&self, room: RoomRef) {
        *self.room.lock().await = room;
    }

    pub fn membership(&self) -> &MembershipRef {
        &self.membership
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub(crate) async fn start(&self) {
        self.scheduler.start().await;
    }

    pub(crate) async fn attach_subscription(&self, webhook: WebhookRef) {
        self.subscriptions.lock().await.push(webhook);
    }

    // --- Messaging ---

    /// Send plain text to the room.
    pub async fn say(&self, text: impl Into<String>) -> Result<MessageRef> {
        self.send(OutgoingMessage::text(text)).await
    }

    /// Send markdown to the room.
    pub async fn say_markdown(&self, markdown: impl Into<String>) -> Result<MessageRef> {
        self.send(OutgoingMessage::markdown(markdown)).await
    }

    /// Send a structured message to the room.
    pub async fn send(&self, message: OutgoingMessage) -> Result<MessageRef> {
        self.platform.send_to_room(&self.room_id, &message).await
    }

    /// Send plain text to a direct conversation with `address`.
    pub async fn dm(&self, address: &str, text: impl Into<String>) -> Result<MessageRef> {
        self.dm_send(address, OutgoingMessage::text(text)).await
    }

    /// Send a structured message to a direct conversation with `address`.
    pub async fn dm_send(&self, address: &str, message: OutgoingMessage) -> Result<MessageRef> {
        if !is_valid_email(address) {
            return Err(ApiaryError::Validation(format!(
                "malformed address: {address}"
            )));
        }
        self.platform.send_to_person(address, &message).await
    }

    // --- Membership ---

    /// Add one or more addresses to the room.
    ///
    /// Each address is validated before the remote call; invalid or failing
    /// items fail individually without aborting the batch. Returns the
    /// aggregate report on full success, `ApiaryError::Batch` otherwise.
    /// Side effects of succeeded items are not rolled back.
    pub async fn add<S: AsRef<str>>(&self, addresses: &[S]) -> Result<BatchReport> {
        let mut report = BatchReport {
            total: addresses.len(),
            ..BatchReport::default()
        };

        for (index, address) in addresses.iter().enumerate() {
            let address = address.as_ref();
            if !is_valid_email(address) {
                warn!("add to {}: malformed address {address}", self.room_id);
                report.failed.push(address.to_string());
                continue;
            }
            match self.platform.add_membership(&self.room_id, address).await {
                Ok(_) => report.succeeded.push(address.to_string()),
                Err(e) => {
                    warn!("add to {}: {address} failed: {e}", self.room_id);
                    report.failed.push(address.to_string());
                }
            }
            if index + 1 < addresses.len() {
                tokio::time::sleep(MEMBERSHIP_PACING).await;
            }
        }

        if report.failed.is_empty() {
            Ok(report)
        } else {
            Err(ApiaryError::Batch(report))
        }
    }

    /// Remove one or more addresses from the room. Same batch semantics as
    /// [`Bot::add`]; an address with no membership in the room fails that
    /// item.
    pub async fn remove<S: AsRef<str>>(&self, addresses: &[S]) -> Result<BatchReport> {
        let mut report = BatchReport {
            total: addresses.len(),
            ..BatchReport::default()
        };

        let occupants = self.platform.memberships(&self.room_id).await?;

        for (index, address) in addresses.iter().enumerate() {
            let address = address.as_ref();
            if !is_valid_email(address) {
                warn!("remove from {}: malformed address {address}", self.room_id);
                report.failed.push(address.to_string());
                continue;
            }

            let membership = occupants
                .iter()
                .find(|m| m.person_email.eq_ignore_ascii_case(address));
            match membership {
                Some(m) => match self.platform.delete_membership(&m.id).await {
                    Ok(()) => report.succeeded.push(address.to_string()),
                    Err(e) => {
                        warn!("remove from {}: {address} failed: {e}", self.room_id);
                        report.failed.push(address.to_string());
                    }
                },
                None => {
                    warn!("remove from {}: {address} is not an occupant", self.room_id);
                    report.failed.push(address.to_string());
                }
            }
            if index + 1 < addresses.len() {
                tokio::time::sleep(MEMBERSHIP_PACING).await;
            }
        }

        if report.failed.is_empty() {
            Ok(report)
        } else {
            Err(ApiaryError::Batch(report))
        }
    }

    /// Empty the room and delete it: remove every occupant except the
    /// runtime itself, wait for the removals to settle remotely, then
    /// delete the room.
    pub async fn implode(&self) -> Result<()> {
        let occupants = self.platform.memberships(&self.room_id).await?;
        let others: Vec<&MembershipRef> = occupants
            .iter()
            .filter(|m| m.person_id != self.identity.id)
            .collect();

        for membership in &others {
            if let Err(e) = self.platform.delete_membership(&membership.id).await {
                warn!(
                    "implode {}: failed to remove {}: {e}",
                    self.room_id, membership.person_email
                );
            }
            tokio::time::sleep(MEMBERSHIP_PACING).await;
        }

        // Settle time proportional to how many removals the platform has to
        // reflect before the room can be deleted.
        tokio::time::sleep(IMPLODE_SETTLE_PER_OCCUPANT * others.len() as u32).await;

        self.platform.delete_room(&self.room_id).await
    }

    // --- Memory ---

    /// Store a value in this room's private memory.
    pub async fn store(&self, key: &str, value: Value) -> Result<Value> {
        self.storage.create(&self.room_id, key, value).await
    }

    /// Recall one key from this room's memory.
    pub async fn recall(&self, key: &str) -> Result<Value> {
        self.storage.read(&self.room_id, Some(key)).await
    }

    /// Recall the whole memory namespace as an object.
    pub async fn recall_all(&self) -> Result<Value> {
        self.storage.read(&self.room_id, None).await
    }

    /// Forget one key.
    pub async fn forget(&self, key: &str) -> Result<()> {
        self.storage.delete(&self.room_id, Some(key)).await
    }

    // --- Teardown ---

    /// Full teardown: stop both task queues, detach named subscriptions,
    /// and release memory. Idempotent; a second call is a no-op, so
    /// overlapping reconciliation ticks can both reach a mid-teardown
    /// instance safely.
    pub async fn destroy(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            debug!("bot {} already destroyed", self.room_id);
            return;
        }

        self.scheduler.stop().await;

        let subscriptions: Vec<WebhookRef> = self.subscriptions.lock().await.drain(..).collect();
        for webhook in subscriptions {
            if let Err(e) = self.platform.delete_webhook(&webhook.id).await {
                warn!("bot {}: failed to detach {}: {e}", self.room_id, webhook.name);
            }
        }

        if let Err(e) = self.storage.delete(&self.room_id, None).await {
            debug!("bot {}: memory release: {e}", self.room_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testutil::{self, FakePlatform};
    use apiary_storage::MemoryStorage;
    use serde_json::json;

    async fn test_bot(platform: Arc<FakePlatform>) -> Bot {
        platform.seed_room("room-1").await;
        let membership = platform.state.lock().await.memberships[0].clone();
        Bot::new(
            testutil::room("room-1"),
            membership,
            platform.me.clone(),
            platform,
            Arc::new(MemoryStorage::new()),
            SchedulerConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_all_valid_succeeds() {
        let platform = FakePlatform::new();
        let bot = test_bot(platform.clone()).await;

        let report = bot
            .add(&["a@example.com", "b@example.com"])
            .await
            .unwrap();
        assert!(report.is_complete());
        assert_eq!(report.total, 2);
        assert_eq!(platform.state.lock().await.added_memberships.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_mixed_batch_accounts_for_every_item() {
        let platform = FakePlatform::new();
        platform
            .state
            .lock()
            .await
            .failing_adds
            .push("refused@example.com".into());
        let bot = test_bot(platform.clone()).await;

        let err = bot
            .add(&["ok@example.com", "not-an-address", "refused@example.com"])
            .await
            .unwrap_err();
        let ApiaryError::Batch(report) = err else {
            panic!("expected batch error");
        };
        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, vec!["ok@example.com"]);
        assert_eq!(report.failed.len() + report.succeeded.len(), report.total);

        // The valid item's side effect stands; the invalid one never hit
        // the platform.
        let state = platform.state.lock().await;
        assert_eq!(state.added_memberships.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_unknown_occupant_fails_per_item() {
        let platform = FakePlatform::new();
        let bot = test_bot(platform.clone()).await;
        bot.add(&["sam@example.com"]).await.unwrap();

        let err = bot
            .remove(&["sam@example.com", "ghost@example.com"])
            .await
            .unwrap_err();
        let ApiaryError::Batch(report) = err else {
            panic!("expected batch error");
        };
        assert_eq!(report.succeeded, vec!["sam@example.com"]);
        assert_eq!(report.failed, vec!["ghost@example.com"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_implode_empties_room_then_deletes_it() {
        let platform = FakePlatform::new();
        let bot = test_bot(platform.clone()).await;
        bot.add(&["a@example.com", "b@example.com"]).await.unwrap();

        bot.implode().await.unwrap();

        let state = platform.state.lock().await;
        // Both occupants removed, own membership kept until room deletion.
        assert_eq!(state.deleted_memberships.len(), 2);
        assert_eq!(state.deleted_rooms, vec!["room-1"]);
    }

    #[tokio::test]
    async fn test_dm_rejects_malformed_address() {
        let platform = FakePlatform::new();
        let bot = test_bot(platform).await;
        let err = bot.dm("not-an-address", "hi").await.unwrap_err();
        assert!(matches!(err, ApiaryError::Validation(_)));
    }

    #[tokio::test]
    async fn test_say_sends_to_own_room() {
        let platform = FakePlatform::new();
        let bot = test_bot(platform.clone()).await;
        bot.say("hello").await.unwrap();

        let state = platform.state.lock().await;
        assert_eq!(state.sent.len(), 1);
        assert_eq!(state.sent[0].0, "room-1");
        assert_eq!(state.sent[0].1.text.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_memory_is_namespaced_by_room() {
        let platform = FakePlatform::new();
        let bot = test_bot(platform).await;

        bot.store("mode", json!("sync")).await.unwrap();
        assert_eq!(bot.recall("mode").await.unwrap(), json!("sync"));
        assert_eq!(bot.recall_all().await.unwrap(), json!({"mode": "sync"}));

        bot.forget("mode").await.unwrap();
        assert!(bot.recall("mode").await.is_err());
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent_and_detaches_subscriptions() {
        let platform = FakePlatform::new();
        let bot = test_bot(platform.clone()).await;
        let webhook = platform
            .create_webhook(&apiary_core::types::WebhookRequest {
                name: "helper:room-1".into(),
                target_url: "https://bots.example.com/envelope".into(),
                resource: "all".into(),
                event: "all".into(),
                filter: None,
            })
            .await
            .unwrap();
        bot.attach_subscription(webhook).await;
        bot.store("k", json!(1)).await.unwrap();

        bot.destroy().await;
        bot.destroy().await;

        assert!(!bot.is_active());
        let state = platform.state.lock().await;
        assert_eq!(state.deleted_webhooks.len(), 1);
        drop(state);
        assert!(bot.recall("k").await.is_err());
    }
}
