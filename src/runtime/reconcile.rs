//! Reconciliation loop — periodic convergence of local bots and remote
//! subscriptions against authoritative platform state.
//!
//! Passes run strictly in order within a tick: dedup, subscription gaps,
//! zombies, drones. Each pass tolerates failure independently; a failed
//! remote call is logged and retried on the next tick. Ticks themselves may
//! overlap in wall-clock effect, so every pass is idempotent.

use super::Runtime;
use apiary_core::types::{webhook_name, webhook_owner, RoomRef, WebhookRef, WebhookRequest};
use std::collections::HashSet;
use tracing::{error, info, warn};

impl Runtime {
    /// Background task: converge on a fixed period.
    pub(crate) async fn reconcile_loop(self: std::sync::Arc<Self>) {
        let period = std::time::Duration::from_secs(self.config.reconcile.interval_secs);
        loop {
            self.reconcile_tick().await;
            tokio::time::sleep(period).await;
        }
    }

    /// One full convergence pass. Never returns an error: every failure is
    /// local to its pass and retried next tick.
    pub(crate) async fn reconcile_tick(&self) {
        let rooms = match self.platform.rooms().await {
            Ok(rooms) => Some(rooms),
            Err(e) => {
                error!("reconcile: room list fetch failed, skipping room passes: {e}");
                None
            }
        };

        let webhooks = match self.platform.webhooks().await {
            Ok(hooks) => Some(self.dedup_webhooks(hooks).await),
            Err(e) => {
                error!("reconcile: webhook list fetch failed, skipping webhook passes: {e}");
                None
            }
        };

        if let (Some(rooms), Some(webhooks)) = (&rooms, &webhooks) {
            self.fill_webhook_gaps(rooms, webhooks).await;
        }

        if let Some(rooms) = &rooms {
            self.reap_zombies(rooms).await;
            self.spawn_drones(rooms).await;
        }
    }

    /// Dedup pass: for each group of subscriptions sharing a name, keep the
    /// first encountered and delete the rest. Returns the deduplicated
    /// working set.
    async fn dedup_webhooks(&self, webhooks: Vec<WebhookRef>) -> Vec<WebhookRef> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut kept = Vec::with_capacity(webhooks.len());

        for webhook in webhooks {
            if seen.insert(webhook.name.clone()) {
                kept.push(webhook);
                continue;
            }
            info!(
                "reconcile: deleting duplicate subscription {} ({})",
                webhook.name, webhook.id
            );
            if let Err(e) = self.platform.delete_webhook(&webhook.id).await {
                warn!("reconcile: duplicate delete failed, retrying next tick: {e}");
            }
        }

        kept
    }

    /// Subscription gap pass: every room needs exactly one subscription
    /// owned by this runtime.
    async fn fill_webhook_gaps(&self, rooms: &[RoomRef], webhooks: &[WebhookRef]) {
        let owned_scopes: HashSet<&str> = webhooks
            .iter()
            .filter(|w| webhook_owner(&w.name) == self.owner())
            .filter_map(|w| w.room_scope())
            .collect();

        for room in rooms {
            if owned_scopes.contains(room.id.as_str()) {
                continue;
            }
            let request = WebhookRequest {
                name: webhook_name(self.owner(), Some(&room.id)),
                target_url: self.config.transport.public_url.clone(),
                resource: "all".into(),
                event: "all".into(),
                filter: Some(format!("roomId={}", room.id)),
            };
            match self.platform.create_webhook(&request).await {
                Ok(_) => info!("reconcile: created subscription for room {}", room.id),
                Err(e) => warn!(
                    "reconcile: subscription create failed for room {}, retrying next tick: {e}",
                    room.id
                ),
            }
        }
    }

    /// Zombie pass: tear down bots whose room no longer exists remotely.
    async fn reap_zombies(&self, rooms: &[RoomRef]) {
        let remote_ids: HashSet<&str> = rooms.iter().map(|r| r.id.as_str()).collect();
        let zombies: Vec<String> = self
            .bots
            .lock()
            .await
            .iter()
            .filter(|b| !remote_ids.contains(b.room_id()))
            .map(|b| b.room_id().to_string())
            .collect();

        for room_id in zombies {
            info!("reconcile: room {room_id} vanished, tearing down zombie bot");
            self.despawn_bot(&room_id).await;
        }
    }

    /// Drone pass: spawn a bot for every room lacking one.
    async fn spawn_drones(&self, rooms: &[RoomRef]) {
        let live_ids: HashSet<String> = self
            .bots
            .lock()
            .await
            .iter()
            .map(|b| b.room_id().to_string())
            .collect();

        for room in rooms {
            if live_ids.contains(&room.id) {
                continue;
            }
            match self.spawn_bot(&room.id).await {
                Ok(_) => {}
                Err(e) => warn!(
                    "reconcile: spawn failed for room {}, retrying next tick: {e}",
                    room.id
                ),
            }
        }
    }
}
