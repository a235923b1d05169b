//! Runtime — the controller owning the live bot set, the lexicon, and the
//! background loops that keep both converged with remote platform state.

pub mod bot;
mod dispatch;
pub mod lexicon;
mod reconcile;
pub mod scheduler;
#[cfg(test)]
pub(crate) mod testutil;
pub mod trigger;

pub use bot::Bot;
pub use lexicon::{Handler, Lexicon, Matcher};
pub use trigger::Trigger;

use apiary_core::config::Config;
use apiary_core::envelope::Envelope;
use apiary_core::error::Result;
use apiary_core::traits::{Platform, Storage};
use apiary_core::types::{
    webhook_name, AttachmentAction, MembershipRef, MessageRef, PersonRef, RoomRef, WebhookRequest,
};
use apiary_core::ApiaryError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{info, warn};

/// Lifecycle events emitted for external observers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A bot instance went live for a room.
    Spawn { room_id: String },
    /// A bot instance was torn down.
    Despawn { room_id: String },
    RoomCreated(RoomRef),
    RoomUpdated(RoomRef),
    RoomLocked(RoomRef),
    RoomUnlocked(RoomRef),
    MembershipCreated(MembershipRef),
    MembershipUpdated(MembershipRef),
    MembershipDeleted {
        room_id: String,
        person_id: String,
    },
    MessageCreated(MessageRef),
    MessageDeleted {
        room_id: String,
        message_id: String,
    },
    AttachmentAction(AttachmentAction),
}

/// The central runtime: converges bots and subscriptions against remote
/// state and routes inbound envelopes to handlers.
pub struct Runtime {
    pub(crate) config: Config,
    pub(crate) platform: Arc<dyn Platform>,
    pub(crate) storage: Arc<dyn Storage>,
    /// The runtime's own platform account, resolved once at construction.
    pub(crate) identity: PersonRef,
    pub(crate) lexicon: Lexicon,
    /// Live bot set. Mutated only by reconciliation and lifecycle paths;
    /// dispatch iterates snapshots.
    pub(crate) bots: Mutex<Vec<Arc<Bot>>>,
    pub(crate) events: broadcast::Sender<RuntimeEvent>,
}

impl Runtime {
    /// Build a runtime, resolving the account identity from the platform.
    pub async fn new(
        config: Config,
        platform: Arc<dyn Platform>,
        storage: Arc<dyn Storage>,
    ) -> Result<Self> {
        let identity = platform.me().await?;
        info!(
            "runtime identity: {} <{}>",
            identity.display_name,
            identity.email().unwrap_or("?")
        );
        let (events, _) = broadcast::channel(256);
        Ok(Self {
            config,
            platform,
            storage,
            identity,
            lexicon: Lexicon::new(),
            bots: Mutex::new(Vec::new()),
            events,
        })
    }

    /// Register a command handler. Call before [`Runtime::run`]; the
    /// lexicon is frozen once the runtime starts.
    pub fn hears<F, Fut>(&mut self, matcher: Matcher, handler: F) -> u64
    where
        F: Fn(Arc<Bot>, Trigger) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.lexicon.hears(matcher, handler)
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.events.subscribe()
    }

    /// Owner identity prefix encoded into subscription names.
    pub(crate) fn owner(&self) -> &str {
        &self.config.runtime.name
    }

    pub(crate) fn emit(&self, event: RuntimeEvent) {
        let _ = self.events.send(event);
    }

    /// The live bot for a room, if any.
    pub async fn bot_for(&self, room_id: &str) -> Option<Arc<Bot>> {
        self.bots
            .lock()
            .await
            .iter()
            .find(|b| b.room_id() == room_id)
            .cloned()
    }

    /// Spawn a bot for a room: fetch the room, the runtime's own membership,
    /// and resolve the room's subscription. Any fetch failure discards the
    /// partially built instance; nothing partially-live ever joins the set.
    pub(crate) async fn spawn_bot(&self, room_id: &str) -> Result<Arc<Bot>> {
        if let Some(existing) = self.bot_for(room_id).await {
            return Ok(existing);
        }

        let room = self.platform.room(room_id).await?;
        let membership = self
            .platform
            .memberships(room_id)
            .await?
            .into_iter()
            .find(|m| m.person_id == self.identity.id)
            .ok_or_else(|| {
                ApiaryError::Platform(format!("not a member of room {room_id}"))
            })?;
        let webhook = self.resolve_room_webhook(room_id).await?;

        let bot = Arc::new(Bot::new(
            room,
            membership,
            self.identity.clone(),
            self.platform.clone(),
            self.storage.clone(),
            self.config.scheduler.clone(),
        ));
        bot.attach_subscription(webhook).await;

        {
            let mut bots = self.bots.lock().await;
            // An overlapping tick may have spawned this room while our
            // fetches were outstanding; keep the first instance.
            if let Some(existing) = bots.iter().find(|b| b.room_id() == room_id) {
                return Ok(existing.clone());
            }
            bots.push(bot.clone());
        }

        bot.start().await;
        info!("spawned bot for room {room_id}");
        self.emit(RuntimeEvent::Spawn {
            room_id: room_id.to_string(),
        });
        Ok(bot)
    }

    /// Tear down the bot for a room, if one is live. Idempotent.
    pub(crate) async fn despawn_bot(&self, room_id: &str) {
        let bot = {
            let mut bots = self.bots.lock().await;
            match bots.iter().position(|b| b.room_id() == room_id) {
                Some(index) => Some(bots.remove(index)),
                None => None,
            }
        };

        if let Some(bot) = bot {
            bot.destroy().await;
            info!("despawned bot for room {room_id}");
            self.emit(RuntimeEvent::Despawn {
                room_id: room_id.to_string(),
            });
        }
    }

    /// Find this runtime's subscription for a room, creating it if missing.
    pub(crate) async fn resolve_room_webhook(
        &self,
        room_id: &str,
    ) -> Result<apiary_core::types::WebhookRef> {
        let name = webhook_name(self.owner(), Some(room_id));
        let existing = self
            .platform
            .webhooks()
            .await?
            .into_iter()
            .find(|w| w.name == name);
        if let Some(webhook) = existing {
            return Ok(webhook);
        }

        self.platform
            .create_webhook(&WebhookRequest {
                name,
                target_url: self.config.transport.public_url.clone(),
                resource: "all".into(),
                event: "all".into(),
                filter: Some(format!("roomId={room_id}")),
            })
            .await
    }

    /// Run the runtime: start the configured transport, the reconciliation
    /// loop, and the main dispatch loop, until shutdown.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        info!(
            "apiary runtime running | owner: {} | transport: {:?} | reconcile every {}s",
            self.owner(),
            self.config.transport.mode,
            self.config.reconcile.interval_secs,
        );

        let (tx, mut rx) = mpsc::channel::<Envelope>(256);

        let transport_config = self.config.transport.clone();
        let transport_handle = match transport_config.mode {
            apiary_core::config::TransportMode::Webhook => {
                let tx = tx.clone();
                tokio::spawn(async move {
                    crate::transport::webhook::serve(transport_config, tx).await;
                })
            }
            apiary_core::config::TransportMode::Socket => {
                let tx = tx.clone();
                tokio::spawn(async move {
                    crate::transport::socket::run(transport_config, tx).await;
                })
            }
        };
        drop(tx);

        let reconcile_handle = if self.config.reconcile.enabled {
            let runtime = self.clone();
            Some(tokio::spawn(async move {
                runtime.reconcile_loop().await;
            }))
        } else {
            None
        };

        loop {
            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(envelope) => {
                        let runtime = self.clone();
                        tokio::spawn(async move {
                            runtime.dispatch(envelope).await;
                        });
                    }
                    None => {
                        warn!("transport channel closed, shutting down");
                        break;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("received shutdown signal");
                    break;
                }
            }
        }

        // Shutdown: cancel the recurring loops; in-flight remote calls
        // complete or fail on their own.
        transport_handle.abort();
        if let Some(handle) = reconcile_handle {
            handle.abort();
        }

        let bots: Vec<Arc<Bot>> = self.bots.lock().await.drain(..).collect();
        for bot in bots {
            bot.destroy().await;
        }

        info!("shutdown complete");
        Ok(())
    }
}
