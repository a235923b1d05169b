//! Event dispatch — canonical envelopes in, handler invocations out.
//!
//! Envelopes failing the ownership check are dropped. Known events resolve
//! the full object by id, then fan out to the generic event stream, the
//! lifecycle paths, and (for new messages) the trigger/lexicon pipeline.

use super::{Runtime, RuntimeEvent};
use crate::runtime::trigger;
use apiary_core::envelope::{Envelope, EventKind};
use apiary_core::types::{webhook_name, webhook_owner, webhook_scope};
use tracing::{debug, warn};

impl Runtime {
    /// Route one inbound envelope.
    pub(crate) async fn dispatch(&self, envelope: Envelope) {
        if !self.owns_envelope(&envelope) {
            debug!(
                "dropping envelope not owned by this runtime: {:?}",
                envelope.name
            );
            return;
        }

        let Some(kind) = EventKind::from_parts(&envelope.resource, &envelope.event) else {
            debug!(
                "dropping envelope with unrecognized pair ({}, {})",
                envelope.resource, envelope.event
            );
            return;
        };

        match kind {
            EventKind::RoomCreated => self.on_room_created(&envelope).await,
            EventKind::RoomUpdated => self.on_room_updated(&envelope).await,
            EventKind::MembershipCreated => self.on_membership_created(&envelope).await,
            EventKind::MembershipUpdated => self.on_membership_updated(&envelope).await,
            EventKind::MembershipDeleted => self.on_membership_deleted(&envelope).await,
            EventKind::MessageCreated => self.on_message_created(&envelope).await,
            EventKind::MessageDeleted => self.on_message_deleted(&envelope).await,
            EventKind::AttachmentActionCreated => self.on_attachment_action(&envelope).await,
        }
    }

    /// Subscription-sourced envelopes must carry a name owned by this
    /// runtime and, when room-scoped, matching the envelope's room.
    /// Envelopes without a name (push-socket frames) are always ours.
    fn owns_envelope(&self, envelope: &Envelope) -> bool {
        let Some(name) = envelope.name.as_deref() else {
            return true;
        };
        if webhook_owner(name) != self.owner() {
            return false;
        }
        match (webhook_scope(name), envelope.data.room_id.as_deref()) {
            (Some(scope), Some(room_id)) => {
                webhook_name(self.owner(), Some(room_id)) == name && scope == room_id
            }
            _ => true,
        }
    }

    async fn on_room_created(&self, envelope: &Envelope) {
        match self.platform.room(&envelope.data.id).await {
            Ok(room) => {
                self.emit(RuntimeEvent::RoomCreated(room.clone()));
                if let Err(e) = self.spawn_bot(&room.id).await {
                    warn!("room {} created but spawn failed: {e}", room.id);
                }
            }
            Err(e) => debug!("dropping roomCreated for {}: {e}", envelope.data.id),
        }
    }

    async fn on_room_updated(&self, envelope: &Envelope) {
        let room = match self.platform.room(&envelope.data.id).await {
            Ok(room) => room,
            Err(e) => {
                debug!("dropping roomUpdated for {}: {e}", envelope.data.id);
                return;
            }
        };

        if let Some(bot) = self.bot_for(&room.id).await {
            let was_locked = bot.room().await.is_locked;
            bot.replace_room(room.clone()).await;
            if !was_locked && room.is_locked {
                self.emit(RuntimeEvent::RoomLocked(room.clone()));
            } else if was_locked && !room.is_locked {
                self.emit(RuntimeEvent::RoomUnlocked(room.clone()));
            }
        }
        self.emit(RuntimeEvent::RoomUpdated(room));
    }

    async fn on_membership_created(&self, envelope: &Envelope) {
        match self.platform.membership(&envelope.data.id).await {
            Ok(membership) => {
                self.emit(RuntimeEvent::MembershipCreated(membership.clone()));
                // The runtime was added to a room: attach a bot.
                if membership.person_id == self.identity.id {
                    if let Err(e) = self.spawn_bot(&membership.room_id).await {
                        warn!(
                            "joined room {} but spawn failed: {e}",
                            membership.room_id
                        );
                    }
                }
            }
            Err(e) => debug!("dropping membershipCreated for {}: {e}", envelope.data.id),
        }
    }

    async fn on_membership_updated(&self, envelope: &Envelope) {
        match self.platform.membership(&envelope.data.id).await {
            Ok(membership) => self.emit(RuntimeEvent::MembershipUpdated(membership)),
            Err(e) => debug!("dropping membershipUpdated for {}: {e}", envelope.data.id),
        }
    }

    /// The membership object is already gone; work from the envelope data.
    async fn on_membership_deleted(&self, envelope: &Envelope) {
        let Some(room_id) = envelope.data.room_id.clone() else {
            debug!("dropping membershipDeleted without room id");
            return;
        };
        let person_id = envelope.data.person_id.clone().unwrap_or_default();

        if person_id == self.identity.id {
            // The runtime's own membership ended: the bot is now a zombie.
            self.despawn_bot(&room_id).await;
        }
        self.emit(RuntimeEvent::MembershipDeleted { room_id, person_id });
    }

    async fn on_message_created(&self, envelope: &Envelope) {
        let message = match self.platform.message(&envelope.data.id).await {
            Ok(message) => message,
            Err(e) => {
                debug!("dropping messageCreated for {}: {e}", envelope.data.id);
                return;
            }
        };

        self.emit(RuntimeEvent::MessageCreated(message.clone()));

        // Self-authored messages never reach the lexicon.
        if message.person_id == self.identity.id
            || self
                .identity
                .emails
                .iter()
                .any(|email| email.eq_ignore_ascii_case(&message.person_email))
        {
            debug!("suppressing self-authored message {}", message.id);
            return;
        }

        let bot = match self.bot_for(&message.room_id).await {
            Some(bot) => bot,
            // A message from a room we have no instance for yet: attach one.
            None => match self.spawn_bot(&message.room_id).await {
                Ok(bot) => bot,
                Err(e) => {
                    warn!(
                        "message in room {} but spawn failed: {e}",
                        message.room_id
                    );
                    return;
                }
            },
        };

        let room_kind = bot.room().await.kind;
        let built = trigger::build(
            &self.platform,
            &self.identity,
            &message.room_id,
            room_kind,
            &message,
        )
        .await;
        let trigger = match built {
            Ok(trigger) => trigger,
            Err(e) => {
                warn!("trigger build failed for message {}: {e}", message.id);
                return;
            }
        };

        for rule in self.lexicon.matches(&trigger) {
            (rule.handler)(bot.clone(), trigger.clone()).await;
        }
    }

    async fn on_message_deleted(&self, envelope: &Envelope) {
        self.emit(RuntimeEvent::MessageDeleted {
            room_id: envelope.data.room_id.clone().unwrap_or_default(),
            message_id: envelope.data.id.clone(),
        });
    }

    async fn on_attachment_action(&self, envelope: &Envelope) {
        match self.platform.attachment_action(&envelope.data.id).await {
            Ok(action) => self.emit(RuntimeEvent::AttachmentAction(action)),
            Err(e) => debug!("dropping attachmentAction for {}: {e}", envelope.data.id),
        }
    }
}
