//! Event projection: folds one realtime event into the store.
//!
//! The steps run in a fixed order inside the caller's unit of work:
//!
//! 1. the event's user is upserted
//! 2. the event's channel is upserted
//! 3. the event's message is upserted, if it is known or the event kind
//!    creates unknown messages; hard deletes tombstone it
//! 4. the signed-in user snapshot is stored
//! 5. unread counters are stored
//! 6. the signed-in user's own reactions are kept in sync
//! 7. the channel preview moves forward on `message.new`
//! 8. kind-specific side effects (typing, members, reads, channel
//!    deletion and truncation, user deactivation)
//!
//! A malformed channel id skips the step that needed it. Every other
//! failure aborts the event and the unit of work is rolled back.

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use ripple_types::{ChannelId, Event, EventType, reaction_id};

use crate::cache::PreWarmedCache;
use crate::session::Session;
use crate::{DatabaseError, DatabaseResult};

impl Session<'_> {
    pub fn save_event(&mut self, event: &Event) -> DatabaseResult<()> {
        let event_type = event.event_type();
        if event_type == EventType::Unknown {
            trace!("Ignoring event of unknown type");
            return Ok(());
        }
        debug!(event = event_type.as_str(), cid = ?event.cid(), "Projecting event");

        let mut cache = PreWarmedCache::new();

        if let Some(user) = event.user() {
            self.save_user(user, None, Some(&mut cache))?;
        }

        if let Some(channel) = event.channel() {
            skip_invalid(
                event_type,
                self.save_channel(channel, None, Some(&mut cache)).map(|_| ()),
            )?;
        }

        self.save_message_if_needed(event, &mut cache)?;

        if let Some(me) = event.me() {
            self.save_current_user(me)?;
        }

        if let Some(counts) = event.unread_counts() {
            self.save_current_user_unread_count(counts)?;
        }

        self.sync_own_reactions(event)?;

        if event_type == EventType::MessageNew {
            self.update_channel_preview(event)?;
        }

        self.apply_side_effects(event)
    }

    fn save_message_if_needed(&mut self, event: &Event, cache: &mut PreWarmedCache) -> DatabaseResult<()> {
        let Some(payload) = event.message() else {
            return Ok(());
        };
        let Some(cid) = event_cid(event) else {
            return Ok(());
        };

        let event_type = event.event_type();
        if !self.message_exists(&payload.id)? && !event_type.creates_unknown_messages() {
            trace!(
                event = event_type.as_str(),
                message_id = %payload.id,
                "Skipping message not stored locally"
            );
            return Ok(());
        }

        let saved = skip_invalid(
            event_type,
            self.save_message(payload, Some(&cid), false, Some(cache)),
        )?;
        let Some(saved) = saved else {
            return Ok(());
        };

        match event {
            Event::MessageDeleted(deleted) if deleted.hard_delete => {
                self.mark_hard_deleted(&saved.id)?;
                return Ok(());
            }
            Event::MessageUpdated(_) => {
                self.propagate_update_to_quoting(&saved.id, saved.updated_at)?;
            }
            _ => {}
        }

        if event_type.is_new_message() && saved.parent_id.is_some() {
            self.set_show_inside_thread(&saved.id)?;
        }
        Ok(())
    }

    /// Socket payloads carry no `own_reactions`; keep them in sync from the
    /// signed-in user's reaction events on messages already stored.
    fn sync_own_reactions(&mut self, event: &Event) -> DatabaseResult<()> {
        let (Event::ReactionNew(e) | Event::ReactionUpdated(e) | Event::ReactionDeleted(e)) = event
        else {
            return Ok(());
        };

        let Some(current_user_id) = self.current_user_id()? else {
            return Ok(());
        };
        if e.user.as_ref().map(|u| u.id.as_str()) != Some(current_user_id.as_str()) {
            return Ok(());
        }

        let reaction = &e.reaction;
        if !self.message_exists(&reaction.message_id)? {
            trace!(message_id = %reaction.message_id, "Skipping reaction on unknown message");
            return Ok(());
        }

        match event {
            Event::ReactionNew(_) => {
                let saved = self.save_reaction(reaction, None)?;
                self.append_own_reaction(&saved.message_id, &saved.id)?;
            }
            Event::ReactionUpdated(_) => {
                self.save_reaction(reaction, None)?;
            }
            _ => {
                let id = reaction_id(&current_user_id, &reaction.message_id, &reaction.reaction_type);
                self.remove_own_reaction(&reaction.message_id, &id)?;
                self.delete_reaction(&id)?;
            }
        }
        Ok(())
    }

    /// Moves the preview to the newest eligible message, never backwards.
    fn update_channel_preview(&mut self, event: &Event) -> DatabaseResult<()> {
        let Some(cid) = event_cid(event) else {
            return Ok(());
        };
        let Some(channel) = self.channel(&cid)? else {
            return Ok(());
        };

        let candidate = self.preview(&cid)?;
        let current_created_at = match &channel.preview_message_id {
            Some(id) => self.message(id)?.map(|m| m.created_at),
            None => None,
        };

        let candidate_at = candidate
            .as_ref()
            .map_or(DateTime::<Utc>::MAX_UTC, |m| m.created_at);
        let current_at = current_created_at.unwrap_or(DateTime::<Utc>::MIN_UTC);

        if candidate_at > current_at {
            self.set_preview(&cid, candidate.as_ref().map(|m| m.id.as_str()))?;
        }
        Ok(())
    }

    fn apply_side_effects(&mut self, event: &Event) -> DatabaseResult<()> {
        match event {
            Event::TypingStart(e) | Event::TypingStop(e) => {
                let (Some(cid), Some(user)) = (event_cid(event), &e.user) else {
                    return Ok(());
                };
                if matches!(event, Event::TypingStart(_)) {
                    self.add_typing_user(&cid, &user.id)?;
                } else {
                    self.remove_typing_user(&cid, &user.id)?;
                }
            }
            Event::MemberAdded(e) | Event::MemberUpdated(e) | Event::MemberRemoved(e) => {
                let Some(cid) = event_cid(event) else {
                    return Ok(());
                };
                if !self.channel_exists(&cid)? {
                    trace!(cid = %cid, "Skipping member event for unknown channel");
                    return Ok(());
                }
                if let Event::MemberRemoved(_) = event {
                    let user_id = e
                        .member
                        .as_ref()
                        .map(|m| &m.user.id)
                        .or(e.user.as_ref().map(|u| &u.id));
                    if let Some(user_id) = user_id {
                        self.remove_member(user_id, &cid)?;
                    }
                } else if let Some(member) = &e.member {
                    self.save_member(member, &cid, None, None)?;
                }
            }
            Event::MessageRead(e) | Event::NotificationMarkRead(e) => {
                let (Some(cid), Some(user)) = (event_cid(event), &e.user) else {
                    return Ok(());
                };
                self.mark_channel_as_read(&cid, &user.id, e.created_at)?;
            }
            Event::ChannelDeleted(e) => {
                if let Some(cid) = event_cid(event) {
                    let at = e
                        .channel
                        .as_ref()
                        .and_then(|c| c.deleted_at)
                        .unwrap_or(e.created_at);
                    self.mark_channel_deleted(&cid, at)?;
                }
            }
            Event::ChannelTruncated(e) => {
                if let Some(cid) = event_cid(event) {
                    let at = e
                        .channel
                        .as_ref()
                        .and_then(|c| c.truncated_at)
                        .unwrap_or(e.created_at);
                    let removed = self.truncate_channel(&cid, at)?;
                    debug!(cid = %cid, removed, "Truncated channel");
                }
            }
            Event::UserDeactivated(e) => {
                if let Some(user) = &e.user {
                    let at = user.deactivated_at.unwrap_or(e.created_at);
                    self.deactivate_user(&user.id, at)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// The event's channel id, or `None` (logged) when it is malformed.
fn event_cid(event: &Event) -> Option<ChannelId> {
    let raw = event.cid()?;
    match ChannelId::parse(raw) {
        Ok(cid) => Some(cid),
        Err(err) => {
            debug!(event = event.event_type().as_str(), %err, "Skipping step with invalid cid");
            None
        }
    }
}

/// Turns a validation failure into a logged skip; other errors propagate.
fn skip_invalid<T>(event_type: EventType, result: DatabaseResult<T>) -> DatabaseResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(DatabaseError::Validation(err)) => {
            debug!(event = event_type.as_str(), %err, "Skipping invalid payload");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}
