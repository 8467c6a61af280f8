use chrono::{DateTime, Duration, Utc};
use rusqlite::{Row, params};
use tracing::debug;
use uuid::Uuid;

use ripple_types::payloads::MessagePayload;
use ripple_types::query::ListQueryKind;
use ripple_types::{
    AttachmentId, ChannelId, ChatMessage, LocalMessageState, MessagePinning, MessageType,
    NewMessage, ValidationError, reaction_id,
};
use ripple_types::models::PinInfo;

use crate::cache::PreWarmedCache;
use crate::session::{
    OptionalExt, Session, cid_column, from_millis, json_column, opt_from_millis, opt_millis,
    to_json, to_millis,
};
use crate::{DatabaseResult, PreconditionError};

pub(crate) const MESSAGE_COLUMNS: &str = "m.id, m.cid, m.user_id, m.text, m.message_type, \
     m.created_at, m.updated_at, m.deleted_at, m.parent_id, m.quoted_message_id, \
     m.show_reply_in_channel, m.show_inside_thread, m.is_silent, m.is_hard_deleted, \
     m.pinned_at, m.pinned_by_id, m.pin_expires, m.own_reactions, m.local_state, \
     m.reply_count, m.command, m.arguments, m.mentioned_user_ids, m.extra_data";

/// Messages that show up in the channel timeline: not thread-only, not hard deleted.
const IN_CHANNEL: &str = "(m.parent_id IS NULL OR m.show_reply_in_channel = 1) \
                          AND m.is_hard_deleted = 0";

impl Session<'_> {
    // -- Lookups --

    pub fn message(&self, id: &str) -> DatabaseResult<Option<ChatMessage>> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.id = ?1"),
                [id],
                message_from_row,
            )
            .optional()
    }

    pub fn message_exists(&self, id: &str) -> DatabaseResult<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row("SELECT 1 FROM messages WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// Newest message fit to represent the channel in a channel list.
    pub fn preview(&self, cid: &ChannelId) -> DatabaseResult<Option<ChatMessage>> {
        self.conn()
            .query_row(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages m
                     LEFT JOIN channels c ON c.cid = m.cid
                     WHERE m.cid = ?1
                       AND {IN_CHANNEL}
                       AND m.message_type NOT IN ('ephemeral', 'error')
                       AND m.deleted_at IS NULL
                       AND (c.truncated_at IS NULL OR m.created_at > c.truncated_at)
                     ORDER BY m.created_at DESC, m.id DESC
                     LIMIT 1"
                ),
                [cid.to_string()],
                message_from_row,
            )
            .optional()
    }

    /// The latest `limit` timeline messages of a channel, oldest first.
    pub fn channel_messages(&self, cid: &ChannelId, limit: u32) -> DatabaseResult<Vec<ChatMessage>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages m
             WHERE m.cid = ?1 AND {IN_CHANNEL}
             ORDER BY m.created_at DESC, m.id DESC
             LIMIT ?2"
        ))?;
        let mut messages = stmt
            .query_map(params![cid.to_string(), limit], message_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    pub fn thread_replies(&self, parent_id: &str) -> DatabaseResult<Vec<ChatMessage>> {
        self.messages_where("m.parent_id = ?1 ORDER BY m.created_at, m.id", parent_id)
    }

    /// Messages quoting `id`, found through the quoted-message index.
    pub fn quoted_by(&self, id: &str) -> DatabaseResult<Vec<ChatMessage>> {
        self.messages_where("m.quoted_message_id = ?1 ORDER BY m.created_at, m.id", id)
    }

    pub fn pinned_messages(&self, cid: &ChannelId) -> DatabaseResult<Vec<ChatMessage>> {
        self.messages_where(
            "m.cid = ?1 AND m.pinned_at IS NOT NULL AND m.is_hard_deleted = 0
             ORDER BY m.pinned_at DESC, m.id",
            &cid.to_string(),
        )
    }

    /// Results cached for a message search query, in result order.
    pub fn message_search_results(&self, filter_hash: &str) -> DatabaseResult<Vec<ChatMessage>> {
        let mut messages = Vec::new();
        for id in self.query_result_ids(ListQueryKind::MessageSearch, filter_hash)? {
            if let Some(message) = self.message(&id)? {
                messages.push(message);
            }
        }
        Ok(messages)
    }

    fn messages_where(&self, clause: &str, arg: &str) -> DatabaseResult<Vec<ChatMessage>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("SELECT {MESSAGE_COLUMNS} FROM messages m WHERE {clause}"))?;
        let messages = stmt
            .query_map([arg], message_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    // -- Server payloads --

    /// Upserts a server message together with its author, mentions, quoted
    /// message, reactions and attachments.
    ///
    /// The channel comes from the payload, falling back to `cid`. Local
    /// bookkeeping survives the upsert: own reactions (unless
    /// `sync_own_reactions`), thread visibility and the tombstone flag. A
    /// pending-send state is cleared because the server has now seen the
    /// message.
    pub fn save_message(
        &mut self,
        payload: &MessagePayload,
        cid: Option<&ChannelId>,
        sync_own_reactions: bool,
        mut cache: Option<&mut PreWarmedCache>,
    ) -> DatabaseResult<ChatMessage> {
        let cid = match (&payload.cid, cid) {
            (Some(raw), _) => ChannelId::parse(raw)?,
            (None, Some(cid)) => cid.clone(),
            (None, None) => return Err(ValidationError::MissingChannelId(payload.id.clone()).into()),
        };

        self.ensure_channel(&cid, payload.created_at, cache.as_deref_mut())?;
        self.save_user(&payload.user, None, cache.as_deref_mut())?;
        for user in &payload.mentioned_users {
            self.save_user(user, None, cache.as_deref_mut())?;
        }
        if let Some(pinned_by) = &payload.pinned_by {
            self.save_user(pinned_by, None, cache.as_deref_mut())?;
        }

        let mut quoted_message_id = payload.quoted_message_id.clone();
        if let Some(quoted) = &payload.quoted_message {
            self.save_message(quoted, Some(&cid), false, cache.as_deref_mut())?;
            quoted_message_id.get_or_insert_with(|| quoted.id.clone());
        }

        let existing = self.message(&payload.id)?;
        let local_state = existing
            .as_ref()
            .and_then(|m| m.local_state)
            .filter(|state| !state.is_local_only());
        let own_reactions: Vec<String> = if sync_own_reactions {
            let mut ids: Vec<String> = Vec::new();
            for reaction in &payload.own_reactions {
                let id = reaction_id(&reaction.user.id, &payload.id, &reaction.reaction_type);
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
            ids
        } else {
            existing
                .as_ref()
                .map(|m| m.own_reactions.clone())
                .unwrap_or_default()
        };
        let show_inside_thread = existing.as_ref().is_some_and(|m| m.show_inside_thread);
        let is_hard_deleted = existing.as_ref().is_some_and(|m| m.is_hard_deleted);

        let (pinned_at, pinned_by_id, pin_expires) = if payload.pinned {
            (
                Some(payload.pinned_at.unwrap_or(payload.updated_at)),
                payload.pinned_by.as_ref().map(|u| u.id.clone()),
                payload.pin_expires,
            )
        } else {
            (None, None, None)
        };
        let mentioned_user_ids: Vec<&str> =
            payload.mentioned_users.iter().map(|u| u.id.as_str()).collect();

        self.conn().execute(
            "INSERT INTO messages (
                id, cid, user_id, text, message_type, created_at, updated_at, deleted_at,
                parent_id, quoted_message_id, show_reply_in_channel, show_inside_thread,
                is_silent, is_hard_deleted, pinned_at, pinned_by_id, pin_expires,
                own_reactions, reaction_scores, local_state, reply_count, command, arguments,
                mentioned_user_ids, extra_data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                     ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)
             ON CONFLICT(id) DO UPDATE SET
                cid = excluded.cid,
                user_id = excluded.user_id,
                text = excluded.text,
                message_type = excluded.message_type,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                deleted_at = excluded.deleted_at,
                parent_id = excluded.parent_id,
                quoted_message_id = excluded.quoted_message_id,
                show_reply_in_channel = excluded.show_reply_in_channel,
                show_inside_thread = excluded.show_inside_thread,
                is_silent = excluded.is_silent,
                is_hard_deleted = excluded.is_hard_deleted,
                pinned_at = excluded.pinned_at,
                pinned_by_id = excluded.pinned_by_id,
                pin_expires = excluded.pin_expires,
                own_reactions = excluded.own_reactions,
                reaction_scores = excluded.reaction_scores,
                local_state = excluded.local_state,
                reply_count = excluded.reply_count,
                command = excluded.command,
                arguments = excluded.arguments,
                mentioned_user_ids = excluded.mentioned_user_ids,
                extra_data = excluded.extra_data",
            params![
                payload.id,
                cid.to_string(),
                payload.user.id,
                payload.text,
                payload.message_type.as_str(),
                to_millis(payload.created_at),
                to_millis(payload.updated_at),
                opt_millis(payload.deleted_at),
                payload.parent_id,
                quoted_message_id,
                payload.show_in_channel,
                show_inside_thread,
                payload.silent,
                is_hard_deleted,
                opt_millis(pinned_at),
                pinned_by_id,
                opt_millis(pin_expires),
                to_json(&own_reactions)?,
                to_json(&payload.reaction_scores)?,
                local_state.map(|s| s.as_str()),
                payload.reply_count,
                payload.command,
                payload.args,
                to_json(&mentioned_user_ids)?,
                to_json(&payload.extra_data)?,
            ],
        )?;
        if let Some(cache) = cache.as_deref_mut() {
            cache.insert_message(&payload.id);
        }

        for reaction in payload.latest_reactions.iter().chain(&payload.own_reactions) {
            self.save_reaction(reaction, cache.as_deref_mut())?;
        }

        self.replace_attachments(&payload.id, &cid, &payload.attachments)?;

        let thread_only = payload.parent_id.is_some() && !payload.show_in_channel;
        if !thread_only {
            self.conn().execute(
                "UPDATE channels SET last_message_at = MAX(COALESCE(last_message_at, ?2), ?2)
                 WHERE cid = ?1",
                params![cid.to_string(), to_millis(payload.created_at)],
            )?;
        }

        self.message(&payload.id)?
            .ok_or_else(|| PreconditionError::MessageDoesNotExist(payload.id.clone()).into())
    }

    /// Saves a fetched page of messages for `cid`, returning them as stored.
    pub fn save_messages(
        &mut self,
        payloads: &[MessagePayload],
        cid: &ChannelId,
        sync_own_reactions: bool,
        mut cache: Option<&mut PreWarmedCache>,
    ) -> DatabaseResult<Vec<ChatMessage>> {
        payloads
            .iter()
            .map(|payload| self.save_message(payload, Some(cid), sync_own_reactions, cache.as_deref_mut()))
            .collect()
    }

    // -- Local writes --

    /// Stages a message composed by the signed-in user.
    ///
    /// The message gets `PendingSend` and a creation time strictly after the
    /// channel's last message so the local timeline never reorders on send.
    pub fn create_new_message(&mut self, cid: &ChannelId, new: NewMessage) -> DatabaseResult<ChatMessage> {
        let user_id = self.require_current_user_id()?;

        let last_message_at: Option<Option<i64>> = self
            .conn()
            .query_row(
                "SELECT last_message_at FROM channels WHERE cid = ?1",
                [cid.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(last_message_at) = last_message_at else {
            return Err(PreconditionError::ChannelDoesNotExist(cid.to_string()).into());
        };

        let id = new.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let created_at = new.created_at.unwrap_or_else(|| {
            let now = Utc::now();
            match last_message_at.map(from_millis) {
                Some(last) => now.max(last + Duration::milliseconds(1)),
                None => now,
            }
        });
        let message_type = if new.parent_id.is_some() {
            MessageType::Reply
        } else {
            MessageType::Regular
        };
        let (pinned_at, pinned_by_id, pin_expires) = match &new.pinning {
            Some(pinning) => (Some(created_at), Some(user_id.clone()), pinning.expires_at),
            None => (None, None, None),
        };

        self.conn().execute(
            "INSERT INTO messages (
                id, cid, user_id, text, message_type, created_at, updated_at,
                parent_id, quoted_message_id, show_reply_in_channel, is_silent,
                pinned_at, pinned_by_id, pin_expires, local_state, command, arguments,
                mentioned_user_ids, skip_push, skip_enrich_url, extra_data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                     ?16, ?17, ?18, ?19, ?20)",
            params![
                id,
                cid.to_string(),
                user_id,
                new.text,
                message_type.as_str(),
                to_millis(created_at),
                new.parent_id,
                new.quoted_message_id,
                new.show_reply_in_channel,
                new.is_silent,
                opt_millis(pinned_at),
                pinned_by_id,
                opt_millis(pin_expires),
                LocalMessageState::PendingSend.as_str(),
                new.command,
                new.arguments,
                to_json(&new.mentioned_user_ids)?,
                new.skip_push,
                new.skip_enrich_url,
                to_json(&new.extra_data)?,
            ],
        )?;

        for (index, attachment) in new.attachments.iter().enumerate() {
            let attachment_id = AttachmentId::new(cid.clone(), id.clone(), index);
            self.create_new_attachment(attachment, &attachment_id)?;
        }

        let thread_only = new.parent_id.is_some() && !new.show_reply_in_channel;
        if !thread_only {
            self.conn().execute(
                "UPDATE channels SET last_message_at = ?2, preview_message_id = ?3 WHERE cid = ?1",
                params![cid.to_string(), to_millis(created_at), id],
            )?;
        }
        if let Some(parent_id) = &new.parent_id {
            self.conn().execute(
                "UPDATE messages SET reply_count = reply_count + 1 WHERE id = ?1",
                [parent_id],
            )?;
        }

        debug!(message_id = %id, cid = %cid, "Staged new message");
        self.message(&id)?
            .ok_or_else(|| PreconditionError::MessageDoesNotExist(id).into())
    }

    /// Deletes the row and everything it owns.
    pub fn delete_message(&mut self, id: &str) -> DatabaseResult<bool> {
        let cid: Option<String> = self
            .conn()
            .query_row("SELECT cid FROM messages WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;
        let Some(cid) = cid else {
            return Ok(false);
        };

        self.conn()
            .execute("DELETE FROM reactions WHERE message_id = ?1", [id])?;
        self.conn()
            .execute("DELETE FROM attachments WHERE message_id = ?1", [id])?;
        self.remove_from_query_results(ListQueryKind::MessageSearch, id)?;
        self.conn().execute("DELETE FROM messages WHERE id = ?1", [id])?;

        let was_preview: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM channels WHERE cid = ?1 AND preview_message_id = ?2",
                params![cid, id],
                |row| row.get(0),
            )
            .optional()?;
        if was_preview.is_some() {
            let cid = ChannelId::parse(&cid)?;
            self.refresh_preview(&cid)?;
        }
        Ok(true)
    }

    pub fn pin(&mut self, id: &str, pinning: &MessagePinning) -> DatabaseResult<()> {
        let user_id = self.require_current_user_id()?;
        let updated = self.conn().execute(
            "UPDATE messages SET pinned_at = ?2, pinned_by_id = ?3, pin_expires = ?4 WHERE id = ?1",
            params![
                id,
                to_millis(Utc::now()),
                user_id,
                opt_millis(pinning.expires_at)
            ],
        )?;
        if updated == 0 {
            return Err(PreconditionError::MessageDoesNotExist(id.to_string()).into());
        }
        Ok(())
    }

    pub fn unpin(&mut self, id: &str) -> DatabaseResult<()> {
        self.conn().execute(
            "UPDATE messages SET pinned_at = NULL, pinned_by_id = NULL, pin_expires = NULL
             WHERE id = ?1",
            [id],
        )?;
        Ok(())
    }

    /// Messages caught mid-send by a crash go back to the send queue.
    pub fn rescue_messages_stuck_in_sending(&mut self) -> DatabaseResult<usize> {
        Ok(self.conn().execute(
            "UPDATE messages SET local_state = ?1 WHERE local_state = ?2",
            params![
                LocalMessageState::PendingSend.as_str(),
                LocalMessageState::Sending.as_str()
            ],
        )?)
    }

    pub fn set_message_local_state(
        &mut self,
        id: &str,
        state: Option<LocalMessageState>,
    ) -> DatabaseResult<bool> {
        let updated = self.conn().execute(
            "UPDATE messages SET local_state = ?2 WHERE id = ?1",
            params![id, state.map(|s| s.as_str())],
        )?;
        Ok(updated > 0)
    }

    /// Applies a local edit. A message the server already has is queued for sync.
    pub fn stage_message_edit(&mut self, id: &str, text: &str) -> DatabaseResult<ChatMessage> {
        let Some(message) = self.message(id)? else {
            return Err(PreconditionError::MessageDoesNotExist(id.to_string()).into());
        };
        let state = match message.local_state {
            Some(state) if state.is_local_only() => state,
            _ => LocalMessageState::PendingSync,
        };

        self.conn().execute(
            "UPDATE messages SET text = ?2, updated_at = ?3, local_state = ?4 WHERE id = ?1",
            params![id, text, to_millis(Utc::now()), state.as_str()],
        )?;
        self.message(id)?
            .ok_or_else(|| PreconditionError::MessageDoesNotExist(id.to_string()).into())
    }

    /// Stages a deletion. Returns `true` when the message never left the
    /// device and was removed outright.
    pub fn stage_message_deletion(&mut self, id: &str) -> DatabaseResult<bool> {
        let Some(message) = self.message(id)? else {
            return Err(PreconditionError::MessageDoesNotExist(id.to_string()).into());
        };

        if message.local_state.is_some_and(|s| s.is_local_only()) {
            self.delete_message(id)?;
            return Ok(true);
        }

        self.set_message_local_state(id, Some(LocalMessageState::Deleting))?;
        Ok(false)
    }

    // -- Event bookkeeping --

    /// Soft tombstone: the row stays retrievable by id.
    pub fn mark_hard_deleted(&mut self, id: &str) -> DatabaseResult<bool> {
        let updated = self
            .conn()
            .execute("UPDATE messages SET is_hard_deleted = 1 WHERE id = ?1", [id])?;
        Ok(updated > 0)
    }

    /// Bumps `updated_at` on every message quoting `id`, so views rendering
    /// the quote refresh.
    pub fn propagate_update_to_quoting(
        &mut self,
        id: &str,
        updated_at: DateTime<Utc>,
    ) -> DatabaseResult<usize> {
        Ok(self.conn().execute(
            "UPDATE messages SET updated_at = ?2 WHERE quoted_message_id = ?1",
            params![id, to_millis(updated_at)],
        )?)
    }

    pub fn set_show_inside_thread(&mut self, id: &str) -> DatabaseResult<bool> {
        let updated = self
            .conn()
            .execute("UPDATE messages SET show_inside_thread = 1 WHERE id = ?1", [id])?;
        Ok(updated > 0)
    }

    pub(crate) fn set_own_reactions(&mut self, id: &str, own_reactions: &[String]) -> DatabaseResult<()> {
        self.conn().execute(
            "UPDATE messages SET own_reactions = ?2 WHERE id = ?1",
            params![id, to_json(own_reactions)?],
        )?;
        Ok(())
    }
}

pub(crate) fn message_from_row(row: &Row<'_>) -> rusqlite::Result<ChatMessage> {
    let pinned_at: Option<i64> = row.get(14)?;
    let pin = match pinned_at {
        Some(at) => Some(PinInfo {
            pinned_at: from_millis(at),
            pinned_by_id: row.get(15)?,
            expires_at: opt_from_millis(row.get(16)?),
        }),
        None => None,
    };
    let message_type: String = row.get(4)?;
    let local_state: Option<String> = row.get(18)?;

    Ok(ChatMessage {
        id: row.get(0)?,
        cid: cid_column(row, 1)?,
        author_id: row.get(2)?,
        text: row.get(3)?,
        message_type: MessageType::from_db(&message_type),
        created_at: from_millis(row.get(5)?),
        updated_at: from_millis(row.get(6)?),
        deleted_at: opt_from_millis(row.get(7)?),
        parent_id: row.get(8)?,
        quoted_message_id: row.get(9)?,
        show_reply_in_channel: row.get(10)?,
        show_inside_thread: row.get(11)?,
        is_silent: row.get(12)?,
        is_hard_deleted: row.get(13)?,
        pin,
        own_reactions: json_column(row, 17)?,
        local_state: local_state.as_deref().and_then(LocalMessageState::from_db),
        reply_count: row.get(19)?,
        command: row.get(20)?,
        arguments: row.get(21)?,
        mentioned_user_ids: json_column(row, 22)?,
        extra_data: json_column(row, 23)?,
    })
}
