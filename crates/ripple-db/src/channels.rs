use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::{Row, params};
use tracing::debug;

use ripple_types::payloads::{ChannelPayload, ChannelStatePayload, Page};
use ripple_types::query::{ChannelListQuery, ChannelSortKey, ListQuery, ListQueryKind, Sorting};
use ripple_types::{ChannelId, ChatChannel};

use crate::cache::PreWarmedCache;
use crate::models::ListQueryRow;
use crate::session::{
    OptionalExt, Session, cid_column, from_millis, json_column, opt_from_millis, opt_millis,
    to_json, to_millis,
};
use crate::{DatabaseResult, PreconditionError};

/// Channel columns plus the signed-in user's unread count.
const CHANNEL_SELECT: &str = "SELECT c.cid, c.name, c.created_at, c.updated_at, c.deleted_at,
        c.truncated_at, c.last_message_at, c.member_count, c.is_frozen, c.config,
        c.preview_message_id, c.extra_data, COALESCE(r.unread_messages_count, 0)
     FROM channels c
     LEFT JOIN channel_reads r
        ON r.cid = c.cid
       AND r.user_id = (SELECT user_id FROM current_user WHERE singleton = 1)";

impl Session<'_> {
    pub fn channel(&self, cid: &ChannelId) -> DatabaseResult<Option<ChatChannel>> {
        self.conn()
            .query_row(
                &format!("{CHANNEL_SELECT} WHERE c.cid = ?1"),
                [cid.to_string()],
                channel_from_row,
            )
            .optional()
    }

    pub fn channel_exists(&self, cid: &ChannelId) -> DatabaseResult<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM channels WHERE cid = ?1",
                [cid.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Creates a bare channel row if none exists yet.
    pub(crate) fn ensure_channel(
        &mut self,
        cid: &ChannelId,
        created_at: DateTime<Utc>,
        cache: Option<&mut PreWarmedCache>,
    ) -> DatabaseResult<()> {
        let raw = cid.to_string();
        if cache.as_deref().is_some_and(|cache| cache.has_channel(&raw)) {
            return Ok(());
        }
        self.conn().execute(
            "INSERT OR IGNORE INTO channels (cid, channel_type, channel_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![raw, cid.channel_type(), cid.id(), to_millis(created_at)],
        )?;
        if let Some(cache) = cache {
            cache.insert_channel(&raw);
        }
        Ok(())
    }

    /// Upserts a channel and its members, linking it to `query` when given.
    pub fn save_channel(
        &mut self,
        payload: &ChannelPayload,
        query: Option<&ChannelListQuery>,
        mut cache: Option<&mut PreWarmedCache>,
    ) -> DatabaseResult<ChatChannel> {
        let cid = ChannelId::parse(&payload.cid)?;
        let raw = cid.to_string();

        if let Some(created_by) = &payload.created_by {
            self.save_user(created_by, None, cache.as_deref_mut())?;
        }

        self.conn().execute(
            "INSERT INTO channels (cid, channel_type, channel_id, name, created_at, updated_at,
                                   deleted_at, truncated_at, last_message_at, member_count,
                                   is_frozen, config, created_by_id, extra_data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(cid) DO UPDATE SET
                name = excluded.name,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                deleted_at = excluded.deleted_at,
                truncated_at = excluded.truncated_at,
                last_message_at = CASE
                    WHEN excluded.last_message_at IS NULL THEN channels.last_message_at
                    WHEN channels.last_message_at IS NULL THEN excluded.last_message_at
                    ELSE MAX(channels.last_message_at, excluded.last_message_at)
                END,
                member_count = excluded.member_count,
                is_frozen = excluded.is_frozen,
                config = excluded.config,
                created_by_id = excluded.created_by_id,
                extra_data = excluded.extra_data",
            params![
                raw,
                cid.channel_type(),
                cid.id(),
                payload.name,
                to_millis(payload.created_at),
                to_millis(payload.updated_at),
                opt_millis(payload.deleted_at),
                opt_millis(payload.truncated_at),
                opt_millis(payload.last_message_at),
                payload.member_count,
                payload.frozen,
                to_json(&payload.config)?,
                payload.created_by.as_ref().map(|u| u.id.as_str()),
                to_json(&payload.extra_data)?,
            ],
        )?;
        if let Some(cache) = cache.as_deref_mut() {
            cache.insert_channel(&raw);
        }

        for member in &payload.members {
            self.save_member(member, &cid, None, cache.as_deref_mut())?;
        }

        if let Some(query) = query {
            let hash = self.save_channel_query(query)?;
            self.append_query_results(ListQueryKind::Channel, &hash, &[raw], None)?;
        }

        self.channel(&cid)?
            .ok_or_else(|| PreconditionError::ChannelDoesNotExist(cid.to_string()).into())
    }

    /// Saves a full channel fetch: channel, messages, pinned messages,
    /// members and reads. The preview is recomputed from what is stored.
    pub fn save_channel_state(
        &mut self,
        state: &ChannelStatePayload,
        query: Option<&ChannelListQuery>,
        mut cache: Option<&mut PreWarmedCache>,
    ) -> DatabaseResult<ChatChannel> {
        let channel = self.save_channel(&state.channel, query, cache.as_deref_mut())?;
        let cid = channel.cid;

        for message in state.messages.iter().chain(&state.pinned_messages) {
            self.save_message(message, Some(&cid), true, cache.as_deref_mut())?;
        }
        for member in &state.members {
            self.save_member(member, &cid, None, cache.as_deref_mut())?;
        }
        for read in &state.read {
            self.save_channel_read(read, &cid)?;
        }

        self.refresh_preview(&cid)?;
        self.channel(&cid)?
            .ok_or_else(|| PreconditionError::ChannelDoesNotExist(cid.to_string()).into())
    }

    /// Saves one fetched page of a channel list and returns the list as cached.
    pub fn save_channel_page(
        &mut self,
        page: &Page<ChannelStatePayload>,
        query: &ChannelListQuery,
    ) -> DatabaseResult<Vec<ChatChannel>> {
        let hash = self.save_channel_query(query)?;
        let mut cache = PreWarmedCache::new();
        let mut cids = Vec::with_capacity(page.items.len());
        for state in &page.items {
            let channel = self.save_channel_state(state, None, Some(&mut cache))?;
            cids.push(channel.cid.to_string());
        }
        self.append_query_results(ListQueryKind::Channel, &hash, &cids, page.next.as_deref())?;
        self.channel_list(&hash, &query.sort)
    }

    // -- Channel list queries --

    pub fn save_channel_query(&mut self, query: &ChannelListQuery) -> DatabaseResult<String> {
        self.save_list_query(query)
    }

    pub fn channel_list_query(&self, filter_hash: &str) -> DatabaseResult<Option<ListQueryRow>> {
        self.list_query(ListQueryKind::Channel, filter_hash)
    }

    pub fn load_all_channel_list_queries(&self) -> DatabaseResult<Vec<ListQueryRow>> {
        self.load_all_list_queries(ListQueryKind::Channel)
    }

    pub fn delete_channel_query(&mut self, query: &ChannelListQuery) -> DatabaseResult<bool> {
        self.delete_list_query(ListQueryKind::Channel, &query.filter_hash())
    }

    /// Channels cached for a query, deleted ones excluded, ordered by `sorting`.
    pub fn channel_list(
        &self,
        filter_hash: &str,
        sorting: &[Sorting<ChannelSortKey>],
    ) -> DatabaseResult<Vec<ChatChannel>> {
        let mut stmt = self.conn().prepare(&format!(
            "{CHANNEL_SELECT}
             JOIN list_query_results q ON q.entity_id = c.cid
             WHERE q.kind = ?1 AND q.filter_hash = ?2 AND c.deleted_at IS NULL"
        ))?;
        let mut channels = stmt
            .query_map(
                params![ListQueryKind::Channel.as_str(), filter_hash],
                channel_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        ripple_merge::channels::sort(&mut channels, sorting);
        Ok(channels)
    }

    // -- Cleanup --

    /// Drops the local history of `cids` (messages, reads, members, typing)
    /// while keeping the channel rows, so the next fetch starts clean.
    pub fn clean_channels(&mut self, cids: &HashSet<ChannelId>) -> DatabaseResult<usize> {
        let mut cleaned = 0;
        for cid in cids {
            let raw = cid.to_string();
            self.delete_channel_messages(&raw)?;
            self.conn()
                .execute("DELETE FROM channel_reads WHERE cid = ?1", [&raw])?;
            self.conn().execute("DELETE FROM members WHERE cid = ?1", [&raw])?;
            self.conn()
                .execute("DELETE FROM channel_typing_users WHERE cid = ?1", [&raw])?;
            cleaned += self.conn().execute(
                "UPDATE channels SET preview_message_id = NULL WHERE cid = ?1",
                [&raw],
            )?;
        }
        debug!(cleaned, "Cleaned channels");
        Ok(cleaned)
    }

    /// Removes `cids` and everything they own.
    pub fn remove_channels(&mut self, cids: &HashSet<ChannelId>) -> DatabaseResult<usize> {
        self.clean_channels(cids)?;
        let mut removed = 0;
        for cid in cids {
            let raw = cid.to_string();
            self.remove_from_query_results(ListQueryKind::Channel, &raw)?;
            removed += self
                .conn()
                .execute("DELETE FROM channels WHERE cid = ?1", [&raw])?;
        }
        Ok(removed)
    }

    fn delete_channel_messages(&mut self, cid: &str) -> DatabaseResult<()> {
        self.conn().execute(
            "DELETE FROM reactions WHERE message_id IN (SELECT id FROM messages WHERE cid = ?1)",
            [cid],
        )?;
        self.conn()
            .execute("DELETE FROM attachments WHERE cid = ?1", [cid])?;
        self.conn().execute(
            "DELETE FROM list_query_results
             WHERE kind = ?2 AND entity_id IN (SELECT id FROM messages WHERE cid = ?1)",
            params![cid, ListQueryKind::MessageSearch.as_str()],
        )?;
        self.conn()
            .execute("DELETE FROM messages WHERE cid = ?1", [cid])?;
        Ok(())
    }

    // -- Typing users --

    /// Returns `false` when the channel or the user is not stored.
    pub fn add_typing_user(&mut self, cid: &ChannelId, user_id: &str) -> DatabaseResult<bool> {
        if !self.channel_exists(cid)? || !self.user_exists(user_id)? {
            return Ok(false);
        }
        self.conn().execute(
            "INSERT OR IGNORE INTO channel_typing_users (cid, user_id) VALUES (?1, ?2)",
            params![cid.to_string(), user_id],
        )?;
        Ok(true)
    }

    pub fn remove_typing_user(&mut self, cid: &ChannelId, user_id: &str) -> DatabaseResult<bool> {
        let removed = self.conn().execute(
            "DELETE FROM channel_typing_users WHERE cid = ?1 AND user_id = ?2",
            params![cid.to_string(), user_id],
        )?;
        Ok(removed > 0)
    }

    pub fn typing_users(&self, cid: &ChannelId) -> DatabaseResult<Vec<String>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT user_id FROM channel_typing_users WHERE cid = ?1 ORDER BY user_id")?;
        let users = stmt
            .query_map([cid.to_string()], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(users)
    }

    // -- Derived state --

    pub fn set_preview(&mut self, cid: &ChannelId, message_id: Option<&str>) -> DatabaseResult<()> {
        self.conn().execute(
            "UPDATE channels SET preview_message_id = ?2 WHERE cid = ?1",
            params![cid.to_string(), message_id],
        )?;
        Ok(())
    }

    pub(crate) fn refresh_preview(&mut self, cid: &ChannelId) -> DatabaseResult<()> {
        let preview = self.preview(cid)?;
        self.set_preview(cid, preview.as_ref().map(|m| m.id.as_str()))
    }

    pub fn mark_channel_deleted(&mut self, cid: &ChannelId, at: DateTime<Utc>) -> DatabaseResult<bool> {
        let updated = self.conn().execute(
            "UPDATE channels SET deleted_at = ?2 WHERE cid = ?1",
            params![cid.to_string(), to_millis(at)],
        )?;
        Ok(updated > 0)
    }

    /// Removes every message created at or before `at`. Returns how many went.
    pub fn truncate_channel(&mut self, cid: &ChannelId, at: DateTime<Utc>) -> DatabaseResult<usize> {
        let updated = self.conn().execute(
            "UPDATE channels SET truncated_at = ?2 WHERE cid = ?1",
            params![cid.to_string(), to_millis(at)],
        )?;
        if updated == 0 {
            return Ok(0);
        }

        let ids: Vec<String> = {
            let mut stmt = self
                .conn()
                .prepare("SELECT id FROM messages WHERE cid = ?1 AND created_at <= ?2")?;
            stmt.query_map(params![cid.to_string(), to_millis(at)], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?
        };
        for id in &ids {
            self.delete_message(id)?;
        }

        self.refresh_preview(cid)?;
        Ok(ids.len())
    }
}

pub(crate) fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<ChatChannel> {
    Ok(ChatChannel {
        cid: cid_column(row, 0)?,
        name: row.get(1)?,
        created_at: from_millis(row.get(2)?),
        updated_at: from_millis(row.get(3)?),
        deleted_at: opt_from_millis(row.get(4)?),
        truncated_at: opt_from_millis(row.get(5)?),
        last_message_at: opt_from_millis(row.get(6)?),
        member_count: row.get(7)?,
        is_frozen: row.get(8)?,
        config: json_column(row, 9)?,
        preview_message_id: row.get(10)?,
        extra_data: json_column(row, 11)?,
        unread_count: row.get(12)?,
    })
}
