use chrono::Utc;
use rusqlite::{Row, params};
use serde_json::{Map, Value};
use uuid::Uuid;

use ripple_types::payloads::ReactionPayload;
use ripple_types::{LocalReactionState, reaction_id};

use crate::cache::PreWarmedCache;
use crate::models::ReactionRow;
use crate::session::{OptionalExt, Session, from_millis, json_column, to_json, to_millis};
use crate::{DatabaseResult, PreconditionError};

const REACTION_COLUMNS: &str = "id, message_id, user_id, reaction_type, score, created_at, \
                                updated_at, local_state, version, extra_data";

impl Session<'_> {
    pub fn reaction(
        &self,
        message_id: &str,
        user_id: &str,
        reaction_type: &str,
    ) -> DatabaseResult<Option<ReactionRow>> {
        self.reaction_by_id(&reaction_id(user_id, message_id, reaction_type))
    }

    pub fn reaction_by_id(&self, id: &str) -> DatabaseResult<Option<ReactionRow>> {
        self.conn()
            .query_row(
                &format!("SELECT {REACTION_COLUMNS} FROM reactions WHERE id = ?1"),
                [id],
                reaction_from_row,
            )
            .optional()
    }

    pub fn reactions(&self, message_id: &str) -> DatabaseResult<Vec<ReactionRow>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {REACTION_COLUMNS} FROM reactions WHERE message_id = ?1 ORDER BY created_at, id"
        ))?;
        let reactions = stmt
            .query_map([message_id], reaction_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(reactions)
    }

    /// Upserts a reaction confirmed by the server. Its message must be stored.
    pub fn save_reaction(
        &mut self,
        payload: &ReactionPayload,
        mut cache: Option<&mut PreWarmedCache>,
    ) -> DatabaseResult<ReactionRow> {
        let message_known = cache
            .as_deref()
            .is_some_and(|cache| cache.has_message(&payload.message_id));
        if !message_known && !self.message_exists(&payload.message_id)? {
            return Err(PreconditionError::MessageDoesNotExist(payload.message_id.clone()).into());
        }

        self.save_user(&payload.user, None, cache.as_deref_mut())?;

        let id = reaction_id(&payload.user.id, &payload.message_id, &payload.reaction_type);
        self.conn().execute(
            "INSERT INTO reactions (id, message_id, user_id, reaction_type, score,
                                    created_at, updated_at, local_state, extra_data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8)
             ON CONFLICT(id) DO UPDATE SET
                score = excluded.score,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                local_state = NULL,
                extra_data = excluded.extra_data",
            params![
                id,
                payload.message_id,
                payload.user.id,
                payload.reaction_type,
                payload.score,
                to_millis(payload.created_at),
                to_millis(payload.updated_at),
                to_json(&payload.extra_data)?,
            ],
        )?;
        if let Some(cache) = cache.as_deref_mut() {
            cache.insert_reaction(&id);
        }

        self.reaction_by_id(&id)?
            .ok_or_else(|| PreconditionError::MessageDoesNotExist(payload.message_id.clone()).into())
    }

    pub fn delete_reaction(&mut self, id: &str) -> DatabaseResult<bool> {
        let deleted = self.conn().execute("DELETE FROM reactions WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    /// Stages a reaction by the signed-in user.
    ///
    /// With `enforce_unique` every other reaction of that user on the message
    /// is dropped first. Each call stamps a fresh version; a later
    /// [`Session::remove_reaction`] only applies if it names the latest one.
    pub fn add_reaction(
        &mut self,
        message_id: &str,
        reaction_type: &str,
        score: i64,
        enforce_unique: bool,
        extra_data: &Map<String, Value>,
        local_state: Option<LocalReactionState>,
    ) -> DatabaseResult<ReactionRow> {
        let user_id = self.require_current_user_id()?;
        let Some(message) = self.message(message_id)? else {
            return Err(PreconditionError::MessageDoesNotExist(message_id.to_string()).into());
        };

        let id = reaction_id(&user_id, message_id, reaction_type);
        let mut own_reactions = message.own_reactions;

        if enforce_unique {
            self.conn().execute(
                "DELETE FROM reactions WHERE message_id = ?1 AND user_id = ?2 AND id != ?3",
                params![message_id, user_id, id],
            )?;
            own_reactions.retain(|own| *own == id);
        }

        let now = to_millis(Utc::now());
        self.conn().execute(
            "INSERT INTO reactions (id, message_id, user_id, reaction_type, score,
                                    created_at, updated_at, local_state, version, extra_data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                score = excluded.score,
                updated_at = excluded.updated_at,
                local_state = excluded.local_state,
                version = excluded.version,
                extra_data = excluded.extra_data",
            params![
                id,
                message_id,
                user_id,
                reaction_type,
                score,
                now,
                local_state.map(|s| s.as_str()),
                Uuid::new_v4().to_string(),
                to_json(extra_data)?,
            ],
        )?;

        if !own_reactions.contains(&id) {
            own_reactions.push(id.clone());
        }
        self.set_own_reactions(message_id, &own_reactions)?;

        self.reaction_by_id(&id)?
            .ok_or_else(|| PreconditionError::MessageDoesNotExist(message_id.to_string()).into())
    }

    /// Stages removal of the signed-in user's reaction. Returns `None` when
    /// there is nothing to remove or `version` no longer matches.
    pub fn remove_reaction(
        &mut self,
        message_id: &str,
        reaction_type: &str,
        version: Option<&str>,
    ) -> DatabaseResult<Option<ReactionRow>> {
        let user_id = self.require_current_user_id()?;
        let Some(reaction) = self.reaction(message_id, &user_id, reaction_type)? else {
            return Ok(None);
        };
        if version.is_some() && reaction.version.as_deref() != version {
            return Ok(None);
        }

        self.conn().execute(
            "UPDATE reactions SET local_state = ?2 WHERE id = ?1",
            params![reaction.id, LocalReactionState::PendingDelete.as_str()],
        )?;
        self.remove_own_reaction(message_id, &reaction.id)?;

        self.reaction_by_id(&reaction.id)
    }

    pub(crate) fn append_own_reaction(&mut self, message_id: &str, id: &str) -> DatabaseResult<()> {
        let Some(message) = self.message(message_id)? else {
            return Ok(());
        };
        if message.own_reactions.iter().any(|own| own == id) {
            return Ok(());
        }
        let mut own_reactions = message.own_reactions;
        own_reactions.push(id.to_string());
        self.set_own_reactions(message_id, &own_reactions)
    }

    pub(crate) fn remove_own_reaction(&mut self, message_id: &str, id: &str) -> DatabaseResult<()> {
        let Some(message) = self.message(message_id)? else {
            return Ok(());
        };
        let mut own_reactions = message.own_reactions;
        own_reactions.retain(|own| own != id);
        self.set_own_reactions(message_id, &own_reactions)
    }
}

fn reaction_from_row(row: &Row<'_>) -> rusqlite::Result<ReactionRow> {
    let local_state: Option<String> = row.get(7)?;
    Ok(ReactionRow {
        id: row.get(0)?,
        message_id: row.get(1)?,
        user_id: row.get(2)?,
        reaction_type: row.get(3)?,
        score: row.get(4)?,
        created_at: from_millis(row.get(5)?),
        updated_at: from_millis(row.get(6)?),
        local_state: local_state.as_deref().and_then(LocalReactionState::from_db),
        version: row.get(8)?,
        extra_data: json_column(row, 9)?,
    })
}
