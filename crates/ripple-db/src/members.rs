use rusqlite::{Row, params};

use ripple_types::ChannelId;
use ripple_types::payloads::MemberPayload;
use ripple_types::query::{ChannelMemberListQuery, ListQueryKind};

use crate::cache::PreWarmedCache;
use crate::models::{ListQueryRow, MemberRow};
use crate::session::{OptionalExt, Session, cid_column, opt_from_millis, opt_millis};
use crate::{DatabaseResult, PreconditionError};

const MEMBER_COLUMNS: &str = "cid, user_id, role, is_banned, created_at, updated_at";

impl Session<'_> {
    pub fn member(&self, user_id: &str, cid: &ChannelId) -> DatabaseResult<Option<MemberRow>> {
        self.conn()
            .query_row(
                &format!("SELECT {MEMBER_COLUMNS} FROM members WHERE cid = ?1 AND user_id = ?2"),
                params![cid.to_string(), user_id],
                member_from_row,
            )
            .optional()
    }

    pub fn members(&self, cid: &ChannelId) -> DatabaseResult<Vec<MemberRow>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE cid = ?1 ORDER BY created_at, user_id"
        ))?;
        let members = stmt
            .query_map([cid.to_string()], member_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(members)
    }

    /// Upserts a member of an existing channel, linking it to `query` when given.
    pub fn save_member(
        &mut self,
        payload: &MemberPayload,
        cid: &ChannelId,
        query: Option<&ChannelMemberListQuery>,
        mut cache: Option<&mut PreWarmedCache>,
    ) -> DatabaseResult<MemberRow> {
        if !self.channel_exists(cid)? {
            return Err(PreconditionError::ChannelDoesNotExist(cid.to_string()).into());
        }
        self.save_user(&payload.user, None, cache.as_deref_mut())?;

        self.conn().execute(
            "INSERT INTO members (cid, user_id, role, is_banned, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(cid, user_id) DO UPDATE SET
                role = excluded.role,
                is_banned = excluded.is_banned,
                created_at = COALESCE(excluded.created_at, members.created_at),
                updated_at = excluded.updated_at",
            params![
                cid.to_string(),
                payload.user.id,
                payload.role,
                payload.banned,
                opt_millis(payload.created_at),
                opt_millis(payload.updated_at),
            ],
        )?;

        if let Some(query) = query {
            let hash = self.save_member_list_query(query)?;
            self.append_query_results(
                ListQueryKind::MemberList,
                &hash,
                std::slice::from_ref(&payload.user.id),
                None,
            )?;
        }

        self.member(&payload.user.id, cid)?
            .ok_or_else(|| PreconditionError::ChannelDoesNotExist(cid.to_string()).into())
    }

    pub fn remove_member(&mut self, user_id: &str, cid: &ChannelId) -> DatabaseResult<bool> {
        let removed = self.conn().execute(
            "DELETE FROM members WHERE cid = ?1 AND user_id = ?2",
            params![cid.to_string(), user_id],
        )?;
        Ok(removed > 0)
    }

    pub fn save_member_list_query(&mut self, query: &ChannelMemberListQuery) -> DatabaseResult<String> {
        self.save_list_query(query)
    }

    pub fn channel_member_list_query(&self, filter_hash: &str) -> DatabaseResult<Option<ListQueryRow>> {
        self.list_query(ListQueryKind::MemberList, filter_hash)
    }

    /// Members cached for a member-list query, in result order.
    pub fn member_list(
        &self,
        query: &ChannelMemberListQuery,
        filter_hash: &str,
    ) -> DatabaseResult<Vec<MemberRow>> {
        let cid = ChannelId::parse(&query.cid)?;
        let mut members = Vec::new();
        for user_id in self.query_result_ids(ListQueryKind::MemberList, filter_hash)? {
            if let Some(member) = self.member(&user_id, &cid)? {
                members.push(member);
            }
        }
        Ok(members)
    }
}

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<MemberRow> {
    Ok(MemberRow {
        cid: cid_column(row, 0)?,
        user_id: row.get(1)?,
        role: row.get(2)?,
        is_banned: row.get(3)?,
        created_at: opt_from_millis(row.get(4)?),
        updated_at: opt_from_millis(row.get(5)?),
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use ripple_types::payloads::{MessagePayload, UserPayload};
    use ripple_types::query::ListQuery;

    use crate::{Database, DatabaseError};

    use super::*;

    fn member(user_id: &str, role: &str) -> MemberPayload {
        MemberPayload {
            user: UserPayload::new(user_id),
            role: Some(role.into()),
            banned: false,
            created_at: Some(Utc::now()),
            updated_at: None,
        }
    }

    #[test]
    fn members_belong_to_stored_channels() {
        let db = Database::open_in_memory().unwrap();
        let cid = ChannelId::new("messaging", "c1");

        let err = db
            .write(|s| s.save_member(&member("u1", "owner"), &cid, None, None))
            .unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::Precondition(PreconditionError::ChannelDoesNotExist(_))
        ));

        let message = MessagePayload::new("m1", UserPayload::new("u1"), "", Utc::now());
        db.write(|s| s.save_message(&message, Some(&cid), false, None)).unwrap();
        db.write(|s| s.save_member(&member("u1", "owner"), &cid, None, None)).unwrap();
        db.write(|s| s.save_member(&member("u1", "moderator"), &cid, None, None)).unwrap();

        let members = db.read(|s| s.members(&cid)).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].role.as_deref(), Some("moderator"));

        assert!(db.write(|s| s.remove_member("u1", &cid)).unwrap());
        assert!(db.read(|s| s.member("u1", &cid)).unwrap().is_none());
    }

    #[test]
    fn member_list_query_keeps_order() {
        let db = Database::open_in_memory().unwrap();
        let cid = ChannelId::new("messaging", "c1");
        let query = ChannelMemberListQuery {
            cid: cid.to_string(),
            filter: json!({}),
            sort: Vec::new(),
            page_size: 30,
        };

        let message = MessagePayload::new("m1", UserPayload::new("u1"), "", Utc::now());
        db.write(|s| {
            s.save_message(&message, Some(&cid), false, None)?;
            s.save_member(&member("u2", "member"), &cid, Some(&query), None)?;
            s.save_member(&member("u1", "owner"), &cid, Some(&query), None)?;
            Ok(())
        })
        .unwrap();

        let hash = query.filter_hash();
        let listed: Vec<_> = db
            .read(|s| s.member_list(&query, &hash))
            .unwrap()
            .into_iter()
            .map(|m| m.user_id)
            .collect();
        assert_eq!(listed, ["u2", "u1"]);
        assert!(db.read(|s| s.channel_member_list_query(&hash)).unwrap().is_some());
    }
}
