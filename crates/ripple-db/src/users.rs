use chrono::{DateTime, Utc};
use rusqlite::{Row, params};

use ripple_types::payloads::{Page, UserPayload};
use ripple_types::query::{ListQuery, ListQueryKind, UserListQuery};

use crate::cache::PreWarmedCache;
use crate::models::{ListQueryRow, UserRow};
use crate::session::{
    OptionalExt, Session, json_column, opt_from_millis, opt_millis, to_json, to_millis,
};
use crate::DatabaseResult;

const USER_COLUMNS: &str = "id, name, image_url, role, is_online, is_banned, created_at, \
                            updated_at, last_active_at, deactivated_at, extra_data";

impl Session<'_> {
    pub fn user(&self, id: &str) -> DatabaseResult<Option<UserRow>> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                [id],
                user_from_row,
            )
            .optional()
    }

    pub fn user_exists(&self, id: &str) -> DatabaseResult<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row("SELECT 1 FROM users WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// Upserts a user and, when `query` is given, links it to that query's results.
    pub fn save_user(
        &mut self,
        payload: &UserPayload,
        query: Option<&UserListQuery>,
        mut cache: Option<&mut PreWarmedCache>,
    ) -> DatabaseResult<()> {
        let already_saved = cache
            .as_deref()
            .is_some_and(|cache| cache.has_user(&payload.id));

        if !already_saved {
            self.conn().execute(
                "INSERT INTO users (id, name, image_url, role, is_online, is_banned,
                                    created_at, updated_at, last_active_at, deactivated_at, extra_data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    image_url = excluded.image_url,
                    role = excluded.role,
                    is_online = excluded.is_online,
                    is_banned = excluded.is_banned,
                    created_at = COALESCE(excluded.created_at, users.created_at),
                    updated_at = COALESCE(excluded.updated_at, users.updated_at),
                    last_active_at = COALESCE(excluded.last_active_at, users.last_active_at),
                    deactivated_at = excluded.deactivated_at,
                    extra_data = excluded.extra_data",
                params![
                    payload.id,
                    payload.name,
                    payload.image_url,
                    payload.role,
                    payload.online,
                    payload.banned,
                    opt_millis(payload.created_at),
                    opt_millis(payload.updated_at),
                    opt_millis(payload.last_active),
                    opt_millis(payload.deactivated_at),
                    to_json(&payload.extra_data)?,
                ],
            )?;
            if let Some(cache) = cache.as_deref_mut() {
                cache.insert_user(&payload.id);
            }
        }

        if let Some(query) = query {
            let hash = self.save_user_query(query)?;
            self.append_query_results(
                ListQueryKind::User,
                &hash,
                std::slice::from_ref(&payload.id),
                None,
            )?;
        }
        Ok(())
    }

    /// Makes sure a row exists for `id` without touching an existing one.
    pub(crate) fn ensure_user(&mut self, id: &str) -> DatabaseResult<()> {
        self.conn()
            .execute("INSERT OR IGNORE INTO users (id) VALUES (?1)", [id])?;
        Ok(())
    }

    /// Saves one fetched page of users for `query`, keeping its next cursor.
    pub fn save_user_page(
        &mut self,
        page: &Page<UserPayload>,
        query: &UserListQuery,
        mut cache: Option<&mut PreWarmedCache>,
    ) -> DatabaseResult<Vec<UserRow>> {
        let hash = self.save_user_query(query)?;
        for user in &page.items {
            self.save_user(user, None, cache.as_deref_mut())?;
        }
        let ids: Vec<String> = page.items.iter().map(|u| u.id.clone()).collect();
        self.append_query_results(ListQueryKind::User, &hash, &ids, page.next.as_deref())?;
        self.user_list(&hash)
    }

    pub fn save_user_query(&mut self, query: &UserListQuery) -> DatabaseResult<String> {
        self.save_list_query(query)
    }

    pub fn user_list_query(&self, filter_hash: &str) -> DatabaseResult<Option<ListQueryRow>> {
        self.list_query(ListQueryKind::User, filter_hash)
    }

    pub fn delete_user_query(&mut self, query: &UserListQuery) -> DatabaseResult<bool> {
        self.delete_list_query(ListQueryKind::User, &query.filter_hash())
    }

    /// Users cached for a query, in result order.
    pub fn user_list(&self, filter_hash: &str) -> DatabaseResult<Vec<UserRow>> {
        let mut users = Vec::new();
        for id in self.query_result_ids(ListQueryKind::User, filter_hash)? {
            if let Some(user) = self.user(&id)? {
                users.push(user);
            }
        }
        Ok(users)
    }

    pub fn deactivate_user(&mut self, id: &str, at: DateTime<Utc>) -> DatabaseResult<bool> {
        let updated = self.conn().execute(
            "UPDATE users SET deactivated_at = ?2 WHERE id = ?1",
            params![id, to_millis(at)],
        )?;
        Ok(updated > 0)
    }
}

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        image_url: row.get(2)?,
        role: row.get(3)?,
        is_online: row.get(4)?,
        is_banned: row.get(5)?,
        created_at: opt_from_millis(row.get(6)?),
        updated_at: opt_from_millis(row.get(7)?),
        last_active_at: opt_from_millis(row.get(8)?),
        deactivated_at: opt_from_millis(row.get(9)?),
        extra_data: json_column(row, 10)?,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::Database;

    use super::*;

    #[test]
    fn save_user_updates_in_place() {
        let db = Database::open_in_memory().unwrap();
        let mut user = UserPayload::new("u1");
        user.name = Some("Ana".into());

        db.write(|s| s.save_user(&user, None, None)).unwrap();
        user.name = Some("Ana B".into());
        user.extra_data.insert("team".into(), json!("core"));
        db.write(|s| s.save_user(&user, None, None)).unwrap();

        let row = db.read(|s| s.user("u1")).unwrap().unwrap();
        assert_eq!(row.name.as_deref(), Some("Ana B"));
        assert_eq!(row.extra_data.get("team"), Some(&json!("core")));
        assert!(db.read(|s| s.user("u2")).unwrap().is_none());
    }

    #[test]
    fn cached_users_are_not_rewritten() {
        let db = Database::open_in_memory().unwrap();
        let mut user = UserPayload::new("u1");
        user.name = Some("first".into());

        db.write(|s| {
            let mut cache = PreWarmedCache::new();
            s.save_user(&user, None, Some(&mut cache))?;
            user.name = Some("second".into());
            s.save_user(&user, None, Some(&mut cache))
        })
        .unwrap();

        let row = db.read(|s| s.user("u1")).unwrap().unwrap();
        assert_eq!(row.name.as_deref(), Some("first"));
    }

    #[test]
    fn user_pages_accumulate_under_their_query() {
        let db = Database::open_in_memory().unwrap();
        let query = UserListQuery {
            filter: json!({"banned": false}),
            sort: Vec::new(),
            page_size: 2,
        };
        let page = |ids: &[&str], next: Option<&str>| Page {
            items: ids.iter().map(|id| UserPayload::new(*id)).collect(),
            next: next.map(String::from),
        };

        let users = db
            .write(|s| {
                s.save_user_page(&page(&["u1", "u2"], Some("c1")), &query, None)?;
                s.save_user_page(&page(&["u3"], None), &query, None)
            })
            .unwrap();

        let ids: Vec<_> = users.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, ["u1", "u2", "u3"]);
    }
}
