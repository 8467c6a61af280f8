use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{Row, params};
use serde_json::Value;

use ripple_types::query::{ListQuery, ListQueryKind, MessageSearchQuery};

use crate::DatabaseResult;
use crate::models::ListQueryRow;
use crate::session::{OptionalExt, Session, from_millis, json_column, to_json, to_millis};

impl Session<'_> {
    // -- List queries --

    /// Registers a query descriptor; re-saving keeps its cached results.
    pub fn save_list_query<Q: ListQuery>(&mut self, query: &Q) -> DatabaseResult<String> {
        let hash = query.filter_hash();
        self.conn().execute(
            "INSERT INTO list_queries (kind, filter_hash, filter, sort, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(kind, filter_hash) DO UPDATE SET
                filter = excluded.filter,
                sort = excluded.sort,
                updated_at = excluded.updated_at",
            params![
                Q::KIND.as_str(),
                hash,
                to_json(&query.filter_json())?,
                to_json(&query.sort_json())?,
                to_millis(Utc::now()),
            ],
        )?;
        Ok(hash)
    }

    pub fn list_query(
        &self,
        kind: ListQueryKind,
        filter_hash: &str,
    ) -> DatabaseResult<Option<ListQueryRow>> {
        let row = self
            .conn()
            .query_row(
                "SELECT kind, filter_hash, filter, sort, next_cursor, updated_at
                 FROM list_queries WHERE kind = ?1 AND filter_hash = ?2",
                params![kind.as_str(), filter_hash],
                list_query_from_row,
            )
            .optional()?;

        match row {
            Some(mut row) => {
                row.result_ids = self.query_result_ids(kind, filter_hash)?;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    pub fn load_all_list_queries(&self, kind: ListQueryKind) -> DatabaseResult<Vec<ListQueryRow>> {
        let mut stmt = self.conn().prepare(
            "SELECT kind, filter_hash, filter, sort, next_cursor, updated_at
             FROM list_queries WHERE kind = ?1 ORDER BY updated_at, filter_hash",
        )?;
        let mut rows = stmt
            .query_map([kind.as_str()], list_query_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        for row in &mut rows {
            row.result_ids = self.query_result_ids(kind, &row.filter_hash)?;
        }
        Ok(rows)
    }

    /// Drops the descriptor and its cached results. The entities stay.
    pub fn delete_list_query(&mut self, kind: ListQueryKind, filter_hash: &str) -> DatabaseResult<bool> {
        self.conn().execute(
            "DELETE FROM list_query_results WHERE kind = ?1 AND filter_hash = ?2",
            params![kind.as_str(), filter_hash],
        )?;
        let deleted = self.conn().execute(
            "DELETE FROM list_queries WHERE kind = ?1 AND filter_hash = ?2",
            params![kind.as_str(), filter_hash],
        )?;
        Ok(deleted > 0)
    }

    // -- Query results --

    /// Replaces the cached results, e.g. after fetching the first page again.
    pub fn set_query_results(
        &mut self,
        kind: ListQueryKind,
        filter_hash: &str,
        ids: &[String],
        next_cursor: Option<&str>,
    ) -> DatabaseResult<()> {
        self.conn().execute(
            "DELETE FROM list_query_results WHERE kind = ?1 AND filter_hash = ?2",
            params![kind.as_str(), filter_hash],
        )?;
        self.append_query_results(kind, filter_hash, ids, next_cursor)
    }

    /// Appends ids that are not cached yet, after the existing ones.
    pub fn append_query_results(
        &mut self,
        kind: ListQueryKind,
        filter_hash: &str,
        ids: &[String],
        next_cursor: Option<&str>,
    ) -> DatabaseResult<()> {
        let mut next_position: i64 = self.conn().query_row(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM list_query_results
             WHERE kind = ?1 AND filter_hash = ?2",
            params![kind.as_str(), filter_hash],
            |row| row.get(0),
        )?;

        {
            let mut insert = self.conn().prepare(
                "INSERT OR IGNORE INTO list_query_results (kind, filter_hash, entity_id, position)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for id in ids {
                if insert.execute(params![kind.as_str(), filter_hash, id, next_position])? > 0 {
                    next_position += 1;
                }
            }
        }

        self.conn().execute(
            "UPDATE list_queries SET next_cursor = ?3, updated_at = ?4
             WHERE kind = ?1 AND filter_hash = ?2",
            params![kind.as_str(), filter_hash, next_cursor, to_millis(Utc::now())],
        )?;
        Ok(())
    }

    /// Unlinks an entity from every cached query of `kind`.
    pub(crate) fn remove_from_query_results(
        &mut self,
        kind: ListQueryKind,
        entity_id: &str,
    ) -> DatabaseResult<usize> {
        Ok(self.conn().execute(
            "DELETE FROM list_query_results WHERE kind = ?1 AND entity_id = ?2",
            params![kind.as_str(), entity_id],
        )?)
    }

    pub(crate) fn query_result_ids(
        &self,
        kind: ListQueryKind,
        filter_hash: &str,
    ) -> DatabaseResult<Vec<String>> {
        let mut stmt = self.conn().prepare(
            "SELECT entity_id FROM list_query_results
             WHERE kind = ?1 AND filter_hash = ?2
             ORDER BY position",
        )?;
        let ids = stmt
            .query_map(params![kind.as_str(), filter_hash], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    // -- Message search --

    pub fn save_message_search_query(&mut self, query: &MessageSearchQuery) -> DatabaseResult<String> {
        self.save_list_query(query)
    }

    pub fn message_search_query(&self, filter_hash: &str) -> DatabaseResult<Option<ListQueryRow>> {
        self.list_query(ListQueryKind::MessageSearch, filter_hash)
    }

    pub fn delete_message_search_query(&mut self, query: &MessageSearchQuery) -> DatabaseResult<bool> {
        self.delete_list_query(ListQueryKind::MessageSearch, &query.filter_hash())
    }
}

fn list_query_from_row(row: &Row<'_>) -> rusqlite::Result<ListQueryRow> {
    let raw_kind: String = row.get(0)?;
    let kind = ListQueryKind::from_db(&raw_kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            Type::Text,
            format!("unknown list query kind `{raw_kind}`").into(),
        )
    })?;
    let filter: Value = json_column(row, 2)?;
    let sort: Value = json_column(row, 3)?;

    Ok(ListQueryRow {
        kind,
        filter_hash: row.get(1)?,
        filter,
        sort,
        next_cursor: row.get(4)?,
        updated_at: from_millis(row.get(5)?),
        result_ids: Vec::new(),
    })
}
