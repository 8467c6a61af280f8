use chrono::Utc;
use rusqlite::params;
use serde_json::Value;

use crate::DatabaseResult;
use crate::models::QueuedRequestRow;
use crate::session::{Session, from_millis, json_column, to_json, to_millis};

impl Session<'_> {
    /// Queues an API call made while offline. It stays until deleted on success.
    pub fn save_queued_request(&mut self, id: &str, endpoint: &Value) -> DatabaseResult<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO queued_requests (id, endpoint, created_at) VALUES (?1, ?2, ?3)",
            params![id, to_json(endpoint)?, to_millis(Utc::now())],
        )?;
        Ok(())
    }

    /// Oldest first.
    pub fn queued_requests(&self) -> DatabaseResult<Vec<QueuedRequestRow>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id, endpoint, created_at FROM queued_requests ORDER BY created_at, id")?;
        let requests = stmt
            .query_map([], |row| {
                Ok(QueuedRequestRow {
                    id: row.get(0)?,
                    endpoint: json_column(row, 1)?,
                    created_at: from_millis(row.get(2)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(requests)
    }

    pub fn delete_queued_request(&mut self, id: &str) -> DatabaseResult<bool> {
        let deleted = self
            .conn()
            .execute("DELETE FROM queued_requests WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }
}
