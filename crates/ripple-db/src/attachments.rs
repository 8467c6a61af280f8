use rusqlite::{Row, params};

use ripple_types::payloads::AttachmentPayload;
use ripple_types::{AttachmentId, ChannelId};

use crate::models::AttachmentRow;
use crate::session::{OptionalExt, Session, cid_column, json_column, to_json};
use crate::{DatabaseResult, PreconditionError};

const ATTACHMENT_COLUMNS: &str =
    "id, message_id, cid, position, attachment_type, payload, upload_state";

/// Upload state of an attachment staged locally and not yet uploaded.
pub const PENDING_UPLOAD: &str = "pending_upload";

impl Session<'_> {
    pub fn attachment(&self, id: &AttachmentId) -> DatabaseResult<Option<AttachmentRow>> {
        self.conn()
            .query_row(
                &format!("SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE id = ?1"),
                [id.to_string()],
                attachment_from_row,
            )
            .optional()
    }

    pub fn attachments(&self, message_id: &str) -> DatabaseResult<Vec<AttachmentRow>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE message_id = ?1 ORDER BY position"
        ))?;
        let attachments = stmt
            .query_map([message_id], attachment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(attachments)
    }

    /// Stages a local attachment on an existing message, pending upload.
    pub fn create_new_attachment(
        &mut self,
        payload: &AttachmentPayload,
        id: &AttachmentId,
    ) -> DatabaseResult<AttachmentRow> {
        if !self.message_exists(&id.message_id)? {
            return Err(PreconditionError::MessageDoesNotExist(id.message_id.clone()).into());
        }
        self.insert_attachment(payload, id, Some(PENDING_UPLOAD))?;
        self.attachment(id)?
            .ok_or_else(|| PreconditionError::MessageDoesNotExist(id.message_id.clone()).into())
    }

    pub fn delete_attachment(&mut self, id: &AttachmentId) -> DatabaseResult<bool> {
        let deleted = self
            .conn()
            .execute("DELETE FROM attachments WHERE id = ?1", [id.to_string()])?;
        Ok(deleted > 0)
    }

    pub fn set_attachment_upload_state(
        &mut self,
        id: &AttachmentId,
        upload_state: Option<&str>,
    ) -> DatabaseResult<bool> {
        let updated = self.conn().execute(
            "UPDATE attachments SET upload_state = ?2 WHERE id = ?1",
            params![id.to_string(), upload_state],
        )?;
        Ok(updated > 0)
    }

    /// Server payloads carry the full attachment list; it replaces what is stored.
    pub(crate) fn replace_attachments(
        &mut self,
        message_id: &str,
        cid: &ChannelId,
        attachments: &[AttachmentPayload],
    ) -> DatabaseResult<()> {
        self.conn()
            .execute("DELETE FROM attachments WHERE message_id = ?1", [message_id])?;
        for (index, payload) in attachments.iter().enumerate() {
            let id = AttachmentId::new(cid.clone(), message_id, index);
            self.insert_attachment(payload, &id, None)?;
        }
        Ok(())
    }

    fn insert_attachment(
        &mut self,
        payload: &AttachmentPayload,
        id: &AttachmentId,
        upload_state: Option<&str>,
    ) -> DatabaseResult<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO attachments
                (id, message_id, cid, position, attachment_type, payload, upload_state)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id.to_string(),
                id.message_id,
                id.cid.to_string(),
                id.index as i64,
                payload.attachment_type,
                to_json(&payload.payload)?,
                upload_state,
            ],
        )?;
        Ok(())
    }
}

fn attachment_from_row(row: &Row<'_>) -> rusqlite::Result<AttachmentRow> {
    let position: i64 = row.get(3)?;
    Ok(AttachmentRow {
        id: row.get(0)?,
        message_id: row.get(1)?,
        cid: cid_column(row, 2)?,
        position: position.max(0) as usize,
        attachment_type: row.get(4)?,
        payload: json_column(row, 5)?,
        upload_state: row.get(6)?,
    })
}
