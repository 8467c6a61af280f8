use chrono::{DateTime, Duration, Utc};
use rusqlite::{Row, params};

use ripple_types::ChannelId;
use ripple_types::payloads::ReadPayload;

use crate::models::ChannelReadRow;
use crate::session::{OptionalExt, Session, cid_column, from_millis, to_millis};
use crate::{DatabaseResult, PreconditionError};

const READ_COLUMNS: &str =
    "cid, user_id, last_read_at, last_read_message_id, unread_messages_count";

impl Session<'_> {
    /// Returns `None` when the channel or the user is not stored.
    pub fn load_or_create_channel_read(
        &mut self,
        cid: &ChannelId,
        user_id: &str,
    ) -> DatabaseResult<Option<ChannelReadRow>> {
        if let Some(read) = self.load_channel_read(cid, user_id)? {
            return Ok(Some(read));
        }
        if !self.channel_exists(cid)? || !self.user_exists(user_id)? {
            return Ok(None);
        }

        self.conn().execute(
            "INSERT INTO channel_reads (cid, user_id, last_read_at) VALUES (?1, ?2, 0)",
            params![cid.to_string(), user_id],
        )?;
        self.load_channel_read(cid, user_id)
    }

    pub fn load_channel_read(
        &self,
        cid: &ChannelId,
        user_id: &str,
    ) -> DatabaseResult<Option<ChannelReadRow>> {
        self.conn()
            .query_row(
                &format!("SELECT {READ_COLUMNS} FROM channel_reads WHERE cid = ?1 AND user_id = ?2"),
                params![cid.to_string(), user_id],
                read_from_row,
            )
            .optional()
    }

    pub fn load_channel_reads(&self, user_id: &str) -> DatabaseResult<Vec<ChannelReadRow>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {READ_COLUMNS} FROM channel_reads WHERE user_id = ?1 ORDER BY cid"
        ))?;
        let reads = stmt
            .query_map([user_id], read_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(reads)
    }

    pub fn save_channel_read(
        &mut self,
        payload: &ReadPayload,
        cid: &ChannelId,
    ) -> DatabaseResult<ChannelReadRow> {
        if !self.channel_exists(cid)? {
            return Err(PreconditionError::ChannelDoesNotExist(cid.to_string()).into());
        }
        self.save_user(&payload.user, None, None)?;
        self.write_read(
            cid,
            &payload.user.id,
            payload.last_read,
            payload.last_read_message_id.as_deref(),
            payload.unread_messages,
        )
    }

    /// Marks the channel read up to `at`. The last read message becomes the
    /// newest one created at or before `at`.
    pub fn mark_channel_as_read(
        &mut self,
        cid: &ChannelId,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> DatabaseResult<Option<ChannelReadRow>> {
        if self.load_or_create_channel_read(cid, user_id)?.is_none() {
            return Ok(None);
        }

        let last_read_message_id: Option<String> = self
            .conn()
            .query_row(
                "SELECT id FROM messages
                 WHERE cid = ?1 AND created_at <= ?2
                   AND (parent_id IS NULL OR show_reply_in_channel = 1)
                 ORDER BY created_at DESC, id DESC
                 LIMIT 1",
                params![cid.to_string(), to_millis(at)],
                |row| row.get(0),
            )
            .optional()?;

        self.write_read(cid, user_id, at, last_read_message_id.as_deref(), 0)
            .map(Some)
    }

    /// Marks the channel unread starting at `from_message_id`.
    ///
    /// Without an explicit `last_read_at` the read lands one millisecond before
    /// that message. Without an explicit `unread_count` the count is every
    /// later timeline message of type regular or reply that is neither
    /// deleted nor authored by `user_id`.
    pub fn mark_channel_as_unread(
        &mut self,
        cid: &ChannelId,
        user_id: &str,
        from_message_id: &str,
        last_read_message_id: Option<&str>,
        last_read_at: Option<DateTime<Utc>>,
        unread_count: Option<u32>,
    ) -> DatabaseResult<Option<ChannelReadRow>> {
        let Some(from) = self.message(from_message_id)? else {
            return Ok(None);
        };
        if self.load_or_create_channel_read(cid, user_id)?.is_none() {
            return Ok(None);
        }

        let last_read_at = last_read_at.unwrap_or(from.created_at - Duration::milliseconds(1));
        let unread_count = match unread_count {
            Some(count) => count,
            None => self.conn().query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE cid = ?1 AND created_at > ?2 AND user_id != ?3
                   AND deleted_at IS NULL AND is_hard_deleted = 0
                   AND (parent_id IS NULL OR show_reply_in_channel = 1)
                   AND message_type IN ('regular', 'reply')",
                params![cid.to_string(), to_millis(last_read_at), user_id],
                |row| row.get(0),
            )?,
        };

        self.write_read(cid, user_id, last_read_at, last_read_message_id, unread_count)
            .map(Some)
    }

    pub fn remove_channel_read(&mut self, cid: &ChannelId, user_id: &str) -> DatabaseResult<bool> {
        let deleted = self.conn().execute(
            "DELETE FROM channel_reads WHERE cid = ?1 AND user_id = ?2",
            params![cid.to_string(), user_id],
        )?;
        Ok(deleted > 0)
    }

    fn write_read(
        &mut self,
        cid: &ChannelId,
        user_id: &str,
        last_read_at: DateTime<Utc>,
        last_read_message_id: Option<&str>,
        unread_count: u32,
    ) -> DatabaseResult<ChannelReadRow> {
        self.conn().execute(
            "INSERT INTO channel_reads (cid, user_id, last_read_at, last_read_message_id,
                                        unread_messages_count)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(cid, user_id) DO UPDATE SET
                last_read_at = excluded.last_read_at,
                last_read_message_id = excluded.last_read_message_id,
                unread_messages_count = excluded.unread_messages_count",
            params![
                cid.to_string(),
                user_id,
                to_millis(last_read_at),
                last_read_message_id,
                unread_count,
            ],
        )?;
        Ok(ChannelReadRow {
            cid: cid.clone(),
            user_id: user_id.to_string(),
            last_read_at: from_millis(to_millis(last_read_at)),
            last_read_message_id: last_read_message_id.map(String::from),
            unread_messages_count: unread_count,
        })
    }
}

fn read_from_row(row: &Row<'_>) -> rusqlite::Result<ChannelReadRow> {
    Ok(ChannelReadRow {
        cid: cid_column(row, 0)?,
        user_id: row.get(1)?,
        last_read_at: from_millis(row.get(2)?),
        last_read_message_id: row.get(3)?,
        unread_messages_count: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use ripple_types::payloads::{MessagePayload, OwnUserPayload, UserPayload};
    use ripple_types::MessageType;

    use crate::Database;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn cid() -> ChannelId {
        ChannelId::new("messaging", "c1")
    }

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.write(|s| {
            s.save_current_user(&OwnUserPayload {
                user: UserPayload::new("u1"),
                devices: Vec::new(),
                total_unread_count: 0,
                unread_channels: 0,
            })?;
            let messages = [
                ("m1", "u2", 1, MessageType::Regular),
                ("m2", "u1", 2, MessageType::Regular),
                ("m3", "u2", 3, MessageType::System),
                ("m4", "u2", 4, MessageType::Regular),
                ("m5", "u3", 5, MessageType::Reply),
            ];
            for (id, author, secs, message_type) in messages {
                let mut message = MessagePayload::new(id, UserPayload::new(author), id, at(secs));
                message.message_type = message_type;
                s.save_message(&message, Some(&cid()), false, None)?;
            }
            Ok(())
        })
        .unwrap();
        db
    }

    #[test]
    fn reads_need_channel_and_user() {
        let db = seeded();
        let missing = ChannelId::new("messaging", "nope");
        assert!(db.write(|s| s.load_or_create_channel_read(&missing, "u1")).unwrap().is_none());
        assert!(db.write(|s| s.load_or_create_channel_read(&cid(), "ghost")).unwrap().is_none());

        let read = db
            .write(|s| s.load_or_create_channel_read(&cid(), "u1"))
            .unwrap()
            .unwrap();
        assert_eq!(read.last_read_at, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(read.unread_messages_count, 0);
    }

    #[test]
    fn mark_read_points_at_newest_message_so_far() {
        let db = seeded();
        let read = db
            .write(|s| s.mark_channel_as_read(&cid(), "u1", at(3)))
            .unwrap()
            .unwrap();
        assert_eq!(read.last_read_message_id.as_deref(), Some("m3"));
        assert_eq!(read.unread_messages_count, 0);

        let unread = db.read(|s| s.channel(&cid())).unwrap().unwrap().unread_count;
        assert_eq!(unread, 0);
    }

    #[test]
    fn mark_unread_counts_countable_messages_from_the_given_one() {
        let db = seeded();
        let read = db
            .write(|s| s.mark_channel_as_unread(&cid(), "u1", "m2", Some("m1"), None, None))
            .unwrap()
            .unwrap();

        // m2 is our own, m3 is a system message; m4 and m5 count.
        assert_eq!(read.unread_messages_count, 2);
        assert_eq!(read.last_read_at, at(2) - Duration::milliseconds(1));
        assert_eq!(read.last_read_message_id.as_deref(), Some("m1"));
        assert_eq!(db.read(|s| s.channel(&cid())).unwrap().unwrap().unread_count, 2);
    }

    #[test]
    fn explicit_unread_count_wins() {
        let db = seeded();
        let read = db
            .write(|s| s.mark_channel_as_unread(&cid(), "u1", "m1", None, Some(at(0)), Some(9)))
            .unwrap()
            .unwrap();
        assert_eq!(read.unread_messages_count, 9);
        assert_eq!(read.last_read_at, at(0));

        let missing = db
            .write(|s| s.mark_channel_as_unread(&cid(), "u1", "m404", None, None, None))
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn save_and_remove_read() {
        let db = seeded();
        let payload = ReadPayload {
            user: UserPayload::new("u2"),
            last_read: at(4),
            last_read_message_id: Some("m4".into()),
            unread_messages: 1,
        };
        db.write(|s| s.save_channel_read(&payload, &cid())).unwrap();
        assert_eq!(db.read(|s| s.load_channel_reads("u2")).unwrap().len(), 1);

        assert!(db.write(|s| s.remove_channel_read(&cid(), "u2")).unwrap());
        assert!(db.read(|s| s.load_channel_read(&cid(), "u2")).unwrap().is_none());
    }
}
