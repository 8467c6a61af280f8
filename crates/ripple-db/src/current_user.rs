use rusqlite::params;

use ripple_types::UnreadCount;
use ripple_types::payloads::OwnUserPayload;

use crate::models::{CurrentUserRow, DeviceRow};
use crate::session::{OptionalExt, Session, opt_from_millis, opt_millis};
use crate::{DatabaseResult, PreconditionError};

impl Session<'_> {
    pub fn current_user(&self) -> DatabaseResult<Option<CurrentUserRow>> {
        let marker: Option<(String, u32, u32, Option<String>)> = self
            .conn()
            .query_row(
                "SELECT user_id, unread_channels, unread_messages, current_device_id
                 FROM current_user WHERE singleton = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((user_id, channels, messages, current_device_id)) = marker else {
            return Ok(None);
        };
        let Some(user) = self.user(&user_id)? else {
            return Ok(None);
        };

        Ok(Some(CurrentUserRow {
            user,
            devices: self.devices()?,
            current_device_id,
            unread_count: UnreadCount { channels, messages },
        }))
    }

    pub fn current_user_id(&self) -> DatabaseResult<Option<String>> {
        self.conn()
            .query_row(
                "SELECT user_id FROM current_user WHERE singleton = 1",
                [],
                |row| row.get(0),
            )
            .optional()
    }

    pub(crate) fn require_current_user_id(&self) -> DatabaseResult<String> {
        self.current_user_id()?
            .ok_or_else(|| PreconditionError::CurrentUserDoesNotExist.into())
    }

    /// Stores the signed-in user. The device list is replaced wholesale; the
    /// current device survives unless the signed-in user changed.
    pub fn save_current_user(&mut self, payload: &OwnUserPayload) -> DatabaseResult<()> {
        self.save_user(&payload.user, None, None)?;

        self.conn().execute(
            "INSERT INTO current_user (singleton, user_id, unread_channels, unread_messages)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(singleton) DO UPDATE SET
                current_device_id = CASE
                    WHEN current_user.user_id = excluded.user_id THEN current_user.current_device_id
                    ELSE NULL
                END,
                user_id = excluded.user_id,
                unread_channels = excluded.unread_channels,
                unread_messages = excluded.unread_messages",
            params![
                payload.user.id,
                payload.unread_channels,
                payload.total_unread_count,
            ],
        )?;

        self.conn().execute("DELETE FROM devices", [])?;
        for device in &payload.devices {
            self.conn().execute(
                "INSERT INTO devices (id, push_provider, created_at) VALUES (?1, ?2, ?3)",
                params![device.id, device.push_provider, opt_millis(device.created_at)],
            )?;
        }
        Ok(())
    }

    pub fn save_current_user_unread_count(&mut self, count: UnreadCount) -> DatabaseResult<()> {
        let updated = self.conn().execute(
            "UPDATE current_user SET unread_channels = ?1, unread_messages = ?2 WHERE singleton = 1",
            params![count.channels, count.messages],
        )?;
        if updated == 0 {
            return Err(PreconditionError::CurrentUserDoesNotExist.into());
        }
        Ok(())
    }

    /// Marks `device_id` as this install's device, registering it if needed.
    pub fn save_current_device(&mut self, device_id: &str) -> DatabaseResult<()> {
        self.require_current_user_id()?;
        self.conn()
            .execute("INSERT OR IGNORE INTO devices (id) VALUES (?1)", [device_id])?;
        self.conn().execute(
            "UPDATE current_user SET current_device_id = ?1 WHERE singleton = 1",
            [device_id],
        )?;
        Ok(())
    }

    pub fn delete_device(&mut self, id: &str) -> DatabaseResult<bool> {
        self.conn().execute(
            "UPDATE current_user SET current_device_id = NULL WHERE current_device_id = ?1",
            [id],
        )?;
        let deleted = self.conn().execute("DELETE FROM devices WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    pub fn devices(&self) -> DatabaseResult<Vec<DeviceRow>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id, push_provider, created_at FROM devices ORDER BY id")?;
        let devices = stmt
            .query_map([], |row| {
                Ok(DeviceRow {
                    id: row.get(0)?,
                    push_provider: row.get(1)?,
                    created_at: opt_from_millis(row.get(2)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(devices)
    }
}
