use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, Transaction};
use serde::Serialize;
use serde::de::DeserializeOwned;

use ripple_types::ChannelId;

use crate::DatabaseResult;

/// One unit of work against the store.
///
/// Lookups take `&self`, anything that writes takes `&mut self`. The session
/// is only handed out by [`crate::Database::write`] and
/// [`crate::Database::read`], which own commit and rollback.
pub struct Session<'conn> {
    tx: Transaction<'conn>,
}

impl<'conn> Session<'conn> {
    pub(crate) fn new(tx: Transaction<'conn>) -> Self {
        Self { tx }
    }

    pub(crate) fn into_transaction(self) -> Transaction<'conn> {
        self.tx
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.tx
    }
}

// -- Column helpers --

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn opt_millis(at: Option<DateTime<Utc>>) -> Option<i64> {
    at.map(to_millis)
}

pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

pub(crate) fn opt_from_millis(millis: Option<i64>) -> Option<DateTime<Utc>> {
    millis.map(from_millis)
}

pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> DatabaseResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// Decodes a TEXT column holding JSON.
pub(crate) fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn cid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<ChannelId> {
    let raw: String = row.get(idx)?;
    ChannelId::parse(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> DatabaseResult<Option<T>>;
}

impl<T> OptionalExt<T> for Result<T, rusqlite::Error> {
    fn optional(self) -> DatabaseResult<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_keep_sub_second_precision() {
        let at = DateTime::parse_from_rfc3339("2024-05-01T12:30:45.123Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(from_millis(to_millis(at)), at);
        assert_eq!(opt_from_millis(opt_millis(None)), None);
    }
}
