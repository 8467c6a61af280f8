use rusqlite::Connection;
use tracing::info;

use crate::DatabaseResult;

/// Current schema version.
pub const CURRENT_VERSION: i64 = 2;

/// Applies every migration newer than the stored version, in order.
pub fn run(conn: &Connection) -> DatabaseResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version     INTEGER PRIMARY KEY,
            name        TEXT NOT NULL,
            applied_at  TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    if current_version >= CURRENT_VERSION {
        return Ok(());
    }

    if current_version < 1 {
        apply(conn, 1, "initial_schema", V1_INITIAL_SCHEMA)?;
    }
    if current_version < 2 {
        apply(conn, 2, "list_queries", V2_LIST_QUERIES)?;
    }

    info!(
        from = current_version,
        to = CURRENT_VERSION,
        "Database migrations complete"
    );
    Ok(())
}

fn apply(conn: &Connection, version: i64, name: &str, sql: &str) -> DatabaseResult<()> {
    conn.execute_batch(&format!("BEGIN;\n{sql}\nCOMMIT;"))?;
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        (version, name),
    )?;
    Ok(())
}

const V1_INITIAL_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id              TEXT PRIMARY KEY,
        name            TEXT,
        image_url       TEXT,
        role            TEXT NOT NULL DEFAULT 'user',
        is_online       INTEGER NOT NULL DEFAULT 0,
        is_banned       INTEGER NOT NULL DEFAULT 0,
        created_at      INTEGER,
        updated_at      INTEGER,
        last_active_at  INTEGER,
        deactivated_at  INTEGER,
        extra_data      TEXT NOT NULL DEFAULT '{}'
    );

    CREATE TABLE IF NOT EXISTS current_user (
        singleton           INTEGER PRIMARY KEY CHECK (singleton = 1),
        user_id             TEXT NOT NULL,
        unread_channels     INTEGER NOT NULL DEFAULT 0,
        unread_messages     INTEGER NOT NULL DEFAULT 0,
        current_device_id   TEXT
    );

    CREATE TABLE IF NOT EXISTS devices (
        id              TEXT PRIMARY KEY,
        push_provider   TEXT NOT NULL DEFAULT '',
        created_at      INTEGER
    );

    CREATE TABLE IF NOT EXISTS channels (
        cid                 TEXT PRIMARY KEY,
        channel_type        TEXT NOT NULL,
        channel_id          TEXT NOT NULL,
        name                TEXT,
        created_at          INTEGER NOT NULL,
        updated_at          INTEGER NOT NULL,
        deleted_at          INTEGER,
        truncated_at        INTEGER,
        last_message_at     INTEGER,
        member_count        INTEGER NOT NULL DEFAULT 0,
        is_frozen           INTEGER NOT NULL DEFAULT 0,
        config              TEXT NOT NULL DEFAULT '{}',
        created_by_id       TEXT,
        preview_message_id  TEXT,
        extra_data          TEXT NOT NULL DEFAULT '{}'
    );

    CREATE TABLE IF NOT EXISTS channel_typing_users (
        cid         TEXT NOT NULL,
        user_id     TEXT NOT NULL,
        PRIMARY KEY (cid, user_id)
    );

    CREATE TABLE IF NOT EXISTS members (
        cid         TEXT NOT NULL,
        user_id     TEXT NOT NULL,
        role        TEXT,
        is_banned   INTEGER NOT NULL DEFAULT 0,
        created_at  INTEGER,
        updated_at  INTEGER,
        PRIMARY KEY (cid, user_id)
    );

    CREATE TABLE IF NOT EXISTS messages (
        id                      TEXT PRIMARY KEY,
        cid                     TEXT NOT NULL,
        user_id                 TEXT NOT NULL,
        text                    TEXT NOT NULL DEFAULT '',
        message_type            TEXT NOT NULL DEFAULT 'regular',
        created_at              INTEGER NOT NULL,
        updated_at              INTEGER NOT NULL,
        deleted_at              INTEGER,
        parent_id               TEXT,
        quoted_message_id       TEXT,
        show_reply_in_channel   INTEGER NOT NULL DEFAULT 0,
        show_inside_thread      INTEGER NOT NULL DEFAULT 0,
        is_silent               INTEGER NOT NULL DEFAULT 0,
        is_hard_deleted         INTEGER NOT NULL DEFAULT 0,
        pinned_at               INTEGER,
        pinned_by_id            TEXT,
        pin_expires             INTEGER,
        own_reactions           TEXT NOT NULL DEFAULT '[]',
        reaction_scores         TEXT NOT NULL DEFAULT '{}',
        local_state             TEXT,
        reply_count             INTEGER NOT NULL DEFAULT 0,
        command                 TEXT,
        arguments               TEXT,
        mentioned_user_ids      TEXT NOT NULL DEFAULT '[]',
        skip_push               INTEGER NOT NULL DEFAULT 0,
        skip_enrich_url         INTEGER NOT NULL DEFAULT 0,
        extra_data              TEXT NOT NULL DEFAULT '{}'
    );

    CREATE INDEX IF NOT EXISTS idx_messages_channel
        ON messages(cid, created_at);

    CREATE INDEX IF NOT EXISTS idx_messages_quoted
        ON messages(quoted_message_id);

    CREATE INDEX IF NOT EXISTS idx_messages_parent
        ON messages(parent_id);

    CREATE INDEX IF NOT EXISTS idx_messages_local_state
        ON messages(local_state);

    CREATE TABLE IF NOT EXISTS reactions (
        id              TEXT PRIMARY KEY,
        message_id      TEXT NOT NULL,
        user_id         TEXT NOT NULL,
        reaction_type   TEXT NOT NULL,
        score           INTEGER NOT NULL DEFAULT 1,
        created_at      INTEGER NOT NULL,
        updated_at      INTEGER NOT NULL,
        local_state     TEXT,
        version         TEXT,
        extra_data      TEXT NOT NULL DEFAULT '{}',
        UNIQUE(message_id, user_id, reaction_type)
    );

    CREATE INDEX IF NOT EXISTS idx_reactions_message
        ON reactions(message_id);

    CREATE TABLE IF NOT EXISTS attachments (
        id              TEXT PRIMARY KEY,
        message_id      TEXT NOT NULL,
        cid             TEXT NOT NULL,
        position        INTEGER NOT NULL,
        attachment_type TEXT NOT NULL,
        payload         TEXT NOT NULL DEFAULT '{}',
        upload_state    TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_attachments_message
        ON attachments(message_id);

    CREATE TABLE IF NOT EXISTS channel_reads (
        cid                     TEXT NOT NULL,
        user_id                 TEXT NOT NULL,
        last_read_at            INTEGER NOT NULL,
        last_read_message_id    TEXT,
        unread_messages_count   INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (cid, user_id)
    );

    CREATE TABLE IF NOT EXISTS queued_requests (
        id          TEXT PRIMARY KEY,
        endpoint    TEXT NOT NULL,
        created_at  INTEGER NOT NULL
    );
";

const V2_LIST_QUERIES: &str = "
    CREATE TABLE IF NOT EXISTS list_queries (
        kind            TEXT NOT NULL,
        filter_hash     TEXT NOT NULL,
        filter          TEXT NOT NULL,
        sort            TEXT NOT NULL DEFAULT 'null',
        next_cursor     TEXT,
        updated_at      INTEGER NOT NULL,
        PRIMARY KEY (kind, filter_hash)
    );

    CREATE TABLE IF NOT EXISTS list_query_results (
        kind            TEXT NOT NULL,
        filter_hash     TEXT NOT NULL,
        entity_id       TEXT NOT NULL,
        position        INTEGER NOT NULL,
        PRIMARY KEY (kind, filter_hash, entity_id)
    );

    CREATE INDEX IF NOT EXISTS idx_list_query_results_entity
        ON list_query_results(kind, entity_id);
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_rerunnable() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }
}
