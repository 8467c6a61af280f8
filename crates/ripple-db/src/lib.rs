//! SQLite-backed local store for the chat client.
//!
//! All access goes through a [`Session`], which wraps one SQLite transaction.
//! [`Database::write`] commits the session when the closure returns `Ok` and
//! rolls it back otherwise, so a failed event projection never leaves a
//! partial update behind.
//!
//! ```ignore
//! let db = Database::open(path)?;
//! db.apply_event(&event)?;
//! let timeline = db.read(|session| session.channel_messages(&cid, 50))?;
//! ```

pub mod attachments;
pub mod cache;
pub mod channels;
pub mod current_user;
mod error;
pub mod events;
pub mod members;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod queued_requests;
pub mod reactions;
pub mod reads;
mod session;
pub mod users;

use rusqlite::{Connection, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use ripple_types::Event;

pub use cache::PreWarmedCache;
pub use error::{DatabaseError, DatabaseResult, PreconditionError};
pub use session::Session;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Opens (or creates) the store, migrates it and runs the recovery sweep.
    pub fn open(path: &Path) -> DatabaseResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;

        let db = Self::init(conn)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    /// In-memory store, used by tests and throwaway sessions.
    pub fn open_in_memory() -> DatabaseResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> DatabaseResult<Self> {
        migrations::run(&conn)?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        let rescued = db.write(|session| session.rescue_messages_stuck_in_sending())?;
        if rescued > 0 {
            info!(rescued, "Reset messages left in sending state");
        }

        Ok(db)
    }

    fn lock(&self) -> DatabaseResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DatabaseError::LockPoisoned(e.to_string()))
    }

    /// Runs `f` as one unit of work. Commits on `Ok`, rolls back on `Err`.
    pub fn write<F, T>(&self, f: F) -> DatabaseResult<T>
    where
        F: FnOnce(&mut Session<'_>) -> DatabaseResult<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut session = Session::new(tx);

        match f(&mut session) {
            Ok(value) => {
                session.into_transaction().commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = session.into_transaction().rollback() {
                    warn!("Rollback failed after {}: {}", err, rollback_err);
                }
                Err(err)
            }
        }
    }

    /// Runs `f` against a consistent snapshot. Nothing is ever committed.
    pub fn read<F, T>(&self, f: F) -> DatabaseResult<T>
    where
        F: FnOnce(&Session<'_>) -> DatabaseResult<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let session = Session::new(tx);
        f(&session)
    }

    /// Projects one realtime event in its own unit of work.
    pub fn apply_event(&self, event: &Event) -> DatabaseResult<()> {
        self.write(|session| session.save_event(event))
    }

    /// Projects a batch of events atomically: either all of them land or none.
    pub fn apply_events(&self, events: &[Event]) -> DatabaseResult<()> {
        self.write(|session| {
            for event in events {
                session.save_event(event)?;
            }
            Ok(())
        })
    }
}
