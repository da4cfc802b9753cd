//! SQLite storage layer for stixgraph.
//!
//! Provides the persistence and index adapter behind the domain layer.
//!
//! # Architecture
//!
//! - [`EntityStore`] keeps entities and the relations between them, and answers
//!   filtered listings, counts, time series and relation distributions
//! - [`FileStore`] keeps imported/exported artifacts with their content
//! - [`JobStore`] keeps export jobs and enforces their status transitions
//!
//! Every store owns one connection behind a mutex. Stores may share a database
//! file; their tables are disjoint.

mod codec;
mod entity_store;
mod error;
mod file_store;
mod job_store;

pub use entity_store::EntityStore;
pub use error::{StorageError, StorageResult};
pub use file_store::FileStore;
pub use job_store::JobStore;

use rusqlite::Connection;

/// Database path meaning "private in-memory database".
pub const IN_MEMORY: &str = ":memory:";

/// Open a SQLite connection for `path`, or an in-memory one for [`IN_MEMORY`].
pub fn open_connection(path: &str) -> StorageResult<Connection> {
    let conn = if path == IN_MEMORY {
        Connection::open_in_memory()?
    } else {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        conn
    };
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(conn)
}
