//! Storage backends for tinylink.
//!
//! [`LocalRepository`] keeps links in memory with optional write-through to a
//! JSON file; [`PostgresRepository`] stores them in PostgreSQL.

pub mod local;
pub mod postgres;

pub use local::LocalRepository;
pub use postgres::{PgPoolSettings, PostgresRepository};
pub use tinylink_core::repository::{CreateOutcome, Link, LinkStats, ReadRepository, Repository};
pub use tinylink_core::StorageError;
