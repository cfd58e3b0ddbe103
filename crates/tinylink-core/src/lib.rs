//! Core types and traits for the tinylink URL shortener.
//!
//! This crate holds the link model, the repository contract implemented by
//! every storage backend and the shortener contract consumed by transports.

pub mod error;
pub mod repository;
pub mod shortcode;
pub mod shortener;

pub use error::{GeneratorError, ShortenerError, StorageError};
pub use repository::{CreateOutcome, Link, LinkStats, ReadRepository, Repository};
pub use shortcode::ShortCode;
pub use shortener::{BatchItem, BatchShortened, OwnedLink, Shortened, Shortener};
