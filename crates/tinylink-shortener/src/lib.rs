//! URL shortener service implementation.
//!
//! This crate provides [`ShortenerService`], the implementation of the
//! [`Shortener`] contract that transports call, and the input
//! [`Normalizer`] it applies. Core types are re-exported from `tinylink_core`.

pub mod normalize;
pub mod service;

pub use normalize::Normalizer;
pub use service::ShortenerService;
pub use tinylink_core::{BatchItem, BatchShortened, OwnedLink, Shortened, Shortener, ShortenerError};
