use crate::error::ShortenerError;
use crate::repository::LinkStats;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

type Result<T> = std::result::Result<T, ShortenerError>;

/// Result of shortening a single URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shortened {
    /// A new short code was stored for the URL.
    Created(ShortCode),
    /// The URL was already shortened; this is its canonical short code.
    AlreadyExists(ShortCode),
}

impl Shortened {
    pub fn code(&self) -> &ShortCode {
        match self {
            Shortened::Created(code) | Shortened::AlreadyExists(code) => code,
        }
    }

    pub fn already_exists(&self) -> bool {
        matches!(self, Shortened::AlreadyExists(_))
    }
}

/// One entry of a batch shorten request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    /// Caller-chosen identifier echoed back in the response.
    pub correlation_id: String,
    /// The URL to shorten.
    pub target: String,
}

/// One entry of a batch shorten response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchShortened {
    pub correlation_id: String,
    pub code: ShortCode,
}

/// A live link as listed for its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedLink {
    pub code: ShortCode,
    pub target: String,
}

#[async_trait]
pub trait Shortener: Send + Sync + 'static {
    /// Creates a shortened URL owned by `owner`.
    async fn shorten(&self, target: &str, owner: &Uuid) -> Result<Shortened>;

    /// Resolves a short code to its original URL.
    ///
    /// Fails with `NotFound` for unknown codes and `Gone` for deleted ones.
    async fn resolve(&self, code: &str) -> Result<String>;

    /// Shortens every item, preserving input order in the output.
    async fn batch_shorten(
        &self,
        items: Vec<BatchItem>,
        owner: &Uuid,
    ) -> Result<Vec<BatchShortened>>;

    /// Lists the live links created by `owner`.
    async fn list_owned(&self, owner: &Uuid) -> Result<Vec<OwnedLink>>;

    /// Deletes the given codes where they belong to `owner`.
    /// Returns how many links were deleted.
    async fn remove(&self, codes: &[String], owner: &Uuid) -> Result<u64>;

    /// Reports whether the storage backend is reachable.
    async fn status(&self) -> Result<bool>;

    /// Counts live links and the distinct owners holding them.
    async fn stats(&self) -> Result<LinkStats>;
}
