use crate::error::StorageError;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// A stored link.
///
/// This is also the on-disk record of the local store, so the field names
/// are part of its file format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// The short code, unique across live and deleted links.
    pub id: ShortCode,
    /// The original URL that was shortened.
    pub target: String,
    /// The user that created the link.
    pub owner: Uuid,
    /// Tombstone flag. Only ever goes from `false` to `true`.
    pub deleted: bool,
}

impl Link {
    /// Creates a live link.
    pub fn new(id: ShortCode, target: impl Into<String>, owner: Uuid) -> Self {
        Self {
            id,
            target: target.into(),
            owner,
            deleted: false,
        }
    }
}

/// Outcome of [`Repository::create_link`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// A new record was stored.
    Created(Link),
    /// A live record with the same target already existed. Nothing was
    /// written and the existing record is returned; its id may differ
    /// from the requested one.
    AlreadyExists(Link),
}

impl CreateOutcome {
    /// Returns the stored record, whichever way it came about.
    pub fn link(&self) -> &Link {
        match self {
            CreateOutcome::Created(link) | CreateOutcome::AlreadyExists(link) => link,
        }
    }

    pub fn into_link(self) -> Link {
        match self {
            CreateOutcome::Created(link) | CreateOutcome::AlreadyExists(link) => link,
        }
    }
}

/// Counts over live (non-deleted) links.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStats {
    pub links: u64,
    pub owners: u64,
}

/// A read-only view of a repository.
#[async_trait]
pub trait ReadRepository: Send + Sync + 'static {
    /// Retrieves the link for a given short code, deleted or not.
    /// Returns `None` if the code does not exist.
    async fn find_link(&self, code: &ShortCode) -> Result<Option<Link>>;

    /// Returns every live link created by `owner`, ordered by short code.
    async fn find_user_links(&self, owner: &Uuid) -> Result<Vec<Link>>;

    /// Reports whether the backend is reachable.
    async fn status(&self) -> Result<bool>;

    /// Counts live links and the distinct owners among them.
    async fn stats(&self) -> Result<LinkStats>;
}

#[async_trait]
pub trait Repository: ReadRepository {
    /// Inserts a new link unless a live link with the same target exists,
    /// in which case that link is returned as [`CreateOutcome::AlreadyExists`].
    ///
    /// Returns `Err(Conflict)` if the short code is already taken.
    async fn create_link(
        &self,
        code: &ShortCode,
        target: &str,
        owner: &Uuid,
    ) -> Result<CreateOutcome>;

    /// Inserts all links or none of them. Targets are not deduplicated.
    async fn batch_create(&self, links: Vec<Link>) -> Result<()>;

    /// Marks the given codes as deleted where they belong to `owner` and
    /// are still live. Returns how many links changed.
    async fn mark_deleted(&self, codes: &[ShortCode], owner: &Uuid) -> Result<u64>;

    /// Releases the backend. Further calls are not expected to succeed.
    async fn close(&self) -> Result<()>;
}
