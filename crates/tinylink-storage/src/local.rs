use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use tinylink_core::error::StorageError;
use tinylink_core::repository::{
    CreateOutcome, Link, LinkStats, ReadRepository, Repository, Result,
};
use tinylink_core::shortcode::ShortCode;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use uuid::Uuid;

type Links = HashMap<ShortCode, Link>;

/// In-process implementation of the repository contract.
///
/// All links live in a single map behind one reader/writer lock. When a file
/// path is configured every mutation rewrites the whole file, as a JSON array
/// of links, before the mutation becomes visible: the change is applied to a
/// staged copy of the map, the copy is written to a sibling file which is then
/// renamed over the store file, and only then does the staged copy replace the
/// live map. A failed (or cancelled) write leaves the live map untouched.
///
/// A store file must not be opened by two instances at the same time.
#[derive(Debug, Default)]
pub struct LocalRepository {
    links: RwLock<Links>,
    path: Option<PathBuf>,
}

impl LocalRepository {
    /// Creates a purely in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a repository persisted at `path`.
    ///
    /// An existing file is loaded in full; a missing one is created empty.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let links = load(&path).await?;

        Ok(Self {
            links: RwLock::new(links),
            path: Some(path),
        })
    }

    /// Returns the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Applies `mutate` to `links`, persisting the result first when the
    /// repository is file-backed.
    async fn apply<F>(&self, links: &mut Links, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Links) + Send,
    {
        let Some(path) = &self.path else {
            mutate(links);
            return Ok(());
        };

        let mut staged = links.clone();
        mutate(&mut staged);
        persist(path, &staged).await?;
        *links = staged;
        Ok(())
    }
}

fn io_error(path: &Path, err: io::Error) -> StorageError {
    StorageError::Unavailable(format!("{}: {err}", path.display()))
}

async fn load(path: &Path) -> Result<Links> {
    match tokio::fs::read(path).await {
        Ok(bytes) => decode(path, &bytes),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tokio::fs::File::create(path)
                .await
                .map_err(|e| io_error(path, e))?;
            Ok(Links::new())
        }
        Err(err) => Err(io_error(path, err)),
    }
}

fn decode(path: &Path, bytes: &[u8]) -> Result<Links> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Links::new());
    }

    let records: Vec<Link> = serde_json::from_slice(bytes).map_err(|e| {
        StorageError::InvalidData(format!("cannot parse {}: {e}", path.display()))
    })?;

    Ok(records
        .into_iter()
        .map(|link| (link.id.clone(), link))
        .collect())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

async fn persist(path: &Path, links: &Links) -> Result<()> {
    let mut records: Vec<&Link> = links.values().collect();
    records.sort_by(|a, b| a.id.cmp(&b.id));

    let bytes = serde_json::to_vec_pretty(&records)
        .map_err(|e| StorageError::InvalidData(format!("cannot encode links: {e}")))?;

    let staging = staging_path(path);
    let mut file = tokio::fs::File::create(&staging)
        .await
        .map_err(|e| io_error(&staging, e))?;
    file.write_all(&bytes)
        .await
        .map_err(|e| io_error(&staging, e))?;
    file.sync_all().await.map_err(|e| io_error(&staging, e))?;
    drop(file);

    tokio::fs::rename(&staging, path)
        .await
        .map_err(|e| io_error(path, e))
}

#[async_trait]
impl ReadRepository for LocalRepository {
    async fn find_link(&self, code: &ShortCode) -> Result<Option<Link>> {
        Ok(self.links.read().await.get(code).cloned())
    }

    async fn find_user_links(&self, owner: &Uuid) -> Result<Vec<Link>> {
        let links = self.links.read().await;

        let mut owned: Vec<Link> = links
            .values()
            .filter(|link| link.owner == *owner && !link.deleted)
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(owned)
    }

    async fn status(&self) -> Result<bool> {
        Ok(true)
    }

    async fn stats(&self) -> Result<LinkStats> {
        let links = self.links.read().await;

        let live = links.values().filter(|link| !link.deleted);
        let mut owners = HashSet::new();
        let mut count = 0u64;
        for link in live {
            count += 1;
            owners.insert(link.owner);
        }

        Ok(LinkStats {
            links: count,
            owners: owners.len() as u64,
        })
    }
}

#[async_trait]
impl Repository for LocalRepository {
    async fn create_link(
        &self,
        code: &ShortCode,
        target: &str,
        owner: &Uuid,
    ) -> Result<CreateOutcome> {
        let mut links = self.links.write().await;

        // A batch may have left several live links on one target; the
        // smallest code is canonical.
        if let Some(existing) = links
            .values()
            .filter(|link| !link.deleted && link.target == target)
            .min_by(|a, b| a.id.cmp(&b.id))
        {
            return Ok(CreateOutcome::AlreadyExists(existing.clone()));
        }

        if links.contains_key(code) {
            return Err(StorageError::Conflict(code.to_string()));
        }

        let link = Link::new(code.clone(), target, *owner);
        let stored = link.clone();
        self.apply(&mut links, move |links| {
            links.insert(stored.id.clone(), stored);
        })
        .await?;

        Ok(CreateOutcome::Created(link))
    }

    async fn batch_create(&self, batch: Vec<Link>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut links = self.links.write().await;

        {
            let mut seen = HashSet::with_capacity(batch.len());
            for link in &batch {
                if links.contains_key(&link.id) || !seen.insert(&link.id) {
                    return Err(StorageError::Conflict(link.id.to_string()));
                }
            }
        }

        self.apply(&mut links, move |links| {
            links.extend(batch.into_iter().map(|link| (link.id.clone(), link)));
        })
        .await
    }

    async fn mark_deleted(&self, codes: &[ShortCode], owner: &Uuid) -> Result<u64> {
        let mut links = self.links.write().await;

        let matched: HashSet<ShortCode> = codes
            .iter()
            .filter(|code| {
                links
                    .get(*code)
                    .is_some_and(|link| link.owner == *owner && !link.deleted)
            })
            .cloned()
            .collect();

        if matched.is_empty() {
            return Ok(0);
        }

        let count = matched.len() as u64;
        self.apply(&mut links, move |links| {
            for code in &matched {
                if let Some(link) = links.get_mut(code) {
                    link.deleted = true;
                }
            }
        })
        .await?;

        Ok(count)
    }

    async fn close(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let links = self.links.read().await;
        persist(path, &links).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn code(s: &str) -> ShortCode {
        ShortCode::new_unchecked(s)
    }

    /// A file-backed repository inside its own directory, so tests can
    /// pull the directory out from under it to make writes fail.
    async fn file_repo() -> (TempDir, PathBuf, LocalRepository) {
        let dir = tempfile::tempdir().unwrap();
        let store_dir = dir.path().join("store");
        std::fs::create_dir(&store_dir).unwrap();
        let path = store_dir.join("links.json");
        let repo = LocalRepository::open(&path).await.unwrap();
        (dir, path, repo)
    }

    #[tokio::test]
    async fn create_and_find() {
        let repo = LocalRepository::new();
        let owner = Uuid::new_v4();

        let outcome = repo
            .create_link(&code("abc123"), "https://example.com", &owner)
            .await
            .unwrap();
        assert!(matches!(outcome, CreateOutcome::Created(_)));

        let link = repo.find_link(&code("abc123")).await.unwrap().unwrap();
        assert_eq!(link.target, "https://example.com");
        assert_eq!(link.owner, owner);
        assert!(!link.deleted);
    }

    #[tokio::test]
    async fn duplicate_target_after_batch_resolves_to_smallest_code() {
        let repo = LocalRepository::new();
        let owner = Uuid::new_v4();

        repo.batch_create(vec![
            Link::new(code("zzz999"), "https://dup.example", owner),
            Link::new(code("mmm555"), "https://dup.example", owner),
            Link::new(code("aaa111"), "https://dup.example", owner),
        ])
        .await
        .unwrap();

        for fresh in ["new001", "new002", "new003"] {
            let outcome = repo
                .create_link(&code(fresh), "https://dup.example", &owner)
                .await
                .unwrap();
            assert_eq!(outcome.link().id, code("aaa111"));
            assert!(matches!(outcome, CreateOutcome::AlreadyExists(_)));
        }

        repo.mark_deleted(&[code("aaa111")], &owner).await.unwrap();
        let outcome = repo
            .create_link(&code("new004"), "https://dup.example", &owner)
            .await
            .unwrap();
        assert_eq!(outcome.into_link().id, code("mmm555"));
    }

    #[tokio::test]
    async fn find_nonexistent() {
        let repo = LocalRepository::new();
        assert!(repo.find_link(&code("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_target_returns_existing_link() {
        let repo = LocalRepository::new();
        let first_owner = Uuid::new_v4();
        let second_owner = Uuid::new_v4();

        repo.create_link(&code("first1"), "https://example.com", &first_owner)
            .await
            .unwrap();
        let outcome = repo
            .create_link(&code("second"), "https://example.com", &second_owner)
            .await
            .unwrap();

        // The first owner keeps the link; the second request is a no-op.
        let CreateOutcome::AlreadyExists(existing) = outcome else {
            panic!("expected AlreadyExists, got {outcome:?}");
        };
        assert_eq!(existing.id, code("first1"));
        assert_eq!(existing.owner, first_owner);
        assert!(repo.find_link(&code("second")).await.unwrap().is_none());
        assert!(repo.find_user_links(&second_owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleted_target_can_be_shortened_again() {
        let repo = LocalRepository::new();
        let owner = Uuid::new_v4();

        repo.create_link(&code("old000"), "https://example.com", &owner)
            .await
            .unwrap();
        repo.mark_deleted(&[code("old000")], &owner).await.unwrap();

        let outcome = repo
            .create_link(&code("new000"), "https://example.com", &owner)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CreateOutcome::Created(Link::new(code("new000"), "https://example.com", owner))
        );
    }

    #[tokio::test]
    async fn token_collision_is_a_conflict() {
        let repo = LocalRepository::new();
        let owner = Uuid::new_v4();

        repo.create_link(&code("abc123"), "https://one.example", &owner)
            .await
            .unwrap();
        let err = repo
            .create_link(&code("abc123"), "https://two.example", &owner)
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Conflict(_)));
        let link = repo.find_link(&code("abc123")).await.unwrap().unwrap();
        assert_eq!(link.target, "https://one.example");
    }

    #[tokio::test]
    async fn deleted_codes_are_never_reused() {
        let repo = LocalRepository::new();
        let owner = Uuid::new_v4();

        repo.create_link(&code("abc123"), "https://one.example", &owner)
            .await
            .unwrap();
        repo.mark_deleted(&[code("abc123")], &owner).await.unwrap();

        let err = repo
            .create_link(&code("abc123"), "https://two.example", &owner)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[tokio::test]
    async fn user_links_exclude_other_owners_and_deleted() {
        let repo = LocalRepository::new();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();

        repo.create_link(&code("ccc"), "https://c.example", &owner)
            .await
            .unwrap();
        repo.create_link(&code("aaa"), "https://a.example", &owner)
            .await
            .unwrap();
        repo.create_link(&code("bbb"), "https://b.example", &owner)
            .await
            .unwrap();
        repo.create_link(&code("zzz"), "https://z.example", &other)
            .await
            .unwrap();
        repo.mark_deleted(&[code("bbb")], &owner).await.unwrap();

        let ids: Vec<_> = repo
            .find_user_links(&owner)
            .await
            .unwrap()
            .into_iter()
            .map(|link| link.id)
            .collect();
        assert_eq!(ids, vec![code("aaa"), code("ccc")]);
    }

    #[tokio::test]
    async fn mark_deleted_only_touches_owned_live_links() {
        let repo = LocalRepository::new();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();

        repo.create_link(&code("mine01"), "https://a.example", &owner)
            .await
            .unwrap();
        repo.create_link(&code("theirs"), "https://b.example", &other)
            .await
            .unwrap();

        let count = repo
            .mark_deleted(
                &[code("mine01"), code("mine01"), code("theirs"), code("nope00")],
                &owner,
            )
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert!(repo.find_link(&code("mine01")).await.unwrap().unwrap().deleted);
        assert!(!repo.find_link(&code("theirs")).await.unwrap().unwrap().deleted);

        // Already deleted: nothing left to change.
        assert_eq!(repo.mark_deleted(&[code("mine01")], &owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn batch_create_inserts_everything() {
        let repo = LocalRepository::new();
        let owner = Uuid::new_v4();

        repo.batch_create(vec![
            Link::new(code("b00001"), "https://a.example", owner),
            Link::new(code("b00002"), "https://a.example", owner),
        ])
        .await
        .unwrap();

        assert_eq!(repo.find_user_links(&owner).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn batch_create_with_taken_code_inserts_nothing() {
        let repo = LocalRepository::new();
        let owner = Uuid::new_v4();

        repo.create_link(&code("taken1"), "https://a.example", &owner)
            .await
            .unwrap();

        let err = repo
            .batch_create(vec![
                Link::new(code("fresh1"), "https://b.example", owner),
                Link::new(code("taken1"), "https://c.example", owner),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
        assert!(repo.find_link(&code("fresh1")).await.unwrap().is_none());

        let err = repo
            .batch_create(vec![
                Link::new(code("twice1"), "https://d.example", owner),
                Link::new(code("twice1"), "https://e.example", owner),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
        assert!(repo.find_link(&code("twice1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stats_count_live_links_and_owners() {
        let repo = LocalRepository::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        repo.create_link(&code("a00001"), "https://1.example", &a)
            .await
            .unwrap();
        repo.create_link(&code("a00002"), "https://2.example", &a)
            .await
            .unwrap();
        repo.create_link(&code("b00001"), "https://3.example", &b)
            .await
            .unwrap();
        repo.mark_deleted(&[code("b00001")], &b).await.unwrap();

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats, LinkStats { links: 2, owners: 1 });
        assert!(repo.status().await.unwrap());
    }

    #[tokio::test]
    async fn open_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.json");

        let repo = LocalRepository::open(&path).await.unwrap();

        assert!(path.exists());
        assert_eq!(repo.stats().await.unwrap(), LinkStats::default());
    }

    #[tokio::test]
    async fn open_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = LocalRepository::open(&path).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidData(_)));
    }

    #[tokio::test]
    async fn writes_survive_reopen() {
        let (_dir, path, repo) = file_repo().await;
        let owner = Uuid::new_v4();

        repo.create_link(&code("keep01"), "https://a.example", &owner)
            .await
            .unwrap();
        repo.batch_create(vec![Link::new(code("keep02"), "https://b.example", owner)])
            .await
            .unwrap();
        repo.mark_deleted(&[code("keep01")], &owner).await.unwrap();
        drop(repo);

        let reopened = LocalRepository::open(&path).await.unwrap();
        assert!(reopened.find_link(&code("keep01")).await.unwrap().unwrap().deleted);
        assert_eq!(
            reopened.find_link(&code("keep02")).await.unwrap().unwrap().target,
            "https://b.example"
        );
    }

    #[tokio::test]
    async fn file_is_a_json_array_of_links() {
        let (_dir, path, repo) = file_repo().await;
        let owner = Uuid::new_v4();

        repo.create_link(&code("abc123"), "https://example.com", &owner)
            .await
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(
            raw,
            serde_json::json!([{
                "id": "abc123",
                "target": "https://example.com",
                "owner": owner.to_string(),
                "deleted": false,
            }])
        );
    }

    #[tokio::test]
    async fn failed_write_rolls_back_create() {
        let (dir, _path, repo) = file_repo().await;
        let owner = Uuid::new_v4();
        std::fs::remove_dir_all(dir.path().join("store")).unwrap();

        let err = repo
            .create_link(&code("lost01"), "https://example.com", &owner)
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Unavailable(_)));
        assert!(repo.find_link(&code("lost01")).await.unwrap().is_none());
        assert_eq!(repo.stats().await.unwrap(), LinkStats::default());
    }

    #[tokio::test]
    async fn failed_write_rolls_back_batch_and_delete() {
        let (dir, _path, repo) = file_repo().await;
        let owner = Uuid::new_v4();

        repo.create_link(&code("live01"), "https://a.example", &owner)
            .await
            .unwrap();
        std::fs::remove_dir_all(dir.path().join("store")).unwrap();

        let err = repo
            .batch_create(vec![
                Link::new(code("lost01"), "https://b.example", owner),
                Link::new(code("lost02"), "https://c.example", owner),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
        assert!(repo.find_link(&code("lost01")).await.unwrap().is_none());
        assert!(repo.find_link(&code("lost02")).await.unwrap().is_none());

        let err = repo
            .mark_deleted(&[code("live01")], &owner)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
        assert!(!repo.find_link(&code("live01")).await.unwrap().unwrap().deleted);
    }

    #[tokio::test]
    async fn close_flushes_to_file() {
        let (_dir, path, repo) = file_repo().await;
        let owner = Uuid::new_v4();

        repo.create_link(&code("abc123"), "https://example.com", &owner)
            .await
            .unwrap();
        std::fs::write(&path, "").unwrap();

        repo.close().await.unwrap();

        let reopened = LocalRepository::open(&path).await.unwrap();
        assert!(reopened.find_link(&code("abc123")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn concurrent_access() {
        let (_dir, path, repo) = file_repo().await;
        let repo = Arc::new(repo);
        let owner = Uuid::new_v4();
        let mut handles = vec![];

        for i in 0..10u64 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                let c = ShortCode::new_unchecked(format!("code-{:03}", i));
                repo.create_link(&c, &format!("https://example{}.com", i), &owner)
                    .await
                    .unwrap();
            }));
        }

        for i in 0..10u64 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                let c = ShortCode::new_unchecked(format!("code-{:03}", i));
                let _ = repo.find_link(&c).await.unwrap();
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(repo.find_user_links(&owner).await.unwrap().len(), 10);
        let reopened = LocalRepository::open(&path).await.unwrap();
        assert_eq!(reopened.stats().await.unwrap().links, 10);
    }
}
