use crate::normalize::Normalizer;
use async_trait::async_trait;
use std::sync::Arc;
use tinylink_core::{
    BatchItem, BatchShortened, CreateOutcome, Link, LinkStats, OwnedLink, Repository, ShortCode,
    Shortened, Shortener, ShortenerError,
};
use tinylink_generator::Generator;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A concrete implementation of the `Shortener` trait.
///
/// This service wraps a `Repository` and a `Generator` to handle:
/// - Short code generation
/// - Input normalization and URL validation
/// - Mapping repository outcomes to caller-facing results
///
/// Note: no collision retry is performed. A generated code that is already
/// taken surfaces as `TokenCollision`.
#[derive(Debug)]
pub struct ShortenerService<R, G> {
    repository: Arc<R>,
    generator: Arc<G>,
    normalizer: Arc<Normalizer>,
}

impl<R, G> Clone for ShortenerService<R, G> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            generator: Arc::clone(&self.generator),
            normalizer: Arc::clone(&self.normalizer),
        }
    }
}

impl<R: Repository, G: Generator> ShortenerService<R, G> {
    /// Creates a new `ShortenerService` that leaves input unnormalized.
    pub fn new(repository: R, generator: G) -> Self {
        Self::from_shared(Arc::new(repository), generator)
    }

    /// Creates a `ShortenerService` over a repository that is shared with
    /// other services.
    pub fn from_shared(repository: Arc<R>, generator: G) -> Self {
        Self {
            repository,
            generator: Arc::new(generator),
            normalizer: Arc::new(Normalizer::default()),
        }
    }

    /// Replaces the normalizer applied to inbound targets and codes.
    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = Arc::new(normalizer);
        self
    }

    /// Returns the underlying repository, e.g. to close it on shutdown.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Validates that the URL has a valid format (has a scheme and host).
    fn validate_url(url: &str) -> Result<(), ShortenerError> {
        if url.is_empty() {
            return Err(ShortenerError::InvalidArgument(
                "URL cannot be empty".to_string(),
            ));
        }

        // A valid URL should have "://" and something after it
        let Some((scheme, rest)) = url.split_once("://") else {
            return Err(ShortenerError::InvalidArgument(format!(
                "URL must have a valid scheme and host: {}",
                url
            )));
        };
        if scheme.is_empty() || rest.is_empty() {
            return Err(ShortenerError::InvalidArgument(format!(
                "URL must have a valid scheme and host: {}",
                url
            )));
        }

        let scheme = scheme.to_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(ShortenerError::InvalidArgument(format!(
                "URL scheme must be http or https: {}",
                scheme
            )));
        }

        Ok(())
    }

    fn prepare_target(&self, raw: &str) -> Result<String, ShortenerError> {
        let target = self.normalizer.normalize(raw);
        Self::validate_url(&target)?;
        Ok(target)
    }

    fn generate_code(&self) -> Result<ShortCode, ShortenerError> {
        let output = self
            .generator
            .generate()
            .inspect_err(|err| warn!(error = %err, "short code generation failed"))?;
        Ok(output.into())
    }
}

#[async_trait]
impl<R: Repository, G: Generator> Shortener for ShortenerService<R, G> {
    async fn shorten(&self, target: &str, owner: &Uuid) -> Result<Shortened, ShortenerError> {
        let target = self.prepare_target(target)?;
        let code = self.generate_code()?;

        let outcome = self
            .repository
            .create_link(&code, &target, owner)
            .await
            .inspect_err(|err| warn!(error = %err, code = %code, "failed to store link"))?;

        match outcome {
            CreateOutcome::Created(link) => {
                debug!(code = %link.id, owner = %owner, "created link");
                Ok(Shortened::Created(link.id))
            }
            CreateOutcome::AlreadyExists(link) => {
                debug!(code = %link.id, owner = %link.owner, "target already shortened");
                Ok(Shortened::AlreadyExists(link.id))
            }
        }
    }

    async fn resolve(&self, code: &str) -> Result<String, ShortenerError> {
        let code = ShortCode::new(self.normalizer.normalize(code))?;

        let link = self
            .repository
            .find_link(&code)
            .await?
            .ok_or_else(|| ShortenerError::NotFound(code.to_string()))?;

        if link.deleted {
            return Err(ShortenerError::Gone(code.to_string()));
        }

        Ok(link.target)
    }

    async fn batch_shorten(
        &self,
        items: Vec<BatchItem>,
        owner: &Uuid,
    ) -> Result<Vec<BatchShortened>, ShortenerError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let mut links = Vec::with_capacity(items.len());
        let mut shortened = Vec::with_capacity(items.len());

        for item in items {
            let target = self.prepare_target(&item.target).map_err(|err| match err {
                ShortenerError::InvalidArgument(message) => ShortenerError::InvalidArgument(
                    format!("item {}: {message}", item.correlation_id),
                ),
                other => other,
            })?;
            let code = self.generate_code()?;

            links.push(Link::new(code.clone(), target, *owner));
            shortened.push(BatchShortened {
                correlation_id: item.correlation_id,
                code,
            });
        }

        self.repository
            .batch_create(links)
            .await
            .inspect_err(|err| warn!(error = %err, owner = %owner, "failed to store batch"))?;

        info!(count = shortened.len(), owner = %owner, "shortened batch");
        Ok(shortened)
    }

    async fn list_owned(&self, owner: &Uuid) -> Result<Vec<OwnedLink>, ShortenerError> {
        let links = self.repository.find_user_links(owner).await?;

        Ok(links
            .into_iter()
            .map(|link| OwnedLink {
                code: link.id,
                target: link.target,
            })
            .collect())
    }

    async fn remove(&self, codes: &[String], owner: &Uuid) -> Result<u64, ShortenerError> {
        // A malformed code can't exist in storage, so it is skipped like an unknown one.
        let codes: Vec<ShortCode> = codes
            .iter()
            .filter_map(|code| ShortCode::new(self.normalizer.normalize(code)).ok())
            .collect();

        let count = self
            .repository
            .mark_deleted(&codes, owner)
            .await
            .inspect_err(|err| warn!(error = %err, owner = %owner, "failed to delete links"))?;

        info!(count, owner = %owner, "marked links as deleted");
        Ok(count)
    }

    async fn status(&self) -> Result<bool, ShortenerError> {
        Ok(self.repository.status().await?)
    }

    async fn stats(&self) -> Result<LinkStats, ShortenerError> {
        Ok(self.repository.stats().await?)
    }
}
