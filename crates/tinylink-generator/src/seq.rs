use crate::Generator;
use std::sync::atomic::{AtomicU64, Ordering};
use tinylink_core::{GeneratorError, ShortCode};

/// A short code generator using a sequential counter.
///
/// This generator produces sequential codes like "tl000000", "tl000001", etc.
/// Codes are unique within a single instance without consulting storage.
///
/// For several processes sharing one store, each should use a unique prefix
/// (e.g., "a-000000", "b-000000").
#[derive(Debug)]
pub struct SeqGenerator {
    counter: AtomicU64,
    prefix: String,
}

impl SeqGenerator {
    /// Creates a new generator with a custom prefix, counting from zero.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self::with_offset(prefix, 0)
    }

    /// Creates a new generator starting from a specific counter value.
    ///
    /// Useful for resuming after a restart when the previous counter
    /// value is known.
    pub fn with_offset(prefix: impl Into<String>, offset: u64) -> Self {
        Self {
            counter: AtomicU64::new(offset),
            prefix: prefix.into(),
        }
    }
}

impl Generator for SeqGenerator {
    type Output = ShortCode;

    fn generate(&self) -> Result<Self::Output, GeneratorError> {
        let count = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(ShortCode::new_unchecked(format!("{}{:06}", self.prefix, count)))
    }
}
