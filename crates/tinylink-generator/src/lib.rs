pub mod random;
pub mod seq;

pub use random::RandomGenerator;
pub use seq::SeqGenerator;

use tinylink_core::{GeneratorError, ShortCode};

/// Trait for generating short codes.
///
/// Implementations are pure generators that don't interact with storage.
/// Uniqueness is enforced by the repository, so a generator only has to make
/// collisions unlikely.
pub trait Generator: Send + Sync + 'static {
    type Output: Into<ShortCode>;

    /// Generates a value that can be converted into a short code.
    ///
    /// Fails only when the generator cannot produce output at all, e.g. the
    /// system random source is unavailable.
    fn generate(&self) -> Result<Self::Output, GeneratorError>;
}
