use crate::Generator;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::TryRngCore;
use tinylink_core::{GeneratorError, ShortCode};

/// Number of random bytes behind each code. Six bytes encode to exactly
/// eight base64 characters, with no padding.
pub const RANDOM_BYTES: usize = 6;

/// Generates short codes from the operating system's secure random source.
///
/// Each code is [`RANDOM_BYTES`] random bytes encoded as URL-safe base64
/// without padding, i.e. 8 characters from `[A-Za-z0-9_-]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomGenerator;

impl RandomGenerator {
    pub fn new() -> Self {
        Self
    }

    fn encode(bytes: [u8; RANDOM_BYTES]) -> ShortCode {
        ShortCode::new_unchecked(URL_SAFE_NO_PAD.encode(bytes))
    }
}

impl Generator for RandomGenerator {
    type Output = ShortCode;

    fn generate(&self) -> Result<Self::Output, GeneratorError> {
        let mut bytes = [0u8; RANDOM_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| GeneratorError::EntropyUnavailable(e.to_string()))?;
        Ok(Self::encode(bytes))
    }
}
