//! Salted one-way hashing for passwords and refresh tokens (bcrypt)

/// Hashing errors
#[derive(Debug, thiserror::Error)]
#[error("Credential hashing failed: {0}")]
pub struct HashingError(#[from] bcrypt::BcryptError);

/// bcrypt hasher with a fixed cost
#[derive(Debug, Clone, Copy)]
pub struct CredentialHasher {
    cost: u32,
}

impl CredentialHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash with a fresh random salt
    pub fn hash(&self, plain: &str) -> Result<String, HashingError> {
        Ok(bcrypt::hash(plain, self.cost)?)
    }

    /// Verify `plain` against a digest produced by `hash`
    pub fn verify(&self, plain: &str, digest: &str) -> Result<bool, HashingError> {
        Ok(bcrypt::verify(plain, digest)?)
    }
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}
