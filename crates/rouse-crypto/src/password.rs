use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::{self, SaltString, rand_core::OsRng},
};

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("password must not be empty")]
    EmptyInput,

    #[error("stored password hash is malformed")]
    MalformedHash,

    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// Hashing capability consumed by registration, login and password change.
pub trait PasswordService: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String, PasswordError>;

    /// `Ok(false)` on mismatch; `Err` only when `hash` cannot be parsed.
    fn verify(&self, plaintext: &str, hash: &str) -> Result<bool, PasswordError>;
}

/// Argon2id with a random salt per hash.
pub struct Argon2Passwords {
    argon2: Argon2<'static>,
}

impl Argon2Passwords {
    pub fn new(params: Params) -> Self {
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }

    /// Minimal cost parameters. Only for tests.
    pub fn insecure_fast() -> Self {
        let params = Params::new(Params::MIN_M_COST, 1, 1, None).unwrap_or_default();
        Self::new(params)
    }
}

impl Default for Argon2Passwords {
    fn default() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }
}

impl PasswordService for Argon2Passwords {
    fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        if plaintext.is_empty() {
            return Err(PasswordError::EmptyInput);
        }
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| PasswordError::Hashing(e.to_string()))?;
        Ok(hash.to_string())
    }

    fn verify(&self, plaintext: &str, hash: &str) -> Result<bool, PasswordError> {
        let parsed = PasswordHash::new(hash).map_err(|_| PasswordError::MalformedHash)?;
        match self.argon2.verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(PasswordError::Hashing(e.to_string())),
        }
    }
}
