use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        Error as PasswordHashError, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
};
use thiserror::Error;
use zeroize::Zeroizing;

/// Argon2id password hashing for stored user credentials.
#[derive(Debug, Clone)]
pub struct PasswordCrypto {
    argon2: Argon2<'static>,
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid Argon2 parameters: {0}")]
    InvalidParams(String),
    #[error("password hashing error: {0}")]
    PasswordHash(String),
}

impl From<PasswordHashError> for CryptoError {
    fn from(err: PasswordHashError) -> Self {
        CryptoError::PasswordHash(err.to_string())
    }
}

impl Default for PasswordCrypto {
    fn default() -> Self {
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::default(), Params::default()),
        }
    }
}

impl PasswordCrypto {
    pub const SALT_LENGTH: usize = 16;

    /// Build a helper with caller-specified cost parameters (integration
    /// tests use cheap ones).
    pub fn with_params(m_cost: u32, t_cost: u32, p_cost: u32) -> Result<Self, CryptoError> {
        let params = Params::new(m_cost, t_cost, p_cost, None)
            .map_err(|err| CryptoError::InvalidParams(err.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::default(), params),
        })
    }

    /// Hash a password with a random salt. The PHC string is what gets stored.
    pub fn hash_password(&self, password: &str) -> Result<String, CryptoError> {
        let material = Zeroizing::new(password.as_bytes().to_vec());

        let salt_bytes: [u8; Self::SALT_LENGTH] = rand::random();
        let salt = SaltString::encode_b64(&salt_bytes)?;
        let hash = self.argon2.hash_password(&material, &salt)?.to_string();
        Ok(hash)
    }

    pub fn verify_password(&self, password: &str, password_hash: &str) -> Result<bool, CryptoError> {
        let parsed = PasswordHash::new(password_hash)?;
        Ok(self
            .argon2
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crypto() -> PasswordCrypto {
        PasswordCrypto::with_params(1024, 1, 1).unwrap()
    }

    #[test]
    fn hash_then_verify() {
        let crypto = crypto();
        let hash = crypto.hash_password("hunter22").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(crypto.verify_password("hunter22", &hash).unwrap());
        assert!(!crypto.verify_password("hunter23", &hash).unwrap());
    }

    #[test]
    fn salts_differ() {
        let crypto = crypto();
        assert_ne!(
            crypto.hash_password("same").unwrap(),
            crypto.hash_password("same").unwrap()
        );
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(crypto().verify_password("x", "not-a-phc-string").is_err());
    }
}
