//! Token codec: pairing codes, bearer tokens and secret hashing.
//!
//! Two formats are wire contracts that external bots parse or generate:
//!
//! - **Pairing code**: 6–8 uppercase ASCII letters (`[A-Z]{6,8}`). Letters only
//!   so the code can be dictated over voice or chat; 8 letters give 26^8
//!   (~2.09 × 10^11) combinations, far more than can be guessed within the
//!   one-hour validity window behind the registration rate limit.
//! - **Bearer token**: `wrbt_` followed by 32 lowercase hex characters
//!   (16 random bytes). The prefix lets malformed tokens be rejected without
//!   touching storage.
//!
//! Secrets are never persisted in recoverable form. Each token is stored twice:
//! once as a SHA-256 *lookup key* (deterministic, indexable) and once through
//! the configured [`HashingPolicy`] (salted, slow).

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::{Environment, HashingConfig, HashingMode};
use crate::error::WrbtError;

/// Prefix every bearer token starts with.
pub const API_KEY_PREFIX: &str = "wrbt_";
/// Number of hex characters after the prefix.
pub const API_KEY_HEX_LEN: usize = 32;
/// Shortest accepted pairing code.
pub const MIN_PAIRING_CODE_LEN: usize = 6;
/// Longest accepted pairing code (also the default).
pub const MAX_PAIRING_CODE_LEN: usize = 8;
/// Default lifetime of a pairing code, in seconds.
pub const DEFAULT_PAIRING_TTL_SECS: i64 = 3_600;

const ALPHABET: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const PLAINTEXT_PREFIX: &str = "plain$";

// ============================================================
// Errors
// ============================================================

/// Error returned by the token codec.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Pairing code length must be between 6 and 8 characters, got {0}")]
    InvalidCodeLength(usize),
    #[error("Invalid hashing parameters: {0}")]
    InvalidParams(String),
    #[error("Hashing failed: {0}")]
    Hash(String),
    #[error("Plaintext secret storage is only allowed in the development environment")]
    InsecurePolicy,
}

impl From<CryptoError> for WrbtError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidCodeLength(_) => WrbtError::Validation {
                message: err.to_string(),
            },
            other => WrbtError::Internal(anyhow::Error::new(other)),
        }
    }
}

// ============================================================
// Generation
// ============================================================

/// Generate an uppercase alphabetic pairing code of `length` letters.
pub fn generate_pairing_code(length: usize) -> Result<String, CryptoError> {
    if !(MIN_PAIRING_CODE_LEN..=MAX_PAIRING_CODE_LEN).contains(&length) {
        return Err(CryptoError::InvalidCodeLength(length));
    }

    let mut rng = rand::rng();
    Ok((0..length)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect())
}

/// Generate a bearer token: `wrbt_` + 32 lowercase hex characters.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; API_KEY_HEX_LEN / 2];
    rand::rng().fill(&mut bytes);
    format!("{API_KEY_PREFIX}{}", hex::encode(bytes))
}

/// Cheap shape check for a bearer token, done before any storage lookup.
pub fn is_well_formed_api_key(token: &str) -> bool {
    token
        .strip_prefix(API_KEY_PREFIX)
        .is_some_and(|hex| {
            hex.len() == API_KEY_HEX_LEN
                && hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        })
}

/// Check that a string has the pairing code shape (`[A-Z]{6,8}`).
pub fn is_well_formed_pairing_code(code: &str) -> bool {
    (MIN_PAIRING_CODE_LEN..=MAX_PAIRING_CODE_LEN).contains(&code.len())
        && code.bytes().all(|b| b.is_ascii_uppercase())
}

/// Deterministic index key for a bearer token (SHA-256, hex).
///
/// Lets the registry find the owning identity in one indexed lookup; the
/// policy hash is still verified afterwards.
pub fn token_lookup_key(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============================================================
// Expiry
// ============================================================

/// `now + ttl`.
pub fn compute_expiry(ttl: Duration) -> DateTime<Utc> {
    Utc::now() + ttl
}

/// A missing expiry counts as expired, and so does the exact expiry instant.
pub fn is_expired(expiry: Option<DateTime<Utc>>) -> bool {
    is_expired_at(expiry, Utc::now())
}

pub fn is_expired_at(expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match expiry {
        Some(at) => now >= at,
        None => true,
    }
}

// ============================================================
// Hashing policy
// ============================================================

/// How secrets are hashed at rest. Chosen once at startup and injected.
#[derive(Debug, Clone)]
pub enum HashingPolicy {
    /// Argon2id with tunable cost.
    Argon2 {
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    },
    /// Stores the secret verbatim. Development only.
    Plaintext,
}

impl HashingPolicy {
    /// Argon2id with the crate's default parameters.
    pub fn argon2_default() -> Self {
        Self::Argon2 {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }

    /// Build the policy from configuration, refusing plaintext outside development.
    pub fn from_config(cfg: &HashingConfig, environment: Environment) -> Result<Self, CryptoError> {
        match cfg.mode {
            HashingMode::Plaintext if environment != Environment::Development => {
                Err(CryptoError::InsecurePolicy)
            }
            HashingMode::Plaintext => {
                tracing::warn!("Bot tokens are stored in plaintext (development mode)");
                Ok(Self::Plaintext)
            }
            HashingMode::Argon2 => {
                let policy = Self::Argon2 {
                    memory_kib: cfg.argon2_memory_kib,
                    iterations: cfg.argon2_iterations,
                    parallelism: cfg.argon2_parallelism,
                };
                // Fail at startup rather than on the first approval
                policy.argon2()?;
                Ok(policy)
            }
        }
    }

    fn argon2(&self) -> Result<Argon2<'static>, CryptoError> {
        let (m, t, p) = match self {
            Self::Argon2 { memory_kib, iterations, parallelism } => {
                (*memory_kib, *iterations, *parallelism)
            }
            Self::Plaintext => (
                Params::DEFAULT_M_COST,
                Params::DEFAULT_T_COST,
                Params::DEFAULT_P_COST,
            ),
        };
        let params =
            Params::new(m, t, p, None).map_err(|e| CryptoError::InvalidParams(e.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// One-way hash of `secret` for storage.
    pub fn hash_secret(&self, secret: &str) -> Result<String, CryptoError> {
        match self {
            Self::Plaintext => Ok(format!("{PLAINTEXT_PREFIX}{secret}")),
            Self::Argon2 { .. } => {
                let salt = SaltString::generate(&mut OsRng);
                let hash = self
                    .argon2()?
                    .hash_password(secret.as_bytes(), &salt)
                    .map_err(|e| CryptoError::Hash(e.to_string()))?;
                Ok(hash.to_string())
            }
        }
    }

    /// Verify `secret` against a stored hash.
    ///
    /// Argon2 hashes are always verified, whatever the active policy, so a
    /// development database can be promoted. Plaintext hashes only verify while
    /// the plaintext policy is active.
    pub fn verify_secret(&self, secret: &str, stored: &str) -> bool {
        if let Some(plain) = stored.strip_prefix(PLAINTEXT_PREFIX) {
            return matches!(self, Self::Plaintext)
                && bool::from(plain.as_bytes().ct_eq(secret.as_bytes()));
        }

        let Ok(parsed) = PasswordHash::new(stored) else {
            return false;
        };
        // Parameters come from the PHC string; the instance defaults don't matter here
        Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok()
    }
}
