//! Password storage and login sessions.
use std::time::{Duration, Instant};

use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use dashmap::DashMap;
use log::error;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

use crate::ledger::{LedgerError, UserId};

// Limits the buffer handed to the KDF, this is not a strength policy.
pub const MAX_PASSWORD_LENGTH: usize = 512;

pub const TOKEN_LENGTH: usize = 32;

/// Sessions left without a logout are dropped after a day.
pub const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub type Token = String;

/// Hashes a new password with Argon2id into a PHC string.
pub fn hash_password(password: &str) -> Result<String, LedgerError> {
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(LedgerError::Hashing);
    }

    let salt = SaltString::generate(&mut thread_rng());
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("AUTH: failed to hash password: {e}");
            LedgerError::Hashing
        })
}

/// Checks a password against a stored PHC string. A wrong password is `Ok(false)`, a stored hash
/// that cannot be parsed is an error.
pub fn verify_password(password: &str, hashed: &str) -> Result<bool, LedgerError> {
    if password.len() > MAX_PASSWORD_LENGTH {
        return Ok(false);
    }

    let parsed = PasswordHash::new(hashed).map_err(|e| {
        error!("AUTH: stored password hash is invalid: {e}");
        LedgerError::Hashing
    })?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => {
            error!("AUTH: failed to verify password: {e}");
            Err(LedgerError::Hashing)
        }
    }
}

/// Bearer tokens for logged in users.
///
/// Sessions only live as long as the process, restarting the server logs everyone out. A token
/// expires [SESSION_TTL] after it was issued, expired tokens are swept whenever a new one is
/// created.
#[derive(Debug)]
pub struct Sessions {
    ttl: Duration,
    inner: DashMap<Token, (UserId, Instant)>,
}

impl Default for Sessions {
    fn default() -> Self {
        Self::with_ttl(SESSION_TTL)
    }
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: DashMap::new(),
        }
    }

    pub fn create(&self, user_id: UserId) -> Token {
        self.sweep();

        let token: Token = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect();
        self.inner.insert(token.clone(), (user_id, Instant::now()));
        token
    }

    pub fn get(&self, token: &str) -> Option<UserId> {
        let (user_id, issued) = *self.inner.get(token)?.value();
        if issued.elapsed() >= self.ttl {
            self.inner.remove(token);
            return None;
        }
        Some(user_id)
    }

    pub fn clear(&self, token: &str) {
        self.inner.remove(token);
    }

    fn sweep(&self) {
        let ttl = self.ttl;
        self.inner.retain(|_, (_, issued)| issued.elapsed() < ttl);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
