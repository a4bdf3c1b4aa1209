//! Per-instance secrets generated while creating instances.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rand::Rng;
use rand::distributions::Alphanumeric;

const SECRET_LEN: usize = 24;

/// Secrets keyed by instance name, owned by one group.
#[derive(Debug, Default)]
pub struct CredentialStore {
    secrets: Mutex<HashMap<String, String>>,
}

impl CredentialStore {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.secrets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `secret` for `instance`, replacing any previous one.
    pub fn insert(&self, instance: impl Into<String>, secret: impl Into<String>) {
        self.lock().insert(instance.into(), secret.into());
    }

    /// Returns the secret stored for `instance`.
    #[must_use]
    pub fn get(&self, instance: &str) -> Option<String> {
        self.lock().get(instance).cloned()
    }

    /// Removes and returns the secret stored for `instance`.
    pub fn evict(&self, instance: &str) -> Option<String> {
        self.lock().remove(instance)
    }

    /// Number of stored secrets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no secret is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Generates a random alphanumeric secret.
#[must_use]
pub fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect()
}
