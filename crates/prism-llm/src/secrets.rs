//! Secret store boundary.
//!
//! The database only ever holds a `secret_ref` naming where a key lives;
//! the raw key is fetched through this trait at dispatch time and handed
//! straight to the adapter. Embedding hosts plug in their platform keychain
//! behind this trait.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::provider::{AdapterError, Result};

/// Opaque keyed secret storage.
pub trait SecretStore: Send + Sync {
    /// Fetch a secret by reference. `Ok(None)` means the reference is
    /// dangling (e.g. the keychain entry was removed out of band).
    fn get_secret(&self, secret_ref: &str) -> Result<Option<Vec<u8>>>;

    /// Store a secret under a reference, overwriting any previous value.
    fn set_secret(&self, secret_ref: &str, value: &[u8]) -> Result<()>;

    /// Remove a secret. Removing an absent reference is not an error.
    fn delete_secret(&self, secret_ref: &str) -> Result<()>;
}

/// In-memory secret store for tests and ephemeral embedding hosts.
#[derive(Default)]
pub struct MemorySecretStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySecretStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|_| AdapterError::Secret("secret store lock poisoned".into()))
    }
}

impl SecretStore for MemorySecretStore {
    fn get_secret(&self, secret_ref: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.get(secret_ref).cloned())
    }

    fn set_secret(&self, secret_ref: &str, value: &[u8]) -> Result<()> {
        let _ = self.lock()?.insert(secret_ref.to_string(), value.to_vec());
        Ok(())
    }

    fn delete_secret(&self, secret_ref: &str) -> Result<()> {
        let _ = self.lock()?.remove(secret_ref);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
