use std::sync::PoisonError;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::models::CredentialStore;

/// Keeps the credential for the lifetime of the process only.
#[derive(Default)]
pub struct MemoryCredentialStore {
    value: RwLock<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new(value: &str) -> MemoryCredentialStore {
        return MemoryCredentialStore {
            value: RwLock::new(Some(value.to_string())),
        };
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    #[allow(clippy::implicit_return)]
    async fn get(&self) -> Result<Option<String>> {
        return Ok(self
            .value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone());
    }

    #[allow(clippy::implicit_return)]
    async fn set(&self, value: &str) -> Result<()> {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = Some(value.to_string());
        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn clear(&self) -> Result<()> {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = None;
        return Ok(());
    }
}
