use anyhow::Result;
use async_trait::async_trait;

/// Holds the model API key. Read on every request so a key saved mid-session
/// takes effect on the next turn.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self) -> Result<Option<String>>;

    async fn set(&self, value: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}
