use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;

use super::Element;
use super::SceneUpdate;
use super::ViewState;

/// The drawing surface the assistant works against.
#[async_trait]
pub trait Canvas: Send + Sync {
    /// Current scene elements, or `None` until the canvas has initialized.
    fn scene_elements(&self) -> Option<Vec<Element>>;

    fn app_state(&self) -> Option<ViewState>;

    /// Replaces elements and merges the view state, whichever are set.
    async fn update_scene(&self, update: SceneUpdate) -> Result<()>;

    /// Revision counter bumped on every change to the scene.
    fn subscribe(&self) -> watch::Receiver<u64>;

    /// Re-reads the scene from its source, if it has one.
    async fn reload(&self) -> Result<()> {
        return Ok(());
    }
}
