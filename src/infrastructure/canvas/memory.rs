#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;

use std::sync::PoisonError;
use std::sync::RwLock;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;

use crate::domain::models::Canvas;
use crate::domain::models::DiagramSnapshot;
use crate::domain::models::Element;
use crate::domain::models::SceneUpdate;
use crate::domain::models::ViewState;

/// Scene held in process. Starts uninitialized until a scene is loaded into
/// it, matching a drawing surface that has not mounted yet.
pub struct MemoryCanvas {
    scene: RwLock<Option<DiagramSnapshot>>,
    revision: watch::Sender<u64>,
}

impl Default for MemoryCanvas {
    fn default() -> MemoryCanvas {
        let (revision, _) = watch::channel(0);
        return MemoryCanvas {
            scene: RwLock::new(None),
            revision,
        };
    }
}

impl MemoryCanvas {
    pub fn with_scene(snapshot: DiagramSnapshot) -> MemoryCanvas {
        let canvas = MemoryCanvas::default();
        canvas.replace(Some(snapshot));

        return canvas;
    }

    /// Swaps the whole scene, as a user edit or a reload from disk would.
    pub fn replace(&self, snapshot: Option<DiagramSnapshot>) {
        *self.scene.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
        self.bump();
    }

    pub fn snapshot(&self) -> Option<DiagramSnapshot> {
        return self
            .scene
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| {
            *rev += 1;
        });
    }
}

#[async_trait]
impl Canvas for MemoryCanvas {
    fn scene_elements(&self) -> Option<Vec<Element>> {
        return self.snapshot().map(|scene| return scene.elements);
    }

    fn app_state(&self) -> Option<ViewState> {
        return self.snapshot().map(|scene| return scene.app_state);
    }

    #[allow(clippy::implicit_return)]
    async fn update_scene(&self, update: SceneUpdate) -> Result<()> {
        {
            let mut guard = self.scene.write().unwrap_or_else(PoisonError::into_inner);
            let Some(scene) = guard.as_mut() else {
                bail!("Canvas is not ready yet");
            };

            if let Some(elements) = update.elements {
                scene.elements = elements;
            }
            if let Some(app_state) = &update.app_state {
                scene.app_state.merge(app_state);
            }
        }

        self.bump();
        return Ok(());
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        return self.revision.subscribe();
    }
}
