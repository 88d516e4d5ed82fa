#[cfg(test)]
#[path = "snapshot_test.rs"]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::domain::models::Canvas;
use crate::domain::models::DiagramSnapshot;

/// Reads the live canvas on demand. Nothing is cached, every call reflects
/// the most recently committed scene.
#[derive(Clone)]
pub struct SnapshotAccessor {
    canvas: Arc<dyn Canvas>,
}

impl SnapshotAccessor {
    pub fn new(canvas: Arc<dyn Canvas>) -> SnapshotAccessor {
        return SnapshotAccessor { canvas };
    }

    /// Returns `None` until the canvas has initialized.
    pub fn get_snapshot(&self) -> Option<DiagramSnapshot> {
        let elements = self.canvas.scene_elements()?;
        let app_state = self.canvas.app_state().unwrap_or_default();

        return Some(DiagramSnapshot {
            elements,
            app_state,
        });
    }

    fn serialized(&self) -> Option<String> {
        let snapshot = self.get_snapshot()?;
        match serde_json::to_string_pretty(&snapshot) {
            Ok(res) => return Some(res),
            Err(err) => {
                tracing::warn!(error = ?err, "Failed to serialize diagram snapshot");
                return None;
            }
        }
    }

    /// Republishes the serialized scene once the canvas has been quiet for
    /// `window`. Bursts of changes collapse into a single publish. The
    /// background task ends when every receiver is gone.
    pub fn publish_debounced(
        &self,
        window: Duration,
    ) -> (watch::Receiver<Option<String>>, JoinHandle<()>) {
        let mut changes = self.canvas.subscribe();
        let (tx, rx) = watch::channel(self.serialized());
        let accessor = self.clone();

        let worker = tokio::spawn(async move {
            loop {
                if changes.changed().await.is_err() {
                    return;
                }

                loop {
                    match tokio::time::timeout(window, changes.changed()).await {
                        Ok(Ok(())) => continue,
                        Ok(Err(_)) => return,
                        Err(_) => break,
                    }
                }

                tracing::debug!("Publishing diagram snapshot");
                if tx.send(accessor.serialized()).is_err() {
                    return;
                }
            }
        });

        return (rx, worker);
    }
}
