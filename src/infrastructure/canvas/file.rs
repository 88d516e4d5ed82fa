#[cfg(test)]
#[path = "file_test.rs"]
mod tests;

use std::path;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use serde_json::Map;
use serde_json::Value;
use tokio::fs;
use tokio::sync::watch;
use tokio::sync::Mutex;

use super::MemoryCanvas;
use crate::domain::models::Canvas;
use crate::domain::models::DiagramSnapshot;
use crate::domain::models::Element;
use crate::domain::models::SceneUpdate;
use crate::domain::models::ViewState;

fn empty_document() -> Map<String, Value> {
    let doc = json!({
        "type": "excalidraw",
        "version": 2,
        "source": "excaligenius",
        "elements": [],
        "appState": {},
        "files": {}
    });

    match doc {
        Value::Object(map) => return map,
        _ => return Map::new(),
    }
}

fn parse_document(raw: &str) -> Result<(Map<String, Value>, DiagramSnapshot)> {
    let Value::Object(doc) = serde_json::from_str::<Value>(raw)? else {
        bail!("Scene file is not a JSON object");
    };

    let elements = match doc.get("elements") {
        Some(Value::Array(elements)) => elements.clone(),
        Some(_) => bail!("Scene file has an invalid 'elements' field"),
        None => vec![],
    };
    let app_state = match doc.get("appState") {
        Some(state) => serde_json::from_value::<ViewState>(state.clone())?,
        None => ViewState::default(),
    };

    return Ok((
        doc,
        DiagramSnapshot {
            elements,
            app_state,
        },
    ));
}

/// Scene backed by an `.excalidraw` file. Changes made by the assistant are
/// written back; fields the assistant does not manage are kept as they were.
pub struct FileCanvas {
    path: path::PathBuf,
    document: Mutex<Map<String, Value>>,
    scene: MemoryCanvas,
}

impl FileCanvas {
    /// Opens the scene file, starting from an empty scene when it does not
    /// exist yet. The file is only created on the first write.
    pub async fn open(path: &path::Path) -> Result<FileCanvas> {
        let (document, snapshot) = if path.exists() {
            parse_document(&fs::read_to_string(path).await?)?
        } else {
            tracing::debug!(path = ?path, "Scene file does not exist, starting empty");
            (empty_document(), DiagramSnapshot::default())
        };

        return Ok(FileCanvas {
            path: path.to_path_buf(),
            document: Mutex::new(document),
            scene: MemoryCanvas::with_scene(snapshot),
        });
    }

    pub fn path(&self) -> &path::Path {
        return &self.path;
    }

    async fn write(&self, document: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }

        let raw = serde_json::to_string_pretty(document)?;
        fs::write(&self.path, raw).await?;

        return Ok(());
    }
}

#[async_trait]
impl Canvas for FileCanvas {
    fn scene_elements(&self) -> Option<Vec<Element>> {
        return self.scene.scene_elements();
    }

    fn app_state(&self) -> Option<ViewState> {
        return self.scene.app_state();
    }

    #[allow(clippy::implicit_return)]
    async fn update_scene(&self, update: SceneUpdate) -> Result<()> {
        let mut document = self.document.lock().await;

        if let Some(elements) = &update.elements {
            document.insert("elements".to_string(), Value::Array(elements.clone()));
        }
        if let Some(app_state) = &update.app_state {
            let mut stored = match document.remove("appState") {
                Some(Value::Object(stored)) => stored,
                _ => Map::new(),
            };
            if let Value::Object(changes) = serde_json::to_value(app_state)? {
                stored.extend(changes);
            }
            document.insert("appState".to_string(), Value::Object(stored));
        }

        self.write(&document).await?;
        self.scene.update_scene(update).await?;
        tracing::debug!(path = ?self.path, "Wrote scene file");

        return Ok(());
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        return self.scene.subscribe();
    }

    #[allow(clippy::implicit_return)]
    async fn reload(&self) -> Result<()> {
        if !self.path.exists() {
            bail!(format!(
                "Scene file {} does not exist",
                self.path.to_string_lossy()
            ));
        }

        let raw = fs::read_to_string(&self.path).await?;
        let (document, snapshot) = parse_document(&raw)?;

        *self.document.lock().await = document;
        self.scene.replace(Some(snapshot));
        tracing::debug!(path = ?self.path, "Reloaded scene file");

        return Ok(());
    }
}
