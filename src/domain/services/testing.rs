use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use anyhow::anyhow;
use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use serde_json::json;
use serde_json::Value;
use tokio::sync::watch;

use crate::domain::models::Backend;
use crate::domain::models::BackendRequest;
use crate::domain::models::Canvas;
use crate::domain::models::DiagramSnapshot;
use crate::domain::models::Element;
use crate::domain::models::EventStream;
use crate::domain::models::SceneUpdate;
use crate::domain::models::StreamEvent;
use crate::domain::models::ToolCall;
use crate::domain::models::TransportError;
use crate::domain::models::ViewState;
use crate::infrastructure::canvas::MemoryCanvas;

pub fn text(value: &str) -> StreamEvent {
    return StreamEvent::Text(value.to_string());
}

pub fn call(name: &str, args: Value) -> StreamEvent {
    return StreamEvent::ToolCall(ToolCall {
        name: name.to_string(),
        args,
    });
}

pub fn element(id: &str) -> Element {
    return json!({ "id": id, "type": "rectangle", "x": 0, "y": 0 });
}

/// One canned answer to a backend call.
pub enum Reply {
    /// Yields the events followed by `Done`.
    Events(Vec<StreamEvent>),
    /// Yields the events and then never finishes.
    Hang(Vec<StreamEvent>),
    /// Yields the events and then fails mid-stream.
    Broken(Vec<StreamEvent>, String),
    Status(u16),
    Error(String),
}

/// Backend that answers each call with the next scripted reply and records
/// every request it was given.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<BackendRequest>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<Reply>) -> Arc<ScriptedBackend> {
        return Arc::new(ScriptedBackend {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(vec![]),
        });
    }

    pub fn requests(&self) -> Vec<BackendRequest> {
        return self.requests.lock().unwrap().clone();
    }

    pub fn calls(&self) -> usize {
        return self.requests.lock().unwrap().len();
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    #[allow(clippy::implicit_return)]
    async fn health_check(&self) -> Result<()> {
        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn stream(&self, request: BackendRequest) -> Result<EventStream> {
        self.requests.lock().unwrap().push(request);
        let reply = self.replies.lock().unwrap().pop_front();

        match reply {
            Some(Reply::Events(mut events)) => {
                events.push(StreamEvent::Done);
                return Ok(EventStream::new(stream::iter(events).map(Ok)));
            }
            Some(Reply::Hang(events)) => {
                return Ok(EventStream::new(
                    stream::iter(events).map(Ok).chain(stream::pending::<Result<StreamEvent>>()),
                ));
            }
            Some(Reply::Broken(events, message)) => {
                let items = events
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(anyhow!(message))));
                return Ok(EventStream::new(stream::iter(items)));
            }
            Some(Reply::Status(status)) => return Err(TransportError::Status(status).into()),
            Some(Reply::Error(message)) => bail!(message),
            None => bail!("No scripted reply left"),
        }
    }
}

/// In-memory canvas that remembers every update it was asked to apply.
pub struct RecordingCanvas {
    inner: MemoryCanvas,
    updates: Mutex<Vec<SceneUpdate>>,
    fail_updates: AtomicBool,
}

impl RecordingCanvas {
    pub fn uninitialized() -> Arc<RecordingCanvas> {
        return Arc::new(RecordingCanvas {
            inner: MemoryCanvas::default(),
            updates: Mutex::new(vec![]),
            fail_updates: AtomicBool::new(false),
        });
    }

    pub fn with_elements(elements: Vec<Element>) -> Arc<RecordingCanvas> {
        return Arc::new(RecordingCanvas {
            inner: MemoryCanvas::with_scene(DiagramSnapshot {
                elements,
                app_state: ViewState {
                    theme: Some("light".to_string()),
                    ..ViewState::default()
                },
            }),
            updates: Mutex::new(vec![]),
            fail_updates: AtomicBool::new(false),
        });
    }

    pub fn updates(&self) -> Vec<SceneUpdate> {
        return self.updates.lock().unwrap().clone();
    }

    pub fn fail_updates(&self) {
        self.fail_updates.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Canvas for RecordingCanvas {
    fn scene_elements(&self) -> Option<Vec<Element>> {
        return self.inner.scene_elements();
    }

    fn app_state(&self) -> Option<ViewState> {
        return self.inner.app_state();
    }

    #[allow(clippy::implicit_return)]
    async fn update_scene(&self, update: SceneUpdate) -> Result<()> {
        self.updates.lock().unwrap().push(update.clone());
        if self.fail_updates.load(Ordering::SeqCst) {
            bail!("Canvas rejected the update");
        }

        return self.inner.update_scene(update).await;
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        return self.inner.subscribe();
    }
}
