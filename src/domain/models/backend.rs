use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::Stream;
use futures::StreamExt;
use thiserror::Error;

use super::Content;
use super::ToolCall;
use super::ToolDeclaration;

/// Failures the session has to tell apart from everything else, as they mean
/// the user needs to check their credential.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("API error: {0}")]
    Status(u16),
    #[error("API error: no credential configured")]
    MissingCredential,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BackendRequest {
    pub system_instruction: String,
    pub contents: Vec<Content>,
    pub tools: Vec<ToolDeclaration>,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    Text(String),
    ToolCall(ToolCall),
    /// Always the last event of a stream.
    Done,
}

/// Lazy, single-consumption sequence of events for one backend call. Dropping
/// or closing it releases the underlying connection.
pub struct EventStream {
    inner: BoxStream<'static, Result<StreamEvent>>,
}

impl EventStream {
    pub fn new<S>(inner: S) -> EventStream
    where
        S: Stream<Item = Result<StreamEvent>> + Send + 'static,
    {
        return EventStream {
            inner: inner.boxed(),
        };
    }

    pub async fn next(&mut self) -> Option<Result<StreamEvent>> {
        return self.inner.next().await;
    }

    pub fn close(self) {
        tracing::debug!("Closing backend stream");
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Used at startup to verify the backend can be reached with the current
    /// configuration.
    async fn health_check(&self) -> Result<()>;

    /// Issues one call to the model. Text fragments and tool calls are yielded
    /// in the order the upstream delivers them, followed by a final
    /// `StreamEvent::Done`.
    ///
    /// Non-success responses fail with `TransportError::Status` before any
    /// event is produced.
    async fn stream(&self, request: BackendRequest) -> Result<EventStream>;
}
