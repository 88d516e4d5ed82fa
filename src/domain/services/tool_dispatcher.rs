#[cfg(test)]
#[path = "tool_dispatcher_test.rs"]
mod tests;

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::SnapshotAccessor;
use crate::domain::models::push_content;
use crate::domain::models::strip_pending_calls;
use crate::domain::models::Backend;
use crate::domain::models::BackendRequest;
use crate::domain::models::Canvas;
use crate::domain::models::Content;
use crate::domain::models::Modifications;
use crate::domain::models::StreamEvent;
use crate::domain::models::ToolCall;
use crate::domain::models::ToolName;
use crate::domain::models::ToolResult;

/// How a turn ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The turn was never started.
    Skipped,
    Completed,
    UnknownTool(String),
    RoundLimit,
    Cancelled,
    Failed,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TurnState {
    AwaitingModel,
    ExecutingTool(Vec<ToolCall>),
    Terminal(TurnOutcome),
}

/// Reported to the caller while a turn runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnProgress {
    Fragment(String),
    ToolCalled(String),
}

pub struct TurnRequest {
    pub system_instruction: String,
    pub contents: Vec<Content>,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

#[derive(Debug)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    /// Everything sent to and received from the model during the turn. Tool
    /// calls without a response are never part of it.
    pub history: Vec<Content>,
}

fn failure(name: &str, error: &str) -> ToolResult {
    return ToolResult {
        name: name.to_string(),
        response: json!({ "success": false, "error": error }),
    };
}

/// Drives one turn: streams the model, runs the tools it asks for, and feeds
/// the results back until the model answers without requesting any.
pub struct ToolDispatcher {
    backend: Arc<dyn Backend>,
    canvas: Arc<dyn Canvas>,
    snapshots: SnapshotAccessor,
    max_rounds: usize,
}

impl ToolDispatcher {
    pub fn new(backend: Arc<dyn Backend>, canvas: Arc<dyn Canvas>, max_rounds: usize) -> ToolDispatcher {
        return ToolDispatcher {
            backend,
            snapshots: SnapshotAccessor::new(canvas.clone()),
            canvas,
            max_rounds,
        };
    }

    pub async fn run_turn<F>(
        &self,
        request: TurnRequest,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<TurnReport>
    where
        F: FnMut(TurnProgress),
    {
        let mut contents = request.contents.clone();
        let mut rounds = 0;
        let mut state = TurnState::AwaitingModel;

        loop {
            tracing::debug!(state = ?state, rounds, "Turn state");
            state = match state {
                TurnState::AwaitingModel => {
                    self.await_model(&request, &mut contents, rounds, cancel, &mut on_progress)
                        .await?
                }
                TurnState::ExecutingTool(calls) => {
                    rounds += 1;
                    let mut results = vec![];
                    for call in &calls {
                        on_progress(TurnProgress::ToolCalled(call.name.to_string()));
                        results.push(self.execute(call).await);
                    }
                    push_content(&mut contents, Content::tool_results(results));

                    TurnState::AwaitingModel
                }
                TurnState::Terminal(outcome) => {
                    return Ok(TurnReport {
                        outcome,
                        history: contents,
                    });
                }
            };
        }
    }

    async fn await_model<F>(
        &self,
        request: &TurnRequest,
        contents: &mut Vec<Content>,
        rounds: usize,
        cancel: &CancellationToken,
        on_progress: &mut F,
    ) -> Result<TurnState>
    where
        F: FnMut(TurnProgress),
    {
        let backend_request = BackendRequest {
            system_instruction: request.system_instruction.to_string(),
            contents: contents.clone(),
            tools: ToolName::declarations(),
            temperature: request.temperature,
            max_output_tokens: request.max_output_tokens,
        };

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(TurnState::Terminal(TurnOutcome::Cancelled)),
            res = self.backend.stream(backend_request) => res?,
        };

        let mut text = String::new();
        let mut calls = vec![];
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    stream.close();
                    return Ok(TurnState::Terminal(TurnOutcome::Cancelled));
                }
                event = stream.next() => event,
            };

            match event {
                Some(Ok(StreamEvent::Text(fragment))) => {
                    text += &fragment;
                    on_progress(TurnProgress::Fragment(fragment));
                }
                Some(Ok(StreamEvent::ToolCall(call))) => {
                    tracing::debug!(name = call.name.as_str(), "Model requested tool");
                    calls.push(call);
                }
                Some(Ok(StreamEvent::Done)) | None => break,
                Some(Err(err)) => return Err(err),
            }
        }
        stream.close();

        if let Some(content) = Content::model_turn(&text, &calls) {
            push_content(contents, content);
        }

        if calls.is_empty() {
            return Ok(TurnState::Terminal(TurnOutcome::Completed));
        }

        if let Some(unknown) = calls.iter().find(|call| return ToolName::parse(&call.name).is_none()) {
            tracing::warn!(name = unknown.name.as_str(), "Model requested an unknown tool");
            strip_pending_calls(contents);
            return Ok(TurnState::Terminal(TurnOutcome::UnknownTool(
                unknown.name.to_string(),
            )));
        }

        if rounds >= self.max_rounds {
            tracing::warn!(rounds, "Tool round limit reached, ending turn");
            strip_pending_calls(contents);
            return Ok(TurnState::Terminal(TurnOutcome::RoundLimit));
        }

        return Ok(TurnState::ExecutingTool(calls));
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        match ToolName::parse(&call.name) {
            Some(ToolName::GetDiagramData) => return self.get_diagram_data(call),
            Some(ToolName::ApplyModifications) => return self.apply_modifications(call).await,
            None => return failure(&call.name, "Unknown tool"),
        }
    }

    fn get_diagram_data(&self, call: &ToolCall) -> ToolResult {
        let diagram = match self.snapshots.get_snapshot() {
            Some(snapshot) => match serde_json::to_value(snapshot) {
                Ok(value) => value,
                Err(err) => return failure(&call.name, &err.to_string()),
            },
            None => Value::Null,
        };

        return ToolResult {
            name: call.name.to_string(),
            response: json!({ "diagram": diagram }),
        };
    }

    async fn apply_modifications(&self, call: &ToolCall) -> ToolResult {
        let modifications = match Modifications::parse(&call.args) {
            Ok(modifications) => modifications,
            Err(err) => {
                tracing::warn!(error = ?err, "Invalid apply_modifications arguments");
                return failure(&call.name, &format!("Invalid arguments: {err}"));
            }
        };

        let update = modifications.into_scene_update();
        let count = update.elements.as_ref().map(|elements| return elements.len());

        if let Err(err) = self.canvas.update_scene(update).await {
            tracing::error!(error = ?err, "Failed to apply modifications");
            return failure(&call.name, &err.to_string());
        }

        let message = match count {
            Some(count) => format!("Diagram updated with {count} elements."),
            None => "View updated.".to_string(),
        };

        return ToolResult {
            name: call.name.to_string(),
            response: json!({ "success": true, "message": message }),
        };
    }
}
