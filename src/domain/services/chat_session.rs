#[cfg(test)]
#[path = "chat_session_test.rs"]
mod tests;

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::SnapshotAccessor;
use super::ToolDispatcher;
use super::TurnOutcome;
use super::TurnProgress;
use super::TurnRequest;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::conversation_history;
use crate::domain::models::push_content;
use crate::domain::models::Backend;
use crate::domain::models::Canvas;
use crate::domain::models::Content;
use crate::domain::models::ContentRole;
use crate::domain::models::Event;
use crate::domain::models::Message;
use crate::domain::models::MessageType;
use crate::domain::models::Role;
use crate::domain::models::TransportError;

pub const CREDENTIAL_ERROR: &str = "API Error: Please check your API key and try again.";
pub const GENERIC_ERROR: &str =
    "Sorry, there was an error processing your request. Please try again.";
pub const NO_DIAGRAM: &str =
    "Please create a diagram first before evaluating. Draw something in the canvas!";
pub const EVALUATE_PROMPT: &str = "Please evaluate my diagram and provide feedback.";

fn system_instruction(project_description: &str) -> String {
    return format!(
        r#"You are an expert AI diagram reviewer and architect. You help users design, review, and improve their diagrams and system architectures.

The user is building: "{project_description}"

When reviewing diagrams, provide:
1. Clear feedback on the design
2. Suggestions for improvement
3. Potential issues or edge cases
4. Best practices recommendations

Call get_diagram_data to read the current diagram whenever you need it, the user may have changed it since your last look. If the user asks you to change the diagram, call apply_modifications with the complete list of Excalidraw elements, including the ones that stay the same, then explain what you changed.

Answer in Markdown."#
    );
}

fn evaluation_content(project_description: &str) -> String {
    return format!(
        "Project: {project_description}\n\nPlease evaluate my diagram. Call get_diagram_data to read it first, then provide feedback."
    );
}

fn error_text(err: &anyhow::Error) -> &'static str {
    if err.downcast_ref::<TransportError>().is_some() {
        return CREDENTIAL_ERROR;
    }

    return GENERIC_ERROR;
}

fn emit(tx: &mpsc::UnboundedSender<Event>, event: Event) {
    if tx.send(event).is_err() {
        tracing::debug!("No session observer listening");
    }
}

/// Holds `loading` for the duration of a turn and releases it on every exit
/// path, including early returns and panics.
struct LoadingGuard {
    flag: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<Event>,
}

impl LoadingGuard {
    fn acquire(flag: &Arc<AtomicBool>, tx: &mpsc::UnboundedSender<Event>) -> Option<LoadingGuard> {
        if flag.swap(true, Ordering::SeqCst) {
            return None;
        }
        emit(tx, Event::LoadingChanged(true));

        return Some(LoadingGuard {
            flag: flag.clone(),
            tx: tx.clone(),
        });
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
        emit(&self.tx, Event::LoadingChanged(false));
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionSettings {
    pub max_tool_rounds: usize,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for SessionSettings {
    fn default() -> SessionSettings {
        return SessionSettings {
            max_tool_rounds: 8,
            temperature: 0.7,
            max_output_tokens: 2048,
        };
    }
}

impl SessionSettings {
    pub fn from_config() -> Result<SessionSettings> {
        return Ok(SessionSettings {
            max_tool_rounds: Config::parse(ConfigKey::MaxToolRounds)?,
            temperature: Config::parse(ConfigKey::Temperature)?,
            max_output_tokens: Config::parse(ConfigKey::MaxOutputTokens)?,
        });
    }
}

/// Owns the conversation for one project and runs its turns.
pub struct ChatSession {
    project_description: String,
    messages: Vec<Message>,
    loading: Arc<AtomicBool>,
    has_evaluated: bool,
    snapshots: SnapshotAccessor,
    dispatcher: ToolDispatcher,
    settings: SessionSettings,
    tx: mpsc::UnboundedSender<Event>,
}

impl ChatSession {
    pub fn new(
        backend: Arc<dyn Backend>,
        canvas: Arc<dyn Canvas>,
        settings: SessionSettings,
        tx: mpsc::UnboundedSender<Event>,
    ) -> ChatSession {
        return ChatSession {
            project_description: "".to_string(),
            messages: vec![],
            loading: Arc::new(AtomicBool::new(false)),
            has_evaluated: false,
            snapshots: SnapshotAccessor::new(canvas.clone()),
            dispatcher: ToolDispatcher::new(backend, canvas, settings.max_tool_rounds),
            settings,
            tx,
        };
    }

    pub fn messages(&self) -> &[Message] {
        return &self.messages;
    }

    pub fn is_loading(&self) -> bool {
        return self.loading.load(Ordering::SeqCst);
    }

    pub fn has_evaluated(&self) -> bool {
        return self.has_evaluated;
    }

    pub fn project_description(&self) -> &str {
        return &self.project_description;
    }

    /// Starts the conversation over for a new project. Empty or unchanged
    /// descriptions are ignored.
    pub fn set_project_description(&mut self, description: &str) {
        let description = description.trim();
        if description.is_empty() || description == self.project_description {
            return;
        }

        self.project_description = description.to_string();
        self.has_evaluated = false;
        self.messages = vec![Message::initial(description)];
        emit(&self.tx, Event::MessagesReset(self.messages.clone()));
    }

    pub async fn start_evaluation(&mut self, cancel: &CancellationToken) -> TurnOutcome {
        if self.is_loading() {
            return TurnOutcome::Skipped;
        }

        let snapshot = self.snapshots.get_snapshot();
        if snapshot.map(|s| return s.is_empty()).unwrap_or(true) {
            self.push_message(Message::new_with_type(
                Role::Assistant,
                MessageType::Error,
                NO_DIAGRAM,
            ));
            return TurnOutcome::Skipped;
        }

        let Some(_guard) = LoadingGuard::acquire(&self.loading, &self.tx) else {
            return TurnOutcome::Skipped;
        };

        let mut contents = conversation_history(&self.messages);
        push_content(
            &mut contents,
            Content::text(
                ContentRole::User,
                &evaluation_content(&self.project_description),
            ),
        );

        self.has_evaluated = true;
        self.push_message(Message::new(Role::User, EVALUATE_PROMPT));

        return self.run_turn(contents, cancel).await;
    }

    pub async fn send_message(&mut self, text: &str, cancel: &CancellationToken) -> TurnOutcome {
        if text.trim().is_empty() || self.is_loading() || !self.has_evaluated {
            return TurnOutcome::Skipped;
        }

        let Some(_guard) = LoadingGuard::acquire(&self.loading, &self.tx) else {
            return TurnOutcome::Skipped;
        };

        self.push_message(Message::new(Role::User, text));
        let contents = conversation_history(&self.messages);

        return self.run_turn(contents, cancel).await;
    }

    fn push_message(&mut self, message: Message) {
        emit(&self.tx, Event::MessageAdded(message.clone()));
        self.messages.push(message);
    }

    async fn run_turn(&mut self, contents: Vec<Content>, cancel: &CancellationToken) -> TurnOutcome {
        let placeholder = Message::new(Role::Assistant, "");
        let placeholder_id = placeholder.id.to_string();
        self.push_message(placeholder);

        let request = TurnRequest {
            system_instruction: system_instruction(&self.project_description),
            contents,
            temperature: self.settings.temperature,
            max_output_tokens: self.settings.max_output_tokens,
        };

        let messages = &mut self.messages;
        let tx = &self.tx;
        let res = self
            .dispatcher
            .run_turn(request, cancel, |progress| match progress {
                TurnProgress::Fragment(text) => {
                    if let Some(message) = messages.iter_mut().find(|m| return m.id == placeholder_id) {
                        message.append(&text);
                    }
                    emit(
                        tx,
                        Event::MessageAppended {
                            id: placeholder_id.to_string(),
                            text,
                        },
                    );
                }
                TurnProgress::ToolCalled(name) => emit(tx, Event::ToolCalled(name)),
            })
            .await;

        let report = match res {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(error = ?err, "Turn failed");
                self.surface_error(&placeholder_id, error_text(&err));
                return TurnOutcome::Failed;
            }
        };

        match &report.outcome {
            TurnOutcome::Cancelled => {
                emit(&self.tx, Event::Notice("Request cancelled.".to_string()));
                return TurnOutcome::Cancelled;
            }
            TurnOutcome::UnknownTool(name) => {
                emit(
                    &self.tx,
                    Event::Notice(format!("The model asked for an unknown tool: {name}")),
                );
            }
            TurnOutcome::RoundLimit => {
                emit(
                    &self.tx,
                    Event::Notice("Stopped after too many tool calls in one turn.".to_string()),
                );
            }
            _ => {}
        }

        if let Some(message) = self.messages.iter_mut().find(|m| return m.id == placeholder_id) {
            message.raw_history = Some(report.history);
            emit(&self.tx, Event::MessageReplaced(message.clone()));
        }

        return report.outcome;
    }

    /// An empty placeholder turns into the error notice. One that already
    /// streamed text keeps it, and the notice follows as its own message.
    fn surface_error(&mut self, placeholder_id: &str, text: &str) {
        if let Some(message) = self.messages.iter_mut().find(|m| return m.id == placeholder_id) {
            if message.content.is_empty() {
                message.convert_to_error(text);
                emit(&self.tx, Event::MessageReplaced(message.clone()));
                return;
            }
        }

        self.push_message(Message::new_with_type(
            Role::Assistant,
            MessageType::Error,
            text,
        ));
    }
}
