#[cfg(test)]
#[path = "actions_test.rs"]
mod tests;

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::ChatSession;
use super::TurnOutcome;
use crate::domain::models::Action;
use crate::domain::models::Canvas;
use crate::domain::models::CredentialStore;
use crate::domain::models::Event;

pub fn help_text() -> String {
    let text = r#"
COMMANDS:
- /evaluate (/ev) - Sends the current diagram to the assistant for a review. Follow-up chat opens up after the first evaluation.
- /cancel (/c) - Stops the response that is currently streaming.
- /project (/p) [DESCRIPTION] - Sets what you are building. Changing it starts a new conversation.
- /key [API_KEY] - Saves the Gemini API key used for every request.
- /reload (/r) - Reads the diagram file again after editing it in Excalidraw.
- /diagram (/d) - Prints the latest diagram snapshot.
- /quit /exit (/q) - Exit ExcaliGenius.
- /help (/h) - Provides this help menu.

Anything else you type is sent to the assistant as a chat message.
        "#;

    return text.trim().to_string();
}

/// Waits for a turn while still taking actions, so a turn can be cancelled
/// mid-flight. Everything but `Cancel` is turned away until it finishes.
async fn drive_turn<F>(
    turn: F,
    token: &CancellationToken,
    tx: &mpsc::UnboundedSender<Event>,
    rx: &mut mpsc::UnboundedReceiver<Action>,
) -> Result<TurnOutcome>
where
    F: Future<Output = TurnOutcome>,
{
    tokio::pin!(turn);

    loop {
        tokio::select! {
            biased;

            outcome = &mut turn => return Ok(outcome),
            action = rx.recv() => match action {
                Some(Action::Cancel()) => {
                    tracing::debug!("Cancelling turn");
                    token.cancel();
                }
                Some(_) => {
                    tx.send(Event::Notice(
                        "Still working on the last request. Use /cancel to stop it.".to_string(),
                    ))?;
                }
                None => {
                    token.cancel();
                    return Ok(turn.await);
                }
            },
        }
    }
}

pub struct ActionsService {}

impl ActionsService {
    pub async fn start(
        mut session: ChatSession,
        credentials: Arc<dyn CredentialStore>,
        canvas: Arc<dyn Canvas>,
        tx: mpsc::UnboundedSender<Event>,
        rx: &mut mpsc::UnboundedReceiver<Action>,
    ) -> Result<()> {
        while let Some(action) = rx.recv().await {
            match action {
                Action::SetProject(description) => {
                    session.set_project_description(&description);
                }
                Action::Evaluate() => {
                    let token = CancellationToken::new();
                    let outcome =
                        drive_turn(session.start_evaluation(&token), &token, &tx, rx).await?;
                    tracing::debug!(outcome = ?outcome, "Evaluation finished");
                }
                Action::SendMessage(text) => {
                    if !session.has_evaluated() {
                        tx.send(Event::Notice(
                            "Run /evaluate first, then ask follow-up questions.".to_string(),
                        ))?;
                        continue;
                    }

                    let token = CancellationToken::new();
                    let outcome =
                        drive_turn(session.send_message(&text, &token), &token, &tx, rx).await?;
                    tracing::debug!(outcome = ?outcome, "Chat turn finished");
                }
                Action::Cancel() => {
                    tx.send(Event::Notice("Nothing to cancel.".to_string()))?;
                }
                Action::SetCredential(value) => {
                    let removing = value.trim().is_empty();
                    let res = if removing {
                        credentials.clear().await
                    } else {
                        credentials.set(&value).await
                    };

                    let notice = match res {
                        Ok(()) if removing => "API key removed.".to_string(),
                        Ok(()) => "API key saved.".to_string(),
                        Err(err) => {
                            tracing::warn!(error = ?err, "Failed to store API key");
                            format!("Could not save the API key: {err}")
                        }
                    };
                    tx.send(Event::Notice(notice))?;
                }
                Action::ReloadDiagram() => {
                    let notice = match canvas.reload().await {
                        Ok(()) => "Diagram reloaded.".to_string(),
                        Err(err) => {
                            tracing::warn!(error = ?err, "Failed to reload diagram");
                            format!("Could not reload the diagram: {err}")
                        }
                    };
                    tx.send(Event::Notice(notice))?;
                }
            }
        }

        return Ok(());
    }
}
