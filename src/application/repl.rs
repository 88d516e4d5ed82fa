#[cfg(test)]
#[path = "repl_test.rs"]
mod tests;

use anyhow::Result;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio::sync::watch;
use yansi::Paint;

use crate::domain::models::Action;
use crate::domain::models::Event;
use crate::domain::models::Message;
use crate::domain::models::MessageType;
use crate::domain::models::Role;
use crate::domain::models::SlashCommand;
use crate::domain::services::actions::help_text;

#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Empty,
    Quit,
    Help,
    Diagram,
    Usage(&'static str),
    Dispatch(Action),
}

pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }

    let Some(cmd) = SlashCommand::parse(line) else {
        return Input::Dispatch(Action::SendMessage(line.to_string()));
    };

    if cmd.is_quit() {
        return Input::Quit;
    }
    if cmd.is_help() {
        return Input::Help;
    }
    if cmd.is_diagram() {
        return Input::Diagram;
    }
    if cmd.is_evaluate() {
        return Input::Dispatch(Action::Evaluate());
    }
    if cmd.is_cancel() {
        return Input::Dispatch(Action::Cancel());
    }
    if cmd.is_reload() {
        return Input::Dispatch(Action::ReloadDiagram());
    }
    if cmd.is_project() {
        if cmd.args.is_empty() {
            return Input::Usage("Usage: /project <description of what you are building>");
        }
        return Input::Dispatch(Action::SetProject(cmd.rest()));
    }
    if cmd.is_key() {
        return Input::Dispatch(Action::SetCredential(cmd.rest()));
    }

    return Input::Dispatch(Action::SendMessage(line.to_string()));
}

/// Turns session events into terminal output. Tracks which assistant message
/// is currently streaming so fragments land on the same line.
#[derive(Default)]
pub struct Renderer {
    streaming: Option<String>,
}

impl Renderer {
    fn label(role: Role) -> String {
        return Paint::new(format!("{}: ", role.label())).bold().to_string();
    }

    fn message(&mut self, message: &Message) -> String {
        if message.message_type() == MessageType::Error {
            return format!("{}\n", Paint::red(&message.content));
        }

        if message.role == Role::User {
            return "".to_string();
        }

        if message.content.is_empty() {
            self.streaming = Some(message.id.to_string());
            return Renderer::label(message.role);
        }

        return format!("{}{}\n", Renderer::label(message.role), message.content);
    }

    /// Closes an unfinished streaming line, if any.
    fn end_stream(&mut self) -> String {
        if self.streaming.take().is_some() {
            return "\n".to_string();
        }
        return "".to_string();
    }

    pub fn render(&mut self, event: &Event) -> String {
        match event {
            Event::MessageAdded(message) => {
                let prefix = self.end_stream();
                return format!("{prefix}{}", self.message(message));
            }
            Event::MessageAppended { id, text } => {
                if self.streaming.as_deref() == Some(id.as_str()) {
                    return text.to_string();
                }
                return "".to_string();
            }
            Event::MessageReplaced(message) => {
                if self.streaming.as_deref() != Some(message.id.as_str()) {
                    return "".to_string();
                }
                self.streaming = None;

                if message.message_type() == MessageType::Error {
                    return format!("{}\n", Paint::red(&message.content));
                }
                return "\n".to_string();
            }
            Event::MessagesReset(messages) => {
                self.streaming = None;
                return messages
                    .iter()
                    .map(|m| return self.message(m))
                    .collect::<Vec<String>>()
                    .join("");
            }
            Event::Notice(text) => {
                let prefix = self.end_stream();
                return format!("{prefix}{}\n", Paint::yellow(text));
            }
            Event::ToolCalled(name) => {
                return Paint::new(format!("[{name}] ")).dimmed().to_string();
            }
            Event::LoadingChanged(loading) => {
                if *loading {
                    return "".to_string();
                }
                return self.end_stream();
            }
        }
    }
}

async fn write(stdout: &mut tokio::io::Stdout, text: &str) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    stdout.write_all(text.as_bytes()).await?;
    stdout.flush().await?;
    return Ok(());
}

pub async fn start(
    tx: mpsc::UnboundedSender<Action>,
    mut rx: mpsc::UnboundedReceiver<Event>,
    diagram: watch::Receiver<Option<String>>,
) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut renderer = Renderer::default();

    write(
        &mut stdout,
        &format!(
            "{}\n",
            Paint::new("Type /help for commands, /evaluate to review your diagram.").dimmed()
        ),
    )
    .await?;

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    return Ok(());
                };
                write(&mut stdout, &renderer.render(&event)).await?;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(());
                };

                match parse_input(&line) {
                    Input::Empty => {}
                    Input::Quit => return Ok(()),
                    Input::Help => write(&mut stdout, &format!("{}\n", help_text())).await?,
                    Input::Diagram => {
                        let snapshot = diagram
                            .borrow()
                            .clone()
                            .unwrap_or_else(|| return "No diagram loaded yet.".to_string());
                        write(&mut stdout, &format!("{snapshot}\n")).await?;
                    }
                    Input::Usage(usage) => {
                        write(&mut stdout, &format!("{}\n", Paint::yellow(usage))).await?;
                    }
                    Input::Dispatch(action) => {
                        tracing::debug!(action = ?action, "Dispatching action");
                        tx.send(action)?;
                    }
                }
            }
        }
    }
}
