#[cfg(test)]
#[path = "message_test.rs"]
mod tests;

use chrono::DateTime;
use chrono::Local;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use super::Content;
use super::Role;

/// Reserved identifier of the greeting that seeds every project. It is only
/// shown to the user and never sent to the model.
pub const INITIAL_MESSAGE_ID: &str = "initial";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    Normal,
    Error,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Local>,
    mtype: MessageType,
    /// Full outbound history as of the end of the turn that produced this
    /// message. Later turns carry it forward instead of rebuilding it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_history: Option<Vec<Content>>,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Message {
        return Message::new_with_type(role, MessageType::Normal, content);
    }

    pub fn new_with_type(role: Role, mtype: MessageType, content: &str) -> Message {
        return Message {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.to_string(),
            timestamp: Local::now(),
            mtype,
            raw_history: None,
        };
    }

    pub fn initial(project_description: &str) -> Message {
        let mut msg = Message::new(
            Role::Assistant,
            &format!(
                "Hi! I'm your AI diagram review assistant. I've noted that you want to build:\n\n\"{project_description}\"\n\nGo ahead and create your diagram in Excalidraw, then run /evaluate to get my feedback!"
            ),
        );
        msg.id = INITIAL_MESSAGE_ID.to_string();

        return msg;
    }

    pub fn message_type(&self) -> MessageType {
        return self.mtype;
    }

    pub fn is_initial(&self) -> bool {
        return self.id == INITIAL_MESSAGE_ID;
    }

    pub fn append(&mut self, text: &str) {
        self.content += text;
    }

    /// Turns the message into an error notice. Only used once a turn has
    /// ended, never while fragments are still arriving.
    pub fn convert_to_error(&mut self, text: &str) {
        self.content = text.to_string();
        self.mtype = MessageType::Error;
        self.raw_history = None;
    }

    /// Whether the message takes part in the conversation sent to the model.
    pub fn is_conversational(&self) -> bool {
        return !self.is_initial()
            && self.mtype == MessageType::Normal
            && !self.content.trim().is_empty();
    }
}
