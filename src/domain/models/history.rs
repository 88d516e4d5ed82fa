#[cfg(test)]
#[path = "history_test.rs"]
mod tests;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use super::Message;
use super::Role;
use super::ToolCall;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentRole {
    User,
    Model,
}

impl From<Role> for ContentRole {
    fn from(role: Role) -> ContentRole {
        match role {
            Role::User => return ContentRole::User,
            Role::Assistant => return ContentRole::Model,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub name: String,
    pub response: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    Text(String),
    FunctionCall(ToolCall),
    FunctionResponse(ToolResult),
}

/// One role-tagged block of the conversation sent to the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: ContentRole,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn text(role: ContentRole, text: &str) -> Content {
        return Content {
            role,
            parts: vec![Part::Text(text.to_string())],
        };
    }

    /// Builds the model block of one round. Returns `None` when the model
    /// produced neither text nor tool calls.
    pub fn model_turn(text: &str, calls: &[ToolCall]) -> Option<Content> {
        let mut parts = vec![];
        if !text.is_empty() {
            parts.push(Part::Text(text.to_string()));
        }
        parts.extend(calls.iter().cloned().map(Part::FunctionCall));

        if parts.is_empty() {
            return None;
        }

        return Some(Content {
            role: ContentRole::Model,
            parts,
        });
    }

    pub fn tool_results(results: Vec<ToolResult>) -> Content {
        return Content {
            role: ContentRole::User,
            parts: results.into_iter().map(Part::FunctionResponse).collect(),
        };
    }

    pub fn has_tool_calls(&self) -> bool {
        return self
            .parts
            .iter()
            .any(|part| return matches!(part, Part::FunctionCall(_)));
    }
}

/// Appends a block, merging it into the previous one when both share a role
/// so user and model turns keep alternating.
pub fn push_content(contents: &mut Vec<Content>, content: Content) {
    if content.parts.is_empty() {
        return;
    }

    if let Some(last) = contents.last_mut() {
        if last.role == content.role {
            last.parts.extend(content.parts);
            return;
        }
    }

    contents.push(content);
}

/// Removes tool calls that never received a response from the trailing model
/// block, dropping the block entirely if nothing else is left in it.
pub fn strip_pending_calls(contents: &mut Vec<Content>) {
    let Some(last) = contents.last_mut() else {
        return;
    };
    if last.role != ContentRole::Model || !last.has_tool_calls() {
        return;
    }

    last.parts
        .retain(|part| return !matches!(part, Part::FunctionCall(_)));
    if last.parts.is_empty() {
        contents.pop();
    }
}

/// Derives the history for the next turn. Starts from the most recent
/// message that recorded a `raw_history` snapshot and appends every newer
/// conversational message on top of it.
pub fn conversation_history(messages: &[Message]) -> Vec<Content> {
    let snapshot_idx = messages
        .iter()
        .rposition(|message| return message.raw_history.is_some());

    let (mut contents, newer) = match snapshot_idx {
        Some(idx) => (
            messages[idx].raw_history.clone().unwrap_or_default(),
            &messages[idx + 1..],
        ),
        None => (vec![], messages),
    };

    for message in newer.iter().filter(|m| return m.is_conversational()) {
        push_content(
            &mut contents,
            Content::text(message.role.into(), &message.content),
        );
    }

    return contents;
}
