use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use serde_json::Value;
use strum::EnumIter;
use strum::IntoEnumIterator;

/// A model-issued request to run one of the host's tools.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ToolName {
    GetDiagramData,
    ApplyModifications,
}

impl ToolName {
    pub fn parse(name: &str) -> Option<ToolName> {
        return ToolName::iter().find(|e| return e.to_string() == name);
    }

    pub fn declaration(&self) -> ToolDeclaration {
        match self {
            ToolName::GetDiagramData => {
                return ToolDeclaration {
                    name: self.to_string(),
                    description: "Returns the current Excalidraw diagram: every scene element and the view state (theme, zoom, scroll position, background color). Call this before reviewing or modifying the diagram.".to_string(),
                    parameters: None,
                };
            }
            ToolName::ApplyModifications => {
                return ToolDeclaration {
                    name: self.to_string(),
                    description: "Replaces the diagram with the given Excalidraw elements and optionally adjusts the view. Always send the complete list of elements, including unchanged ones.".to_string(),
                    parameters: Some(json!({
                        "type": "OBJECT",
                        "properties": {
                            "elements": {
                                "type": "ARRAY",
                                "description": "Complete list of Excalidraw elements for the new scene.",
                                "items": { "type": "OBJECT" }
                            },
                            "appState": {
                                "type": "OBJECT",
                                "description": "View state to apply.",
                                "properties": {
                                    "zoom": {
                                        "type": "OBJECT",
                                        "properties": { "value": { "type": "NUMBER" } }
                                    },
                                    "scrollX": { "type": "NUMBER" },
                                    "scrollY": { "type": "NUMBER" }
                                }
                            }
                        },
                        "required": ["elements"]
                    })),
                };
            }
        }
    }

    pub fn declarations() -> Vec<ToolDeclaration> {
        return ToolName::iter().map(|e| return e.declaration()).collect();
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}
