#[cfg(test)]
#[path = "diagram_test.rs"]
mod tests;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// Excalidraw element records are passed through untouched.
pub type Element = Value;

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Zoom {
    pub value: f64,
}

impl Default for Zoom {
    fn default() -> Zoom {
        return Zoom { value: 1.0 };
    }
}

/// Subset of the canvas app state the assistant reads and writes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<Zoom>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_background_color: Option<String>,
}

impl ViewState {
    /// Overwrites every field that is set in `other`.
    pub fn merge(&mut self, other: &ViewState) {
        if other.theme.is_some() {
            self.theme = other.theme.clone();
        }
        if other.zoom.is_some() {
            self.zoom = other.zoom;
        }
        if other.scroll_x.is_some() {
            self.scroll_x = other.scroll_x;
        }
        if other.scroll_y.is_some() {
            self.scroll_y = other.scroll_y;
        }
        if other.view_background_color.is_some() {
            self.view_background_color = other.view_background_color.clone();
        }
    }
}

/// Point-in-time read of the canvas.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramSnapshot {
    pub elements: Vec<Element>,
    pub app_state: ViewState,
}

impl DiagramSnapshot {
    pub fn is_empty(&self) -> bool {
        return self.elements.is_empty();
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SceneUpdate {
    pub elements: Option<Vec<Element>>,
    pub app_state: Option<ViewState>,
}

/// Arguments of the `apply_modifications` tool.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Modifications {
    #[serde(default)]
    pub elements: Option<Vec<Element>>,
    #[serde(default)]
    pub app_state: Option<ViewState>,
}

impl Modifications {
    pub fn parse(args: &Value) -> serde_json::Result<Modifications> {
        if args.is_null() {
            return Ok(Modifications::default());
        }

        return serde_json::from_value(args.clone());
    }

    /// Only the viewport is taken from the model. Zoom falls back to 1 and
    /// scroll offsets to 0 when the model leaves them out.
    pub fn into_scene_update(self) -> SceneUpdate {
        let app_state = self.app_state.map(|state| {
            return ViewState {
                zoom: Some(state.zoom.unwrap_or_default()),
                scroll_x: Some(state.scroll_x.unwrap_or(0.0)),
                scroll_y: Some(state.scroll_y.unwrap_or(0.0)),
                ..ViewState::default()
            };
        });

        return SceneUpdate {
            elements: self.elements,
            app_state,
        };
    }
}
