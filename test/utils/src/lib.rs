use serde_json::json;
use serde_json::Value;

/// A streamed response record carrying a single text part.
pub fn text_record(text: &str) -> Value {
    return json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] }
        }]
    });
}

/// A streamed response record carrying a single function call part.
pub fn call_record(name: &str, args: Value) -> Value {
    return json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [{ "functionCall": { "name": name, "args": args } }]
            },
            "finishReason": "STOP"
        }]
    });
}

/// Frames records as a server-sent event stream, ended by the `[DONE]`
/// sentinel.
pub fn sse_body(records: &[Value]) -> String {
    let mut body = records
        .iter()
        .map(|record| return format!("data: {record}\n\n"))
        .collect::<String>();
    body += "data: [DONE]\n\n";

    return body;
}

/// Frames records as a JSON array, the way the non-SSE endpoint streams them.
pub fn json_array_body(records: &[Value]) -> String {
    let items = records
        .iter()
        .map(|record| return serde_json::to_string_pretty(record).unwrap())
        .collect::<Vec<String>>()
        .join(",\r\n");

    return format!("[{items}]");
}

pub fn scene_fixture() -> &'static str {
    return r##"{
  "type": "excalidraw",
  "version": 2,
  "source": "https://excalidraw.com",
  "elements": [
    {
      "id": "api-gateway",
      "type": "rectangle",
      "x": 100,
      "y": 120,
      "width": 180,
      "height": 80,
      "strokeColor": "#1e1e1e"
    },
    {
      "id": "api-gateway-label",
      "type": "text",
      "x": 130,
      "y": 150,
      "text": "API Gateway {v2}",
      "containerId": "api-gateway"
    }
  ],
  "appState": {
    "gridSize": null,
    "viewBackgroundColor": "#ffffff",
    "theme": "light"
  },
  "files": {}
}"##;
}
