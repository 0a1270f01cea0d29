//! Recovers `<tool_call>{json}</tool_call>` blocks from plain model text.

use crate::traits::ToolCall;
use serde_json::Value;

const OPEN_TAG: &str = "<tool_call>";
const CLOSE_TAG: &str = "</tool_call>";

/// Splits a response into its prose and the tool calls embedded in it.
/// An unterminated block is left in the text untouched.
pub fn parse_tool_calls(response: &str) -> (String, Vec<ToolCall>) {
    let mut text_parts = Vec::new();
    let mut calls = Vec::new();
    let mut remaining = response;

    while let Some(start) = remaining.find(OPEN_TAG) {
        let after_open = &remaining[start + OPEN_TAG.len()..];
        let Some(close_idx) = after_open.find(CLOSE_TAG) else {
            break;
        };

        let before = remaining[..start].trim();
        if !before.is_empty() {
            text_parts.push(before.to_string());
        }

        for value in extract_json_values(&after_open[..close_idx]) {
            if let Some(call) = tool_call_from_value(&value, calls.len()) {
                calls.push(call);
            }
        }
        remaining = &after_open[close_idx + CLOSE_TAG.len()..];
    }

    if !remaining.trim().is_empty() {
        text_parts.push(remaining.trim().to_string());
    }

    (text_parts.join("\n"), calls)
}

fn extract_json_values(text: &str) -> Vec<Value> {
    let mut values = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0
                    && let Some(s) = start.take()
                    && let Ok(value) = serde_json::from_str::<Value>(&text[s..=i])
                {
                    values.push(value);
                }
            }
            _ => {}
        }
    }

    values
}

fn tool_call_from_value(value: &Value, position: usize) -> Option<ToolCall> {
    let name = value.get("name")?.as_str()?.to_string();
    let arguments = match value.get("arguments") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => serde_json::to_string(other).ok()?,
        None => "{}".to_string(),
    };
    let digest = md5::compute(format!("{position}:{name}:{arguments}").as_bytes());

    Some(ToolCall {
        id: format!("call_{:x}", digest),
        name,
        arguments,
    })
}
