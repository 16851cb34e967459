//! Streamed-turn plumbing: tool-call fragment accumulation and text fan-out.

use crate::tool::PendingToolCall;
use parlance_ai::{ToolCallDelta, ToolCallRequest};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::warn;
use ulid::Ulid;

#[derive(Debug, Clone)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Per-index accumulation buffer for streamed tool-call fragments.
///
/// The first fragment seen for an index fixes the call id (synthesized when
/// the provider sends none) and the name. Later fragments only extend the
/// argument string, except that a name may still be filled in if the first
/// fragment had none. Arguments are never parsed here.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<usize, PartialToolCall>,
}

impl ToolCallAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one fragment into the table.
    pub fn push(&mut self, delta: ToolCallDelta) {
        let ToolCallDelta {
            index,
            id,
            name,
            arguments,
        } = delta;

        let call = self.calls.entry(index).or_insert_with(|| PartialToolCall {
            id: id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("tool_{}_{index}", Ulid::new())),
            name: String::new(),
            arguments: String::new(),
        });

        if call.name.is_empty() {
            if let Some(name) = name {
                call.name = name;
            }
        }
        if let Some(fragment) = arguments {
            call.arguments.push_str(&fragment);
        }
    }

    /// Returns true if no tool-call fragment was seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Returns the number of distinct calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Completes accumulation. Call only once the stream has ended.
    ///
    /// Calls are returned in index order with their raw argument strings.
    #[must_use]
    pub fn finish(self) -> Vec<ToolCallRequest> {
        self.calls
            .into_values()
            .map(|call| ToolCallRequest::new(call.id, call.name, call.arguments))
            .collect()
    }
}

/// Parses a complete argument string into an object.
///
/// Blank input, invalid JSON and non-object JSON all yield empty arguments.
#[must_use]
pub fn parse_arguments(raw: &str) -> Map<String, JsonValue> {
    if raw.trim().is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<JsonValue>(raw) {
        Ok(JsonValue::Object(map)) => map,
        Ok(other) => {
            warn!(kind = json_kind(&other), "tool arguments are not an object, using {{}}");
            Map::new()
        }
        Err(e) => {
            warn!(error = %e, "tool arguments failed to parse, using {{}}");
            Map::new()
        }
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

impl From<&ToolCallRequest> for PendingToolCall {
    fn from(request: &ToolCallRequest) -> Self {
        Self {
            id: request.id.clone(),
            name: request.function.name.clone(),
            arguments: parse_arguments(&request.function.arguments),
        }
    }
}

/// Delivers every streamed text chunk to each registered consumer.
///
/// Consumers are independent channels. A consumer that has gone away is
/// skipped; the producer never blocks or fails on it.
#[derive(Debug, Clone, Default)]
pub struct TextFanout {
    sinks: Vec<mpsc::UnboundedSender<String>>,
}

impl TextFanout {
    /// Creates a fan-out with no consumers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a consumer.
    #[must_use]
    pub fn with_sink(mut self, sink: mpsc::UnboundedSender<String>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Sends a chunk to every consumer that is still listening.
    pub fn emit(&self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        for sink in &self.sinks {
            let _ = sink.send(chunk.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fragmented_call_is_reconstructed() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(ToolCallDelta::new(0).with_name("f"));
        acc.push(ToolCallDelta::new(0).with_arguments("{\"a\":"));
        acc.push(ToolCallDelta::new(0).with_arguments("1}"));

        let calls = acc.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.name, "f");

        let pending = PendingToolCall::from(&calls[0]);
        assert_eq!(JsonValue::Object(pending.arguments), json!({"a": 1}));
    }

    #[test]
    fn sparse_out_of_order_indexes_are_keyed_not_appended() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(ToolCallDelta::new(3).with_id("c3").with_name("late"));
        acc.push(ToolCallDelta::new(1).with_id("c1").with_name("early"));
        acc.push(ToolCallDelta::new(3).with_arguments("{}"));
        acc.push(ToolCallDelta::new(1).with_arguments("{\"x\":true}"));

        assert_eq!(acc.len(), 2);
        let calls = acc.finish();
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[0].function.arguments, "{\"x\":true}");
        assert_eq!(calls[1].id, "c3");
        assert_eq!(calls[1].function.arguments, "{}");
    }

    #[test]
    fn first_fragment_fixes_id_and_name() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(ToolCallDelta::new(0).with_id("call_a").with_name("get_weather"));
        acc.push(
            ToolCallDelta::new(0)
                .with_id("call_b")
                .with_name("other")
                .with_arguments("{}"),
        );

        let calls = acc.finish();
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].function.name, "get_weather");
    }

    #[test]
    fn missing_id_is_synthesized() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(ToolCallDelta::new(2).with_name("f"));
        let calls = acc.finish();
        assert!(calls[0].id.starts_with("tool_"));
        assert!(calls[0].id.ends_with("_2"));
    }

    #[test]
    fn unparseable_arguments_become_empty() {
        assert!(parse_arguments("").is_empty());
        assert!(parse_arguments("{\"a\":").is_empty());
        assert!(parse_arguments("[1,2]").is_empty());
        assert_eq!(parse_arguments(r#"{"k":"v"}"#).get("k"), Some(&json!("v")));
    }

    #[tokio::test]
    async fn fanout_reaches_every_live_sink() {
        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        drop(b_rx);

        let fanout = TextFanout::new().with_sink(a_tx).with_sink(b_tx);
        fanout.emit("Xin ");
        fanout.emit("");
        fanout.emit("chào");
        drop(fanout);

        let mut received = String::new();
        while let Some(chunk) = a_rx.recv().await {
            received.push_str(&chunk);
        }
        assert_eq!(received, "Xin chào");
    }
}
