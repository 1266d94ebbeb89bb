//! Tool calls and the fragments they are assembled from.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A tool call requested by the model.
///
/// `id` correlates the call with its result and is unique per round only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: serde_json::Map<String, serde_json::Value>,
}

/// A partial tool call as exposed by one backend chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ToolCallFragment {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
}

impl ToolCallFragment {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        args: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
            args,
        }
    }

    /// A continuation fragment carrying only more arguments.
    pub fn args_only(id: impl Into<String>, args: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            id: id.into(),
            name: None,
            args,
        }
    }
}

/// Merges tool-call fragments by id, preserving first-seen order.
///
/// Argument maps are shallow-merged with the last fragment winning per key.
/// The name is fixed by the first fragment that carries a non-empty one.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: Vec<ToolCall>,
    index: HashMap<String, usize>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one fragment into the accumulated calls.
    pub fn push(&mut self, fragment: ToolCallFragment) {
        let name = fragment.name.filter(|n| !n.is_empty());
        match self.index.get(&fragment.id) {
            Some(&pos) => {
                let call = &mut self.calls[pos];
                if call.name.is_empty() {
                    if let Some(name) = name {
                        call.name = name;
                    }
                }
                call.args.extend(fragment.args);
            }
            None => {
                self.index.insert(fragment.id.clone(), self.calls.len());
                self.calls.push(ToolCall {
                    id: fragment.id,
                    name: name.unwrap_or_default(),
                    args: fragment.args,
                });
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Consume the accumulator, returning calls in first-seen order.
    pub fn into_calls(self) -> Vec<ToolCall> {
        self.calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn fragments_with_same_id_merge_args() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(ToolCallFragment::new("call_1", "search", args(json!({"a": 1}))));
        acc.push(ToolCallFragment::args_only("call_1", args(json!({"b": 2}))));

        let calls = acc.into_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(serde_json::Value::Object(calls[0].args.clone()), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn last_fragment_wins_per_key_and_first_name_sticks() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(ToolCallFragment::new("x", "first", args(json!({"q": "old"}))));
        acc.push(ToolCallFragment::new("x", "second", args(json!({"q": "new"}))));

        let calls = acc.into_calls();
        assert_eq!(calls[0].name, "first");
        assert_eq!(calls[0].args["q"], "new");
    }

    #[test]
    fn new_ids_start_new_calls_in_order() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(ToolCallFragment::new("b", "beta", Default::default()));
        acc.push(ToolCallFragment::new("a", "alpha", Default::default()));

        let names: Vec<_> = acc.into_calls().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["beta", "alpha"]);
    }

    #[test]
    fn late_name_fills_a_nameless_first_fragment() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(ToolCallFragment::args_only("z", args(json!({"k": true}))));
        acc.push(ToolCallFragment::new("z", "lookup", Default::default()));

        assert_eq!(acc.into_calls()[0].name, "lookup");
    }
}
