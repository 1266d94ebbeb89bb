//! Name-keyed tool set.

use std::collections::HashMap;
use std::sync::Arc;

use super::tool::Tool;
use super::types::ToolDefinition;

/// Tools available to one model loop, keyed by exact name.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, replacing any tool with the same name.
    pub fn insert(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.insert(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Subset containing only the named tools that exist in this set.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> ToolSet {
        let tools = names
            .iter()
            .filter_map(|name| {
                self.tools
                    .get_key_value(name.as_ref())
                    .map(|(k, v)| (k.clone(), v.clone()))
            })
            .collect();
        ToolSet { tools }
    }

    /// Definitions for the backend request, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters().schema.clone(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }
}

impl FromIterator<Arc<dyn Tool>> for ToolSet {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Tool>>>(iter: I) -> Self {
        let mut set = ToolSet::new();
        for tool in iter {
            set.insert(tool);
        }
        set
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.tools.keys().collect();
        names.sort();
        f.debug_struct("ToolSet").field("tools", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{FnTool, ToolParameters};

    fn named(name: &str) -> Arc<dyn Tool> {
        Arc::new(FnTool::new(name, "test tool", ToolParameters::empty(), |_args| async {
            Ok("ok".to_string())
        }))
    }

    #[test]
    fn select_keeps_only_known_names() {
        let set: ToolSet = [named("weather"), named("search")].into_iter().collect();
        let picked = set.select(&["search", "missing"]);
        assert_eq!(picked.len(), 1);
        assert!(picked.get("search").is_some());
        assert!(picked.get("weather").is_none());
    }

    #[test]
    fn definitions_are_sorted_by_name() {
        let set = ToolSet::new().with(named("zeta")).with(named("alpha"));
        let names: Vec<_> = set.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
