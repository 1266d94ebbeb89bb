//! Conversation and agent records owned by the persistence collaborator.

use serde::{Deserialize, Serialize};

/// A conversation between one user and one agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: String,
    /// Owning user.
    pub user_id: String,
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Who may converse with an agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentVisibility {
    Public,
    #[default]
    Private,
}

/// A configured assistant persona.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(default)]
    pub visibility: AgentVisibility,
    /// Bind the context-retrieval tool over the caller's other conversations.
    #[serde(default)]
    pub enable_threads: bool,
    /// Names of catalog tools this agent may call.
    #[serde(default)]
    pub tools: Vec<String>,
}

impl Agent {
    /// Whether `user_id` may start a stream with this agent.
    pub fn is_accessible_by(&self, user_id: &str) -> bool {
        self.visibility == AgentVisibility::Public || self.owner_id == user_id
    }

    /// System prompt embedding the agent's instructions and tone.
    pub fn system_prompt(&self) -> String {
        let mut prompt = format!("You are {}.", self.name);
        let instructions = self.instructions.trim();
        if !instructions.is_empty() {
            prompt.push('\n');
            prompt.push_str(instructions);
        }
        if let Some(tone) = self.tone.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            prompt.push_str(&format!("\nRespond in a {tone} tone."));
        }
        prompt
    }
}
