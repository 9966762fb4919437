use serde::{Deserialize, Serialize};

use crate::schema::Schema;

/// Generation settings forwarded untouched to the runtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

/// Configuration of a single model-backed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Tool names available to this step.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
    /// State key that receives the step's final reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
    /// Structured output contract for the reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Schema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<GenerateConfig>,
    /// Whether prior conversation turns are sent to the model.
    #[serde(default = "default_include_history")]
    pub include_history: bool,
}

fn default_include_history() -> bool {
    true
}

impl Default for AgentSpec {
    fn default() -> Self {
        Self {
            model: None,
            instruction: None,
            description: None,
            tools: Vec::new(),
            output_key: None,
            output_schema: None,
            generation: None,
            include_history: default_include_history(),
        }
    }
}
