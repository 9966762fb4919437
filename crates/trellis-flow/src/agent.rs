use trellis_core::ir::{AgentSpec, GenerateConfig, Node};
use trellis_core::schema::{Schema, Structured};
use trellis_core::types::Visibility;
use trellis_core::Result;

use crate::flow::{Contract, Flow, FlowKind};

/// Builder for a single model-backed step.
///
/// Every setter consumes the builder and returns the updated copy; the
/// settable fields are exactly those of [`AgentSpec`].
#[derive(Debug, Clone)]
pub struct Agent {
    name: String,
    spec: AgentSpec,
    contract: Contract,
}

impl Agent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec: AgentSpec::default(),
            contract: Contract::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &AgentSpec {
        &self.spec
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.spec.model = Some(model.into());
        self
    }

    pub fn instruct(mut self, instruction: impl Into<String>) -> Self {
        self.spec.instruction = Some(instruction.into());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.spec.description = Some(description.into());
        self
    }

    pub fn tool(mut self, tool: impl Into<String>) -> Self {
        self.spec.tools.push(tool.into());
        self
    }

    pub fn tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.tools.extend(tools.into_iter().map(Into::into));
        self
    }

    /// Store the final reply under `key`. Required before routing on it.
    pub fn outputs(mut self, key: impl Into<String>) -> Self {
        self.spec.output_key = Some(key.into());
        self
    }

    /// Bind a structured output schema to the reply.
    pub fn returns(mut self, schema: Schema) -> Self {
        self.spec.output_schema = Some(schema);
        self
    }

    /// Bind the schema a [`Structured`] type describes.
    pub fn returns_type<T: Structured>(self) -> Self {
        self.returns(T::schema())
    }

    /// Bind a JSON Schema document; fails unless it is an object schema.
    pub fn returns_json(self, schema: &serde_json::Value) -> Result<Self> {
        Ok(self.returns(Schema::from_json_schema(schema)?))
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.generation().temperature = Some(temperature);
        self
    }

    pub fn top_p(mut self, top_p: f32) -> Self {
        self.generation().top_p = Some(top_p);
        self
    }

    pub fn max_output_tokens(mut self, tokens: u32) -> Self {
        self.generation().max_output_tokens = Some(tokens);
        self
    }

    /// Do not send earlier conversation turns to the model.
    pub fn without_history(mut self) -> Self {
        self.spec.include_history = false;
        self
    }

    pub fn reads<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.contract.reads.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn writes<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.contract.writes.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn produces(mut self, schema: Schema) -> Self {
        self.contract.produces = Some(schema);
        self
    }

    pub fn consumes(mut self, schema: Schema) -> Self {
        self.contract.consumes = Some(schema);
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.contract.visibility = Some(visibility);
        self
    }

    pub fn to_ir(&self) -> Result<Node> {
        Flow::from(self.clone()).build()
    }

    pub fn build(self) -> Result<Node> {
        Flow::from(self).build()
    }

    fn generation(&mut self) -> &mut GenerateConfig {
        self.spec.generation.get_or_insert_with(GenerateConfig::default)
    }
}

impl From<Agent> for Flow {
    fn from(agent: Agent) -> Self {
        Flow {
            name: Some(agent.name),
            kind: FlowKind::Agent(agent.spec),
            contract: agent.contract,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_core::schema::FieldType;
    use trellis_core::{NodeKind, TrellisError};

    #[test]
    fn test_agent_builder() {
        let agent = Agent::new("researcher")
            .model("gemini-2.5-flash")
            .instruct("Research {topic}.")
            .tools(["search", "fetch"])
            .outputs("findings")
            .temperature(0.2);

        let node = agent.to_ir().unwrap();
        assert_eq!(node.name(), "researcher");
        let NodeKind::Leaf(spec) = node.kind() else {
            panic!("expected leaf");
        };
        assert_eq!(spec.model.as_deref(), Some("gemini-2.5-flash"));
        assert_eq!(spec.tools, vec!["search", "fetch"]);
        assert_eq!(spec.generation.as_ref().unwrap().temperature, Some(0.2));
        assert!(node.writes().contains("findings"));
    }

    #[test]
    fn test_returns_leaves_original_untouched() {
        let base = Agent::new("classifier").outputs("intent");
        let typed = base
            .clone()
            .returns(Schema::new("Intent").field("label", FieldType::String));
        assert!(base.spec().output_schema.is_none());
        assert!(typed.spec().output_schema.is_some());
    }

    struct Ticket;

    impl Structured for Ticket {
        fn schema() -> Schema {
            Schema::new("Ticket")
                .field("summary", FieldType::String)
                .optional("priority", FieldType::Integer)
        }
    }

    #[test]
    fn test_returns_type_uses_structured_schema() {
        let agent = Agent::new("triage").outputs("ticket").returns_type::<Ticket>();
        let schema = agent.spec().output_schema.as_ref().unwrap();
        assert_eq!(schema.name, "Ticket");
        assert_eq!(schema.fields.len(), 2);
        assert_eq!(schema, &Ticket::schema());
    }

    #[test]
    fn test_returns_json_rejects_non_structural() {
        let err = Agent::new("a")
            .returns_json(&json!({"type": "array"}))
            .unwrap_err();
        assert!(matches!(err, TrellisError::NotStructural(_)));
    }
}
