use std::collections::BTreeMap;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use tracing::debug;
use trellis_core::config::ExecutionConfig;
use trellis_core::event::Event;
use trellis_core::ir::Node;
use trellis_core::traits::Backend;
use trellis_core::types::StateMap;
use trellis_core::{Result, TrellisError};

/// What a mocked node answers with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MockResponse {
    Text(String),
    State(StateMap),
}

impl From<&str> for MockResponse {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for MockResponse {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<StateMap> for MockResponse {
    fn from(state: StateMap) -> Self {
        Self::State(state)
    }
}

/// Deterministic backend for tests: replays canned responses by node name.
///
/// Composite nodes recurse into every child in declaration order. Nodes
/// without children answer from the table; a missing entry yields the
/// placeholder `[mock:<name>]`. No timing, concurrency or retries.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    responses: BTreeMap<String, MockResponse>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, node: impl Into<String>, response: impl Into<MockResponse>) -> Self {
        self.responses.insert(node.into(), response.into());
        self
    }

    /// Build from a JSON object: strings become text replies, objects state
    /// updates.
    pub fn from_json(table: &serde_json::Value) -> Result<Self> {
        let object = table
            .as_object()
            .ok_or_else(|| TrellisError::Backend("mock table must be a JSON object".into()))?;

        let mut backend = Self::new();
        for (name, value) in object {
            let response = match value {
                serde_json::Value::String(text) => MockResponse::Text(text.clone()),
                serde_json::Value::Object(state) => MockResponse::State(state.clone()),
                other => {
                    return Err(TrellisError::Backend(format!(
                        "mock response for '{name}' must be a string or an object, got {other}"
                    )))
                }
            };
            backend.responses.insert(name.clone(), response);
        }
        Ok(backend)
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    fn replay(&self, node: &Node, invocation_id: &str, events: &mut Vec<Event>) {
        let children = node.children();
        if !children.is_empty() {
            for child in children {
                self.replay(child, invocation_id, events);
            }
            return;
        }

        let event = match self.responses.get(node.name()) {
            Some(MockResponse::Text(text)) => Event::text(node.name(), text.clone()),
            Some(MockResponse::State(state)) => Event::state(node.name(), state.clone()),
            None => Event::text(node.name(), format!("[mock:{}]", node.name())),
        };
        debug!(node = node.name(), kind = node.kind().tag(), "Mock step");
        events.push(event.with_invocation(invocation_id));
    }

    fn events(&self, node: &Node, input: &str) -> Vec<Event> {
        let invocation_id = uuid::Uuid::new_v4().to_string();
        debug!(invocation = %invocation_id, input_len = input.len(), "Mock run started");
        let mut events = Vec::new();
        self.replay(node, &invocation_id, &mut events);
        events
    }
}

impl Backend for MockBackend {
    type Compiled = Node;

    fn name(&self) -> &str {
        "mock"
    }

    fn compile(&self, node: &Node, _config: &ExecutionConfig) -> Result<Node> {
        Ok(node.clone())
    }

    fn run<'a>(&'a self, compiled: &'a Node, input: &'a str) -> BoxFuture<'a, Result<Vec<Event>>> {
        Box::pin(async move { Ok(self.events(compiled, input)) })
    }

    fn stream<'a>(&'a self, compiled: &'a Node, input: &'a str) -> BoxStream<'a, Result<Event>> {
        let events: Vec<Result<Event>> = self.events(compiled, input).into_iter().map(Ok).collect();
        Box::pin(stream::iter(events))
    }
}
