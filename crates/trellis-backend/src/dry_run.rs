use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use serde::Serialize;
use trellis_analysis::visibility;
use trellis_core::config::ExecutionConfig;
use trellis_core::event::Event;
use trellis_core::ir::Node;
use trellis_core::traits::Backend;
use trellis_core::types::{KeySet, Visibility, VisibilityMap};
use trellis_core::{Result, TrellisError};

/// One node of the compiled plan, in pre-order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanStep {
    /// Dotted child-index path from the root, e.g. `0.2.1`.
    pub path: String,
    pub name: String,
    pub kind: String,
    pub depth: usize,
    pub visibility: Visibility,
    #[serde(skip_serializing_if = "KeySet::is_empty")]
    pub reads: KeySet,
    #[serde(skip_serializing_if = "KeySet::is_empty")]
    pub writes: KeySet,
}

/// What a runtime would be asked to execute.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    pub config: ExecutionConfig,
    pub steps: Vec<PlanStep>,
}

impl ExecutionPlan {
    pub fn step(&self, name: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.name == name)
    }
}

/// Compiles to an [`ExecutionPlan`] without any runtime attached.
/// Running the plan is refused.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunBackend;

const NAME: &str = "dry-run";

fn flatten(node: &Node, path: String, depth: usize, map: &VisibilityMap, steps: &mut Vec<PlanStep>) {
    steps.push(PlanStep {
        path: path.clone(),
        name: node.name().to_string(),
        kind: node.kind().tag().to_string(),
        depth,
        visibility: map.get(node.name()).copied().unwrap_or(Visibility::Internal),
        reads: node.reads(),
        writes: node.writes(),
    });
    for (i, child) in node.children().into_iter().enumerate() {
        flatten(child, format!("{path}.{i}"), depth + 1, map, steps);
    }
}

impl Backend for DryRunBackend {
    type Compiled = ExecutionPlan;

    fn name(&self) -> &str {
        NAME
    }

    fn compile(&self, node: &Node, config: &ExecutionConfig) -> Result<ExecutionPlan> {
        let map = visibility::infer(node, config.visibility);
        let mut steps = Vec::with_capacity(node.count());
        flatten(node, "0".to_string(), 0, &map, &mut steps);
        Ok(ExecutionPlan {
            config: config.clone(),
            steps,
        })
    }

    fn run<'a>(
        &'a self,
        _compiled: &'a ExecutionPlan,
        _input: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Event>>> {
        let refused: Result<Vec<Event>> = Err(unimplemented("run"));
        Box::pin(async move { refused })
    }

    fn stream<'a>(
        &'a self,
        _compiled: &'a ExecutionPlan,
        _input: &'a str,
    ) -> BoxStream<'a, Result<Event>> {
        let refused: Result<Event> = Err(unimplemented("stream"));
        Box::pin(stream::iter([refused]))
    }
}

fn unimplemented(operation: &str) -> TrellisError {
    TrellisError::Unimplemented {
        backend: NAME.to_string(),
        operation: operation.to_string(),
    }
}
