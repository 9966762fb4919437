//! Workflow IR: the frozen, backend-neutral tree.
//!
//! A workflow is a tree of `Node`s. Each node carries a name, its declared
//! read/write contract, and a `NodeKind` describing the topology below it.
//! Trees are produced by lowering builders and are never edited afterwards;
//! analyses and backends take `&Node` and return new data.

pub mod agent;
pub mod node;
mod walk;

pub use agent::{AgentSpec, GenerateConfig};
pub use node::{Node, NodeKind, NodeMeta, RouteRule, TapAction};

/// Name of the checkpoint node a predicate loop appends to its body.
pub const CHECKPOINT_NAME: &str = "_until_check";

/// Default per-element state key used by `MapOver`.
pub const DEFAULT_ITEM_KEY: &str = "_item";

/// Default aggregate key used by `MapOver`.
pub const DEFAULT_MAP_OUTPUT_KEY: &str = "results";

/// Iteration bound applied when a loop is given only a predicate.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
