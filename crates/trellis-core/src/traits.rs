use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::config::ExecutionConfig;
use crate::error::Result;
use crate::event::Event;
use crate::ir::Node;

/// Turns an IR tree into something a runtime can execute.
pub trait Backend: Send + Sync + 'static {
    /// The runnable artifact produced by `compile`.
    type Compiled: Send + Sync;

    /// Backend name (used in logs and errors).
    fn name(&self) -> &str;

    /// Compile an IR tree. Must not mutate the tree.
    fn compile(&self, node: &Node, config: &ExecutionConfig) -> Result<Self::Compiled>;

    /// Run to completion and collect every event.
    ///
    /// Backends that need a live runtime return `TrellisError::Unimplemented`.
    fn run<'a>(
        &'a self,
        compiled: &'a Self::Compiled,
        input: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Event>>>;

    /// Run and yield events as they are produced.
    fn stream<'a>(
        &'a self,
        compiled: &'a Self::Compiled,
        input: &'a str,
    ) -> BoxStream<'a, Result<Event>>;
}
