use trellis_core::ir::{TapAction, CHECKPOINT_NAME, DEFAULT_MAX_ITERATIONS};
use trellis_core::predicate::Predicate;

use crate::flow::{Flow, FlowKind};

/// Exit condition for `flow * until(p).max(n)`.
#[derive(Debug, Clone)]
pub struct Until {
    pub(crate) predicate: Predicate,
    pub(crate) max: u32,
}

impl Until {
    /// Override the iteration bound (default 10).
    pub fn max(mut self, max: u32) -> Self {
        self.max = max;
        self
    }
}

/// Start an exit condition for the `*` operator.
pub fn until(predicate: Predicate) -> Until {
    Until {
        predicate,
        max: DEFAULT_MAX_ITERATIONS,
    }
}

fn splice<F>(flow: Flow, out: &mut Vec<Flow>, is_same: F)
where
    F: Fn(&FlowKind) -> bool,
{
    if flow.is_anonymous() && is_same(&flow.kind) {
        if let FlowKind::Sequence(items)
        | FlowKind::Parallel(items)
        | FlowKind::Fallback(items)
        | FlowKind::Race(items) = flow.kind
        {
            out.extend(items);
            return;
        }
    }
    out.push(flow);
}

fn join<F, K>(items: impl IntoIterator<Item = Flow>, is_same: F, make: K) -> Flow
where
    F: Fn(&FlowKind) -> bool + Copy,
    K: FnOnce(Vec<Flow>) -> FlowKind,
{
    let mut out = Vec::new();
    for item in items {
        splice(item, &mut out, is_same);
    }
    Flow::from_kind(make(out))
}

fn is_sequence(k: &FlowKind) -> bool {
    matches!(k, FlowKind::Sequence(_))
}

fn is_parallel(k: &FlowKind) -> bool {
    matches!(k, FlowKind::Parallel(_))
}

fn is_fallback(k: &FlowKind) -> bool {
    matches!(k, FlowKind::Fallback(_))
}

/// `a >> b`. Anonymous sequences on either side are flattened, so
/// sequencing is associative.
pub fn sequence(a: Flow, b: Flow) -> Flow {
    sequence_all([a, b])
}

pub fn sequence_all(steps: impl IntoIterator<Item = Flow>) -> Flow {
    join(steps, is_sequence, FlowKind::Sequence)
}

/// `a | b`.
pub fn parallel(a: Flow, b: Flow) -> Flow {
    parallel_all([a, b])
}

pub fn parallel_all(branches: impl IntoIterator<Item = Flow>) -> Flow {
    join(branches, is_parallel, FlowKind::Parallel)
}

/// `a.or_else(b)`.
pub fn fallback(a: Flow, b: Flow) -> Flow {
    fallback_all([a, b])
}

pub fn fallback_all(options: impl IntoIterator<Item = Flow>) -> Flow {
    join(options, is_fallback, FlowKind::Fallback)
}

/// First of `contenders` to complete wins; the rest are cancelled.
pub fn race<I, F>(contenders: I) -> Flow
where
    I: IntoIterator<Item = F>,
    F: Into<Flow>,
{
    Flow::from_kind(FlowKind::Race(
        contenders.into_iter().map(Into::into).collect(),
    ))
}

/// Build a loop. With a predicate, a checkpoint tap that evaluates it is
/// appended as the last step of the body.
pub(crate) fn repeat(body: Flow, max_iterations: u32, until: Option<Predicate>) -> Flow {
    let body = match &until {
        Some(predicate) => {
            let checkpoint = Flow::from_kind(FlowKind::Tap(TapAction::Checkpoint {
                until: predicate.clone(),
            }))
            .named(CHECKPOINT_NAME);
            sequence(body, checkpoint)
        }
        None => body,
    };

    Flow::from_kind(FlowKind::Loop {
        body: Box::new(body),
        max_iterations,
        until,
    })
}
