use std::ops::{BitOr, Mul, Shr};
use std::time::Duration;

use trellis_core::ir::{AgentSpec, Node, TapAction};
use trellis_core::predicate::Predicate;
use trellis_core::schema::Schema;
use trellis_core::state_op::StateOp;
use trellis_core::types::{KeySet, Visibility};
use trellis_core::Result;

use crate::agent::Agent;
use crate::lower;
use crate::ops::{self, Until};
use crate::route::Routes;

/// Declared contract carried by any builder.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Contract {
    pub reads: KeySet,
    pub writes: KeySet,
    pub produces: Option<Schema>,
    pub consumes: Option<Schema>,
    pub visibility: Option<Visibility>,
}

impl Contract {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone)]
pub(crate) enum FlowKind {
    Agent(AgentSpec),
    Sequence(Vec<Flow>),
    Parallel(Vec<Flow>),
    Loop {
        body: Box<Flow>,
        max_iterations: u32,
        until: Option<Predicate>,
    },
    Transform(Vec<StateOp>),
    Tap(TapAction),
    Fallback(Vec<Flow>),
    Race(Vec<Flow>),
    Gate {
        predicate: Predicate,
        message: String,
        approval_key: String,
    },
    MapOver {
        body: Box<Flow>,
        list_key: String,
        item_key: String,
        output_key: String,
    },
    Timeout {
        body: Box<Flow>,
        deadline: Duration,
    },
    Route {
        key: String,
        rules: Vec<(Predicate, Flow)>,
        default: Option<Box<Flow>>,
    },
    Transfer {
        target: String,
        condition: Option<Predicate>,
    },
    Capture {
        key: String,
    },
}

/// A workflow expression. Cheap to clone, lowered to IR with
/// [`Flow::to_ir`] or [`Flow::build`].
#[derive(Debug, Clone)]
pub struct Flow {
    pub(crate) name: Option<String>,
    pub(crate) kind: FlowKind,
    pub(crate) contract: Contract,
}

impl Flow {
    pub(crate) fn from_kind(kind: FlowKind) -> Self {
        Self {
            name: None,
            kind,
            contract: Contract::default(),
        }
    }

    /// N-ary sequence.
    pub fn sequence(steps: impl IntoIterator<Item = Flow>) -> Self {
        ops::sequence_all(steps)
    }

    /// N-ary parallel fan-out.
    pub fn parallel(branches: impl IntoIterator<Item = Flow>) -> Self {
        ops::parallel_all(branches)
    }

    /// N-ary fallback chain.
    pub fn fallback(options: impl IntoIterator<Item = Flow>) -> Self {
        ops::fallback_all(options)
    }

    /// Give this expression an explicit name. Named composites are never
    /// flattened into their parent.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
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

    /// Force a visibility class, overriding inference.
    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.contract.visibility = Some(visibility);
        self
    }

    /// The explicit name, if one was given.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Human-readable label for error messages.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.kind.tag().to_string(),
        }
    }

    /// The state key this expression's result lands in, if declared.
    /// A sequence reports its last step's key.
    pub fn output_key(&self) -> Option<&str> {
        match &self.kind {
            FlowKind::Agent(spec) => spec.output_key.as_deref(),
            FlowKind::Sequence(steps) => steps.last().and_then(|s| s.output_key()),
            FlowKind::MapOver { output_key, .. } => Some(output_key),
            FlowKind::Capture { key } => Some(key),
            _ => None,
        }
    }

    /// Plain unnamed composites with no contract can be spliced into a
    /// parent of the same kind.
    pub(crate) fn is_anonymous(&self) -> bool {
        self.name.is_none() && self.contract.is_empty()
    }

    /// Lower to IR without consuming the expression. Lowering the same
    /// expression twice yields structurally equal trees.
    pub fn to_ir(&self) -> Result<Node> {
        lower::lower(self)
    }

    /// Lower to IR, consuming the expression.
    pub fn build(self) -> Result<Node> {
        lower::lower(&self)
    }
}

impl FlowKind {
    pub(crate) fn tag(&self) -> &'static str {
        match self {
            Self::Agent(_) => "agent",
            Self::Sequence(_) => "sequence",
            Self::Parallel(_) => "parallel",
            Self::Loop { .. } => "loop",
            Self::Transform(_) => "transform",
            Self::Tap(_) => "tap",
            Self::Fallback(_) => "fallback",
            Self::Race(_) => "race",
            Self::Gate { .. } => "gate",
            Self::MapOver { .. } => "map_over",
            Self::Timeout { .. } => "timeout",
            Self::Route { .. } => "route",
            Self::Transfer { .. } => "transfer",
            Self::Capture { .. } => "capture",
        }
    }
}

/// The composition operators, shared by every builder type.
///
/// All operators consume their operands and return a new `Flow`; clone an
/// operand first to reuse it.
pub trait Compose: Into<Flow> + Sized {
    /// `self` then `next`, in strict order.
    fn then(self, next: impl Into<Flow>) -> Flow {
        ops::sequence(self.into(), next.into())
    }

    /// `self` alongside `other`, concurrently.
    fn with(self, other: impl Into<Flow>) -> Flow {
        ops::parallel(self.into(), other.into())
    }

    /// Try `self`; on failure try `other`.
    fn or_else(self, other: impl Into<Flow>) -> Flow {
        ops::fallback(self.into(), other.into())
    }

    /// Repeat exactly `n` times.
    fn times(self, n: u32) -> Flow {
        ops::repeat(self.into(), n, None)
    }

    /// Repeat until `predicate` holds, at most the default bound.
    fn until(self, predicate: Predicate) -> Flow {
        ops::repeat(self.into(), trellis_core::ir::DEFAULT_MAX_ITERATIONS, Some(predicate))
    }

    /// Repeat until `predicate` holds, at most `max` times.
    fn until_max(self, predicate: Predicate, max: u32) -> Flow {
        ops::repeat(self.into(), max, Some(predicate))
    }

    /// Retry while `predicate` holds: `until_max(not(predicate), max)`.
    fn retry_if(self, predicate: Predicate, max: u32) -> Flow {
        self.until_max(Predicate::not(predicate), max)
    }

    /// Route on this step's declared output key.
    fn branch(self, routes: Routes) -> Result<Flow> {
        routes.attach(self.into())
    }

    /// Bound this step by a wall-clock deadline.
    fn timeout(self, deadline: Duration) -> Flow {
        crate::primitives::timeout(self.into(), deadline)
    }
}

impl Compose for Flow {}
impl Compose for Agent {}

macro_rules! impl_operators {
    ($ty:ty) => {
        impl<R: Into<Flow>> Shr<R> for $ty {
            type Output = Flow;
            fn shr(self, rhs: R) -> Flow {
                Compose::then(self, rhs)
            }
        }

        impl<R: Into<Flow>> BitOr<R> for $ty {
            type Output = Flow;
            fn bitor(self, rhs: R) -> Flow {
                Compose::with(self, rhs)
            }
        }

        impl Mul<u32> for $ty {
            type Output = Flow;
            fn mul(self, n: u32) -> Flow {
                Compose::times(self, n)
            }
        }

        impl Mul<Until> for $ty {
            type Output = Flow;
            fn mul(self, until: Until) -> Flow {
                Compose::until_max(self, until.predicate, until.max)
            }
        }
    };
}

impl_operators!(Flow);
impl_operators!(Agent);
