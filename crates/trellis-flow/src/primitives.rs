use std::time::Duration;

use trellis_core::ir::{TapAction, DEFAULT_ITEM_KEY, DEFAULT_MAP_OUTPUT_KEY};
use trellis_core::predicate::Predicate;
use trellis_core::state_op::StateOp;

use crate::flow::{Flow, FlowKind};
use crate::naming::slug;

/// Observe state without changing it: log the given keys.
pub fn tap<I, S>(keys: I) -> Flow
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Flow::from_kind(FlowKind::Tap(TapAction::Log {
        keys: keys.into_iter().map(Into::into).collect(),
    }))
}

/// Pure state rewrite, applied in order.
pub fn transform(ops: impl IntoIterator<Item = StateOp>) -> Flow {
    Flow::from_kind(FlowKind::Transform(ops.into_iter().collect()))
}

/// Copy the invocation's input message into `key`.
pub fn capture(key: impl Into<String>) -> Flow {
    Flow::from_kind(FlowKind::Capture { key: key.into() })
}

/// Pause for human approval when `predicate` holds.
///
/// The approval key is derived from the message, so the same gate always
/// waits on the same key.
pub fn gate(predicate: Predicate, message: impl Into<String>) -> Flow {
    let message = message.into();
    let approval_key = format!("_gate_{}_approved", slug(&message));
    gate_key(predicate, message, approval_key)
}

/// Like [`gate`], with an explicit approval key.
pub fn gate_key(
    predicate: Predicate,
    message: impl Into<String>,
    approval_key: impl Into<String>,
) -> Flow {
    Flow::from_kind(FlowKind::Gate {
        predicate,
        message: message.into(),
        approval_key: approval_key.into(),
    })
}

/// Wall-clock deadline around `body`. Exceeding it is reported as a
/// timeout failure event.
pub fn timeout(body: impl Into<Flow>, deadline: Duration) -> Flow {
    Flow::from_kind(FlowKind::Timeout {
        body: Box::new(body.into()),
        deadline,
    })
}

/// Hand control to the named node.
pub fn transfer(target: impl Into<String>) -> Flow {
    Flow::from_kind(FlowKind::Transfer {
        target: target.into(),
        condition: None,
    })
}

/// Hand control to the named node when `condition` holds.
pub fn transfer_if(target: impl Into<String>, condition: Predicate) -> Flow {
    Flow::from_kind(FlowKind::Transfer {
        target: target.into(),
        condition: Some(condition),
    })
}

/// Run `body` once per element of the list at `list_key`.
pub fn map_over(list_key: impl Into<String>, body: impl Into<Flow>) -> MapOver {
    MapOver {
        list_key: list_key.into(),
        body: body.into(),
        item_key: DEFAULT_ITEM_KEY.to_string(),
        output_key: DEFAULT_MAP_OUTPUT_KEY.to_string(),
    }
}

/// Builder returned by [`map_over`].
#[derive(Debug, Clone)]
pub struct MapOver {
    list_key: String,
    body: Flow,
    item_key: String,
    output_key: String,
}

impl MapOver {
    /// State key holding the current element inside the body.
    pub fn item_key(mut self, key: impl Into<String>) -> Self {
        self.item_key = key.into();
        self
    }

    /// State key receiving the list of per-element results.
    pub fn output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = key.into();
        self
    }
}

impl From<MapOver> for Flow {
    fn from(m: MapOver) -> Self {
        Flow::from_kind(FlowKind::MapOver {
            body: Box::new(m.body),
            list_key: m.list_key,
            item_key: m.item_key,
            output_key: m.output_key,
        })
    }
}
