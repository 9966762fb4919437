use std::collections::HashSet;

use trellis_core::ir::{Node, NodeKind, RouteRule, TapAction, CHECKPOINT_NAME};
use trellis_core::types::KeySet;
use trellis_core::{Result, TrellisError};
use tracing::warn;

use crate::flow::{Contract, Flow, FlowKind};
use crate::naming;

/// Lower a flow expression to an IR tree.
///
/// Children are lowered first so unnamed composites can derive their name
/// from them. Sibling names must be unique.
pub(crate) fn lower(flow: &Flow) -> Result<Node> {
    let (derived, kind) = match &flow.kind {
        FlowKind::Agent(spec) => (String::new(), NodeKind::Leaf(spec.clone())),
        FlowKind::Sequence(steps) => {
            let children = lower_list("sequence", steps)?;
            let names: Vec<&str> = children
                .iter()
                .map(Node::name)
                .filter(|n| *n != CHECKPOINT_NAME)
                .collect();
            let name = if names.len() == children.len() {
                naming::sequence(names)
            } else {
                naming::loop_body(names)
            };
            (name, NodeKind::Sequence { children })
        }
        FlowKind::Parallel(branches) => {
            let children = lower_list("parallel", branches)?;
            let name = naming::parallel(children.iter().map(Node::name));
            (name, NodeKind::Parallel { children })
        }
        FlowKind::Fallback(options) => {
            let children = lower_list("fallback", options)?;
            let name = naming::fallback(children.iter().map(Node::name));
            (name, NodeKind::Fallback { children })
        }
        FlowKind::Race(contenders) => {
            let children = lower_list("race", contenders)?;
            let name = naming::race(children.iter().map(Node::name));
            (name, NodeKind::Race { children })
        }
        FlowKind::Loop {
            body,
            max_iterations,
            until,
        } => {
            let body = lower(body)?;
            let name = match until {
                Some(_) => naming::until(body.name()),
                None => naming::times(body.name(), *max_iterations),
            };
            if *max_iterations == 0 {
                return Err(TrellisError::InvalidBound {
                    node: flow.name.clone().unwrap_or(name),
                    bound: 0,
                });
            }
            (
                name,
                NodeKind::Loop {
                    body: Box::new(body),
                    max_iterations: *max_iterations,
                    until: until.clone(),
                },
            )
        }
        FlowKind::Transform(ops) => {
            let mut seen = HashSet::new();
            let writes: Vec<String> = ops
                .iter()
                .flat_map(|op| op.writes())
                .filter(|k| seen.insert(k.clone()))
                .collect();
            (
                naming::transform(writes.iter().map(String::as_str)),
                NodeKind::Transform { ops: ops.clone() },
            )
        }
        FlowKind::Tap(action) => {
            let name = match action {
                TapAction::Log { keys } => naming::tap(keys),
                TapAction::Checkpoint { .. } => CHECKPOINT_NAME.to_string(),
            };
            (
                name,
                NodeKind::Tap {
                    action: action.clone(),
                },
            )
        }
        FlowKind::Gate {
            predicate,
            message,
            approval_key,
        } => (
            naming::gate(message),
            NodeKind::Gate {
                predicate: predicate.clone(),
                message: message.clone(),
                approval_key: approval_key.clone(),
            },
        ),
        FlowKind::MapOver {
            body,
            list_key,
            item_key,
            output_key,
        } => (
            naming::map_over(list_key),
            NodeKind::MapOver {
                body: Box::new(lower(body)?),
                list_key: list_key.clone(),
                item_key: item_key.clone(),
                output_key: output_key.clone(),
            },
        ),
        FlowKind::Timeout { body, deadline } => {
            let body = lower(body)?;
            (
                naming::timeout(body.name()),
                NodeKind::Timeout {
                    body: Box::new(body),
                    deadline_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                },
            )
        }
        FlowKind::Route { key, rules, default } => {
            if rules.is_empty() && default.is_none() {
                return Err(TrellisError::EmptyComposite {
                    kind: "route".into(),
                });
            }
            let rules = rules
                .iter()
                .map(|(predicate, target)| {
                    Ok(RouteRule {
                        predicate: predicate.clone(),
                        target: lower(target)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let default = default.as_deref().map(lower).transpose()?.map(Box::new);
            (
                naming::route(key),
                NodeKind::Route {
                    key: key.clone(),
                    rules,
                    default,
                },
            )
        }
        FlowKind::Transfer { target, condition } => (
            naming::transfer(target),
            NodeKind::Transfer {
                target: target.clone(),
                condition: condition.clone(),
            },
        ),
        FlowKind::Capture { key } => (
            naming::capture(key),
            NodeKind::Capture { key: key.clone() },
        ),
    };

    let name = flow.name.clone().unwrap_or(derived);
    let node = Node::new(name, kind);
    check_siblings(&node)?;
    Ok(apply_contract(node, &flow.contract))
}

fn lower_list(kind: &str, items: &[Flow]) -> Result<Vec<Node>> {
    if items.is_empty() {
        return Err(TrellisError::EmptyComposite { kind: kind.into() });
    }
    items.iter().map(lower).collect()
}

fn check_siblings(node: &Node) -> Result<()> {
    let mut seen = HashSet::new();
    for child in node.children() {
        if !seen.insert(child.name()) {
            return Err(TrellisError::DuplicateName {
                parent: node.name().to_string(),
                name: child.name().to_string(),
            });
        }
    }
    Ok(())
}

fn apply_contract(mut node: Node, contract: &Contract) -> Node {
    if let Some(schema) = &contract.produces {
        warn_on_disagreement(node.name(), "writes", &contract.writes, &schema.keys());
    }
    if let Some(schema) = &contract.consumes {
        warn_on_disagreement(node.name(), "reads", &contract.reads, &schema.keys());
    }

    node = node
        .with_reads(contract.reads.iter().cloned())
        .with_writes(contract.writes.iter().cloned());
    if let Some(schema) = &contract.produces {
        node = node.with_produces(schema.clone());
    }
    if let Some(schema) = &contract.consumes {
        node = node.with_consumes(schema.clone());
    }
    if let Some(visibility) = contract.visibility {
        node = node.with_visibility(visibility);
    }
    node
}

fn warn_on_disagreement(node: &str, what: &str, explicit: &KeySet, schema: &KeySet) {
    if !explicit.is_empty() && explicit != schema {
        warn!(
            node,
            explicit = ?explicit,
            schema = ?schema,
            "Explicit {} disagree with schema; schema wins",
            what
        );
    }
}
