use serde::{Deserialize, Serialize};

use crate::predicate::Predicate;
use crate::schema::Schema;
use crate::state_op::StateOp;
use crate::types::{KeySet, Visibility};

use super::agent::AgentSpec;

/// Header shared by every node: identity and declared contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMeta {
    name: String,
    #[serde(default, skip_serializing_if = "KeySet::is_empty")]
    reads: KeySet,
    #[serde(default, skip_serializing_if = "KeySet::is_empty")]
    writes: KeySet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    produces: Option<Schema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    consumes: Option<Schema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    visibility: Option<Visibility>,
}

/// What a `Tap` does with the state it observes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TapAction {
    /// Emit the listed keys to the log.
    Log { keys: Vec<String> },
    /// Evaluate a loop exit predicate and escalate when it holds.
    Checkpoint { until: Predicate },
}

/// One arm of a `Route`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRule {
    pub predicate: Predicate,
    pub target: Node,
}

/// The node kinds. Composite kinds own their children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Leaf(AgentSpec),
    Sequence {
        children: Vec<Node>,
    },
    Parallel {
        children: Vec<Node>,
    },
    Loop {
        body: Box<Node>,
        max_iterations: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        until: Option<Predicate>,
    },
    Transform {
        ops: Vec<StateOp>,
    },
    Tap {
        action: TapAction,
    },
    Fallback {
        children: Vec<Node>,
    },
    Race {
        children: Vec<Node>,
    },
    Gate {
        predicate: Predicate,
        message: String,
        approval_key: String,
    },
    MapOver {
        body: Box<Node>,
        list_key: String,
        item_key: String,
        output_key: String,
    },
    Timeout {
        body: Box<Node>,
        deadline_ms: u64,
    },
    Route {
        key: String,
        rules: Vec<RouteRule>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<Box<Node>>,
    },
    Transfer {
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<Predicate>,
    },
    Capture {
        key: String,
    },
}

impl NodeKind {
    /// Short lowercase tag, matching the serialized `type`.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Leaf(_) => "leaf",
            Self::Sequence { .. } => "sequence",
            Self::Parallel { .. } => "parallel",
            Self::Loop { .. } => "loop",
            Self::Transform { .. } => "transform",
            Self::Tap { .. } => "tap",
            Self::Fallback { .. } => "fallback",
            Self::Race { .. } => "race",
            Self::Gate { .. } => "gate",
            Self::MapOver { .. } => "map_over",
            Self::Timeout { .. } => "timeout",
            Self::Route { .. } => "route",
            Self::Transfer { .. } => "transfer",
            Self::Capture { .. } => "capture",
        }
    }

    /// Keys the kind reads by construction, independent of declarations.
    fn intrinsic_reads(&self) -> KeySet {
        match self {
            Self::Transform { ops } => ops.iter().flat_map(|op| op.reads()).collect(),
            Self::Tap {
                action: TapAction::Log { keys },
            } => keys.iter().cloned().collect(),
            Self::Tap {
                action: TapAction::Checkpoint { until },
            } => until.keys(),
            Self::Gate { predicate, .. } => predicate.keys(),
            Self::MapOver { list_key, .. } => KeySet::from([list_key.clone()]),
            Self::Route { key, .. } => KeySet::from([key.clone()]),
            Self::Transfer {
                condition: Some(condition),
                ..
            } => condition.keys(),
            _ => KeySet::new(),
        }
    }

    /// Keys the kind writes by construction, independent of declarations.
    fn intrinsic_writes(&self) -> KeySet {
        match self {
            Self::Leaf(spec) => spec.output_key.iter().cloned().collect(),
            Self::Transform { ops } => ops.iter().flat_map(|op| op.writes()).collect(),
            Self::MapOver { output_key, .. } => KeySet::from([output_key.clone()]),
            Self::Capture { key } => KeySet::from([key.clone()]),
            _ => KeySet::new(),
        }
    }
}

/// An immutable IR node. Fields are private; build with [`Node::new`] and
/// the `with_*` constructors, then read through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(flatten)]
    meta: NodeMeta,
    kind: NodeKind,
}

impl Node {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            meta: NodeMeta {
                name: name.into(),
                reads: KeySet::new(),
                writes: KeySet::new(),
                produces: None,
                consumes: None,
                visibility: None,
            },
            kind,
        }
    }

    pub fn with_reads(mut self, keys: impl IntoIterator<Item = String>) -> Self {
        self.meta.reads.extend(keys);
        self
    }

    pub fn with_writes(mut self, keys: impl IntoIterator<Item = String>) -> Self {
        self.meta.writes.extend(keys);
        self
    }

    pub fn with_produces(mut self, schema: Schema) -> Self {
        self.meta.produces = Some(schema);
        self
    }

    pub fn with_consumes(mut self, schema: Schema) -> Self {
        self.meta.consumes = Some(schema);
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.meta.visibility = Some(visibility);
        self
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn produces(&self) -> Option<&Schema> {
        self.meta.produces.as_ref()
    }

    pub fn consumes(&self) -> Option<&Schema> {
        self.meta.consumes.as_ref()
    }

    /// Explicit visibility override, if any.
    pub fn visibility_override(&self) -> Option<Visibility> {
        self.meta.visibility
    }

    /// Explicitly declared reads, before schema resolution.
    pub fn declared_reads(&self) -> &KeySet {
        &self.meta.reads
    }

    /// Explicitly declared writes, before schema resolution.
    pub fn declared_writes(&self) -> &KeySet {
        &self.meta.writes
    }

    /// Effective reads: the `consumes` schema's fields when present (the
    /// schema wins over explicit keys), plus keys the kind reads intrinsically.
    pub fn reads(&self) -> KeySet {
        let mut keys = match &self.meta.consumes {
            Some(schema) => schema.keys(),
            None => self.meta.reads.clone(),
        };
        keys.extend(self.kind.intrinsic_reads());
        keys
    }

    /// Effective writes: the `produces` schema's fields when present, plus
    /// keys the kind writes intrinsically (output key, transform targets...).
    pub fn writes(&self) -> KeySet {
        let mut keys = match &self.meta.produces {
            Some(schema) => schema.keys(),
            None => self.meta.writes.clone(),
        };
        keys.extend(self.kind.intrinsic_writes());
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;

    fn leaf(name: &str) -> Node {
        Node::new(name, NodeKind::Leaf(AgentSpec::default()))
    }

    #[test]
    fn test_schema_wins_over_explicit_keys() {
        let node = leaf("a")
            .with_writes(["x".to_string()])
            .with_produces(Schema::new("Out").field("f1", FieldType::String));
        assert_eq!(node.writes(), KeySet::from(["f1".to_string()]));
        assert_eq!(node.declared_writes(), &KeySet::from(["x".to_string()]));
    }

    #[test]
    fn test_output_key_is_intrinsic_write() {
        let spec = AgentSpec {
            output_key: Some("intent".into()),
            ..AgentSpec::default()
        };
        let node = Node::new("classifier", NodeKind::Leaf(spec))
            .with_produces(Schema::new("Intent").field("label", FieldType::String));
        let writes: Vec<_> = node.writes().into_iter().collect();
        assert_eq!(writes, vec!["intent", "label"]);
    }

    #[test]
    fn test_route_reads_its_key() {
        let node = Node::new(
            "route_intent",
            NodeKind::Route {
                key: "intent".into(),
                rules: vec![],
                default: None,
            },
        );
        assert!(node.reads().contains("intent"));
        assert!(node.writes().is_empty());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let node = Node::new(
            "pipeline",
            NodeKind::Sequence {
                children: vec![leaf("a"), leaf("b").with_reads(["x".to_string()])],
            },
        );
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["name"], "pipeline");
        assert_eq!(json["kind"]["type"], "sequence");
        let parsed: Node = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, node);
    }
}
