use serde::{Deserialize, Serialize};

use crate::types::{KeySet, StateMap};

/// One pure state operation. A `Transform` node is an ordered list of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StateOp {
    /// Unconditionally set `key` to `value`.
    Set { key: String, value: serde_json::Value },
    /// Set `key` only if it is absent.
    Default { key: String, value: serde_json::Value },
    /// Copy `from` into `to`, keeping `from`.
    Copy { from: String, to: String },
    /// Move `from` into `to`, removing `from`.
    Rename { from: String, to: String },
    /// Remove `key` (written as null in the delta).
    Drop { key: String },
    /// Join the string forms of `keys` into `into`.
    Merge {
        keys: Vec<String>,
        into: String,
        #[serde(default = "default_separator")]
        separator: String,
    },
}

fn default_separator() -> String {
    "\n".to_string()
}

impl StateOp {
    pub fn set(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::Set {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn default_value(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::Default {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn copy(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::Copy {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn rename(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::Rename {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn drop_key(key: impl Into<String>) -> Self {
        Self::Drop { key: key.into() }
    }

    pub fn merge(keys: Vec<String>, into: impl Into<String>) -> Self {
        Self::Merge {
            keys,
            into: into.into(),
            separator: default_separator(),
        }
    }

    /// Keys this op must find in state.
    pub fn reads(&self) -> KeySet {
        match self {
            Self::Set { .. } | Self::Default { .. } | Self::Drop { .. } => KeySet::new(),
            Self::Copy { from, .. } | Self::Rename { from, .. } => KeySet::from([from.clone()]),
            Self::Merge { keys, .. } => keys.iter().cloned().collect(),
        }
    }

    /// Keys this op writes (a drop writes a tombstone).
    pub fn writes(&self) -> KeySet {
        match self {
            Self::Set { key, .. } | Self::Default { key, .. } | Self::Drop { key } => {
                KeySet::from([key.clone()])
            }
            Self::Copy { to, .. } => KeySet::from([to.clone()]),
            Self::Rename { from, to } => KeySet::from([from.clone(), to.clone()]),
            Self::Merge { into, .. } => KeySet::from([into.clone()]),
        }
    }
}

/// Apply ops in order to a snapshot and return only the delta.
///
/// Later ops observe earlier ops' effects. The input snapshot is not
/// touched.
pub fn apply_ops(ops: &[StateOp], state: &StateMap) -> StateMap {
    let mut view = state.clone();
    let mut delta = StateMap::new();

    fn write(view: &mut StateMap, delta: &mut StateMap, key: &str, value: serde_json::Value) {
        if value.is_null() {
            view.remove(key);
        } else {
            view.insert(key.to_string(), value.clone());
        }
        delta.insert(key.to_string(), value);
    }

    for op in ops {
        match op {
            StateOp::Set { key, value } => write(&mut view, &mut delta, key, value.clone()),
            StateOp::Default { key, value } => {
                if !view.contains_key(key) {
                    write(&mut view, &mut delta, key, value.clone());
                }
            }
            StateOp::Copy { from, to } => {
                if let Some(v) = view.get(from).cloned() {
                    write(&mut view, &mut delta, to, v);
                }
            }
            StateOp::Rename { from, to } => {
                if let Some(v) = view.get(from).cloned() {
                    write(&mut view, &mut delta, to, v);
                    write(&mut view, &mut delta, from, serde_json::Value::Null);
                }
            }
            StateOp::Drop { key } => {
                if view.contains_key(key) {
                    write(&mut view, &mut delta, key, serde_json::Value::Null);
                }
            }
            StateOp::Merge {
                keys,
                into,
                separator,
            } => {
                let joined = keys
                    .iter()
                    .filter_map(|k| view.get(k))
                    .map(|v| match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(separator);
                write(&mut view, &mut delta, into, serde_json::Value::String(joined));
            }
        }
    }

    delta
}
