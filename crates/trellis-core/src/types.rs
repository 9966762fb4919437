use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered set of state keys. Ordering keeps every rendering deterministic.
pub type KeySet = BTreeSet<String>;

/// A state snapshot or delta: key → JSON value.
pub type StateMap = serde_json::Map<String, serde_json::Value>;

/// Whether a node's output should reach an end observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Inherently non-observable (pure state plumbing).
    ZeroCost,
    /// Intermediate output that feeds a later step.
    Internal,
    /// Surfaced to the end observer.
    User,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ZeroCost => "zero_cost",
            Self::Internal => "internal",
            Self::User => "user",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node name → inferred visibility.
pub type VisibilityMap = BTreeMap<String, Visibility>;

/// How visibility classes are applied to the event stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityPolicy {
    /// Every non-zero-cost node is user-visible.
    Transparent,
    /// Topology-inferred; internal events are suppressed.
    #[default]
    Filtered,
    /// Same classification as filtered, but events are tagged instead of dropped.
    Annotate,
}

impl fmt::Display for VisibilityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Transparent => "transparent",
            Self::Filtered => "filtered",
            Self::Annotate => "annotate",
        })
    }
}

/// Whether contract diagnostics may block compilation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractMode {
    /// Diagnostics are logged, compilation continues.
    #[default]
    Advisory,
    /// Any error-level diagnostic aborts compilation.
    Strict,
    /// The contract pass is skipped.
    Unchecked,
}

/// Key prefixes whose values live outside the workflow (application or user scope).
pub const EXTERNAL_SCOPES: &[&str] = &["app:", "user:"];

/// True if the key is managed outside the workflow and always available.
pub fn is_external_key(key: &str) -> bool {
    EXTERNAL_SCOPES.iter().any(|p| key.starts_with(p))
}

/// JSON truthiness used by predicates: null, false, 0, "" and empty containers are false.
pub fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_visibility_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Visibility::ZeroCost).unwrap(), "\"zero_cost\"");
        assert_eq!(serde_json::to_string(&Visibility::User).unwrap(), "\"user\"");
        assert!(Visibility::User > Visibility::Internal);
        assert!(Visibility::Internal > Visibility::ZeroCost);
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(0)));
        assert!(is_truthy(&json!("yes")));
        assert!(is_truthy(&json!([1])));
    }

    #[test]
    fn test_external_keys() {
        assert!(is_external_key("app:tenant"));
        assert!(is_external_key("user:name"));
        assert!(!is_external_key("temp:draft"));
        assert!(!is_external_key("topic"));
    }
}
