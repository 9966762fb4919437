use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrellisError};
use crate::types::{is_truthy, KeySet, StateMap};

/// A named, serializable condition over workflow state.
///
/// Predicates are a closed set so that IR trees stay comparable and
/// exportable; nothing here captures a closure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predicate {
    /// `key` holds a truthy value.
    Truthy { key: String },
    /// `key` is present in state (any value, including null).
    Exists { key: String },
    /// `key` equals the given value exactly.
    Equals { key: String, value: serde_json::Value },
    /// `key` is a string containing `needle`.
    Contains { key: String, needle: String },
    Not { inner: Box<Predicate> },
    All { of: Vec<Predicate> },
    Any { of: Vec<Predicate> },
}

impl Predicate {
    pub fn truthy(key: impl Into<String>) -> Self {
        Self::Truthy { key: key.into() }
    }

    pub fn exists(key: impl Into<String>) -> Self {
        Self::Exists { key: key.into() }
    }

    pub fn equals(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::Equals {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn contains(key: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::Contains {
            key: key.into(),
            needle: needle.into(),
        }
    }

    /// Logical negation. Never simplifies `not(not(p))`, so inversion is
    /// always visible in the tree.
    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Predicate) -> Self {
        Self::Not {
            inner: Box::new(inner),
        }
    }

    pub fn all(of: Vec<Predicate>) -> Self {
        Self::All { of }
    }

    pub fn any(of: Vec<Predicate>) -> Self {
        Self::Any { of }
    }

    /// Evaluate against a state snapshot. Missing keys are false.
    pub fn evaluate(&self, state: &StateMap) -> bool {
        match self {
            Self::Truthy { key } => state.get(key).is_some_and(is_truthy),
            Self::Exists { key } => state.contains_key(key),
            Self::Equals { key, value } => state.get(key).is_some_and(|v| v == value),
            Self::Contains { key, needle } => state
                .get(key)
                .and_then(|v| v.as_str())
                .is_some_and(|s| s.contains(needle.as_str())),
            Self::Not { inner } => !inner.evaluate(state),
            Self::All { of } => of.iter().all(|p| p.evaluate(state)),
            Self::Any { of } => of.iter().any(|p| p.evaluate(state)),
        }
    }

    /// Every state key this predicate inspects.
    pub fn keys(&self) -> KeySet {
        let mut keys = KeySet::new();
        self.collect_keys(&mut keys);
        keys
    }

    fn collect_keys(&self, out: &mut KeySet) {
        match self {
            Self::Truthy { key }
            | Self::Exists { key }
            | Self::Equals { key, .. }
            | Self::Contains { key, .. } => {
                out.insert(key.clone());
            }
            Self::Not { inner } => inner.collect_keys(out),
            Self::All { of } | Self::Any { of } => {
                for p in of {
                    p.collect_keys(out);
                }
            }
        }
    }

    /// Parse the textual forms:
    /// - `key` (truthy)
    /// - `!key` (not truthy)
    /// - `key == "value"` / `key != "value"`
    /// - `key contains "substr"`
    pub fn parse(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(TrellisError::InvalidPredicate("empty expression".into()));
        }

        if let Some((key, needle)) = parse_operator(expr, " contains ") {
            let needle = match parse_literal(needle) {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            return Ok(Self::contains(key, needle));
        }
        if let Some((key, value)) = parse_operator(expr, "!=") {
            return Ok(Self::not(Self::equals(key, parse_literal(value))));
        }
        if let Some((key, value)) = parse_operator(expr, "==") {
            return Ok(Self::equals(key, parse_literal(value)));
        }
        if let Some(key) = expr.strip_prefix('!') {
            let key = key.trim();
            if is_identifier(key) {
                return Ok(Self::not(Self::truthy(key)));
            }
        }
        if is_identifier(expr) {
            return Ok(Self::truthy(expr));
        }

        Err(TrellisError::InvalidPredicate(expr.to_string()))
    }
}

/// Parse `key OP value`, returning (key, raw value).
fn parse_operator<'a>(expr: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    let (key, val) = expr.split_once(op)?;
    let key = key.trim();
    if !is_identifier(key) {
        return None;
    }
    Some((key, val.trim()))
}

/// Quoted text is a string; otherwise try JSON (numbers, booleans, null).
fn parse_literal(raw: &str) -> serde_json::Value {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return serde_json::Value::String(raw[1..raw.len() - 1].to_string());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == ':' || c == '.' || c == '-')
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truthy { key } => write!(f, "{key}"),
            Self::Exists { key } => write!(f, "exists({key})"),
            Self::Equals { key, value } => write!(f, "{key} == {value}"),
            Self::Contains { key, needle } => write!(f, "{key} contains {needle:?}"),
            Self::Not { inner } => match inner.as_ref() {
                Self::Equals { key, value } => write!(f, "{key} != {value}"),
                Self::Truthy { key } => write!(f, "!{key}"),
                other => write!(f, "not({other})"),
            },
            Self::All { of } => write_joined(f, of, " && "),
            Self::Any { of } => write_joined(f, of, " || "),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, preds: &[Predicate], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, p) in preds.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{p}")?;
    }
    f.write_str(")")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(pairs: &[(&str, serde_json::Value)]) -> StateMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_condition_equals() {
        let s = state(&[("status", json!("success"))]);
        assert!(Predicate::parse(r#"status == "success""#).unwrap().evaluate(&s));
        assert!(!Predicate::parse(r#"status == "failure""#).unwrap().evaluate(&s));
    }

    #[test]
    fn test_condition_not_equals() {
        let s = state(&[("status", json!("success"))]);
        assert!(Predicate::parse(r#"status != "failure""#).unwrap().evaluate(&s));
        assert!(!Predicate::parse(r#"status != "success""#).unwrap().evaluate(&s));
    }

    #[test]
    fn test_condition_contains() {
        let s = state(&[("output", json!("The file was created successfully."))]);
        assert!(Predicate::parse(r#"output contains "created""#).unwrap().evaluate(&s));
        assert!(!Predicate::parse(r#"output contains "deleted""#).unwrap().evaluate(&s));
    }

    #[test]
    fn test_condition_missing_key() {
        let s = StateMap::new();
        assert!(!Predicate::parse(r#"missing == "value""#).unwrap().evaluate(&s));
        assert!(!Predicate::truthy("missing").evaluate(&s));
        assert!(Predicate::parse("!missing").unwrap().evaluate(&s));
    }

    #[test]
    fn test_condition_invalid_expr() {
        assert!(Predicate::parse("this is not valid").is_err());
        assert!(Predicate::parse("   ").is_err());
    }

    #[test]
    fn test_numeric_literal() {
        let s = state(&[("score", json!(9))]);
        assert!(Predicate::parse("score == 9").unwrap().evaluate(&s));
    }

    #[test]
    fn test_keys_collects_nested() {
        let p = Predicate::all(vec![
            Predicate::truthy("approved"),
            Predicate::not(Predicate::equals("status", "draft")),
        ]);
        let keys: Vec<_> = p.keys().into_iter().collect();
        assert_eq!(keys, vec!["approved", "status"]);
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for expr in ["done", "!done", r#"status != "ok""#, r#"status == "ok""#] {
            let p = Predicate::parse(expr).unwrap();
            assert_eq!(Predicate::parse(&p.to_string()).unwrap(), p);
        }
    }

    #[test]
    fn test_serialization() {
        let p = Predicate::not(Predicate::truthy("done"));
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["type"], "not");
        let back: Predicate = serde_json::from_value(json).unwrap();
        assert_eq!(back, p);
    }
}
