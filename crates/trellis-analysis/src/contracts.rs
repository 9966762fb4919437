//! Data-flow contract checking.
//!
//! A single forward pass over the tree keeps the set of keys available at
//! each point. Reads and required template placeholders must already be
//! available; writes become available to later steps. Branching kinds check
//! each branch against the same snapshot and then merge: `Parallel` adds the
//! union of its branches, `Fallback`, `Race` and `Route` only the keys every
//! branch produces.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use trellis_core::ir::{Node, NodeKind};
use trellis_core::types::{is_external_key, KeySet};

use crate::template;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// One finding, attached to the node it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub node: String,
    pub message: String,
}

impl Diagnostic {
    pub fn error(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            node: node.into(),
            message: message.into(),
        }
    }

    pub fn info(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Info,
            node: node.into(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagnosticLevel::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.level, self.node, self.message)
    }
}

/// Convenience queries over a diagnostics list.
pub trait Diagnostics {
    fn has_errors(&self) -> bool;
    fn errors(&self) -> Vec<&Diagnostic>;
    fn at_least(&self, level: DiagnosticLevel) -> Vec<&Diagnostic>;
}

impl Diagnostics for [Diagnostic] {
    fn has_errors(&self) -> bool {
        self.iter().any(Diagnostic::is_error)
    }

    fn errors(&self) -> Vec<&Diagnostic> {
        self.at_least(DiagnosticLevel::Error)
    }

    fn at_least(&self, level: DiagnosticLevel) -> Vec<&Diagnostic> {
        self.iter().filter(|d| d.level >= level).collect()
    }
}

/// Check `root` starting from an empty state.
pub fn check(root: &Node) -> Vec<Diagnostic> {
    check_with(root, KeySet::new())
}

/// Check `root` with `seed` keys already present in state.
pub fn check_with(root: &Node, seed: KeySet) -> Vec<Diagnostic> {
    let mut checker = Checker::default();
    let mut available = seed;
    checker.visit(root, &mut available, false);
    checker.finish()
}

pub fn missing_key_message(key: &str) -> String {
    format!("consumes key '{key}' but no prior step produces it")
}

#[derive(Debug)]
struct Writer {
    node: String,
    keys: KeySet,
    terminal: bool,
    consumed: bool,
}

/// Writers whose value for a key may still be observed, by key. Several
/// entries per key after mutually exclusive or parallel branches.
type LiveWriters = HashMap<String, Vec<usize>>;

#[derive(Debug, Default)]
struct Checker {
    diagnostics: Vec<Diagnostic>,
    writers: Vec<Writer>,
    live: LiveWriters,
}

impl Checker {
    fn error(&mut self, node: &str, message: String) {
        self.diagnostics.push(Diagnostic::error(node, message));
    }

    fn info(&mut self, node: &str, message: String) {
        self.diagnostics.push(Diagnostic::info(node, message));
    }

    fn finish(mut self) -> Vec<Diagnostic> {
        let dead: Vec<Diagnostic> = self
            .writers
            .iter()
            .filter(|w| !w.terminal && !w.consumed)
            .map(|w| {
                let keys: Vec<String> = w.keys.iter().map(|k| format!("'{k}'")).collect();
                Diagnostic::info(
                    &w.node,
                    format!(
                        "writes {} but no later step consumes it (likely dead output)",
                        keys.join(", ")
                    ),
                )
            })
            .collect();
        self.diagnostics.extend(dead);
        self.diagnostics
    }

    /// Mark every live writer of `key` as consumed.
    fn consume(&mut self, key: &str) {
        if let Some(indices) = self.live.get(key) {
            for &idx in indices {
                self.writers[idx].consumed = true;
            }
        }
    }

    /// Report every key in `keys` missing from `available`, once each.
    fn require(&mut self, node: &str, keys: &KeySet, available: &KeySet) {
        for key in keys {
            self.consume(key);
            if !available.contains(key) && !is_external_key(key) {
                self.error(node, missing_key_message(key));
            }
        }
    }

    fn record_writes(&mut self, node: &str, keys: KeySet, available: &mut KeySet, terminal: bool) {
        if keys.is_empty() {
            return;
        }
        for key in &keys {
            if available.contains(key) && !is_external_key(key) {
                self.info(node, format!("re-writes key '{key}' already produced upstream"));
            }
        }
        let idx = self.writers.len();
        for key in &keys {
            self.live.insert(key.clone(), vec![idx]);
        }
        available.extend(keys.iter().cloned());
        self.writers.push(Writer {
            node: node.to_string(),
            keys,
            terminal,
            consumed: false,
        });
    }

    fn visit(&mut self, node: &Node, available: &mut KeySet, has_successor: bool) {
        let name = node.name();
        match node.kind() {
            NodeKind::Sequence { children } => {
                self.require(name, &node.reads(), available);
                let last = children.len().saturating_sub(1);
                for (i, child) in children.iter().enumerate() {
                    self.visit(child, available, i < last || has_successor);
                }
                available.extend(node.writes());
            }
            NodeKind::Loop { body, .. } | NodeKind::Timeout { body, .. } => {
                self.require(name, &node.reads(), available);
                let inner = matches!(node.kind(), NodeKind::Loop { .. }) || has_successor;
                self.visit(body, available, inner);
                available.extend(node.writes());
            }
            NodeKind::MapOver { body, item_key, .. } => {
                self.require(name, &node.reads(), available);
                let mut scope = available.clone();
                scope.insert(item_key.clone());
                let outer = self.live.clone();
                let first = self.writers.len();
                self.visit(body, &mut scope, true);
                // Per-item results feed the aggregate output key.
                let fed: Vec<usize> = self
                    .live
                    .values()
                    .flatten()
                    .copied()
                    .filter(|&idx| idx >= first)
                    .collect();
                for idx in fed {
                    self.writers[idx].consumed = true;
                }
                self.live = outer;
                self.record_writes(name, node.writes(), available, !has_successor);
            }
            NodeKind::Parallel { children } => {
                self.require(name, &node.reads(), available);
                let snapshot = available.clone();
                let before = self.live.clone();
                let mut merged = LiveWriters::new();
                for child in children {
                    let mut branch = snapshot.clone();
                    self.live = before.clone();
                    self.visit(child, &mut branch, true);
                    available.extend(branch);
                    union_into(&mut merged, &self.live);
                }
                if !children.is_empty() {
                    self.live = merged;
                }
                available.extend(node.writes());
            }
            NodeKind::Fallback { children } | NodeKind::Race { children } => {
                self.require(name, &node.reads(), available);
                let branches: Vec<&Node> = children.iter().collect();
                self.merge_exclusive(&branches, available, has_successor);
                available.extend(node.writes());
            }
            NodeKind::Route { key, rules, .. } => {
                self.consume(key);
                if !available.contains(key) && !is_external_key(key) {
                    self.error(name, format!("routes on key '{key}' but no prior step produces it"));
                }
                let mut reads = node.reads();
                reads.extend(rules.iter().flat_map(|r| r.predicate.keys()));
                reads.remove(key);
                self.require(name, &reads, available);
                let arms = node.children();
                self.merge_exclusive(&arms, available, has_successor);
                available.extend(node.writes());
            }
            NodeKind::Leaf(spec) => {
                let mut reads = node.reads();
                if let Some(instruction) = &spec.instruction {
                    reads.extend(template::required_keys(instruction));
                }
                self.require(name, &reads, available);
                self.record_writes(name, node.writes(), available, !has_successor);
            }
            NodeKind::Transform { .. }
            | NodeKind::Tap { .. }
            | NodeKind::Gate { .. }
            | NodeKind::Transfer { .. }
            | NodeKind::Capture { .. } => {
                self.require(name, &node.reads(), available);
                self.record_writes(name, node.writes(), available, !has_successor);
            }
        }
    }

    /// Check mutually exclusive branches from one snapshot; only keys every
    /// branch makes available survive.
    fn merge_exclusive(&mut self, branches: &[&Node], available: &mut KeySet, has_successor: bool) {
        let snapshot = available.clone();
        let before = self.live.clone();
        let mut merged = LiveWriters::new();
        let mut common: Option<KeySet> = None;
        for branch in branches {
            let mut scope = snapshot.clone();
            self.live = before.clone();
            self.visit(branch, &mut scope, has_successor);
            union_into(&mut merged, &self.live);
            common = Some(match common {
                None => scope,
                Some(prev) => prev.intersection(&scope).cloned().collect(),
            });
        }
        self.live = if branches.is_empty() { before } else { merged };
        if let Some(keys) = common {
            available.extend(keys);
        }
    }
}

fn union_into(merged: &mut LiveWriters, branch: &LiveWriters) {
    for (key, indices) in branch {
        let entry = merged.entry(key.clone()).or_default();
        for &idx in indices {
            if !entry.contains(&idx) {
                entry.push(idx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::schema::{FieldType, Schema};
    use trellis_core::Predicate;
    use trellis_flow::{capture, map_over, race, tap, Agent, Compose, Flow, Routes};

    fn errors_for(flow: Flow) -> Vec<Diagnostic> {
        let diags = check(&flow.build().unwrap());
        diags.into_iter().filter(Diagnostic::is_error).collect()
    }

    #[test]
    fn test_valid_chain_has_no_errors() {
        let flow = Agent::new("research").outputs("findings")
            >> Agent::new("write").instruct("Write up {findings}.").outputs("draft")
            >> Agent::new("edit").reads(["draft"]);
        assert!(errors_for(flow).is_empty());
    }

    #[test]
    fn test_missing_producer_named() {
        let flow = Agent::new("a") >> Agent::new("b").reads(["summary"]);
        let errors = errors_for(flow);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].node, "b");
        assert_eq!(errors[0].message, "consumes key 'summary' but no prior step produces it");
    }

    #[test]
    fn test_template_placeholder_same_message() {
        let by_read = errors_for(Agent::new("a") >> Agent::new("b").reads(["topic"]));
        let by_template = errors_for(Agent::new("a") >> Agent::new("b").instruct("About {topic}"));
        assert_eq!(by_read, by_template);
    }

    #[test]
    fn test_placeholder_and_read_reported_once() {
        let flow = Agent::new("a") >> Agent::new("b").reads(["topic"]).instruct("About {topic}");
        assert_eq!(errors_for(flow).len(), 1);
    }

    #[test]
    fn test_optional_placeholder_skipped() {
        let flow = Agent::new("a") >> Agent::new("b").instruct("Tone: {tone?}");
        assert!(errors_for(flow).is_empty());
    }

    #[test]
    fn test_schema_mismatch_reports_single_missing_field() {
        let a = Agent::new("a").produces(
            Schema::new("Out")
                .field("f1", FieldType::String)
                .field("f2", FieldType::String),
        );
        let b = Agent::new("b").consumes(
            Schema::new("In")
                .field("f1", FieldType::String)
                .field("f2", FieldType::String)
                .field("f3", FieldType::String),
        );
        let errors = errors_for(a >> b);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("'f3'"));
    }

    #[test]
    fn test_external_scopes_assumed_available() {
        let flow = Agent::new("a").reads(["app:tenant", "user:name"]) >> Agent::new("b");
        assert!(errors_for(flow).is_empty());
    }

    #[test]
    fn test_seed_keys() {
        let node = Agent::new("a").reads(["question"]).build().unwrap();
        assert!(check(&node).has_errors());
        assert!(!check_with(&node, KeySet::from(["question".to_string()])).has_errors());
    }

    #[test]
    fn test_duplicate_write_is_info() {
        let flow = Agent::new("a").outputs("x") >> Agent::new("b").outputs("x");
        let diags = check(&flow.build().unwrap());
        assert!(!diags.has_errors());
        assert!(diags
            .iter()
            .any(|d| d.level == DiagnosticLevel::Info && d.message.contains("re-writes key 'x'")));
    }

    #[test]
    fn test_dead_output_is_info() {
        let flow = Agent::new("a").outputs("unused") >> Agent::new("b");
        let diags = check(&flow.build().unwrap());
        assert!(!diags.has_errors());
        let dead: Vec<_> = diags.iter().filter(|d| d.message.contains("dead output")).collect();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].node, "a");
    }

    #[test]
    fn test_terminal_writer_not_dead() {
        let flow = Agent::new("a") >> Agent::new("b").outputs("answer");
        let diags = check(&flow.build().unwrap());
        assert!(diags.is_empty());
    }

    fn dead_outputs(flow: Flow) -> Vec<Diagnostic> {
        check(&flow.build().unwrap())
            .into_iter()
            .filter(|d| d.message.contains("dead output"))
            .collect()
    }

    #[test]
    fn test_fallback_writers_all_consumed() {
        let flow = Agent::new("fast")
            .outputs("answer")
            .or_else(Agent::new("slow").outputs("answer"))
            >> Agent::new("use").reads(["answer"]);
        assert!(dead_outputs(flow).is_empty());
    }

    #[test]
    fn test_route_arm_writers_all_consumed() {
        let flow = Agent::new("classify")
            .outputs("intent")
            .branch(
                Routes::new()
                    .when("billing", Agent::new("billing").outputs("answer"))
                    .when("tech", Agent::new("tech").outputs("answer")),
            )
            .unwrap()
            >> Agent::new("reply").reads(["answer"]);
        assert!(dead_outputs(flow).is_empty());
    }

    #[test]
    fn test_parallel_writers_all_consumed() {
        let flow = (Agent::new("left").outputs("notes") | Agent::new("right").outputs("notes"))
            >> Agent::new("join").reads(["notes"]);
        assert!(dead_outputs(flow).is_empty());
    }

    #[test]
    fn test_sequential_rewrite_replaces_writers() {
        let flow = (Agent::new("fast").outputs("answer")
            | Agent::new("slow").outputs("answer"))
            >> Agent::new("final").outputs("answer")
            >> Agent::new("use").reads(["answer"]);
        let dead: Vec<String> = dead_outputs(flow).into_iter().map(|d| d.node).collect();
        assert_eq!(dead, vec!["fast", "slow"]);
    }

    #[test]
    fn test_map_over_body_feeds_aggregate() {
        let flow = capture("docs")
            >> map_over("docs", Agent::new("summarize").instruct("Summarize {_item}").outputs("summary"))
            >> Agent::new("report").reads(["results"]);
        assert!(dead_outputs(flow).is_empty());
    }

    #[test]
    fn test_route_key_must_be_available() {
        let node = Flow::from(trellis_flow::Route::on("intent").when(
            Predicate::equals("intent", "billing"),
            Agent::new("billing"),
        ))
        .build()
        .unwrap();
        let diags = check(&node);
        assert_eq!(diags.errors().len(), 1);
        assert!(diags[0].message.starts_with("routes on key 'intent'"));
    }

    #[test]
    fn test_route_branches_checked_independently() {
        let flow = Agent::new("classify")
            .outputs("intent")
            .branch(
                Routes::new()
                    .when("billing", Agent::new("billing").outputs("invoice"))
                    .when("tech", Agent::new("tech").reads(["invoice"])),
            )
            .unwrap();
        let errors = errors_for(flow);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].node, "tech");
    }

    #[test]
    fn test_parallel_siblings_isolated_then_union() {
        let fan = Agent::new("left").outputs("l") | Agent::new("right").reads(["l"]).outputs("r");
        let flow = fan >> Agent::new("join").reads(["l", "r"]);
        let errors = errors_for(flow);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].node, "right");
    }

    #[test]
    fn test_fallback_exposes_only_common_writes() {
        let options = Agent::new("fast")
            .writes(["answer", "fast_meta"])
            .or_else(Agent::new("slow").writes(["answer"]));
        let flow = options >> Agent::new("use").reads(["answer", "fast_meta"]);
        let errors = errors_for(flow);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("'fast_meta'"));
    }

    #[test]
    fn test_race_exposes_only_common_writes() {
        let flow = race([
            Agent::new("a").outputs("x"),
            Agent::new("b").writes(["x", "y"]),
        ]) >> Agent::new("c").reads(["x", "y"]);
        let errors = errors_for(flow);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("'y'"));
    }

    #[test]
    fn test_map_over_item_scoped_to_body() {
        let flow = capture("docs")
            >> map_over("docs", Agent::new("summarize").instruct("Summarize {_item}"))
            >> Agent::new("report").reads(["results"])
            >> Agent::new("leak").reads(["_item"]);
        let errors = errors_for(flow);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].node, "leak");
    }

    #[test]
    fn test_map_over_requires_list() {
        let errors = errors_for(Flow::from(map_over("docs", Agent::new("summarize"))));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("'docs'"));
    }

    #[test]
    fn test_loop_checkpoint_reads_predicate_keys() {
        let flow = Agent::new("draft").until(Predicate::truthy("approved"));
        let errors = errors_for(flow);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].node, "_until_check");

        let flow = Agent::new("review").outputs("approved").until(Predicate::truthy("approved"));
        assert!(errors_for(flow).is_empty());
    }

    #[test]
    fn test_tap_reads_are_checked() {
        let errors = errors_for(capture("q") >> tap(["q", "missing"]));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_display_and_serde_shape() {
        let d = Diagnostic::error("b", missing_key_message("k"));
        assert_eq!(d.to_string(), "error [b]: consumes key 'k' but no prior step produces it");
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["level"], "error");
        assert_eq!(json["node"], "b");
        assert!(DiagnosticLevel::Error > DiagnosticLevel::Warning);
    }
}
