//! Graph export - render an IR tree as Mermaid or DOT.
//!
//! Node ids are derived from the node's path in the tree (`n0`, `n0_1`,
//! `n0_1_0`...), so two nodes with the same name never collide and the
//! output is byte-identical across calls.
//!
//! Edges follow control flow:
//! - a sequence points at its first step, and each step at the next
//! - fan-out kinds (parallel, fallback, race) point at every child
//! - loops, map-over and timeouts point at their body, labelled with the bound
//! - routes point at every arm, labelled with the rule's predicate

use std::fmt::Write;

use serde::{Deserialize, Serialize};
use trellis_core::ir::{Node, NodeKind};
use trellis_core::types::KeySet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphFormat {
    #[default]
    Mermaid,
    Dot,
}

#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub format: GraphFormat,
    /// Annotate each node with its reads and writes.
    pub include_details: bool,
    pub title: Option<String>,
}

impl ExportOptions {
    pub fn mermaid() -> Self {
        Self {
            format: GraphFormat::Mermaid,
            ..Default::default()
        }
    }

    pub fn dot() -> Self {
        Self {
            format: GraphFormat::Dot,
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_details(mut self) -> Self {
        self.include_details = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Step,
    Composite,
    Plumbing,
    Decision,
    Pause,
}

struct GraphNode {
    id: String,
    name: String,
    tag: &'static str,
    shape: Shape,
    reads: KeySet,
    writes: KeySet,
}

struct GraphEdge {
    from: String,
    to: String,
    label: Option<String>,
}

#[derive(Default)]
struct Graph {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

impl Graph {
    fn edge(&mut self, from: &str, to: &str, label: Option<String>) {
        self.edges.push(GraphEdge {
            from: from.to_string(),
            to: to.to_string(),
            label,
        });
    }

    fn add(&mut self, node: &Node, id: String) {
        let shape = match node.kind() {
            NodeKind::Route { .. } => Shape::Decision,
            NodeKind::Gate { .. } => Shape::Pause,
            _ if node.is_zero_cost() => Shape::Plumbing,
            _ if node.is_composite() => Shape::Composite,
            _ => Shape::Step,
        };
        self.nodes.push(GraphNode {
            id: id.clone(),
            name: node.name().to_string(),
            tag: node.kind().tag(),
            shape,
            reads: node.reads(),
            writes: node.writes(),
        });

        let child_id = |i: usize| format!("{id}_{i}");
        match node.kind() {
            NodeKind::Sequence { children } => {
                let mut prev = id.clone();
                for (i, child) in children.iter().enumerate() {
                    let cid = child_id(i);
                    self.add(child, cid.clone());
                    self.edge(&prev, &cid, None);
                    prev = cid;
                }
            }
            NodeKind::Parallel { children }
            | NodeKind::Fallback { children }
            | NodeKind::Race { children } => {
                let fallback = matches!(node.kind(), NodeKind::Fallback { .. });
                for (i, child) in children.iter().enumerate() {
                    let cid = child_id(i);
                    self.add(child, cid.clone());
                    let label = fallback.then(|| format!("try {}", i + 1));
                    self.edge(&id, &cid, label);
                }
            }
            NodeKind::Loop {
                body,
                max_iterations,
                until,
            } => {
                let cid = child_id(0);
                self.add(body, cid.clone());
                let label = match until {
                    Some(p) => format!("until {p} (max {max_iterations})"),
                    None => format!("x{max_iterations}"),
                };
                self.edge(&id, &cid, Some(label));
            }
            NodeKind::MapOver { body, list_key, .. } => {
                let cid = child_id(0);
                self.add(body, cid.clone());
                self.edge(&id, &cid, Some(format!("each {list_key}")));
            }
            NodeKind::Timeout { body, deadline_ms } => {
                let cid = child_id(0);
                self.add(body, cid.clone());
                self.edge(&id, &cid, Some(format!("{deadline_ms}ms")));
            }
            NodeKind::Route { rules, default, .. } => {
                for (i, rule) in rules.iter().enumerate() {
                    let cid = child_id(i);
                    self.add(&rule.target, cid.clone());
                    self.edge(&id, &cid, Some(rule.predicate.to_string()));
                }
                if let Some(default) = default {
                    let cid = child_id(rules.len());
                    self.add(default, cid.clone());
                    self.edge(&id, &cid, Some("otherwise".to_string()));
                }
            }
            NodeKind::Leaf(_)
            | NodeKind::Transform { .. }
            | NodeKind::Tap { .. }
            | NodeKind::Gate { .. }
            | NodeKind::Transfer { .. }
            | NodeKind::Capture { .. } => {}
        }
    }
}

/// Render `root` in the format selected by `options`.
pub fn export(root: &Node, options: &ExportOptions) -> String {
    let mut graph = Graph::default();
    graph.add(root, "n0".to_string());
    match options.format {
        GraphFormat::Mermaid => render_mermaid(&graph, options),
        GraphFormat::Dot => render_dot(&graph, options),
    }
}

fn keys(set: &KeySet) -> String {
    set.iter().cloned().collect::<Vec<_>>().join(", ")
}

fn label_lines(node: &GraphNode, details: bool) -> Vec<String> {
    let mut lines = vec![node.name.clone()];
    if node.shape == Shape::Composite {
        lines[0] = format!("{} ({})", node.name, node.tag);
    }
    if details {
        if !node.reads.is_empty() {
            lines.push(format!("reads: {}", keys(&node.reads)));
        }
        if !node.writes.is_empty() {
            lines.push(format!("writes: {}", keys(&node.writes)));
        }
    }
    lines
}

fn render_mermaid(graph: &Graph, options: &ExportOptions) -> String {
    let mut out = String::new();
    if let Some(title) = &options.title {
        let _ = writeln!(out, "---\ntitle: {}\n---", escape_mermaid(title));
    }
    out.push_str("graph TD\n");

    for node in &graph.nodes {
        let label = label_lines(node, options.include_details)
            .iter()
            .map(|l| escape_mermaid(l))
            .collect::<Vec<_>>()
            .join("<br/>");
        let (open, close) = match node.shape {
            Shape::Step => ("[", "]"),
            Shape::Composite => ("[[", "]]"),
            Shape::Plumbing => ("([", "])"),
            Shape::Decision => ("{", "}"),
            Shape::Pause => ("{{", "}}"),
        };
        let _ = writeln!(out, "    {}{}\"{}\"{}", node.id, open, label, close);
    }

    for edge in &graph.edges {
        match &edge.label {
            Some(label) => {
                let _ = writeln!(
                    out,
                    "    {} -->|\"{}\"| {}",
                    edge.from,
                    escape_mermaid(label),
                    edge.to
                );
            }
            None => {
                let _ = writeln!(out, "    {} --> {}", edge.from, edge.to);
            }
        }
    }
    out
}

fn render_dot(graph: &Graph, options: &ExportOptions) -> String {
    let mut out = String::new();
    out.push_str("digraph G {\n");
    out.push_str("    rankdir=TB;\n");
    out.push_str("    node [shape=box, style=rounded];\n");
    if let Some(title) = &options.title {
        out.push_str("    labelloc=\"t\";\n");
        let _ = writeln!(out, "    label=\"{}\";", escape_dot(title));
    }

    for node in &graph.nodes {
        let label = label_lines(node, options.include_details)
            .iter()
            .map(|l| escape_dot(l))
            .collect::<Vec<_>>()
            .join("\\n");
        let attrs = match node.shape {
            Shape::Step => "",
            Shape::Composite => ", style=\"rounded,dashed\"",
            Shape::Plumbing => ", shape=ellipse",
            Shape::Decision => ", shape=diamond",
            Shape::Pause => ", shape=hexagon",
        };
        let _ = writeln!(out, "    \"{}\" [label=\"{}\"{}];", node.id, label, attrs);
    }

    for edge in &graph.edges {
        match &edge.label {
            Some(label) => {
                let _ = writeln!(
                    out,
                    "    \"{}\" -> \"{}\" [label=\"{}\"];",
                    edge.from,
                    edge.to,
                    escape_dot(label)
                );
            }
            None => {
                let _ = writeln!(out, "    \"{}\" -> \"{}\";", edge.from, edge.to);
            }
        }
    }
    out.push_str("}\n");
    out
}

fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn escape_mermaid(s: &str) -> String {
    s.replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::Predicate;
    use trellis_flow::{capture, Agent, Compose, Routes};

    fn router() -> Node {
        (capture("question")
            >> Agent::new("classify").reads(["question"]).outputs("intent"))
        .branch(
            Routes::new()
                .when("billing", Agent::new("billing"))
                .otherwise(Agent::new("general")),
        )
        .unwrap()
        .build()
        .unwrap()
    }

    #[test]
    fn test_mermaid_structure() {
        let out = export(&router(), &ExportOptions::mermaid());
        assert!(out.starts_with("graph TD\n"));
        assert!(out.contains("    n0_0([\"capture_question\"])"));
        assert!(out.contains("    n0_2{\"route_intent\"}"));
        assert!(out.contains("    n0 --> n0_0\n"));
        assert!(out.contains("    n0_0 --> n0_1\n"));
        assert!(out.contains("    n0_2 -->|\"intent == &quot;billing&quot;\"| n0_2_0"));
        assert!(out.contains("    n0_2 -->|\"otherwise\"| n0_2_1"));
    }

    #[test]
    fn test_dot_structure() {
        let out = export(&router(), &ExportOptions::dot().with_title("Support"));
        assert!(out.starts_with("digraph G {\n"));
        assert!(out.contains("label=\"Support\";"));
        assert!(out.contains("\"n0_2\" [label=\"route_intent\", shape=diamond];"));
        assert!(out.contains("\"n0_2\" -> \"n0_2_0\" [label=\"intent == \\\"billing\\\"\"];"));
        assert!(out.ends_with("}\n"));
    }

    #[test]
    fn test_details_annotate_keys() {
        let out = export(&router(), &ExportOptions::mermaid().with_details());
        assert!(out.contains("classify<br/>reads: question<br/>writes: intent"));
        let out = export(&router(), &ExportOptions::dot().with_details());
        assert!(out.contains("classify\\nreads: question\\nwrites: intent"));
    }

    #[test]
    fn test_output_is_deterministic() {
        let node = router();
        for options in [ExportOptions::mermaid().with_details(), ExportOptions::dot()] {
            assert_eq!(export(&node, &options), export(&node, &options));
        }
    }

    #[test]
    fn test_loop_edge_label() {
        let node = Agent::new("draft")
            .until_max(Predicate::truthy("approved"), 3)
            .build()
            .unwrap();
        let out = export(&node, &ExportOptions::mermaid());
        assert!(out.contains("-->|\"until approved (max 3)\"|"));
    }
}
