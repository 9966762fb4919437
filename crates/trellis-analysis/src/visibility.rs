use trellis_core::event::Event;
use trellis_core::ir::{Node, NodeKind};
use trellis_core::types::{Visibility, VisibilityMap, VisibilityPolicy};
use tracing::debug;

/// Classify every node in the tree.
///
/// The walk carries whether something runs after the current node. Leaf-like
/// nodes with nothing after them are `user`, the rest `internal`. State
/// plumbing (`Transform`, `Tap`, `Capture`) and `Route` are always
/// `zero_cost`. When two nodes in different scopes share a name, the more
/// visible class is kept.
pub fn infer(root: &Node, policy: VisibilityPolicy) -> VisibilityMap {
    let mut map = VisibilityMap::new();
    visit(root, false, policy, &mut map);
    map
}

fn classify(node: &Node, has_successor: bool, policy: VisibilityPolicy) -> Visibility {
    let transparent = policy == VisibilityPolicy::Transparent;
    match node.kind() {
        NodeKind::Transform { .. }
        | NodeKind::Tap { .. }
        | NodeKind::Capture { .. }
        | NodeKind::Route { .. } => Visibility::ZeroCost,
        NodeKind::Leaf(_) | NodeKind::Gate { .. } | NodeKind::Transfer { .. } => {
            if transparent || !has_successor {
                Visibility::User
            } else {
                Visibility::Internal
            }
        }
        _ if transparent => Visibility::User,
        _ => Visibility::Internal,
    }
}

fn visit(node: &Node, has_successor: bool, policy: VisibilityPolicy, map: &mut VisibilityMap) {
    let class = node
        .visibility_override()
        .unwrap_or_else(|| classify(node, has_successor, policy));
    map.entry(node.name().to_string())
        .and_modify(|v| *v = (*v).max(class))
        .or_insert(class);

    match node.kind() {
        NodeKind::Sequence { children } => {
            let last = children.len().saturating_sub(1);
            for (i, child) in children.iter().enumerate() {
                visit(child, i < last || has_successor, policy, map);
            }
        }
        NodeKind::Parallel { .. } | NodeKind::Loop { .. } | NodeKind::MapOver { .. } => {
            for child in node.children() {
                visit(child, true, policy, map);
            }
        }
        NodeKind::Fallback { .. } | NodeKind::Race { .. } | NodeKind::Timeout { .. } => {
            for child in node.children() {
                visit(child, has_successor, policy, map);
            }
        }
        NodeKind::Route { .. } => {
            for arm in node.children() {
                visit(arm, false, policy, map);
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

/// Applies a visibility map to a stream of events.
///
/// Failures and escalations always surface as `user`. Events from authors
/// missing from the map are treated as `user` too.
#[derive(Debug, Clone)]
pub struct EventFilter {
    map: VisibilityMap,
    policy: VisibilityPolicy,
}

impl EventFilter {
    pub fn new(map: VisibilityMap, policy: VisibilityPolicy) -> Self {
        Self { map, policy }
    }

    /// Infer the map for `root` and build a filter from it.
    pub fn for_tree(root: &Node, policy: VisibilityPolicy) -> Self {
        Self::new(infer(root, policy), policy)
    }

    pub fn policy(&self) -> VisibilityPolicy {
        self.policy
    }

    pub fn classify(&self, event: &Event) -> Visibility {
        if event.is_failure() || event.is_escalation() {
            return Visibility::User;
        }
        self.map.get(&event.author).copied().unwrap_or(Visibility::User)
    }

    /// `None` when the event should be suppressed.
    pub fn apply(&self, mut event: Event) -> Option<Event> {
        match self.policy {
            VisibilityPolicy::Transparent => Some(event),
            VisibilityPolicy::Filtered => {
                let class = self.classify(&event);
                if class == Visibility::User {
                    Some(event)
                } else {
                    debug!(author = %event.author, %class, "Suppressed event");
                    None
                }
            }
            VisibilityPolicy::Annotate => {
                event.visibility = Some(self.classify(&event));
                Some(event)
            }
        }
    }

    pub fn apply_all(&self, events: impl IntoIterator<Item = Event>) -> Vec<Event> {
        events.into_iter().filter_map(|e| self.apply(e)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::event::FailureKind;
    use trellis_core::Predicate;
    use trellis_flow::{capture, tap, Agent, Compose, Flow, Routes};

    fn abc() -> Node {
        (Agent::new("a") >> Agent::new("b") >> Agent::new("c"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_chain_filtered() {
        let map = infer(&abc(), VisibilityPolicy::Filtered);
        assert_eq!(map["a"], Visibility::Internal);
        assert_eq!(map["b"], Visibility::Internal);
        assert_eq!(map["c"], Visibility::User);
    }

    #[test]
    fn test_chain_transparent() {
        let map = infer(&abc(), VisibilityPolicy::Transparent);
        assert_eq!(map["a"], Visibility::User);
        assert_eq!(map["b"], Visibility::User);
        assert_eq!(map["c"], Visibility::User);
    }

    #[test]
    fn test_annotate_classifies_like_filtered() {
        assert_eq!(
            infer(&abc(), VisibilityPolicy::Annotate),
            infer(&abc(), VisibilityPolicy::Filtered)
        );
    }

    #[test]
    fn test_zero_cost_anywhere() {
        let node = (capture("q") >> Agent::new("a") >> tap(["q"]))
            .build()
            .unwrap();
        for policy in [
            VisibilityPolicy::Transparent,
            VisibilityPolicy::Filtered,
            VisibilityPolicy::Annotate,
        ] {
            let map = infer(&node, policy);
            assert_eq!(map["capture_q"], Visibility::ZeroCost);
            assert_eq!(map["tap_q"], Visibility::ZeroCost);
        }
        // Any step after a, zero-cost or not, keeps a internal.
        let map = infer(&node, VisibilityPolicy::Filtered);
        assert_eq!(map["a"], Visibility::Internal);
    }

    #[test]
    fn test_route_arms_are_terminal() {
        let node = Agent::new("classify")
            .outputs("intent")
            .branch(
                Routes::new()
                    .when("billing", Agent::new("billing"))
                    .otherwise(Agent::new("general")),
            )
            .unwrap()
            .build()
            .unwrap();
        let map = infer(&node, VisibilityPolicy::Filtered);
        assert_eq!(map["classify"], Visibility::Internal);
        assert_eq!(map["route_intent"], Visibility::ZeroCost);
        assert_eq!(map["billing"], Visibility::User);
        assert_eq!(map["general"], Visibility::User);
    }

    #[test]
    fn test_parallel_and_loop_children_internal() {
        let node = ((Agent::new("l") | Agent::new("r")) >> (Agent::new("poll") * 3))
            .build()
            .unwrap();
        let map = infer(&node, VisibilityPolicy::Filtered);
        assert_eq!(map["l"], Visibility::Internal);
        assert_eq!(map["r"], Visibility::Internal);
        assert_eq!(map["poll"], Visibility::Internal);
        assert_eq!(map["l_and_r"], Visibility::Internal);
    }

    #[test]
    fn test_fallback_children_inherit() {
        let node = Agent::new("fast").or_else(Agent::new("slow")).build().unwrap();
        let map = infer(&node, VisibilityPolicy::Filtered);
        assert_eq!(map["fast"], Visibility::User);
        assert_eq!(map["slow"], Visibility::User);
    }

    #[test]
    fn test_override_wins() {
        let node = (Agent::new("a").visibility(Visibility::User) >> Agent::new("b"))
            .build()
            .unwrap();
        let map = infer(&node, VisibilityPolicy::Filtered);
        assert_eq!(map["a"], Visibility::User);
    }

    #[test]
    fn test_name_collision_keeps_more_visible() {
        let inner = (Agent::new("a") >> Agent::new("x")).named("inner");
        let node = (Agent::new("x") >> inner).build().unwrap();
        let map = infer(&node, VisibilityPolicy::Filtered);
        assert_eq!(map["x"], Visibility::User);
    }

    #[test]
    fn test_filter_drops_internal_keeps_failures() {
        let filter = EventFilter::for_tree(&abc(), VisibilityPolicy::Filtered);
        let events = vec![
            Event::text("a", "thinking"),
            Event::failure("b", FailureKind::Timeout, "deadline exceeded"),
            Event::escalate("b", "needs approval"),
            Event::text("c", "done"),
        ];
        let kept = filter.apply_all(events);
        let authors: Vec<_> = kept.iter().map(|e| e.author.as_str()).collect();
        assert_eq!(authors, vec!["b", "b", "c"]);
    }

    #[test]
    fn test_annotate_stamps_class() {
        let filter = EventFilter::for_tree(&abc(), VisibilityPolicy::Annotate);
        let kept = filter.apply_all(vec![Event::text("a", "x"), Event::text("c", "y")]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].visibility, Some(Visibility::Internal));
        assert_eq!(kept[1].visibility, Some(Visibility::User));
    }

    #[test]
    fn test_transparent_passes_through() {
        let filter = EventFilter::for_tree(&abc(), VisibilityPolicy::Transparent);
        let kept = filter.apply(Event::text("a", "x")).unwrap();
        assert!(kept.visibility.is_none());
    }

    #[test]
    fn test_gate_terminal_is_user() {
        let node = Flow::from(Agent::new("draft"))
            .then(trellis_flow::gate(Predicate::truthy("risky"), "Publish?"))
            .build()
            .unwrap();
        let map = infer(&node, VisibilityPolicy::Filtered);
        assert_eq!(map["gate_publish"], Visibility::User);
        assert_eq!(map["draft"], Visibility::Internal);
    }
}
