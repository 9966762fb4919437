use super::node::{Node, NodeKind};

impl Node {
    /// Direct children in declaration order. `Route` yields its rule targets
    /// followed by the default.
    pub fn children(&self) -> Vec<&Node> {
        match self.kind() {
            NodeKind::Sequence { children }
            | NodeKind::Parallel { children }
            | NodeKind::Fallback { children }
            | NodeKind::Race { children } => children.iter().collect(),
            NodeKind::Loop { body, .. }
            | NodeKind::MapOver { body, .. }
            | NodeKind::Timeout { body, .. } => vec![body.as_ref()],
            NodeKind::Route { rules, default, .. } => rules
                .iter()
                .map(|r| &r.target)
                .chain(default.as_deref())
                .collect(),
            NodeKind::Leaf(_)
            | NodeKind::Transform { .. }
            | NodeKind::Tap { .. }
            | NodeKind::Gate { .. }
            | NodeKind::Transfer { .. }
            | NodeKind::Capture { .. } => Vec::new(),
        }
    }

    /// True for kinds that own child nodes.
    pub fn is_composite(&self) -> bool {
        matches!(
            self.kind(),
            NodeKind::Sequence { .. }
                | NodeKind::Parallel { .. }
                | NodeKind::Loop { .. }
                | NodeKind::Fallback { .. }
                | NodeKind::Race { .. }
                | NodeKind::MapOver { .. }
                | NodeKind::Timeout { .. }
                | NodeKind::Route { .. }
        )
    }

    /// Pure state plumbing that never calls out: transform, tap, capture.
    pub fn is_zero_cost(&self) -> bool {
        matches!(
            self.kind(),
            NodeKind::Transform { .. } | NodeKind::Tap { .. } | NodeKind::Capture { .. }
        )
    }

    /// Pre-order depth-first visit. The callback receives each node and its depth.
    pub fn walk<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(&'a Node, usize),
    {
        self.walk_at(0, f);
    }

    fn walk_at<'a, F>(&'a self, depth: usize, f: &mut F)
    where
        F: FnMut(&'a Node, usize),
    {
        f(self, depth);
        for child in self.children() {
            child.walk_at(depth + 1, f);
        }
    }

    /// First node (pre-order) with the given name.
    pub fn find(&self, name: &str) -> Option<&Node> {
        if self.name() == name {
            return Some(self);
        }
        self.children().into_iter().find_map(|c| c.find(name))
    }

    /// Total number of nodes in the tree.
    pub fn count(&self) -> usize {
        let mut n = 0;
        self.walk(&mut |_, _| n += 1);
        n
    }
}
