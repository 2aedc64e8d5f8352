//! Test tree: hierarchical namespace of discovered test functions.
//!
//! Nodes live in an arena owned by [`TestTree`] and are addressed by
//! [`NodeId`]. Each node holds up to three functions, one per [`Role`].
//! Children keep discovery order, which makes plans deterministic.
//!
//! ## Example Output of [`TestTree::dump`]
//!
//! ```text
//! (root)
//! ├── parser [before=parser.c:setup after=parser.c:teardown]
//! │   ├── test_empty [test=parser.c:test_empty]
//! │   └── test_nested [test=parser.c:test_nested]
//! └── lexer
//!     └── test_tokens [test=lexer.c:test_tokens]
//! ```

#![allow(clippy::missing_panics_doc)]
#![allow(clippy::format_push_string)]

use crate::classify::{Classification, ClassifierChain};
use crate::model::{FunctionRef, Role};
use std::fmt;

/// Index of a node inside a [`TestTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Arena index
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// One node of the test tree
#[derive(Debug, Clone, Default)]
pub struct TestNode {
    name: Option<String>,
    parent: Option<NodeId>,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
    next_sibling: Option<NodeId>,
    functions: [Option<FunctionRef>; 3],
}

impl TestNode {
    /// Path segment of this node (`None` for the root)
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Function bound to a role
    #[must_use]
    pub fn function(&self, role: Role) -> Option<&FunctionRef> {
        self.functions[role.index()].as_ref()
    }

    /// Whether any role is bound
    #[must_use]
    pub fn has_functions(&self) -> bool {
        self.functions.iter().any(Option::is_some)
    }

    /// A node is test-bearing when its Test slot is set
    #[must_use]
    pub fn is_test_bearing(&self) -> bool {
        self.functions[Role::Test.index()].is_some()
    }
}

/// Two functions claimed the same role of one node.
///
/// The first one is kept; the second is reported here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// Full name of the node
    pub node: String,
    /// Contested role
    pub role: Role,
    /// Function kept in the slot
    pub kept: FunctionRef,
    /// Function that lost
    pub rejected: FunctionRef,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} function {} for node \"{}\" conflicts with {}, ignoring it",
            self.role,
            self.rejected.location(),
            self.node,
            self.kept.location()
        )
    }
}

/// One fixture level on the way from the root to a node
#[derive(Debug, Clone, Copy)]
pub struct FixtureLevel<'a> {
    /// Node owning the fixtures
    pub node: NodeId,
    /// Setup fixture at this level
    pub before: Option<&'a FunctionRef>,
    /// Teardown fixture at this level
    pub after: Option<&'a FunctionRef>,
}

/// Arena-backed test tree
#[derive(Debug, Clone)]
pub struct TestTree {
    nodes: Vec<TestNode>,
    root: NodeId,
}

impl Default for TestTree {
    fn default() -> Self {
        Self::new()
    }
}

impl TestTree {
    /// Create a tree holding only an unnamed root
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![TestNode::default()],
            root: NodeId(0),
        }
    }

    /// Root node
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// Borrow a node
    #[must_use]
    pub fn node(&self, id: NodeId) -> &TestNode {
        &self.nodes[id.0]
    }

    /// Parent of a node, `None` at the root
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        if id == self.root {
            None
        } else {
            self.nodes[id.0].parent
        }
    }

    /// Children in insertion order
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.nodes[id.0].first_child, |c| {
            self.nodes[c.0].next_sibling
        })
    }

    /// First child
    #[must_use]
    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].first_child
    }

    /// Next sibling
    #[must_use]
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        if id == self.root {
            None
        } else {
            self.nodes[id.0].next_sibling
        }
    }

    /// Pre-order walk of the subtree rooted at `from`
    #[must_use]
    pub fn preorder(&self, from: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            out.push(id);
            let children: Vec<NodeId> = self.children(id).collect();
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Number of nodes reachable from the root
    #[must_use]
    pub fn len(&self) -> usize {
        self.preorder(self.root).len()
    }

    /// Whether the tree has nothing but the root
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes[self.root.0].first_child.is_none()
    }

    fn find_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent)
            .find(|c| self.nodes[c.0].name.as_deref() == Some(name))
    }

    fn append_child(&mut self, parent: NodeId, name: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(TestNode {
            name: Some(name.to_string()),
            parent: Some(parent),
            ..TestNode::default()
        });
        match self.nodes[parent.0].last_child {
            Some(last) => self.nodes[last.0].next_sibling = Some(id),
            None => self.nodes[parent.0].first_child = Some(id),
        }
        self.nodes[parent.0].last_child = Some(id);
        id
    }

    /// Walk (and create when missing) the `/`-separated path below `from`.
    ///
    /// Empty segments are ignored, so `"a//b/"` is `"a/b"`. Idempotent.
    pub fn make_path(&mut self, from: NodeId, path: &str) -> NodeId {
        let mut node = from;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            node = match self.find_child(node, segment) {
                Some(child) => child,
                None => self.append_child(node, segment),
            };
        }
        node
    }

    /// Bind a function to a role of a node.
    ///
    /// An occupied slot is never overwritten: the existing function stays
    /// and the rejected one is returned as a [`Conflict`].
    pub fn set_function(&mut self, node: NodeId, role: Role, func: FunctionRef) -> Option<Conflict> {
        if let Some(kept) = &self.nodes[node.0].functions[role.index()] {
            let conflict = Conflict {
                node: self.full_name(node),
                role,
                kept: kept.clone(),
                rejected: func,
            };
            tracing::warn!(%conflict, "duplicate role assignment");
            return Some(conflict);
        }
        self.nodes[node.0].functions[role.index()] = Some(func);
        None
    }

    /// Dotted name of a node, every named ancestor included.
    ///
    /// The unnamed original root has the empty name. After
    /// [`collapse_common_prefix`](Self::collapse_common_prefix) the new root
    /// keeps its own segment.
    #[must_use]
    pub fn full_name(&self, node: NodeId) -> String {
        let mut segments = Vec::new();
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            if let Some(name) = &self.nodes[id.0].name {
                segments.push(name.as_str());
            }
            if id == self.root {
                break;
            }
            cursor = self.nodes[id.0].parent;
        }
        segments.reverse();
        segments.join(".")
    }

    /// Exact full-name lookup, first match in pre-order
    #[must_use]
    pub fn find(&self, full_name: &str) -> Option<NodeId> {
        if full_name.is_empty() && self.nodes[self.root.0].name.is_none() {
            return Some(self.root);
        }
        self.preorder(self.root)
            .into_iter()
            .filter(|id| self.nodes[id.0].name.is_some())
            .find(|id| self.full_name(*id) == full_name)
    }

    /// Whether `node` lies inside the subtree rooted at `ancestor`
    #[must_use]
    pub fn is_within(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.parent(id);
        }
        false
    }

    /// Ordered fixtures applying to a node.
    ///
    /// Before fixtures come outermost first (root's first); After fixtures
    /// come innermost first (the node's own first).
    #[must_use]
    pub fn fixtures(&self, node: NodeId, role: Role) -> Vec<&FunctionRef> {
        let mut out = std::collections::VecDeque::new();
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            if let Some(func) = self.nodes[id.0].function(role) {
                match role {
                    Role::Before => out.push_front(func),
                    Role::After | Role::Test => out.push_back(func),
                }
            }
            cursor = self.parent(id);
        }
        out.into_iter().collect()
    }

    /// Fixture levels from the root down to `node`
    #[must_use]
    pub fn fixture_levels(&self, node: NodeId) -> Vec<FixtureLevel<'_>> {
        let mut levels = Vec::new();
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            let n = &self.nodes[id.0];
            levels.push(FixtureLevel {
                node: id,
                before: n.function(Role::Before),
                after: n.function(Role::After),
            });
            cursor = self.parent(id);
        }
        levels.reverse();
        levels
    }

    /// Re-root at the end of the single-child chain below the root.
    ///
    /// Descends while the current node has exactly one child, owns no
    /// functions, and that child is not a leaf.
    pub fn collapse_common_prefix(&mut self) {
        let mut current = self.root;
        loop {
            let node = &self.nodes[current.0];
            let Some(only) = node.first_child else { break };
            if node.last_child != Some(only) || node.has_functions() {
                break;
            }
            if self.nodes[only.0].first_child.is_none() {
                break;
            }
            current = only;
        }
        if current != self.root {
            tracing::debug!(
                prefix = %self.full_name(current),
                "collapsing common prefix"
            );
            self.nodes[current.0].parent = None;
            self.nodes[current.0].next_sibling = None;
            self.root = current;
        }
    }

    /// Render the tree with role assignments
    #[must_use]
    pub fn dump(&self) -> String {
        let top = &self.nodes[self.root.0];
        let mut output = top.name().unwrap_or("(root)").to_string();
        push_roles(top, &mut output);
        output.push('\n');
        let children: Vec<NodeId> = self.children(self.root).collect();
        self.dump_children(&children, "", &mut output);
        output
    }

    fn dump_children(&self, children: &[NodeId], prefix: &str, output: &mut String) {
        let len = children.len();
        for (i, child) in children.iter().enumerate() {
            let is_last = i == len - 1;
            let connector = if is_last { "└── " } else { "├── " };
            let child_prefix = if is_last { "    " } else { "│   " };

            let node = &self.nodes[child.0];
            output.push_str(prefix);
            output.push_str(connector);
            output.push_str(node.name().unwrap_or_default());
            push_roles(node, output);
            output.push('\n');

            let grandchildren: Vec<NodeId> = self.children(*child).collect();
            if !grandchildren.is_empty() {
                let new_prefix = format!("{prefix}{child_prefix}");
                self.dump_children(&grandchildren, &new_prefix, output);
            }
        }
    }
}

fn push_roles(node: &TestNode, output: &mut String) {
    let roles: Vec<String> = Role::ALL
        .iter()
        .filter_map(|role| {
            node.function(*role)
                .map(|f| format!("{role}={}", f.location()))
        })
        .collect();
    if !roles.is_empty() {
        output.push_str(&format!(" [{}]", roles.join(" ")));
    }
}

/// Outcome of building a tree from discovered functions
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    /// Functions that matched a rule and were placed
    pub placed: usize,
    /// Functions no rule matched
    pub skipped: usize,
    /// Role conflicts, first function kept
    pub conflicts: Vec<Conflict>,
}

/// Builds a [`TestTree`] from classified functions
#[derive(Debug, Clone, Copy)]
pub struct TreeBuilder<'a> {
    chain: &'a ClassifierChain,
    collapse: bool,
}

impl<'a> TreeBuilder<'a> {
    /// Builder using a classifier chain
    #[must_use]
    pub const fn new(chain: &'a ClassifierChain) -> Self {
        Self {
            chain,
            collapse: true,
        }
    }

    /// Keep the full compile-unit prefix in node names
    #[must_use]
    pub const fn without_collapse(mut self) -> Self {
        self.collapse = false;
        self
    }

    /// Classify and place every function
    #[must_use]
    pub fn build<I>(&self, functions: I) -> (TestTree, BuildReport)
    where
        I: IntoIterator<Item = FunctionRef>,
    {
        let mut tree = TestTree::new();
        let mut report = BuildReport::default();
        for func in functions {
            let Classification::Matched { role, .. } = self.chain.classify(&func.name) else {
                report.skipped += 1;
                continue;
            };
            let scope = scope_path(&func);
            let path = match role {
                Role::Test => format!("{scope}/{}", func.name),
                Role::Before | Role::After => scope,
            };
            let root = tree.root();
            let node = tree.make_path(root, &path);
            match tree.set_function(node, role, func) {
                Some(conflict) => report.conflicts.push(conflict),
                None => report.placed += 1,
            }
        }
        if self.collapse {
            tree.collapse_common_prefix();
        }
        tracing::debug!(
            placed = report.placed,
            skipped = report.skipped,
            conflicts = report.conflicts.len(),
            "test tree built"
        );
        (tree, report)
    }
}

/// Compile unit with `\` normalized to `/` and the extension removed
#[must_use]
pub fn scope_path(func: &FunctionRef) -> String {
    let unit = func.compile_unit.to_string_lossy().replace('\\', "/");
    let (dir, file) = unit.rsplit_once('/').unwrap_or(("", unit.as_str()));
    let stem = match file.rfind('.') {
        Some(dot) if dot > 0 => &file[..dot],
        _ => file,
    };
    if dir.is_empty() {
        stem.to_string()
    } else {
        format!("{dir}/{stem}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn func(name: &str, unit: &str) -> FunctionRef {
        FunctionRef::new(name, unit, 0)
    }

    mod make_path_tests {
        use super::*;

        #[test]
        fn test_creates_nodes() {
            let mut tree = TestTree::new();
            let root = tree.root();
            let c = tree.make_path(root, "a/b/c");
            assert_eq!(tree.full_name(c), "a.b.c");
            assert_eq!(tree.len(), 4);
        }

        #[test]
        fn test_idempotent() {
            let mut tree = TestTree::new();
            let root = tree.root();
            let first = tree.make_path(root, "a/b");
            let second = tree.make_path(root, "a/b");
            assert_eq!(first, second);
            assert_eq!(tree.len(), 3);
        }

        #[test]
        fn test_empty_segments_ignored() {
            let mut tree = TestTree::new();
            let root = tree.root();
            let a = tree.make_path(root, "/a//b/");
            let b = tree.make_path(root, "a/b");
            assert_eq!(a, b);
        }

        #[test]
        fn test_empty_path_is_from() {
            let mut tree = TestTree::new();
            let root = tree.root();
            assert_eq!(tree.make_path(root, ""), root);
        }

        #[test]
        fn test_case_sensitive_lookup() {
            let mut tree = TestTree::new();
            let root = tree.root();
            let lower = tree.make_path(root, "suite");
            let upper = tree.make_path(root, "Suite");
            assert_ne!(lower, upper);
        }

        #[test]
        fn test_children_keep_insertion_order() {
            let mut tree = TestTree::new();
            let root = tree.root();
            tree.make_path(root, "s/zeta");
            tree.make_path(root, "s/alpha");
            tree.make_path(root, "s/mid");
            let s = tree.find("s").unwrap();
            let names: Vec<&str> = tree
                .children(s)
                .map(|c| tree.node(c).name().unwrap())
                .collect();
            assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        }
    }

    mod set_function_tests {
        use super::*;

        #[test]
        fn test_first_function_kept() {
            let mut tree = TestTree::new();
            let root = tree.root();
            let n = tree.make_path(root, "suite");
            assert!(tree.set_function(n, Role::Before, func("setup", "a.c")).is_none());
            let conflict = tree
                .set_function(n, Role::Before, func("Setup", "b.c"))
                .unwrap();
            assert_eq!(conflict.kept.name, "setup");
            assert_eq!(conflict.rejected.name, "Setup");
            assert_eq!(tree.node(n).function(Role::Before).unwrap().name, "setup");
        }

        #[test]
        fn test_conflict_message_names_both() {
            let mut tree = TestTree::new();
            let root = tree.root();
            let n = tree.make_path(root, "suite");
            tree.set_function(n, Role::After, func("teardown", "x.c"));
            let conflict = tree.set_function(n, Role::After, func("cleanup", "y.c")).unwrap();
            let msg = conflict.to_string();
            assert!(msg.contains("x.c:teardown"));
            assert!(msg.contains("y.c:cleanup"));
        }

        #[test]
        fn test_distinct_roles_coexist() {
            let mut tree = TestTree::new();
            let root = tree.root();
            let n = tree.make_path(root, "suite");
            tree.set_function(n, Role::Before, func("setup", "s.c"));
            tree.set_function(n, Role::After, func("teardown", "s.c"));
            assert!(tree.node(n).has_functions());
            assert!(!tree.node(n).is_test_bearing());
        }
    }

    mod find_tests {
        use super::*;

        #[test]
        fn test_find_exact() {
            let mut tree = TestTree::new();
            let root = tree.root();
            let n = tree.make_path(root, "suite/one");
            assert_eq!(tree.find("suite.one"), Some(n));
            assert_eq!(tree.find("suite.on"), None);
            assert_eq!(tree.find("Suite.one"), None);
        }

        #[test]
        fn test_find_empty_is_root() {
            let tree = TestTree::new();
            assert_eq!(tree.find(""), Some(tree.root()));
        }

        #[test]
        fn test_root_full_name_empty() {
            let tree = TestTree::new();
            assert_eq!(tree.full_name(tree.root()), "");
        }
    }

    mod fixture_tests {
        use super::*;

        fn nested() -> (TestTree, NodeId) {
            let mut tree = TestTree::new();
            let root = tree.root();
            let a = tree.make_path(root, "a");
            let b = tree.make_path(root, "a/b");
            let t = tree.make_path(root, "a/b/t");
            tree.set_function(root, Role::Before, func("root_setup", "r.c"));
            tree.set_function(root, Role::After, func("root_teardown", "r.c"));
            tree.set_function(a, Role::Before, func("a_setup", "a.c"));
            tree.set_function(b, Role::After, func("b_teardown", "b.c"));
            tree.set_function(t, Role::Test, func("test_t", "b.c"));
            (tree, t)
        }

        #[test]
        fn test_before_outermost_first() {
            let (tree, t) = nested();
            let names: Vec<&str> = tree
                .fixtures(t, Role::Before)
                .iter()
                .map(|f| f.name.as_str())
                .collect();
            assert_eq!(names, vec!["root_setup", "a_setup"]);
        }

        #[test]
        fn test_after_innermost_first() {
            let (tree, t) = nested();
            let names: Vec<&str> = tree
                .fixtures(t, Role::After)
                .iter()
                .map(|f| f.name.as_str())
                .collect();
            assert_eq!(names, vec!["b_teardown", "root_teardown"]);
        }

        #[test]
        fn test_levels_root_to_node() {
            let (tree, t) = nested();
            let levels = tree.fixture_levels(t);
            assert_eq!(levels.len(), 4);
            assert_eq!(levels[0].node, tree.root());
            assert_eq!(levels[3].node, t);
            assert_eq!(levels[1].before.unwrap().name, "a_setup");
            assert!(levels[1].after.is_none());
            assert_eq!(levels[2].after.unwrap().name, "b_teardown");
        }

        #[test]
        fn test_no_fixtures() {
            let mut tree = TestTree::new();
            let root = tree.root();
            let t = tree.make_path(root, "plain");
            assert!(tree.fixtures(t, Role::Before).is_empty());
            assert!(tree.fixtures(t, Role::After).is_empty());
        }
    }

    mod collapse_tests {
        use super::*;

        #[test]
        fn test_shared_directory_prefix_removed() {
            let chain = ClassifierChain::with_defaults();
            let (tree, _) = TreeBuilder::new(&chain).build(vec![
                func("test_a", "src/tests/one.c"),
                func("test_b", "src/tests/two.c"),
            ]);
            let names: Vec<String> = tree
                .preorder(tree.root())
                .into_iter()
                .filter(|id| tree.node(*id).is_test_bearing())
                .map(|id| tree.full_name(id))
                .collect();
            assert_eq!(names, vec!["tests.one.test_a", "tests.two.test_b"]);
        }

        #[test]
        fn test_stops_at_node_with_fixture() {
            let mut tree = TestTree::new();
            let root = tree.root();
            let s = tree.make_path(root, "lib/suite");
            tree.make_path(root, "lib/suite/only");
            tree.set_function(s, Role::Before, func("setup", "lib/suite.c"));
            tree.collapse_common_prefix();
            assert_eq!(tree.root(), s);
            let only = tree.find("suite.only").unwrap();
            assert_eq!(tree.fixtures(only, Role::Before)[0].name, "setup");
        }

        #[test]
        fn test_single_leaf_not_collapsed_into() {
            let mut tree = TestTree::new();
            let root = tree.root();
            let t = tree.make_path(root, "suite/only");
            tree.collapse_common_prefix();
            assert_eq!(tree.full_name(t), "suite.only");
            assert_eq!(tree.find("suite.only"), Some(t));
            assert_eq!(tree.find("only"), None);
        }

        #[test]
        fn test_fixtures_above_new_root_unreachable() {
            let mut tree = TestTree::new();
            let root = tree.root();
            let t = tree.make_path(root, "x/y/t");
            tree.make_path(root, "x/y/u");
            tree.collapse_common_prefix();
            assert_eq!(tree.parent(tree.root()), None);
            assert_eq!(tree.fixture_levels(t).len(), 2);
        }
    }

    mod builder_tests {
        use super::*;

        #[test]
        fn test_placement() {
            let chain = ClassifierChain::with_defaults();
            let (tree, report) = TreeBuilder::new(&chain).without_collapse().build(vec![
                func("setup", "tests/suite.c"),
                func("test_one", "tests/suite.c"),
                func("helper", "tests/suite.c"),
            ]);
            assert_eq!(report.placed, 2);
            assert_eq!(report.skipped, 1);
            let suite = tree.find("tests.suite").unwrap();
            assert_eq!(tree.node(suite).function(Role::Before).unwrap().name, "setup");
            let one = tree.find("tests.suite.test_one").unwrap();
            assert!(tree.node(one).is_test_bearing());
        }

        #[test]
        fn test_windows_separators() {
            assert_eq!(scope_path(&func("t", "src\\win\\a.cpp")), "src/win/a");
        }

        #[test]
        fn test_scope_without_extension() {
            assert_eq!(scope_path(&func("t", "Makefile")), "Makefile");
            assert_eq!(scope_path(&func("t", "dir/.hidden")), "dir/.hidden");
            assert_eq!(scope_path(&func("t", "a.b/c.d.e")), "a.b/c.d");
        }

        #[test]
        fn test_conflicts_reported() {
            let chain = ClassifierChain::with_defaults();
            let (_, report) = TreeBuilder::new(&chain).build(vec![
                func("setup", "s.c"),
                func("Setup", "s.c"),
                func("test_x", "s.c"),
            ]);
            assert_eq!(report.conflicts.len(), 1);
            assert_eq!(report.conflicts[0].role, Role::Before);
        }

        #[test]
        fn test_dump_shows_roles() {
            let chain = ClassifierChain::with_defaults();
            let (tree, _) = TreeBuilder::new(&chain).build(vec![
                func("setup", "p/parser.c"),
                func("test_empty", "p/parser.c"),
                func("test_tokens", "p/lexer.c"),
            ]);
            let dump = tree.dump();
            assert!(dump.starts_with("p\n"));
            assert!(dump.contains("├── parser [before=p/parser.c:setup]"));
            assert!(dump.contains("│   └── test_empty [test=p/parser.c:test_empty]"));
            assert!(dump.contains("└── lexer"));
        }
    }

    proptest! {
        /// Re-walking any path lands on the node it created.
        #[test]
        fn prop_make_path_idempotent(segments in prop::collection::vec("[a-z]{1,4}", 1..6)) {
            let mut tree = TestTree::new();
            let root = tree.root();
            let path = segments.join("/");
            let first = tree.make_path(root, &path);
            let size = tree.len();
            prop_assert_eq!(tree.make_path(root, &path), first);
            prop_assert_eq!(tree.len(), size);
            prop_assert_eq!(tree.full_name(first), segments.join("."));
        }

        /// `find(full_name(n))` returns `n` for every reachable node.
        #[test]
        fn prop_find_inverts_full_name(paths in prop::collection::vec("[a-c]{1,2}(/[a-c]{1,2}){0,3}", 1..12)) {
            let mut tree = TestTree::new();
            let root = tree.root();
            for p in &paths {
                tree.make_path(root, p);
            }
            for id in tree.preorder(root) {
                prop_assert_eq!(tree.find(&tree.full_name(id)), Some(id));
            }
        }
    }
}
