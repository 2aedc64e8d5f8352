//! Execution plan: the ordered sequence of test nodes selected by specs.

use crate::result::{EnsayoError, EnsayoResult};
use crate::tree::{NodeId, TestTree};
use std::iter::FusedIterator;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    NotStarted,
    At { spec: usize, node: NodeId },
    Done,
}

/// Ordered, duplicate-free walk over the test-bearing nodes under a list
/// of resolved specs.
///
/// Specs are walked in the order given, each in pre-order. A node that
/// lies under an earlier spec is not produced again.
#[derive(Debug, Clone)]
pub struct Plan {
    tree: Arc<TestTree>,
    specs: Vec<NodeId>,
    cursor: Cursor,
}

impl Plan {
    /// Resolve specs against a tree.
    ///
    /// Specs are full names with `.` or `/` separators. An empty list
    /// selects the whole tree.
    ///
    /// # Errors
    ///
    /// Returns [`EnsayoError::UnknownSpec`] for the first spec that names
    /// no node; no plan is produced in that case.
    pub fn new<S: AsRef<str>>(tree: &Arc<TestTree>, specs: &[S]) -> EnsayoResult<Self> {
        let resolved = if specs.is_empty() {
            vec![tree.root()]
        } else {
            specs
                .iter()
                .map(|spec| {
                    let spec = spec.as_ref();
                    let name = normalize_spec(spec);
                    let found = if name.is_empty() {
                        Some(tree.root())
                    } else {
                        tree.find(&name)
                    };
                    found.ok_or_else(|| EnsayoError::UnknownSpec {
                            spec: spec.to_string(),
                        })
                })
                .collect::<EnsayoResult<Vec<_>>>()?
        };
        tracing::debug!(specs = resolved.len(), "plan resolved");
        Ok(Self {
            tree: Arc::clone(tree),
            specs: resolved,
            cursor: Cursor::NotStarted,
        })
    }

    /// Plan over the whole tree
    #[must_use]
    pub fn all(tree: &Arc<TestTree>) -> Self {
        Self {
            tree: Arc::clone(tree),
            specs: vec![tree.root()],
            cursor: Cursor::NotStarted,
        }
    }

    /// Resolved spec roots in order
    #[must_use]
    pub fn specs(&self) -> &[NodeId] {
        &self.specs
    }

    /// Tree this plan walks
    #[must_use]
    pub fn tree(&self) -> &Arc<TestTree> {
        &self.tree
    }

    /// Full names of the remaining nodes, without consuming this plan
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.clone().map(|id| self.tree.full_name(id)).collect()
    }

    fn start_of(&self, spec: usize) -> Cursor {
        self.specs
            .get(spec)
            .map_or(Cursor::Done, |&node| Cursor::At { spec, node })
    }

    /// Single pre-order step bounded by `top`
    fn step(&self, node: NodeId, top: NodeId) -> Option<NodeId> {
        if let Some(child) = self.tree.first_child(node) {
            return Some(child);
        }
        let mut current = node;
        loop {
            if current == top {
                return None;
            }
            if let Some(sibling) = self.tree.next_sibling(current) {
                return Some(sibling);
            }
            current = self.tree.parent(current)?;
        }
    }

    fn advance(&self) -> Cursor {
        match self.cursor {
            Cursor::NotStarted => self.start_of(0),
            Cursor::At { spec, node } => match self.step(node, self.specs[spec]) {
                Some(next) => Cursor::At { spec, node: next },
                None => self.start_of(spec + 1),
            },
            Cursor::Done => Cursor::Done,
        }
    }

    fn covered_earlier(&self, spec: usize, node: NodeId) -> bool {
        self.specs[..spec]
            .iter()
            .any(|earlier| self.tree.is_within(node, *earlier))
    }
}

impl Iterator for Plan {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        loop {
            self.cursor = self.advance();
            let Cursor::At { spec, node } = self.cursor else {
                return None;
            };
            if self.tree.node(node).is_test_bearing() && !self.covered_earlier(spec, node) {
                return Some(node);
            }
        }
    }
}

impl FusedIterator for Plan {}

/// Accept `/` as separator and ignore leading or trailing separators
fn normalize_spec(spec: &str) -> String {
    spec.replace('/', ".").trim_matches('.').to_string()
}
