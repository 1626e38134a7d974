//! Node Hierarchy
//!
//! Parallel-array representation of the scene tree. Each node is an index
//! into four arrays: `parent`, `first_child`, `next_sibling`, and `level`.
//! The arrays stay small and contiguous; traversal never chases heap
//! pointers.
//!
//! The tree has exactly one root (parent [`NO_NODE`]). It is built once at
//! mesh load time by depth-first traversal of the source hierarchy, so the
//! O(children) sibling-chain append in [`Hierarchy::add_node`] never shows
//! up in per-frame work.

/// Sentinel index for "no node" (absent parent, child, or sibling).
pub const NO_NODE: i32 = -1;

/// The parallel-array node tree.
#[derive(Debug, Clone, Default)]
pub struct Hierarchy {
    parent: Vec<i32>,
    first_child: Vec<i32>,
    next_sibling: Vec<i32>,
    level: Vec<u32>,
}

impl Hierarchy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node under `parent` and returns its index.
    ///
    /// The first node added must be the root (`parent == NO_NODE`); every
    /// later node must name a valid parent. A node becomes its parent's
    /// first child when none exists, otherwise it is appended at the end
    /// of the sibling chain.
    pub fn add_node(&mut self, parent: i32, level: u32) -> i32 {
        if parent == NO_NODE {
            assert!(
                self.parent.is_empty(),
                "hierarchy already has a root; every other node needs a parent"
            );
        } else {
            assert!(
                (parent as usize) < self.parent.len(),
                "parent index {parent} out of range"
            );
        }

        let node = self.parent.len() as i32;
        self.parent.push(parent);
        self.first_child.push(NO_NODE);
        self.next_sibling.push(NO_NODE);
        self.level.push(level);

        if parent != NO_NODE {
            let head = self.first_child[parent as usize];
            if head == NO_NODE {
                self.first_child[parent as usize] = node;
            } else {
                let mut sibling = head;
                while self.next_sibling[sibling as usize] != NO_NODE {
                    sibling = self.next_sibling[sibling as usize];
                }
                self.next_sibling[sibling as usize] = node;
            }
        }

        node
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn parent(&self, node: i32) -> i32 {
        self.parent[node as usize]
    }

    #[inline]
    #[must_use]
    pub fn first_child(&self, node: i32) -> i32 {
        self.first_child[node as usize]
    }

    #[inline]
    #[must_use]
    pub fn next_sibling(&self, node: i32) -> i32 {
        self.next_sibling[node as usize]
    }

    #[inline]
    #[must_use]
    pub fn level(&self, node: i32) -> u32 {
        self.level[node as usize]
    }

    /// Iterates over the direct children of `node` in sibling order.
    pub fn children(&self, node: i32) -> impl Iterator<Item = i32> + '_ {
        let mut current = self.first_child[node as usize];
        std::iter::from_fn(move || {
            if current == NO_NODE {
                return None;
            }
            let next = self.next_sibling[current as usize];
            Some(std::mem::replace(&mut current, next))
        })
    }
}
