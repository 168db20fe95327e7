//! Red-black tree over the fixed-length strings currently reachable in a
//! fused window.
//!
//! Nodes do not own their strings; each stores the absolute input position
//! of its newest occurrence and the content is re-derived from the window at
//! comparison time. Identical-content strings share one node through a
//! reference counter; re-inserting refreshes the stored position to the
//! newest occurrence so matches report the smallest distances. Nodes live in
//! an arena indexed by `u32` and removed nodes return to a free list.

use super::window::FusedWindow;
use crate::Error;
use num_traits::PrimInt;

type NodeId = u32;
const NIL: NodeId = u32::MAX;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Color {
    Red,
    Black,
}

struct Node {
    /// Absolute input position of the newest occurrence of this content.
    start: usize,
    refs: usize,
    parent: NodeId,
    left: NodeId,
    right: NodeId,
    color: Color,
}

/// Result of a longest-prefix query. `length == 0` means nothing matched.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Match {
    pub position: usize,
    pub length: usize,
}

impl Match {
    pub fn found(&self) -> bool {
        self.length != 0
    }
}

pub struct SearchTree {
    string_size: usize,
    nodes: Vec<Node>,
    free: Vec<NodeId>,
    root: NodeId,
    len: usize,
}

impl SearchTree {
    pub fn new(string_size: usize) -> Self {
        Self {
            string_size,
            nodes: Vec::new(),
            free: Vec::new(),
            root: NIL,
            len: 0,
        }
    }

    pub fn string_size(&self) -> usize {
        self.string_size
    }

    /// Number of distinct strings currently tracked.
    pub fn len(&self) -> usize {
        self.len
    }

    fn content<'w, T: PrimInt>(&self, window: &'w FusedWindow<T>, id: NodeId) -> &'w [T] {
        let pos = self.nodes[id as usize].start - window.start_position();
        window.sequence_at(pos, self.string_size)
    }

    /// Track the string of `string_size` symbols starting at absolute input
    /// position `start`. Re-inserting existing content bumps its reference
    /// count and refreshes the stored position.
    pub fn add_string<T: PrimInt>(&mut self, window: &FusedWindow<T>, start: usize) {
        let key = window.sequence_at(start - window.start_position(), self.string_size);
        let mut parent = NIL;
        let mut link = self.root;
        let mut went_left = false;
        while link != NIL {
            let content = self.content(window, link);
            match key.cmp(content) {
                std::cmp::Ordering::Equal => {
                    let node = &mut self.nodes[link as usize];
                    node.refs += 1;
                    node.start = start;
                    return;
                }
                std::cmp::Ordering::Less => {
                    parent = link;
                    went_left = true;
                    link = self.nodes[link as usize].left;
                }
                std::cmp::Ordering::Greater => {
                    parent = link;
                    went_left = false;
                    link = self.nodes[link as usize].right;
                }
            }
        }
        let id = self.allocate(start, parent);
        if parent == NIL {
            self.root = id;
        } else if went_left {
            self.nodes[parent as usize].left = id;
        } else {
            self.nodes[parent as usize].right = id;
        }
        self.len += 1;
        self.insert_fixup(id);
    }

    /// Untrack one occurrence of `key`; the node disappears when its last
    /// occurrence goes.
    pub fn remove_string<T: PrimInt>(
        &mut self,
        window: &FusedWindow<T>,
        key: &[T],
    ) -> Result<(), Error> {
        let mut node = self.root;
        while node != NIL {
            let content = self.content(window, node);
            match key.cmp(content) {
                std::cmp::Ordering::Equal => {
                    self.nodes[node as usize].refs -= 1;
                    if self.nodes[node as usize].refs == 0 {
                        self.delete(node);
                        self.len -= 1;
                    }
                    return Ok(());
                }
                std::cmp::Ordering::Less => node = self.nodes[node as usize].left,
                std::cmp::Ordering::Greater => node = self.nodes[node as usize].right,
            }
        }
        Err(Error::UnknownString)
    }

    /// Greedy longest-prefix search. Walks the search path for `query`,
    /// remembering the longest common prefix seen; equal lengths resolve to
    /// the most recently inserted occurrence. A whole-string match returns
    /// immediately.
    pub fn find_match<T: PrimInt>(&self, window: &FusedWindow<T>, query: &[T]) -> Match {
        let mut best_start = 0usize;
        let mut best_len = 0usize;
        let mut node = self.root;
        while node != NIL {
            let content = self.content(window, node);
            let limit = query.len().min(self.string_size);
            let mut prefix = 0;
            while prefix < limit && query[prefix] == content[prefix] {
                prefix += 1;
            }
            if prefix == self.string_size {
                return Match {
                    position: self.nodes[node as usize].start - window.start_position(),
                    length: self.string_size,
                };
            }
            if prefix > best_len
                || (prefix > 0 && prefix == best_len && self.nodes[node as usize].start > best_start)
            {
                best_start = self.nodes[node as usize].start;
                best_len = prefix;
            }
            node = if query[prefix..] < content[prefix..] {
                self.nodes[node as usize].left
            } else {
                self.nodes[node as usize].right
            };
        }
        if best_len == 0 {
            Match {
                position: 0,
                length: 0,
            }
        } else {
            Match {
                position: best_start - window.start_position(),
                length: best_len,
            }
        }
    }

    fn allocate(&mut self, start: usize, parent: NodeId) -> NodeId {
        let node = Node {
            start,
            refs: 1,
            parent,
            left: NIL,
            right: NIL,
            color: Color::Red,
        };
        match self.free.pop() {
            Some(id) => {
                self.nodes[id as usize] = node;
                id
            }
            None => {
                self.nodes.push(node);
                (self.nodes.len() - 1) as NodeId
            }
        }
    }

    fn color(&self, id: NodeId) -> Color {
        if id == NIL {
            Color::Black
        } else {
            self.nodes[id as usize].color
        }
    }

    fn rotate_left(&mut self, x: NodeId) {
        let y = self.nodes[x as usize].right;
        let y_left = self.nodes[y as usize].left;
        self.nodes[x as usize].right = y_left;
        if y_left != NIL {
            self.nodes[y_left as usize].parent = x;
        }
        let p = self.nodes[x as usize].parent;
        self.nodes[y as usize].parent = p;
        if p == NIL {
            self.root = y;
        } else if self.nodes[p as usize].left == x {
            self.nodes[p as usize].left = y;
        } else {
            self.nodes[p as usize].right = y;
        }
        self.nodes[y as usize].left = x;
        self.nodes[x as usize].parent = y;
    }

    fn rotate_right(&mut self, x: NodeId) {
        let y = self.nodes[x as usize].left;
        let y_right = self.nodes[y as usize].right;
        self.nodes[x as usize].left = y_right;
        if y_right != NIL {
            self.nodes[y_right as usize].parent = x;
        }
        let p = self.nodes[x as usize].parent;
        self.nodes[y as usize].parent = p;
        if p == NIL {
            self.root = y;
        } else if self.nodes[p as usize].left == x {
            self.nodes[p as usize].left = y;
        } else {
            self.nodes[p as usize].right = y;
        }
        self.nodes[y as usize].right = x;
        self.nodes[x as usize].parent = y;
    }

    fn insert_fixup(&mut self, mut z: NodeId) {
        while z != self.root && self.color(self.nodes[z as usize].parent) == Color::Red {
            let parent = self.nodes[z as usize].parent;
            let grandparent = self.nodes[parent as usize].parent;
            if parent == self.nodes[grandparent as usize].left {
                let uncle = self.nodes[grandparent as usize].right;
                if self.color(uncle) == Color::Red {
                    self.nodes[parent as usize].color = Color::Black;
                    self.nodes[uncle as usize].color = Color::Black;
                    self.nodes[grandparent as usize].color = Color::Red;
                    z = grandparent;
                } else {
                    if z == self.nodes[parent as usize].right {
                        z = parent;
                        self.rotate_left(z);
                    }
                    let parent = self.nodes[z as usize].parent;
                    let grandparent = self.nodes[parent as usize].parent;
                    self.nodes[parent as usize].color = Color::Black;
                    self.nodes[grandparent as usize].color = Color::Red;
                    self.rotate_right(grandparent);
                }
            } else {
                let uncle = self.nodes[grandparent as usize].left;
                if self.color(uncle) == Color::Red {
                    self.nodes[parent as usize].color = Color::Black;
                    self.nodes[uncle as usize].color = Color::Black;
                    self.nodes[grandparent as usize].color = Color::Red;
                    z = grandparent;
                } else {
                    if z == self.nodes[parent as usize].left {
                        z = parent;
                        self.rotate_right(z);
                    }
                    let parent = self.nodes[z as usize].parent;
                    let grandparent = self.nodes[parent as usize].parent;
                    self.nodes[parent as usize].color = Color::Black;
                    self.nodes[grandparent as usize].color = Color::Red;
                    self.rotate_left(grandparent);
                }
            }
        }
        let root = self.root;
        self.nodes[root as usize].color = Color::Black;
    }

    fn minimum(&self, mut id: NodeId) -> NodeId {
        while self.nodes[id as usize].left != NIL {
            id = self.nodes[id as usize].left;
        }
        id
    }

    /// Replace the subtree rooted at `u` with the one rooted at `v`.
    fn transplant(&mut self, u: NodeId, v: NodeId) {
        let p = self.nodes[u as usize].parent;
        if p == NIL {
            self.root = v;
        } else if self.nodes[p as usize].left == u {
            self.nodes[p as usize].left = v;
        } else {
            self.nodes[p as usize].right = v;
        }
        if v != NIL {
            self.nodes[v as usize].parent = p;
        }
    }

    fn delete(&mut self, z: NodeId) {
        let mut removed_color = self.nodes[z as usize].color;
        let fix_child;
        let fix_parent;
        if self.nodes[z as usize].left == NIL {
            fix_child = self.nodes[z as usize].right;
            fix_parent = self.nodes[z as usize].parent;
            self.transplant(z, fix_child);
        } else if self.nodes[z as usize].right == NIL {
            fix_child = self.nodes[z as usize].left;
            fix_parent = self.nodes[z as usize].parent;
            self.transplant(z, fix_child);
        } else {
            let y = self.minimum(self.nodes[z as usize].right);
            removed_color = self.nodes[y as usize].color;
            fix_child = self.nodes[y as usize].right;
            if self.nodes[y as usize].parent == z {
                fix_parent = y;
            } else {
                fix_parent = self.nodes[y as usize].parent;
                self.transplant(y, fix_child);
                let z_right = self.nodes[z as usize].right;
                self.nodes[y as usize].right = z_right;
                self.nodes[z_right as usize].parent = y;
            }
            self.transplant(z, y);
            let z_left = self.nodes[z as usize].left;
            self.nodes[y as usize].left = z_left;
            self.nodes[z_left as usize].parent = y;
            self.nodes[y as usize].color = self.nodes[z as usize].color;
        }
        self.free.push(z);
        if removed_color == Color::Black {
            self.delete_fixup(fix_child, fix_parent);
        }
    }

    fn delete_fixup(&mut self, mut x: NodeId, mut px: NodeId) {
        while x != self.root && self.color(x) == Color::Black {
            if px == NIL {
                break;
            }
            if x == self.nodes[px as usize].left {
                let mut w = self.nodes[px as usize].right;
                if self.color(w) == Color::Red {
                    self.nodes[w as usize].color = Color::Black;
                    self.nodes[px as usize].color = Color::Red;
                    self.rotate_left(px);
                    w = self.nodes[px as usize].right;
                }
                let w_left = self.nodes[w as usize].left;
                let w_right = self.nodes[w as usize].right;
                if self.color(w_left) == Color::Black && self.color(w_right) == Color::Black {
                    self.nodes[w as usize].color = Color::Red;
                    x = px;
                    px = self.nodes[x as usize].parent;
                } else {
                    if self.color(w_right) == Color::Black {
                        if w_left != NIL {
                            self.nodes[w_left as usize].color = Color::Black;
                        }
                        self.nodes[w as usize].color = Color::Red;
                        self.rotate_right(w);
                        w = self.nodes[px as usize].right;
                    }
                    self.nodes[w as usize].color = self.nodes[px as usize].color;
                    self.nodes[px as usize].color = Color::Black;
                    let w_right = self.nodes[w as usize].right;
                    if w_right != NIL {
                        self.nodes[w_right as usize].color = Color::Black;
                    }
                    self.rotate_left(px);
                    x = self.root;
                    break;
                }
            } else {
                let mut w = self.nodes[px as usize].left;
                if self.color(w) == Color::Red {
                    self.nodes[w as usize].color = Color::Black;
                    self.nodes[px as usize].color = Color::Red;
                    self.rotate_right(px);
                    w = self.nodes[px as usize].left;
                }
                let w_left = self.nodes[w as usize].left;
                let w_right = self.nodes[w as usize].right;
                if self.color(w_left) == Color::Black && self.color(w_right) == Color::Black {
                    self.nodes[w as usize].color = Color::Red;
                    x = px;
                    px = self.nodes[x as usize].parent;
                } else {
                    if self.color(w_left) == Color::Black {
                        if w_right != NIL {
                            self.nodes[w_right as usize].color = Color::Black;
                        }
                        self.nodes[w as usize].color = Color::Red;
                        self.rotate_left(w);
                        w = self.nodes[px as usize].left;
                    }
                    self.nodes[w as usize].color = self.nodes[px as usize].color;
                    self.nodes[px as usize].color = Color::Black;
                    let w_left = self.nodes[w as usize].left;
                    if w_left != NIL {
                        self.nodes[w_left as usize].color = Color::Black;
                    }
                    self.rotate_right(px);
                    x = self.root;
                    break;
                }
            }
        }
        if x != NIL {
            self.nodes[x as usize].color = Color::Black;
        }
    }

    /// Check the red-black shape: black root, no red node with a red child,
    /// and equal black height on every root-to-leaf path.
    #[cfg(test)]
    pub fn assert_red_black_invariants(&self) {
        assert_eq!(self.color(self.root), Color::Black, "root must be black");
        self.check_subtree(self.root);
    }

    #[cfg(test)]
    fn check_subtree(&self, id: NodeId) -> usize {
        if id == NIL {
            return 1;
        }
        let node = &self.nodes[id as usize];
        if node.color == Color::Red {
            assert_eq!(self.color(node.left), Color::Black, "red node with red child");
            assert_eq!(self.color(node.right), Color::Black, "red node with red child");
        }
        if node.left != NIL {
            assert_eq!(self.nodes[node.left as usize].parent, id);
        }
        if node.right != NIL {
            assert_eq!(self.nodes[node.right as usize].parent, id);
        }
        let left_height = self.check_subtree(node.left);
        let right_height = self.check_subtree(node.right);
        assert_eq!(left_height, right_height, "unequal black heights");
        left_height + usize::from(node.color == Color::Black)
    }
}

// *************** TESTS *****************

#[cfg(test)]
fn sentence_window() -> FusedWindow<u8> {
    FusedWindow::with_fill(1024, b"ala ma kota a kot ma ale", None).unwrap()
}

#[cfg(test)]
fn filled_tree(window: &FusedWindow<u8>) -> SearchTree {
    let mut tree = SearchTree::new(4);
    let total = window.buffer().len();
    for start in 0..=total - 4 {
        tree.add_string(window, start);
        tree.assert_red_black_invariants();
    }
    tree
}

#[test]
fn every_inserted_string_is_findable() {
    let window = sentence_window();
    let tree = filled_tree(&window);
    let sentence = b"ala ma kota a kot ma ale";
    for start in 0..=sentence.len() - 4 {
        assert!(tree.find_match(&window, &sentence[start..start + 4]).found());
    }
    assert!(tree.find_match(&window, b"abcd").found());
    assert!(tree.find_match(&window, b"abc").found());
    assert!(tree.find_match(&window, b"ab").found());
    assert!(tree.find_match(&window, b"a").found());
    assert!(!tree.find_match(&window, b"xyzo").found());
    assert!(!tree.find_match(&window, b"xyz").found());
    assert!(!tree.find_match(&window, b"xy").found());
    assert!(!tree.find_match(&window, b"x").found());
}

#[test]
fn matches_report_position_and_length() {
    let window = sentence_window();
    let tree = filled_tree(&window);
    let sentence = b"ala ma kota a kot ma ale";

    // unique prefixes resolve exactly
    assert_eq!(
        tree.find_match(&window, b"ala"),
        Match { position: 0, length: 3 }
    );
    assert_eq!(
        tree.find_match(&window, b"al"),
        Match { position: 0, length: 2 }
    );
    assert_eq!(
        tree.find_match(&window, b" ale"),
        Match { position: 20, length: 4 }
    );
    assert_eq!(
        tree.find_match(&window, b"kota"),
        Match { position: 7, length: 4 }
    );
    assert_eq!(
        tree.find_match(&window, b"kot "),
        Match { position: 14, length: 4 }
    );
    // repeated content resolves to the newest occurrence
    assert_eq!(
        tree.find_match(&window, b"kot"),
        Match { position: 14, length: 3 }
    );
    assert_eq!(
        tree.find_match(&window, b"ma"),
        Match { position: 18, length: 2 }
    );
    // any partial match must agree with the window contents
    let partial = tree.find_match(&window, b"abcd");
    assert_eq!(partial.length, 1);
    assert_eq!(sentence[partial.position], b'a');
}

#[test]
fn removal_drops_reference_counts_then_nodes() {
    let window = sentence_window();
    let mut tree = filled_tree(&window);
    let sentence = b"ala ma kota a kot ma ale";
    for start in 0..=sentence.len() - 4 {
        assert!(tree.remove_string(&window, &sentence[start..start + 4]).is_ok());
        tree.assert_red_black_invariants();
    }
    assert_eq!(tree.len(), 0);
    assert_eq!(
        tree.remove_string(&window, b"ala "),
        Err(crate::Error::UnknownString)
    );
}

#[test]
fn node_pool_recycles_ids() {
    let window = sentence_window();
    let mut tree = SearchTree::new(4);
    tree.add_string(&window, 0);
    tree.add_string(&window, 1);
    let before = tree.nodes.len();
    tree.remove_string(&window, b"la m").unwrap();
    tree.add_string(&window, 1);
    assert_eq!(tree.nodes.len(), before);
}

#[test]
fn churn_preserves_invariants() {
    // slide a short dictionary across the sentence the way the engine does
    let window = sentence_window();
    let sentence = b"ala ma kota a kot ma ale";
    let mut tree = SearchTree::new(4);
    let dict = 6;
    for start in 0..=sentence.len() - 4 {
        tree.add_string(&window, start);
        if start >= dict {
            let aged = start - dict;
            tree.remove_string(&window, &sentence[aged..aged + 4]).unwrap();
        }
        tree.assert_red_black_invariants();
    }
}
