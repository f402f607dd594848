//! A materialized root-to-leaf path over a B-tree, giving O(h) neighbor
//! navigation without re-descent (spec.md §4.3). The path is the only
//! source of ancestry — nodes carry no parent pointer on disk.

use crate::btree::cell::Cell;
use crate::btree::node::Node;
use crate::btree::ops::scan_ge;
use crate::btree::NodeType;
use crate::error::{Error, Result};
use crate::pager::{PageNum, Pager};

fn map_no_next(e: Error) -> Error {
    match e {
        Error::CursorENoNext => Error::CursorEKeyNotFound,
        other => other,
    }
}

fn map_no_prev(e: Error) -> Error {
    match e {
        Error::CursorENoPrev => Error::CursorEKeyNotFound,
        other => other,
    }
}

pub struct Cursor {
    root: PageNum,
    path: Vec<(Node, usize)>,
}

impl Cursor {
    pub fn new(root: PageNum) -> Self {
        Cursor {
            root,
            path: Vec::new(),
        }
    }

    pub fn root(&self) -> PageNum {
        self.root
    }

    fn current_node(&self) -> &Node {
        &self.path.last().expect("cursor has no current position").0
    }

    fn current_index(&self) -> usize {
        self.path.last().expect("cursor has no current position").1
    }

    fn set_current_index(&mut self, i: usize) {
        self.path.last_mut().expect("cursor has no current position").1 = i;
    }

    /// The cell at the cursor's current position.
    pub fn current_cell(&self) -> Result<Cell> {
        self.current_node().cell_get(self.current_index())
    }

    pub fn current_key(&self) -> Result<u32> {
        Ok(self.current_cell()?.key())
    }

    /// Descends from the current node into the child referenced by its
    /// current cell index: the matching cell's `child_page`, or
    /// `right_page` when `cell_index == n_cells` (spec.md §4.3
    /// `goDownCurrentCell`).
    fn go_down_current_cell(&mut self, pager: &mut Pager) -> Result<()> {
        let (node, idx) = self.path.last().unwrap();
        let next_page = if *idx == node.n_cells() {
            node.right_page().ok_or(Error::ECorruptHeader)?
        } else {
            node.cell_get(*idx)?.child_page().ok_or(Error::ECorruptHeader)?
        };
        let child = Node::load(pager, next_page as PageNum)?;
        self.path.push((child, 0));
        Ok(())
    }

    fn go_to_parent(&mut self) {
        self.path.pop();
    }

    fn descend_leftmost(&mut self, pager: &mut Pager) -> Result<()> {
        while self.current_node().node_type.is_internal() {
            self.go_down_current_cell(pager)?;
        }
        Ok(())
    }

    fn descend_rightmost(&mut self, pager: &mut Pager) -> Result<()> {
        loop {
            let n = self.current_node().n_cells();
            if !self.current_node().node_type.is_internal() {
                if n == 0 {
                    return Err(Error::ECorruptHeader);
                }
                self.set_current_index(n - 1);
                return Ok(());
            }
            self.set_current_index(n);
            self.go_down_current_cell(pager)?;
        }
    }

    /// Resets the path to the root and descends leftmost to a leaf.
    pub fn rewind(&mut self, pager: &mut Pager) -> Result<()> {
        self.path.clear();
        let root = Node::load(pager, self.root)?;
        self.path.push((root, 0));
        self.descend_leftmost(pager)
    }

    /// True when the tree holds no rows at all: a freshly rewound cursor
    /// sits on an empty leaf root.
    pub fn is_empty_tree(&self) -> bool {
        self.path.len() == 1 && !self.current_node().node_type.is_internal() && self.current_node().n_cells() == 0
    }

    /// Advances to the in-order successor (spec.md §4.3 `next`).
    pub fn next(&mut self, pager: &mut Pager) -> Result<()> {
        let node_type = self.current_node().node_type;
        debug_assert_ne!(node_type, NodeType::TableInternal);
        let n_cells = self.current_node().n_cells();
        let idx = self.current_index();

        if idx + 1 < n_cells {
            self.set_current_index(idx + 1);
            if node_type == NodeType::IndexInternal {
                self.go_down_current_cell(pager)?;
                self.descend_leftmost(pager)?;
            }
            return Ok(());
        }

        if !node_type.is_internal() {
            loop {
                if self.path.len() == 1 {
                    return Err(Error::CursorENoNext);
                }
                self.go_to_parent();
                let (pnode, pidx) = self.path.last().unwrap();
                if *pidx < pnode.n_cells() {
                    break;
                }
            }
            let (pnode_type, pidx) = {
                let (pnode, pidx) = self.path.last().unwrap();
                (pnode.node_type, *pidx)
            };
            if pnode_type == NodeType::IndexInternal {
                return Ok(());
            }
            self.set_current_index(pidx + 1);
            self.go_down_current_cell(pager)?;
            self.descend_leftmost(pager)?;
            return Ok(());
        }

        debug_assert_eq!(node_type, NodeType::IndexInternal);
        self.set_current_index(n_cells);
        self.go_down_current_cell(pager)?;
        self.descend_leftmost(pager)?;
        Ok(())
    }

    /// Retreats to the in-order predecessor (spec.md §4.3 `prev`).
    pub fn prev(&mut self, pager: &mut Pager) -> Result<()> {
        let node_type = self.current_node().node_type;
        debug_assert_ne!(node_type, NodeType::TableInternal);

        if node_type == NodeType::IndexInternal {
            // the predecessor of an index-internal entry is the rightmost
            // entry of its own child subtree.
            self.go_down_current_cell(pager)?;
            self.descend_rightmost(pager)?;
            return Ok(());
        }

        let idx = self.current_index();
        if idx > 0 {
            self.set_current_index(idx - 1);
            return Ok(());
        }

        loop {
            if self.path.len() == 1 {
                return Err(Error::CursorENoPrev);
            }
            self.go_to_parent();
            let (pnode, pidx) = self.path.last().unwrap();
            if *pidx > 0 {
                break;
            }
        }
        let (pnode_type, pidx) = {
            let (pnode, pidx) = self.path.last().unwrap();
            (pnode.node_type, *pidx)
        };
        if pnode_type == NodeType::IndexInternal {
            return Ok(());
        }
        self.set_current_index(pidx - 1);
        self.go_down_current_cell(pager)?;
        self.descend_rightmost(pager)?;
        Ok(())
    }

    /// Rewinds to root then descends toward `key`, landing at the smallest
    /// cell with `cell.key() >= key` (or an exact INDEX_INTERNAL match),
    /// per spec.md §4.3 `seek_partial`.
    fn seek_partial(&mut self, pager: &mut Pager, key: u32) -> Result<()> {
        self.path.clear();
        let root = Node::load(pager, self.root)?;
        self.path.push((root, 0));
        loop {
            let node_type = self.current_node().node_type;
            let n_cells = self.current_node().n_cells();
            let idx = scan_ge(self.current_node(), key)?;
            self.set_current_index(idx);
            if !node_type.is_internal() {
                return Ok(());
            }
            if node_type == NodeType::IndexInternal && idx < n_cells {
                let cell = self.current_node().cell_get(idx)?;
                if cell.key() == key {
                    return Ok(());
                }
            }
            self.go_down_current_cell(pager)?;
        }
    }

    /// Positions on the cell with key exactly `key`.
    pub fn seek(&mut self, pager: &mut Pager, key: u32) -> Result<()> {
        self.seek_partial(pager, key)?;
        let idx = self.current_index();
        let n = self.current_node().n_cells();
        if idx == n || self.current_node().cell_get(idx)?.key() != key {
            return Err(Error::CursorEKeyNotFound);
        }
        Ok(())
    }

    /// Positions on the smallest cell with key >= `key`.
    pub fn seek_ge(&mut self, pager: &mut Pager, key: u32) -> Result<()> {
        self.seek_partial(pager, key)?;
        let node_type = self.current_node().node_type;
        let idx = self.current_index();
        let n = self.current_node().n_cells();

        if idx == n {
            return if node_type == NodeType::TableLeaf {
                Err(Error::CursorEKeyNotFound)
            } else {
                self.next(pager).map_err(map_no_next)
            };
        }

        match node_type {
            NodeType::TableLeaf | NodeType::IndexInternal => Ok(()),
            NodeType::IndexLeaf => {
                let landing_key = self.current_node().cell_get(idx)?.key();
                if key > landing_key {
                    self.next(pager).map_err(map_no_next)
                } else {
                    Ok(())
                }
            }
            NodeType::TableInternal => unreachable!("seek_partial never lands on an internal node of table type"),
        }
    }

    /// Positions on the smallest cell with key > `key`.
    pub fn seek_gt(&mut self, pager: &mut Pager, key: u32) -> Result<()> {
        self.seek_partial(pager, key)?;
        let idx = self.current_index();
        let n = self.current_node().n_cells();
        let needs_next = if idx == n {
            true
        } else {
            self.current_node().cell_get(idx)?.key() == key
        };
        if needs_next {
            self.next(pager).map_err(map_no_next)
        } else {
            Ok(())
        }
    }

    /// Positions on the largest cell with key <= `key`.
    pub fn seek_le(&mut self, pager: &mut Pager, key: u32) -> Result<()> {
        self.seek_partial(pager, key)?;
        let idx = self.current_index();
        let n = self.current_node().n_cells();
        if idx == n {
            if n == 0 {
                return Err(Error::CursorEKeyNotFound);
            }
            self.set_current_index(n - 1);
            return Ok(());
        }
        let landing_key = self.current_node().cell_get(idx)?.key();
        if landing_key == key {
            Ok(())
        } else {
            self.prev(pager).map_err(map_no_prev)
        }
    }

    /// Positions on the largest cell with key < `key`.
    pub fn seek_lt(&mut self, pager: &mut Pager, key: u32) -> Result<()> {
        self.seek_partial(pager, key)?;
        let idx = self.current_index();
        let n = self.current_node().n_cells();
        if idx == n {
            if n == 0 {
                return Err(Error::CursorEKeyNotFound);
            }
            self.set_current_index(n - 1);
            return Ok(());
        }
        self.prev(pager).map_err(map_no_prev)
    }
}
