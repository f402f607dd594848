//! The operations that keep a B-tree ordered: find, insert, and the split
//! that keeps nodes within a page (spec.md §4.2).

use crate::btree::cell::Cell;
use crate::btree::node::Node;
use crate::btree::NodeType;
use crate::error::{Error, Result};
use crate::pager::{PageNum, Pager};

/// Smallest index `i` with `node.cell_get(i)?.key() >= key`, or `n_cells()`
/// if every cell's key is smaller.
pub(crate) fn scan_ge(node: &Node, key: u32) -> Result<usize> {
    for i in 0..node.n_cells() {
        if node.cell_get(i)?.key() >= key {
            return Ok(i);
        }
    }
    Ok(node.n_cells())
}

/// Descends from `root` looking for `key`. Returns the row payload for a
/// table B-tree, or `keyPk` as 4 big-endian bytes for an index B-tree.
pub fn btree_find(pager: &mut Pager, root: PageNum, key: u32) -> Result<Vec<u8>> {
    let mut page_no = root;
    loop {
        let node = Node::load(pager, page_no)?;
        if node.node_type.is_internal() {
            let idx = scan_ge(&node, key)?;
            if idx < node.n_cells() {
                let cell = node.cell_get(idx)?;
                if node.node_type == NodeType::IndexInternal && cell.key() == key {
                    return Ok(cell.key_pk().unwrap().to_be_bytes().to_vec());
                }
                page_no = cell.child_page().unwrap() as PageNum;
            } else {
                match node.right_page() {
                    Some(rp) if rp != 0 => page_no = rp as PageNum,
                    _ => return Err(Error::ENotFound),
                }
            }
        } else {
            let idx = scan_ge(&node, key)?;
            if idx >= node.n_cells() {
                return Err(Error::ENotFound);
            }
            let cell = node.cell_get(idx)?;
            if cell.key() != key {
                return Err(Error::ENotFound);
            }
            return match cell {
                Cell::TableLeaf { payload, .. } => Ok(payload),
                Cell::IndexLeaf { key_pk, .. } => Ok(key_pk.to_be_bytes().to_vec()),
                _ => unreachable!("leaf node types are TableLeaf or IndexLeaf"),
            };
        }
    }
}

/// Inserts `cell` into the table or index B-tree rooted at `root`,
/// performing a root split first if the root has no room for it. Rejects a
/// `TableLeaf` payload that would not survive the `payload.len() as u32`
/// cast `Cell::size`/`Cell::to_bytes` perform, rather than silently
/// truncating the on-disk length header (spec.md §9).
pub fn btree_insert(pager: &mut Pager, root: PageNum, cell: Cell) -> Result<()> {
    if let Cell::TableLeaf { payload, .. } = &cell {
        if payload.len() > u32::MAX as usize {
            return Err(Error::EIo("table leaf payload exceeds u32::MAX bytes".to_string()));
        }
    }
    let root_node = Node::load(pager, root)?;
    let full = root_node.is_full_for(cell.size());
    drop(root_node);
    if full {
        split(pager, 0, root, 0)?;
    }
    insert_non_full(pager, root, &cell)
}

/// Walks down from `page_no` inserting `cell` into the first non-full node
/// on its path, splitting any full child encountered along the way and
/// restarting the scan on the current page afterward (spec.md §4.2).
pub fn insert_non_full(pager: &mut Pager, mut page_no: PageNum, cell: &Cell) -> Result<()> {
    loop {
        let mut node = Node::load(pager, page_no)?;
        let idx = scan_ge(&node, cell.key())?;

        if !node.node_type.is_internal() {
            if idx < node.n_cells() && node.cell_get(idx)?.key() == cell.key() {
                return Err(Error::EDuplicate);
            }
            node.cell_insert(idx, cell)?;
            return node.write(pager);
        }

        if idx < node.n_cells() {
            let candidate = node.cell_get(idx)?;
            if node.node_type == NodeType::IndexInternal && candidate.key() == cell.key() {
                return Err(Error::EDuplicate);
            }
        }

        let child_page = if idx < node.n_cells() {
            node.cell_get(idx)?.child_page().unwrap() as PageNum
        } else {
            node.right_page().ok_or(Error::ECorruptHeader)? as PageNum
        };

        let child = Node::load(pager, child_page)?;
        let child_full = child.is_full_for(cell.size());
        drop(child);
        drop(node);

        if child_full {
            split(pager, page_no, child_page, idx)?;
            continue; // the freshly inserted median may change where this cell belongs.
        }
        page_no = child_page;
    }
}

/// Splits the node at `child_page` around its median cell. `parent_page ==
/// 0` signals a root split: `child_page` names the root itself, which is
/// reinitialized in place as the new parent once both halves are written
/// out to fresh pages. Otherwise the post-median half is written back into
/// `child_page` in place (so the real parent's existing pointer to it stays
/// valid) and the median is inserted into `parent_page` at `parent_ncell`.
/// Returns the page number of the pre-median half.
pub fn split(
    pager: &mut Pager,
    parent_page: PageNum,
    child_page: PageNum,
    parent_ncell: usize,
) -> Result<PageNum> {
    let is_root_split = parent_page == 0;

    let child = Node::load(pager, child_page)?;
    let node_type = child.node_type;
    let n = child.n_cells();
    let cells: Vec<Cell> = (0..n).map(|i| child.cell_get(i)).collect::<Result<_>>()?;
    let child_right_page = child.right_page();
    drop(child);

    let m = n / 2;
    let median = cells[m].clone();
    let left_end = if node_type == NodeType::TableLeaf { m + 1 } else { m };

    let (m_page_no, mut m_node) = Node::new(pager, node_type)?;
    for c in &cells[0..left_end] {
        let at = m_node.n_cells();
        m_node.cell_insert(at, c)?;
    }
    if node_type.is_internal() {
        m_node.set_right_page(median.child_page().unwrap());
    }
    m_node.write(pager)?;

    let remainder = &cells[m + 1..n];

    let (_parent_actual_page, mut parent_node, insert_idx) = if is_root_split {
        let (p2_page_no, mut p2_node) = Node::new(pager, node_type)?;
        for c in remainder {
            let at = p2_node.n_cells();
            p2_node.cell_insert(at, c)?;
        }
        if node_type.is_internal() {
            p2_node.set_right_page(child_right_page.ok_or(Error::ECorruptHeader)?);
        }
        p2_node.write(pager)?;

        let mut new_root = Node::init_empty(pager, child_page, node_type.internal_variant())?;
        new_root.set_right_page(p2_page_no as u32);
        (child_page, new_root, 0)
    } else {
        let mut remainder_node = Node::init_empty(pager, child_page, node_type)?;
        for c in remainder {
            let at = remainder_node.n_cells();
            remainder_node.cell_insert(at, c)?;
        }
        if node_type.is_internal() {
            remainder_node.set_right_page(child_right_page.ok_or(Error::ECorruptHeader)?);
        }
        remainder_node.write(pager)?;

        (parent_page, Node::load(pager, parent_page)?, parent_ncell)
    };

    parent_node.cell_insert(insert_idx, &median.promote_to_internal(m_page_no as u32))?;
    parent_node.write(pager)?;

    Ok(m_page_no)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_pager(name: &str) -> Pager {
        let mut p = std::env::temp_dir();
        p.push(format!("microdb-ops-test-{}-{}", std::process::id(), name));
        let _ = std::fs::remove_file(&p);
        Pager::open(p.to_str().unwrap()).unwrap()
    }

    fn fresh_table_root(pager: &mut Pager) -> PageNum {
        // page 1 already holds an empty TABLE_LEAF from Pager::open's bootstrap.
        let _ = Node::load(pager, 1).unwrap();
        1
    }

    #[test]
    fn insert_then_find_s3() {
        let mut pager = temp_pager("s3");
        let root = fresh_table_root(&mut pager);
        btree_insert(
            &mut pager,
            root,
            Cell::TableLeaf {
                key: 7,
                payload: b"a".to_vec(),
            },
        )
        .unwrap();
        btree_insert(
            &mut pager,
            root,
            Cell::TableLeaf {
                key: 3,
                payload: b"bb".to_vec(),
            },
        )
        .unwrap();
        btree_insert(
            &mut pager,
            root,
            Cell::TableLeaf {
                key: 11,
                payload: b"ccc".to_vec(),
            },
        )
        .unwrap();

        assert_eq!(btree_find(&mut pager, root, 3).unwrap(), b"bb");
        assert_eq!(btree_find(&mut pager, root, 7).unwrap(), b"a");
        assert_eq!(btree_find(&mut pager, root, 11).unwrap(), b"ccc");
        assert_eq!(btree_find(&mut pager, root, 5).unwrap_err(), Error::ENotFound);
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let mut pager = temp_pager("dup");
        let root = fresh_table_root(&mut pager);
        btree_insert(
            &mut pager,
            root,
            Cell::TableLeaf {
                key: 1,
                payload: b"x".to_vec(),
            },
        )
        .unwrap();
        let err = btree_insert(
            &mut pager,
            root,
            Cell::TableLeaf {
                key: 1,
                payload: b"y".to_vec(),
            },
        )
        .unwrap_err();
        assert_eq!(err, Error::EDuplicate);
    }

    #[test]
    fn forced_split_keeps_all_keys_sorted_s4() {
        let mut pager = temp_pager("s4");
        let root = fresh_table_root(&mut pager);
        for key in 1u32..=100 {
            btree_insert(
                &mut pager,
                root,
                Cell::TableLeaf {
                    key,
                    payload: vec![0xAB; 200],
                },
            )
            .unwrap();
        }
        for key in 1u32..=100 {
            assert_eq!(btree_find(&mut pager, root, key).unwrap().len(), 200);
        }
        let root_node = Node::load(&mut pager, root).unwrap();
        assert!(root_node.node_type.is_internal(), "root should have split by now");
    }

    #[test]
    fn split_preserves_membership() {
        let mut pager = temp_pager("split-membership");
        let root = fresh_table_root(&mut pager);
        let keys: Vec<u32> = (1..=30).collect();
        for &k in &keys {
            btree_insert(
                &mut pager,
                root,
                Cell::TableLeaf {
                    key: k,
                    payload: vec![k as u8; 40],
                },
            )
            .unwrap();
        }
        for &k in &keys {
            assert!(btree_find(&mut pager, root, k).is_ok());
        }
        assert_eq!(
            btree_find(&mut pager, root, 31).unwrap_err(),
            Error::ENotFound
        );
    }
}
