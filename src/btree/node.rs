//! A B-tree node occupies exactly one page: a small fixed header, a
//! cell-offset array that imposes logical (ascending-key) order on cells
//! packed, in no particular physical order, against the end of the page
//! (spec.md §3, §4.1).

use byteorder::{BigEndian, ByteOrder};

use crate::btree::cell::Cell;
use crate::btree::NodeType;
use crate::dbheader;
use crate::error::{Error, Result};
use crate::pager::{PageNum, Pager};

const COMMON_HEADER_LEN: usize = 7; // type(1) + free_offset(2) + n_cells(2) + cells_offset(2)
const RIGHT_PAGE_LEN: usize = 4;

fn header_len(node_type: NodeType) -> usize {
    if node_type.is_internal() {
        COMMON_HEADER_LEN + RIGHT_PAGE_LEN
    } else {
        COMMON_HEADER_LEN
    }
}

/// Reads a page-offset field that, per SQLite convention, stores 0 on disk
/// to mean "page size" when the true value does not fit a u16 (only
/// reachable with the maximal 65536-byte page size).
fn read_page_offset(bytes: &[u8]) -> u32 {
    match BigEndian::read_u16(bytes) {
        0 => 65536,
        v => v as u32,
    }
}

fn write_page_offset(bytes: &mut [u8], v: u32) {
    if v == 65536 {
        BigEndian::write_u16(bytes, 0);
    } else {
        BigEndian::write_u16(bytes, v as u16);
    }
}

/// Formats `buf[header_offset..]` as an empty node of `node_type`, without
/// touching the pager. Used both by `Node::init_empty` (mutating an
/// already-allocated page) and by the pager's own bootstrap of page 1's
/// node header on first open, which cannot yet depend on a `Node`.
pub fn format_empty_page(buf: &mut [u8], header_offset: usize, node_type: NodeType, page_size: u32) {
    buf[header_offset] = node_type.to_u8();
    write_page_offset(
        &mut buf[header_offset + 1..header_offset + 3],
        (header_offset + header_len(node_type)) as u32,
    );
    BigEndian::write_u16(&mut buf[header_offset + 3..header_offset + 5], 0);
    write_page_offset(&mut buf[header_offset + 5..header_offset + 7], page_size);
    if node_type.is_internal() {
        BigEndian::write_u32(&mut buf[header_offset + 7..header_offset + 11], 0);
    }
}

/// The header offset for a page: page 1 carries the 100-byte file header
/// before its node header; every other page starts its node header at 0.
pub fn header_offset_for(page_no: PageNum) -> usize {
    if page_no == 1 {
        dbheader::HEADER_BYTES
    } else {
        0
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub page_no: PageNum,
    pub node_type: NodeType,
    header_offset: usize,
    free_offset: u32,
    n_cells: u16,
    cells_offset: u32,
    right_page: u32,
    page_size: u32,
    buf: Vec<u8>,
}

impl Node {
    /// Parses a node's header out of an already-loaded page buffer.
    pub fn parse(page_no: PageNum, buf: Vec<u8>, page_size: u32) -> Result<Self> {
        let header_offset = header_offset_for(page_no);
        if buf.len() < header_offset + COMMON_HEADER_LEN {
            return Err(Error::ECorruptHeader);
        }
        let node_type =
            NodeType::from_u8(buf[header_offset]).ok_or(Error::ECorruptHeader)?;
        if buf.len() < header_offset + header_len(node_type) {
            return Err(Error::ECorruptHeader);
        }
        let free_offset = read_page_offset(&buf[header_offset + 1..header_offset + 3]);
        let n_cells = BigEndian::read_u16(&buf[header_offset + 3..header_offset + 5]);
        let cells_offset = read_page_offset(&buf[header_offset + 5..header_offset + 7]);
        let right_page = if node_type.is_internal() {
            BigEndian::read_u32(&buf[header_offset + 7..header_offset + 11])
        } else {
            0
        };
        if free_offset > cells_offset {
            return Err(Error::ECorruptHeader);
        }
        Ok(Node {
            page_no,
            node_type,
            header_offset,
            free_offset,
            n_cells,
            cells_offset,
            right_page,
            page_size,
            buf,
        })
    }

    /// Loads page `page_no` through the pager and parses its node header.
    pub fn load(pager: &mut Pager, page_no: PageNum) -> Result<Self> {
        let view = pager.read_page(page_no)?;
        Node::parse(page_no, view.buf, pager.page_size())
    }

    /// Produces an empty node of `node_type` at `page_no` and persists it.
    pub fn init_empty(pager: &mut Pager, page_no: PageNum, node_type: NodeType) -> Result<Self> {
        let page_size = pager.page_size();
        let mut buf = vec![0u8; page_size as usize];
        let header_offset = header_offset_for(page_no);
        format_empty_page(&mut buf, header_offset, node_type, page_size);
        let node = Node::parse(page_no, buf, page_size)?;
        node.clone().write(pager)?;
        Ok(node)
    }

    /// Allocates a fresh page and initializes it as an empty node.
    pub fn new(pager: &mut Pager, node_type: NodeType) -> Result<(PageNum, Self)> {
        let page_no = pager.alloc_page()?;
        let node = Node::init_empty(pager, page_no, node_type)?;
        Ok((page_no, node))
    }

    /// Re-serializes the header scalars and hands the page back to the
    /// pager. Consumes `self` by value: once written, the in-memory view is
    /// no longer the node of record (spec.md §9 "Node view invalidation on
    /// split" — making this consume-by-value is the explicit lifetime the
    /// design note asks for).
    pub fn write(mut self, pager: &mut Pager) -> Result<()> {
        let off = self.header_offset;
        self.buf[off] = self.node_type.to_u8();
        write_page_offset(&mut self.buf[off + 1..off + 3], self.free_offset);
        BigEndian::write_u16(&mut self.buf[off + 3..off + 5], self.n_cells);
        write_page_offset(&mut self.buf[off + 5..off + 7], self.cells_offset);
        if self.node_type.is_internal() {
            BigEndian::write_u32(&mut self.buf[off + 7..off + 11], self.right_page);
        }
        pager.write_page(crate::pager::PageView {
            page_no: self.page_no,
            buf: self.buf,
        })
    }

    pub fn n_cells(&self) -> usize {
        self.n_cells as usize
    }

    pub fn right_page(&self) -> Option<u32> {
        if self.node_type.is_internal() {
            Some(self.right_page)
        } else {
            None
        }
    }

    pub fn set_right_page(&mut self, page_no: u32) {
        debug_assert!(self.node_type.is_internal());
        self.right_page = page_no;
    }

    fn offset_array_start(&self) -> usize {
        self.header_offset + header_len(self.node_type)
    }

    fn offsets(&self) -> Vec<u32> {
        let start = self.offset_array_start();
        (0..self.n_cells as usize)
            .map(|i| read_page_offset(&self.buf[start + i * 2..start + i * 2 + 2]))
            .collect()
    }

    /// Whether a cell of `cell_size` bytes can be inserted without
    /// overrunning the boundary between the offset array and the cell
    /// content area (spec.md §4.1: "a full-check helper reports whether the
    /// free gap can admit cell_size + 2").
    pub fn is_full_for(&self, cell_size: usize) -> bool {
        let gap = self.cells_offset as i64 - self.free_offset as i64;
        gap < (cell_size + 2) as i64
    }

    /// Reads the cell at logical position `i`.
    pub fn cell_get(&self, i: usize) -> Result<Cell> {
        if i >= self.n_cells as usize {
            return Err(Error::ECellNo);
        }
        let offsets = self.offsets();
        let off = offsets[i] as usize;
        if off >= self.buf.len() {
            return Err(Error::ECorruptHeader);
        }
        Cell::from_bytes(self.node_type, &self.buf[off..])
    }

    fn set_offsets(&mut self, offsets: &[u32]) {
        let start = self.offset_array_start();
        for (idx, off) in offsets.iter().enumerate() {
            write_page_offset(&mut self.buf[start + idx * 2..start + idx * 2 + 2], *off);
        }
    }

    /// Inserts `cell` at logical position `i`, shifting later offset-array
    /// entries up to make room. Fails with `ECellNo` if `i` is out of
    /// range; the caller (btree::ops) is responsible for ensuring the node
    /// is not full for this cell's size first.
    pub fn cell_insert(&mut self, i: usize, cell: &Cell) -> Result<()> {
        if i > self.n_cells as usize {
            return Err(Error::ECellNo);
        }
        if cell.node_type() != self.node_type {
            return Err(Error::ECorruptHeader);
        }
        let bytes = cell.to_bytes();
        let cell_size = bytes.len();
        if self.is_full_for(cell_size) {
            return Err(Error::ENoMem);
        }
        let new_cells_offset = self.cells_offset - cell_size as u32;
        let write_at = new_cells_offset as usize;
        self.buf[write_at..write_at + cell_size].copy_from_slice(&bytes);

        let mut offsets = self.offsets();
        offsets.insert(i, new_cells_offset);
        self.set_offsets(&offsets);

        self.cells_offset = new_cells_offset;
        self.free_offset += 2;
        self.n_cells += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_pager(name: &str) -> Pager {
        let mut p = std::env::temp_dir();
        p.push(format!("microdb-node-test-{}-{}", std::process::id(), name));
        let _ = std::fs::remove_file(&p);
        Pager::open(p.to_str().unwrap()).unwrap()
    }

    #[test]
    fn empty_node_has_expected_header() {
        let mut pager = temp_pager("empty");
        let (pn, node) = Node::new(&mut pager, NodeType::TableLeaf).unwrap();
        assert_eq!(pn, 2);
        assert_eq!(node.n_cells(), 0);
        assert!(node.right_page().is_none());
    }

    #[test]
    fn insert_and_read_back_cells_in_order() {
        let mut pager = temp_pager("insert");
        let (pn, mut node) = Node::new(&mut pager, NodeType::TableLeaf).unwrap();
        node.cell_insert(
            0,
            &Cell::TableLeaf {
                key: 7,
                payload: b"a".to_vec(),
            },
        )
        .unwrap();
        node.cell_insert(
            0,
            &Cell::TableLeaf {
                key: 3,
                payload: b"bb".to_vec(),
            },
        )
        .unwrap();
        assert_eq!(node.n_cells(), 2);
        assert_eq!(node.cell_get(0).unwrap().key(), 3);
        assert_eq!(node.cell_get(1).unwrap().key(), 7);
        node.write(&mut pager).unwrap();

        let reloaded = Node::load(&mut pager, pn).unwrap();
        assert_eq!(reloaded.n_cells(), 2);
        assert_eq!(reloaded.cell_get(0).unwrap().key(), 3);
    }

    #[test]
    fn cell_get_out_of_range_is_ecellno() {
        let mut pager = temp_pager("oob");
        let (_, node) = Node::new(&mut pager, NodeType::TableLeaf).unwrap();
        assert_eq!(node.cell_get(0).unwrap_err(), Error::ECellNo);
    }

    #[test]
    fn cell_insert_past_end_is_ecellno() {
        let mut pager = temp_pager("oob2");
        let (_, mut node) = Node::new(&mut pager, NodeType::TableLeaf).unwrap();
        let err = node
            .cell_insert(
                5,
                &Cell::TableLeaf {
                    key: 1,
                    payload: vec![],
                },
            )
            .unwrap_err();
        assert_eq!(err, Error::ECellNo);
    }

    #[test]
    fn space_accounting_after_insert() {
        let mut pager = temp_pager("space");
        let (_, mut node) = Node::new(&mut pager, NodeType::TableLeaf).unwrap();
        let cell = Cell::TableLeaf {
            key: 1,
            payload: vec![0u8; 50],
        };
        assert!(!node.is_full_for(cell.size()));
        node.cell_insert(0, &cell).unwrap();
        assert!(node.free_offset <= node.cells_offset);
    }

    #[test]
    fn page1_header_offset_accounts_for_file_header() {
        let mut pager = temp_pager("page1");
        let node = Node::load(&mut pager, 1).unwrap();
        assert_eq!(node.header_offset, dbheader::HEADER_BYTES);
    }
}
