//! The four on-disk cell layouts a B-tree node can hold (spec.md §3). Each
//! layout is modeled as its own enum arm rather than a generic struct with
//! optional fields, per spec.md §9's "Tagged cell variants" design note —
//! exhaustive matching on `NodeType` catches the missing-arm bugs a
//! `default: break` C switch would hide.

use crate::btree::NodeType;
use crate::error::{Error, Result};
use crate::varint;
use byteorder::{BigEndian, ByteOrder};

/// Fixed 4-byte placeholder every index cell carries in place of a real
/// record header: "one-column record of a 4-byte integer" (spec.md §9).
pub const INDEX_MAGIC: [u8; 4] = [0x0B, 0x03, 0x04, 0x04];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    TableInternal {
        child_page: u32,
        key: u32,
    },
    TableLeaf {
        key: u32,
        payload: Vec<u8>,
    },
    IndexInternal {
        child_page: u32,
        key: u32,
        key_pk: u32,
    },
    IndexLeaf {
        key: u32,
        key_pk: u32,
    },
}

impl Cell {
    pub fn node_type(&self) -> NodeType {
        match self {
            Cell::TableInternal { .. } => NodeType::TableInternal,
            Cell::TableLeaf { .. } => NodeType::TableLeaf,
            Cell::IndexInternal { .. } => NodeType::IndexInternal,
            Cell::IndexLeaf { .. } => NodeType::IndexLeaf,
        }
    }

    pub fn key(&self) -> u32 {
        match self {
            Cell::TableInternal { key, .. }
            | Cell::TableLeaf { key, .. }
            | Cell::IndexInternal { key, .. }
            | Cell::IndexLeaf { key, .. } => *key,
        }
    }

    pub fn child_page(&self) -> Option<u32> {
        match self {
            Cell::TableInternal { child_page, .. } | Cell::IndexInternal { child_page, .. } => {
                Some(*child_page)
            }
            _ => None,
        }
    }

    pub fn key_pk(&self) -> Option<u32> {
        match self {
            Cell::IndexInternal { key_pk, .. } | Cell::IndexLeaf { key_pk, .. } => Some(*key_pk),
            _ => None,
        }
    }

    /// Number of bytes this cell occupies in the cell content area.
    pub fn size(&self) -> usize {
        match self {
            Cell::TableInternal { key, .. } => 4 + varint::encoded_len(*key),
            Cell::TableLeaf { key, payload } => {
                varint::encoded_len(payload.len() as u32) + varint::encoded_len(*key) + payload.len()
            }
            Cell::IndexInternal { .. } => 4 + INDEX_MAGIC.len() + 4 + 4,
            Cell::IndexLeaf { .. } => INDEX_MAGIC.len() + 4 + 4,
        }
    }

    /// Serializes the cell to its on-disk layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size());
        match self {
            Cell::TableInternal { child_page, key } => {
                let mut buf = [0u8; 4];
                BigEndian::write_u32(&mut buf, *child_page);
                out.extend_from_slice(&buf);
                varint::encode(*key, &mut out);
            }
            Cell::TableLeaf { key, payload } => {
                varint::encode(payload.len() as u32, &mut out);
                varint::encode(*key, &mut out);
                out.extend_from_slice(payload);
            }
            Cell::IndexInternal {
                child_page,
                key,
                key_pk,
            } => {
                let mut buf = [0u8; 4];
                BigEndian::write_u32(&mut buf, *child_page);
                out.extend_from_slice(&buf);
                out.extend_from_slice(&INDEX_MAGIC);
                BigEndian::write_u32(&mut buf, *key);
                out.extend_from_slice(&buf);
                BigEndian::write_u32(&mut buf, *key_pk);
                out.extend_from_slice(&buf);
            }
            Cell::IndexLeaf { key, key_pk } => {
                out.extend_from_slice(&INDEX_MAGIC);
                let mut buf = [0u8; 4];
                BigEndian::write_u32(&mut buf, *key);
                out.extend_from_slice(&buf);
                BigEndian::write_u32(&mut buf, *key_pk);
                out.extend_from_slice(&buf);
            }
        }
        out
    }

    /// Parses one cell of `node_type` starting at the front of `buf`. `buf`
    /// may (and for table leaf cells, must) extend past the end of the
    /// cell; only the bytes the layout calls for are consumed.
    pub fn from_bytes(node_type: NodeType, buf: &[u8]) -> Result<Self> {
        match node_type {
            NodeType::TableInternal => {
                if buf.len() < 5 {
                    return Err(Error::ECorruptHeader);
                }
                let child_page = BigEndian::read_u32(&buf[0..4]);
                let (key, _) = varint::decode(&buf[4..])?;
                Ok(Cell::TableInternal { child_page, key })
            }
            NodeType::TableLeaf => {
                let (data_size, n1) = varint::decode(buf)?;
                let (key, n2) = varint::decode(&buf[n1..])?;
                let start = n1 + n2;
                let data_size = data_size as usize;
                if buf.len() < start + data_size {
                    return Err(Error::ECorruptHeader);
                }
                let payload = buf[start..start + data_size].to_vec();
                Ok(Cell::TableLeaf { key, payload })
            }
            NodeType::IndexInternal => {
                if buf.len() < 16 {
                    return Err(Error::ECorruptHeader);
                }
                let child_page = BigEndian::read_u32(&buf[0..4]);
                if buf[4..8] != INDEX_MAGIC {
                    return Err(Error::ECorruptHeader);
                }
                let key = BigEndian::read_u32(&buf[8..12]);
                let key_pk = BigEndian::read_u32(&buf[12..16]);
                Ok(Cell::IndexInternal {
                    child_page,
                    key,
                    key_pk,
                })
            }
            NodeType::IndexLeaf => {
                if buf.len() < 12 {
                    return Err(Error::ECorruptHeader);
                }
                if buf[0..4] != INDEX_MAGIC {
                    return Err(Error::ECorruptHeader);
                }
                let key = BigEndian::read_u32(&buf[4..8]);
                let key_pk = BigEndian::read_u32(&buf[8..12]);
                Ok(Cell::IndexLeaf { key, key_pk })
            }
        }
    }

    /// Converts a leaf cell's key (and, for index leaves, its `key_pk`)
    /// into the corresponding internal cell referencing `child_page`, as
    /// used when a median cell is promoted into a parent during a split
    /// (spec.md §4.2: "TABLE_LEAF -> TABLE_INTERNAL, INDEX_LEAF ->
    /// INDEX_INTERNAL carrying keyPk").
    pub fn promote_to_internal(&self, child_page: u32) -> Cell {
        match self {
            Cell::TableLeaf { key, .. } | Cell::TableInternal { key, .. } => Cell::TableInternal {
                child_page,
                key: *key,
            },
            Cell::IndexLeaf { key, key_pk } => Cell::IndexInternal {
                child_page,
                key: *key,
                key_pk: *key_pk,
            },
            Cell::IndexInternal { key, key_pk, .. } => Cell::IndexInternal {
                child_page,
                key: *key,
                key_pk: *key_pk,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_internal_roundtrip() {
        let c = Cell::TableInternal {
            child_page: 7,
            key: 123456,
        };
        let bytes = c.to_bytes();
        assert_eq!(bytes.len(), c.size());
        let parsed = Cell::from_bytes(NodeType::TableInternal, &bytes).unwrap();
        assert_eq!(parsed, c);
    }

    #[test]
    fn table_leaf_roundtrip() {
        let c = Cell::TableLeaf {
            key: 42,
            payload: b"hello, world".to_vec(),
        };
        let bytes = c.to_bytes();
        assert_eq!(bytes.len(), c.size());
        let parsed = Cell::from_bytes(NodeType::TableLeaf, &bytes).unwrap();
        assert_eq!(parsed, c);
    }

    #[test]
    fn table_leaf_roundtrip_with_trailing_bytes() {
        let c = Cell::TableLeaf {
            key: 9980,
            payload: vec![1, 2, 3, 4, 5],
        };
        let mut bytes = c.to_bytes();
        bytes.extend_from_slice(&[0xFF; 16]); // simulates the rest of the page.
        let parsed = Cell::from_bytes(NodeType::TableLeaf, &bytes).unwrap();
        assert_eq!(parsed, c);
    }

    #[test]
    fn index_internal_roundtrip() {
        let c = Cell::IndexInternal {
            child_page: 3,
            key: 555,
            key_pk: 9,
        };
        let bytes = c.to_bytes();
        assert_eq!(bytes.len(), 16);
        assert_eq!(c.size(), 16);
        let parsed = Cell::from_bytes(NodeType::IndexInternal, &bytes).unwrap();
        assert_eq!(parsed, c);
    }

    #[test]
    fn index_leaf_roundtrip() {
        let c = Cell::IndexLeaf {
            key: 1,
            key_pk: 2,
        };
        let bytes = c.to_bytes();
        assert_eq!(bytes.len(), 12);
        assert_eq!(c.size(), 12);
        let parsed = Cell::from_bytes(NodeType::IndexLeaf, &bytes).unwrap();
        assert_eq!(parsed, c);
    }

    #[test]
    fn index_leaf_rejects_wrong_magic() {
        let mut bytes = Cell::IndexLeaf { key: 1, key_pk: 2 }.to_bytes();
        bytes[0] = 0xFF;
        assert_eq!(
            Cell::from_bytes(NodeType::IndexLeaf, &bytes),
            Err(Error::ECorruptHeader)
        );
    }

    #[test]
    fn promotes_table_leaf_to_internal() {
        let leaf = Cell::TableLeaf {
            key: 10,
            payload: vec![9, 9],
        };
        let internal = leaf.promote_to_internal(77);
        assert_eq!(
            internal,
            Cell::TableInternal {
                child_page: 77,
                key: 10
            }
        );
    }

    #[test]
    fn promotes_index_leaf_to_internal_carrying_key_pk() {
        let leaf = Cell::IndexLeaf { key: 10, key_pk: 99 };
        let internal = leaf.promote_to_internal(5);
        assert_eq!(
            internal,
            Cell::IndexInternal {
                child_page: 5,
                key: 10,
                key_pk: 99
            }
        );
    }
}
