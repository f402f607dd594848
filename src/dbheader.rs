//! Reads and writes the 100-byte file header that occupies the start of
//! page 1 (spec.md §3). Unlike the teacher's read-only `dbheader.rs`, this
//! version also builds a fresh header for newly formatted files, since the
//! pager now owns writes.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};

pub const HEADER_BYTES: usize = 100;
const MAGIC: &[u8; 16] = b"SQLite format 3\0";
const TAIL_CONSTANT: [u8; 6] = [0x01, 0x01, 0x00, 0x40, 0x20, 0x20];

const OFF_PAGESIZE: usize = 16;
const OFF_TAIL: usize = 18;
const OFF_FIRST_U32: usize = 24;
const OFF_LAST_U32: usize = 0x40; // 64: spec's must-be-zero range is 0x18..0x43, an 11-slot run ending here.
const OFF_SCHEMA_COOKIE: usize = 0x2c; // 44: schema cookie, fixed at 1.
const OFF_SCHEMA_FORMAT: usize = 0x30; // 48: schema format number, fixed at 20000 here.
const OFF_PAGECACHE_SIZE: usize = 0x38; // 56: default page cache size, fixed at 1.

pub const MIN_PAGE_SIZE: u32 = 512;
pub const MAX_PAGE_SIZE: u32 = 65536;
pub const DEFAULT_PAGE_SIZE: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbHeader {
    pub page_size: u32,
}

impl DbHeader {
    /// Builds the header for a brand-new, empty database file.
    pub fn new(page_size: u32) -> Result<Self> {
        if !is_valid_page_size(page_size) {
            return Err(Error::ECorruptHeader);
        }
        Ok(DbHeader { page_size })
    }

    /// Parses and validates the 100-byte header. Any deviation from the
    /// fixed constant layout of spec.md §3 is a corrupt header.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_BYTES {
            return Err(Error::ECorruptHeader);
        }
        if &buf[0..16] != MAGIC {
            return Err(Error::ECorruptHeader);
        }
        let page_size_field = BigEndian::read_u16(&buf[OFF_PAGESIZE..OFF_PAGESIZE + 2]);
        // A page size field of 1 denotes the 65536-byte page size, which
        // does not fit in a u16.
        let page_size: u32 = if page_size_field == 1 {
            65536
        } else {
            page_size_field as u32
        };
        if !is_valid_page_size(page_size) {
            return Err(Error::ECorruptHeader);
        }
        if buf[OFF_TAIL..OFF_TAIL + 6] != TAIL_CONSTANT {
            return Err(Error::ECorruptHeader);
        }
        for off in (OFF_FIRST_U32..=OFF_LAST_U32).step_by(4) {
            let want = match off {
                OFF_SCHEMA_COOKIE => 1u32,
                OFF_SCHEMA_FORMAT => 20000,
                OFF_PAGECACHE_SIZE => 1,
                _ => 0,
            };
            let got = BigEndian::read_u32(&buf[off..off + 4]);
            if got != want {
                return Err(Error::ECorruptHeader);
            }
        }
        Ok(DbHeader { page_size })
    }

    /// Serializes the header into the first 100 bytes of `page`.
    pub fn write(&self, page: &mut [u8]) -> Result<()> {
        if page.len() < HEADER_BYTES {
            return Err(Error::ENoMem);
        }
        page[0..HEADER_BYTES].fill(0);
        page[0..16].copy_from_slice(MAGIC);
        let page_size_field: u16 = if self.page_size == 65536 {
            1
        } else {
            self.page_size as u16
        };
        BigEndian::write_u16(&mut page[OFF_PAGESIZE..OFF_PAGESIZE + 2], page_size_field);
        page[OFF_TAIL..OFF_TAIL + 6].copy_from_slice(&TAIL_CONSTANT);
        BigEndian::write_u32(&mut page[OFF_SCHEMA_COOKIE..OFF_SCHEMA_COOKIE + 4], 1);
        BigEndian::write_u32(&mut page[OFF_SCHEMA_FORMAT..OFF_SCHEMA_FORMAT + 4], 20000);
        BigEndian::write_u32(&mut page[OFF_PAGECACHE_SIZE..OFF_PAGECACHE_SIZE + 4], 1);
        Ok(())
    }
}

fn is_valid_page_size(page_size: u32) -> bool {
    page_size >= MIN_PAGE_SIZE && page_size <= MAX_PAGE_SIZE && page_size.is_power_of_two()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_default_page_size() {
        let hdr = DbHeader::new(DEFAULT_PAGE_SIZE).unwrap();
        let mut page = vec![0u8; DEFAULT_PAGE_SIZE as usize];
        hdr.write(&mut page).unwrap();
        let parsed = DbHeader::parse(&page).unwrap();
        assert_eq!(parsed, hdr);
        assert_eq!(&page[0..16], MAGIC);
        assert_eq!(page[100], 0); // header does not touch byte 100 onward.
    }

    #[test]
    fn roundtrips_64k_page_size() {
        let hdr = DbHeader::new(65536).unwrap();
        let mut page = vec![0u8; 65536];
        hdr.write(&mut page).unwrap();
        assert_eq!(DbHeader::parse(&page).unwrap(), hdr);
    }

    #[test]
    fn rejects_non_power_of_two_page_size() {
        assert_eq!(DbHeader::new(1000), Err(Error::ECorruptHeader));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut page = vec![0u8; DEFAULT_PAGE_SIZE as usize];
        DbHeader::new(DEFAULT_PAGE_SIZE)
            .unwrap()
            .write(&mut page)
            .unwrap();
        page[0] = b'X';
        assert_eq!(DbHeader::parse(&page), Err(Error::ECorruptHeader));
    }

    #[test]
    fn rejects_tampered_reserved_fields() {
        let mut page = vec![0u8; DEFAULT_PAGE_SIZE as usize];
        DbHeader::new(DEFAULT_PAGE_SIZE)
            .unwrap()
            .write(&mut page)
            .unwrap();
        BigEndian::write_u32(&mut page[0x40..0x44], 7);
        assert_eq!(DbHeader::parse(&page), Err(Error::ECorruptHeader));
    }

    #[test]
    fn open_close_open_close_is_byte_identical() {
        // S8: header idempotence.
        let hdr = DbHeader::new(DEFAULT_PAGE_SIZE).unwrap();
        let mut page_a = vec![0u8; DEFAULT_PAGE_SIZE as usize];
        hdr.write(&mut page_a).unwrap();
        let parsed = DbHeader::parse(&page_a).unwrap();
        let mut page_b = vec![0u8; DEFAULT_PAGE_SIZE as usize];
        parsed.write(&mut page_b).unwrap();
        assert_eq!(page_a[0..HEADER_BYTES], page_b[0..HEADER_BYTES]);
    }
}
