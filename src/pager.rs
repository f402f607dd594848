//! Owns the file handle and in-memory page cache for one open database file
//! (spec.md §6 "Pager contract consumed by the core"). Generalizes the
//! teacher's read-only `Pager` (which only ever grew its page cache) into a
//! read/write one: `alloc_page` extends the file and `write_page` persists
//! mutations back through the same handle.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::btree::{node, NodeType};
use crate::dbheader::{self, DbHeader};
use crate::error::{Error, Result};

/// Page numbers are 1-based, matching how SQLite (and this format) number
/// pages.
pub type PageNum = usize;

/// A page handed out by the pager. The caller owns the buffer exclusively
/// for as long as it holds the view; mutate it in place and hand it back to
/// `write_page` to persist, or `release_page` to discard the changes.
#[derive(Debug)]
pub struct PageView {
    pub page_no: PageNum,
    pub buf: Vec<u8>,
}

pub struct Pager {
    file: File,
    page_size: u32,
    num_pages: u32,
}

impl Pager {
    /// Opens `path`, creating and formatting it if it does not already
    /// exist (spec.md §8 S1: "Open nonexistent path -> OK").
    pub fn open(path: &str) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| Error::EIo(e.to_string()))?;
        let len = file.metadata().map_err(|e| Error::EIo(e.to_string()))?.len();
        if len == 0 {
            log::debug!("formatting new database file {}", path);
            let page_size = dbheader::DEFAULT_PAGE_SIZE;
            let mut buf = vec![0u8; page_size as usize];
            DbHeader::new(page_size)?.write(&mut buf)?;
            node::format_empty_page(&mut buf, dbheader::HEADER_BYTES, NodeType::TableLeaf, page_size);
            file.write_all(&buf).map_err(|e| Error::EIo(e.to_string()))?;
            file.flush().map_err(|e| Error::EIo(e.to_string()))?;
            Ok(Pager {
                file,
                page_size,
                num_pages: 1,
            })
        } else {
            file.seek(SeekFrom::Start(0))
                .map_err(|e| Error::EIo(e.to_string()))?;
            let mut probe = vec![0u8; dbheader::HEADER_BYTES];
            file.read_exact(&mut probe)
                .map_err(|_| Error::ECorruptHeader)?;
            let hdr = DbHeader::parse(&probe)?;
            let page_size = hdr.page_size;
            if len % page_size as u64 != 0 {
                return Err(Error::ECorruptHeader);
            }
            let num_pages = (len / page_size as u64) as u32;
            log::debug!(
                "opened {} with page_size={} num_pages={}",
                path,
                page_size,
                num_pages
            );
            Ok(Pager {
                file,
                page_size,
                num_pages,
            })
        }
    }

    /// True when `path` names an existing, readable file.
    pub fn exists(path: &str) -> bool {
        Path::new(path).is_file()
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// Reads the raw 100-byte file header.
    pub fn read_header(&mut self) -> Result<[u8; dbheader::HEADER_BYTES]> {
        let mut buf = [0u8; dbheader::HEADER_BYTES];
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| Error::EIo(e.to_string()))?;
        self.file
            .read_exact(&mut buf)
            .map_err(|e| Error::EIo(e.to_string()))?;
        Ok(buf)
    }

    /// Sets the page size used for pages allocated from now on. Only valid
    /// before any page beyond page 1 has been allocated, since changing it
    /// later would desynchronize already-written page offsets.
    pub fn set_page_size(&mut self, page_size: u32) -> Result<()> {
        if self.num_pages > 1 {
            return Err(Error::ECorruptHeader);
        }
        let hdr = DbHeader::new(page_size)?;
        let mut page1 = self.read_page(1)?;
        page1.buf.resize(page_size as usize, 0);
        hdr.write(&mut page1.buf)?;
        self.page_size = page_size;
        self.write_page(page1)
    }

    /// Allocates a fresh page at the end of the file and returns its
    /// 1-based page number. The page's bytes are left zeroed; callers
    /// format it (e.g. via `node::format_empty_page`) before use.
    pub fn alloc_page(&mut self) -> Result<PageNum> {
        self.num_pages += 1;
        let pn = self.num_pages as PageNum;
        let zeros = vec![0u8; self.page_size as usize];
        self.file
            .seek(SeekFrom::Start((pn - 1) as u64 * self.page_size as u64))
            .map_err(|e| Error::EIo(e.to_string()))?;
        self.file
            .write_all(&zeros)
            .map_err(|e| Error::EIo(e.to_string()))?;
        Ok(pn)
    }

    /// Reads page `pn` from disk into an owned buffer.
    pub fn read_page(&mut self, pn: PageNum) -> Result<PageView> {
        if pn == 0 || pn > self.num_pages as PageNum {
            return Err(Error::EPageNo);
        }
        let mut buf = vec![0u8; self.page_size as usize];
        self.file
            .seek(SeekFrom::Start((pn - 1) as u64 * self.page_size as u64))
            .map_err(|e| Error::EIo(e.to_string()))?;
        self.file
            .read_exact(&mut buf)
            .map_err(|e| Error::EIo(e.to_string()))?;
        Ok(PageView { page_no: pn, buf })
    }

    /// Persists `view` back to disk at its page number.
    pub fn write_page(&mut self, view: PageView) -> Result<()> {
        if view.buf.len() != self.page_size as usize {
            return Err(Error::ENoMem);
        }
        self.file
            .seek(SeekFrom::Start(
                (view.page_no - 1) as u64 * self.page_size as u64,
            ))
            .map_err(|e| Error::EIo(e.to_string()))?;
        self.file
            .write_all(&view.buf)
            .map_err(|e| Error::EIo(e.to_string()))?;
        Ok(())
    }

    /// Releases a page view without writing it back. There is nothing to
    /// free explicitly since views are plain owned buffers, but the call
    /// marks the scoped-acquisition boundary spec.md §5 requires every
    /// loader to observe.
    pub fn release_page(&mut self, _view: PageView) -> Result<()> {
        Ok(())
    }

    /// Flushes and closes the underlying file.
    pub fn close(mut self) -> Result<()> {
        self.file.flush().map_err(|e| Error::EIo(e.to_string()))?;
        self.file.sync_all().map_err(|e| Error::EIo(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> String {
        let mut p = std::env::temp_dir();
        p.push(format!(
            "microdb-pager-test-{}-{}",
            std::process::id(),
            name
        ));
        p.to_str().unwrap().to_string()
    }

    #[test]
    fn empty_file_bootstrap_s1() {
        let path = temp_path("s1.db");
        let _ = std::fs::remove_file(&path);

        let pager = Pager::open(&path).expect("should have opened nonexistent path");
        assert_eq!(pager.page_size(), dbheader::DEFAULT_PAGE_SIZE);
        pager.close().expect("should have closed");

        let meta = std::fs::metadata(&path).unwrap();
        assert!(meta.len() >= 1024);

        let mut pager2 = Pager::open(&path).expect("re-open should succeed");
        let hdr = pager2.read_header().unwrap();
        assert_eq!(&hdr[0..16], b"SQLite format 3\0");
        assert_eq!(&hdr[16..18], &[0x04, 0x00]);
        let page1 = pager2.read_page(1).unwrap();
        assert_eq!(page1.buf[100], 0x0D);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn alloc_and_roundtrip_page() {
        let path = temp_path("alloc.db");
        let _ = std::fs::remove_file(&path);
        let mut pager = Pager::open(&path).unwrap();

        let pn = pager.alloc_page().unwrap();
        assert_eq!(pn, 2);
        let mut view = pager.read_page(pn).unwrap();
        view.buf[0] = 0xAB;
        pager.write_page(view).unwrap();

        let view2 = pager.read_page(pn).unwrap();
        assert_eq!(view2.buf[0], 0xAB);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn read_page_out_of_range_is_epageno() {
        let path = temp_path("oob.db");
        let _ = std::fs::remove_file(&path);
        let mut pager = Pager::open(&path).unwrap();
        assert_eq!(pager.read_page(99).unwrap_err(), Error::EPageNo);
        std::fs::remove_file(&path).ok();
    }
}
