//! Blob file: a flat file of raw pages, the persistence layer of an index.
//! Page numbers are 1-based; page number 0 is the global vacancy sentinel.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use super::page::{Page, PAGE_SIZE};

pub type PageNo = u32;

/// Never a valid page pointer; marks "no child" and "empty slot".
pub const INVALID_PAGE_NO: PageNo = 0;

/// Page `n` lives at file offset `(n - 1) * PAGE_SIZE`.
#[derive(Debug)]
pub struct BlobFile {
    path: PathBuf,
    file: File,
    num_pages: PageNo,
}

impl BlobFile {
    /// Whether a blob file already exists at `path`.
    pub fn exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_file()
    }

    /// Create a new blob file. Overwrites if it exists.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self {
            path,
            file,
            num_pages: 0,
        })
    }

    /// Open an existing blob file. Returns an error if it doesn't exist.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let len = file.metadata()?.len();
        if len % (PAGE_SIZE as u64) != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "blob file size not a multiple of page size",
            ));
        }
        let num_pages = (len / (PAGE_SIZE as u64)) as PageNo;
        Ok(Self {
            path,
            file,
            num_pages,
        })
    }

    /// The lowest valid page number.
    pub fn first_page_no() -> PageNo {
        1
    }

    /// Append a zeroed page to the file and return its page number.
    pub fn alloc_page(&mut self) -> io::Result<PageNo> {
        let no = self.num_pages + 1;
        Page::zeroed().write_at(&mut self.file, (no - 1) as u64)?;
        self.num_pages = no;
        Ok(no)
    }

    /// Read page `no` into `page`.
    pub fn read_page(&mut self, no: PageNo, page: &mut Page) -> io::Result<()> {
        self.check_range(no)?;
        page.read_at(&mut self.file, (no - 1) as u64)
    }

    /// Write `page` back as page `no`.
    pub fn write_page(&mut self, no: PageNo, page: &Page) -> io::Result<()> {
        self.check_range(no)?;
        page.write_at(&mut self.file, (no - 1) as u64)
    }

    fn check_range(&self, no: PageNo) -> io::Result<()> {
        if no == INVALID_PAGE_NO || no > self.num_pages {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("page {} out of range (file has {})", no, self.num_pages),
            ));
        }
        Ok(())
    }

    /// Number of pages in the file.
    pub fn num_pages(&self) -> PageNo {
        self.num_pages
    }

    pub fn sync(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }

    /// Path to the blob file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
