//! Fixed-size 8 KB pages and page-granular file I/O.
//! A page is an untyped byte block; the layer above decides what it holds.

use std::io::{self, Read, Seek, SeekFrom, Write};

pub const PAGE_SIZE: usize = 8192;

/// A raw page. There is no on-disk type tag; a page is a header, an index
/// node, or a heap record page purely by which page number holds it.
#[derive(Clone, Debug)]
pub struct Page {
    data: [u8; PAGE_SIZE],
}

impl Page {
    pub fn zeroed() -> Self {
        Self {
            data: [0u8; PAGE_SIZE],
        }
    }

    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        &mut self.data
    }

    /// Read this page in place from file slot `slot` (0-based).
    pub fn read_at<R: Read + Seek>(&mut self, r: &mut R, slot: u64) -> io::Result<()> {
        r.seek(SeekFrom::Start(slot * PAGE_SIZE as u64))?;
        r.read_exact(&mut self.data)
    }

    /// Write this page to file slot `slot` (0-based).
    pub fn write_at<W: Write + Seek>(&self, w: &mut W, slot: u64) -> io::Result<()> {
        w.seek(SeekFrom::Start(slot * PAGE_SIZE as u64))?;
        w.write_all(&self.data)
    }
}

// Little-endian field accessors shared by the page layouts.

pub(crate) fn get_u16(bytes: &[u8], off: usize) -> u16 {
    u16::from_le_bytes(bytes[off..off + 2].try_into().unwrap())
}

pub(crate) fn put_u16(bytes: &mut [u8], off: usize, v: u16) {
    bytes[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

pub(crate) fn get_u32(bytes: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap())
}

pub(crate) fn put_u32(bytes: &mut [u8], off: usize, v: u32) {
    bytes[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

pub(crate) fn get_i32(bytes: &[u8], off: usize) -> i32 {
    i32::from_le_bytes(bytes[off..off + 4].try_into().unwrap())
}

pub(crate) fn put_i32(bytes: &mut [u8], off: usize, v: i32) {
    bytes[off..off + 4].copy_from_slice(&v.to_le_bytes());
}
