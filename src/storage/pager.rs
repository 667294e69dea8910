//! Buffer pool over a blob file, with explicit pin/unpin discipline.
//!
//! Every page access goes `pin` -> `page`/`page_mut` -> `unpin`. A pinned
//! frame cannot be evicted; dirtiness is declared at unpin time, not by
//! taking a mutable reference. Eviction is LRU over unpinned frames.

use std::collections::HashMap;

use crate::error::PagerError;

use super::blob::{BlobFile, PageNo};
use super::page::Page;

#[derive(Debug)]
struct Frame {
    page: Box<Page>,
    dirty: bool,
    pin_count: u32,
    /// Access counter value at last touch, for LRU eviction.
    last_access: u64,
}

#[derive(Debug)]
pub struct Pager {
    file: BlobFile,
    pool: HashMap<PageNo, Frame>,
    max_frames: usize,
    access_counter: u64,
}

impl Pager {
    pub fn new(file: BlobFile, max_frames: usize) -> Self {
        Self {
            file,
            pool: HashMap::new(),
            max_frames,
            access_counter: 0,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.access_counter += 1;
        self.access_counter
    }

    /// Bring page `no` into the pool (reading it from the file if absent)
    /// and take a pin on it.
    pub fn pin(&mut self, no: PageNo) -> Result<(), PagerError> {
        let tick = self.next_tick();
        if let Some(frame) = self.pool.get_mut(&no) {
            frame.pin_count += 1;
            frame.last_access = tick;
            return Ok(());
        }
        self.make_room()?;
        let mut page = Box::new(Page::zeroed());
        self.file.read_page(no, &mut page)?;
        self.pool.insert(
            no,
            Frame {
                page,
                dirty: false,
                pin_count: 1,
                last_access: tick,
            },
        );
        Ok(())
    }

    /// Allocate a fresh zeroed page in the file and pin it.
    pub fn alloc(&mut self) -> Result<PageNo, PagerError> {
        self.make_room()?;
        let no = self.file.alloc_page()?;
        let tick = self.next_tick();
        self.pool.insert(
            no,
            Frame {
                page: Box::new(Page::zeroed()),
                dirty: false,
                pin_count: 1,
                last_access: tick,
            },
        );
        Ok(no)
    }

    /// Borrow a pinned page.
    pub fn page(&self, no: PageNo) -> Result<&Page, PagerError> {
        let frame = self.pool.get(&no).ok_or(PagerError::PageNotFound(no))?;
        if frame.pin_count == 0 {
            return Err(PagerError::PageNotPinned(no));
        }
        Ok(&frame.page)
    }

    /// Borrow a pinned page mutably. Does not mark the frame dirty;
    /// pass `dirty = true` to `unpin` when the page was modified.
    pub fn page_mut(&mut self, no: PageNo) -> Result<&mut Page, PagerError> {
        let tick = self.next_tick();
        let frame = self.pool.get_mut(&no).ok_or(PagerError::PageNotFound(no))?;
        if frame.pin_count == 0 {
            return Err(PagerError::PageNotPinned(no));
        }
        frame.last_access = tick;
        Ok(&mut frame.page)
    }

    /// Return a pin, declaring whether the page was modified.
    pub fn unpin(&mut self, no: PageNo, dirty: bool) -> Result<(), PagerError> {
        let frame = self.pool.get_mut(&no).ok_or(PagerError::PageNotFound(no))?;
        if frame.pin_count == 0 {
            return Err(PagerError::PageNotPinned(no));
        }
        frame.pin_count -= 1;
        frame.dirty |= dirty;
        Ok(())
    }

    /// Idempotent unpin: the two benign double-unpin kinds are swallowed,
    /// anything else propagates.
    pub fn unpin_if_pinned(&mut self, no: PageNo, dirty: bool) -> Result<(), PagerError> {
        match self.unpin(no, dirty) {
            Err(PagerError::PageNotPinned(_)) | Err(PagerError::PageNotFound(_)) => Ok(()),
            other => other,
        }
    }

    /// Write every dirty frame back and sync the file.
    pub fn flush(&mut self) -> Result<(), PagerError> {
        for (&no, frame) in self.pool.iter_mut() {
            if frame.dirty {
                self.file.write_page(no, &frame.page)?;
                frame.dirty = false;
            }
        }
        self.file.sync()?;
        Ok(())
    }

    /// Evict the least recently used unpinned frame if the pool is full.
    fn make_room(&mut self) -> Result<(), PagerError> {
        if self.pool.len() < self.max_frames {
            return Ok(());
        }
        let victim = self
            .pool
            .iter()
            .filter(|(_, f)| f.pin_count == 0)
            .min_by_key(|(_, f)| f.last_access)
            .map(|(&no, _)| no)
            .ok_or(PagerError::PoolExhausted)?;
        if let Some(frame) = self.pool.remove(&victim) {
            if frame.dirty {
                self.file.write_page(victim, &frame.page)?;
            }
        }
        Ok(())
    }

    /// Number of pages in the underlying file.
    pub fn num_pages(&self) -> PageNo {
        self.file.num_pages()
    }

    #[cfg(test)]
    fn pin_count(&self, no: PageNo) -> Option<u32> {
        self.pool.get(&no).map(|f| f.pin_count)
    }
}
