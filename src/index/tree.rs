//! Tree engine: root-to-leaf descent, split propagation, root growth, and
//! the index lifecycle (open-or-create, build from a relation scan, flush).
//!
//! The engine owns the pin discipline: the descent keeps a stack of page
//! numbers (never stale pointers), every pinned page is unpinned exactly
//! once per operation, and dirtiness is declared at unpin time.

use std::path::Path;

use crate::config::Config;
use crate::error::{IndexError, Result};
use crate::storage::{BlobFile, HeapFile, HeapScan, PageNo, Pager, Rid, INVALID_PAGE_NO};

use super::layout::{leaf, meta, nonleaf, KEY_SIZE};
use super::node;
use super::scan::ScanState;
use super::AttrType;

/// A disk-resident B+ tree index over one integer attribute of a heap
/// relation. Single-threaded; exclusive access is assumed for the
/// duration of a build or a scan.
#[derive(Debug)]
pub struct BTreeIndex {
    pub(super) pager: Pager,
    pub(super) index_name: String,
    relation_name: String,
    attr_byte_offset: usize,
    attr_type: AttrType,
    header_page_no: PageNo,
    pub(super) root_page_no: PageNo,
    pub(super) scan: Option<ScanState>,
}

impl BTreeIndex {
    /// Open the index for `relation_name` keyed on the integer at
    /// `attr_byte_offset` of each record.
    ///
    /// The index file is `<relation>.<offset>` under `config.data_dir`.
    /// An existing file is validated against the arguments and reused; a
    /// fresh file is populated by a full scan of the relation's heap file
    /// (`config.data_dir/<relation>`).
    pub fn open(
        config: &Config,
        relation_name: &str,
        attr_byte_offset: usize,
        attr_type: AttrType,
    ) -> Result<Self> {
        if relation_name.len() >= meta::REL_NAME_LEN {
            return Err(IndexError::BadIndexInfo(format!(
                "relation name {:?} exceeds {} bytes",
                relation_name,
                meta::REL_NAME_LEN - 1
            )));
        }
        let index_name = format!("{relation_name}.{attr_byte_offset}");
        let index_path = Path::new(&config.data_dir).join(&index_name);
        let header_page_no = BlobFile::first_page_no();

        if BlobFile::exists(&index_path) {
            let blob = BlobFile::open(&index_path)?;
            let mut pager = Pager::new(blob, config.buffer_pool_size);
            pager.pin(header_page_no)?;
            let (stored_name, stored_offset, stored_type, root_page_no) = {
                let page = pager.page(header_page_no)?;
                (
                    meta::relation_name(page),
                    meta::attr_byte_offset(page),
                    meta::attr_type_code(page),
                    meta::root_page_no(page),
                )
            };
            pager.unpin(header_page_no, false)?;
            if stored_name != relation_name {
                return Err(IndexError::BadIndexInfo(format!(
                    "index is over relation {stored_name:?}, not {relation_name:?}"
                )));
            }
            if stored_offset != attr_byte_offset as i32 {
                return Err(IndexError::BadIndexInfo(format!(
                    "index keys byte offset {stored_offset}, not {attr_byte_offset}"
                )));
            }
            if stored_type != attr_type.code() {
                return Err(IndexError::BadIndexInfo(format!(
                    "index attribute type code {} does not match",
                    stored_type
                )));
            }
            tracing::info!(index = %index_name, root = root_page_no, "opened existing index");
            return Ok(Self {
                pager,
                index_name,
                relation_name: relation_name.to_string(),
                attr_byte_offset,
                attr_type,
                header_page_no,
                root_page_no,
                scan: None,
            });
        }

        let blob = BlobFile::create(&index_path)?;
        let mut pager = Pager::new(blob, config.buffer_pool_size);
        let header = pager.alloc()?;
        debug_assert_eq!(header, header_page_no);
        let root_page_no = pager.alloc()?;
        {
            let page = pager.page_mut(header)?;
            meta::set_relation_name(page, relation_name);
            meta::set_attr_byte_offset(page, attr_byte_offset as i32);
            meta::set_attr_type_code(page, attr_type.code());
            meta::set_root_page_no(page, root_page_no);
        }
        pager.unpin(header, true)?;
        // The empty root is a non-leaf whose children will be leaves; all
        // of its pointers start out vacant.
        nonleaf::set_level(pager.page_mut(root_page_no)?, 1);
        pager.unpin(root_page_no, true)?;

        tracing::info!(index = %index_name, root = root_page_no, "created index file");
        let mut index = Self {
            pager,
            index_name,
            relation_name: relation_name.to_string(),
            attr_byte_offset,
            attr_type,
            header_page_no,
            root_page_no,
            scan: None,
        };
        index.build_from_relation(&Path::new(&config.data_dir).join(relation_name))?;
        Ok(index)
    }

    /// The derived index file name (`<relation>.<offset>`).
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn relation_name(&self) -> &str {
        &self.relation_name
    }

    pub fn attr_type(&self) -> AttrType {
        self.attr_type
    }

    /// Scan the relation's heap file and insert every record's key.
    fn build_from_relation(&mut self, heap_path: &Path) -> Result<()> {
        let mut heap = HeapFile::open(heap_path)?;
        let mut scan = HeapScan::new(&mut heap);
        let mut entries = 0u64;
        while let Some((rid, record)) = scan.next()? {
            let end = self.attr_byte_offset + KEY_SIZE;
            if record.len() < end {
                return Err(IndexError::RecordTooShort {
                    rid,
                    offset: self.attr_byte_offset,
                });
            }
            let key = i32::from_le_bytes(record[self.attr_byte_offset..end].try_into().unwrap());
            self.insert_entry(key, rid)?;
            entries += 1;
        }
        tracing::info!(index = %self.index_name, entries, "built index from relation scan");
        Ok(())
    }

    /// Insert one `(key, rid)` entry, splitting nodes and growing the
    /// root as needed.
    pub fn insert_entry(&mut self, key: i32, rid: Rid) -> Result<()> {
        let mut stack: Vec<PageNo> = Vec::new();
        let root = self.root_page_no;
        self.pager.pin(root)?;
        stack.push(root);

        // First insert ever: the root has no children yet.
        if nonleaf::page_no(self.pager.page(root)?, 0) == INVALID_PAGE_NO {
            return self.first_insert(key, rid);
        }

        let mut cur = root;
        let leaf_no = loop {
            let (level, child) = {
                let page = self.pager.page(cur)?;
                let i = node::pick_child(page, key);
                (nonleaf::level(page), nonleaf::page_no(page, i))
            };
            debug_assert_ne!(child, INVALID_PAGE_NO);
            self.pager.pin(child)?;
            stack.push(child);
            if level == 1 {
                break child;
            }
            cur = child;
        };

        if node::leaf_insert(self.pager.page_mut(leaf_no)?, key, rid) {
            stack.pop();
            self.pager.unpin(leaf_no, true)?;
            while let Some(no) = stack.pop() {
                self.pager.unpin(no, false)?;
            }
            return Ok(());
        }

        // The leaf is full: split it, then push the separator upward until
        // it fits or a new root absorbs it.
        let (mut sep, mut new_page) = self.split_leaf(leaf_no, key, rid)?;
        stack.pop();
        loop {
            match stack.pop() {
                Some(parent) => {
                    if node::nonleaf_insert(self.pager.page_mut(parent)?, sep, new_page) {
                        self.pager.unpin(parent, true)?;
                        while let Some(no) = stack.pop() {
                            self.pager.unpin(no, false)?;
                        }
                        return Ok(());
                    }
                    let (next_sep, next_new) = self.split_nonleaf(parent, sep, new_page)?;
                    sep = next_sep;
                    new_page = next_new;
                }
                None => return self.grow_root(sep, new_page),
            }
        }
    }

    /// Seed an empty tree: two fresh sibling leaves under the root, the
    /// key as the root's first separator, and the entry in the right leaf
    /// (equal keys belong to the right of their separator).
    fn first_insert(&mut self, key: i32, rid: Rid) -> Result<()> {
        let root = self.root_page_no;
        let left = self.pager.alloc()?;
        let right = self.pager.alloc()?;

        leaf::set_right_sib(self.pager.page_mut(left)?, right);
        self.pager.unpin(left, true)?;

        let inserted = node::leaf_insert(self.pager.page_mut(right)?, key, rid);
        debug_assert!(inserted);
        self.pager.unpin(right, true)?;

        {
            let page = self.pager.page_mut(root)?;
            nonleaf::set_key(page, 0, key);
            nonleaf::set_page_no(page, 0, left);
            nonleaf::set_page_no(page, 1, right);
        }
        self.pager.unpin(root, true)?;
        tracing::debug!(root, left, right, "seeded empty tree");
        Ok(())
    }

    /// Split a full leaf while inserting `(key, rid)`. Returns the lifted
    /// separator and the new right sibling's page number; both halves are
    /// unpinned dirty on return.
    fn split_leaf(&mut self, leaf_no: PageNo, key: i32, rid: Rid) -> Result<(i32, PageNo)> {
        let new_no = self.pager.alloc()?;

        let (moved, old_right_sib) = {
            let page = self.pager.page_mut(leaf_no)?;
            let moved = node::leaf_drain_upper(page);
            let sib = leaf::right_sib(page);
            leaf::set_right_sib(page, new_no);
            (moved, sib)
        };
        {
            let page = self.pager.page_mut(new_no)?;
            node::leaf_fill(page, &moved);
            leaf::set_right_sib(page, old_right_sib);
        }

        // The new entry goes to whichever half owns its key range.
        let boundary = leaf::key(self.pager.page(new_no)?, 0);
        let target = if key >= boundary { new_no } else { leaf_no };
        let inserted = node::leaf_insert(self.pager.page_mut(target)?, key, rid);
        debug_assert!(inserted);

        // The separator is the new leaf's first key after the insert.
        let sep = leaf::key(self.pager.page(new_no)?, 0);
        self.pager.unpin(new_no, true)?;
        self.pager.unpin(leaf_no, true)?;
        tracing::debug!(leaf = leaf_no, new = new_no, sep, "leaf split");
        Ok((sep, new_no))
    }

    /// Split a full non-leaf while inserting `(key, child)`. The promoted
    /// key leaves both halves; the tail of the surviving half is zeroed so
    /// its vacancy tests stay correct.
    fn split_nonleaf(&mut self, node_no: PageNo, key: i32, child: PageNo) -> Result<(i32, PageNo)> {
        let new_no = self.pager.alloc()?;

        let (keys, children, level) = {
            let page = self.pager.page(node_no)?;
            let (keys, children) = node::nonleaf_merged(page, key, child);
            (keys, children, nonleaf::level(page))
        };
        let center = node::NONLEAF_SPLIT_CENTER;
        let lifted = keys[center];

        node::nonleaf_rewrite(
            self.pager.page_mut(node_no)?,
            &keys[..center],
            &children[..=center],
        );
        {
            let page = self.pager.page_mut(new_no)?;
            nonleaf::set_level(page, level);
            node::nonleaf_rewrite(page, &keys[center + 1..], &children[center + 1..]);
        }

        self.pager.unpin(new_no, true)?;
        self.pager.unpin(node_no, true)?;
        tracing::debug!(node = node_no, new = new_no, lifted, "non-leaf split");
        Ok((lifted, new_no))
    }

    /// Install a new root above a split former root and record it in the
    /// metadata header.
    fn grow_root(&mut self, sep: i32, right: PageNo) -> Result<()> {
        let old_root = self.root_page_no;
        self.pager.pin(old_root)?;
        let old_level = nonleaf::level(self.pager.page(old_root)?);
        self.pager.unpin(old_root, false)?;
        // Level 1 marks a parent of leaves; anything above is level 0.
        let level = (old_level - 1).max(0);
        debug_assert_eq!(level, 0);

        let new_root = self.pager.alloc()?;
        {
            let page = self.pager.page_mut(new_root)?;
            nonleaf::set_level(page, level);
            nonleaf::set_key(page, 0, sep);
            nonleaf::set_page_no(page, 0, old_root);
            nonleaf::set_page_no(page, 1, right);
        }
        self.pager.unpin(new_root, true)?;
        self.root_page_no = new_root;

        self.pager.pin(self.header_page_no)?;
        meta::set_root_page_no(self.pager.page_mut(self.header_page_no)?, new_root);
        self.pager.unpin(self.header_page_no, true)?;
        tracing::debug!(old_root, new_root, "root grew");
        Ok(())
    }

    /// Write every dirty page back and sync the index file.
    pub fn flush(&mut self) -> Result<()> {
        self.pager.flush()?;
        Ok(())
    }

    /// End any scan, flush, and close the index.
    pub fn close(mut self) -> Result<()> {
        if self.scan.is_some() {
            self.end_scan()?;
        }
        self.pager.flush()?;
        Ok(())
    }
}

impl Drop for BTreeIndex {
    fn drop(&mut self) {
        if let Some(state) = self.scan.take() {
            if state.current_page_no != INVALID_PAGE_NO {
                let _ = self.pager.unpin_if_pinned(state.current_page_no, false);
            }
        }
        if let Err(err) = self.pager.flush() {
            tracing::warn!(index = %self.index_name, %err, "flush on drop failed");
        }
    }
}
