//! On-page layout of the three index page roles: metadata header, leaf
//! node, non-leaf node. Fields are read and written in place through
//! little-endian accessors, so a page fetched from the pager is usable
//! as-is; the file format is consequently not portable across platforms
//! with a different layout of these constants.

use crate::storage::page::{get_i32, get_u16, get_u32, put_i32, put_u16, put_u32};
use crate::storage::{Page, PageNo, Rid, PAGE_SIZE};

pub const KEY_SIZE: usize = std::mem::size_of::<i32>();
pub const PAGE_NO_SIZE: usize = std::mem::size_of::<PageNo>();
pub const LEVEL_SIZE: usize = std::mem::size_of::<i32>();
/// Stored record identifier: page number (4) + slot (2) + 2 bytes pad.
pub const RID_SIZE: usize = 8;

/// Maximum entries in a leaf node.
pub const LEAF_FANOUT: usize = (PAGE_SIZE - PAGE_NO_SIZE) / (KEY_SIZE + RID_SIZE);
/// Maximum keys in a non-leaf node (one more child pointer than keys).
pub const NONLEAF_FANOUT: usize =
    (PAGE_SIZE - LEVEL_SIZE - PAGE_NO_SIZE) / (KEY_SIZE + PAGE_NO_SIZE);

/// Metadata header page: relation name, key byte offset, attribute type
/// code, root page number. Lives on the index file's first page.
pub mod meta {
    use super::*;

    pub const REL_NAME_LEN: usize = 20;
    const REL_NAME_OFF: usize = 0;
    const ATTR_OFFSET_OFF: usize = REL_NAME_LEN;
    const ATTR_TYPE_OFF: usize = ATTR_OFFSET_OFF + 4;
    const ROOT_OFF: usize = ATTR_TYPE_OFF + 4;

    /// The stored relation name, nul padding stripped.
    pub fn relation_name(page: &Page) -> String {
        let raw = &page.as_bytes()[REL_NAME_OFF..REL_NAME_OFF + REL_NAME_LEN];
        let end = raw.iter().position(|&b| b == 0).unwrap_or(REL_NAME_LEN);
        String::from_utf8_lossy(&raw[..end]).into_owned()
    }

    /// Store the relation name nul-padded. `name` must be shorter than
    /// `REL_NAME_LEN` bytes; the caller validates.
    pub fn set_relation_name(page: &mut Page, name: &str) {
        let field = &mut page.as_bytes_mut()[REL_NAME_OFF..REL_NAME_OFF + REL_NAME_LEN];
        field.fill(0);
        field[..name.len()].copy_from_slice(name.as_bytes());
    }

    pub fn attr_byte_offset(page: &Page) -> i32 {
        get_i32(page.as_bytes(), ATTR_OFFSET_OFF)
    }

    pub fn set_attr_byte_offset(page: &mut Page, off: i32) {
        put_i32(page.as_bytes_mut(), ATTR_OFFSET_OFF, off);
    }

    pub fn attr_type_code(page: &Page) -> i32 {
        get_i32(page.as_bytes(), ATTR_TYPE_OFF)
    }

    pub fn set_attr_type_code(page: &mut Page, code: i32) {
        put_i32(page.as_bytes_mut(), ATTR_TYPE_OFF, code);
    }

    pub fn root_page_no(page: &Page) -> PageNo {
        get_u32(page.as_bytes(), ROOT_OFF)
    }

    pub fn set_root_page_no(page: &mut Page, no: PageNo) {
        put_u32(page.as_bytes_mut(), ROOT_OFF, no);
    }
}

/// Leaf node page: key array, parallel record-identifier array, right
/// sibling pointer. Entries are packed left-aligned; a slot is empty iff
/// its record identifier carries page number 0, and the first empty slot
/// marks the end of the node.
pub mod leaf {
    use super::*;

    const KEYS_OFF: usize = 0;
    const RIDS_OFF: usize = KEYS_OFF + KEY_SIZE * LEAF_FANOUT;
    const RIGHT_SIB_OFF: usize = RIDS_OFF + RID_SIZE * LEAF_FANOUT;

    pub fn key(page: &Page, i: usize) -> i32 {
        get_i32(page.as_bytes(), KEYS_OFF + i * KEY_SIZE)
    }

    pub fn set_key(page: &mut Page, i: usize, k: i32) {
        put_i32(page.as_bytes_mut(), KEYS_OFF + i * KEY_SIZE, k);
    }

    pub fn rid(page: &Page, i: usize) -> Rid {
        let off = RIDS_OFF + i * RID_SIZE;
        Rid::new(
            get_u32(page.as_bytes(), off),
            get_u16(page.as_bytes(), off + 4),
        )
    }

    pub fn set_rid(page: &mut Page, i: usize, rid: Rid) {
        let off = RIDS_OFF + i * RID_SIZE;
        let b = page.as_bytes_mut();
        put_u32(b, off, rid.page_no);
        put_u16(b, off + 4, rid.slot_no);
        put_u16(b, off + 6, 0);
    }

    /// Mark slot `i` empty.
    pub fn clear_entry(page: &mut Page, i: usize) {
        set_key(page, i, -1);
        set_rid(page, i, Rid::null());
    }

    pub fn right_sib(page: &Page) -> PageNo {
        get_u32(page.as_bytes(), RIGHT_SIB_OFF)
    }

    pub fn set_right_sib(page: &mut Page, no: PageNo) {
        put_u32(page.as_bytes_mut(), RIGHT_SIB_OFF, no);
    }
}

/// Non-leaf node page: level flag, key array, child pointer array. A node
/// with `k` used keys has `k + 1` valid children; level 1 means the
/// children are leaves, level 0 means they are non-leaf nodes.
pub mod nonleaf {
    use super::*;

    const LEVEL_OFF: usize = 0;
    const KEYS_OFF: usize = LEVEL_OFF + LEVEL_SIZE;
    const PAGE_NOS_OFF: usize = KEYS_OFF + KEY_SIZE * NONLEAF_FANOUT;

    pub fn level(page: &Page) -> i32 {
        get_i32(page.as_bytes(), LEVEL_OFF)
    }

    pub fn set_level(page: &mut Page, level: i32) {
        put_i32(page.as_bytes_mut(), LEVEL_OFF, level);
    }

    pub fn key(page: &Page, i: usize) -> i32 {
        get_i32(page.as_bytes(), KEYS_OFF + i * KEY_SIZE)
    }

    pub fn set_key(page: &mut Page, i: usize, k: i32) {
        put_i32(page.as_bytes_mut(), KEYS_OFF + i * KEY_SIZE, k);
    }

    pub fn page_no(page: &Page, i: usize) -> PageNo {
        get_u32(page.as_bytes(), PAGE_NOS_OFF + i * PAGE_NO_SIZE)
    }

    pub fn set_page_no(page: &mut Page, i: usize, no: PageNo) {
        put_u32(page.as_bytes_mut(), PAGE_NOS_OFF + i * PAGE_NO_SIZE, no);
    }
}
