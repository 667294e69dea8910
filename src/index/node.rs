//! Operations on a single pinned node page: search, insert, and the
//! entry-moving halves of a split. Page allocation and sibling linking
//! stay with the tree engine; everything here touches one page at a time.

use crate::storage::{Page, PageNo, Rid, INVALID_PAGE_NO};

use super::layout::{leaf, nonleaf, LEAF_FANOUT, NONLEAF_FANOUT};

/// Index of the first entry a leaf split moves to the new right sibling.
pub const LEAF_SPLIT_CENTER: usize = (LEAF_FANOUT + 1) / 2;
/// Index of the promoted key in the merged working arrays of a non-leaf
/// split.
pub const NONLEAF_SPLIT_CENTER: usize = (NONLEAF_FANOUT + 2) / 2;

// ---------------------------------------------------------------------
// Leaf nodes
// ---------------------------------------------------------------------

/// Number of occupied slots; the first empty slot ends the node.
pub fn leaf_occupancy(page: &Page) -> usize {
    for i in 0..LEAF_FANOUT {
        if leaf::rid(page, i).is_null() {
            return i;
        }
    }
    LEAF_FANOUT
}

pub fn leaf_is_full(page: &Page) -> bool {
    !leaf::rid(page, LEAF_FANOUT - 1).is_null()
}

/// Slot where `key` belongs: after every existing entry with an equal or
/// smaller key, so duplicates land to the right of their equals and keep
/// insertion order within the leaf.
pub fn leaf_insert_position(page: &Page, key: i32) -> usize {
    let used = leaf_occupancy(page);
    for i in 0..used {
        if leaf::key(page, i) > key {
            return i;
        }
    }
    used
}

/// Insert into a leaf, shifting the tail right. Returns false when the
/// leaf is full and a split is required.
pub fn leaf_insert(page: &mut Page, key: i32, rid: Rid) -> bool {
    if leaf_is_full(page) {
        return false;
    }
    let used = leaf_occupancy(page);
    let pos = leaf_insert_position(page, key);
    for i in (pos..used).rev() {
        let (k, r) = (leaf::key(page, i), leaf::rid(page, i));
        leaf::set_key(page, i + 1, k);
        leaf::set_rid(page, i + 1, r);
    }
    leaf::set_key(page, pos, key);
    leaf::set_rid(page, pos, rid);
    true
}

/// Move the upper half of a full leaf out, clearing the vacated slots.
/// Returns the moved entries in key order.
pub fn leaf_drain_upper(page: &mut Page) -> Vec<(i32, Rid)> {
    let mut moved = Vec::with_capacity(LEAF_FANOUT - LEAF_SPLIT_CENTER);
    for i in LEAF_SPLIT_CENTER..LEAF_FANOUT {
        let rid = leaf::rid(page, i);
        if rid.is_null() {
            break;
        }
        moved.push((leaf::key(page, i), rid));
        leaf::clear_entry(page, i);
    }
    moved
}

/// Write entries into a fresh leaf starting at slot 0.
pub fn leaf_fill(page: &mut Page, entries: &[(i32, Rid)]) {
    for (i, &(key, rid)) in entries.iter().enumerate() {
        leaf::set_key(page, i, key);
        leaf::set_rid(page, i, rid);
    }
}

// ---------------------------------------------------------------------
// Non-leaf nodes
// ---------------------------------------------------------------------

/// Number of used keys; a node with `k` keys has `k + 1` valid children.
pub fn nonleaf_occupancy(page: &Page) -> usize {
    for i in 0..NONLEAF_FANOUT {
        if nonleaf::page_no(page, i + 1) == INVALID_PAGE_NO {
            return i;
        }
    }
    NONLEAF_FANOUT
}

pub fn nonleaf_is_full(page: &Page) -> bool {
    nonleaf::page_no(page, NONLEAF_FANOUT) != INVALID_PAGE_NO
}

/// Child index to descend into for `target`: the first slot whose key is
/// at least the target, or the last occupied child.
pub fn pick_child(page: &Page, target: i32) -> usize {
    for i in 0..NONLEAF_FANOUT {
        if nonleaf::page_no(page, i + 1) == INVALID_PAGE_NO || nonleaf::key(page, i) >= target {
            return i;
        }
    }
    NONLEAF_FANOUT
}

/// Insert a separator key and the child to its right, shifting the tail.
/// Returns false when the node is full and a split is required.
pub fn nonleaf_insert(page: &mut Page, key: i32, child: PageNo) -> bool {
    if nonleaf_is_full(page) {
        return false;
    }
    let used = nonleaf_occupancy(page);
    let mut pos = used;
    for i in 0..used {
        if nonleaf::key(page, i) >= key {
            pos = i;
            break;
        }
    }
    for i in (pos..used).rev() {
        let k = nonleaf::key(page, i);
        nonleaf::set_key(page, i + 1, k);
    }
    for i in (pos + 1..=used).rev() {
        let p = nonleaf::page_no(page, i);
        nonleaf::set_page_no(page, i + 1, p);
    }
    nonleaf::set_key(page, pos, key);
    nonleaf::set_page_no(page, pos + 1, child);
    true
}

/// Merge a full node's contents with one more (key, child) pair into
/// working arrays of `NONLEAF_FANOUT + 1` keys and `NONLEAF_FANOUT + 2`
/// children, in sorted order.
pub fn nonleaf_merged(page: &Page, key: i32, child: PageNo) -> (Vec<i32>, Vec<PageNo>) {
    let used = nonleaf_occupancy(page);
    let mut pos = used;
    for i in 0..used {
        if nonleaf::key(page, i) >= key {
            pos = i;
            break;
        }
    }
    let mut keys = Vec::with_capacity(used + 1);
    let mut children = Vec::with_capacity(used + 2);
    for i in 0..pos {
        keys.push(nonleaf::key(page, i));
    }
    keys.push(key);
    for i in pos..used {
        keys.push(nonleaf::key(page, i));
    }
    for i in 0..=pos {
        children.push(nonleaf::page_no(page, i));
    }
    children.push(child);
    for i in pos + 1..=used {
        children.push(nonleaf::page_no(page, i));
    }
    (keys, children)
}

/// Replace a node's keys and children, zeroing both arrays first so the
/// tail slots read as vacant and the fullness test stays correct. The
/// level field is left untouched.
pub fn nonleaf_rewrite(page: &mut Page, keys: &[i32], children: &[PageNo]) {
    debug_assert_eq!(children.len(), keys.len() + 1);
    for i in 0..NONLEAF_FANOUT {
        nonleaf::set_key(page, i, 0);
    }
    for i in 0..=NONLEAF_FANOUT {
        nonleaf::set_page_no(page, i, INVALID_PAGE_NO);
    }
    for (i, &k) in keys.iter().enumerate() {
        nonleaf::set_key(page, i, k);
    }
    for (i, &c) in children.iter().enumerate() {
        nonleaf::set_page_no(page, i, c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_with(keys: &[i32]) -> Page {
        let mut p = Page::zeroed();
        for (i, &k) in keys.iter().enumerate() {
            leaf::set_key(&mut p, i, k);
            leaf::set_rid(&mut p, i, Rid::new(1, i as u16));
        }
        p
    }

    fn nonleaf_with(keys: &[i32], children: &[PageNo]) -> Page {
        assert_eq!(children.len(), keys.len() + 1);
        let mut p = Page::zeroed();
        nonleaf::set_level(&mut p, 1);
        for (i, &k) in keys.iter().enumerate() {
            nonleaf::set_key(&mut p, i, k);
        }
        for (i, &c) in children.iter().enumerate() {
            nonleaf::set_page_no(&mut p, i, c);
        }
        p
    }

    #[test]
    fn occupancy_stops_at_first_empty_slot() {
        let p = leaf_with(&[1, 2, 3]);
        assert_eq!(leaf_occupancy(&p), 3);
        assert!(!leaf_is_full(&p));
        assert_eq!(leaf_occupancy(&Page::zeroed()), 0);
    }

    #[test]
    fn insert_position_puts_duplicates_right_of_equals() {
        let p = leaf_with(&[5, 7, 7, 9]);
        assert_eq!(leaf_insert_position(&p, 1), 0);
        assert_eq!(leaf_insert_position(&p, 6), 1);
        assert_eq!(leaf_insert_position(&p, 7), 3);
        assert_eq!(leaf_insert_position(&p, 9), 4);
        assert_eq!(leaf_insert_position(&p, 10), 4);
    }

    #[test]
    fn leaf_insert_keeps_order_and_parallel_rids() {
        let mut p = Page::zeroed();
        assert!(leaf_insert(&mut p, 30, Rid::new(1, 0)));
        assert!(leaf_insert(&mut p, 10, Rid::new(1, 1)));
        assert!(leaf_insert(&mut p, 20, Rid::new(1, 2)));
        assert_eq!(
            (0..3).map(|i| leaf::key(&p, i)).collect::<Vec<_>>(),
            vec![10, 20, 30]
        );
        assert_eq!(leaf::rid(&p, 0), Rid::new(1, 1));
        assert_eq!(leaf::rid(&p, 1), Rid::new(1, 2));
        assert_eq!(leaf::rid(&p, 2), Rid::new(1, 0));
    }

    #[test]
    fn leaf_insert_refuses_full_node() {
        let keys: Vec<i32> = (0..LEAF_FANOUT as i32).collect();
        let mut p = leaf_with(&keys);
        assert!(leaf_is_full(&p));
        assert!(!leaf_insert(&mut p, 99, Rid::new(2, 0)));
    }

    #[test]
    fn drain_upper_moves_and_clears_the_tail() {
        let keys: Vec<i32> = (0..LEAF_FANOUT as i32).collect();
        let mut p = leaf_with(&keys);
        let moved = leaf_drain_upper(&mut p);
        assert_eq!(moved.len(), LEAF_FANOUT - LEAF_SPLIT_CENTER);
        assert_eq!(moved[0].0, LEAF_SPLIT_CENTER as i32);
        assert_eq!(moved.last().unwrap().0, LEAF_FANOUT as i32 - 1);
        assert_eq!(leaf_occupancy(&p), LEAF_SPLIT_CENTER);
        assert!(leaf::rid(&p, LEAF_SPLIT_CENTER).is_null());
        assert_eq!(leaf::key(&p, LEAF_SPLIT_CENTER), -1);

        let mut fresh = Page::zeroed();
        leaf_fill(&mut fresh, &moved);
        assert_eq!(leaf_occupancy(&fresh), moved.len());
        assert_eq!(leaf::key(&fresh, 0), LEAF_SPLIT_CENTER as i32);
    }

    #[test]
    fn pick_child_equality_goes_to_the_separator_slot() {
        let p = nonleaf_with(&[10, 20], &[4, 5, 6]);
        assert_eq!(pick_child(&p, 5), 0);
        assert_eq!(pick_child(&p, 10), 0);
        assert_eq!(pick_child(&p, 15), 1);
        assert_eq!(pick_child(&p, 20), 1);
        assert_eq!(pick_child(&p, 25), 2);
    }

    #[test]
    fn nonleaf_insert_shifts_keys_and_children() {
        let mut p = nonleaf_with(&[10, 30], &[4, 5, 6]);
        assert!(nonleaf_insert(&mut p, 20, 9));
        assert_eq!(nonleaf_occupancy(&p), 3);
        assert_eq!(
            (0..3).map(|i| nonleaf::key(&p, i)).collect::<Vec<_>>(),
            vec![10, 20, 30]
        );
        assert_eq!(
            (0..4).map(|i| nonleaf::page_no(&p, i)).collect::<Vec<_>>(),
            vec![4, 5, 9, 6]
        );
    }

    #[test]
    fn nonleaf_insert_refuses_full_node() {
        let keys: Vec<i32> = (0..NONLEAF_FANOUT as i32).collect();
        let children: Vec<PageNo> = (10..10 + NONLEAF_FANOUT as PageNo + 1).collect();
        let mut p = nonleaf_with(&keys, &children);
        assert!(nonleaf_is_full(&p));
        assert!(!nonleaf_insert(&mut p, 5000, 7));
    }

    #[test]
    fn merged_arrays_interleave_the_new_pair() {
        let p = nonleaf_with(&[10, 30], &[4, 5, 6]);
        let (keys, children) = nonleaf_merged(&p, 20, 9);
        assert_eq!(keys, vec![10, 20, 30]);
        assert_eq!(children, vec![4, 5, 9, 6]);

        let (keys, children) = nonleaf_merged(&p, 40, 9);
        assert_eq!(keys, vec![10, 30, 40]);
        assert_eq!(children, vec![4, 5, 6, 9]);
    }

    #[test]
    fn rewrite_zeroes_the_tail() {
        let keys: Vec<i32> = (0..NONLEAF_FANOUT as i32).collect();
        let children: Vec<PageNo> = (10..10 + NONLEAF_FANOUT as PageNo + 1).collect();
        let mut p = nonleaf_with(&keys, &children);
        nonleaf_rewrite(&mut p, &[100], &[3, 4]);
        assert!(!nonleaf_is_full(&p));
        assert_eq!(nonleaf_occupancy(&p), 1);
        assert_eq!(nonleaf::key(&p, 0), 100);
        assert_eq!(nonleaf::page_no(&p, 0), 3);
        assert_eq!(nonleaf::page_no(&p, 1), 4);
        assert_eq!(nonleaf::page_no(&p, 2), INVALID_PAGE_NO);
        assert_eq!(nonleaf::level(&p), 1);
    }

    #[test]
    fn split_centers_match_the_fanouts() {
        assert_eq!(LEAF_SPLIT_CENTER, (LEAF_FANOUT + 1) / 2);
        assert_eq!(NONLEAF_SPLIT_CENTER, (NONLEAF_FANOUT + 2) / 2);
        assert!(LEAF_SPLIT_CENTER < LEAF_FANOUT);
        assert!(NONLEAF_SPLIT_CENTER < NONLEAF_FANOUT + 1);
    }
}
