//! Range-scan state machine: an initial descent to the first qualifying
//! leaf entry, then forward iteration across the sibling chain with
//! bound checks on every candidate.

use crate::error::{IndexError, Result};
use crate::storage::{Page, PageNo, Rid, INVALID_PAGE_NO};

use super::layout::{leaf, nonleaf, LEAF_FANOUT};
use super::node;
use super::tree::BTreeIndex;
use super::Operator;

/// State carried across `start_scan` / `scan_next` / `end_scan`. While
/// entries remain, exactly one leaf stays pinned between calls.
#[derive(Debug)]
pub(super) struct ScanState {
    low_val: i32,
    high_val: i32,
    low_op: Operator,
    high_op: Operator,
    pub(super) current_page_no: PageNo,
    /// Next candidate slot in the current leaf; `LEAF_FANOUT` forces a
    /// sibling hop.
    next_entry: usize,
    /// Set once the range is exhausted; the scan stays active until
    /// `end_scan`.
    at_end: bool,
}

fn admits_low(op: Operator, key: i32, low: i32) -> bool {
    match op {
        Operator::Gte => key >= low,
        _ => key > low,
    }
}

fn within_high(op: Operator, key: i32, high: i32) -> bool {
    match op {
        Operator::Lte => key <= high,
        _ => key < high,
    }
}

/// First slot admitted by the low bound, or `LEAF_FANOUT` when the leaf
/// holds none (the first `scan_next` then hops to the sibling).
fn first_qualifying(page: &Page, low_val: i32, low_op: Operator) -> usize {
    for j in 0..LEAF_FANOUT {
        if leaf::rid(page, j).is_null() {
            return LEAF_FANOUT;
        }
        if admits_low(low_op, leaf::key(page, j), low_val) {
            return j;
        }
    }
    LEAF_FANOUT
}

impl BTreeIndex {
    /// Begin a range scan over `(low_val, low_op) .. (high_val, high_op)`.
    /// Any scan already in progress is ended first.
    pub fn start_scan(
        &mut self,
        low_val: i32,
        low_op: Operator,
        high_val: i32,
        high_op: Operator,
    ) -> Result<()> {
        if self.scan.is_some() {
            self.end_scan()?;
        }
        if !matches!(low_op, Operator::Gt | Operator::Gte)
            || !matches!(high_op, Operator::Lt | Operator::Lte)
        {
            return Err(IndexError::BadOpcodes);
        }
        if low_val > high_val {
            return Err(IndexError::BadScanRange {
                low: low_val,
                high: high_val,
            });
        }

        let mut cur = self.root_page_no;
        self.pager.pin(cur)?;

        // An empty tree has nothing to pin; the first `scan_next` reports
        // completion.
        if nonleaf::page_no(self.pager.page(cur)?, 0) == INVALID_PAGE_NO {
            self.pager.unpin(cur, false)?;
            self.scan = Some(ScanState {
                low_val,
                high_val,
                low_op,
                high_op,
                current_page_no: INVALID_PAGE_NO,
                next_entry: LEAF_FANOUT,
                at_end: true,
            });
            return Ok(());
        }

        // Descend toward the subtree that can hold the low bound,
        // unpinning each interior node on the way down. Landing one leaf
        // left of the first qualifying entry is fine: the linear probe
        // and the sibling hop skip past it.
        let leaf_no = loop {
            let (level, child) = {
                let page = self.pager.page(cur)?;
                let i = node::pick_child(page, low_val);
                (nonleaf::level(page), nonleaf::page_no(page, i))
            };
            self.pager.unpin(cur, false)?;
            self.pager.pin(child)?;
            if level == 1 {
                break child;
            }
            cur = child;
        };

        let next_entry = first_qualifying(self.pager.page(leaf_no)?, low_val, low_op);
        self.scan = Some(ScanState {
            low_val,
            high_val,
            low_op,
            high_op,
            current_page_no: leaf_no,
            next_entry,
            at_end: false,
        });
        Ok(())
    }

    /// The next record identifier in the range, in ascending key order.
    /// Fails `IndexScanCompleted` once the range is exhausted; the scan
    /// stays active until `end_scan`.
    pub fn scan_next(&mut self) -> Result<Rid> {
        let state = self.scan.as_mut().ok_or(IndexError::ScanNotInitialized)?;
        if state.at_end {
            return Err(IndexError::IndexScanCompleted);
        }
        loop {
            if state.next_entry == LEAF_FANOUT {
                // Current leaf exhausted: test the chain before touching
                // the next page, then swap pins.
                let right = leaf::right_sib(self.pager.page(state.current_page_no)?);
                self.pager.unpin(state.current_page_no, false)?;
                if right == INVALID_PAGE_NO {
                    state.at_end = true;
                    state.current_page_no = INVALID_PAGE_NO;
                    return Err(IndexError::IndexScanCompleted);
                }
                self.pager.pin(right)?;
                state.current_page_no = right;
                state.next_entry = 0;
            }

            let (key, rid) = {
                let page = self.pager.page(state.current_page_no)?;
                (
                    leaf::key(page, state.next_entry),
                    leaf::rid(page, state.next_entry),
                )
            };
            if rid.is_null() {
                state.next_entry = LEAF_FANOUT;
                continue;
            }
            if !within_high(state.high_op, key, state.high_val) {
                // The leaf stays pinned; `end_scan` returns it.
                state.at_end = true;
                return Err(IndexError::IndexScanCompleted);
            }
            if !admits_low(state.low_op, key, state.low_val) {
                state.next_entry += 1;
                continue;
            }
            state.next_entry += 1;
            return Ok(rid);
        }
    }

    /// End the scan, returning the pinned leaf if one is held.
    pub fn end_scan(&mut self) -> Result<()> {
        let state = self.scan.take().ok_or(IndexError::ScanNotInitialized)?;
        if state.current_page_no != INVALID_PAGE_NO {
            self.pager.unpin_if_pinned(state.current_page_no, false)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::index::AttrType;
    use crate::storage::HeapFile;
    use std::path::Path;
    use tempfile::TempDir;

    fn open_empty(dir: &TempDir, name: &str) -> BTreeIndex {
        let config = Config {
            buffer_pool_size: 64,
            data_dir: dir.path().to_string_lossy().into_owned(),
        };
        HeapFile::create(Path::new(&config.data_dir).join(name)).unwrap();
        BTreeIndex::open(&config, name, 0, AttrType::Integer).unwrap()
    }

    fn with_keys(dir: &TempDir, name: &str, keys: &[i32]) -> BTreeIndex {
        let mut index = open_empty(dir, name);
        for &k in keys {
            index.insert_entry(k, Rid::new(1 + k as u32, 0)).unwrap();
        }
        index
    }

    fn collect_keys(
        index: &mut BTreeIndex,
        low: i32,
        low_op: Operator,
        high: i32,
        high_op: Operator,
    ) -> Vec<i32> {
        index.start_scan(low, low_op, high, high_op).unwrap();
        let mut keys = Vec::new();
        loop {
            match index.scan_next() {
                Ok(rid) => keys.push(rid.page_no as i32 - 1),
                Err(IndexError::IndexScanCompleted) => break,
                Err(err) => panic!("scan failed: {err}"),
            }
        }
        index.end_scan().unwrap();
        keys
    }

    #[test]
    fn bad_opcodes_rejected() {
        let dir = TempDir::new().unwrap();
        let mut index = with_keys(&dir, "ops_rel", &[10, 20]);
        for (low_op, high_op) in [
            (Operator::Gt, Operator::Gt),
            (Operator::Lt, Operator::Lt),
            (Operator::Lte, Operator::Lte),
            (Operator::Gte, Operator::Gte),
        ] {
            match index.start_scan(10, low_op, 20, high_op) {
                Err(IndexError::BadOpcodes) => {}
                other => panic!("expected BadOpcodes, got {other:?}"),
            }
        }
        // A rejected start leaves no scan behind.
        match index.scan_next() {
            Err(IndexError::ScanNotInitialized) => {}
            other => panic!("expected ScanNotInitialized, got {other:?}"),
        }
    }

    #[test]
    fn inverted_range_rejected() {
        let dir = TempDir::new().unwrap();
        let mut index = with_keys(&dir, "range_rel", &[10, 20]);
        match index.start_scan(30, Operator::Gte, 10, Operator::Lte) {
            Err(IndexError::BadScanRange { low: 30, high: 10 }) => {}
            other => panic!("expected BadScanRange, got {other:?}"),
        }
    }

    #[test]
    fn scan_calls_require_a_scan() {
        let dir = TempDir::new().unwrap();
        let mut index = with_keys(&dir, "noscan_rel", &[1]);
        assert!(matches!(
            index.scan_next(),
            Err(IndexError::ScanNotInitialized)
        ));
        assert!(matches!(
            index.end_scan(),
            Err(IndexError::ScanNotInitialized)
        ));
    }

    #[test]
    fn inclusive_bounds_return_the_whole_range() {
        let dir = TempDir::new().unwrap();
        let mut index = with_keys(&dir, "incl_rel", &[10, 20, 30]);
        assert_eq!(
            collect_keys(&mut index, 10, Operator::Gte, 30, Operator::Lte),
            vec![10, 20, 30]
        );
    }

    #[test]
    fn strict_bounds_trim_both_ends() {
        let dir = TempDir::new().unwrap();
        let keys: Vec<i32> = (0..8).map(|i| 5 + i * 10).collect(); // 5, 15, .. 75
        let mut index = with_keys(&dir, "strict_rel", &keys);
        assert_eq!(
            collect_keys(&mut index, 20, Operator::Gt, 60, Operator::Lt),
            vec![25, 35, 45, 55]
        );
    }

    #[test]
    fn point_scan_returns_exactly_the_key() {
        let dir = TempDir::new().unwrap();
        let mut index = with_keys(&dir, "point_rel", &[10, 20, 30]);
        assert_eq!(
            collect_keys(&mut index, 20, Operator::Gte, 20, Operator::Lte),
            vec![20]
        );
        assert_eq!(
            collect_keys(&mut index, 20, Operator::Gt, 20, Operator::Lte),
            Vec::<i32>::new()
        );
    }

    #[test]
    fn strict_equal_bounds_complete_immediately() {
        let dir = TempDir::new().unwrap();
        let keys: Vec<i32> = (1..=100).collect();
        let mut index = with_keys(&dir, "empty_range_rel", &keys);
        assert_eq!(
            collect_keys(&mut index, 50, Operator::Gt, 50, Operator::Lte),
            Vec::<i32>::new()
        );
        assert_eq!(
            collect_keys(&mut index, 5, Operator::Gt, 6, Operator::Lt),
            Vec::<i32>::new()
        );
    }

    #[test]
    fn scan_crosses_leaf_boundaries() {
        let dir = TempDir::new().unwrap();
        let keys: Vec<i32> = (0..800).collect();
        let mut index = with_keys(&dir, "cross_rel", &keys);
        let got = collect_keys(&mut index, 300, Operator::Gte, 500, Operator::Lt);
        assert_eq!(got, (300..500).collect::<Vec<i32>>());

        let everything = collect_keys(&mut index, 0, Operator::Gte, 799, Operator::Lte);
        assert_eq!(everything, keys);
    }

    #[test]
    fn low_bound_above_every_key_completes() {
        let dir = TempDir::new().unwrap();
        let mut index = with_keys(&dir, "above_rel", &[1, 2, 3]);
        assert_eq!(
            collect_keys(&mut index, 100, Operator::Gte, 200, Operator::Lte),
            Vec::<i32>::new()
        );
    }

    #[test]
    fn empty_tree_scan_completes_on_first_next() {
        let dir = TempDir::new().unwrap();
        let mut index = open_empty(&dir, "empty_rel");
        index
            .start_scan(0, Operator::Gte, 10, Operator::Lte)
            .unwrap();
        assert!(matches!(
            index.scan_next(),
            Err(IndexError::IndexScanCompleted)
        ));
        index.end_scan().unwrap();
    }

    #[test]
    fn completed_scan_stays_completed_until_ended() {
        let dir = TempDir::new().unwrap();
        let mut index = with_keys(&dir, "done_rel", &[1, 2]);
        index.start_scan(0, Operator::Gte, 10, Operator::Lte).unwrap();
        index.scan_next().unwrap();
        index.scan_next().unwrap();
        for _ in 0..3 {
            assert!(matches!(
                index.scan_next(),
                Err(IndexError::IndexScanCompleted)
            ));
        }
        index.end_scan().unwrap();
        assert!(matches!(
            index.scan_next(),
            Err(IndexError::ScanNotInitialized)
        ));
    }

    #[test]
    fn restarting_a_scan_ends_the_previous_one() {
        let dir = TempDir::new().unwrap();
        let mut index = with_keys(&dir, "restart_rel", &[1, 2, 3]);
        index.start_scan(1, Operator::Gte, 3, Operator::Lte).unwrap();
        index.scan_next().unwrap();
        // Start again mid-scan; the fresh scan sees the full range.
        assert_eq!(
            collect_keys(&mut index, 1, Operator::Gte, 3, Operator::Lte),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn high_bound_stops_inside_a_leaf() {
        let dir = TempDir::new().unwrap();
        let keys: Vec<i32> = (0..50).collect();
        let mut index = with_keys(&dir, "stop_rel", &keys);
        assert_eq!(
            collect_keys(&mut index, 10, Operator::Gt, 15, Operator::Lt),
            vec![11, 12, 13, 14]
        );
    }
}
