//! RustIndex demo binary: build a small relation, index it, scan a range.
//! Usage: rustindex [CONFIG_PATH]

use anyhow::Result;
use rustindex::{AttrType, BTreeIndex, Config, HeapFile, IndexError, Operator};
use std::env;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const RELATION: &str = "demo_rel";
const KEY_OFFSET: usize = 8;

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match env::args().nth(1) {
        Some(path) => Config::from_path(&PathBuf::from(path))?,
        None => Config::default_config(),
    };

    let heap_path = Path::new(&config.data_dir).join(RELATION);
    if !heap_path.exists() {
        build_demo_relation(&heap_path)?;
    }

    let mut index = BTreeIndex::open(&config, RELATION, KEY_OFFSET, AttrType::Integer)?;
    tracing::info!(index = index.index_name(), "index ready");

    index.start_scan(100, Operator::Gte, 120, Operator::Lte)?;
    let mut hits = 0u32;
    loop {
        match index.scan_next() {
            Ok(rid) => {
                hits += 1;
                tracing::info!(page = rid.page_no, slot = rid.slot_no, "match");
            }
            Err(IndexError::IndexScanCompleted) => break,
            Err(err) => return Err(err.into()),
        }
    }
    index.end_scan()?;
    tracing::info!(hits, "range scan [100, 120] finished");
    index.close()?;
    Ok(())
}

/// A relation of 1000 fixed-width records: row id (8 bytes), then the
/// indexed key, then a little payload. Keys are scattered so the index
/// has some sorting to do.
fn build_demo_relation(path: &Path) -> Result<()> {
    let mut heap = HeapFile::create(path)?;
    for i in 0..1000u64 {
        let key = ((i * 7919) % 1000) as i32;
        let mut record = Vec::with_capacity(KEY_OFFSET + 4 + 8);
        record.extend_from_slice(&i.to_le_bytes());
        record.extend_from_slice(&key.to_le_bytes());
        record.extend_from_slice(&[0u8; 8]);
        heap.append_record(&record)?;
    }
    tracing::info!(path = %path.display(), "built demo relation");
    Ok(())
}
