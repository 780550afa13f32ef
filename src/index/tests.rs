//! Integration tests for the index layer

use std::sync::{Arc, Mutex};

use crate::file::{BufferManager, PagedFileManager};
use crate::index::{BTreeIndex, IndexError, TitleIndex};
use crate::record::Rid;
use tempfile::TempDir;

fn setup(capacity: usize) -> (TempDir, Arc<Mutex<BufferManager>>) {
    let temp_dir = tempfile::tempdir().unwrap();
    let file_manager = PagedFileManager::new();
    let buffer = Arc::new(Mutex::new(BufferManager::with_capacity(
        file_manager,
        capacity,
    )));
    (temp_dir, buffer)
}

#[test]
fn test_insert_and_search() {
    let (temp_dir, buffer) = setup(16);
    let path = temp_dir.path().join("title.idx");
    let mut tree = TitleIndex::open(buffer, &path).unwrap();

    tree.insert("The Matrix", Rid::new(0, 3)).unwrap();
    tree.insert("Alien", Rid::new(0, 1)).unwrap();
    tree.insert("Blade Runner", Rid::new(1, 0)).unwrap();

    let rids: Vec<Rid> = tree.search("Alien").unwrap().collect();
    assert_eq!(rids, vec![Rid::new(0, 1)]);

    let rids: Vec<Rid> = tree.search("The Matrix").unwrap().collect();
    assert_eq!(rids, vec![Rid::new(0, 3)]);

    assert_eq!(tree.search("Solaris").unwrap().count(), 0);
}

#[test]
fn test_duplicate_keys_collapse_into_rid_list() {
    let (temp_dir, buffer) = setup(16);
    let path = temp_dir.path().join("title.idx");
    let mut tree = TitleIndex::open(buffer, &path).unwrap();

    tree.insert("Dracula", Rid::new(0, 0)).unwrap();
    tree.insert("Dracula", Rid::new(0, 7)).unwrap();
    tree.insert("Dracula", Rid::new(2, 1)).unwrap();

    let rids: Vec<Rid> = tree.search("Dracula").unwrap().collect();
    assert_eq!(rids, vec![Rid::new(0, 0), Rid::new(0, 7), Rid::new(2, 1)]);
}

#[test]
fn test_range_search_inclusive_and_ordered() {
    let (temp_dir, buffer) = setup(16);
    let path = temp_dir.path().join("title.idx");
    let mut tree = TitleIndex::open(buffer, &path).unwrap();

    // Insert out of order; slot id encodes the expected rank
    for (rank, title) in [(2usize, "C"), (0, "A"), (4, "E"), (1, "B"), (3, "D")] {
        tree.insert(title, Rid::new(0, rank)).unwrap();
    }

    let rids: Vec<Rid> = tree.range_search("B", "D").unwrap().collect();
    assert_eq!(rids, vec![Rid::new(0, 1), Rid::new(0, 2), Rid::new(0, 3)]);

    // Full keyspace comes back in ascending key order
    let rids: Vec<Rid> = tree.range_search("A", "E").unwrap().collect();
    assert_eq!(
        rids.iter().map(|r| r.slot_id).collect::<Vec<_>>(),
        vec![0, 1, 2, 3, 4]
    );
}

#[test]
fn test_range_search_empty_and_point() {
    let (temp_dir, buffer) = setup(16);
    let path = temp_dir.path().join("title.idx");
    let mut tree = TitleIndex::open(buffer, &path).unwrap();

    tree.insert("B", Rid::new(0, 0)).unwrap();

    // lo > hi yields nothing
    assert_eq!(tree.range_search("Z", "A").unwrap().count(), 0);

    // lo == hi reduces to a point lookup
    let rids: Vec<Rid> = tree.range_search("B", "B").unwrap().collect();
    assert_eq!(rids, vec![Rid::new(0, 0)]);

    // A range that misses every key
    assert_eq!(tree.range_search("C", "D").unwrap().count(), 0);
}

#[test]
fn test_splits_keep_every_key_reachable() {
    let (temp_dir, buffer) = setup(16);
    let path = temp_dir.path().join("title.idx");
    // Tiny order so a few hundred keys build a multi-level tree
    let mut tree: BTreeIndex<8> = BTreeIndex::open(buffer, &path).unwrap();

    let count = 300;
    for i in 0..count {
        tree.insert(&format!("{i:05}"), Rid::new(i / 100, i % 100))
            .unwrap();
    }

    for i in 0..count {
        let rids: Vec<Rid> = tree.search(&format!("{i:05}")).unwrap().collect();
        assert_eq!(rids, vec![Rid::new(i / 100, i % 100)], "key {i:05}");
    }

    // Leaf chain enumerates the whole keyspace in order
    let all: Vec<Rid> = tree.range_search("00000", "99999").unwrap().collect();
    assert_eq!(all.len(), count);
    for (i, rid) in all.iter().enumerate() {
        assert_eq!(*rid, Rid::new(i / 100, i % 100));
    }
}

#[test]
fn test_bulk_load_sorted_input() {
    let (temp_dir, buffer) = setup(16);
    let path = temp_dir.path().join("title.idx");
    let mut tree: BTreeIndex<8> = BTreeIndex::open(buffer, &path).unwrap();

    tree.begin_bulk_load();
    for i in 0..250 {
        tree.insert(&format!("{i:05}"), Rid::new(0, i)).unwrap();
    }
    tree.end_bulk_load().unwrap();

    // Rebuilt enumeration equals the input, in order
    let all: Vec<Rid> = tree.range_search("00000", "99999").unwrap().collect();
    assert_eq!(all.len(), 250);
    for (i, rid) in all.iter().enumerate() {
        assert_eq!(*rid, Rid::new(0, i));
    }

    let rids: Vec<Rid> = tree.search("00123").unwrap().collect();
    assert_eq!(rids, vec![Rid::new(0, 123)]);
}

#[test]
fn test_bulk_load_duplicate_keys() {
    let (temp_dir, buffer) = setup(16);
    let path = temp_dir.path().join("title.idx");
    let mut tree: BTreeIndex<8> = BTreeIndex::open(buffer, &path).unwrap();

    tree.begin_bulk_load();
    tree.insert("A", Rid::new(0, 0)).unwrap();
    tree.insert("B", Rid::new(0, 1)).unwrap();
    tree.insert("B", Rid::new(0, 2)).unwrap();
    tree.insert("C", Rid::new(0, 3)).unwrap();
    tree.end_bulk_load().unwrap();

    let rids: Vec<Rid> = tree.search("B").unwrap().collect();
    assert_eq!(rids, vec![Rid::new(0, 1), Rid::new(0, 2)]);
}

#[test]
fn test_bulk_load_rejects_unsorted_input() {
    let (temp_dir, buffer) = setup(16);
    let path = temp_dir.path().join("title.idx");
    let mut tree = TitleIndex::open(buffer, &path).unwrap();

    tree.begin_bulk_load();
    tree.insert("M", Rid::new(0, 0)).unwrap();
    let result = tree.insert("A", Rid::new(0, 1));
    assert!(matches!(result, Err(IndexError::UnsortedBulkLoad { .. })));
}

#[test]
fn test_tree_survives_reopen() {
    let (temp_dir, buffer) = setup(16);
    let path = temp_dir.path().join("title.idx");

    {
        // Small order forces several root splits before the flush
        let mut tree: BTreeIndex<4> = BTreeIndex::open(buffer.clone(), &path).unwrap();
        for i in 0..50 {
            tree.insert(&format!("{i:04}"), Rid::new(0, i)).unwrap();
        }
        tree.force().unwrap();
    }

    // Drop every frame so the reopen really reads disk
    buffer.lock().unwrap().aggressive_cleanup().unwrap();

    let tree: BTreeIndex<4> = BTreeIndex::open(buffer, &path).unwrap();
    for i in 0..50 {
        let rids: Vec<Rid> = tree.search(&format!("{i:04}")).unwrap().collect();
        assert_eq!(rids, vec![Rid::new(0, i)], "key {i:04}");
    }

    let all: Vec<Rid> = tree.range_search("0000", "9999").unwrap().collect();
    assert_eq!(all.len(), 50);
}

#[test]
fn test_range_search_under_buffer_pressure() {
    // Pool of 4 frames while the tree spans far more pages
    let (temp_dir, buffer) = setup(4);
    let path = temp_dir.path().join("title.idx");
    let mut tree: BTreeIndex<8> = BTreeIndex::open(buffer, &path).unwrap();

    let count = 1000;
    tree.begin_bulk_load();
    for i in 0..count {
        tree.insert(&format!("{i:06}"), Rid::new(i / 100, i % 100))
            .unwrap();
    }
    tree.end_bulk_load().unwrap();

    let all: Vec<Rid> = tree.range_search("000000", "999999").unwrap().collect();
    assert_eq!(all.len(), count);

    let distinct: std::collections::HashSet<Rid> = all.into_iter().collect();
    assert_eq!(distinct.len(), count);
}

#[test]
fn test_normal_insert_under_buffer_pressure() {
    let (temp_dir, buffer) = setup(4);
    let path = temp_dir.path().join("title.idx");
    let mut tree: BTreeIndex<8> = BTreeIndex::open(buffer, &path).unwrap();

    let count = 400;
    for i in (0..count).rev() {
        tree.insert(&format!("{i:06}"), Rid::new(0, i)).unwrap();
    }
    tree.force().unwrap();

    let all: Vec<Rid> = tree.range_search("000000", "999999").unwrap().collect();
    assert_eq!(all.len(), count);
    for (i, rid) in all.iter().enumerate() {
        assert_eq!(*rid, Rid::new(0, i));
    }
}
