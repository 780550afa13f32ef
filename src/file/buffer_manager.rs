use lru::LruCache;
use std::collections::HashMap;

use super::error::FileResult;
use super::file_manager::{FileHandle, PagedFileManager};
use super::{DEFAULT_BUFFER_SIZE, PAGE_SIZE, PageId};

/// A key identifying a page in the buffer pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BufferKey {
    file: FileHandle,
    page_id: PageId,
}

/// One frame of the buffer pool
struct Frame {
    /// The actual page data
    data: Vec<u8>,
    /// Whether this page has been modified since it was last written out
    dirty: bool,
    /// Number of outstanding references; the frame may not be evicted while positive
    pin_count: u32,
}

/// Manages a fixed-capacity buffer pool over one or more paged files.
///
/// Frames are tracked in a single `LruCache` that doubles as the page table
/// and the recency list. The cache is created unbounded and capacity is
/// enforced by hand, because automatic eviction cannot respect pin counts.
/// Recency is refreshed on `get_page` hits and on initial installation only;
/// `mark_dirty` and `unpin_page` go through `peek_mut` and leave the LRU
/// order untouched.
pub struct BufferManager {
    /// Underlying file manager
    file_manager: PagedFileManager,
    /// Combined page table and recency list
    frames: LruCache<BufferKey, Frame>,
    /// Maximum number of resident frames
    capacity: usize,
    /// Next page id to hand out per file (the file's high-water mark)
    next_page_ids: HashMap<FileHandle, PageId>,
}

impl BufferManager {
    /// Create a new buffer manager with the default pool size
    pub fn new(file_manager: PagedFileManager) -> Self {
        Self::with_capacity(file_manager, DEFAULT_BUFFER_SIZE)
    }

    /// Create a new buffer manager with the specified number of frames
    pub fn with_capacity(file_manager: PagedFileManager, capacity: usize) -> Self {
        Self {
            file_manager,
            frames: LruCache::unbounded(),
            capacity: capacity.max(1),
            next_page_ids: HashMap::new(),
        }
    }

    /// Get a reference to the file manager
    pub fn file_manager(&self) -> &PagedFileManager {
        &self.file_manager
    }

    /// Get a mutable reference to the file manager
    pub fn file_manager_mut(&mut self) -> &mut PagedFileManager {
        &mut self.file_manager
    }

    /// Number of frames the pool may hold
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// High-water page count of a file: pages on disk plus pages created in
    /// the pool but not yet flushed
    pub fn page_count(&mut self, file: FileHandle) -> FileResult<usize> {
        if let Some(&next) = self.next_page_ids.get(&file) {
            return Ok(next);
        }
        let on_disk = self.file_manager.page_count(file)?;
        self.next_page_ids.insert(file, on_disk);
        Ok(on_disk)
    }

    /// Get a page, pinned.
    ///
    /// On a cache hit the frame's recency is refreshed. On a miss a victim
    /// frame is freed and the page is read from disk. Returns `None` when
    /// the page id is beyond the file's high-water mark or when every frame
    /// is pinned. Each successful call takes one pin; the caller owes
    /// exactly one `unpin_page`.
    pub fn get_page(&mut self, file: FileHandle, page_id: PageId) -> FileResult<Option<&mut [u8]>> {
        if page_id >= self.page_count(file)? {
            return Ok(None);
        }

        let key = BufferKey { file, page_id };
        if self.frames.peek(&key).is_none() && !self.load_page(file, page_id)? {
            return Ok(None);
        }

        // Hit or fresh install: refresh recency and take a pin
        let frame = self.frames.get_mut(&key).unwrap();
        frame.pin_count += 1;
        Ok(Some(&mut frame.data))
    }

    /// Allocate the next page of a file and install it, pinned.
    ///
    /// The new page's header is pre-stamped with its big-endian page id.
    /// Returns `None` when no frame can be freed. The page belongs to the
    /// file's extent immediately: the frame starts out dirty, so an
    /// eviction before the first explicit flush still writes it out.
    pub fn create_page(
        &mut self,
        file: FileHandle,
    ) -> FileResult<Option<(PageId, &mut [u8])>> {
        if !self.make_room()? {
            return Ok(None);
        }

        let page_id = self.page_count(file)?;
        self.next_page_ids.insert(file, page_id + 1);

        let mut data = vec![0u8; PAGE_SIZE];
        data[0..4].copy_from_slice(&(page_id as u32).to_be_bytes());

        let key = BufferKey { file, page_id };
        self.frames.put(
            key,
            Frame {
                data,
                dirty: true,
                pin_count: 1,
            },
        );
        let frame = self.frames.get_mut(&key).unwrap();
        Ok(Some((page_id, &mut frame.data)))
    }

    /// Borrow a resident page without pinning or refreshing recency.
    ///
    /// For callers that already hold a pin on the page; a pinned page is
    /// always resident.
    pub fn peek_page(&self, file: FileHandle, page_id: PageId) -> Option<&[u8]> {
        let key = BufferKey { file, page_id };
        self.frames.peek(&key).map(|f| f.data.as_slice())
    }

    /// Mutable variant of [`peek_page`](Self::peek_page); the caller is
    /// responsible for `mark_dirty`
    pub fn peek_page_mut(&mut self, file: FileHandle, page_id: PageId) -> Option<&mut [u8]> {
        let key = BufferKey { file, page_id };
        self.frames.peek_mut(&key).map(|f| f.data.as_mut_slice())
    }

    /// Mark a resident page dirty; a no-op if the page is not resident
    pub fn mark_dirty(&mut self, file: FileHandle, page_id: PageId) {
        let key = BufferKey { file, page_id };
        if let Some(frame) = self.frames.peek_mut(&key) {
            frame.dirty = true;
        }
    }

    /// Release one pin on a page, saturating at zero; a no-op if the page
    /// is not resident. Does not touch the LRU order.
    pub fn unpin_page(&mut self, file: FileHandle, page_id: PageId) {
        let key = BufferKey { file, page_id };
        if let Some(frame) = self.frames.peek_mut(&key) {
            frame.pin_count = frame.pin_count.saturating_sub(1);
        }
    }

    /// Write every dirty resident page of a file back to disk and sync it
    pub fn force(&mut self, file: FileHandle) -> FileResult<()> {
        let dirty: Vec<BufferKey> = self
            .frames
            .iter()
            .filter(|(key, frame)| key.file == file && frame.dirty)
            .map(|(key, _)| *key)
            .collect();

        for key in dirty {
            if let Some(frame) = self.frames.peek_mut(&key) {
                self.file_manager
                    .write_page(key.file, key.page_id, &frame.data)?;
                frame.dirty = false;
            }
        }

        self.file_manager.sync_file(file)?;
        Ok(())
    }

    /// Flush all dirty pages of every file to disk
    pub fn flush_all(&mut self) -> FileResult<()> {
        let dirty: Vec<BufferKey> = self
            .frames
            .iter()
            .filter(|(_, frame)| frame.dirty)
            .map(|(key, _)| *key)
            .collect();

        for key in dirty {
            if let Some(frame) = self.frames.peek_mut(&key) {
                self.file_manager
                    .write_page(key.file, key.page_id, &frame.data)?;
                frame.dirty = false;
            }
        }

        self.file_manager.sync_all()?;
        Ok(())
    }

    /// Safety valve: forcibly zero every pin count and flush.
    ///
    /// Exists for operators that leaked pins under a fault; a correct
    /// pipeline never needs it.
    pub fn free_up_space(&mut self) -> FileResult<()> {
        let keys: Vec<BufferKey> = self.frames.iter().map(|(key, _)| *key).collect();
        for key in keys {
            if let Some(frame) = self.frames.peek_mut(&key) {
                frame.pin_count = 0;
            }
        }
        self.flush_all()
    }

    /// Harsher safety valve: zero pins, flush everything, drop every frame
    pub fn aggressive_cleanup(&mut self) -> FileResult<()> {
        self.free_up_space()?;
        self.frames.clear();
        Ok(())
    }

    /// Get the number of pages currently resident
    pub fn resident_count(&self) -> usize {
        self.frames.len()
    }

    /// Check if a page is resident
    pub fn is_page_cached(&self, file: FileHandle, page_id: PageId) -> bool {
        self.frames.contains(&BufferKey { file, page_id })
    }

    /// Get the pin count of a resident page
    pub fn pin_count(&self, file: FileHandle, page_id: PageId) -> Option<u32> {
        self.frames
            .peek(&BufferKey { file, page_id })
            .map(|f| f.pin_count)
    }

    /// Get the number of dirty pages in the pool
    pub fn dirty_page_count(&self) -> usize {
        self.frames.iter().filter(|(_, f)| f.dirty).count()
    }

    /// Get the number of frames with a positive pin count
    pub fn pinned_frame_count(&self) -> usize {
        self.frames.iter().filter(|(_, f)| f.pin_count > 0).count()
    }

    /// Read a page from disk into a free frame. Returns false when the page
    /// has never been flushed or when no frame can be freed.
    fn load_page(&mut self, file: FileHandle, page_id: PageId) -> FileResult<bool> {
        // Created but never-flushed pages have nothing on disk to read
        if page_id >= self.file_manager.page_count(file)? {
            return Ok(false);
        }
        if !self.make_room()? {
            return Ok(false);
        }

        let mut data = vec![0u8; PAGE_SIZE];
        if !self.file_manager.read_page(file, page_id, &mut data)? {
            return Ok(false);
        }

        let key = BufferKey { file, page_id };
        self.frames.put(
            key,
            Frame {
                data,
                dirty: false,
                pin_count: 0,
            },
        );
        Ok(true)
    }

    /// Evict until a frame is free. Returns false when every frame is pinned.
    fn make_room(&mut self) -> FileResult<bool> {
        while self.frames.len() >= self.capacity {
            if !self.evict_one()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Evict the least-recently-used unpinned frame, writing it back first
    /// if dirty
    fn evict_one(&mut self) -> FileResult<bool> {
        // iter() walks from most to least recently used; the last unpinned
        // entry is the eviction victim
        let mut victim = None;
        for (key, frame) in self.frames.iter() {
            if frame.pin_count == 0 {
                victim = Some(*key);
            }
        }

        let Some(key) = victim else {
            return Ok(false);
        };

        let frame = self.frames.pop(&key).unwrap();
        if frame.dirty {
            self.file_manager
                .write_page(key.file, key.page_id, &frame.data)?;
        }
        Ok(true)
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        // Flush all dirty pages when the buffer manager is dropped
        let _ = self.flush_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_env() -> (TempDir, BufferManager, FileHandle) {
        let temp_dir = tempfile::tempdir().unwrap();
        let test_file = temp_dir.path().join("test.bin");

        let mut file_manager = PagedFileManager::new();
        file_manager.create_file(&test_file).unwrap();
        let handle = file_manager.open_file(&test_file).unwrap();

        let buffer_manager = BufferManager::with_capacity(file_manager, 8);

        (temp_dir, buffer_manager, handle)
    }

    /// Create a page, scribble a byte into its payload, unpin it
    fn create_marked_page(bm: &mut BufferManager, handle: FileHandle, marker: u8) -> PageId {
        let (page_id, data) = bm.create_page(handle).unwrap().unwrap();
        data[8] = marker;
        bm.mark_dirty(handle, page_id);
        bm.unpin_page(handle, page_id);
        page_id
    }

    #[test]
    fn test_create_page_sequential_ids() {
        let (_temp_dir, mut bm, handle) = setup_test_env();

        for expected in 0..4 {
            let (page_id, data) = bm.create_page(handle).unwrap().unwrap();
            assert_eq!(page_id, expected);
            // Header is pre-stamped with the page id
            assert_eq!(&data[0..4], &(expected as u32).to_be_bytes());
            bm.unpin_page(handle, page_id);
        }
    }

    #[test]
    fn test_created_page_is_pinned() {
        let (_temp_dir, mut bm, handle) = setup_test_env();

        let (page_id, _) = bm.create_page(handle).unwrap().unwrap();
        assert_eq!(bm.pin_count(handle, page_id), Some(1));

        bm.unpin_page(handle, page_id);
        assert_eq!(bm.pin_count(handle, page_id), Some(0));
    }

    #[test]
    fn test_get_page_pins_and_hits_cache() {
        let (_temp_dir, mut bm, handle) = setup_test_env();

        let page_id = create_marked_page(&mut bm, handle, 42);
        bm.force(handle).unwrap();

        assert!(bm.get_page(handle, page_id).unwrap().is_some());
        assert_eq!(bm.pin_count(handle, page_id), Some(1));

        // Second fetch pins again on a cache hit
        assert!(bm.get_page(handle, page_id).unwrap().is_some());
        assert_eq!(bm.pin_count(handle, page_id), Some(2));
        assert_eq!(bm.resident_count(), 1);

        bm.unpin_page(handle, page_id);
        bm.unpin_page(handle, page_id);
        assert_eq!(bm.pin_count(handle, page_id), Some(0));
    }

    #[test]
    fn test_get_page_past_high_water() {
        let (_temp_dir, mut bm, handle) = setup_test_env();

        assert!(bm.get_page(handle, 0).unwrap().is_none());

        create_marked_page(&mut bm, handle, 1);
        assert!(bm.get_page(handle, 1).unwrap().is_none());
    }

    #[test]
    fn test_unpin_saturates_at_zero() {
        let (_temp_dir, mut bm, handle) = setup_test_env();

        let page_id = create_marked_page(&mut bm, handle, 7);
        bm.unpin_page(handle, page_id);
        bm.unpin_page(handle, page_id);
        assert_eq!(bm.pin_count(handle, page_id), Some(0));

        // Unpinning a page that was never resident is silent
        bm.unpin_page(handle, 99);
    }

    #[test]
    fn test_pinned_page_blocks_eviction() {
        let temp_dir = tempfile::tempdir().unwrap();
        let test_file = temp_dir.path().join("test.bin");

        let mut file_manager = PagedFileManager::new();
        file_manager.create_file(&test_file).unwrap();
        let handle = file_manager.open_file(&test_file).unwrap();

        let mut bm = BufferManager::with_capacity(file_manager, 1);

        // One frame, pinned: the next create must observe a null page
        let (page_id, _) = bm.create_page(handle).unwrap().unwrap();
        assert!(bm.create_page(handle).unwrap().is_none());

        // Unpinning frees the victim
        bm.unpin_page(handle, page_id);
        assert!(bm.create_page(handle).unwrap().is_some());
        assert_eq!(bm.resident_count(), 1);
    }

    #[test]
    fn test_lru_eviction_order() {
        let temp_dir = tempfile::tempdir().unwrap();
        let test_file = temp_dir.path().join("test.bin");

        let mut file_manager = PagedFileManager::new();
        file_manager.create_file(&test_file).unwrap();
        let handle = file_manager.open_file(&test_file).unwrap();

        let mut bm = BufferManager::with_capacity(file_manager, 3);
        for marker in 0..3 {
            create_marked_page(&mut bm, handle, marker);
        }
        bm.force(handle).unwrap();

        // Touch page 0 so page 1 becomes least recently used
        bm.get_page(handle, 0).unwrap().unwrap();
        bm.unpin_page(handle, 0);

        let (page_id, _) = bm.create_page(handle).unwrap().unwrap();
        bm.unpin_page(handle, page_id);

        assert!(bm.is_page_cached(handle, 0));
        assert!(!bm.is_page_cached(handle, 1));
        assert!(bm.is_page_cached(handle, 2));
    }

    #[test]
    fn test_mark_dirty_does_not_refresh_recency() {
        let temp_dir = tempfile::tempdir().unwrap();
        let test_file = temp_dir.path().join("test.bin");

        let mut file_manager = PagedFileManager::new();
        file_manager.create_file(&test_file).unwrap();
        let handle = file_manager.open_file(&test_file).unwrap();

        let mut bm = BufferManager::with_capacity(file_manager, 2);
        create_marked_page(&mut bm, handle, 0);
        create_marked_page(&mut bm, handle, 1);

        // Page 0 is LRU; marking it dirty must not change that
        bm.mark_dirty(handle, 0);

        let (page_id, _) = bm.create_page(handle).unwrap().unwrap();
        bm.unpin_page(handle, page_id);

        assert!(!bm.is_page_cached(handle, 0));
        assert!(bm.is_page_cached(handle, 1));
    }

    #[test]
    fn test_mark_dirty_nonresident_is_noop() {
        let (_temp_dir, mut bm, handle) = setup_test_env();
        bm.mark_dirty(handle, 5);
        assert_eq!(bm.dirty_page_count(), 0);
    }

    #[test]
    fn test_dirty_page_flushed_on_eviction() {
        let temp_dir = tempfile::tempdir().unwrap();
        let test_file = temp_dir.path().join("test.bin");

        let mut file_manager = PagedFileManager::new();
        file_manager.create_file(&test_file).unwrap();
        let handle = file_manager.open_file(&test_file).unwrap();

        let mut bm = BufferManager::with_capacity(file_manager, 2);

        let page_id = create_marked_page(&mut bm, handle, 77);

        // Fill the pool so page 0 gets evicted (and written back)
        create_marked_page(&mut bm, handle, 1);
        create_marked_page(&mut bm, handle, 2);
        assert!(!bm.is_page_cached(handle, page_id));

        let data = bm.get_page(handle, page_id).unwrap().unwrap();
        assert_eq!(data[8], 77);
        bm.unpin_page(handle, page_id);
    }

    #[test]
    fn test_force_then_reload_reads_flushed_bytes() {
        let (_temp_dir, mut bm, handle) = setup_test_env();

        for marker in 0..5 {
            create_marked_page(&mut bm, handle, 10 + marker);
        }
        bm.force(handle).unwrap();
        assert_eq!(bm.dirty_page_count(), 0);

        // Drop every frame and read back from disk
        bm.aggressive_cleanup().unwrap();
        assert_eq!(bm.resident_count(), 0);

        for page_id in 0..5 {
            let data = bm.get_page(handle, page_id).unwrap().unwrap();
            assert_eq!(&data[0..4], &(page_id as u32).to_be_bytes());
            assert_eq!(data[8], 10 + page_id as u8);
            bm.unpin_page(handle, page_id);
        }
    }

    #[test]
    fn test_resident_count_never_exceeds_capacity() {
        let temp_dir = tempfile::tempdir().unwrap();
        let test_file = temp_dir.path().join("test.bin");

        let mut file_manager = PagedFileManager::new();
        file_manager.create_file(&test_file).unwrap();
        let handle = file_manager.open_file(&test_file).unwrap();

        let mut bm = BufferManager::with_capacity(file_manager, 4);

        for marker in 0..20 {
            create_marked_page(&mut bm, handle, marker);
            assert!(bm.resident_count() <= 4);
        }
        bm.force(handle).unwrap();

        for page_id in (0..20).rev() {
            assert!(bm.get_page(handle, page_id).unwrap().is_some());
            bm.unpin_page(handle, page_id);
            assert!(bm.resident_count() <= 4);
        }
    }

    #[test]
    fn test_multiple_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file1 = temp_dir.path().join("test1.bin");
        let file2 = temp_dir.path().join("test2.bin");

        let mut file_manager = PagedFileManager::new();
        file_manager.create_file(&file1).unwrap();
        file_manager.create_file(&file2).unwrap();
        let handle1 = file_manager.open_file(&file1).unwrap();
        let handle2 = file_manager.open_file(&file2).unwrap();

        let mut bm = BufferManager::with_capacity(file_manager, 8);

        create_marked_page(&mut bm, handle1, 11);
        create_marked_page(&mut bm, handle2, 22);

        // Page ids are allocated per file
        let data1 = bm.get_page(handle1, 0).unwrap().unwrap();
        assert_eq!(data1[8], 11);
        bm.unpin_page(handle1, 0);

        let data2 = bm.get_page(handle2, 0).unwrap().unwrap();
        assert_eq!(data2[8], 22);
        bm.unpin_page(handle2, 0);
    }

    #[test]
    fn test_free_up_space_zeroes_pins() {
        let temp_dir = tempfile::tempdir().unwrap();
        let test_file = temp_dir.path().join("test.bin");

        let mut file_manager = PagedFileManager::new();
        file_manager.create_file(&test_file).unwrap();
        let handle = file_manager.open_file(&test_file).unwrap();

        let mut bm = BufferManager::with_capacity(file_manager, 1);

        // Leak the pin, then recover through the safety valve
        bm.create_page(handle).unwrap().unwrap();
        assert!(bm.create_page(handle).unwrap().is_none());

        bm.free_up_space().unwrap();
        assert!(bm.create_page(handle).unwrap().is_some());
    }

    #[test]
    fn test_drop_flushes_dirty_pages() {
        let temp_dir = tempfile::tempdir().unwrap();
        let test_file = temp_dir.path().join("test.bin");

        let mut file_manager = PagedFileManager::new();
        file_manager.create_file(&test_file).unwrap();
        let handle = file_manager.open_file(&test_file).unwrap();

        {
            let mut bm = BufferManager::with_capacity(file_manager, 4);
            create_marked_page(&mut bm, handle, 88);
            // bm is dropped here, should flush
        }

        let mut file_manager = PagedFileManager::new();
        let handle = file_manager.open_file(&test_file).unwrap();
        let mut bm = BufferManager::with_capacity(file_manager, 4);
        let data = bm.get_page(handle, 0).unwrap().unwrap();
        assert_eq!(data[8], 88);
        bm.unpin_page(handle, 0);
    }
}
