use super::buffer_manager::BufferManager;
use super::error::FileResult;
use super::file_manager::FileHandle;
use super::PageId;

/// Single-file view of the buffer pool.
///
/// Binds one file at construction so callers working against a single table
/// can drop the file argument, while every page still lives in the shared
/// frame pool of the underlying [`BufferManager`].
pub struct TableBuffer<'a> {
    buffer: &'a mut BufferManager,
    file: FileHandle,
}

impl<'a> TableBuffer<'a> {
    pub fn new(buffer: &'a mut BufferManager, file: FileHandle) -> Self {
        Self { buffer, file }
    }

    pub fn file(&self) -> FileHandle {
        self.file
    }

    /// See [`BufferManager::get_page`]
    pub fn get_page(&mut self, page_id: PageId) -> FileResult<Option<&mut [u8]>> {
        self.buffer.get_page(self.file, page_id)
    }

    /// See [`BufferManager::create_page`]
    pub fn create_page(&mut self) -> FileResult<Option<(PageId, &mut [u8])>> {
        self.buffer.create_page(self.file)
    }

    /// See [`BufferManager::mark_dirty`]
    pub fn mark_dirty(&mut self, page_id: PageId) {
        self.buffer.mark_dirty(self.file, page_id);
    }

    /// See [`BufferManager::unpin_page`]
    pub fn unpin_page(&mut self, page_id: PageId) {
        self.buffer.unpin_page(self.file, page_id);
    }

    /// See [`BufferManager::force`]
    pub fn force(&mut self) -> FileResult<()> {
        self.buffer.force(self.file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::PagedFileManager;

    #[test]
    fn test_single_file_view_shares_frames() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("table.bin");

        let mut file_manager = PagedFileManager::new();
        file_manager.create_file(&path).unwrap();
        let handle = file_manager.open_file(&path).unwrap();

        let mut bm = BufferManager::with_capacity(file_manager, 4);

        {
            let mut table = TableBuffer::new(&mut bm, handle);
            let (page_id, data) = table.create_page().unwrap().unwrap();
            data[8] = 99;
            table.mark_dirty(page_id);
            table.unpin_page(page_id);
            table.force().unwrap();
        }

        // The page is visible through the multi-file entry points
        assert!(bm.is_page_cached(handle, 0));
        let data = bm.get_page(handle, 0).unwrap().unwrap();
        assert_eq!(data[8], 99);
        bm.unpin_page(handle, 0);
    }
}
