use std::sync::{Arc, Mutex};

use super::error::{RecordError, RecordResult};
use super::page::TablePage;
use super::rid::Rid;
use crate::file::{BufferManager, FileHandle, PageId};

/// Append-only writer for a table file.
///
/// Keeps the current tail page pinned between appends; when it fills, the
/// page is marked dirty, unpinned and a fresh page is allocated. Call
/// [`finish`](Self::finish) to release the tail pin and force the file.
pub struct TableWriter {
    buffer: Arc<Mutex<BufferManager>>,
    file: FileHandle,
    row_size: usize,
    current: Option<PageId>,
    resumed: bool,
}

impl TableWriter {
    pub fn new(buffer: Arc<Mutex<BufferManager>>, file: FileHandle, row_size: usize) -> Self {
        Self {
            buffer,
            file,
            row_size,
            current: None,
            resumed: false,
        }
    }

    /// Append one encoded row, returning its record identifier
    pub fn append(&mut self, row: &[u8]) -> RecordResult<Rid> {
        let mut bm = self.buffer.lock().unwrap();

        loop {
            match self.current {
                None => {
                    // First append against a non-empty file picks up at the
                    // tail page, which may still have free slots
                    if !self.resumed {
                        self.resumed = true;
                        let count = bm.page_count(self.file)?;
                        if count > 0 && bm.get_page(self.file, count - 1)?.is_some() {
                            self.current = Some(count - 1);
                            continue;
                        }
                    }

                    let (page_id, buf) = bm
                        .create_page(self.file)?
                        .ok_or(RecordError::BufferExhausted)?;
                    TablePage::init(buf, page_id, self.row_size)?;
                    self.current = Some(page_id);
                }
                Some(page_id) => {
                    // The tail page is pinned, so it must be resident
                    let buf = bm
                        .peek_page_mut(self.file, page_id)
                        .ok_or(RecordError::BufferExhausted)?;
                    let mut page = TablePage::from_buffer(buf, page_id, self.row_size)?;

                    if let Some(slot) = page.insert_row(row)? {
                        bm.mark_dirty(self.file, page_id);
                        return Ok(Rid::new(page_id, slot));
                    }

                    // Tail is full: release it and roll over to a new page
                    bm.unpin_page(self.file, page_id);
                    self.current = None;
                }
            }
        }
    }

    /// Release the tail pin and force every dirty page of the file to disk
    pub fn finish(&mut self) -> RecordResult<()> {
        let mut bm = self.buffer.lock().unwrap();
        if let Some(page_id) = self.current.take() {
            bm.unpin_page(self.file, page_id);
        }
        bm.force(self.file)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::PagedFileManager;
    use crate::record::schema::{Table, decode_row, encode_row};
    use crate::record::{page_row, page_row_count};
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<Mutex<BufferManager>>, FileHandle) {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("table.bin");

        let mut file_manager = PagedFileManager::new();
        file_manager.create_file(&path).unwrap();
        let handle = file_manager.open_file(&path).unwrap();

        let buffer = Arc::new(Mutex::new(BufferManager::with_capacity(file_manager, 4)));
        (temp_dir, buffer, handle)
    }

    #[test]
    fn test_append_assigns_sequential_rids() {
        let (_temp_dir, buffer, handle) = setup();
        let mut writer = TableWriter::new(buffer.clone(), handle, Table::Movies.row_size());

        for i in 0..5 {
            let row = encode_row(Table::Movies, &[&format!("tt{i}"), "Film"]).unwrap();
            let rid = writer.append(&row).unwrap();
            assert_eq!(rid, Rid::new(0, i));
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_append_rolls_over_to_new_pages() {
        let (_temp_dir, buffer, handle) = setup();
        let max_rows = Table::Movies.max_rows();
        let mut writer = TableWriter::new(buffer.clone(), handle, Table::Movies.row_size());

        let total = max_rows * 2 + 3;
        for i in 0..total {
            let row = encode_row(Table::Movies, &[&format!("t{i}"), "Film"]).unwrap();
            let rid = writer.append(&row).unwrap();
            assert_eq!(rid.page_id, i / max_rows);
            assert_eq!(rid.slot_id, i % max_rows);
        }
        writer.finish().unwrap();

        assert_eq!(buffer.lock().unwrap().page_count(handle).unwrap(), 3);
    }

    #[test]
    fn test_new_writer_resumes_at_partial_tail_page() {
        let (_temp_dir, buffer, handle) = setup();

        {
            let mut writer = TableWriter::new(buffer.clone(), handle, Table::Movies.row_size());
            writer
                .append(&encode_row(Table::Movies, &["tt1", "First"]).unwrap())
                .unwrap();
            writer.finish().unwrap();
        }

        // A second writer continues in page 0 rather than opening page 1
        let mut writer = TableWriter::new(buffer.clone(), handle, Table::Movies.row_size());
        let rid = writer
            .append(&encode_row(Table::Movies, &["tt2", "Second"]).unwrap())
            .unwrap();
        writer.finish().unwrap();

        assert_eq!(rid, Rid::new(0, 1));
        assert_eq!(buffer.lock().unwrap().page_count(handle).unwrap(), 1);
    }

    #[test]
    fn test_rows_survive_force_and_reload() {
        let (_temp_dir, buffer, handle) = setup();
        let mut writer = TableWriter::new(buffer.clone(), handle, Table::People.row_size());

        let row = encode_row(Table::People, &["nm0000001", "Alice"]).unwrap();
        let rid = writer.append(&row).unwrap();
        writer.finish().unwrap();

        let mut bm = buffer.lock().unwrap();
        bm.aggressive_cleanup().unwrap();

        let buf = bm.get_page(handle, rid.page_id).unwrap().unwrap();
        let stored = page_row(buf, Table::People.row_size(), rid.slot_id).unwrap();
        let values = decode_row(Table::People, stored).unwrap();
        assert_eq!(values, vec!["nm0000001", "Alice"]);
        assert_eq!(page_row_count(bm.peek_page(handle, 0).unwrap(), 115), 1);
        bm.unpin_page(handle, rid.page_id);
    }
}
