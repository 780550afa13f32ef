use super::error::{RecordError, RecordResult};
use super::rid::SlotId;
use super::schema::PAGE_HEADER_SIZE;
use crate::file::{PAGE_SIZE, PageId};

/// Zero-copy wrapper over one 4 KiB page buffer holding fixed-width rows.
///
/// Layout: 8-byte header (big-endian page id, big-endian row count) followed
/// by rows packed back to back in insertion order. Pages never shrink and
/// rows are never deleted, so the row count is also the next free slot.
pub struct TablePage<'a> {
    buf: &'a mut [u8],
    row_size: usize,
}

impl<'a> TablePage<'a> {
    /// Initialise an empty page in the provided buffer
    pub fn init(buf: &'a mut [u8], page_id: PageId, row_size: usize) -> RecordResult<Self> {
        check_buffer(buf, row_size)?;

        buf.fill(0);
        buf[0..4].copy_from_slice(&(page_id as u32).to_be_bytes());
        // Row count starts at zero, which the fill already wrote

        Ok(Self { buf, row_size })
    }

    /// Wrap an existing page buffer, verifying that the embedded page id
    /// matches the id the page is indexed under. Disagreement means the
    /// bytes do not belong to this slot of the file.
    pub fn from_buffer(
        buf: &'a mut [u8],
        expected_page_id: PageId,
        row_size: usize,
    ) -> RecordResult<Self> {
        check_buffer(buf, row_size)?;

        let embedded = page_embedded_id(buf);
        if embedded != expected_page_id {
            return Err(RecordError::CorruptPage {
                page_id: expected_page_id,
                detail: format!("embedded page id is {embedded}"),
            });
        }

        Ok(Self { buf, row_size })
    }

    pub fn page_id(&self) -> PageId {
        page_embedded_id(self.buf)
    }

    pub fn row_count(&self) -> usize {
        page_row_count(self.buf, self.row_size)
    }

    pub fn max_rows(&self) -> usize {
        (PAGE_SIZE - PAGE_HEADER_SIZE) / self.row_size
    }

    pub fn is_full(&self) -> bool {
        self.row_count() >= self.max_rows()
    }

    /// Append a row at the next free slot and bump the header row count.
    /// Returns `None` when the page is full, leaving header and payload
    /// untouched.
    pub fn insert_row(&mut self, row: &[u8]) -> RecordResult<Option<SlotId>> {
        if row.len() != self.row_size {
            return Err(RecordError::InvalidRow(format!(
                "row is {} bytes, page stores {}-byte rows",
                row.len(),
                self.row_size
            )));
        }

        let slot = self.row_count();
        if slot >= self.max_rows() {
            return Ok(None);
        }

        let offset = PAGE_HEADER_SIZE + slot * self.row_size;
        self.buf[offset..offset + self.row_size].copy_from_slice(row);
        self.buf[4..8].copy_from_slice(&((slot + 1) as u32).to_be_bytes());

        Ok(Some(slot))
    }

    /// Constant-time row access; `None` when the slot is out of range
    pub fn row(&self, slot: SlotId) -> Option<&[u8]> {
        page_row(self.buf, self.row_size, slot)
    }

    /// The raw page bytes
    pub fn raw(&self) -> &[u8] {
        self.buf
    }
}

fn check_buffer(buf: &[u8], row_size: usize) -> RecordResult<()> {
    if buf.len() != PAGE_SIZE {
        return Err(RecordError::InvalidRow(format!(
            "page buffer must be {PAGE_SIZE} bytes, got {}",
            buf.len()
        )));
    }
    if row_size == 0 || row_size > PAGE_SIZE - PAGE_HEADER_SIZE {
        return Err(RecordError::InvalidRow(format!(
            "row size {row_size} does not fit a page"
        )));
    }
    Ok(())
}

/// Page id embedded in a page buffer's header
pub fn page_embedded_id(buf: &[u8]) -> PageId {
    u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as PageId
}

/// Row count from a page buffer's header, clamped to what the page can
/// physically hold so a corrupt count cannot send readers out of bounds
pub fn page_row_count(buf: &[u8], row_size: usize) -> usize {
    let count = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
    count.min((PAGE_SIZE - PAGE_HEADER_SIZE) / row_size)
}

/// Read-only row access into a pinned page buffer
pub fn page_row(buf: &[u8], row_size: usize, slot: SlotId) -> Option<&[u8]> {
    if slot >= page_row_count(buf, row_size) {
        return None;
    }
    let offset = PAGE_HEADER_SIZE + slot * row_size;
    Some(&buf[offset..offset + row_size])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::schema::{Table, decode_row, encode_row};

    fn page_buffer() -> Vec<u8> {
        vec![0u8; PAGE_SIZE]
    }

    #[test]
    fn test_init_writes_header() {
        let mut buf = page_buffer();
        let page = TablePage::init(&mut buf, 7, 39).unwrap();
        assert_eq!(page.page_id(), 7);
        assert_eq!(page.row_count(), 0);
        assert!(!page.is_full());
    }

    #[test]
    fn test_insert_and_get_row() {
        let mut buf = page_buffer();
        let mut page = TablePage::init(&mut buf, 0, Table::Movies.row_size()).unwrap();

        let row = encode_row(Table::Movies, &["tt0000001", "A Movie"]).unwrap();
        let slot = page.insert_row(&row).unwrap().unwrap();
        assert_eq!(slot, 0);
        assert_eq!(page.row_count(), 1);

        let stored = page.row(0).unwrap();
        assert_eq!(stored, row.as_slice());
        let values = decode_row(Table::Movies, stored).unwrap();
        assert_eq!(values, vec!["tt0000001", "A Movie"]);
    }

    #[test]
    fn test_get_row_out_of_range() {
        let mut buf = page_buffer();
        let mut page = TablePage::init(&mut buf, 0, 39).unwrap();
        assert!(page.row(0).is_none());

        page.insert_row(&[1u8; 39]).unwrap().unwrap();
        assert!(page.row(0).is_some());
        assert!(page.row(1).is_none());
        assert!(page.row(1000).is_none());
    }

    #[test]
    fn test_insert_into_full_page() {
        let mut buf = page_buffer();
        let row_size = Table::Movies.row_size();
        let mut page = TablePage::init(&mut buf, 0, row_size).unwrap();

        for i in 0..page.max_rows() {
            let slot = page.insert_row(&[i as u8; 39]).unwrap();
            assert_eq!(slot, Some(i));
        }
        assert!(page.is_full());

        // A full page reports FULL without mutating header or payload
        let before = page.raw().to_vec();
        assert_eq!(page.insert_row(&[0xFFu8; 39]).unwrap(), None);
        assert_eq!(page.raw(), before.as_slice());
    }

    #[test]
    fn test_from_buffer_round_trip() {
        let mut buf = page_buffer();
        let row = encode_row(Table::People, &["nm0000001", "Alice"]).unwrap();
        {
            let mut page = TablePage::init(&mut buf, 3, Table::People.row_size()).unwrap();
            page.insert_row(&row).unwrap().unwrap();
        }

        let page = TablePage::from_buffer(&mut buf, 3, Table::People.row_size()).unwrap();
        assert_eq!(page.row_count(), 1);
        assert_eq!(page.row(0).unwrap(), row.as_slice());
    }

    #[test]
    fn test_from_buffer_detects_id_mismatch() {
        let mut buf = page_buffer();
        TablePage::init(&mut buf, 3, 39).unwrap();

        let result = TablePage::from_buffer(&mut buf, 5, 39);
        assert!(matches!(result, Err(RecordError::CorruptPage { .. })));
    }

    #[test]
    fn test_corrupt_row_count_is_clamped() {
        let mut buf = page_buffer();
        TablePage::init(&mut buf, 0, 39).unwrap();
        buf[4..8].copy_from_slice(&u32::MAX.to_be_bytes());

        assert_eq!(page_row_count(&buf, 39), (PAGE_SIZE - PAGE_HEADER_SIZE) / 39);
    }

    #[test]
    fn test_insert_wrong_row_size() {
        let mut buf = page_buffer();
        let mut page = TablePage::init(&mut buf, 0, 39).unwrap();
        assert!(page.insert_row(&[0u8; 40]).is_err());
    }
}
