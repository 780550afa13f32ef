use crate::file::PageId;

/// Slot identifier within a page
pub type SlotId = usize;

/// Record identifier: the (page, slot) pair locating a row within a file.
/// Stable for the life of the file; rows are never moved or deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rid {
    pub page_id: PageId,
    pub slot_id: SlotId,
}

impl Rid {
    pub fn new(page_id: PageId, slot_id: SlotId) -> Self {
        Self { page_id, slot_id }
    }
}
