use std::sync::{Arc, Mutex};

use super::error::ExecResult;
use super::tuple::Tuple;
use super::Operator;
use crate::file::{BufferManager, FileHandle, PageId};
use crate::record::{RecordError, SlotId, Table, decode_row, page_row};

/// Sequential scan producing every row of a table file in (page asc,
/// slot asc) order.
///
/// At most one page is pinned at a time: the current page stays pinned
/// between `next` calls and is released when the scan crosses a page
/// boundary or closes. End of file is detected when the next page fetch
/// returns a null page.
pub struct SeqScan {
    buffer: Arc<Mutex<BufferManager>>,
    file: FileHandle,
    table: Table,
    columns: Arc<[String]>,
    current_page: Option<PageId>,
    next_slot: SlotId,
    opened: bool,
}

impl SeqScan {
    pub fn new(
        buffer: Arc<Mutex<BufferManager>>,
        file: FileHandle,
        table: Table,
        columns: Arc<[String]>,
    ) -> Self {
        Self {
            buffer,
            file,
            table,
            columns,
            current_page: None,
            next_slot: 0,
            opened: false,
        }
    }
}

impl Operator for SeqScan {
    fn open(&mut self) -> ExecResult<()> {
        if self.opened {
            return Ok(());
        }

        let mut bm = self.buffer.lock().unwrap();
        self.next_slot = 0;
        self.current_page = if bm.get_page(self.file, 0)?.is_some() {
            Some(0)
        } else {
            None
        };
        self.opened = true;
        Ok(())
    }

    fn next(&mut self) -> ExecResult<Option<Tuple>> {
        if !self.opened {
            return Ok(None);
        }

        let mut bm = self.buffer.lock().unwrap();
        loop {
            let Some(page_id) = self.current_page else {
                return Ok(None);
            };

            let buf = bm
                .peek_page(self.file, page_id)
                .ok_or(RecordError::BufferExhausted)?;
            if let Some(row) = page_row(buf, self.table.row_size(), self.next_slot) {
                let values = decode_row(self.table, row)?;
                self.next_slot += 1;
                return Ok(Some(Tuple::new(values, self.columns.clone())));
            }

            // Page exhausted: release it before fetching the next one
            bm.unpin_page(self.file, page_id);
            self.current_page = None;
            self.next_slot = 0;

            if bm.get_page(self.file, page_id + 1)?.is_some() {
                self.current_page = Some(page_id + 1);
            } else {
                return Ok(None);
            }
        }
    }

    fn close(&mut self) -> ExecResult<()> {
        if !self.opened {
            return Ok(());
        }

        if let Some(page_id) = self.current_page.take() {
            self.buffer.lock().unwrap().unpin_page(self.file, page_id);
        }
        self.next_slot = 0;
        self.opened = false;
        Ok(())
    }
}
