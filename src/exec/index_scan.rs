use std::sync::{Arc, Mutex};

use super::error::ExecResult;
use super::tuple::Tuple;
use super::Operator;
use crate::file::{BufferManager, FileHandle};
use crate::index::{RidIter, TitleIndex};
use crate::record::{Table, decode_row, page_row};

/// Index scan producing every tuple whose key lies in `[lo, hi]`, in
/// ascending key order.
///
/// The RID list is drawn from the B+ tree at open. Each `next` fetches the
/// row's page, decodes it and unpins immediately; a RID whose page cannot
/// be fetched is skipped rather than failing the scan.
pub struct IndexScan {
    tree: TitleIndex,
    buffer: Arc<Mutex<BufferManager>>,
    file: FileHandle,
    table: Table,
    columns: Arc<[String]>,
    lo: String,
    hi: String,
    rids: Option<RidIter>,
}

impl IndexScan {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tree: TitleIndex,
        buffer: Arc<Mutex<BufferManager>>,
        file: FileHandle,
        table: Table,
        columns: Arc<[String]>,
        lo: &str,
        hi: &str,
    ) -> Self {
        Self {
            tree,
            buffer,
            file,
            table,
            columns,
            lo: lo.to_string(),
            hi: hi.to_string(),
            rids: None,
        }
    }
}

impl Operator for IndexScan {
    fn open(&mut self) -> ExecResult<()> {
        if self.rids.is_none() {
            self.rids = Some(self.tree.range_search(&self.lo, &self.hi)?);
        }
        Ok(())
    }

    fn next(&mut self) -> ExecResult<Option<Tuple>> {
        let Some(rids) = self.rids.as_mut() else {
            return Ok(None);
        };

        for rid in rids {
            let mut bm = self.buffer.lock().unwrap();
            let Some(buf) = bm.get_page(self.file, rid.page_id)? else {
                // A missing page is not fatal to an index scan
                continue;
            };

            let decoded = page_row(buf, self.table.row_size(), rid.slot_id)
                .map(|row| decode_row(self.table, row))
                .transpose()?;
            bm.unpin_page(self.file, rid.page_id);

            if let Some(values) = decoded {
                return Ok(Some(Tuple::new(values, self.columns.clone())));
            }
        }

        Ok(None)
    }

    fn close(&mut self) -> ExecResult<()> {
        self.rids = None;
        Ok(())
    }
}
