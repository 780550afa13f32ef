use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use super::error::{ExecError, ExecResult};
use super::tuple::Tuple;
use super::Operator;
use crate::file::{BufferManager, FileHandle, PageId};
use crate::record::{
    RecordError, SlotId, Table, TableWriter, column_width, page_row, read_field, write_field,
};

/// Width of the identifier field in a spooled row (the Movies layout)
const SPOOL_ID_WIDTH: usize = 9;
/// Width of the field carrying the remaining concatenated columns
const SPOOL_REST_WIDTH: usize = 30;

/// Projection: rearranges and renames the columns of its child's tuples.
///
/// In the default pipelining mode each `next` projects one child tuple. In
/// materialising mode the first `next` consumes the child to completion,
/// spools every projected tuple into a temporary file through the buffer
/// pool, and then serves reads from that file. The spool survives
/// close/open cycles, so a materialised projection can sit on the inner
/// side of a block nested loop join and be rewound cheaply.
pub struct Projection {
    child: Box<dyn Operator>,
    input_indices: Vec<usize>,
    columns: Arc<[String]>,
    materialize: Option<Materialize>,
    opened: bool,
}

struct Materialize {
    buffer: Arc<Mutex<BufferManager>>,
    path: PathBuf,
    /// Output index of the 9-byte identifier column, if the schema has one
    id_column: Option<usize>,
    spooled: bool,
    file: Option<FileHandle>,
    current_page: Option<PageId>,
    next_page: PageId,
    next_slot: SlotId,
}

impl Projection {
    /// Build a projection mapping `input` columns to `output` columns.
    /// Every output column must name an input column.
    pub fn new(
        child: Box<dyn Operator>,
        output: &[&str],
        input: &[&str],
    ) -> ExecResult<Self> {
        let mut input_indices = Vec::with_capacity(output.len());
        for column in output {
            let index = input
                .iter()
                .position(|c| c == column)
                .ok_or_else(|| ExecError::ColumnNotFound(column.to_string()))?;
            input_indices.push(index);
        }

        Ok(Self {
            child,
            input_indices,
            columns: output.iter().map(|c| c.to_string()).collect(),
            materialize: None,
            opened: false,
        })
    }

    /// Switch to materialising mode, spooling into `path` via the buffer
    /// pool. A pre-existing file of the same name is deleted before writing
    /// so re-execution is idempotent.
    pub fn materialized(
        mut self,
        buffer: Arc<Mutex<BufferManager>>,
        path: impl Into<PathBuf>,
    ) -> Self {
        let id_column = self
            .columns
            .iter()
            .position(|c| c.rsplit('.').next() == Some("movieId"));

        self.materialize = Some(Materialize {
            buffer,
            path: path.into(),
            id_column,
            spooled: false,
            file: None,
            current_page: None,
            next_page: 0,
            next_slot: 0,
        });
        self
    }

    fn project(&self, tuple: &Tuple) -> Tuple {
        let values = self
            .input_indices
            .iter()
            .map(|&i| tuple.get(i).unwrap_or("").to_string())
            .collect();
        Tuple::new(values, self.columns.clone())
    }

    /// Consume the child to completion, writing every projected tuple into
    /// a freshly-created file, flushing full pages as they fill and forcing
    /// at the end
    fn spool(&mut self) -> ExecResult<()> {
        let (buffer, path, id_column) = {
            let mat = self.materialize.as_ref().expect("spool without materialize");
            (mat.buffer.clone(), mat.path.clone(), mat.id_column)
        };

        let file = {
            let mut bm = buffer.lock().unwrap();
            if path.exists() {
                bm.file_manager_mut().remove_file(&path)?;
            }
            // create_file also creates a missing parent directory
            bm.file_manager_mut().create_file(&path)?;
            bm.file_manager_mut().open_file(&path)?
        };

        let mut writer = TableWriter::new(buffer, file, Table::Movies.row_size());
        let mut ordinal = 0usize;
        while let Some(tuple) = self.child.next()? {
            let values: Vec<&str> = self
                .input_indices
                .iter()
                .map(|&i| tuple.get(i).unwrap_or(""))
                .collect();
            let row = encode_spool_row(&values, &self.columns, id_column, ordinal);
            writer.append(&row)?;
            ordinal += 1;
        }
        writer.finish()?;

        let mat = self.materialize.as_mut().expect("spool without materialize");
        mat.file = Some(file);
        mat.spooled = true;
        mat.current_page = None;
        mat.next_page = 0;
        mat.next_slot = 0;
        Ok(())
    }

    /// Read the next row back from the spool file, one pinned page at a time
    fn next_spooled(&mut self) -> ExecResult<Option<Tuple>> {
        let mat = self.materialize.as_mut().expect("read without materialize");
        let Some(file) = mat.file else {
            return Ok(None);
        };

        let mut bm = mat.buffer.lock().unwrap();
        loop {
            match mat.current_page {
                None => {
                    if bm.get_page(file, mat.next_page)?.is_some() {
                        mat.current_page = Some(mat.next_page);
                        mat.next_slot = 0;
                    } else {
                        return Ok(None);
                    }
                }
                Some(page_id) => {
                    let buf = bm
                        .peek_page(file, page_id)
                        .ok_or(RecordError::BufferExhausted)?;
                    if let Some(row) = page_row(buf, Table::Movies.row_size(), mat.next_slot) {
                        let values = decode_spool_row(row, &self.columns, mat.id_column);
                        mat.next_slot += 1;
                        return Ok(Some(Tuple::new(values, self.columns.clone())));
                    }

                    bm.unpin_page(file, page_id);
                    mat.current_page = None;
                    mat.next_page = page_id + 1;
                }
            }
        }
    }
}

impl Operator for Projection {
    fn open(&mut self) -> ExecResult<()> {
        if self.opened {
            return Ok(());
        }

        match &mut self.materialize {
            Some(mat) => {
                // Rewind to the start of the spool; only a never-spooled
                // projection needs its child running
                mat.current_page = None;
                mat.next_page = 0;
                mat.next_slot = 0;
                if !mat.spooled {
                    self.child.open()?;
                }
            }
            None => self.child.open()?,
        }

        self.opened = true;
        Ok(())
    }

    fn next(&mut self) -> ExecResult<Option<Tuple>> {
        if !self.opened {
            return Ok(None);
        }

        if self.materialize.is_some() {
            if !self.materialize.as_ref().unwrap().spooled {
                self.spool()?;
            }
            self.next_spooled()
        } else {
            match self.child.next()? {
                Some(tuple) => Ok(Some(self.project(&tuple))),
                None => Ok(None),
            }
        }
    }

    fn close(&mut self) -> ExecResult<()> {
        if !self.opened {
            return Ok(());
        }

        self.child.close()?;

        if let Some(mat) = &mut self.materialize
            && let (Some(page_id), Some(file)) = (mat.current_page.take(), mat.file)
        {
            mat.buffer.lock().unwrap().unpin_page(file, page_id);
        }

        self.opened = false;
        Ok(())
    }
}

/// Spooled rows use the Movies layout: the designated identifier column in
/// the 9-byte field, every other column concatenated at its fixed width in
/// the 30-byte field
fn encode_spool_row(
    values: &[&str],
    columns: &[String],
    id_column: Option<usize>,
    ordinal: usize,
) -> Vec<u8> {
    let mut row = vec![b' '; SPOOL_ID_WIDTH + SPOOL_REST_WIDTH];
    let (id_field, rest) = row.split_at_mut(SPOOL_ID_WIDTH);

    match id_column {
        Some(i) => write_field(id_field, values[i]),
        None => write_field(id_field, &format!("mat{ordinal:06}")),
    }

    let mut offset = 0;
    for (j, column) in columns.iter().enumerate() {
        if Some(j) == id_column {
            continue;
        }
        let width = column_width(column);
        if offset < rest.len() {
            let end = (offset + width).min(rest.len());
            write_field(&mut rest[offset..end], values[j]);
        }
        offset += width;
    }
    row
}

fn decode_spool_row(row: &[u8], columns: &[String], id_column: Option<usize>) -> Vec<String> {
    let (id_field, rest) = row.split_at(SPOOL_ID_WIDTH);
    let mut values = vec![String::new(); columns.len()];

    if let Some(i) = id_column {
        values[i] = read_field(id_field);
    }

    let mut offset = 0;
    for (j, column) in columns.iter().enumerate() {
        if Some(j) == id_column {
            continue;
        }
        let width = column_width(column);
        if offset < rest.len() {
            let end = (offset + width).min(rest.len());
            values[j] = read_field(&rest[offset..end]);
        }
        offset += width;
    }
    values
}
