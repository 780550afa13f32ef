mod error;
mod page;
mod rid;
mod schema;
mod table_file;

pub use error::{RecordError, RecordResult};
pub use page::{TablePage, page_embedded_id, page_row, page_row_count};
pub use rid::{Rid, SlotId};
pub use schema::{
    PAGE_HEADER_SIZE, Table, column_width, decode_row, encode_row, read_field, write_field,
};
pub use table_file::TableWriter;
