use super::error::{RecordError, RecordResult};
use crate::file::PAGE_SIZE;

/// Page header: 4-byte big-endian page id followed by 4-byte big-endian row count
pub const PAGE_HEADER_SIZE: usize = 8;

/// The three base tables, each with a fixed-width row layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Movies,
    WorkedOn,
    People,
}

impl Table {
    pub const fn name(self) -> &'static str {
        match self {
            Table::Movies => "Movies",
            Table::WorkedOn => "WorkedOn",
            Table::People => "People",
        }
    }

    pub const fn column_names(self) -> &'static [&'static str] {
        match self {
            Table::Movies => &["movieId", "title"],
            Table::WorkedOn => &["movieId", "personId", "category"],
            Table::People => &["personId", "name"],
        }
    }

    pub const fn column_widths(self) -> &'static [usize] {
        match self {
            Table::Movies => &[9, 30],
            Table::WorkedOn => &[9, 10, 20],
            Table::People => &[10, 105],
        }
    }

    /// Fixed row size in bytes: 39, 39 and 115 respectively
    pub const fn row_size(self) -> usize {
        match self {
            Table::Movies => 39,
            Table::WorkedOn => 39,
            Table::People => 115,
        }
    }

    /// Maximum rows a 4 KiB page can hold for this table
    pub const fn max_rows(self) -> usize {
        (PAGE_SIZE - PAGE_HEADER_SIZE) / self.row_size()
    }

    /// Column names qualified with the table name, e.g. "Movies.title"
    pub fn qualified_columns(self) -> Vec<String> {
        self.column_names()
            .iter()
            .map(|col| format!("{}.{}", self.name(), col))
            .collect()
    }
}

/// Fixed width of a (possibly qualified) column name, per the table layouts.
/// Unknown columns default to 30 bytes.
pub fn column_width(column: &str) -> usize {
    let unqualified = column.rsplit('.').next().unwrap_or(column);
    match unqualified {
        "movieId" => 9,
        "personId" => 10,
        "category" => 20,
        "title" => 30,
        "name" => 105,
        _ => 30,
    }
}

/// Copy `value` into `dst`, truncating at the field width and padding the
/// remainder with spaces
pub fn write_field(dst: &mut [u8], value: &str) {
    let bytes = value.as_bytes();
    let n = bytes.len().min(dst.len());
    dst[..n].copy_from_slice(&bytes[..n]);
    dst[n..].fill(b' ');
}

/// Decode one fixed-width field, trimming the space padding
pub fn read_field(src: &[u8]) -> String {
    String::from_utf8_lossy(src).trim().to_string()
}

/// Encode one row as concatenated fixed-width fields
pub fn encode_row(table: Table, values: &[&str]) -> RecordResult<Vec<u8>> {
    let widths = table.column_widths();
    if values.len() != widths.len() {
        return Err(RecordError::InvalidRow(format!(
            "{} expects {} columns, got {}",
            table.name(),
            widths.len(),
            values.len()
        )));
    }

    let mut row = vec![0u8; table.row_size()];
    let mut offset = 0;
    for (value, &width) in values.iter().zip(widths) {
        write_field(&mut row[offset..offset + width], value);
        offset += width;
    }
    Ok(row)
}

/// Decode one row into its trimmed column values
pub fn decode_row(table: Table, bytes: &[u8]) -> RecordResult<Vec<String>> {
    if bytes.len() != table.row_size() {
        return Err(RecordError::InvalidRow(format!(
            "{} row is {} bytes, got {}",
            table.name(),
            table.row_size(),
            bytes.len()
        )));
    }

    let mut values = Vec::with_capacity(table.column_widths().len());
    let mut offset = 0;
    for &width in table.column_widths() {
        values.push(read_field(&bytes[offset..offset + width]));
        offset += width;
    }
    Ok(values)
}
