//! TSV pre-processing: populate the three table files from the IMDB dataset
//! dumps and bulk-build the title index.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use csv::ReaderBuilder;
use thiserror::Error;

use crate::exec::{MOVIES_FILE, PEOPLE_FILE, TITLE_INDEX_FILE, WORKEDON_FILE};
use crate::file::{BufferManager, FileError, FileHandle};
use crate::index::{IndexError, TitleIndex};
use crate::record::{
    RecordError, Rid, Table, TableWriter, decode_row, encode_row, page_row, page_row_count,
};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Dataset file not found: {0}")]
    DatasetMissing(PathBuf),
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Row counts produced by a pre-processing run
#[derive(Debug, Default)]
pub struct LoadReport {
    pub movies: usize,
    pub worked_on: usize,
    /// How many WorkedOn rows carried a director-like category; diagnostic
    /// only, every row is loaded
    pub directors: usize,
    pub people: usize,
    pub index_entries: usize,
}

/// Populate the Movies, WorkedOn and People files from the IMDB TSV dumps
/// in `tsv_dir`, then build the title index. Pre-existing database files
/// are replaced.
pub fn pre_process(
    buffer: &Arc<Mutex<BufferManager>>,
    data_dir: &Path,
    tsv_dir: &Path,
) -> IngestResult<LoadReport> {
    let title_basics = tsv_dir.join("title.basics.tsv");
    let title_principals = tsv_dir.join("title.principals.tsv");
    let name_basics = tsv_dir.join("name.basics.tsv");
    for dataset in [&title_basics, &title_principals, &name_basics] {
        if !dataset.exists() {
            return Err(IngestError::DatasetMissing(dataset.clone()));
        }
    }

    for table_file in [MOVIES_FILE, WORKEDON_FILE, PEOPLE_FILE, TITLE_INDEX_FILE] {
        let path = data_dir.join(table_file);
        if path.exists() {
            buffer.lock().unwrap().file_manager_mut().remove_file(&path)?;
        }
    }

    let mut report = LoadReport::default();
    report.movies = load_movies(buffer, &title_basics, &data_dir.join(MOVIES_FILE))?;
    let (worked_on, directors) =
        load_worked_on(buffer, &title_principals, &data_dir.join(WORKEDON_FILE))?;
    report.worked_on = worked_on;
    report.directors = directors;
    report.people = load_people(buffer, &name_basics, &data_dir.join(PEOPLE_FILE))?;
    report.index_entries = build_title_index(buffer, data_dir)?;

    Ok(report)
}

fn tsv_reader(path: &Path) -> IngestResult<csv::Reader<std::fs::File>> {
    Ok(ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .quoting(false)
        .from_path(path)?)
}

fn open_fresh(buffer: &Arc<Mutex<BufferManager>>, path: &Path) -> IngestResult<FileHandle> {
    let mut bm = buffer.lock().unwrap();
    bm.file_manager_mut().create_file(path)?;
    Ok(bm.file_manager_mut().open_file(path)?)
}

/// Load (movieId, title) from title.basics.tsv. Rows with an over-width id
/// are skipped; titles are truncated to the column width.
fn load_movies(
    buffer: &Arc<Mutex<BufferManager>>,
    tsv: &Path,
    out: &Path,
) -> IngestResult<usize> {
    let file = open_fresh(buffer, out)?;
    let mut writer = TableWriter::new(buffer.clone(), file, Table::Movies.row_size());

    let mut loaded = 0usize;
    for record in tsv_reader(tsv)?.records() {
        let record = record?;
        let (Some(movie_id), Some(title)) = (record.get(0), record.get(2)) else {
            continue;
        };
        if movie_id.len() > 9 {
            continue;
        }

        writer.append(&encode_row(Table::Movies, &[movie_id, title])?)?;
        loaded += 1;
    }
    writer.finish()?;
    Ok(loaded)
}

/// Load (movieId, personId, category) from title.principals.tsv. Every
/// credit row goes in, subject only to the width checks; director-like
/// categories are tallied as a diagnostic. Returns (rows loaded, director
/// credits seen).
fn load_worked_on(
    buffer: &Arc<Mutex<BufferManager>>,
    tsv: &Path,
    out: &Path,
) -> IngestResult<(usize, usize)> {
    let file = open_fresh(buffer, out)?;
    let mut writer = TableWriter::new(buffer.clone(), file, Table::WorkedOn.row_size());

    let mut loaded = 0usize;
    let mut directors = 0usize;
    for record in tsv_reader(tsv)?.records() {
        let record = record?;
        let (Some(movie_id), Some(person_id), Some(category)) =
            (record.get(0), record.get(2), record.get(3))
        else {
            continue;
        };
        if movie_id.len() > 9 || person_id.len() > 10 {
            continue;
        }
        if category.to_lowercase().contains("direct") {
            directors += 1;
        }

        writer.append(&encode_row(
            Table::WorkedOn,
            &[movie_id, person_id, category],
        )?)?;
        loaded += 1;
    }
    writer.finish()?;
    Ok((loaded, directors))
}

/// Load (personId, name) from name.basics.tsv
fn load_people(
    buffer: &Arc<Mutex<BufferManager>>,
    tsv: &Path,
    out: &Path,
) -> IngestResult<usize> {
    let file = open_fresh(buffer, out)?;
    let mut writer = TableWriter::new(buffer.clone(), file, Table::People.row_size());

    let mut loaded = 0usize;
    for record in tsv_reader(tsv)?.records() {
        let record = record?;
        let (Some(person_id), Some(name)) = (record.get(0), record.get(1)) else {
            continue;
        };
        if person_id.len() > 10 {
            continue;
        }

        writer.append(&encode_row(Table::People, &[person_id, name])?)?;
        loaded += 1;
    }
    writer.finish()?;
    Ok(loaded)
}

/// Scan the Movies file, sort (title, rid) pairs and bulk-load them into a
/// fresh title index. Returns the number of entries indexed.
pub fn build_title_index(
    buffer: &Arc<Mutex<BufferManager>>,
    data_dir: &Path,
) -> IngestResult<usize> {
    let index_path = data_dir.join(TITLE_INDEX_FILE);
    {
        let mut bm = buffer.lock().unwrap();
        if index_path.exists() {
            bm.file_manager_mut().remove_file(&index_path)?;
        }
    }

    let entries = collect_title_entries(buffer, &data_dir.join(MOVIES_FILE))?;

    let mut tree = TitleIndex::open(buffer.clone(), &index_path)?;
    tree.begin_bulk_load();
    for (title, rid) in &entries {
        tree.insert(title, *rid)?;
    }
    tree.end_bulk_load()?;

    Ok(entries.len())
}

/// Walk the Movies pages collecting every (title, rid) pair, sorted by title
fn collect_title_entries(
    buffer: &Arc<Mutex<BufferManager>>,
    movies_path: &Path,
) -> IngestResult<Vec<(String, Rid)>> {
    let mut bm = buffer.lock().unwrap();
    let file = bm.file_manager_mut().open_file(movies_path)?;
    let row_size = Table::Movies.row_size();

    let mut entries = Vec::new();
    let mut page_id = 0;
    loop {
        if bm.get_page(file, page_id)?.is_none() {
            break;
        }
        let buf = bm
            .peek_page(file, page_id)
            .ok_or(RecordError::BufferExhausted)?;
        for slot in 0..page_row_count(buf, row_size) {
            if let Some(row) = page_row(buf, row_size, slot) {
                let values = decode_row(Table::Movies, row)?;
                entries.push((values[1].clone(), Rid::new(page_id, slot)));
            }
        }
        bm.unpin_page(file, page_id);
        page_id += 1;
    }

    // Stable sort: equal titles keep their (page, slot) insertion order
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}
