use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::error::ExecResult;
use super::index_scan::IndexScan;
use super::join::BlockNestedLoopJoin;
use super::predicate::{JoinPredicate, Predicate};
use super::project::Projection;
use super::scan::SeqScan;
use super::select::Selection;
use super::Operator;
use crate::file::{BufferManager, FileHandle};
use crate::index::TitleIndex;
use crate::record::Table;

pub const MOVIES_FILE: &str = "imdb_movies.bin";
pub const WORKEDON_FILE: &str = "imdb_workedon.bin";
pub const PEOPLE_FILE: &str = "imdb_people.bin";
pub const TITLE_INDEX_FILE: &str = "imdb_title_index.bin";
pub const TEMP_FILTERED_WORKEDON_FILE: &str = "imdb_temp_filtered_workedon.bin";

/// Assembles and drives the canonical three-way join:
///
/// ```text
/// SELECT title, name
/// FROM Movies, WorkedOn, People
/// WHERE title BETWEEN lo AND hi
///   AND category = 'director'
///   AND Movies.movieId = WorkedOn.movieId
///   AND WorkedOn.personId = People.personId
/// ```
///
/// Movies are read through the title index when the index file exists,
/// otherwise through a selection over a sequential scan. The filtered
/// director stream is materialised so the first join can rewind it once
/// per outer tuple.
pub struct QueryExecutor {
    buffer: Arc<Mutex<BufferManager>>,
    data_dir: PathBuf,
    title_lo: String,
    title_hi: String,
    buffer_size: usize,
}

impl QueryExecutor {
    pub fn new(
        buffer: Arc<Mutex<BufferManager>>,
        data_dir: impl Into<PathBuf>,
        title_lo: &str,
        title_hi: &str,
        buffer_size: usize,
    ) -> Self {
        Self {
            buffer,
            data_dir: data_dir.into(),
            title_lo: title_lo.to_string(),
            title_hi: title_hi.to_string(),
            buffer_size,
        }
    }

    /// Execute the plan, writing a CSV header and one `title,name` row per
    /// result to `out`. Returns the number of result rows.
    pub fn run<W: Write>(&mut self, out: W) -> ExecResult<usize> {
        let temp_path = self.data_dir.join(TEMP_FILTERED_WORKEDON_FILE);
        self.remove_temp_file(&temp_path);

        let mut root = self.build_plan(&temp_path)?;

        let mut writer = csv::Writer::from_writer(out);
        writer.write_record(["title", "name"])?;

        root.open()?;
        let mut rows = 0usize;
        let outcome = loop {
            match root.next() {
                Ok(Some(tuple)) => {
                    writer.write_record(tuple.values())?;
                    rows += 1;
                }
                Ok(None) => break Ok(rows),
                Err(e) => break Err(e),
            }
        };
        root.close()?;
        writer.flush()?;

        self.remove_temp_file(&temp_path);
        outcome
    }

    fn build_plan(&self, temp_path: &Path) -> ExecResult<Box<dyn Operator>> {
        let movies_file = self.open_table_file(MOVIES_FILE)?;
        let workedon_file = self.open_table_file(WORKEDON_FILE)?;
        let people_file = self.open_table_file(PEOPLE_FILE)?;

        let movies_cols: Arc<[String]> = Table::Movies.qualified_columns().into();
        let workedon_cols: Arc<[String]> = Table::WorkedOn.qualified_columns().into();
        let people_cols: Arc<[String]> = Table::People.qualified_columns().into();

        // Movies side: prefer the title index when one has been built
        let index_path = self.data_dir.join(TITLE_INDEX_FILE);
        let movies_source: Box<dyn Operator> = if index_path.exists() {
            let tree = TitleIndex::open(self.buffer.clone(), &index_path)?;
            Box::new(IndexScan::new(
                tree,
                self.buffer.clone(),
                movies_file,
                Table::Movies,
                movies_cols,
                &self.title_lo,
                &self.title_hi,
            ))
        } else {
            Box::new(Selection::new(
                Box::new(SeqScan::new(
                    self.buffer.clone(),
                    movies_file,
                    Table::Movies,
                    movies_cols,
                )),
                Predicate::range("Movies.title", &self.title_lo, &self.title_hi),
            ))
        };

        let movies_proj = Projection::new(
            movies_source,
            &["Movies.movieId", "Movies.title"],
            &["Movies.movieId", "Movies.title"],
        )?;

        // Director stream: filter WorkedOn, project to the join columns and
        // materialise so the join can replay it
        let workedon_sel = Selection::new(
            Box::new(SeqScan::new(
                self.buffer.clone(),
                workedon_file,
                Table::WorkedOn,
                workedon_cols,
            )),
            Predicate::equals("WorkedOn.category", "director"),
        );
        let workedon_proj = Projection::new(
            Box::new(workedon_sel),
            &["WorkedOn.movieId", "WorkedOn.personId"],
            &["WorkedOn.movieId", "WorkedOn.personId", "WorkedOn.category"],
        )?
        .materialized(self.buffer.clone(), temp_path);

        let movies_workedon_join = BlockNestedLoopJoin::new(
            Box::new(movies_proj),
            Box::new(workedon_proj),
            JoinPredicate::new("Movies.movieId", "WorkedOn.movieId"),
            self.buffer_size,
        );

        let people_join = BlockNestedLoopJoin::new(
            Box::new(movies_workedon_join),
            Box::new(SeqScan::new(
                self.buffer.clone(),
                people_file,
                Table::People,
                people_cols,
            )),
            JoinPredicate::new("WorkedOn.personId", "People.personId"),
            self.buffer_size,
        );

        let final_proj = Projection::new(
            Box::new(people_join),
            &["Movies.title", "People.name"],
            &[
                "Movies.movieId",
                "Movies.title",
                "WorkedOn.movieId",
                "WorkedOn.personId",
                "People.personId",
                "People.name",
            ],
        )?;

        Ok(Box::new(final_proj))
    }

    fn open_table_file(&self, name: &str) -> ExecResult<FileHandle> {
        let mut bm = self.buffer.lock().unwrap();
        Ok(bm.file_manager_mut().open_file(self.data_dir.join(name))?)
    }

    fn remove_temp_file(&self, temp_path: &Path) {
        if temp_path.exists() {
            let mut bm = self.buffer.lock().unwrap();
            if let Err(e) = bm.file_manager_mut().remove_file(temp_path) {
                eprintln!("warning: could not remove {}: {e}", temp_path.display());
            }
        }
    }
}
