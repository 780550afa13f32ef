//! Iterator-model query execution.
//!
//! Every physical operator implements the same pull-based contract: `open`
//! initialises state, `next` produces one tuple or `None` at end of stream,
//! `close` releases pinned pages and temporary storage. Parents drive their
//! children cooperatively on a single thread; closing the top of a pipeline
//! cascades down.

mod error;
mod index_scan;
mod join;
mod predicate;
mod project;
mod query;
mod scan;
mod select;
mod tuple;

pub use error::{ExecError, ExecResult};
pub use index_scan::IndexScan;
pub use join::{BlockNestedLoopJoin, TUPLES_PER_PAGE};
pub use predicate::{JoinPredicate, Predicate};
pub use project::Projection;
pub use query::{
    MOVIES_FILE, PEOPLE_FILE, QueryExecutor, TEMP_FILTERED_WORKEDON_FILE, TITLE_INDEX_FILE,
    WORKEDON_FILE,
};
pub use scan::SeqScan;
pub use select::Selection;
pub use tuple::Tuple;

/// Uniform open/next/close contract implemented by every physical operator.
///
/// `open` is idempotent on repeated calls before `close`; operators are
/// re-openable after `close`, which the block nested loop join relies on to
/// rewind its inner side.
pub trait Operator {
    fn open(&mut self) -> ExecResult<()>;

    fn next(&mut self) -> ExecResult<Option<Tuple>>;

    fn close(&mut self) -> ExecResult<()>;
}
