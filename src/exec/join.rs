use std::collections::VecDeque;
use std::sync::Arc;

use super::error::ExecResult;
use super::predicate::JoinPredicate;
use super::tuple::Tuple;
use super::Operator;

/// Soft per-page tuple budget used to translate the block size in pages
/// into a bound on resident outer tuples
pub const TUPLES_PER_PAGE: usize = 100;

/// Frames reserved outside the block: one for the inner page, one for output
const RESERVED_FRAMES: usize = 2;

/// Block nested loop join.
///
/// Loads the outer child block by block; for every outer tuple in the
/// current block the inner child is rewound (close + open) and scanned in
/// full, emitting the concatenation of each matching pair. The inner child
/// must therefore be idempotent across open/close cycles; a materialising
/// projection qualifies because its backing file is persistent.
///
/// The block holds at most `max(1, (B - 2) / 2) * TUPLES_PER_PAGE` tuples,
/// where `B` is the buffer pool size in frames.
pub struct BlockNestedLoopJoin {
    outer: Box<dyn Operator>,
    inner: Box<dyn Operator>,
    predicate: JoinPredicate,
    block_capacity: usize,
    block: Vec<Tuple>,
    block_pos: usize,
    pending: VecDeque<Tuple>,
    outer_done: bool,
    joined_columns: Option<Arc<[String]>>,
    opened: bool,
}

impl BlockNestedLoopJoin {
    pub fn new(
        outer: Box<dyn Operator>,
        inner: Box<dyn Operator>,
        predicate: JoinPredicate,
        buffer_size: usize,
    ) -> Self {
        let block_pages = (buffer_size.saturating_sub(RESERVED_FRAMES) / 2).max(1);
        Self {
            outer,
            inner,
            predicate,
            block_capacity: block_pages * TUPLES_PER_PAGE,
            block: Vec::new(),
            block_pos: 0,
            pending: VecDeque::new(),
            outer_done: false,
            joined_columns: None,
            opened: false,
        }
    }

    /// Pull the next block of outer tuples into memory
    fn load_block(&mut self) -> ExecResult<()> {
        self.block.clear();
        self.block_pos = 0;

        while self.block.len() < self.block_capacity {
            match self.outer.next()? {
                Some(tuple) => self.block.push(tuple),
                None => {
                    self.outer_done = true;
                    break;
                }
            }
        }
        Ok(())
    }

    fn join(&mut self, outer: &Tuple, inner: &Tuple) -> Tuple {
        let columns = self
            .joined_columns
            .get_or_insert_with(|| Tuple::joined_columns(outer, inner))
            .clone();
        Tuple::join_with(outer, inner, columns)
    }
}

impl Operator for BlockNestedLoopJoin {
    fn open(&mut self) -> ExecResult<()> {
        if self.opened {
            return Ok(());
        }

        self.outer.open()?;
        self.inner.open()?;

        self.block.clear();
        self.block_pos = 0;
        self.pending.clear();
        self.outer_done = false;
        self.opened = true;

        self.load_block()
    }

    fn next(&mut self) -> ExecResult<Option<Tuple>> {
        if !self.opened {
            return Ok(None);
        }

        loop {
            if let Some(tuple) = self.pending.pop_front() {
                return Ok(Some(tuple));
            }

            if self.block_pos >= self.block.len() {
                if self.outer_done {
                    return Ok(None);
                }
                self.load_block()?;
                if self.block.is_empty() {
                    return Ok(None);
                }
            }

            let outer = self.block[self.block_pos].clone();
            self.block_pos += 1;

            // One full pass over the inner relation per outer tuple
            self.inner.close()?;
            self.inner.open()?;
            while let Some(inner) = self.inner.next()? {
                if self.predicate.matches(&outer, &inner) {
                    let joined = self.join(&outer, &inner);
                    self.pending.push_back(joined);
                }
            }
        }
    }

    fn close(&mut self) -> ExecResult<()> {
        if !self.opened {
            return Ok(());
        }

        self.outer.close()?;
        self.inner.close()?;

        self.block.clear();
        self.block_pos = 0;
        self.pending.clear();
        self.outer_done = false;
        self.opened = false;
        Ok(())
    }
}
