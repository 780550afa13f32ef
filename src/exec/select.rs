use super::error::ExecResult;
use super::predicate::Predicate;
use super::tuple::Tuple;
use super::Operator;

/// Selection: pulls from its child until a tuple satisfies the predicate
pub struct Selection {
    child: Box<dyn Operator>,
    predicate: Predicate,
}

impl Selection {
    pub fn new(child: Box<dyn Operator>, predicate: Predicate) -> Self {
        Self { child, predicate }
    }
}

impl Operator for Selection {
    fn open(&mut self) -> ExecResult<()> {
        self.child.open()
    }

    fn next(&mut self) -> ExecResult<Option<Tuple>> {
        while let Some(tuple) = self.child.next()? {
            if self.predicate.matches(&tuple) {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }

    fn close(&mut self) -> ExecResult<()> {
        self.child.close()
    }
}
