use std::collections::VecDeque;
use std::fmt;
use std::iter::FusedIterator;

use gitrows_api::{Record, Row};
use tracing::debug;

use crate::git::RecordReader;
use crate::parse::{Malformed, ParseResult};
use crate::{Error, Result};

/// Turns one raw record into zero or more items.
pub(crate) type Assemble<'s, R> =
    Box<dyn FnMut(&[u8], &mut VecDeque<R>) -> ParseResult<()> + Send + 's>;

type Open<'s, R> = Box<dyn Fn() -> Result<Records<'s, R>> + 's>;

/// Access to one record kind of a session.
///
/// Every call to [`Extractor::iter`] starts a fresh git process; nothing is
/// cached between passes.
pub struct Extractor<'s, R> {
    open: Open<'s, R>,
}

impl<'s, R: Record> Extractor<'s, R> {
    pub(crate) fn new(open: impl Fn() -> Result<Records<'s, R>> + 's) -> Self {
        Self {
            open: Box::new(open),
        }
    }

    /// Start a lazy pass over the records.
    ///
    /// # Errors
    ///
    /// Returns an error when git cannot be started or a prerequisite query
    /// (such as branch reachability) fails.
    #[allow(clippy::iter_not_returning_iterator)]
    pub fn iter(&self) -> Result<Records<'s, R>> {
        (self.open)()
    }

    /// Drain a full pass into memory, in stream order.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by the pass.
    pub fn collect(&self) -> Result<Vec<R>> {
        self.iter()?.collect()
    }

    /// Start a lazy pass that yields column/value rows.
    ///
    /// # Errors
    ///
    /// Same as [`Extractor::iter`].
    pub fn rows(&self) -> Result<Rows<'s, R>> {
        Ok(Rows {
            records: self.iter()?,
        })
    }

    /// Drain a full pass of rows into memory.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by the pass.
    pub fn collect_rows(&self) -> Result<Vec<Row>> {
        self.rows()?.collect()
    }
}

impl<R: Record> fmt::Debug for Extractor<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extractor")
            .field("kind", &R::KIND)
            .finish_non_exhaustive()
    }
}

/// Lazy, single-pass sequence of records backed by one git process.
///
/// Records are parsed only as they are pulled. The sequence ends after the
/// first error. Dropping it early terminates the git process.
pub struct Records<'s, R> {
    label: &'static str,
    reader: Option<RecordReader>,
    assemble: Assemble<'s, R>,
    pending: VecDeque<R>,
    parsed: u64,
    failed: bool,
}

impl<'s, R> Records<'s, R> {
    pub(crate) fn new(label: &'static str, reader: RecordReader, assemble: Assemble<'s, R>) -> Self {
        Self {
            label,
            reader: Some(reader),
            assemble,
            pending: VecDeque::new(),
            parsed: 0,
            failed: false,
        }
    }

    /// A sequence that yields nothing and runs no process.
    pub(crate) fn empty(label: &'static str) -> Self {
        Self {
            label,
            reader: None,
            assemble: Box::new(|_: &[u8], _: &mut VecDeque<R>| Ok(())),
            pending: VecDeque::new(),
            parsed: 0,
            failed: false,
        }
    }

    /// Raw records parsed so far.
    #[must_use]
    pub const fn records_parsed(&self) -> u64 {
        self.parsed
    }

    /// OS process id of the git process while it is running.
    #[must_use]
    pub fn process_id(&self) -> Option<u32> {
        self.reader.as_ref().and_then(RecordReader::process_id)
    }

    fn fail(&mut self, error: Error) -> Error {
        self.failed = true;
        self.pending.clear();
        self.reader = None;
        debug!(kind = self.label, records = self.parsed, %error, "extraction aborted");
        error
    }

    fn malformed(&mut self, offset: u64, reason: Malformed) -> Error {
        let error = Error::Parse {
            offset,
            last_good: self.parsed.checked_sub(1),
            reason: reason.0,
        };
        self.fail(error)
    }
}

impl<R> Iterator for Records<'_, R> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(Ok(record));
            }
            if self.failed {
                return None;
            }
            let reader = self.reader.as_mut()?;
            match reader.next_record() {
                Ok(Some(raw)) => match (self.assemble)(&raw.bytes, &mut self.pending) {
                    Ok(()) => self.parsed += 1,
                    Err(reason) => return Some(Err(self.malformed(raw.offset, reason))),
                },
                Ok(None) => {
                    debug!(kind = self.label, records = self.parsed, "extraction finished");
                    self.reader = None;
                    return None;
                }
                Err(error) => return Some(Err(self.fail(error))),
            }
        }
    }
}

impl<R> FusedIterator for Records<'_, R> {}

impl<R> fmt::Debug for Records<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Records")
            .field("kind", &self.label)
            .field("parsed", &self.parsed)
            .field("pending", &self.pending.len())
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

/// Row projection of a [`Records`] sequence.
#[derive(Debug)]
pub struct Rows<'s, R> {
    records: Records<'s, R>,
}

impl<R> Rows<'_, R> {
    /// Raw records parsed so far.
    #[must_use]
    pub const fn records_parsed(&self) -> u64 {
        self.records.records_parsed()
    }
}

impl<R: Record> Iterator for Rows<'_, R> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records
            .next()
            .map(|record| record.map(|record| record.to_row()))
    }
}

impl<R: Record> FusedIterator for Rows<'_, R> {}

#[cfg(test)]
mod tests {
    use super::*;
    use gitrows_api::Branch;

    #[test]
    fn empty_sequence_yields_nothing() {
        let mut records: Records<'_, Branch> = Records::empty("branch");
        assert!(records.next().is_none());
        assert_eq!(records.records_parsed(), 0);
        assert_eq!(records.process_id(), None);
    }

    #[test]
    fn parse_errors_report_last_good_ordinal() {
        let mut records: Records<'_, Branch> = Records::empty("branch");
        records.parsed = 3;
        let error = records.malformed(120, Malformed::new("bad"));
        match error {
            Error::Parse {
                offset, last_good, ..
            } => {
                assert_eq!(offset, 120);
                assert_eq!(last_good, Some(2));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(records.next().is_none());
    }
}
