// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Record readers.
//!
//! A [`RecordReader`] is a pull based sequence of records used on both the
//! produce and the fetch path. It behaves like a lending iterator: the record
//! returned by [`RecordReader::read_record`] borrows the reader, so the borrow
//! checker enforces that it is not used after the next read.
//!
//! Readers are not meant to be shared, each instance is driven by exactly one
//! caller at a time.
//!
//! Optional capabilities are asked for explicitly:
//! - [`RecordReader::resetter`] hands out the reset handle of readers that can
//!   replay their sequence for a retried request,
//! - [`RecordReader::is_control_batch`] marks batches whose records must not
//!   reach consumers,
//! - [`RecordReader::try_append`] lets a multi reader absorb another batch
//!   instead of being wrapped again.

use tracing::debug;

use crate::message::record::Record;
use crate::{AppError, AppResult};

pub trait RecordReader: Send {
    /// Moves to the next record. Returns `false` once the sequence is
    /// exhausted, and keeps returning `false` after that.
    ///
    /// Any error ends the sequence, further reads are not meaningful.
    fn advance(&mut self) -> AppResult<bool>;

    /// The record the last successful [`advance`](RecordReader::advance)
    /// moved to.
    fn current(&mut self) -> Option<&mut Record>;

    /// Returns the next record, `Ok(None)` at end of sequence.
    fn read_record(&mut self) -> AppResult<Option<&mut Record>> {
        if self.advance()? {
            Ok(self.current())
        } else {
            Ok(None)
        }
    }

    fn resetter(&mut self) -> Option<&mut dyn Resetter> {
        None
    }

    fn is_control_batch(&self) -> bool {
        false
    }

    /// Appends `tail` to this reader's sequence in place when the reader knows
    /// how to, otherwise hands `tail` back.
    fn try_append(&mut self, tail: Box<dyn RecordReader>) -> Option<Box<dyn RecordReader>> {
        Some(tail)
    }
}

/// Rewinds a reader so the same sequence can be read again.
pub trait Resetter {
    fn reset(&mut self) -> AppResult<()>;
}

impl<R: RecordReader + ?Sized> RecordReader for Box<R> {
    fn advance(&mut self) -> AppResult<bool> {
        (**self).advance()
    }

    fn current(&mut self) -> Option<&mut Record> {
        (**self).current()
    }

    fn read_record(&mut self) -> AppResult<Option<&mut Record>> {
        (**self).read_record()
    }

    fn resetter(&mut self) -> Option<&mut dyn Resetter> {
        (**self).resetter()
    }

    fn is_control_batch(&self) -> bool {
        (**self).is_control_batch()
    }

    fn try_append(&mut self, tail: Box<dyn RecordReader>) -> Option<Box<dyn RecordReader>> {
        (**self).try_append(tail)
    }
}

/// Resets `reader`, failing with [`AppError::NoReset`] when it cannot replay.
pub fn reset_record_reader<R: RecordReader + ?Sized>(reader: &mut R) -> AppResult<()> {
    match reader.resetter() {
        Some(resetter) => resetter.reset(),
        None => Err(AppError::NoReset),
    }
}

/// Resets `readers` from the last one down to the first, stopping at the first
/// failure.
///
/// Returns the index reading should resume at: `0` when everything was reset,
/// otherwise one past the reader that failed, since every reader after it was
/// rewound and it and the ones before it were left where they were.
pub fn reset_record_readers(readers: &mut [Box<dyn RecordReader>]) -> (usize, AppResult<()>) {
    for (i, reader) in readers.iter_mut().enumerate().rev() {
        if let Err(e) = reset_record_reader(reader.as_mut()) {
            debug!("reset stopped at reader {}: {}", i, e);
            return (i + 1, Err(e));
        }
    }
    (0, Ok(()))
}

/// Position inside a list of batches, shared by [`MultiRecordReader`] and the
/// record stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BatchCursor {
    pub(crate) index: usize,
    /// The batch at `index` has been advanced at least once.
    pub(crate) started: bool,
}

impl BatchCursor {
    pub(crate) fn next_batch(&mut self) {
        self.index += 1;
        self.started = false;
    }

    /// Number of batches a reset has to rewind.
    pub(crate) fn visited(&self, len: usize) -> usize {
        (self.index + usize::from(self.started)).min(len)
    }

    /// Rewinds the visited prefix of `batches` in reverse order. On failure the
    /// cursor is left on the first batch that is known to be rewound.
    pub(crate) fn reset(&mut self, batches: &mut [Box<dyn RecordReader>]) -> AppResult<()> {
        let visited = self.visited(batches.len());
        let (resume, result) = reset_record_readers(&mut batches[..visited]);
        if resume > self.index {
            // the batch being read failed to reset, nothing moved
            return result;
        }
        self.index = resume;
        self.started = false;
        result
    }
}

/// Stateless reader that is always at end of sequence.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyRecordReader;

impl RecordReader for EmptyRecordReader {
    fn advance(&mut self) -> AppResult<bool> {
        Ok(false)
    }

    fn current(&mut self) -> Option<&mut Record> {
        None
    }

    fn resetter(&mut self) -> Option<&mut dyn Resetter> {
        Some(self)
    }
}

impl Resetter for EmptyRecordReader {
    fn reset(&mut self) -> AppResult<()> {
        Ok(())
    }
}

/// Constructs a reader over `records`. An empty list yields an
/// [`EmptyRecordReader`], which does not allocate.
pub fn new_record_reader(records: Vec<Record>) -> Box<dyn RecordReader> {
    if records.is_empty() {
        Box::new(EmptyRecordReader)
    } else {
        Box::new(PlainRecordReader::new(records))
    }
}

/// Reader over records owned by the reader itself.
#[derive(Debug)]
pub struct PlainRecordReader {
    records: Vec<Record>,
    index: usize,
    current: Option<usize>,
}

impl PlainRecordReader {
    pub fn new(records: Vec<Record>) -> Self {
        PlainRecordReader {
            records,
            index: 0,
            current: None,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordReader for PlainRecordReader {
    fn advance(&mut self) -> AppResult<bool> {
        if self.index < self.records.len() {
            self.current = Some(self.index);
            self.index += 1;
            Ok(true)
        } else {
            self.current = None;
            Ok(false)
        }
    }

    fn current(&mut self) -> Option<&mut Record> {
        self.current.and_then(|i| self.records.get_mut(i))
    }

    fn resetter(&mut self) -> Option<&mut dyn Resetter> {
        Some(self)
    }
}

impl Resetter for PlainRecordReader {
    /// Rewinds and reopens every key and value, a previous pass may have
    /// closed them.
    fn reset(&mut self) -> AppResult<()> {
        self.index = 0;
        self.current = None;
        for record in self.records.iter_mut() {
            if let Some(key) = record.key.as_mut() {
                key.reopen()?;
            }
            if let Some(value) = record.value.as_mut() {
                value.reopen()?;
            }
        }
        Ok(())
    }
}

/// Merges batches into one sequence.
///
/// No batches yields an [`EmptyRecordReader`] and a single batch is returned
/// as is, only two or more are wrapped.
pub fn multi_record_reader(mut batches: Vec<Box<dyn RecordReader>>) -> Box<dyn RecordReader> {
    if batches.len() > 1 {
        return Box::new(MultiRecordReader::new(batches));
    }
    match batches.pop() {
        Some(batch) => batch,
        None => Box::new(EmptyRecordReader),
    }
}

/// Appends `tail` after `head`. An existing multi reader grows in place, any
/// other head is wrapped together with `tail` in a new one.
pub fn concat_record_reader(
    head: Option<Box<dyn RecordReader>>,
    tail: Box<dyn RecordReader>,
) -> Box<dyn RecordReader> {
    let Some(mut head) = head else {
        return tail;
    };
    match head.try_append(tail) {
        None => head,
        Some(tail) => Box::new(MultiRecordReader::new(vec![head, tail])),
    }
}

pub struct MultiRecordReader {
    batches: Vec<Box<dyn RecordReader>>,
    cursor: BatchCursor,
}

impl std::fmt::Debug for MultiRecordReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiRecordReader")
            .field("batches", &self.batches.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl MultiRecordReader {
    pub fn new(batches: Vec<Box<dyn RecordReader>>) -> Self {
        MultiRecordReader {
            batches,
            cursor: BatchCursor::default(),
        }
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Index of the batch the next read is served from.
    pub fn position(&self) -> usize {
        self.cursor.index
    }
}

impl RecordReader for MultiRecordReader {
    fn advance(&mut self) -> AppResult<bool> {
        while let Some(batch) = self.batches.get_mut(self.cursor.index) {
            self.cursor.started = true;
            if batch.advance()? {
                return Ok(true);
            }
            self.cursor.next_batch();
        }
        Ok(false)
    }

    fn current(&mut self) -> Option<&mut Record> {
        self.batches.get_mut(self.cursor.index)?.current()
    }

    fn resetter(&mut self) -> Option<&mut dyn Resetter> {
        Some(self)
    }

    fn try_append(&mut self, tail: Box<dyn RecordReader>) -> Option<Box<dyn RecordReader>> {
        self.batches.push(tail);
        None
    }
}

impl Resetter for MultiRecordReader {
    fn reset(&mut self) -> AppResult<()> {
        self.cursor.reset(&mut self.batches)
    }
}
