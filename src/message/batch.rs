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

//! Batch level wrappers around record readers.
//!
//! Control batches and record batches are the v2 formats, message sets and
//! single messages the v1 one. Each wrapper reads through to its inner reader
//! and adds the batch metadata.

use crate::message::batch_header::{Attributes, BatchHeader};
use crate::message::constants::*;
use crate::message::control::ControlRecord;
use crate::message::reader::{new_record_reader, reset_record_reader, RecordReader, Resetter};
use crate::message::record::Record;
use crate::AppResult;

/// A reader that is a whole protocol batch.
pub trait Batch: RecordReader {
    /// Base offset of the batch.
    fn offset(&self) -> i64;
    /// Message format version (magic).
    fn version(&self) -> i8;
}

/// Header fields shared by v2 batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchMetadata {
    pub attributes: Attributes,
    pub partition_leader_epoch: i32,
    pub base_offset: i64,
    pub producer_id: i64,
    pub producer_epoch: i16,
    pub base_sequence: i32,
}

impl Default for BatchMetadata {
    fn default() -> Self {
        BatchMetadata {
            attributes: Attributes(ATTRIBUTES),
            partition_leader_epoch: NO_PARTITION_LEADER_EPOCH,
            base_offset: 0,
            producer_id: NO_PRODUCER_ID,
            producer_epoch: NO_PRODUCER_EPOCH,
            base_sequence: NO_SEQUENCE,
        }
    }
}

impl From<&BatchHeader> for BatchMetadata {
    fn from(header: &BatchHeader) -> Self {
        BatchMetadata {
            attributes: header.attributes(),
            partition_leader_epoch: header.partition_leader_epoch,
            base_offset: header.first_offset,
            producer_id: header.producer_id,
            producer_epoch: header.producer_epoch,
            base_sequence: header.first_sequence,
        }
    }
}

/// Control batch returned by brokers, its records are control markers.
pub struct ControlBatch {
    pub metadata: BatchMetadata,
    pub records: Box<dyn RecordReader>,
}

impl std::fmt::Debug for ControlBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlBatch")
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl ControlBatch {
    pub fn new(metadata: BatchMetadata, records: Box<dyn RecordReader>) -> Self {
        ControlBatch { metadata, records }
    }

    /// Reads the next record and decodes it as a control record. The raw
    /// key and value are released once decoded.
    pub fn read_control_record(&mut self) -> AppResult<Option<ControlRecord>> {
        let Some(record) = self.records.read_record()? else {
            return Ok(None);
        };
        let control = ControlRecord::decode(record);
        if let Some(key) = record.key.as_mut() {
            key.close();
        }
        if let Some(value) = record.value.as_mut() {
            value.close();
        }
        control.map(Some)
    }
}

/// Constructs a control batch holding `records`.
pub fn new_control_batch(records: &[ControlRecord]) -> ControlBatch {
    let raw: Vec<Record> = records.iter().map(ControlRecord::to_record).collect();
    ControlBatch::new(
        BatchMetadata {
            attributes: Attributes::default().with_control(true),
            ..BatchMetadata::default()
        },
        new_record_reader(raw),
    )
}

impl RecordReader for ControlBatch {
    fn advance(&mut self) -> AppResult<bool> {
        self.records.advance()
    }

    fn current(&mut self) -> Option<&mut Record> {
        self.records.current()
    }

    fn resetter(&mut self) -> Option<&mut dyn Resetter> {
        Some(self)
    }

    fn is_control_batch(&self) -> bool {
        true
    }
}

impl Resetter for ControlBatch {
    fn reset(&mut self) -> AppResult<()> {
        reset_record_reader(self.records.as_mut())
    }
}

impl Batch for ControlBatch {
    fn offset(&self) -> i64 {
        self.metadata.base_offset
    }

    fn version(&self) -> i8 {
        MAGIC
    }
}

/// Regular v2 record batch.
pub struct RecordBatch {
    pub metadata: BatchMetadata,
    pub records: Box<dyn RecordReader>,
}

impl std::fmt::Debug for RecordBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordBatch")
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl RecordBatch {
    pub fn new(metadata: BatchMetadata, records: Box<dyn RecordReader>) -> Self {
        RecordBatch { metadata, records }
    }
}

impl RecordReader for RecordBatch {
    fn advance(&mut self) -> AppResult<bool> {
        self.records.advance()
    }

    fn current(&mut self) -> Option<&mut Record> {
        self.records.current()
    }

    fn resetter(&mut self) -> Option<&mut dyn Resetter> {
        Some(self)
    }
}

impl Resetter for RecordBatch {
    fn reset(&mut self) -> AppResult<()> {
        reset_record_reader(self.records.as_mut())
    }
}

impl Batch for RecordBatch {
    fn offset(&self) -> i64 {
        self.metadata.base_offset
    }

    fn version(&self) -> i8 {
        MAGIC
    }
}

/// Regular v1 message set.
pub struct MessageSet {
    pub attributes: Attributes,
    pub base_offset: i64,
    pub records: Box<dyn RecordReader>,
}

impl std::fmt::Debug for MessageSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSet")
            .field("attributes", &self.attributes)
            .field("base_offset", &self.base_offset)
            .finish()
    }
}

impl MessageSet {
    pub fn new(base_offset: i64, records: Box<dyn RecordReader>) -> Self {
        MessageSet {
            attributes: Attributes::default(),
            base_offset,
            records,
        }
    }
}

impl RecordReader for MessageSet {
    fn advance(&mut self) -> AppResult<bool> {
        self.records.advance()
    }

    fn current(&mut self) -> Option<&mut Record> {
        self.records.current()
    }

    fn resetter(&mut self) -> Option<&mut dyn Resetter> {
        Some(self)
    }
}

impl Resetter for MessageSet {
    fn reset(&mut self) -> AppResult<()> {
        reset_record_reader(self.records.as_mut())
    }
}

impl Batch for MessageSet {
    fn offset(&self) -> i64 {
        self.base_offset
    }

    fn version(&self) -> i8 {
        MAGIC_V1
    }
}

/// A single v1 message, read exactly once per pass.
#[derive(Debug)]
pub struct Message {
    pub record: Record,
    read: bool,
    done: bool,
}

impl Message {
    pub fn new(record: Record) -> Self {
        Message {
            record,
            read: false,
            done: false,
        }
    }
}

impl RecordReader for Message {
    fn advance(&mut self) -> AppResult<bool> {
        if self.read {
            self.done = true;
            return Ok(false);
        }
        self.read = true;
        Ok(true)
    }

    fn current(&mut self) -> Option<&mut Record> {
        if self.read && !self.done {
            Some(&mut self.record)
        } else {
            None
        }
    }

    fn resetter(&mut self) -> Option<&mut dyn Resetter> {
        Some(self)
    }
}

impl Resetter for Message {
    fn reset(&mut self) -> AppResult<()> {
        self.read = false;
        self.done = false;
        if let Some(key) = self.record.key.as_mut() {
            key.reopen()?;
        }
        if let Some(value) = self.record.value.as_mut() {
            value.reopen()?;
        }
        Ok(())
    }
}

impl Batch for Message {
    fn offset(&self) -> i64 {
        self.record.offset
    }

    fn version(&self) -> i8 {
        MAGIC_V1
    }
}
