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

use crate::message::reader::{BatchCursor, RecordReader, Resetter};
use crate::message::record::Record;
use crate::AppResult;

/// Merges the batches of a fetch response into one sequence, leaving out
/// every record that lives in a control batch.
pub struct RecordStream {
    pub records: Vec<Box<dyn RecordReader>>,
    cursor: BatchCursor,
}

impl std::fmt::Debug for RecordStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStream")
            .field("batches", &self.records.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl RecordStream {
    pub fn new(records: Vec<Box<dyn RecordReader>>) -> Self {
        RecordStream {
            records,
            cursor: BatchCursor::default(),
        }
    }

    /// Index of the batch the next read is served from.
    pub fn position(&self) -> usize {
        self.cursor.index
    }
}

impl RecordReader for RecordStream {
    fn advance(&mut self) -> AppResult<bool> {
        while let Some(batch) = self.records.get_mut(self.cursor.index) {
            if batch.is_control_batch() {
                self.cursor.next_batch();
                continue;
            }
            self.cursor.started = true;
            if batch.advance()? {
                return Ok(true);
            }
            self.cursor.next_batch();
        }
        Ok(false)
    }

    fn current(&mut self) -> Option<&mut Record> {
        self.records.get_mut(self.cursor.index)?.current()
    }

    fn resetter(&mut self) -> Option<&mut dyn Resetter> {
        Some(self)
    }
}

impl Resetter for RecordStream {
    fn reset(&mut self) -> AppResult<()> {
        self.cursor.reset(&mut self.records)
    }
}
