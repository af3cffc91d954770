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

//! Zero-copy reader over records decoded straight out of pooled pages.
//!
//! Each [`OptimizedRecord`] keeps page references to its key and value instead
//! of owned copies. The reader materializes one [`Record`] at a time into a
//! slot it reuses, the record handed out is only valid until the next read.
//!
//! The reader is meant for a single forward pass. Resetting it does not
//! rewind, it drops every page reference still held so the pages can go back
//! to the pool.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::message::page::PageRef;
use crate::message::payload::Payload;
use crate::message::reader::{RecordReader, Resetter};
use crate::message::record::{make_time, Header, Record};
use crate::AppResult;

#[derive(Debug)]
pub struct OptimizedRecord {
    offset: i64,
    timestamp: i64,
    key_ref: Option<PageRef>,
    value_ref: Option<PageRef>,
    headers: Vec<Header>,
}

impl OptimizedRecord {
    /// `None` refs stand for null keys or values.
    pub fn new(
        offset: i64,
        timestamp: i64,
        key_ref: Option<PageRef>,
        value_ref: Option<PageRef>,
        headers: Vec<Header>,
    ) -> Self {
        OptimizedRecord {
            offset,
            timestamp,
            key_ref,
            value_ref,
            headers,
        }
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    fn time(&self) -> Option<DateTime<Utc>> {
        make_time(self.timestamp)
    }

    fn key(&self) -> Option<Payload> {
        self.key_ref.clone().map(Payload::from_page)
    }

    fn value(&self) -> Option<Payload> {
        self.value_ref.clone().map(Payload::from_page)
    }

    /// Releases both page references. A slot can only give its references up
    /// once, later calls find nothing left to release.
    fn unref(&mut self) {
        if let Some(key_ref) = self.key_ref.take() {
            key_ref.unref();
        }
        if let Some(value_ref) = self.value_ref.take() {
            value_ref.unref();
        }
    }
}

#[derive(Debug, Default)]
pub struct OptimizedRecordReader {
    records: Vec<OptimizedRecord>,
    index: usize,
    buffer: Option<Record>,
}

impl OptimizedRecordReader {
    pub fn new(records: Vec<OptimizedRecord>) -> Self {
        OptimizedRecordReader {
            records,
            index: 0,
            buffer: None,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Releases every page reference and moves to the end of the sequence.
    pub fn discard(&mut self) {
        self.buffer = None;
        for record in self.records.iter_mut() {
            record.unref();
        }
        self.index = self.records.len();
        debug!("discarded {} pooled records", self.records.len());
    }
}

impl RecordReader for OptimizedRecordReader {
    fn advance(&mut self) -> AppResult<bool> {
        let Some(rec) = self.records.get_mut(self.index) else {
            self.buffer = None;
            return Ok(false);
        };
        self.index += 1;
        // headers are handed over, the slot is not read twice
        let headers = std::mem::take(&mut rec.headers);
        self.buffer = Some(Record {
            offset: rec.offset,
            time: rec.time(),
            key: rec.key(),
            value: rec.value(),
            headers,
        });
        Ok(true)
    }

    fn current(&mut self) -> Option<&mut Record> {
        self.buffer.as_mut()
    }

    fn resetter(&mut self) -> Option<&mut dyn Resetter> {
        Some(self)
    }
}

impl Resetter for OptimizedRecordReader {
    fn reset(&mut self) -> AppResult<()> {
        self.discard();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::page::{Page, PagePool};
    use crate::message::reader::reset_record_reader;

    fn page(pool: &PagePool, bytes: &[u8]) -> Page {
        let mut writer = pool.acquire();
        writer.extend_from_slice(bytes);
        writer.freeze()
    }

    fn reader_over(page: &Page) -> OptimizedRecordReader {
        // "k1v1k2v2"
        OptimizedRecordReader::new(vec![
            OptimizedRecord::new(
                10,
                1_000,
                Some(page.slice(0, 2).unwrap()),
                Some(page.slice(2, 2).unwrap()),
                vec![Header::new("h", b"1")],
            ),
            OptimizedRecord::new(11, -1, None, Some(page.slice(6, 2).unwrap()), vec![]),
        ])
    }

    #[test]
    fn test_reads_page_backed_views() {
        let pool = PagePool::new(64, 2);
        let page = page(&pool, b"k1v1k2v2");
        let mut reader = reader_over(&page);
        drop(page);

        let record = reader.read_record().unwrap().unwrap();
        assert_eq!(record.offset, 10);
        assert_eq!(record.time.unwrap().timestamp_millis(), 1_000);
        assert_eq!(record.key.as_ref().unwrap().as_slice(), Some(&b"k1"[..]));
        assert_eq!(record.value.as_mut().unwrap().read_full().unwrap(), b"v1");
        assert_eq!(record.headers, vec![Header::new("h", b"1")]);

        let record = reader.read_record().unwrap().unwrap();
        assert_eq!(record.offset, 11);
        assert!(record.time.is_none());
        assert!(record.key.is_none());
        assert_eq!(record.value.as_mut().unwrap().read_full().unwrap(), b"v2");

        assert!(reader.read_record().unwrap().is_none());
        assert_eq!(pool.outstanding(), 1);
        drop(reader);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_reset_discards_instead_of_rewinding() {
        let pool = PagePool::new(64, 2);
        let page = page(&pool, b"k1v1k2v2");
        let mut reader = reader_over(&page);
        drop(page);

        assert!(reader.read_record().unwrap().is_some());
        reset_record_reader(&mut reader).unwrap();
        assert_eq!(pool.outstanding(), 0);
        assert!(reader.read_record().unwrap().is_none());

        // a second discard finds nothing left to release
        reset_record_reader(&mut reader).unwrap();
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_discard_drops_current_view() {
        let pool = PagePool::new(64, 2);
        let page = page(&pool, b"k1v1k2v2");
        let mut reader = OptimizedRecordReader::new(vec![OptimizedRecord::new(
            1,
            0,
            Some(page.slice(0, 2).unwrap()),
            None,
            vec![],
        )]);
        drop(page);

        assert!(reader.read_record().unwrap().is_some());
        reader.discard();
        assert_eq!(pool.outstanding(), 0);
    }
}
