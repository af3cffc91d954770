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

use std::fmt::{Display, Formatter};
use std::io::Cursor;

use bytes::Buf;
use chrono::{Local, TimeZone};

use crate::message::constants::*;
use crate::{AppError, AppResult};

/// Batch attribute bits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Attributes(pub i16);

impl Attributes {
    /// Compression codec id, `0` for uncompressed.
    pub fn compression(self) -> i16 {
        self.0 & COMPRESSION_CODEC_MASK
    }

    /// Timestamps are broker append times rather than create times.
    pub fn log_append_time(self) -> bool {
        self.0 & TIMESTAMP_TYPE_MASK != 0
    }

    pub fn transactional(self) -> bool {
        self.0 & TRANSACTIONAL_FLAG_MASK != 0
    }

    pub fn control(self) -> bool {
        self.0 & CONTROL_FLAG_MASK != 0
    }

    pub fn with_transactional(self, on: bool) -> Self {
        Self::set(self, TRANSACTIONAL_FLAG_MASK, on)
    }

    pub fn with_control(self, on: bool) -> Self {
        Self::set(self, CONTROL_FLAG_MASK, on)
    }

    fn set(self, mask: i16, on: bool) -> Self {
        if on {
            Attributes(self.0 | mask)
        } else {
            Attributes(self.0 & !mask)
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct BatchHeader {
    pub first_offset: i64,
    pub length: i32,
    pub partition_leader_epoch: i32,
    pub magic: i8,
    pub crc: u32,
    pub attributes: i16,
    pub last_offset_delta: i32,
    pub first_timestamp: i64,
    pub max_timestamp: i64,
    pub producer_id: i64,
    pub producer_epoch: i16,
    pub first_sequence: i32,
    pub records_count: i32,
}

impl BatchHeader {
    /// Reads the fixed size header at the start of `buf`.
    pub fn parse(buf: &[u8]) -> AppResult<BatchHeader> {
        if buf.len() < RECORD_BATCH_OVERHEAD {
            return Err(AppError::CorruptMessage(format!(
                "batch header needs {} bytes, found {}",
                RECORD_BATCH_OVERHEAD,
                buf.len()
            )));
        }
        let mut cursor = Cursor::new(buf);
        Ok(BatchHeader {
            first_offset: cursor.get_i64(),
            length: cursor.get_i32(),
            partition_leader_epoch: cursor.get_i32(),
            magic: cursor.get_i8(),
            crc: cursor.get_u32(),
            attributes: cursor.get_i16(),
            last_offset_delta: cursor.get_i32(),
            first_timestamp: cursor.get_i64(),
            max_timestamp: cursor.get_i64(),
            producer_id: cursor.get_i64(),
            producer_epoch: cursor.get_i16(),
            first_sequence: cursor.get_i32(),
            records_count: cursor.get_i32(),
        })
    }

    pub fn attributes(&self) -> Attributes {
        Attributes(self.attributes)
    }
}

impl Display for BatchHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let chrono_first_timestamp = Local.timestamp_millis_opt(self.first_timestamp).single();
        let chrono_max_timestamp = Local.timestamp_millis_opt(self.max_timestamp).single();
        f.debug_struct("BatchHeader")
            .field("first_offset", &self.first_offset)
            .field("length", &self.length)
            .field("partition_leader_epoch", &self.partition_leader_epoch)
            .field("magic", &self.magic)
            .field("crc", &self.crc)
            .field("attributes", &self.attributes)
            .field("last_offset_delta", &self.last_offset_delta)
            .field("first_timestamp", &chrono_first_timestamp)
            .field("max_timestamp", &chrono_max_timestamp)
            .field("producer_id", &self.producer_id)
            .field("producer_epoch", &self.producer_epoch)
            .field("first_sequence", &self.first_sequence)
            .field("records_count", &self.records_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_header_display() {
        let header = BatchHeader {
            first_offset: 0,
            length: 100,
            partition_leader_epoch: -1,
            magic: 2,
            crc: 123456,
            attributes: 0,
            last_offset_delta: 0,
            first_timestamp: 1000,
            max_timestamp: 2000,
            producer_id: -1,
            producer_epoch: -1,
            first_sequence: -1,
            records_count: 1,
        };

        let display_str = format!("{}", header);
        assert!(display_str.contains("first_offset: 0"));
        assert!(display_str.contains("length: 100"));
    }

    #[test]
    fn test_parse_short_buffer() {
        let err = BatchHeader::parse(&[0; RECORD_BATCH_OVERHEAD - 1]).unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn test_attribute_bits() {
        let attributes = Attributes::default().with_control(true).with_transactional(true);
        assert!(attributes.control());
        assert!(attributes.transactional());
        assert_eq!(attributes.compression(), 0);
        assert!(!attributes.log_append_time());
        assert_eq!(attributes.0, 0x30);
        assert!(!attributes.with_control(false).control());
        assert_eq!(Attributes(0x0b).compression(), 3);
        assert!(Attributes(0x0b).log_append_time());
    }
}
