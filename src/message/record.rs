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

use chrono::{DateTime, TimeZone, Utc};
use integer_encoding::VarInt;

use crate::message::constants::UNASSIGNED_OFFSET;
use crate::message::payload::Payload;

/// A single message.
///
/// Records handed out by a reader borrow the reader and stay valid until the
/// next read. Copy key and value out before advancing if they must outlive
/// that.
#[derive(Debug, Default)]
pub struct Record {
    pub offset: i64,
    pub time: Option<DateTime<Utc>>,
    pub key: Option<Payload>,
    pub value: Option<Payload>,
    pub headers: Vec<Header>,
}

impl Record {
    pub fn new(key: Option<Payload>, value: Option<Payload>) -> Self {
        Record {
            offset: UNASSIGNED_OFFSET,
            time: None,
            key,
            value,
            headers: vec![],
        }
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_headers(mut self, headers: Vec<Header>) -> Self {
        self.headers = headers;
        self
    }

    /// Milliseconds since the epoch, or `-1` when the record has no time.
    pub fn timestamp_millis(&self) -> i64 {
        self.time
            .map(|t| t.timestamp_millis())
            .unwrap_or(crate::message::constants::NO_TIMESTAMP)
    }
}

/// Record header. A `None` value is the null value, distinct from an empty one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub key: String,
    pub value: Option<bytes::Bytes>,
}

impl Header {
    pub fn new<T: AsRef<[u8]>>(key: impl Into<String>, value: T) -> Header {
        Header {
            key: key.into(),
            value: Some(bytes::Bytes::copy_from_slice(value.as_ref())),
        }
    }

    pub fn null(key: impl Into<String>) -> Header {
        Header {
            key: key.into(),
            value: None,
        }
    }

    /// Encoded size inside a v2 record: zig-zag varint lengths plus the bytes.
    pub fn size(&self) -> usize {
        let value_size = match &self.value {
            Some(value) => (value.len() as i32).required_space() + value.len(),
            None => (-1i32).required_space(),
        };
        (self.key.len() as i32).required_space() + self.key.len() + value_size
    }
}

/// Converts a wire timestamp in milliseconds. Zero and negative values mean
/// the record carries no time.
pub fn make_time(timestamp: i64) -> Option<DateTime<Utc>> {
    if timestamp <= 0 {
        return None;
    }
    Utc.timestamp_millis_opt(timestamp).single()
}
