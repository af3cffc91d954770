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

//! Message Format Constants
//!
//! Offsets and lengths of the v2 record batch header, attribute bits, and the
//! sentinel values shared by the readers and the batch codec.
//!
//! # Batch Format
//!
//! The record batch format includes:
//! - Base offset (8 bytes)
//! - Length (4 bytes)
//! - Partition leader epoch (4 bytes)
//! - Magic byte (1 byte)
//! - CRC (4 bytes)
//! - Attributes (2 bytes)
//! - Last offset delta (4 bytes)
//! - First timestamp (8 bytes)
//! - Max timestamp (8 bytes)
//! - Producer ID (8 bytes)
//! - Producer epoch (2 bytes)
//! - Base sequence (4 bytes)
//! - Record count (4 bytes)
//! - Records (variable length)

/// Base offset plus length field, the bytes not counted by the length.
pub const LOG_OVERHEAD: usize = 12;

// Record batch field offsets, the layout above in byte positions
pub const LENGTH_OFFSET: usize = 8;
pub const RB_MAGIC_OFFSET: usize = 16;
pub const CRC_OFFSET: usize = 17;
pub const CRC_LENGTH: usize = 4;
pub const ATTRIBUTES_OFFSET: usize = CRC_OFFSET + CRC_LENGTH;
pub const LAST_OFFSET_DELTA_OFFSET: usize = 23;
pub const FIRST_TIMESTAMP_OFFSET: usize = 27;
pub const MAX_TIMESTAMP_OFFSET: usize = 35;
pub const RECORDS_COUNT_OFFSET: usize = 57;
pub const RECORDS_OFFSET: usize = RECORDS_COUNT_OFFSET + 4;
pub const RECORD_BATCH_OVERHEAD: usize = RECORDS_OFFSET;

// Attribute bits
pub const COMPRESSION_CODEC_MASK: i16 = 0x07;
pub const TIMESTAMP_TYPE_MASK: i16 = 0x08;
pub const TRANSACTIONAL_FLAG_MASK: i16 = 0x10;
pub const CONTROL_FLAG_MASK: i16 = 0x20;

// Special values and defaults

/// Magic value of v2 record batches
pub const MAGIC: i8 = 2;
/// Magic value of v1 message sets
pub const MAGIC_V1: i8 = 1;
/// Special value indicating no producer ID
pub const NO_PRODUCER_ID: i64 = -1;
/// Special value indicating no producer epoch
pub const NO_PRODUCER_EPOCH: i16 = -1;
/// Special value indicating no sequence number
pub const NO_SEQUENCE: i32 = -1;
/// Special value indicating no partition leader epoch
pub const NO_PARTITION_LEADER_EPOCH: i32 = -1;
/// Special value indicating no timestamp
pub const NO_TIMESTAMP: i64 = -1;
/// Default attributes value
pub const ATTRIBUTES: i16 = 0;
/// Offset value a reader hands out for a record nobody assigned an offset to
pub const UNASSIGNED_OFFSET: i64 = 0;

/// Size of a control record key: version (i16) + type (i16)
pub const CONTROL_KEY_LENGTH: usize = 4;
pub const CONTROL_TYPE_ABORT: i16 = 0;
pub const CONTROL_TYPE_COMMIT: i16 = 1;
