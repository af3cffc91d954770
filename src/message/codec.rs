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

//! Wire codec for v2 record batches.
//!
//! [`RecordBatchBuilder`] encodes the records of any [`RecordReader`] into one
//! batch, running them through [`for_each_record`] so offsets get assigned and
//! payloads released on the way.
//!
//! [`BatchDecoder`] goes the other direction: it copies a fetched chunk into a
//! pooled page, validates every batch in it and hands each one out as a
//! [`RecordBatch`] or [`ControlBatch`] whose keys and values are zero-copy
//! views onto the page.

use std::io::Cursor;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::Utc;
use integer_encoding::VarInt;
use tracing::{debug, trace};

use crate::message::batch::{BatchMetadata, ControlBatch, RecordBatch};
use crate::message::batch_header::BatchHeader;
use crate::message::constants::*;
use crate::message::finalize::for_each_record;
use crate::message::optimized::{OptimizedRecord, OptimizedRecordReader};
use crate::message::page::{Page, PagePool};
use crate::message::reader::RecordReader;
use crate::message::record::{Header, Record};
use crate::message::stream::RecordStream;
use crate::{global_config, AppError, AppResult};

/// Accumulates records into a single v2 batch.
#[derive(Debug)]
pub struct RecordBatchBuilder {
    buffer: BytesMut,
    metadata: BatchMetadata,
    base_timestamp: Option<i64>,
    max_timestamp: i64,
    last_offset_delta: i32,
    record_count: i32,
}

impl Default for RecordBatchBuilder {
    fn default() -> Self {
        Self::new(BatchMetadata::default())
    }
}

impl RecordBatchBuilder {
    pub fn new(metadata: BatchMetadata) -> Self {
        let mut builder = RecordBatchBuilder {
            buffer: BytesMut::with_capacity(RECORD_BATCH_OVERHEAD),
            metadata,
            base_timestamp: None,
            max_timestamp: NO_TIMESTAMP,
            last_offset_delta: -1,
            record_count: 0,
        };
        builder.initialize_buffer();
        builder
    }

    /// Writes the fixed header with placeholders, [`Self::build`] fills them in.
    fn initialize_buffer(&mut self) {
        self.buffer.put_i64(self.metadata.base_offset);
        self.buffer.put_i32(0); //length
        self.buffer.put_i32(self.metadata.partition_leader_epoch);
        self.buffer.put_i8(MAGIC);
        self.buffer.put_u32(0); //crc
        self.buffer.put_i16(self.metadata.attributes.0);
        self.buffer.put_i32(-1); //last offset delta
        self.buffer.put_i64(NO_TIMESTAMP); //first timestamp
        self.buffer.put_i64(NO_TIMESTAMP); //max timestamp
        self.buffer.put_i64(self.metadata.producer_id);
        self.buffer.put_i16(self.metadata.producer_epoch);
        self.buffer.put_i32(self.metadata.base_sequence);
        self.buffer.put_i32(0); //record count
    }

    pub fn metadata(&self) -> &BatchMetadata {
        &self.metadata
    }

    pub fn record_count(&self) -> i32 {
        self.record_count
    }

    /// Encodes one record. Its offset must not be below the batch base
    /// offset, a missing time is replaced by the current time.
    ///
    /// Key and value are read from their current position to the end.
    pub fn append_record(&mut self, record: &mut Record) -> AppResult<()> {
        let offset_delta = record
            .offset
            .checked_sub(self.metadata.base_offset)
            .and_then(|delta| i32::try_from(delta).ok())
            .filter(|delta| *delta >= 0)
            .ok_or_else(|| {
                AppError::InvalidValue(format!(
                    "record offset {} does not fit a batch based at {}",
                    record.offset, self.metadata.base_offset
                ))
            })?;

        let timestamp = record
            .time
            .map(|time| time.timestamp_millis())
            .unwrap_or_else(|| Utc::now().timestamp_millis());
        let base_timestamp = *self.base_timestamp.get_or_insert(timestamp);
        let timestamp_delta = timestamp.saturating_sub(base_timestamp);

        let key = record.key.as_mut().map(|key| key.read_full()).transpose()?;
        let value = record
            .value
            .as_mut()
            .map(|value| value.read_full())
            .transpose()?;

        let mut body = BytesMut::new();
        body.put_i8(0); // attributes
        body.put_slice(&timestamp_delta.encode_var_vec());
        body.put_slice(&offset_delta.encode_var_vec());
        put_nullable_bytes(&mut body, key.as_deref())?;
        put_nullable_bytes(&mut body, value.as_deref())?;
        body.put_slice(&length_field(record.headers.len())?.encode_var_vec());
        for header in &record.headers {
            put_nullable_bytes(&mut body, Some(header.key.as_bytes()))?;
            put_nullable_bytes(&mut body, header.value.as_deref())?;
        }

        self.buffer
            .put_slice(&length_field(body.len())?.encode_var_vec());
        self.buffer.put_slice(&body);

        self.max_timestamp = self.max_timestamp.max(timestamp);
        self.last_offset_delta = self.last_offset_delta.max(offset_delta);
        self.record_count += 1;
        Ok(())
    }

    /// Drains `reader` into the batch. Records without an offset take their
    /// position in the reader, every key and value is closed after encoding.
    pub fn append_reader<R: RecordReader + ?Sized>(&mut self, reader: &mut R) -> AppResult<()> {
        for_each_record(reader, |_, record| self.append_record(record))
    }

    /// Completes the batch and returns its wire bytes. The builder starts
    /// over with the same metadata afterwards.
    pub fn build(&mut self) -> Bytes {
        let length = (self.buffer.len() - LOG_OVERHEAD) as i32;
        let first_timestamp = self.base_timestamp.unwrap_or(NO_TIMESTAMP);

        put_at(&mut self.buffer, LENGTH_OFFSET, &length.to_be_bytes());
        put_at(
            &mut self.buffer,
            LAST_OFFSET_DELTA_OFFSET,
            &self.last_offset_delta.to_be_bytes(),
        );
        put_at(
            &mut self.buffer,
            FIRST_TIMESTAMP_OFFSET,
            &first_timestamp.to_be_bytes(),
        );
        put_at(
            &mut self.buffer,
            MAX_TIMESTAMP_OFFSET,
            &self.max_timestamp.to_be_bytes(),
        );
        put_at(
            &mut self.buffer,
            RECORDS_COUNT_OFFSET,
            &self.record_count.to_be_bytes(),
        );
        let crc = crc32c::crc32c(&self.buffer[ATTRIBUTES_OFFSET..]);
        put_at(&mut self.buffer, CRC_OFFSET, &crc.to_be_bytes());

        let batch = self.buffer.split().freeze();
        trace!(
            "built batch at offset {} with {} records, {} bytes",
            self.metadata.base_offset,
            self.record_count,
            batch.len()
        );

        self.base_timestamp = None;
        self.max_timestamp = NO_TIMESTAMP;
        self.last_offset_delta = -1;
        self.record_count = 0;
        self.initialize_buffer();
        batch
    }
}

fn put_at(buffer: &mut BytesMut, offset: usize, bytes: &[u8]) {
    buffer[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn length_field(len: usize) -> AppResult<i32> {
    i32::try_from(len).map_err(|_| AppError::MessageTooLarge(format!("field of {} bytes", len)))
}

fn put_nullable_bytes(buffer: &mut BytesMut, data: Option<&[u8]>) -> AppResult<()> {
    match data {
        Some(data) => {
            buffer.put_slice(&length_field(data.len())?.encode_var_vec());
            buffer.put_slice(data);
        }
        None => buffer.put_slice(&(-1i32).encode_var_vec()),
    }
    Ok(())
}

/// One decoded batch of a fetched chunk.
#[derive(Debug)]
pub enum DecodedBatch {
    Records(RecordBatch),
    Control(ControlBatch),
}

impl DecodedBatch {
    pub fn metadata(&self) -> &BatchMetadata {
        match self {
            DecodedBatch::Records(batch) => &batch.metadata,
            DecodedBatch::Control(batch) => &batch.metadata,
        }
    }

    pub fn into_reader(self) -> Box<dyn RecordReader> {
        match self {
            DecodedBatch::Records(batch) => Box::new(batch),
            DecodedBatch::Control(batch) => Box::new(batch),
        }
    }
}

/// Splits fetched bytes into validated batches backed by pooled pages.
#[derive(Debug, Clone)]
pub struct BatchDecoder {
    pool: PagePool,
    max_batch_size: usize,
}

impl BatchDecoder {
    /// Decoder whose batch size limit comes from the global configuration.
    pub fn new(pool: PagePool) -> Self {
        BatchDecoder {
            pool,
            max_batch_size: global_config().general.max_batch_size,
        }
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    pub fn pool(&self) -> &PagePool {
        &self.pool
    }

    /// Copies `wire` into a page from the pool and decodes it.
    pub fn decode(&self, wire: &[u8]) -> AppResult<Vec<DecodedBatch>> {
        let mut writer = self.pool.acquire();
        writer.extend_from_slice(wire);
        self.decode_page(&writer.freeze())
    }

    /// Decodes `wire` into a stream over its non-control records.
    pub fn decode_stream(&self, wire: &[u8]) -> AppResult<RecordStream> {
        let batches = self.decode(wire)?;
        Ok(RecordStream::new(
            batches.into_iter().map(DecodedBatch::into_reader).collect(),
        ))
    }

    /// Decodes every complete batch on `page`. A partial batch at the end of
    /// the page is left out, brokers cut fetch responses at any byte.
    ///
    /// # Arguments
    /// * `page` - A frozen page holding zero or more concatenated batches
    ///
    /// # Returns
    /// The batches in page order, each holding its own references on the page
    pub fn decode_page(&self, page: &Page) -> AppResult<Vec<DecodedBatch>> {
        let data = page.as_slice();
        let mut position = 0;
        let mut batches = vec![];

        while data.len() - position >= LOG_OVERHEAD {
            let mut cursor = Cursor::new(&data[position..]);
            let _base_offset = cursor.get_i64();
            let length = cursor.get_i32();
            if length < 0 {
                return Err(AppError::CorruptMessage(format!(
                    "negative batch length {} at byte {}",
                    length, position
                )));
            }
            let batch_size = LOG_OVERHEAD + length as usize;
            if batch_size > self.max_batch_size {
                return Err(AppError::MessageTooLarge(format!(
                    "batch size {} exceeds the maximum batch size {}",
                    batch_size, self.max_batch_size
                )));
            }
            if batch_size > data.len() - position {
                trace!(
                    "ignoring truncated batch at byte {}: {} of {} bytes",
                    position,
                    data.len() - position,
                    batch_size
                );
                break;
            }
            batches.push(self.decode_batch(page, position, batch_size)?);
            position += batch_size;
        }

        debug!("decoded {} batches from {} bytes", batches.len(), position);
        Ok(batches)
    }

    fn decode_batch(&self, page: &Page, start: usize, size: usize) -> AppResult<DecodedBatch> {
        let data = &page.as_slice()[start..start + size];
        if size < RECORD_BATCH_OVERHEAD {
            // old message sets are shorter than a v2 header
            let magic = data.get(RB_MAGIC_OFFSET).copied().unwrap_or_default() as i8;
            if magic < MAGIC {
                return Err(AppError::UnsupportedFormat(format!(
                    "message format v{}",
                    magic
                )));
            }
            return Err(AppError::CorruptMessage(format!(
                "batch size {} is less than the record batch overhead {}",
                size, RECORD_BATCH_OVERHEAD
            )));
        }
        let header = BatchHeader::parse(data)?;
        if header.magic != MAGIC {
            return Err(AppError::UnsupportedFormat(format!(
                "message format v{}",
                header.magic
            )));
        }

        let crc = crc32c::crc32c(&data[ATTRIBUTES_OFFSET..]);
        if crc != header.crc {
            return Err(AppError::CorruptMessage(format!(
                "CRC mismatch: expected {}, but found {}",
                crc, header.crc
            )));
        }

        let attributes = header.attributes();
        if attributes.compression() != 0 {
            return Err(AppError::UnsupportedFormat(format!(
                "compression codec {}",
                attributes.compression()
            )));
        }
        if header.records_count < 0 {
            return Err(AppError::CorruptMessage(format!(
                "Record count should be non-negative, but found {}",
                header.records_count
            )));
        }

        let mut wire = WireCursor {
            data,
            position: RECORDS_OFFSET,
        };
        // the smallest record takes seven bytes
        let room = (size - RECORDS_OFFSET) / 7;
        let mut records = Vec::with_capacity((header.records_count as usize).min(room));
        for _ in 0..header.records_count {
            records.push(wire.record(&header, page, start)?);
        }
        if wire.position != data.len() {
            return Err(AppError::CorruptMessage(format!(
                "{} trailing bytes after the last record",
                data.len() - wire.position
            )));
        }

        let metadata = BatchMetadata::from(&header);
        let reader = Box::new(OptimizedRecordReader::new(records));
        trace!("decoded batch {}", header);
        Ok(if attributes.control() {
            DecodedBatch::Control(ControlBatch::new(metadata, reader))
        } else {
            DecodedBatch::Records(RecordBatch::new(metadata, reader))
        })
    }
}

/// Decodes `wire` with the batch size limit from the global configuration.
pub fn decode_record_stream(pool: &PagePool, wire: &[u8]) -> AppResult<RecordStream> {
    BatchDecoder::new(pool.clone()).decode_stream(wire)
}

/// Read position inside a single batch.
struct WireCursor<'a> {
    data: &'a [u8],
    position: usize,
}

impl WireCursor<'_> {
    fn record(
        &mut self,
        header: &BatchHeader,
        page: &Page,
        page_offset: usize,
    ) -> AppResult<OptimizedRecord> {
        let length = self.varint::<i32>()?;
        let end = usize::try_from(length)
            .ok()
            .and_then(|length| self.position.checked_add(length))
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| AppError::CorruptMessage(format!("invalid record length {}", length)))?;

        let _attributes = self.take(1)?;
        let timestamp_delta = self.varint::<i64>()?;
        let offset_delta = self.varint::<i32>()?;
        let key = self
            .nullable_range()?
            .map(|(offset, len)| page.slice(page_offset + offset, len))
            .transpose()?;
        let value = self
            .nullable_range()?
            .map(|(offset, len)| page.slice(page_offset + offset, len))
            .transpose()?;

        // -1 is a null header array
        let header_count = self.varint::<i32>()?;
        if header_count < -1 {
            return Err(AppError::CorruptMessage(format!(
                "invalid header count {}",
                header_count
            )));
        }
        // every header takes at least two bytes
        let room = end.saturating_sub(self.position) / 2;
        let mut headers = Vec::with_capacity((header_count.max(0) as usize).min(room));
        for _ in 0..header_count {
            let Some((offset, len)) = self.nullable_range()? else {
                return Err(AppError::CorruptMessage("null header key".to_string()));
            };
            let key = String::from_utf8(self.data[offset..offset + len].to_vec()).map_err(|e| {
                AppError::CorruptMessage(format!("header key is not utf-8: {}", e))
            })?;
            let value = self
                .nullable_range()?
                .map(|(offset, len)| Bytes::copy_from_slice(&self.data[offset..offset + len]));
            headers.push(Header { key, value });
        }

        if self.position != end {
            return Err(AppError::CorruptMessage(format!(
                "record length {} does not match its content",
                length
            )));
        }

        let timestamp = if header.first_timestamp == NO_TIMESTAMP {
            NO_TIMESTAMP
        } else {
            header.first_timestamp.wrapping_add(timestamp_delta)
        };
        Ok(OptimizedRecord::new(
            header.first_offset.wrapping_add(offset_delta as i64),
            timestamp,
            key,
            value,
            headers,
        ))
    }

    fn varint<V: VarInt>(&mut self) -> AppResult<V> {
        let (value, read) = V::decode_var(&self.data[self.position..]).ok_or_else(|| {
            AppError::CorruptMessage(format!("bad varint at byte {}", self.position))
        })?;
        self.position += read;
        Ok(value)
    }

    /// Advances over `len` bytes and returns where they start.
    fn take(&mut self, len: usize) -> AppResult<usize> {
        let start = self.position;
        if self.data.len() - start < len {
            return Err(AppError::CorruptMessage(format!(
                "need {} bytes at byte {}, batch ends at {}",
                len,
                start,
                self.data.len()
            )));
        }
        self.position += len;
        Ok(start)
    }

    /// Length-prefixed bytes, `None` for the null length -1.
    fn nullable_range(&mut self) -> AppResult<Option<(usize, usize)>> {
        let len = self.varint::<i32>()?;
        if len == -1 {
            return Ok(None);
        }
        if len < 0 {
            return Err(AppError::CorruptMessage(format!("invalid length {}", len)));
        }
        let offset = self.take(len as usize)?;
        Ok(Some((offset, len as usize)))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::message::batch_header::Attributes;
    use crate::message::control::ControlRecord;
    use crate::message::payload::Payload;
    use crate::message::reader::tests::{drain, record};
    use crate::message::reader::{new_record_reader, reset_record_reader};
    use crate::message::record::make_time;

    fn pool() -> PagePool {
        PagePool::new(1024, 4)
    }

    fn encode(base_offset: i64, values: &[&'static str]) -> Bytes {
        let mut builder = RecordBatchBuilder::new(BatchMetadata {
            base_offset,
            ..BatchMetadata::default()
        });
        let mut reader = new_record_reader(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    record(base_offset + i as i64, *v).with_time(make_time(1_000 + i as i64).unwrap())
                })
                .collect(),
        );
        builder.append_reader(reader.as_mut()).unwrap();
        builder.build()
    }

    #[test]
    fn test_build_writes_header() {
        let batch = encode(10, &["a", "b", "c"]);
        let header = BatchHeader::parse(&batch).unwrap();
        assert_eq!(header.first_offset, 10);
        assert_eq!(header.length as usize, batch.len() - LOG_OVERHEAD);
        assert_eq!(header.magic, MAGIC);
        assert_eq!(header.last_offset_delta, 2);
        assert_eq!(header.first_timestamp, 1_000);
        assert_eq!(header.max_timestamp, 1_002);
        assert_eq!(header.records_count, 3);
        assert_eq!(header.crc, crc32c::crc32c(&batch[ATTRIBUTES_OFFSET..]));
    }

    #[test]
    fn test_builder_starts_over_after_build() {
        let mut builder = RecordBatchBuilder::default();
        builder
            .append_record(&mut Record::new(None, Some(Payload::from("x"))))
            .unwrap();
        let first = builder.build();
        assert_eq!(builder.record_count(), 0);
        let empty = builder.build();
        assert!(empty.len() < first.len());
        assert_eq!(BatchHeader::parse(&empty).unwrap().records_count, 0);
    }

    #[test]
    fn test_offset_below_base_rejected() {
        let mut builder = RecordBatchBuilder::new(BatchMetadata {
            base_offset: 5,
            ..BatchMetadata::default()
        });
        let err = builder.append_record(&mut record(4, "x")).unwrap_err();
        assert!(matches!(err, AppError::InvalidValue(_)));
    }

    #[test]
    fn test_decode_records_and_headers() {
        let mut builder = RecordBatchBuilder::new(BatchMetadata {
            base_offset: 100,
            ..BatchMetadata::default()
        });
        let mut with_headers = Record::new(Some(Payload::from("k")), Some(Payload::from("v")))
            .with_offset(100)
            .with_time(make_time(42).unwrap())
            .with_headers(vec![Header::new("trace", b"abc")]);
        builder.append_record(&mut with_headers).unwrap();
        let mut nulls = Record::new(None, None).with_offset(101);
        builder.append_record(&mut nulls).unwrap();
        let wire = builder.build();

        let pool = pool();
        let decoder = BatchDecoder::new(pool.clone());
        let mut batches = decoder.decode(&wire).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].metadata().base_offset, 100);

        let mut reader = batches.remove(0).into_reader();
        let first = reader.read_record().unwrap().unwrap();
        assert_eq!(first.offset, 100);
        assert_eq!(first.timestamp_millis(), 42);
        assert_eq!(first.key.as_mut().unwrap().read_full().unwrap(), b"k");
        assert_eq!(first.value.as_mut().unwrap().read_full().unwrap(), b"v");
        assert_eq!(first.headers, vec![Header::new("trace", b"abc")]);

        let second = reader.read_record().unwrap().unwrap();
        assert_eq!(second.offset, 101);
        assert!(second.key.is_none());
        assert!(second.value.is_none());
        assert!(second.headers.is_empty());

        assert!(reader.read_record().unwrap().is_none());
        assert_eq!(pool.outstanding(), 1);
        drop(reader);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_decode_concatenated_batches_and_truncated_tail() {
        let mut wire = BytesMut::new();
        wire.put_slice(&encode(0, &["a", "b"]));
        wire.put_slice(&encode(2, &["c"]));
        let third = encode(3, &["d"]);
        wire.put_slice(&third[..third.len() - 3]);

        let decoder = BatchDecoder::new(pool());
        let mut stream = decoder.decode_stream(&wire).unwrap();
        assert_eq!(stream.records.len(), 2);
        assert_eq!(drain(&mut stream), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_control_batch_decoded() {
        let mut marker = ControlRecord::new(0, CONTROL_TYPE_COMMIT, vec![]);
        marker.time = make_time(5_000);
        let mut builder = RecordBatchBuilder::new(BatchMetadata {
            attributes: Attributes::default()
                .with_control(true)
                .with_transactional(true),
            producer_id: 7,
            ..BatchMetadata::default()
        });
        builder.append_record(&mut marker.to_record()).unwrap();
        let wire = builder.build();

        let decoder = BatchDecoder::new(pool());
        let batches = decoder.decode(&wire).unwrap();
        let DecodedBatch::Control(mut control) = batches.into_iter().next().unwrap() else {
            panic!("expected a control batch");
        };
        assert_eq!(control.metadata.producer_id, 7);
        assert!(control.metadata.attributes.transactional());
        assert_eq!(control.read_control_record().unwrap().unwrap(), marker);
        assert!(control.read_control_record().unwrap().is_none());
    }

    #[test]
    fn test_decoded_reset_discards() {
        let pool = pool();
        let decoder = BatchDecoder::new(pool.clone());
        let mut reader = decoder
            .decode(&encode(0, &["a", "b"]))
            .unwrap()
            .remove(0)
            .into_reader();
        assert_eq!(drain(&mut reader), vec!["a", "b"]);
        reset_record_reader(reader.as_mut()).unwrap();
        assert!(reader.read_record().unwrap().is_none());
        assert_eq!(pool.outstanding(), 0);
    }

    /// Record with null key and value followed by the raw `headers` bytes.
    fn record_body(headers: &[u8]) -> Vec<u8> {
        let mut body = vec![0u8];
        body.extend_from_slice(&0i64.encode_var_vec());
        body.extend_from_slice(&0i32.encode_var_vec());
        body.extend_from_slice(&(-1i32).encode_var_vec());
        body.extend_from_slice(&(-1i32).encode_var_vec());
        body.extend_from_slice(headers);
        body
    }

    /// Valid single record batch around `body`, length and CRC fixed up.
    fn raw_batch(body: &[u8]) -> Vec<u8> {
        let mut wire = RecordBatchBuilder::default().build().to_vec();
        wire.extend_from_slice(&(body.len() as i32).encode_var_vec());
        wire.extend_from_slice(body);
        let length = (wire.len() - LOG_OVERHEAD) as i32;
        wire[LENGTH_OFFSET..LENGTH_OFFSET + 4].copy_from_slice(&length.to_be_bytes());
        wire[RECORDS_COUNT_OFFSET..RECORDS_COUNT_OFFSET + 4].copy_from_slice(&1i32.to_be_bytes());
        let crc = crc32c::crc32c(&wire[ATTRIBUTES_OFFSET..]);
        wire[CRC_OFFSET..CRC_OFFSET + CRC_LENGTH].copy_from_slice(&crc.to_be_bytes());
        wire
    }

    fn header_bytes(count: i32, fields: &[Option<&[u8]>]) -> Vec<u8> {
        let mut bytes = count.encode_var_vec();
        for field in fields {
            match field {
                Some(data) => {
                    bytes.extend_from_slice(&(data.len() as i32).encode_var_vec());
                    bytes.extend_from_slice(data);
                }
                None => bytes.extend_from_slice(&(-1i32).encode_var_vec()),
            }
        }
        bytes
    }

    #[rstest]
    #[case::huge_count(header_bytes(i32::MAX, &[]))]
    #[case::negative_count(header_bytes(-2, &[]))]
    #[case::null_key(header_bytes(1, &[None, Some(&b"v"[..])]))]
    #[case::count_beyond_content(header_bytes(3, &[Some(&b"k"[..]), None]))]
    fn test_bad_headers_rejected(#[case] headers: Vec<u8>) {
        let pool = pool();
        let wire = raw_batch(&record_body(&headers));
        let err = BatchDecoder::new(pool.clone()).decode(&wire).unwrap_err();
        assert!(matches!(err, AppError::CorruptMessage(_)));
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_inflated_record_count_rejected() {
        let mut wire = encode(0, &["a"]).to_vec();
        wire[RECORDS_COUNT_OFFSET..RECORDS_COUNT_OFFSET + 4]
            .copy_from_slice(&i32::MAX.to_be_bytes());
        let crc = crc32c::crc32c(&wire[ATTRIBUTES_OFFSET..]);
        wire[CRC_OFFSET..CRC_OFFSET + CRC_LENGTH].copy_from_slice(&crc.to_be_bytes());
        let err = BatchDecoder::new(pool()).decode(&wire).unwrap_err();
        assert!(matches!(err, AppError::CorruptMessage(_)));
    }

    #[test]
    fn test_null_header_array_decodes_empty() {
        let wire = raw_batch(&record_body(&header_bytes(-1, &[])));
        let mut reader = BatchDecoder::new(pool())
            .decode(&wire)
            .unwrap()
            .remove(0)
            .into_reader();
        assert!(reader.read_record().unwrap().unwrap().headers.is_empty());
    }

    #[test]
    fn test_null_header_value_survives_reencode() {
        let headers = header_bytes(2, &[Some(&b"h"[..]), None, Some(&b"e"[..]), Some(&b""[..])]);
        let wire = raw_batch(&record_body(&headers));

        let mut reader = BatchDecoder::new(pool())
            .decode(&wire)
            .unwrap()
            .remove(0)
            .into_reader();
        assert_eq!(
            reader.read_record().unwrap().unwrap().headers,
            vec![Header::null("h"), Header::new("e", b"")]
        );

        let mut reader = BatchDecoder::new(pool())
            .decode(&wire)
            .unwrap()
            .remove(0)
            .into_reader();
        let mut builder = RecordBatchBuilder::default();
        builder.append_reader(reader.as_mut()).unwrap();
        let rebuilt = builder.build();
        assert_eq!(&rebuilt[RECORDS_OFFSET..], &wire[RECORDS_OFFSET..]);
    }

    #[rstest]
    #[case::crc(CRC_OFFSET, 0xff)]
    #[case::record_body(RECORDS_OFFSET + 1, 0x7f)]
    fn test_corrupt_batch_rejected(#[case] at: usize, #[case] flip: u8) {
        let mut wire = encode(0, &["hello"]).to_vec();
        wire[at] ^= flip;
        let err = BatchDecoder::new(pool()).decode(&wire).unwrap_err();
        assert!(matches!(err, AppError::CorruptMessage(_)));
    }

    #[rstest]
    #[case::old_magic(RB_MAGIC_OFFSET, MAGIC_V1 as u8)]
    #[case::compressed(ATTRIBUTES_OFFSET + 1, 0x01)]
    fn test_unsupported_batch_rejected(#[case] at: usize, #[case] byte: u8) {
        let mut wire = encode(0, &["hello"]).to_vec();
        wire[at] = byte;
        let crc = crc32c::crc32c(&wire[ATTRIBUTES_OFFSET..]);
        wire[CRC_OFFSET..CRC_OFFSET + CRC_LENGTH].copy_from_slice(&crc.to_be_bytes());
        let err = BatchDecoder::new(pool()).decode(&wire).unwrap_err();
        assert!(matches!(err, AppError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_oversized_batch_rejected() {
        let wire = encode(0, &["hello"]);
        let decoder = BatchDecoder::new(pool()).with_max_batch_size(wire.len() - 1);
        let err = decoder.decode(&wire).unwrap_err();
        assert!(matches!(err, AppError::MessageTooLarge(_)));
    }

    #[test]
    fn test_decode_record_stream_skips_control() {
        let mut builder = RecordBatchBuilder::new(BatchMetadata {
            attributes: Attributes::default().with_control(true),
            ..BatchMetadata::default()
        });
        builder
            .append_record(&mut ControlRecord::new(0, CONTROL_TYPE_ABORT, vec![]).to_record())
            .unwrap();
        let mut wire = builder.build().to_vec();
        wire.extend_from_slice(&encode(1, &["after"]));

        let mut stream = decode_record_stream(&pool(), &wire).unwrap();
        assert_eq!(drain(&mut stream), vec!["after"]);
    }

    #[test]
    fn test_empty_and_short_input() {
        let pool = pool();
        let decoder = BatchDecoder::new(pool.clone());
        assert!(decoder.decode(&[]).unwrap().is_empty());
        assert!(decoder.decode(&[0; LOG_OVERHEAD - 1]).unwrap().is_empty());
        assert_eq!(pool.outstanding(), 0);
    }
}
