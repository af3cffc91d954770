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

use crate::message::constants::UNASSIGNED_OFFSET;
use crate::message::reader::RecordReader;
use crate::message::record::Record;
use crate::AppResult;

/// Drives `reader` to the end, handing each record to `f` with its position
/// in this pass.
///
/// For every record:
/// - an offset of [`UNASSIGNED_OFFSET`] is replaced by the record's position,
/// - key and value are closed once `f` returns, key first, whether `f`
///   succeeded or not,
/// - an error from `f` stops the pass right away.
///
/// A record at position 0 whose real offset is 0 cannot be told apart from an
/// unassigned one, both end up with offset 0.
pub fn for_each_record<R, F>(reader: &mut R, mut f: F) -> AppResult<()>
where
    R: RecordReader + ?Sized,
    F: FnMut(usize, &mut Record) -> AppResult<()>,
{
    let mut index = 0;
    while let Some(record) = reader.read_record()? {
        handle_record(index, record, &mut f)?;
        index += 1;
    }
    Ok(())
}

fn handle_record<F>(index: usize, record: &mut Record, f: &mut F) -> AppResult<()>
where
    F: FnMut(usize, &mut Record) -> AppResult<()>,
{
    if record.offset == UNASSIGNED_OFFSET {
        record.offset = index as i64;
    }
    let result = f(index, record);
    if let Some(key) = record.key.as_mut() {
        key.close();
    }
    if let Some(value) = record.value.as_mut() {
        value.close();
    }
    result
}
