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

use bytes::{Buf, BufMut};
use chrono::{DateTime, Utc};

use crate::message::constants::{CONTROL_KEY_LENGTH, CONTROL_TYPE_ABORT, CONTROL_TYPE_COMMIT};
use crate::message::payload::Payload;
use crate::message::record::{Header, Record};
use crate::{AppError, AppResult};

/// A record read from a control batch, such as a transaction marker.
///
/// On the wire the key is always 4 bytes, version then type, both big endian
/// i16. The value is carried through as opaque data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRecord {
    pub offset: i64,
    pub time: Option<DateTime<Utc>>,
    pub version: i16,
    pub control_type: i16,
    pub data: Vec<u8>,
    pub headers: Vec<Header>,
}

impl ControlRecord {
    pub fn new(version: i16, control_type: i16, data: Vec<u8>) -> Self {
        ControlRecord {
            offset: 0,
            time: None,
            version,
            control_type,
            data,
            headers: vec![],
        }
    }

    pub fn is_abort(&self) -> bool {
        self.control_type == CONTROL_TYPE_ABORT
    }

    pub fn is_commit(&self) -> bool {
        self.control_type == CONTROL_TYPE_COMMIT
    }

    /// Decodes a raw record. Key and value are read in full; the caller still
    /// owns and releases them.
    pub fn decode(record: &mut Record) -> AppResult<ControlRecord> {
        let key = match record.key.as_mut() {
            Some(key) => key.read_full()?,
            None => {
                return Err(AppError::MalformedControlRecord(
                    "invalid control record with nil key".to_string(),
                ))
            }
        };
        if key.len() != CONTROL_KEY_LENGTH {
            return Err(AppError::MalformedControlRecord(format!(
                "invalid control record with key of size {}",
                key.len()
            )));
        }

        let data = match record.value.as_mut() {
            Some(value) => value.read_full()?,
            None => vec![],
        };

        let mut key = key.as_slice();
        Ok(ControlRecord {
            offset: record.offset,
            time: record.time,
            version: key.get_i16(),
            control_type: key.get_i16(),
            data,
            headers: record.headers.clone(),
        })
    }

    pub fn key(&self) -> Payload {
        let mut key = Vec::with_capacity(CONTROL_KEY_LENGTH);
        key.put_i16(self.version);
        key.put_i16(self.control_type);
        Payload::new(key)
    }

    pub fn value(&self) -> Payload {
        Payload::new(self.data.clone())
    }

    pub fn to_record(&self) -> Record {
        Record {
            offset: self.offset,
            time: self.time,
            key: Some(self.key()),
            value: Some(self.value()),
            headers: self.headers.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;
    use rstest::rstest;

    use super::*;
    use crate::message::record::make_time;

    #[rstest]
    #[case(0, CONTROL_TYPE_ABORT, vec![])]
    #[case(0, CONTROL_TYPE_COMMIT, vec![0, 0, 0, 5])]
    #[case(i16::MAX, i16::MIN, b"opaque".to_vec())]
    #[case(-1, -1, vec![0xff; 300])]
    fn test_round_trip(#[case] version: i16, #[case] control_type: i16, #[case] data: Vec<u8>) {
        let mut control = ControlRecord::new(version, control_type, data);
        control.offset = 42;
        control.time = make_time(1_600_000_000_000);
        control.headers = vec![Header::new("txn", b"1")];

        let mut record = control.to_record();
        let decoded = ControlRecord::decode(&mut record).unwrap();
        assert_eq!(decoded, control);
    }

    #[test]
    fn test_random_round_trip() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let len = rng.gen_range(0..64);
            let data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let control = ControlRecord::new(rng.gen(), rng.gen(), data);
            let decoded = ControlRecord::decode(&mut control.to_record()).unwrap();
            assert_eq!(decoded.version, control.version);
            assert_eq!(decoded.control_type, control.control_type);
            assert_eq!(decoded.data, control.data);
        }
    }

    #[test]
    fn test_key_layout() {
        let control = ControlRecord::new(1, CONTROL_TYPE_COMMIT, vec![]);
        assert_eq!(control.key().read_full().unwrap(), vec![0, 1, 0, 1]);
        assert!(control.is_commit());
        assert!(!control.is_abort());
    }

    #[test]
    fn test_nil_key_is_format_error() {
        let mut record = Record::new(None, Some(Payload::from("v")));
        let err = ControlRecord::decode(&mut record).unwrap_err();
        assert!(err.is_format_error());
    }

    #[rstest]
    #[case(vec![])]
    #[case(vec![0])]
    #[case(vec![0, 0, 1])]
    #[case(vec![0, 0, 0, 1, 0])]
    #[case(vec![0; 64])]
    fn test_wrong_key_size_is_format_error(#[case] key: Vec<u8>) {
        let mut record = Record::new(Some(Payload::from(key.clone())), None);
        match ControlRecord::decode(&mut record) {
            Err(AppError::MalformedControlRecord(msg)) => {
                assert!(msg.contains(&key.len().to_string()))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_missing_value_decodes_as_empty_data() {
        let mut record = Record::new(Some(Payload::from(vec![0, 0, 0, 0])), None);
        let decoded = ControlRecord::decode(&mut record).unwrap();
        assert!(decoded.is_abort());
        assert!(decoded.data.is_empty());
    }
}
