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

use std::fmt::{Debug, Formatter};
use std::io::Read;

use bytes::Bytes;

use crate::message::page::PageRef;
use crate::{AppError, AppResult};

enum Source {
    Memory(Bytes),
    Page(PageRef),
    /// One-shot reader, `None` once closed.
    Stream(Option<Box<dyn Read + Send>>),
}

/// Key or value bytes of a record.
///
/// A payload is read front to back and released with [`Payload::close`].
/// In-memory and page-backed payloads can be rewound with
/// [`Payload::reopen`]; payloads streamed from a reader cannot, and say so with
/// [`AppError::NoReset`].
pub struct Payload {
    source: Source,
    position: usize,
    closed: bool,
}

impl Debug for Payload {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.source {
            Source::Memory(_) => "memory",
            Source::Page(_) => "page",
            Source::Stream(_) => "stream",
        };
        f.debug_struct("Payload")
            .field("source", &kind)
            .field("position", &self.position)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Payload {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self::with_source(Source::Memory(data.into()))
    }

    /// View onto a pooled page. Closing it leaves the page reference alone,
    /// the reference is released when the payload itself is dropped.
    pub fn from_page(page_ref: PageRef) -> Self {
        Self::with_source(Source::Page(page_ref))
    }

    /// Payload produced by a reader. It can be read once and never reopened.
    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        Self::with_source(Source::Stream(Some(Box::new(reader))))
    }

    fn with_source(source: Source) -> Self {
        Payload {
            source,
            position: 0,
            closed: false,
        }
    }

    fn full(&self) -> Option<&[u8]> {
        match &self.source {
            Source::Memory(bytes) => Some(bytes.as_ref()),
            Source::Page(page_ref) => Some(page_ref.as_slice()),
            Source::Stream(_) => None,
        }
    }

    /// Unread bytes, when they are addressable without consuming a stream.
    pub fn as_slice(&self) -> Option<&[u8]> {
        if self.closed {
            return None;
        }
        self.full().map(|data| &data[self.position..])
    }

    /// Number of unread bytes, unknown for streamed payloads.
    pub fn remaining(&self) -> Option<usize> {
        self.as_slice().map(|data| data.len())
    }

    pub fn is_replayable(&self) -> bool {
        !matches!(self.source, Source::Stream(_))
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Reads every remaining byte into an owned buffer.
    pub fn read_full(&mut self) -> AppResult<Vec<u8>> {
        if self.closed {
            return Err(AppError::IllegalState(
                "read from a closed payload".to_string(),
            ));
        }
        let mut buf = Vec::with_capacity(self.remaining().unwrap_or(0));
        self.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Releases the payload. Calling it again is a no-op.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Source::Stream(reader) = &mut self.source {
            reader.take();
        }
    }

    /// Rewinds to the first byte and clears a previous close.
    pub fn reopen(&mut self) -> AppResult<()> {
        if !self.is_replayable() {
            return Err(AppError::NoReset);
        }
        self.position = 0;
        self.closed = false;
        Ok(())
    }
}

impl Read for Payload {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.closed {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "read from a closed payload",
            ));
        }
        let n = match &mut self.source {
            Source::Stream(Some(reader)) => reader.read(buf)?,
            Source::Stream(None) => 0,
            Source::Memory(bytes) => copy_unread(bytes.as_ref(), self.position, buf),
            Source::Page(page_ref) => copy_unread(page_ref.as_slice(), self.position, buf),
        };
        self.position += n;
        Ok(n)
    }
}

fn copy_unread(data: &[u8], position: usize, buf: &mut [u8]) -> usize {
    let unread = &data[position.min(data.len())..];
    let n = unread.len().min(buf.len());
    buf[..n].copy_from_slice(&unread[..n]);
    n
}

impl From<&'static [u8]> for Payload {
    fn from(value: &'static [u8]) -> Self {
        Payload::new(value)
    }
}

impl From<&'static str> for Payload {
    fn from(value: &'static str) -> Self {
        Payload::new(value.as_bytes())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::new(value)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::message::page::PagePool;

    struct CountingReader {
        inner: Cursor<Vec<u8>>,
        drops: Arc<AtomicUsize>,
    }

    impl Read for CountingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Drop for CountingReader {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "peer reset",
            ))
        }
    }

    #[test]
    fn test_memory_payload_read_and_reopen() {
        let mut payload = Payload::from("hello");
        assert_eq!(payload.remaining(), Some(5));
        assert_eq!(payload.read_full().unwrap(), b"hello");
        assert_eq!(payload.read_full().unwrap(), b"");

        payload.close();
        assert!(payload.is_closed());
        assert!(matches!(
            payload.read_full(),
            Err(AppError::IllegalState(_))
        ));

        payload.reopen().unwrap();
        assert_eq!(payload.read_full().unwrap(), b"hello");
    }

    #[test]
    fn test_page_payload_reads_range() {
        let pool = PagePool::new(64, 2);
        let mut writer = pool.acquire();
        writer.extend_from_slice(b"xxpayloadxx");
        let page = writer.freeze();
        let mut payload = Payload::from_page(page.slice(2, 7).unwrap());
        drop(page);

        assert_eq!(payload.as_slice(), Some(&b"payload"[..]));
        assert_eq!(payload.read_full().unwrap(), b"payload");
        payload.close();
        assert_eq!(pool.outstanding(), 1);
        payload.reopen().unwrap();
        assert_eq!(payload.read_full().unwrap(), b"payload");

        drop(payload);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_stream_payload_closes_once_and_cannot_reopen() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut payload = Payload::from_reader(CountingReader {
            inner: Cursor::new(b"streamed".to_vec()),
            drops: Arc::clone(&drops),
        });
        assert_eq!(payload.remaining(), None);
        assert!(!payload.is_replayable());
        assert_eq!(payload.read_full().unwrap(), b"streamed");

        payload.close();
        payload.close();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(payload.reopen().unwrap_err().is_no_reset());
        drop(payload);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stream_error_is_propagated() {
        let mut payload = Payload::from_reader(FailingReader);
        let err = payload.read_full().unwrap_err();
        match err {
            AppError::IoError(e) => assert_eq!(e.kind(), std::io::ErrorKind::ConnectionReset),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
