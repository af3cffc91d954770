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

//! Pooled pages backing zero-copy record views.
//!
//! A [`PagePool`] hands out [`PageWriter`]s which the network side fills and
//! freezes into an immutable [`Page`]. Records decoded from the page hold
//! [`PageRef`]s, each one a counted reference plus a byte range. The count is
//! the `Arc` strong count: cloning a `PageRef` increments it, dropping one
//! decrements it, so a reference can only be released once. When the last
//! reference goes away the page buffer is handed back to the pool.
//!
//! Pages keep their pool alive, the pool is torn down only after every page
//! it handed out has been returned.

use std::fmt::{Debug, Formatter};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::service::PoolConfig;
use crate::{AppError, AppResult};

struct PoolInner {
    page_size: usize,
    max_free_pages: usize,
    free: Mutex<Vec<Vec<u8>>>,
    outstanding: AtomicUsize,
}

impl PoolInner {
    fn release(&self, mut data: Vec<u8>) {
        let outstanding = self.outstanding.fetch_sub(1, Ordering::AcqRel) - 1;
        data.clear();
        let mut free = self.free.lock();
        if free.len() < self.max_free_pages {
            free.push(data);
        }
        trace!(
            "page returned to pool, outstanding: {}, free: {}",
            outstanding,
            free.len()
        );
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        debug!("page pool dropped with {} free pages", self.free.lock().len());
    }
}

/// Shared pool of page buffers. Cloning the pool is cheap and yields a handle
/// onto the same free list.
#[derive(Clone)]
pub struct PagePool {
    inner: Arc<PoolInner>,
}

impl Debug for PagePool {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagePool")
            .field("page_size", &self.inner.page_size)
            .field("max_free_pages", &self.inner.max_free_pages)
            .field("outstanding", &self.outstanding())
            .field("free", &self.free_pages())
            .finish()
    }
}

impl PagePool {
    pub fn new(page_size: usize, max_free_pages: usize) -> Self {
        PagePool {
            inner: Arc::new(PoolInner {
                page_size,
                max_free_pages,
                free: Mutex::new(Vec::with_capacity(max_free_pages)),
                outstanding: AtomicUsize::new(0),
            }),
        }
    }

    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(config.page_size, config.max_free_pages)
    }

    /// Takes a page from the free list, allocating a new one when it is empty.
    pub fn acquire(&self) -> PageWriter {
        let data = self
            .inner
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.inner.page_size));
        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
        PageWriter {
            buf: PageBuf {
                data,
                pool: Arc::clone(&self.inner),
            },
        }
    }

    /// Pages handed out and not yet returned.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    pub fn free_pages(&self) -> usize {
        self.inner.free.lock().len()
    }

    pub fn page_size(&self) -> usize {
        self.inner.page_size
    }
}

struct PageBuf {
    data: Vec<u8>,
    pool: Arc<PoolInner>,
}

impl Drop for PageBuf {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        self.pool.release(data);
    }
}

/// A page being filled. Dropping it unfrozen returns the buffer to the pool.
pub struct PageWriter {
    buf: PageBuf,
}

impl PageWriter {
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.buf.data.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.data.is_empty()
    }

    pub fn freeze(self) -> Page {
        Page {
            buf: Arc::new(self.buf),
        }
    }
}

impl Write for PageWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buf.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// An immutable, filled page.
#[derive(Clone)]
pub struct Page {
    buf: Arc<PageBuf>,
}

impl Debug for Page {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("len", &self.len())
            .field("refs", &self.ref_count())
            .finish()
    }
}

impl Page {
    pub fn as_slice(&self) -> &[u8] {
        &self.buf.data
    }

    pub fn len(&self) -> usize {
        self.buf.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.data.is_empty()
    }

    /// References held on this page, including this handle.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.buf)
    }

    /// New reference onto `length` bytes starting at `offset`.
    pub fn slice(&self, offset: usize, length: usize) -> AppResult<PageRef> {
        let end = offset.checked_add(length).ok_or_else(|| {
            AppError::CorruptMessage(format!("page range overflow: {}+{}", offset, length))
        })?;
        if end > self.len() {
            return Err(AppError::CorruptMessage(format!(
                "page range {}..{} out of bounds, page length {}",
                offset,
                end,
                self.len()
            )));
        }
        Ok(PageRef {
            buf: Arc::clone(&self.buf),
            offset,
            length,
        })
    }
}

/// Counted reference onto a byte range of a [`Page`].
#[derive(Clone)]
pub struct PageRef {
    buf: Arc<PageBuf>,
    offset: usize,
    length: usize,
}

impl Debug for PageRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageRef")
            .field("offset", &self.offset)
            .field("length", &self.length)
            .finish()
    }
}

impl PageRef {
    pub fn as_slice(&self) -> &[u8] {
        &self.buf.data[self.offset..self.offset + self.length]
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Releases this reference. Consumes the handle so it cannot be released twice.
    pub fn unref(self) {
        drop(self)
    }
}
