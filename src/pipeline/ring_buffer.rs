//! Byte ring buffer shared by the capture and playback callbacks.
//!
//! The buffer splits into exactly one [`RingWriter`] and one [`RingReader`],
//! so single-producer/single-consumer use is enforced by ownership. Each
//! half moves into the callback that owns its cursor; neither side locks.
//!
//! Writes are two-phase: bytes are first staged through a [`WritePointer`]
//! and only become visible to the reader once [`RingWriter::advance_write`]
//! publishes them. Reads mirror this with [`ReadPointer`] and
//! [`RingReader::advance_read`].

use std::mem::MaybeUninit;

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::error::RingBufferError;

/// A fixed-capacity byte ring buffer, not yet split.
pub struct RingBuffer {
    inner: HeapRb<u8>,
}

impl RingBuffer {
    /// Allocates a buffer of `capacity` bytes (at least 1).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: HeapRb::new(capacity.max(1)),
        }
    }

    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.inner.capacity().get()
    }

    /// Splits the buffer into its write and read halves.
    pub fn split(self) -> (RingWriter, RingReader) {
        let (prod, cons) = self.inner.split();
        (
            RingWriter {
                inner: prod,
                staged: 0,
            },
            RingReader { inner: cons },
        )
    }
}

/// The write half. Owned by whoever produces bytes.
pub struct RingWriter {
    inner: HeapProd<u8>,
    staged: usize,
}

impl RingWriter {
    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.inner.capacity().get()
    }

    /// Bytes that can be written before the buffer is full.
    pub fn free_count(&self) -> usize {
        self.inner.vacant_len()
    }

    /// Bytes published and not yet read.
    pub fn fill_count(&self) -> usize {
        self.inner.occupied_len()
    }

    /// Returns a cursor at the current write position.
    ///
    /// Bytes written through it are staged, not visible to the reader until
    /// [`advance_write`](Self::advance_write).
    pub fn write_pointer(&mut self) -> WritePointer<'_> {
        WritePointer { writer: self }
    }

    /// Publishes `n` staged bytes to the reader.
    ///
    /// # Errors
    ///
    /// - [`RingBufferError::Overflow`] if `n` exceeds the free space
    /// - [`RingBufferError::Unstaged`] if fewer than `n` bytes were staged
    ///
    /// Neither cursor moves on error.
    pub fn advance_write(&mut self, n: usize) -> Result<(), RingBufferError> {
        let available = self.free_count();
        if n > available {
            return Err(RingBufferError::Overflow {
                requested: n,
                available,
            });
        }
        if n > self.staged {
            return Err(RingBufferError::Unstaged {
                requested: n,
                staged: self.staged,
            });
        }
        #[allow(unsafe_code)]
        // SAFETY: the first `staged` vacant bytes were initialized through
        // `WritePointer`, and n <= staged.
        unsafe {
            self.inner.advance_write_index(n);
        }
        self.staged -= n;
        Ok(())
    }

    /// Writes and publishes `n` zero bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RingBufferError::Overflow`] if `n` exceeds the free space.
    pub fn write_silence(&mut self, n: usize) -> Result<(), RingBufferError> {
        self.write_pointer().fill_zero(n)?;
        self.advance_write(n)
    }

    /// Writes and publishes `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`RingBufferError::Overflow`] if `bytes` doesn't fit.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), RingBufferError> {
        self.write_pointer().put(bytes)?;
        self.advance_write(bytes.len())
    }
}

/// Staging cursor over the free region of a [`RingWriter`].
pub struct WritePointer<'a> {
    writer: &'a mut RingWriter,
}

impl WritePointer<'_> {
    /// Bytes staged since the last publish.
    pub fn staged(&self) -> usize {
        self.writer.staged
    }

    /// Free bytes left after the staged ones.
    pub fn remaining(&self) -> usize {
        self.writer.free_count().saturating_sub(self.writer.staged)
    }

    /// Stages `bytes` after those already staged.
    ///
    /// # Errors
    ///
    /// Returns [`RingBufferError::Overflow`] and stages nothing if `bytes`
    /// doesn't fit.
    pub fn put(&mut self, bytes: &[u8]) -> Result<(), RingBufferError> {
        self.stage(bytes.len(), |dst, src_offset| {
            let src = &bytes[src_offset..src_offset + dst.len()];
            for (d, s) in dst.iter_mut().zip(src) {
                d.write(*s);
            }
        })
    }

    /// Stages `n` zero bytes after those already staged.
    ///
    /// # Errors
    ///
    /// Returns [`RingBufferError::Overflow`] and stages nothing if `n`
    /// bytes don't fit.
    pub fn fill_zero(&mut self, n: usize) -> Result<(), RingBufferError> {
        self.stage(n, |dst, _| {
            for d in dst {
                d.write(0);
            }
        })
    }

    fn stage<F>(&mut self, len: usize, mut fill: F) -> Result<(), RingBufferError>
    where
        F: FnMut(&mut [MaybeUninit<u8>], usize),
    {
        let available = self.remaining();
        if len > available {
            return Err(RingBufferError::Overflow {
                requested: len,
                available,
            });
        }

        let mut skip = self.writer.staged;
        let mut done = 0;
        let (first, second) = self.writer.inner.vacant_slices_mut();
        for region in [first, second] {
            if done == len {
                break;
            }
            if skip >= region.len() {
                skip -= region.len();
                continue;
            }
            let region = &mut region[skip..];
            skip = 0;
            let take = region.len().min(len - done);
            fill(&mut region[..take], done);
            done += take;
        }
        self.writer.staged += done;
        Ok(())
    }
}

/// The read half. Owned by whoever consumes bytes.
pub struct RingReader {
    inner: HeapCons<u8>,
}

impl RingReader {
    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.inner.capacity().get()
    }

    /// Bytes available to read.
    pub fn fill_count(&self) -> usize {
        self.inner.occupied_len()
    }

    /// Bytes free for the writer.
    pub fn free_count(&self) -> usize {
        self.inner.vacant_len()
    }

    /// Returns a cursor at the current read position.
    ///
    /// Reading through it does not consume; call
    /// [`advance_read`](Self::advance_read) afterwards.
    pub fn read_pointer(&self) -> ReadPointer<'_> {
        let (first, second) = self.inner.as_slices();
        ReadPointer {
            first,
            second,
            position: 0,
        }
    }

    /// Consumes `n` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RingBufferError::Underflow`] and leaves the cursor alone if
    /// `n` exceeds the filled space.
    pub fn advance_read(&mut self, n: usize) -> Result<(), RingBufferError> {
        let available = self.fill_count();
        if n > available {
            return Err(RingBufferError::Underflow {
                requested: n,
                available,
            });
        }
        self.inner.skip(n);
        Ok(())
    }

    /// Copies up to `out.len()` bytes into `out` and consumes them.
    ///
    /// Returns the number of bytes read.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        self.inner.pop_slice(out)
    }

    /// Consumes up to `max` bytes into a new vector.
    pub fn read_to_vec(&mut self, max: usize) -> Vec<u8> {
        let mut out = vec![0u8; max.min(self.fill_count())];
        let n = self.read(&mut out);
        out.truncate(n);
        out
    }
}

/// Cursor over the readable region of a [`RingReader`].
pub struct ReadPointer<'a> {
    first: &'a [u8],
    second: &'a [u8],
    position: usize,
}

impl ReadPointer<'_> {
    /// Bytes taken through this pointer so far.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Readable bytes not yet taken.
    pub fn remaining(&self) -> usize {
        self.first.len() + self.second.len() - self.position
    }

    /// Copies the next `out.len()` bytes into `out`.
    ///
    /// Copies fewer if fewer remain; returns the number copied.
    pub fn take_into(&mut self, out: &mut [u8]) -> usize {
        let mut copied = 0;
        while copied < out.len() && self.remaining() > 0 {
            let (region, start) = if self.position < self.first.len() {
                (self.first, self.position)
            } else {
                (self.second, self.position - self.first.len())
            };
            let take = (region.len() - start).min(out.len() - copied);
            out[copied..copied + take].copy_from_slice(&region[start..start + take]);
            copied += take;
            self.position += take;
        }
        copied
    }
}
