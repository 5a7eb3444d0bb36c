//! Annex-B NAL unit extraction from a continuously appended byte cache.
//!
//! Annex-B streams delimit NAL units with start codes:
//! - 4-byte: `0x00 0x00 0x00 0x01`
//! - 3-byte: `0x00 0x00 0x01`
//!
//! A unit is complete only once the *next* start code has arrived, so the
//! extractor keeps the tail of the stream cached between pushes. At end of
//! input the driver calls [`NalExtractor::flush`] to release that tail.

use crate::error::{Result, RtspError};

/// Default cache capacity (1 MiB).
pub const DEFAULT_CACHE_CAPACITY: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartCode {
    Three,
    Four,
}

impl StartCode {
    pub fn len(self) -> usize {
        match self {
            StartCode::Three => 3,
            StartCode::Four => 4,
        }
    }

    pub fn bytes(self) -> &'static [u8] {
        match self {
            StartCode::Three => &[0, 0, 1],
            StartCode::Four => &[0, 0, 0, 1],
        }
    }
}

/// One complete NAL unit, borrowed from the extractor's cache.
///
/// Only valid for the duration of the callback it is passed to.
#[derive(Debug, Clone, Copy)]
pub struct Nal<'a> {
    /// The start code that preceded this unit in the stream.
    pub start_code: StartCode,
    /// Unit bytes, header included, start code excluded.
    pub data: &'a [u8],
}

/// Find the first start code in `data`.
///
/// Returns its offset and length. A 4-byte code is preferred when both
/// readings are possible at the same offset; scanning left to right means
/// `00 00 00 01` is always seen as a 4-byte code rather than a trailing zero
/// plus a 3-byte code.
pub fn find_start_code(data: &[u8]) -> Option<(usize, StartCode)> {
    let pos = data.windows(3).position(|w| w == [0, 0, 1])?;
    // A zero in front of the first `00 00 01` makes it a 4-byte code.
    if pos > 0 && data[pos - 1] == 0 {
        return Some((pos - 1, StartCode::Four));
    }
    Some((pos, StartCode::Three))
}

/// Owns the stream cache and cuts it into NAL units.
///
/// The cache is an owned buffer bounded by `capacity`; the scan works on a
/// cursor into it and compacts the consumed prefix once no further complete
/// unit is available.
#[derive(Debug)]
pub struct NalExtractor {
    cache: Vec<u8>,
    capacity: usize,
}

impl NalExtractor {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Bytes currently held awaiting a terminating start code.
    pub fn pending(&self) -> usize {
        self.cache.len()
    }

    /// Append `bytes` and emit every NAL unit they complete.
    ///
    /// Fails with [`RtspError::BufferFull`] when the chunk does not fit; the
    /// chunk is dropped whole and the cache is left untouched.
    pub fn feed<F>(&mut self, bytes: &[u8], mut on_nal: F) -> Result<usize>
    where
        F: FnMut(Nal<'_>),
    {
        let available = self.capacity - self.cache.len();
        if bytes.len() > available {
            tracing::warn!(
                needed = bytes.len(),
                available,
                capacity = self.capacity,
                "stream cache full, dropping chunk"
            );
            return Err(RtspError::BufferFull {
                needed: bytes.len(),
                available,
            });
        }
        self.cache.extend_from_slice(bytes);
        Ok(self.scan(&mut on_nal))
    }

    /// Emit the unit pending at the tail and reset the cache.
    ///
    /// Used when the driver reaches end of input and no further start code
    /// will arrive for the cached unit. Bytes without a leading start code
    /// cannot form a unit and are discarded.
    pub fn flush<F>(&mut self, mut on_nal: F) -> usize
    where
        F: FnMut(Nal<'_>),
    {
        let mut emitted = self.scan(&mut on_nal);
        match find_start_code(&self.cache) {
            Some((0, start_code)) => {
                let data = &self.cache[start_code.len()..];
                if !data.is_empty() {
                    on_nal(Nal { start_code, data });
                    emitted += 1;
                }
            }
            _ if !self.cache.is_empty() => {
                tracing::debug!(bytes = self.cache.len(), "discarding cache tail without start code");
            }
            _ => {}
        }
        self.cache.clear();
        emitted
    }

    fn scan(&mut self, on_nal: &mut dyn FnMut(Nal<'_>)) -> usize {
        let mut cursor = 0usize;
        let mut emitted = 0usize;

        loop {
            let window = &self.cache[cursor..];
            let Some((offset, start_code)) = find_start_code(window) else {
                break;
            };
            if offset > 0 {
                // Align to the start code rather than guessing at the bytes
                // in front of it.
                tracing::debug!(skipped = offset, "dropping bytes before start code");
                cursor += offset;
                continue;
            }

            let body = &window[start_code.len()..];
            let Some((next, _)) = find_start_code(body) else {
                break;
            };
            on_nal(Nal {
                start_code,
                data: &body[..next],
            });
            emitted += 1;
            cursor += start_code.len() + next;
        }

        if cursor > 0 {
            self.cache.drain(..cursor);
        }
        emitted
    }
}

impl Default for NalExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
