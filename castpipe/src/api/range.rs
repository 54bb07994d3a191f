//! Byte-range parsing for partial-content responses.
//!
//! Supports the three single-range forms `bytes=<start>-<end>`,
//! `bytes=<start>-` and `bytes=-<suffix>`. Anything else — including
//! multi-range requests — is rejected, and the caller answers 416 with a
//! `Content-Range: bytes */<size>` header.

/// An inclusive, already-clamped byte window into a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` value for a 206 response.
    pub fn content_range(&self, total_size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total_size)
    }
}

/// `Content-Range` value for a 416 response.
pub fn unsatisfiable_content_range(total_size: u64) -> String {
    format!("bytes */{total_size}")
}

/// Why a Range header was rejected. Both cases answer 416.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    Malformed,
    Unsatisfiable,
}

/// Parse a `Range` header value against a resource of `total_size` bytes.
///
/// An open-ended range clamps to the last byte; a suffix range takes the
/// last `n` bytes (the whole resource when `n` exceeds it); a start at or
/// beyond the resource size is unsatisfiable.
pub fn parse_range(header: &str, total_size: u64) -> Result<ByteRange, RangeError> {
    let spec = header
        .trim()
        .strip_prefix("bytes=")
        .ok_or(RangeError::Malformed)?;
    if spec.contains(',') {
        return Err(RangeError::Malformed);
    }

    let (start_raw, end_raw) = spec.split_once('-').ok_or(RangeError::Malformed)?;
    let start_raw = start_raw.trim();
    let end_raw = end_raw.trim();

    if start_raw.is_empty() && end_raw.is_empty() {
        return Err(RangeError::Malformed);
    }

    if start_raw.is_empty() {
        // Suffix form: the last `n` bytes.
        let suffix: u64 = end_raw.parse().map_err(|_| RangeError::Malformed)?;
        if suffix == 0 || total_size == 0 {
            return Err(RangeError::Unsatisfiable);
        }
        return Ok(ByteRange {
            start: total_size.saturating_sub(suffix),
            end: total_size - 1,
        });
    }

    let start: u64 = start_raw.parse().map_err(|_| RangeError::Malformed)?;
    if start >= total_size {
        return Err(RangeError::Unsatisfiable);
    }

    let end = if end_raw.is_empty() {
        total_size - 1
    } else {
        let end: u64 = end_raw.parse().map_err(|_| RangeError::Malformed)?;
        end.min(total_size - 1)
    };

    if start > end {
        return Err(RangeError::Unsatisfiable);
    }

    Ok(ByteRange { start, end })
}
