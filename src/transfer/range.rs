//! Byte-range scheduling and `Content-Range` parsing

/// An inclusive byte span of the destination file
///
/// Parts are produced once by [`schedule_parts`] and requeued verbatim when a
/// worker fails on them; they are never subdivided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DownloadPart {
    /// First byte offset
    pub start: u64,
    /// Last byte offset, inclusive
    pub end: u64,
}

impl DownloadPart {
    /// Number of bytes the part covers
    pub fn byte_count(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Range` request header
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// Partition `[0, length)` into `part_size` spans
///
/// The final part holds the remainder. An exact division never produces a
/// trailing empty part, and a zero-length file produces no parts at all.
pub fn schedule_parts(length: u64, part_size: u64) -> Vec<DownloadPart> {
    if length == 0 || part_size == 0 {
        return Vec::new();
    }

    let count = length.div_ceil(part_size);
    (0..count)
        .map(|index| {
            let start = index * part_size;
            let end = (start + part_size).min(length) - 1;
            DownloadPart { start, end }
        })
        .collect()
}

/// Extract the total length from a `Content-Range` header value
///
/// Accepts `bytes <start>-<end>/<total>` as well as the unsatisfied form
/// `bytes */<total>`. An unknown total (`*`) is not usable.
pub fn parse_content_range(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (span, total) = rest.split_once('/')?;

    let span = span.trim();
    if span != "*" {
        let (start, end) = span.split_once('-')?;
        let start: u64 = start.trim().parse().ok()?;
        let end: u64 = end.trim().parse().ok()?;
        if end < start {
            return None;
        }
    }

    total.trim().parse().ok()
}
