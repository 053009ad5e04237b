//! Multipart part planning
//!
//! A file of `size` bytes is partitioned into consecutive byte ranges of
//! `part_size` bytes, the last one possibly shorter. Part numbers start at 1.

use super::errors::DomainError;

/// Default part size: 5 MiB
pub const DEFAULT_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Smallest part size object stores accept for non-final parts: 5 MiB
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// One byte range of a multipart upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartPlan {
    /// 1-based part number
    pub part_number: u32,
    /// Byte offset of the first byte of the part
    pub offset: u64,
    /// Number of bytes in the part
    pub length: u64,
}

impl PartPlan {
    /// Offset one past the last byte of this part
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Partition `[0, size)` into parts of at most `part_size` bytes
///
/// Always yields at least one part, so an empty file plans a single
/// zero-length part; callers decide whether empty files are uploaded at all.
///
/// # Errors
/// Returns `DomainError::ZeroPartSize` if `part_size` is zero.
pub fn plan_parts(size: u64, part_size: u64) -> Result<Vec<PartPlan>, DomainError> {
    if part_size == 0 {
        return Err(DomainError::ZeroPartSize);
    }

    let count = size.div_ceil(part_size).max(1);
    let plans = (0..count)
        .map(|index| {
            let offset = index * part_size;
            PartPlan {
                part_number: (index + 1) as u32,
                offset,
                length: part_size.min(size - offset),
            }
        })
        .collect();

    Ok(plans)
}
