// src/heap/layout.rs
//! Byte layout of the heap control block and the per-blob header
//! (`spec.md` §3, §4.2, §6).

use crate::shm::layout::HEAP_DATA_BYTES;

/// Allocation granularity in bytes.
pub const BLOCK_SIZE: u32 = 64;

/// Total number of 64 B blocks the heap data area is divided into.
pub const MAX_BLOCKS: u32 = (HEAP_DATA_BYTES as u32) / BLOCK_SIZE;

/// Bytes needed to bitmap every block, one bit each.
pub const BITMAP_BYTES: usize = (MAX_BLOCKS as usize).div_ceil(8);

// --- Control block header (within the region's HEAP_CTL_OFFSET slice) ---
pub const CTL_OFF_MAGIC: usize = 0;
pub const CTL_OFF_VERSION: usize = 4;
pub const CTL_OFF_TOTAL_BLOCKS: usize = 8;
pub const CTL_OFF_FREE_BLOCKS: usize = 12;
pub const CTL_OFF_NEXT_BLOB_ID: usize = 16;
pub const CTL_OFF_RESERVED: usize = 20;
pub const CTL_HEADER_BYTES: usize = 32;
pub const CTL_OFF_BITMAP: usize = CTL_HEADER_BYTES;

/// Where the heap *data* area begins within the combined ctl+data slice
/// that [`crate::shm::region::Region::heap_mut`] hands to this module.
/// Matches `HEAP_CTL_BYTES` in `shm::layout` exactly: the control block
/// is sized so the data area starts flush with `HEAP_DATA_OFFSET`.
pub const DATA_AREA_START: usize = crate::shm::layout::HEAP_CTL_BYTES;

// --- Per-blob header (20 bytes, lives at the start of each allocation) ---
pub const BLOB_HEADER_BYTES: usize = 20;
pub const BLOB_OFF_MAGIC: usize = 0;
pub const BLOB_OFF_ID: usize = 4;
pub const BLOB_OFF_TYPE: usize = 6;
pub const BLOB_OFF_FLAGS: usize = 7;
pub const BLOB_OFF_SIZE: usize = 8;
pub const BLOB_OFF_OFFSET: usize = 12;
pub const BLOB_OFF_CHECKSUM: usize = 16;

// --- Tensor header, nested right after the blob header in the payload ---
pub const TENSOR_HEADER_BYTES: usize = 1 + 1 + 4 * 4 + 4 * 4;
pub const TENSOR_OFF_DTYPE: usize = 0;
pub const TENSOR_OFF_NDIM: usize = 1;
pub const TENSOR_OFF_SHAPE: usize = 2;
pub const TENSOR_OFF_STRIDES: usize = 2 + 4 * 4;
pub const TENSOR_MAX_DIMS: usize = 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ctl_header_fits_before_bitmap_and_bitmap_fits_before_data() {
        assert!(CTL_OFF_BITMAP + BITMAP_BYTES <= DATA_AREA_START);
    }

    #[test]
    fn max_blocks_matches_spec_approximation() {
        // spec.md says "~15,280 blocks"
        assert!((15_000..15_400).contains(&MAX_BLOCKS));
    }
}
