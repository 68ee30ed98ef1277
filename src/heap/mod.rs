// src/heap/mod.rs
//! Shared-memory bitmap heap: 64 B block allocator plus blob/tensor
//! headers (`spec.md` §3, §4.2).
//!
//! Every entry point here takes the combined control-block+data slice
//! handed out by [`crate::shm::region::Region::heap_mut`]; `Heap` itself
//! only owns the in-process blob-table cache (`spec.md` §4.2's "this is
//! a cache, not the source of truth - the heap bytes are").

pub mod bitmap;
pub mod blob;
pub mod layout;

use alloc::vec::Vec;

use crate::error::{Error, Invalid, Result};
use blob::{BlobHeader, BlobType, TensorDtype, TensorHeader};
use layout::{BLOB_HEADER_BYTES, BLOCK_SIZE, DATA_AREA_START};

/// Matches the original driver's `MAX_BLOBS`.
const MAX_CACHE_ENTRIES: usize = 256;

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    id: u16,
    /// Byte offset of the blob header, relative to the heap data base.
    offset: u32,
    blocks: u32,
}

/// Aggregate heap usage (`spec.md` §4.2 "stats").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    pub total_blocks: u32,
    pub free_blocks: u32,
    pub total_bytes: u32,
    pub free_bytes: u32,
    pub used_bytes: u32,
    pub blob_count: u32,
}

/// The blob-table cache sitting in front of the shared heap. Cheap to
/// construct; one instance should live alongside the [`crate::shm::region::Region`]
/// it serves.
#[derive(Default)]
pub struct Heap {
    cache: Vec<CacheEntry>,
}

impl Heap {
    pub fn new() -> Self {
        Self { cache: Vec::new() }
    }

    fn cache_insert(&mut self, id: u16, offset: u32, blocks: u32) {
        if self.cache.len() < MAX_CACHE_ENTRIES {
            self.cache.push(CacheEntry { id, offset, blocks });
        }
    }

    fn split(heap: &mut [u8]) -> (&mut [u8], &mut [u8]) {
        heap.split_at_mut(DATA_AREA_START)
    }

    /// Allocate `size` bytes of payload plus the blob header overhead,
    /// returning the new blob id.
    pub fn alloc(&mut self, heap: &mut [u8], size: u32, blob_type: BlobType) -> Result<u16> {
        let (ctl, data) = Self::split(heap);
        bitmap::check_magic(ctl)?;
        if size == 0 {
            return Err(Error::Invalid(Invalid::SizeOutOfBounds));
        }
        let total = size
            .checked_add(BLOB_HEADER_BYTES as u32)
            .ok_or(Error::Invalid(Invalid::SizeOutOfBounds))?;
        let blocks = bitmap::blocks_for(total);
        let start = bitmap::find_free_run(ctl, blocks)?;
        bitmap::mark_allocated(ctl, start, blocks);
        let id = bitmap::next_blob_id(ctl);

        let byte_off = start * BLOCK_SIZE;
        let header = BlobHeader {
            id,
            blob_type,
            flags: 0,
            size,
            payload_offset: byte_off + BLOB_HEADER_BYTES as u32,
            checksum: 0,
        };
        let block = &mut data[byte_off as usize..byte_off as usize + BLOB_HEADER_BYTES];
        header.write(block);
        self.cache_insert(id, byte_off, blocks);
        Ok(id)
    }

    /// Allocate a tensor blob: blob header, then tensor header, then the
    /// raw element payload, all within one contiguous run.
    pub fn alloc_tensor(
        &mut self,
        heap: &mut [u8],
        dtype: TensorDtype,
        shape: &[u32],
    ) -> Result<u16> {
        let tensor = TensorHeader::new(dtype, shape)?;
        let payload_size = layout::TENSOR_HEADER_BYTES as u32 + tensor.payload_bytes() as u32;
        let id = self.alloc(heap, payload_size, BlobType::Tensor)?;

        let (header, payload_offset) = self.get(heap, id)?;
        tensor.validate_fits(header.size)?;
        let (_, data) = Self::split(heap);
        let off = payload_offset as usize;
        tensor.write(&mut data[off..off + layout::TENSOR_HEADER_BYTES]);
        Ok(id)
    }

    /// Read back a tensor blob's header and its absolute element-data
    /// offset (relative to the heap data base).
    pub fn get_tensor(&mut self, heap: &mut [u8], id: u16) -> Result<(TensorHeader, u32)> {
        let (_, payload_offset) = self.get(heap, id)?;
        let (_, data) = Self::split(heap);
        let off = payload_offset as usize;
        let tensor = TensorHeader::read(&data[off..off + layout::TENSOR_HEADER_BYTES])?;
        Ok((tensor, payload_offset + layout::TENSOR_HEADER_BYTES as u32))
    }

    /// Release a blob's blocks back to the allocator. The blob must have
    /// been resolved at least once through [`Heap::get`] or [`Heap::alloc`]
    /// in this process, since the cache (not a heap-wide scan) drives
    /// which blocks to clear.
    pub fn free(&mut self, heap: &mut [u8], id: u16) -> Result<()> {
        if id == 0 {
            return Err(Error::Invalid(Invalid::UnknownBlobId));
        }
        let (ctl, _data) = Self::split(heap);
        bitmap::check_magic(ctl)?;
        let idx = self
            .cache
            .iter()
            .position(|e| e.id == id)
            .ok_or(Error::Invalid(Invalid::UnknownBlobId))?;
        let entry = self.cache.swap_remove(idx);
        let start = entry.offset / BLOCK_SIZE;
        bitmap::mark_freed(ctl, start, entry.blocks);
        Ok(())
    }

    /// Resolve a blob id to its header and absolute payload offset.
    /// Checks the cache first; on a miss, linearly scans the heap data
    /// area for the blob's magic word and repopulates the cache on a hit,
    /// so a second lookup for the same foreign blob is O(1).
    pub fn get(&mut self, heap: &mut [u8], id: u16) -> Result<(BlobHeader, u32)> {
        if id == 0 {
            return Err(Error::Invalid(Invalid::UnknownBlobId));
        }
        let (ctl, data) = Self::split(heap);
        bitmap::check_magic(ctl)?;

        if let Some(entry) = self.cache.iter().find(|e| e.id == id) {
            let off = entry.offset as usize;
            if off + BLOB_HEADER_BYTES <= data.len() {
                if let Ok(header) = BlobHeader::read(&data[off..off + BLOB_HEADER_BYTES]) {
                    if header.id == id {
                        return Ok((header, entry.offset + BLOB_HEADER_BYTES as u32));
                    }
                }
            }
        }

        let mut offset = 0u32;
        while (offset as usize) + BLOB_HEADER_BYTES <= data.len() {
            let block = &data[offset as usize..offset as usize + BLOB_HEADER_BYTES];
            match BlobHeader::read(block) {
                Ok(header) => {
                    let blocks =
                        bitmap::blocks_for(header.size + BLOB_HEADER_BYTES as u32).max(1);
                    if header.id == id {
                        self.cache_insert(id, offset, blocks);
                        return Ok((header, offset + BLOB_HEADER_BYTES as u32));
                    }
                    offset += blocks * BLOCK_SIZE;
                }
                Err(_) => offset += BLOCK_SIZE,
            }
        }
        Err(Error::Invalid(Invalid::UnknownBlobId))
    }

    /// Aggregate usage stats (`spec.md` §4.2).
    pub fn stats(&self, heap: &[u8]) -> Result<HeapStats> {
        let ctl = &heap[..DATA_AREA_START];
        bitmap::check_magic(ctl)?;
        let total_blocks = layout::MAX_BLOCKS;
        let free_blocks = bitmap::free_blocks(ctl);
        let total_bytes = total_blocks * BLOCK_SIZE;
        let free_bytes = free_blocks * BLOCK_SIZE;
        Ok(HeapStats {
            total_blocks,
            free_blocks,
            total_bytes,
            free_bytes,
            used_bytes: total_bytes - free_bytes,
            blob_count: self.cache.len() as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn heap_buf() -> alloc::vec::Vec<u8> {
        let data_bytes = (layout::MAX_BLOCKS * BLOCK_SIZE) as usize;
        let mut h = vec![0u8; DATA_AREA_START + data_bytes];
        bitmap::init(&mut h[..DATA_AREA_START]);
        h
    }

    #[test]
    fn alloc_get_free_round_trip() {
        let mut heap = heap_buf();
        let mut h = Heap::new();
        let id = h.alloc(&mut heap, 100, BlobType::Raw).unwrap();
        assert_ne!(id, 0);

        let (header, payload_off) = h.get(&mut heap, id).unwrap();
        assert_eq!(header.size, 100);
        assert!(payload_off > 0);

        h.free(&mut heap, id).unwrap();
        assert!(h.get(&mut heap, id).is_err());
    }

    #[test]
    fn scan_finds_blob_evicted_from_cache() {
        let mut heap = heap_buf();
        let mut writer = Heap::new();
        let id = writer.alloc(&mut heap, 50, BlobType::Raw).unwrap();

        // A fresh Heap (simulating the peer, which never populated its
        // own cache) must still find the blob via the linear scan.
        let mut reader = Heap::new();
        let (header, _) = reader.get(&mut heap, id).unwrap();
        assert_eq!(header.id, id);
        // And the scan should have repopulated the reader's own cache.
        assert_eq!(reader.cache.len(), 1);
    }

    #[test]
    fn tensor_round_trip_preserves_shape_and_dtype() {
        let mut heap = heap_buf();
        let mut h = Heap::new();
        let id = h
            .alloc_tensor(&mut heap, TensorDtype::F32, &[2, 2])
            .unwrap();
        let (tensor, data_off) = h.get_tensor(&mut heap, id).unwrap();
        assert_eq!(tensor.dtype, TensorDtype::F32);
        assert_eq!(tensor.element_count(), 4);
        assert!(data_off > 0);
    }

    #[test]
    fn zero_size_alloc_is_rejected() {
        let mut heap = heap_buf();
        let mut h = Heap::new();
        assert!(h.alloc(&mut heap, 0, BlobType::Raw).is_err());
    }

    #[test]
    fn stats_reflect_allocations() {
        let mut heap = heap_buf();
        let mut h = Heap::new();
        let before = h.stats(&heap).unwrap();
        h.alloc(&mut heap, 100, BlobType::Raw).unwrap();
        let after = h.stats(&heap).unwrap();
        assert!(after.free_blocks < before.free_blocks);
        assert_eq!(after.blob_count, 1);
    }
}
