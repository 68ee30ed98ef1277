// src/shm/ring.rs
//! Generic single-producer/single-consumer ring over a raw byte region
//! (`spec.md` §4.1). The header occupies the first 32 bytes of the region
//! (`magic`, `head`, `tail`, `size`, then 4 reserved `u32`s); fixed-size
//! slots follow immediately after.
//!
//! `head`/`tail` are accessed through `AtomicU32` so the barrier protocol
//! described in the spec (store-store before publishing `head`, a barrier
//! before the consumer commits `tail`) is expressed with real atomics
//! rather than plain loads/stores that the compiler would be free to
//! reorder.

use core::sync::atomic::{fence, AtomicU32, Ordering};

use crate::error::{Capacity, Error, Result};

const HEADER_BYTES: usize = 32;

/// Borrow the `head` field of a ring region as an atomic, in place.
///
/// # Safety
/// `region` must be at least `HEADER_BYTES` long and 4-byte aligned, and
/// no other reference to the same bytes may be live for the duration of
/// the returned borrow.
unsafe fn head_atomic(region: &[u8]) -> &AtomicU32 {
    let ptr = region.as_ptr().wrapping_add(4).cast::<u32>();
    unsafe { AtomicU32::from_ptr(ptr.cast_mut()) }
}

unsafe fn tail_atomic(region: &[u8]) -> &AtomicU32 {
    let ptr = region.as_ptr().wrapping_add(8).cast::<u32>();
    unsafe { AtomicU32::from_ptr(ptr.cast_mut()) }
}

/// Initialize a ring region: write `magic`, zero `head`/`tail`, and record
/// `capacity` in the `size` field.
pub fn init(region: &mut [u8], magic: u32, capacity: u32) {
    region[0..4].copy_from_slice(&magic.to_le_bytes());
    region[4..8].copy_from_slice(&0u32.to_le_bytes());
    region[8..12].copy_from_slice(&0u32.to_le_bytes());
    region[12..16].copy_from_slice(&capacity.to_le_bytes());
    region[16..HEADER_BYTES].fill(0);
}

/// Read the `magic` field without touching head/tail.
pub fn magic(region: &[u8]) -> u32 {
    u32::from_le_bytes(region[0..4].try_into().unwrap())
}

/// Read the `size` (capacity) field.
pub fn capacity(region: &[u8]) -> u32 {
    u32::from_le_bytes(region[12..16].try_into().unwrap())
}

fn slot_offset(slot_size: usize, idx: u32) -> usize {
    HEADER_BYTES + idx as usize * slot_size
}

/// Producer-side send (`spec.md` §4.1 "Producer protocol").
///
/// Returns `Err(Error::CapacityExhausted(Capacity::RingFull))` without
/// mutating any index if the ring is full - this is not an error the
/// caller needs to treat as fatal, only as "retry or report".
pub fn send(region: &mut [u8], slot_size: usize, expected_magic: u32, bytes: &[u8]) -> Result<()> {
    if magic(region) != expected_magic {
        return Err(Error::Invalid(crate::error::Invalid::MagicMismatch));
    }
    let size = capacity(region);
    // SAFETY: region is at least HEADER_BYTES long (checked by caller's
    // fixed layout) and the atomics never outlive this call.
    let head = unsafe { head_atomic(region) };
    let tail = unsafe { tail_atomic(region) };

    let cur_head = head.load(Ordering::Relaxed);
    let cur_tail = tail.load(Ordering::Acquire);
    let next_head = (cur_head + 1) % size;
    if next_head == cur_tail {
        return Err(Error::CapacityExhausted(Capacity::RingFull));
    }

    let off = slot_offset(slot_size, cur_head);
    region[off..off + slot_size].copy_from_slice(bytes);

    // Store-store barrier: the packet write above must be visible before
    // the new head is published.
    fence(Ordering::Release);
    head.store(next_head, Ordering::Release);
    Ok(())
}

/// Consumer-side poll (`spec.md` §4.1 "Consumer protocol"). Returns the
/// raw slot bytes, or `None` if the ring is empty.
pub fn poll(region: &mut [u8], slot_size: usize, expected_magic: u32) -> Option<alloc::vec::Vec<u8>> {
    if magic(region) != expected_magic {
        return None;
    }
    // SAFETY: see `send`.
    let head = unsafe { head_atomic(region) };
    let tail = unsafe { tail_atomic(region) };

    let cur_head = head.load(Ordering::Acquire);
    let cur_tail = tail.load(Ordering::Relaxed);
    if cur_head == cur_tail {
        return None;
    }

    let off = slot_offset(slot_size, cur_tail);
    let bytes = region[off..off + slot_size].to_vec();

    let size = capacity(region);
    let next_tail = (cur_tail + 1) % size;
    fence(Ordering::Release);
    tail.store(next_tail, Ordering::Release);
    Some(bytes)
}

/// `true` if the ring currently holds no unconsumed slots.
pub fn is_empty(region: &[u8]) -> bool {
    // SAFETY: read-only atomic load of an already-initialized region.
    let head = unsafe { head_atomic(region) }.load(Ordering::Relaxed);
    let tail = unsafe { tail_atomic(region) }.load(Ordering::Relaxed);
    head == tail
}

/// `true` if the next `send` would report `RingFull`.
pub fn is_full(region: &[u8]) -> bool {
    let size = capacity(region);
    // SAFETY: read-only atomic load of an already-initialized region.
    let head = unsafe { head_atomic(region) }.load(Ordering::Relaxed);
    let tail = unsafe { tail_atomic(region) }.load(Ordering::Relaxed);
    (head + 1) % size == tail
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shm::layout::CMD_RING_MAGIC;
    use crate::shm::packet::{Packet, PACKET_BYTES};

    fn ring_buf(capacity_slots: u32) -> alloc::vec::Vec<u8> {
        let mut r = alloc::vec![0u8; HEADER_BYTES + capacity_slots as usize * PACKET_BYTES];
        init(&mut r, CMD_RING_MAGIC, capacity_slots);
        r
    }

    #[test]
    fn empty_after_equal_sends_and_polls() {
        let mut r = ring_buf(4);
        for i in 0..3 {
            let p = Packet {
                cmd: i,
                flags: 0,
                payload_id: 0,
                timestamp: 0,
            };
            send(&mut r, PACKET_BYTES, CMD_RING_MAGIC, &p.to_bytes()).unwrap();
        }
        assert!(!is_empty(&r));
        for _ in 0..3 {
            assert!(poll(&mut r, PACKET_BYTES, CMD_RING_MAGIC).is_some());
        }
        assert!(is_empty(&r));
        assert!(poll(&mut r, PACKET_BYTES, CMD_RING_MAGIC).is_none());
    }

    #[test]
    fn full_ring_rejects_send_without_mutating_indices() {
        let mut r = ring_buf(4);
        // capacity 4 holds at most 3 live slots (one slot sacrificed to
        // distinguish full from empty).
        for _ in 0..3 {
            let p = Packet {
                cmd: 1,
                flags: 0,
                payload_id: 0,
                timestamp: 0,
            };
            send(&mut r, PACKET_BYTES, CMD_RING_MAGIC, &p.to_bytes()).unwrap();
        }
        assert!(is_full(&r));
        let before = r.clone();
        let p = Packet {
            cmd: 2,
            flags: 0,
            payload_id: 0,
            timestamp: 0,
        };
        let err = send(&mut r, PACKET_BYTES, CMD_RING_MAGIC, &p.to_bytes()).unwrap_err();
        assert_eq!(err, Error::CapacityExhausted(Capacity::RingFull));
        assert_eq!(r, before, "a failed send must not mutate head/tail or data");

        // One poll frees exactly one slot.
        assert!(poll(&mut r, PACKET_BYTES, CMD_RING_MAGIC).is_some());
        assert!(!is_full(&r));
        send(&mut r, PACKET_BYTES, CMD_RING_MAGIC, &p.to_bytes()).unwrap();
        assert!(is_full(&r));
    }

    #[test]
    fn mismatched_magic_is_reported_but_not_fatal() {
        let mut r = ring_buf(4);
        r[0..4].copy_from_slice(&0u32.to_le_bytes());
        let p = Packet {
            cmd: 1,
            flags: 0,
            payload_id: 0,
            timestamp: 0,
        };
        assert!(matches!(
            send(&mut r, PACKET_BYTES, CMD_RING_MAGIC, &p.to_bytes()),
            Err(Error::Invalid(crate::error::Invalid::MagicMismatch))
        ));
        assert!(poll(&mut r, PACKET_BYTES, CMD_RING_MAGIC).is_none());
    }

    #[test]
    fn ring_pressure_matches_capacity_minus_one() {
        let capacity_slots = 8u32;
        let mut r = ring_buf(capacity_slots);
        let mut sent = 0u32;
        loop {
            let p = Packet {
                cmd: 1,
                flags: 0,
                payload_id: sent,
                timestamp: 0,
            };
            match send(&mut r, PACKET_BYTES, CMD_RING_MAGIC, &p.to_bytes()) {
                Ok(()) => sent += 1,
                Err(Error::CapacityExhausted(Capacity::RingFull)) => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(sent, capacity_slots - 1);
        assert!(poll(&mut r, PACKET_BYTES, CMD_RING_MAGIC).is_some());
        let p = Packet {
            cmd: 1,
            flags: 0,
            payload_id: 999,
            timestamp: 0,
        };
        send(&mut r, PACKET_BYTES, CMD_RING_MAGIC, &p.to_bytes()).unwrap();
        assert!(matches!(
            send(&mut r, PACKET_BYTES, CMD_RING_MAGIC, &p.to_bytes()),
            Err(Error::CapacityExhausted(Capacity::RingFull))
        ));
    }
}
