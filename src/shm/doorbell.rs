// src/shm/doorbell.rs
//! Doorbell control block (`spec.md` §3, §4.1, §6): bidirectional
//! notification registers plus write/IRQ counters. Two hundred fifty-six
//! bytes, laid out as two triples (`doorbell`, `flags`, `irq_count`) per
//! direction followed by total write counters.

use crate::error::{Error, Invalid, Result};
use crate::shm::layout::{DOORBELL_FLAG_IRQ_ENABLED, DOORBELL_FLAG_PENDING, DOORBELL_MAGIC};

const OFF_MAGIC: usize = 0;
const OFF_VERSION: usize = 4;
const OFF_CMD_DOORBELL: usize = 8;
const OFF_CMD_FLAGS: usize = 12;
const OFF_CMD_IRQ_COUNT: usize = 16;
const OFF_RSP_DOORBELL: usize = 20;
const OFF_RSP_FLAGS: usize = 24;
const OFF_RSP_IRQ_COUNT: usize = 28;
const OFF_CMD_WRITES: usize = 32;
const OFF_RSP_WRITES: usize = 36;

fn read_u32(region: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(region[off..off + 4].try_into().unwrap())
}

fn write_u32(region: &mut [u8], off: usize, v: u32) {
    region[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

/// Initialize the doorbell block. The response direction starts with
/// IRQ notification enabled, matching the original driver bringing up the
/// response path for interrupt-driven wakeups by default.
pub fn init(region: &mut [u8]) {
    region.fill(0);
    write_u32(region, OFF_MAGIC, DOORBELL_MAGIC);
    write_u32(region, OFF_VERSION, 1);
    write_u32(region, OFF_RSP_FLAGS, DOORBELL_FLAG_IRQ_ENABLED);
}

fn check_magic(region: &[u8]) -> Result<()> {
    if read_u32(region, OFF_MAGIC) != DOORBELL_MAGIC {
        return Err(Error::Invalid(Invalid::MagicMismatch));
    }
    Ok(())
}

/// Which direction a doorbell ring operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Core -> peer (command ring).
    Cmd,
    /// Peer -> core (response ring).
    Rsp,
}

impl Direction {
    fn offsets(self) -> (usize, usize, usize, usize) {
        match self {
            Direction::Cmd => (OFF_CMD_DOORBELL, OFF_CMD_FLAGS, OFF_CMD_IRQ_COUNT, OFF_CMD_WRITES),
            Direction::Rsp => (OFF_RSP_DOORBELL, OFF_RSP_FLAGS, OFF_RSP_IRQ_COUNT, OFF_RSP_WRITES),
        }
    }
}

/// Ring a doorbell after publishing a new producer head (`spec.md` §4.1
/// step ⑥). Always bumps the write counter; bumps the IRQ counter and
/// sets `PENDING` only if `IRQ_ENABLED` is set for that direction.
pub fn ring(region: &mut [u8], dir: Direction, new_head: u32) -> Result<()> {
    check_magic(region)?;
    let (doorbell_off, flags_off, irq_off, writes_off) = dir.offsets();

    write_u32(region, doorbell_off, new_head);
    let writes = read_u32(region, writes_off);
    write_u32(region, writes_off, writes.wrapping_add(1));

    let flags = read_u32(region, flags_off);
    if flags & DOORBELL_FLAG_IRQ_ENABLED != 0 {
        write_u32(region, flags_off, flags | DOORBELL_FLAG_PENDING);
        let irq = read_u32(region, irq_off);
        write_u32(region, irq_off, irq.wrapping_add(1));
    }
    Ok(())
}

/// Read the last-seen doorbell value for a direction. Torn reads across a
/// concurrent writer are tolerated by design (`spec.md` §4.1): only the
/// last value observed matters, and "catch up to this head" is idempotent.
pub fn value(region: &[u8], dir: Direction) -> Result<u32> {
    check_magic(region)?;
    let (doorbell_off, ..) = dir.offsets();
    Ok(read_u32(region, doorbell_off))
}

/// Clear the `PENDING` flag for a direction (reader acknowledging the IRQ).
pub fn clear_pending(region: &mut [u8], dir: Direction) -> Result<()> {
    check_magic(region)?;
    let (_, flags_off, ..) = dir.offsets();
    let flags = read_u32(region, flags_off);
    write_u32(region, flags_off, flags & !DOORBELL_FLAG_PENDING);
    Ok(())
}

/// Enable or disable IRQ notification for a direction.
pub fn set_irq_enabled(region: &mut [u8], dir: Direction, enabled: bool) -> Result<()> {
    check_magic(region)?;
    let (_, flags_off, ..) = dir.offsets();
    let flags = read_u32(region, flags_off);
    let next = if enabled {
        flags | DOORBELL_FLAG_IRQ_ENABLED
    } else {
        flags & !DOORBELL_FLAG_IRQ_ENABLED
    };
    write_u32(region, flags_off, next);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn ring_without_irq_bumps_writes_but_not_irq_count() {
        let mut region = vec![0u8; super::super::layout::DOORBELL_BYTES];
        init(&mut region);
        set_irq_enabled(&mut region, Direction::Cmd, false).unwrap();
        ring(&mut region, Direction::Cmd, 7).unwrap();
        assert_eq!(value(&mut region, Direction::Cmd).unwrap(), 7);
        assert_eq!(read_u32(&region, OFF_CMD_WRITES), 1);
        assert_eq!(read_u32(&region, OFF_CMD_IRQ_COUNT), 0);
    }

    #[test]
    fn ring_with_irq_sets_pending_and_bumps_irq_count() {
        let mut region = vec![0u8; super::super::layout::DOORBELL_BYTES];
        init(&mut region);
        // Response direction starts IRQ-enabled by default.
        ring(&mut region, Direction::Rsp, 3).unwrap();
        assert_eq!(read_u32(&region, OFF_RSP_IRQ_COUNT), 1);
        assert_eq!(read_u32(&region, OFF_RSP_FLAGS) & DOORBELL_FLAG_PENDING, DOORBELL_FLAG_PENDING);
        clear_pending(&mut region, Direction::Rsp).unwrap();
        assert_eq!(read_u32(&region, OFF_RSP_FLAGS) & DOORBELL_FLAG_PENDING, 0);
    }

    #[test]
    fn foreign_region_is_refused_not_corrupted() {
        let region = vec![0u8; super::super::layout::DOORBELL_BYTES];
        assert!(matches!(
            value(&region, Direction::Cmd),
            Err(Error::Invalid(Invalid::MagicMismatch))
        ));
    }
}
