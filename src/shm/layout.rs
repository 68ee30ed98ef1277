// src/shm/layout.rs
//! Bit-exact offsets and magic numbers for the 1 MiB shared-memory region
//! (`spec.md` §6). These are the only cross-trust contract between this
//! core and the peer on the companion OS; nothing here may change without
//! breaking wire compatibility.

/// Total size of the shared-memory region.
pub const REGION_SIZE: usize = 0x100_000;

/// Command ring offset and size: core -> peer.
pub const CMD_RING_OFFSET: usize = 0x00000;
pub const CMD_RING_BYTES: usize = 0x08000;

/// Response ring offset and size: peer -> core.
pub const RSP_RING_OFFSET: usize = 0x08000;
pub const RSP_RING_BYTES: usize = 0x08000;

/// Doorbell control block offset and size.
pub const DOORBELL_OFFSET: usize = 0x10000;
pub const DOORBELL_BYTES: usize = 256;

/// Heap control block offset and size.
pub const HEAP_CTL_OFFSET: usize = 0x10100;
pub const HEAP_CTL_BYTES: usize = 0xF00; // ~4 KiB less the 256 B doorbell slack

/// Heap data area offset and size.
pub const HEAP_DATA_OFFSET: usize = 0x11000;
pub const HEAP_DATA_BYTES: usize = 0xEF000;

/// Number of packet slots in each ring.
pub const RING_CAPACITY: u32 = 1024;

/// Ring magic numbers.
pub const CMD_RING_MAGIC: u32 = 0x51DE_CA9E;
pub const RSP_RING_MAGIC: u32 = 0x5253_5030;
pub const DOORBELL_MAGIC: u32 = 0x444F_4F52;
pub const HEAP_MAGIC: u32 = 0x4845_4150;
pub const BLOB_MAGIC: u32 = 0x424C_4F42; // "BLOB"
pub const IFR_MAGIC: u32 = 0x3046_5249; // "IFR0"

/// Command IDs (stable, §6).
pub const CMD_PING: u16 = 0x0001;
pub const CMD_PRINT: u16 = 0x0002;
pub const CMD_RUN_MODEL: u16 = 0x0010;

/// Peer-only extension command IDs. The substrate does not interpret
/// these; they are carried verbatim for advisory use by the peer.
pub const CMD_ENV_RESET: u16 = 0x0021;
pub const CMD_ENV_STEP: u16 = 0x0022;
pub const CMD_TELEMETRY_POLL: u16 = 0x0023;
pub const CMD_IFR_PERSIST: u16 = 0x0024;
pub const CMD_ARB_EPISODE: u16 = 0x0025;

/// Response status codes (§6). High bit marks a response.
pub const RSP_OK: u16 = 0x8000;
pub const RSP_ERROR: u16 = 0x8001;
pub const RSP_BUSY: u16 = 0x8002;

/// Doorbell flag bits.
pub const DOORBELL_FLAG_IRQ_ENABLED: u32 = 0x01;
pub const DOORBELL_FLAG_PENDING: u32 = 0x02;

/// Blob type tags (§6).
pub const BLOB_TYPE_RAW: u8 = 0x00;
pub const BLOB_TYPE_TENSOR: u8 = 0x01;
pub const BLOB_TYPE_MODEL_REF: u8 = 0x02;
pub const BLOB_TYPE_RESULT: u8 = 0x03;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_do_not_overlap_and_fit() {
        assert_eq!(CMD_RING_OFFSET + CMD_RING_BYTES, RSP_RING_OFFSET);
        assert_eq!(RSP_RING_OFFSET + RSP_RING_BYTES, DOORBELL_OFFSET);
        assert_eq!(DOORBELL_OFFSET + DOORBELL_BYTES, HEAP_CTL_OFFSET);
        assert!(HEAP_CTL_OFFSET + HEAP_CTL_BYTES <= HEAP_DATA_OFFSET);
        assert_eq!(HEAP_DATA_OFFSET + HEAP_DATA_BYTES, REGION_SIZE);
    }
}
