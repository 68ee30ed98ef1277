// src/shm/packet.rs
//! Wire-format command/response packets (`spec.md` §3, §6). Sixteen bytes,
//! little-endian, packed - no padding may be introduced by the compiler
//! since these are read and written byte-for-byte across the trust
//! boundary.

/// Command packet: core -> peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    pub cmd: u16,
    pub flags: u16,
    pub payload_id: u32,
    pub timestamp: u64,
}

/// Response packet: peer -> core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub orig_cmd: u16,
    pub result: u32,
    pub timestamp: u64,
}

/// Byte size of both packet kinds on the wire.
pub const PACKET_BYTES: usize = 16;

impl Packet {
    pub fn to_bytes(self) -> [u8; PACKET_BYTES] {
        let mut out = [0u8; PACKET_BYTES];
        out[0..2].copy_from_slice(&self.cmd.to_le_bytes());
        out[2..4].copy_from_slice(&self.flags.to_le_bytes());
        out[4..8].copy_from_slice(&self.payload_id.to_le_bytes());
        out[8..16].copy_from_slice(&self.timestamp.to_le_bytes());
        out
    }

    pub fn from_bytes(b: &[u8; PACKET_BYTES]) -> Self {
        Self {
            cmd: u16::from_le_bytes([b[0], b[1]]),
            flags: u16::from_le_bytes([b[2], b[3]]),
            payload_id: u32::from_le_bytes([b[4], b[5], b[6], b[7]]),
            timestamp: u64::from_le_bytes([
                b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15],
            ]),
        }
    }
}

impl Response {
    pub fn to_bytes(self) -> [u8; PACKET_BYTES] {
        let mut out = [0u8; PACKET_BYTES];
        out[0..2].copy_from_slice(&self.status.to_le_bytes());
        out[2..4].copy_from_slice(&self.orig_cmd.to_le_bytes());
        out[4..8].copy_from_slice(&self.result.to_le_bytes());
        out[8..16].copy_from_slice(&self.timestamp.to_le_bytes());
        out
    }

    pub fn from_bytes(b: &[u8; PACKET_BYTES]) -> Self {
        Self {
            status: u16::from_le_bytes([b[0], b[1]]),
            orig_cmd: u16::from_le_bytes([b[2], b[3]]),
            result: u32::from_le_bytes([b[4], b[5], b[6], b[7]]),
            timestamp: u64::from_le_bytes([
                b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15],
            ]),
        }
    }

    /// True if the high bit that marks a response status is set and the
    /// status equals `RSP_OK`.
    pub fn is_ok(&self) -> bool {
        self.status == crate::shm::layout::RSP_OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_round_trips() {
        let p = Packet {
            cmd: 0x0010,
            flags: 0x0001,
            payload_id: 0xDEAD_BEEF,
            timestamp: 0x1122_3344_5566_7788,
        };
        assert_eq!(Packet::from_bytes(&p.to_bytes()), p);
    }

    #[test]
    fn response_round_trips() {
        let r = Response {
            status: 0x8000,
            orig_cmd: 0x0001,
            result: 0x504F_4E47,
            timestamp: 42,
        };
        assert_eq!(Response::from_bytes(&r.to_bytes()), r);
    }
}
