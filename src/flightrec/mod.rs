// src/flightrec/mod.rs
//! Flight recorder: the always-on trace ring plus the hash-chained IFR
//! audit log built on top of it (`spec.md` §3, §4.5).

pub mod ifr;
pub mod trace;

use crate::hash::sha256;
use trace::TraceEvent;

/// Fold a trace event into bytes for sealing; deliberately coarser than
/// the ring's own layout (no `Debug`/reflection in `no_std`) but stable
/// across runs given the same events.
fn event_bytes(e: &TraceEvent) -> [u8; 32] {
    let mut b = [0u8; 32];
    b[0..8].copy_from_slice(&e.ts_usec.to_le_bytes());
    b[8..16].copy_from_slice(&e.ts_cycles.to_le_bytes());
    b[16] = e.event_type.tag();
    b[17] = e.flags;
    b[18..20].copy_from_slice(&e.cpu_id.to_le_bytes());
    b[20..24].copy_from_slice(&e.job_id.to_le_bytes());
    b[24..28].copy_from_slice(&e.step_id.to_le_bytes());
    b[28..32].copy_from_slice(&e.extra.to_le_bytes());
    b
}

/// The flight recorder's current seal: SHA-256 over every live event in
/// the ring, oldest first. An [`ifr::IfrRecordV3`] embeds this so that an
/// episode record attests to "everything the ring held at build time",
/// without requiring the ring itself to cross the trust boundary
/// (`spec.md` §4.5 step 5, "flightrec_seal_hash = current flight recorder
/// seal"). An empty ring seals to the hash of zero bytes.
pub fn seal(ring: &trace::TraceRing) -> [u8; 32] {
    let events = ring.dump();
    let mut buf = alloc::vec::Vec::with_capacity(events.len() * 32);
    for e in &events {
        buf.extend_from_slice(&event_bytes(e));
    }
    sha256(&buf)
}
