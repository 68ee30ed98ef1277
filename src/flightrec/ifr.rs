// src/flightrec/ifr.rs
//! IFR v3: hash-chained, tamper-evident episode records (`spec.md` §3,
//! §4.5). 324 bytes on the wire, little-endian, packed.

use crate::hash::{sha256, sha256_chain};
use crate::shm::layout::IFR_MAGIC;

pub const IFR_VERSION_V3: u16 = 3;
pub const IFR_V3_RECORD_BYTES: usize = 324;

pub const FLAG_SIG_UNAVAILABLE: u16 = 0x0001;
pub const FLAG_MODEL_DIGEST_MISSING: u16 = 0x0002;
pub const FLAG_POLICY_DIGEST_PLACEHOLDER: u16 = 0x0004;
pub const FLAG_SEAL_HASH_MISSING: u16 = 0x0008;

/// Bytes of `"zenedge-policy-v1"` hashed to produce `policy_digest` until a
/// real policy-versioning scheme exists (`spec.md` §4.5 step 4).
const POLICY_PLACEHOLDER: &[u8] = b"zenedge-policy-v1";

/// Inputs the caller supplies to [`build_v3`]; everything else is derived.
#[derive(Debug, Clone, Copy)]
pub struct EpisodeInputs {
    pub job_id: u32,
    pub episode_id: u32,
    pub model_id: u32,
    pub goodput: f32,
}

/// Hash-chained episode record (`spec.md` §3 "IFR record (324 B v3)").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IfrRecordV3 {
    pub magic: u32,
    pub version: u16,
    pub flags: u16,
    pub record_size: u32,
    pub job_id: u32,
    pub episode_id: u32,
    pub model_id: u32,
    pub ts_usec: u64,
    pub goodput: f32,
    pub nonce: [u8; 32],
    pub model_digest: [u8; 32],
    pub policy_digest: [u8; 32],
    pub flightrec_seal_hash: [u8; 32],
    pub prev_chain_hash: [u8; 32],
    pub ifr_hash: [u8; 32],
    pub chain_hash: [u8; 32],
    pub sig_classical: [u8; 64],
}

/// Bytes of the header through `prev_chain_hash`, i.e. everything that
/// `ifr_hash` covers (`spec.md` §3: "`ifr_hash` = SHA-256 over bytes
/// preceding `ifr_hash`").
fn header_bytes(rec: &IfrRecordV3) -> alloc::vec::Vec<u8> {
    let mut b = alloc::vec::Vec::with_capacity(196);
    b.extend_from_slice(&rec.magic.to_le_bytes());
    b.extend_from_slice(&rec.version.to_le_bytes());
    b.extend_from_slice(&rec.flags.to_le_bytes());
    b.extend_from_slice(&rec.record_size.to_le_bytes());
    b.extend_from_slice(&rec.job_id.to_le_bytes());
    b.extend_from_slice(&rec.episode_id.to_le_bytes());
    b.extend_from_slice(&rec.model_id.to_le_bytes());
    b.extend_from_slice(&rec.ts_usec.to_le_bytes());
    b.extend_from_slice(&rec.goodput.to_le_bytes());
    b.extend_from_slice(&rec.nonce);
    b.extend_from_slice(&rec.model_digest);
    b.extend_from_slice(&rec.policy_digest);
    b.extend_from_slice(&rec.flightrec_seal_hash);
    b.extend_from_slice(&rec.prev_chain_hash);
    b
}

/// Build an episode record chained onto `prev_chain_hash` (`spec.md` §4.5
/// "Episode record build (IFR v3)").
///
/// `model_data` is the model blob's bytes (`heap_get_data(model)` in the
/// original); `None` means the model could not be resolved and
/// `MODEL_DIGEST_MISSING` is set with a zeroed digest. `seal_hash` is the
/// flight recorder's current seal (see [`crate::flightrec::seal`]).
pub fn build_v3(
    prev_chain_hash: [u8; 32],
    inputs: EpisodeInputs,
    ts_usec: u64,
    ts_cycles: u64,
    model_data: Option<&[u8]>,
    seal_hash: [u8; 32],
) -> IfrRecordV3 {
    let mut flags = 0u16;

    let nonce = sha256_chain(&[&ts_usec.to_le_bytes(), &ts_cycles.to_le_bytes()]);

    let model_digest = match model_data {
        Some(data) => sha256(data),
        None => {
            flags |= FLAG_MODEL_DIGEST_MISSING;
            [0u8; 32]
        }
    };

    flags |= FLAG_POLICY_DIGEST_PLACEHOLDER;
    let policy_digest = sha256(POLICY_PLACEHOLDER);

    flags |= FLAG_SIG_UNAVAILABLE;

    let mut rec = IfrRecordV3 {
        magic: IFR_MAGIC,
        version: IFR_VERSION_V3,
        flags,
        record_size: IFR_V3_RECORD_BYTES as u32,
        job_id: inputs.job_id,
        episode_id: inputs.episode_id,
        model_id: inputs.model_id,
        ts_usec,
        goodput: inputs.goodput,
        nonce,
        model_digest,
        policy_digest,
        flightrec_seal_hash: seal_hash,
        prev_chain_hash,
        ifr_hash: [0u8; 32],
        chain_hash: [0u8; 32],
        sig_classical: [0u8; 64],
    };

    rec.ifr_hash = sha256(&header_bytes(&rec));
    rec.chain_hash = sha256_chain(&[
        &rec.prev_chain_hash,
        &rec.ifr_hash,
        &rec.flightrec_seal_hash,
        &rec.nonce,
        &rec.model_digest,
        &rec.policy_digest,
    ]);
    rec
}

/// Recompute `ifr_hash` and `chain_hash`; accept iff both match the stored
/// fields and magic/version/size are exact (`spec.md` §4.5 "Verify").
pub fn verify_v3(rec: &IfrRecordV3) -> bool {
    if rec.magic != IFR_MAGIC
        || rec.version != IFR_VERSION_V3
        || rec.record_size != IFR_V3_RECORD_BYTES as u32
    {
        return false;
    }
    let expected_ifr_hash = sha256(&header_bytes(rec));
    if expected_ifr_hash != rec.ifr_hash {
        return false;
    }
    let expected_chain_hash = sha256_chain(&[
        &rec.prev_chain_hash,
        &rec.ifr_hash,
        &rec.flightrec_seal_hash,
        &rec.nonce,
        &rec.model_digest,
        &rec.policy_digest,
    ]);
    expected_chain_hash == rec.chain_hash
}

impl IfrRecordV3 {
    pub fn to_bytes(&self) -> [u8; IFR_V3_RECORD_BYTES] {
        let mut out = [0u8; IFR_V3_RECORD_BYTES];
        let mut off = 0;
        macro_rules! put {
            ($bytes:expr) => {{
                let b = $bytes;
                out[off..off + b.len()].copy_from_slice(&b);
                off += b.len();
            }};
        }
        put!(self.magic.to_le_bytes());
        put!(self.version.to_le_bytes());
        put!(self.flags.to_le_bytes());
        put!(self.record_size.to_le_bytes());
        put!(self.job_id.to_le_bytes());
        put!(self.episode_id.to_le_bytes());
        put!(self.model_id.to_le_bytes());
        put!(self.ts_usec.to_le_bytes());
        put!(self.goodput.to_le_bytes());
        put!(self.nonce);
        put!(self.model_digest);
        put!(self.policy_digest);
        put!(self.flightrec_seal_hash);
        put!(self.prev_chain_hash);
        put!(self.ifr_hash);
        put!(self.chain_hash);
        put!(self.sig_classical);
        debug_assert_eq!(off, IFR_V3_RECORD_BYTES);
        out
    }

    pub fn from_bytes(b: &[u8; IFR_V3_RECORD_BYTES]) -> Self {
        let mut off = 0;
        macro_rules! take {
            ($n:expr) => {{
                let s = &b[off..off + $n];
                off += $n;
                s
            }};
        }
        let magic = u32::from_le_bytes(take!(4).try_into().unwrap());
        let version = u16::from_le_bytes(take!(2).try_into().unwrap());
        let flags = u16::from_le_bytes(take!(2).try_into().unwrap());
        let record_size = u32::from_le_bytes(take!(4).try_into().unwrap());
        let job_id = u32::from_le_bytes(take!(4).try_into().unwrap());
        let episode_id = u32::from_le_bytes(take!(4).try_into().unwrap());
        let model_id = u32::from_le_bytes(take!(4).try_into().unwrap());
        let ts_usec = u64::from_le_bytes(take!(8).try_into().unwrap());
        let goodput = f32::from_le_bytes(take!(4).try_into().unwrap());
        let nonce: [u8; 32] = take!(32).try_into().unwrap();
        let model_digest: [u8; 32] = take!(32).try_into().unwrap();
        let policy_digest: [u8; 32] = take!(32).try_into().unwrap();
        let flightrec_seal_hash: [u8; 32] = take!(32).try_into().unwrap();
        let prev_chain_hash: [u8; 32] = take!(32).try_into().unwrap();
        let ifr_hash: [u8; 32] = take!(32).try_into().unwrap();
        let chain_hash: [u8; 32] = take!(32).try_into().unwrap();
        let sig_classical: [u8; 64] = take!(64).try_into().unwrap();
        debug_assert_eq!(off, IFR_V3_RECORD_BYTES);
        Self {
            magic,
            version,
            flags,
            record_size,
            job_id,
            episode_id,
            model_id,
            ts_usec,
            goodput,
            nonce,
            model_digest,
            policy_digest,
            flightrec_seal_hash,
            prev_chain_hash,
            ifr_hash,
            chain_hash,
            sig_classical,
        }
    }
}
