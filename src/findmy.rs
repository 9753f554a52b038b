//! Apple Find My (offline finding) key layout and advertisement encoding.
//!
//! The signalling endpoint hands out tags as base64 text that decodes to a
//! 38-byte dump of a captured tracker advertisement. The tracker's P-224
//! public key is spread across that dump:
//!
//! - bytes 0..6 are the link-layer address, least significant byte first;
//!   its low 6 bits of the top byte are key bits, the top 2 bits were forced
//!   to `11` by the tracker
//! - byte 35 carries the two key bits the address could not hold
//! - bytes 13..35 are the last 22 key bytes verbatim
//!
//! Re-advertising a tag reverses that: the first 6 key bytes become the
//! static random address, the other 22 go into the manufacturer data.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::DecodeError;

/// Decoded tag payload length.
pub const RAW_PAYLOAD_LEN: usize = 38;
/// Longest base64 text that can encode `RAW_PAYLOAD_LEN` bytes.
pub const PAYLOAD_TEXT_LEN: usize = 52;
/// NIST P-224 public key x-coordinate: 224 bits.
pub const KEY_LEN: usize = 28;
/// BLE link-layer address.
pub const ADDR_LEN: usize = 6;
/// BLE legacy advertising data limit.
pub const PAYLOAD_LEN: usize = 31;

pub type RawPayload = [u8; RAW_PAYLOAD_LEN];
pub type PublicKey = [u8; KEY_LEN];
/// Most significant byte first, as printed `C5:04:03:02:01:00`.
pub type BleAddress = [u8; ADDR_LEN];
pub type AdvertisementPayload = [u8; PAYLOAD_LEN];

/// Offline finding header: length 30, manufacturer data, Apple (0x004C LE),
/// offline finding type 0x12, 25 data bytes, status byte.
const PAYLOAD_HEADER: [u8; 7] = [0x1e, 0xff, 0x4c, 0x00, 0x12, 0x19, 0x10];

// Padded input of up to 52 chars decodes to at most 39 bytes. Decoding into a
// slightly larger buffer lets a 39-byte result report as a length mismatch
// instead of a buffer error.
const DECODE_SCRATCH_LEN: usize = RAW_PAYLOAD_LEN + 1;

/// Decode a tag's base64 text into the raw 38-byte payload.
pub fn decode_payload(text: &str) -> Result<RawPayload, DecodeError> {
    if text.len() > PAYLOAD_TEXT_LEN {
        return Err(DecodeError::TooLong(text.len()));
    }

    let mut scratch = [0u8; DECODE_SCRATCH_LEN];
    let written = STANDARD
        .decode_slice(text.as_bytes(), &mut scratch)
        .map_err(|_| DecodeError::InvalidBase64)?;
    if written != RAW_PAYLOAD_LEN {
        return Err(DecodeError::WrongLength(written));
    }

    let mut raw = [0u8; RAW_PAYLOAD_LEN];
    raw.copy_from_slice(&scratch[..RAW_PAYLOAD_LEN]);
    Ok(raw)
}

/// Reassemble the public key from a raw tag payload.
pub fn extract_key(raw: &RawPayload) -> PublicKey {
    let mut key = [0u8; KEY_LEN];
    key[0] = ((raw[35] << 6) & 0xc0) | (raw[5] & 0x3f);
    for i in 1..6 {
        key[i] = raw[5 - i];
    }
    key[6..].copy_from_slice(&raw[13..35]);
    key
}

/// Static random address from the first 6 key bytes.
pub fn build_address(key: &PublicKey) -> BleAddress {
    let mut addr = [0u8; ADDR_LEN];
    addr.copy_from_slice(&key[..ADDR_LEN]);
    addr[0] |= 0xc0;
    addr
}

/// Build the 31-byte Find My advertisement payload from a public key.
pub fn build_payload(key: &PublicKey) -> AdvertisementPayload {
    let mut payload = [0u8; PAYLOAD_LEN];
    payload[..7].copy_from_slice(&PAYLOAD_HEADER);
    payload[7..29].copy_from_slice(&key[6..28]);
    payload[29] = (key[0] >> 6) & 0x03; // Bits the address overwrote
    payload[30] = 0x00; // Hint byte (reserved)
    payload
}

/// Everything the radio needs to impersonate one tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Beacon {
    pub address: BleAddress,
    pub payload: AdvertisementPayload,
}

impl Beacon {
    pub fn from_key(key: &PublicKey) -> Self {
        Self {
            address: build_address(key),
            payload: build_payload(key),
        }
    }

    /// Decode a tag's base64 text straight into a beacon.
    pub fn from_text(text: &str) -> Result<Self, DecodeError> {
        let raw = decode_payload(text)?;
        Ok(Self::from_key(&extract_key(&raw)))
    }
}

// ============================================================================
// Tests
// ============================================================================
