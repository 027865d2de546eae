//! Byte and number codec shared by the coinbase builder and block template.
//!
//! Everything here reproduces the exact wire conventions of Bitcoin-family
//! daemons: varints, scriptSig number pushes, byte-order reversals and the
//! base58 address-to-script conversion. A single wrong byte in any of these
//! invalidates a block, so the encoders are covered by known-vector tests.

use bitcoin::base58;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Decode failures in externally supplied hex and addresses.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("invalid hex in {field}: {source}")]
    BadHex {
        field: &'static str,
        #[source]
        source: hex::FromHexError,
    },

    #[error("{field} must be {expected} bytes, got {actual}")]
    BadLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid base58 address: {0}")]
    BadAddress(#[from] base58::Error),

    #[error("address payload too short for a hash160")]
    ShortAddress,
}

/// Double SHA-256, the block/transaction hash of Bitcoin-family chains.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// Bitcoin variable-length integer.
pub fn var_int(n: u64) -> Vec<u8> {
    match n {
        0..=0xfc => vec![n as u8],
        0xfd..=0xffff => {
            let mut out = vec![0xfd];
            out.extend_from_slice(&(n as u16).to_le_bytes());
            out
        }
        0x1_0000..=0xffff_ffff => {
            let mut out = vec![0xfe];
            out.extend_from_slice(&(n as u32).to_le_bytes());
            out
        }
        _ => {
            let mut out = vec![0xff];
            out.extend_from_slice(&n.to_le_bytes());
            out
        }
    }
}

/// Varint length prefix followed by the payload.
pub fn var_bytes(payload: &[u8]) -> Vec<u8> {
    let mut out = var_int(payload.len() as u64);
    out.extend_from_slice(payload);
    out
}

/// Length-prefixed string, as coinbase signatures and tx comments are framed.
pub fn var_string(s: &str) -> Vec<u8> {
    var_bytes(s.as_bytes())
}

/// Script number push used for the height and timestamp in a coinbase
/// scriptSig.
///
/// Values 1..=16 become the single opcode `OP_1`..`OP_16`; anything else is a
/// length byte followed by the minimal little-endian encoding. Bytes are
/// emitted while the remaining value exceeds 0x7f, so the top byte never has
/// the sign bit set.
pub fn script_number(n: u64) -> Vec<u8> {
    if (1..=16).contains(&n) {
        return vec![0x50 + n as u8];
    }
    let mut out = vec![0u8];
    let mut n = n;
    while n > 0x7f {
        out.push((n & 0xff) as u8);
        n >>= 8;
    }
    out.push(n as u8);
    out[0] = (out.len() - 1) as u8;
    out
}

/// Full byte reversal.
pub fn reverse(data: &[u8]) -> Vec<u8> {
    data.iter().rev().copied().collect()
}

/// Endian-swap each 32-bit word in place, then reverse the whole buffer.
///
/// Net effect: the eight 4-byte words keep their internal byte order but the
/// word order is reversed. This is the previous-block-hash presentation order
/// the stratum protocol expects.
pub fn reverse_u32_words(data: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (i, word) in data.chunks_exact(4).enumerate() {
        let swapped = u32::from_be_bytes([word[0], word[1], word[2], word[3]]).to_le_bytes();
        out[i * 4..i * 4 + 4].copy_from_slice(&swapped);
    }
    out.reverse();
    out
}

/// Hex decode with the field name preserved in the error.
pub fn bytes_from_hex(hex_str: &str, field: &'static str) -> Result<Vec<u8>, WireError> {
    hex::decode(hex_str).map_err(|source| WireError::BadHex { field, source })
}

/// Decode a 32-byte hash from hex, keeping the RPC (display) byte order.
pub fn hash32(hex_str: &str, field: &'static str) -> Result<[u8; 32], WireError> {
    let raw = bytes_from_hex(hex_str, field)?;
    raw.try_into().map_err(|v: Vec<u8>| WireError::BadLength {
        field,
        expected: 32,
        actual: v.len(),
    })
}

/// Decode a 32-byte hash from hex and reverse it into internal byte order.
pub fn reversed_hash32(hex_str: &str, field: &'static str) -> Result<[u8; 32], WireError> {
    let mut out = hash32(hex_str, field)?;
    out.reverse();
    Ok(out)
}

/// Convert a base58check address to its P2PKH output script.
///
/// The checksum is verified; the version byte is dropped and the hash160 is
/// wrapped in `OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG`.
pub fn address_to_script(address: &str) -> Result<Vec<u8>, WireError> {
    let payload = base58::decode_check(address)?;
    if payload.len() < 21 {
        return Err(WireError::ShortAddress);
    }
    let mut script = Vec::with_capacity(25);
    script.push(0x76); // OP_DUP
    script.push(0xa9); // OP_HASH160
    script.push(0x14);
    script.extend_from_slice(&payload[1..21]);
    script.push(0x88); // OP_EQUALVERIFY
    script.push(0xac); // OP_CHECKSIG
    Ok(script)
}
