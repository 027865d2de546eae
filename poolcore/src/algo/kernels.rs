//! Digest kernels behind the algorithm registry.
//!
//! Each constructor returns a [`PowHasher`] whose kernel is a pure function of
//! its input; parameter validation happens inside the kernel so failures
//! surface through the hashing future.

use std::sync::Arc;

use digest::Digest;
use digest::consts::U32;
use groestl::Groestl512;
use sha2::Sha256;
use sha3::Keccak256;
use skein::Skein512;

use super::{Digest32, HashError, PowHasher};
use crate::wire::sha256d;

/// Double SHA-256.
pub(super) fn sha256d_hasher() -> PowHasher {
    PowHasher::new(Arc::new(|data, _ntime| Ok(sha256d(data))))
}

/// scrypt KDF with the input as both password and salt, p = 1, 32-byte output.
pub(super) fn scrypt_hasher(n: u32, r: u32) -> PowHasher {
    PowHasher::new(Arc::new(move |data, _ntime| {
        if n < 2 || !n.is_power_of_two() {
            return Err(HashError::Primitive(format!(
                "scrypt N must be a power of two >= 2, got {n}"
            )));
        }
        let log_n = n.trailing_zeros() as u8;
        let params = scrypt::Params::new(log_n, r, 1, 32)
            .map_err(|e| HashError::Primitive(e.to_string()))?;
        let mut out = [0u8; 32];
        scrypt::scrypt(data, data, &params, &mut out)
            .map_err(|e| HashError::Primitive(e.to_string()))?;
        Ok(out)
    }))
}

/// Keccak-256; the normal-hashing variant appends the block time and hashes
/// twice.
pub(super) fn keccak_hasher(normal_hashing: bool) -> PowHasher {
    if normal_hashing {
        PowHasher::new(Arc::new(|data, ntime| {
            let mut input = data.to_vec();
            input.extend_from_slice(&ntime_bytes(ntime)?);
            let first: Digest32 = Keccak256::digest(&input).into();
            Ok(Keccak256::digest(first).into())
        }))
    } else {
        PowHasher::new(Arc::new(|data, _ntime| Ok(Keccak256::digest(data).into())))
    }
}

/// Skein-512/256 followed by SHA-256.
pub(super) fn skein_hasher() -> PowHasher {
    PowHasher::new(Arc::new(|data, _ntime| {
        let inner: Digest32 = Skein512::<U32>::digest(data).into();
        Ok(Sha256::digest(inner).into())
    }))
}

/// Double Grøstl-512 truncated to 32 bytes.
pub(super) fn groestl_hasher() -> PowHasher {
    PowHasher::new(Arc::new(|data, _ntime| {
        let first = Groestl512::digest(data);
        let second = Groestl512::digest(first);
        let mut out = [0u8; 32];
        out.copy_from_slice(&second[..32]);
        Ok(out)
    }))
}

/// Block time as its minimal even-length hex rendering, decoded to bytes.
/// Odd-length hex is padded with one leading zero.
fn ntime_bytes(ntime: u32) -> Result<Vec<u8>, HashError> {
    let mut hex_str = format!("{ntime:x}");
    if hex_str.len() % 2 != 0 {
        hex_str.insert(0, '0');
    }
    hex::decode(&hex_str).map_err(|e| HashError::Primitive(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, &[0x00]; "zero renders as one padded byte")]
    #[test_case(1, &[0x01]; "odd length pads left")]
    #[test_case(0x10, &[0x10]; "even length unchanged")]
    #[test_case(0x100, &[0x01, 0x00]; "three digits pad to two bytes")]
    #[test_case(0x65432100, &[0x65, 0x43, 0x21, 0x00]; "full width")]
    fn ntime_rendering(ntime: u32, expected: &[u8]) {
        assert_eq!(ntime_bytes(ntime).unwrap(), expected);
    }
}
