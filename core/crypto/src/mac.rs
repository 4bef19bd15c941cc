//! HMAC-SHA512 signing for the configuration token.

use hmac::{Hmac, Mac};
use sha2::Sha512;
use subtle::ConstantTimeEq;

use crate::keys::MacKey;
use strongbox_common::{Error, Result};

type HmacSha512 = Hmac<Sha512>;

/// Name of the signing algorithm, as recorded in the token header.
pub const MAC_ALGORITHM: &str = "HmacSHA512";

/// Length of an HMAC-SHA512 tag in bytes.
pub const MAC_LENGTH: usize = 64;

/// Compute the HMAC-SHA512 of `data` under `key`.
pub fn sign(key: &MacKey, data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = <HmacSha512 as Mac>::new_from_slice(key.as_bytes())
        .map_err(|e| Error::Internal(format!("HMAC init failed: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Check `tag` against the HMAC-SHA512 of `data` in constant time.
pub fn verify(key: &MacKey, data: &[u8], tag: &[u8]) -> Result<bool> {
    let expected = sign(key, data)?;
    Ok(expected.len() == tag.len() && bool::from(expected.ct_eq(tag)))
}
