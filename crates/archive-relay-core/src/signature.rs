//! # Signature Verification
//!
//! HMAC-SHA256 verification of raw webhook bodies.
//!
//! Bitbucket sends the digest in the `X-Hub-Signature` header as
//! `<algorithm>=<hex-digest>`. Only the lowercase digest portion is compared;
//! the algorithm label is not interpreted.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature (lowercase, as normalised by the relay)
pub const SIGNATURE_HEADER: &str = "x-hub-signature";

/// Signature verification failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("Signature missing")]
    Missing,

    #[error("Signature header is not of the form '<algorithm>=<hex-digest>'")]
    Malformed,

    #[error("Signature mismatch")]
    Mismatch,

    #[error("Signing secret cannot be used as an HMAC key")]
    InvalidKey,
}

/// Compute the hex-encoded HMAC-SHA256 of `body` keyed by `secret`.
///
/// # Examples
///
/// ```
/// use archive_relay_core::signature::compute_signature;
///
/// let digest = compute_signature(b"secret", b"{}").unwrap();
/// assert_eq!(digest.len(), 64);
/// ```
pub fn compute_signature(secret: &[u8], body: &[u8]) -> Result<String, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a signature header value against the raw request body.
///
/// The digest is the text between the first and second `=` of the header;
/// anything after a second `=` is ignored. It must be the lowercase hex
/// encoding of the HMAC of `body`, exactly as [`compute_signature`] renders
/// it. The comparison is done by [`Mac::verify_slice`], which is constant
/// time.
///
/// # Errors
///
/// - [`SignatureError::Malformed`] when there is no `=` or the digest contains
///   anything other than lowercase hex digits
/// - [`SignatureError::Mismatch`] when the digest does not match
pub fn verify_signature(secret: &[u8], body: &[u8], header: &str) -> Result<(), SignatureError> {
    let digest = header.split('=').nth(1).ok_or(SignatureError::Malformed)?;
    if !digest
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return Err(SignatureError::Malformed);
    }
    let expected = hex::decode(digest).map_err(|_| SignatureError::Malformed)?;

    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(body);

    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;
