//! Shared-secret signatures: HMAC-SHA1, HMAC-SHA256, and PLAINTEXT.

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;
// self
use crate::{_prelude::*, error::ConfigError};

/// Raw HMAC-SHA1 over `message`.
pub fn hmac_sha1(key: &[u8], message: &[u8]) -> Result<Vec<u8>, ConfigError> {
	let mut mac = Hmac::<Sha1>::new_from_slice(key).map_err(invalid_key)?;

	mac.update(message);

	Ok(mac.finalize().into_bytes().to_vec())
}

/// Raw HMAC-SHA256 over `message`.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> Result<Vec<u8>, ConfigError> {
	let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(invalid_key)?;

	mac.update(message);

	Ok(mac.finalize().into_bytes().to_vec())
}

/// Base64 HMAC-SHA1 signature of `base_string`.
pub fn sign_hmac_sha1(key: &str, base_string: &str) -> Result<String, ConfigError> {
	Ok(STANDARD.encode(hmac_sha1(key.as_bytes(), base_string.as_bytes())?))
}

/// Constant-time comparison of two signature strings.
pub fn signatures_match(expected: &str, provided: &str) -> bool {
	expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

fn invalid_key(e: impl Display) -> ConfigError {
	ConfigError::InvalidSetting { field: "signing_key", reason: e.to_string() }
}
