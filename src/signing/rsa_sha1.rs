//! RSA-SHA1 (RSASSA-PKCS1-v1_5) signing with consumer key pairs.

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
use rsa::{
	RsaPrivateKey, RsaPublicKey,
	pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey},
	pkcs1v15::{Signature, SigningKey, VerifyingKey},
	pkcs8::{DecodePrivateKey, DecodePublicKey},
	signature::{SignatureEncoding, Signer, Verifier},
};
use sha1::Sha1;
// self
use crate::{_prelude::*, error::ConfigError};

/// Consumer-side RSA-SHA1 signer.
#[derive(Clone)]
pub struct RsaSigner(SigningKey<Sha1>);
impl RsaSigner {
	/// Wraps a decoded private key.
	pub fn new(key: RsaPrivateKey) -> Self {
		Self(SigningKey::new(key))
	}

	/// Loads a PKCS#8 (`BEGIN PRIVATE KEY`) or PKCS#1 (`BEGIN RSA PRIVATE KEY`) PEM.
	pub fn from_pem(pem: &str) -> Result<Self, ConfigError> {
		let key = match RsaPrivateKey::from_pkcs8_pem(pem) {
			Ok(key) => key,
			Err(_) => RsaPrivateKey::from_pkcs1_pem(pem).map_err(ConfigError::invalid_rsa_key)?,
		};

		Ok(Self::new(key))
	}

	/// Base64 signature of `base_string`.
	pub fn sign(&self, base_string: &str) -> Result<String, ConfigError> {
		let signature = self.0.try_sign(base_string.as_bytes()).map_err(ConfigError::invalid_rsa_key)?;

		Ok(STANDARD.encode(signature.to_bytes()))
	}
}
impl Debug for RsaSigner {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("RsaSigner").field(&"<redacted>").finish()
	}
}

/// Service-provider-side RSA-SHA1 verifier built from a consumer's registered public key.
#[derive(Clone)]
pub struct RsaVerifier(VerifyingKey<Sha1>);
impl RsaVerifier {
	/// Wraps a decoded public key.
	pub fn new(key: RsaPublicKey) -> Self {
		Self(VerifyingKey::new(key))
	}

	/// Loads an SPKI (`BEGIN PUBLIC KEY`) or PKCS#1 (`BEGIN RSA PUBLIC KEY`) PEM.
	pub fn from_pem(pem: &str) -> Result<Self, ConfigError> {
		let key = match RsaPublicKey::from_public_key_pem(pem) {
			Ok(key) => key,
			Err(_) => RsaPublicKey::from_pkcs1_pem(pem).map_err(ConfigError::invalid_rsa_key)?,
		};

		Ok(Self::new(key))
	}

	/// Returns `true` when `signature` (base64) signs `base_string`.
	pub fn verify(&self, base_string: &str, signature: &str) -> bool {
		let Ok(raw) = STANDARD.decode(signature) else {
			return false;
		};
		let Ok(signature) = Signature::try_from(raw.as_slice()) else {
			return false;
		};

		self.0.verify(base_string.as_bytes(), &signature).is_ok()
	}
}
impl Debug for RsaVerifier {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("RsaVerifier")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	const PRIVATE_PEM: &str = include_str!("../../tests/fixtures/rsa_private.pem");
	const PUBLIC_PEM: &str = include_str!("../../tests/fixtures/rsa_public.pem");

	#[test]
	fn signatures_verify_with_the_matching_public_key() {
		let signer = RsaSigner::from_pem(PRIVATE_PEM).expect("Private key fixture should load.");
		let verifier = RsaVerifier::from_pem(PUBLIC_PEM).expect("Public key fixture should load.");
		let signature = signer.sign("GET&http%3A%2F%2Fphotos.example.net%2Fphotos&file%3Dvacation.jpg")
			.expect("Signing should succeed.");

		assert!(verifier.verify("GET&http%3A%2F%2Fphotos.example.net%2Fphotos&file%3Dvacation.jpg", &signature));
		assert!(!verifier.verify("GET&http%3A%2F%2Fphotos.example.net%2Fphotos&file%3Dother.jpg", &signature));
		assert!(!verifier.verify("GET&x", "not base64!"));
	}

	#[test]
	fn pkcs1v15_signatures_are_deterministic() {
		let signer = RsaSigner::from_pem(PRIVATE_PEM).expect("Private key fixture should load.");

		assert_eq!(
			signer.sign("base").expect("Signing should succeed."),
			signer.sign("base").expect("Signing should succeed.")
		);
		assert!(format!("{signer:?}").contains("<redacted>"));
	}

	#[test]
	fn garbage_pem_is_rejected() {
		assert!(matches!(RsaSigner::from_pem("nope"), Err(ConfigError::InvalidRsaKey { .. })));
		assert!(matches!(RsaVerifier::from_pem("nope"), Err(ConfigError::InvalidRsaKey { .. })));
	}
}
