//! Consumer registrations held by a service provider.

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, RngCore};
// self
use crate::{
	_prelude::*,
	auth::{ConsumerKey, Secret},
};

const ALPHA_UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ALPHA_LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const NUMERIC: &[u8] = b"0123456789";
const ALPHANUMERIC_NO_LOOKALIKES: &[u8] = b"23456789abcdefghjkmnpqrstwxyzABCDEFGHJKMNPQRSTWXYZ";

/// Shape of the verification code handed to the consumer after user authorization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifierFormat {
	/// Random bytes, base64url encoded; only meaningful when the callback carries the code.
	IncludedInCallback,
	/// Letters and digits with look-alike characters (0/O, 1/l/I, ...) removed.
	#[default]
	AlphaNumericNoLookAlikes,
	/// Uppercase ASCII letters.
	AlphaUpper,
	/// Lowercase ASCII letters.
	AlphaLower,
	/// Decimal digits.
	Numeric,
}
impl VerifierFormat {
	/// Generates a fresh verification code of `length` characters (bytes for
	/// [`VerifierFormat::IncludedInCallback`]).
	pub fn generate(self, length: usize) -> Secret {
		let mut rng = rand::rng();
		let alphabet = match self {
			Self::IncludedInCallback => {
				let mut bytes = vec![0_u8; length];

				rng.fill_bytes(&mut bytes);

				return Secret::new(URL_SAFE_NO_PAD.encode(bytes));
			},
			Self::AlphaNumericNoLookAlikes => ALPHANUMERIC_NO_LOOKALIKES,
			Self::AlphaUpper => ALPHA_UPPER,
			Self::AlphaLower => ALPHA_LOWER,
			Self::Numeric => NUMERIC,
		};
		let code = (0..length)
			.map(|_| char::from(alphabet[rng.random_range(0..alphabet.len())]))
			.collect::<String>();

		Secret::new(code)
	}

	/// Returns `true` when the user must read the code off the screen.
	pub fn is_human_readable(self) -> bool {
		!matches!(self, Self::IncludedInCallback)
	}
}

/// Consumer registered with the service provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsumerDescription {
	/// Key sent as `oauth_consumer_key`.
	pub key: ConsumerKey,
	/// Shared secret used for HMAC-SHA1 and PLAINTEXT.
	pub secret: Secret,
	/// PEM encoded public key used to verify RSA-SHA1 signatures.
	pub rsa_public_key: Option<String>,
	/// Pre-registered callback; takes precedence over per-request callbacks for 1.0 consumers.
	pub callback: Option<Url>,
	/// Verification code shape override for this consumer.
	pub verifier_format: Option<VerifierFormat>,
	/// Verification code length override for this consumer.
	pub verifier_length: Option<usize>,
}
impl ConsumerDescription {
	/// Registers a consumer identified by a shared secret.
	pub fn new(key: ConsumerKey, secret: impl Into<Secret>) -> Self {
		Self {
			key,
			secret: secret.into(),
			rsa_public_key: None,
			callback: None,
			verifier_format: None,
			verifier_length: None,
		}
	}

	/// Attaches the PEM encoded RSA public key for RSA-SHA1 verification.
	pub fn with_rsa_public_key(mut self, pem: impl Into<String>) -> Self {
		self.rsa_public_key = Some(pem.into());

		self
	}

	/// Records a pre-registered callback.
	pub fn with_callback(mut self, callback: Url) -> Self {
		self.callback = Some(callback);

		self
	}

	/// Overrides the verification code shape and length issued to this consumer.
	pub fn with_verifier(mut self, format: VerifierFormat, length: usize) -> Self {
		self.verifier_format = Some(format);
		self.verifier_length = Some(length);

		self
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn generated_codes_respect_alphabet_and_length() {
		let code = VerifierFormat::AlphaNumericNoLookAlikes.generate(32);

		assert_eq!(code.expose().len(), 32);
		assert!(code.expose().bytes().all(|b| ALPHANUMERIC_NO_LOOKALIKES.contains(&b)));
		assert!(VerifierFormat::Numeric.generate(6).expose().bytes().all(|b| b.is_ascii_digit()));
		assert!(
			VerifierFormat::AlphaUpper
				.generate(6)
				.expose()
				.bytes()
				.all(|b| b.is_ascii_uppercase())
		);
		assert!(
			VerifierFormat::AlphaLower
				.generate(6)
				.expose()
				.bytes()
				.all(|b| b.is_ascii_lowercase())
		);
	}

	#[test]
	fn callback_codes_are_url_safe() {
		let code = VerifierFormat::IncludedInCallback.generate(16);

		assert!(!VerifierFormat::IncludedInCallback.is_human_readable());
		assert!(
			code.expose().bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
		);
		assert_eq!(code.expose().len(), 22);
	}

	#[test]
	fn descriptions_deserialize_with_optional_fields() {
		let consumer: ConsumerDescription = serde_json::from_str(
			r#"{"key":"dpf43f3p2l4k3l03","secret":"kd94hf93k423kf44","rsa_public_key":null,"callback":"https://printer.example.com/ready","verifier_format":"numeric","verifier_length":6}"#,
		)
		.expect("Consumer description should deserialize.");

		assert_eq!(consumer.key.as_ref(), "dpf43f3p2l4k3l03");
		assert_eq!(consumer.verifier_format, Some(VerifierFormat::Numeric));
		assert!(consumer.callback.is_some());
	}
}
