//! Signature base string construction and the three OAuth 1.0 signature methods.

pub mod rsa_sha1;
pub mod shared;

pub use rsa_sha1::{RsaSigner, RsaVerifier};

// self
use crate::{
	_prelude::*,
	auth::Secret,
	error::{ConfigError, ProtocolError},
	message::{self, HttpMethod, ParameterSource, Parameters},
};

/// Signature method named by `oauth_signature_method`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureMethod {
	/// `HMAC-SHA1`
	#[serde(rename = "HMAC-SHA1")]
	HmacSha1,
	/// `RSA-SHA1`
	#[serde(rename = "RSA-SHA1")]
	RsaSha1,
	/// `PLAINTEXT`; only safe over TLS.
	#[serde(rename = "PLAINTEXT")]
	Plaintext,
}
impl SignatureMethod {
	/// Wire name.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::HmacSha1 => "HMAC-SHA1",
			Self::RsaSha1 => "RSA-SHA1",
			Self::Plaintext => "PLAINTEXT",
		}
	}
}
impl Display for SignatureMethod {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for SignatureMethod {
	type Err = ProtocolError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"HMAC-SHA1" => Ok(Self::HmacSha1),
			"RSA-SHA1" => Ok(Self::RsaSha1),
			"PLAINTEXT" => Ok(Self::Plaintext),
			other => Err(ProtocolError::UnsupportedSignatureMethod { method: other.to_owned() }),
		}
	}
}

/// Consumer and token secrets combined into the shared signing key.
#[derive(Clone, Copy, Debug)]
pub struct SigningSecrets<'a> {
	/// Consumer secret.
	pub consumer_secret: &'a Secret,
	/// Token secret; absent for request token requests.
	pub token_secret: Option<&'a Secret>,
}
impl<'a> SigningSecrets<'a> {
	/// Pairs a consumer secret with an optional token secret.
	pub fn new(consumer_secret: &'a Secret, token_secret: Option<&'a Secret>) -> Self {
		Self { consumer_secret, token_secret }
	}

	/// `encode(consumer_secret) & encode(token_secret)`.
	pub fn key(&self) -> String {
		format!(
			"{}&{}",
			message::encode(self.consumer_secret.expose()),
			message::encode(self.token_secret.map(Secret::expose).unwrap_or_default())
		)
	}
}

/// Base string URI: lowercase scheme and host, non-default port, path; no query or fragment.
pub fn base_string_uri(url: &Url) -> String {
	let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
	let port = url.port().map(|port| format!(":{port}")).unwrap_or_default();

	format!("{}://{host}{port}{}", url.scheme().to_ascii_lowercase(), url.path())
}

/// Normalized request parameters.
///
/// Every parameter except `oauth_signature` and the Authorization header `realm` is encoded,
/// sorted by encoded name then encoded value, and joined with `=` and `&`.
pub fn normalize_parameters(params: &Parameters) -> String {
	let mut pairs = params
		.iter()
		.filter(|param| param.name != message::SIGNATURE)
		.filter(|param| {
			!(param.name == message::REALM
				&& param.source == Some(ParameterSource::AuthorizationHeader))
		})
		.map(|param| (message::encode(&param.name), message::encode(&param.value)))
		.collect::<Vec<_>>();

	pairs.sort();

	pairs.into_iter().map(|(name, value)| format!("{name}={value}")).collect::<Vec<_>>().join("&")
}

/// Signature base string for a request.
pub fn signature_base_string(method: HttpMethod, url: &Url, params: &Parameters) -> String {
	let base = format!(
		"{}&{}&{}",
		method.as_str(),
		message::encode(&base_string_uri(url)),
		message::encode(&normalize_parameters(params))
	);

	#[cfg(feature = "tracing")]
	tracing::debug!(base_string = %base, "Computed signature base string.");

	base
}

/// Signs `base_string` with `method`.
pub fn sign(
	method: SignatureMethod,
	base_string: &str,
	secrets: SigningSecrets<'_>,
	rsa: Option<&RsaSigner>,
) -> Result<String, ConfigError> {
	match method {
		SignatureMethod::HmacSha1 => shared::sign_hmac_sha1(&secrets.key(), base_string),
		SignatureMethod::Plaintext => Ok(secrets.key()),
		SignatureMethod::RsaSha1 => rsa
			.ok_or(ConfigError::MissingSigningKey { method: SignatureMethod::RsaSha1.as_str() })?
			.sign(base_string),
	}
}

/// Checks `signature` against `base_string`, comparing in constant time.
pub fn verify(
	method: SignatureMethod,
	base_string: &str,
	signature: &str,
	secrets: SigningSecrets<'_>,
	rsa: Option<&RsaVerifier>,
) -> Result<bool, ConfigError> {
	match method {
		SignatureMethod::HmacSha1 => Ok(shared::signatures_match(
			&shared::sign_hmac_sha1(&secrets.key(), base_string)?,
			signature,
		)),
		SignatureMethod::Plaintext => Ok(shared::signatures_match(&secrets.key(), signature)),
		SignatureMethod::RsaSha1 => Ok(rsa
			.ok_or(ConfigError::MissingSigningKey { method: SignatureMethod::RsaSha1.as_str() })?
			.verify(base_string, signature)),
	}
}
