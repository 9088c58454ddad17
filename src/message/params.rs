//! The `oauth_*` wire parameters and the verified view binding elements operate on.

// std
use std::collections::HashSet;
// self
use crate::{
	_prelude::*,
	auth::{ConsumerKey, Nonce, TokenKey},
	error::ProtocolError,
	message::{HttpRequest, ParameterSource, Parameters, ProtocolVersion},
	signing::SignatureMethod,
};

/// `oauth_consumer_key`
pub const CONSUMER_KEY: &str = "oauth_consumer_key";
/// `oauth_token`
pub const TOKEN: &str = "oauth_token";
/// `oauth_token_secret`
pub const TOKEN_SECRET: &str = "oauth_token_secret";
/// `oauth_signature_method`
pub const SIGNATURE_METHOD: &str = "oauth_signature_method";
/// `oauth_signature`
pub const SIGNATURE: &str = "oauth_signature";
/// `oauth_timestamp`
pub const TIMESTAMP: &str = "oauth_timestamp";
/// `oauth_nonce`
pub const NONCE: &str = "oauth_nonce";
/// `oauth_version`
pub const VERSION: &str = "oauth_version";
/// `oauth_callback`
pub const CALLBACK: &str = "oauth_callback";
/// `oauth_callback_confirmed`
pub const CALLBACK_CONFIRMED: &str = "oauth_callback_confirmed";
/// `oauth_verifier`
pub const VERIFIER: &str = "oauth_verifier";
/// `oauth_problem`
pub const PROBLEM: &str = "oauth_problem";
/// `realm`
pub const REALM: &str = "realm";

const OUT_OF_BAND: &str = "oob";
const SUPPORTED_VERSION: &str = "1.0";

/// Callback supplied by a consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Callback {
	/// `oob`: the user copies the verifier by hand.
	OutOfBand,
	/// Absolute URL the user agent is redirected to.
	Url(Url),
}
impl Callback {
	/// Redirect target, if any.
	pub fn url(&self) -> Option<&Url> {
		match self {
			Self::OutOfBand => None,
			Self::Url(url) => Some(url),
		}
	}

	/// Wire form of the callback.
	pub fn as_wire(&self) -> &str {
		match self {
			Self::OutOfBand => OUT_OF_BAND,
			Self::Url(url) => url.as_str(),
		}
	}
}
impl FromStr for Callback {
	type Err = ProtocolError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.eq_ignore_ascii_case(OUT_OF_BAND) {
			return Ok(Self::OutOfBand);
		}

		let url = Url::parse(s).map_err(|e| ProtocolError::malformed(CALLBACK, e))?;

		if !matches!(url.scheme(), "http" | "https") {
			return Err(ProtocolError::malformed(CALLBACK, "callback must be an http(s) URL"));
		}

		Ok(Self::Url(url))
	}
}

/// Endpoint an incoming signed message was addressed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
	/// Request token endpoint.
	RequestToken,
	/// Access token endpoint.
	AccessToken,
	/// Protected resource.
	ProtectedResource,
}
impl MessageKind {
	/// Protocol version implied by the parameters for this endpoint.
	///
	/// Request token requests carrying `oauth_callback` and access token requests carrying
	/// `oauth_verifier` are 1.0a; everything else is treated as 1.0.
	pub fn infer_version(self, params: &ProtocolParams) -> ProtocolVersion {
		let revised = match self {
			Self::RequestToken => params.callback.is_some(),
			Self::AccessToken => params.verifier.is_some(),
			Self::ProtectedResource => true,
		};

		if revised { ProtocolVersion::V10a } else { ProtocolVersion::V10 }
	}

	/// Whether the endpoint requires an `oauth_token`.
	pub fn requires_token(self) -> bool {
		!matches!(self, Self::RequestToken)
	}
}
impl Display for MessageKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(match self {
			Self::RequestToken => "request_token",
			Self::AccessToken => "access_token",
			Self::ProtectedResource => "protected_resource",
		})
	}
}

/// Typed `oauth_*` parameters of a signed request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolParams {
	/// `oauth_consumer_key`
	pub consumer_key: ConsumerKey,
	/// `oauth_token`
	pub token: Option<TokenKey>,
	/// `oauth_signature_method`
	pub signature_method: SignatureMethod,
	/// `oauth_signature`, already percent-decoded.
	pub signature: String,
	/// `oauth_timestamp`
	pub timestamp: OffsetDateTime,
	/// `oauth_nonce`
	pub nonce: Nonce,
	/// `oauth_callback`
	pub callback: Option<Callback>,
	/// `oauth_verifier`
	pub verifier: Option<String>,
}
impl ProtocolParams {
	/// Extracts and validates the protocol parameters.
	///
	/// Protocol parameters may not repeat across sources, `oauth_version` must be `1.0` when
	/// present, and the signature method must be one this crate understands.
	pub fn extract(params: &Parameters) -> Result<Self, ProtocolError> {
		let mut seen = HashSet::new();

		for param in params {
			let counted = param.name.starts_with("oauth_")
				|| (param.name == REALM && param.source == Some(ParameterSource::AuthorizationHeader));

			if counted && !seen.insert(param.name.as_str()) {
				return Err(ProtocolError::DuplicateParameter { name: param.name.clone() });
			}
		}

		if let Some(version) = params.get(VERSION).filter(|version| *version != SUPPORTED_VERSION) {
			return Err(ProtocolError::UnsupportedVersion { version: version.to_owned() });
		}

		let consumer_key =
			ConsumerKey::new(required(params, CONSUMER_KEY)?).map_err(|e| ProtocolError::malformed(CONSUMER_KEY, e))?;
		let token = params
			.get(TOKEN)
			.filter(|value| !value.is_empty())
			.map(TokenKey::new)
			.transpose()
			.map_err(|e| ProtocolError::malformed(TOKEN, e))?;
		let signature_method: SignatureMethod = required(params, SIGNATURE_METHOD)?.parse()?;
		let signature = required(params, SIGNATURE)?.to_owned();
		let timestamp = parse_timestamp(required(params, TIMESTAMP)?)?;
		let nonce =
			Nonce::new(required(params, NONCE)?).map_err(|e| ProtocolError::malformed(NONCE, e))?;
		let callback: Option<Callback> = params.get(CALLBACK).map(str::parse).transpose()?;
		let verifier = params.get(VERIFIER).map(str::to_owned);

		Ok(Self { consumer_key, token, signature_method, signature, timestamp, nonce, callback, verifier })
	}
}

/// Verified view of a signed request handed to each binding element.
#[derive(Clone, Debug)]
pub struct IncomingMessage {
	/// Endpoint the request was addressed to.
	pub kind: MessageKind,
	/// Original request.
	pub request: HttpRequest,
	/// Every parameter, from every source.
	pub parameters: Parameters,
	/// Typed protocol parameters.
	pub protocol: ProtocolParams,
	/// Revision inferred from the parameters.
	pub version: ProtocolVersion,
}
impl IncomingMessage {
	/// Reads `request` as a message of `kind`.
	pub fn read(kind: MessageKind, request: &HttpRequest) -> Result<Self, ProtocolError> {
		let parameters = request.parameters()?;
		let protocol = ProtocolParams::extract(&parameters)?;

		if kind.requires_token() && protocol.token.is_none() {
			return Err(ProtocolError::missing(TOKEN));
		}

		let version = kind.infer_version(&protocol);

		Ok(Self { kind, request: request.clone(), parameters, protocol, version })
	}
}

/// Returns the value of `name` or a [`ProtocolError::MissingParameter`].
pub fn required<'a>(params: &'a Parameters, name: &str) -> Result<&'a str, ProtocolError> {
	params.get(name).filter(|value| !value.is_empty()).ok_or_else(|| ProtocolError::missing(name))
}

fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, ProtocolError> {
	let seconds = raw.parse::<i64>().map_err(|e| ProtocolError::malformed(TIMESTAMP, e))?;

	OffsetDateTime::from_unix_timestamp(seconds).map_err(|e| ProtocolError::malformed(TIMESTAMP, e))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn signed() -> Parameters {
		Parameters::from_iter([
			(CONSUMER_KEY, "dpf43f3p2l4k3l03"),
			(SIGNATURE_METHOD, "HMAC-SHA1"),
			(SIGNATURE, "tR3+Ty81lMeYAr/Fid0kMTYa/WM="),
			(TIMESTAMP, "1191242090"),
			(NONCE, "hsu94j3884jdopsl"),
			(VERSION, "1.0"),
		])
	}

	#[test]
	fn extract_reads_required_fields() {
		let params = ProtocolParams::extract(&signed().with(CALLBACK, "oob"))
			.expect("Signed parameters should extract.");

		assert_eq!(params.consumer_key.as_ref(), "dpf43f3p2l4k3l03");
		assert_eq!(params.signature_method, SignatureMethod::HmacSha1);
		assert_eq!(params.timestamp.unix_timestamp(), 1_191_242_090);
		assert_eq!(params.callback, Some(Callback::OutOfBand));
		assert_eq!(MessageKind::RequestToken.infer_version(&params), ProtocolVersion::V10a);
	}

	#[test]
	fn extract_rejects_missing_duplicate_and_version() {
		let mut missing = signed();

		missing.remove(NONCE);

		assert_eq!(ProtocolParams::extract(&missing), Err(ProtocolError::missing(NONCE)));

		let mut duplicated = signed();

		duplicated.push(NONCE, "other");

		assert_eq!(
			ProtocolParams::extract(&duplicated),
			Err(ProtocolError::DuplicateParameter { name: NONCE.into() })
		);
		assert_eq!(
			ProtocolParams::extract(&signed().with(VERSION, "2.0")),
			Err(ProtocolError::UnsupportedVersion { version: "2.0".into() })
		);
		assert!(matches!(
			ProtocolParams::extract(&signed().with(SIGNATURE_METHOD, "MD5")),
			Err(ProtocolError::UnsupportedSignatureMethod { .. })
		));
		assert!(matches!(
			ProtocolParams::extract(&signed().with(TIMESTAMP, "yesterday")),
			Err(ProtocolError::MalformedParameter { .. })
		));
	}

	#[test]
	fn repeated_non_protocol_parameters_are_allowed() {
		let mut params = signed();

		params.push("tag", "a");
		params.push("tag", "b");

		assert!(ProtocolParams::extract(&params).is_ok());
	}

	#[test]
	fn duplicates_are_found_in_large_parameter_sets() {
		let mut params = signed();

		for i in 0..20_000 {
			params.push(format!("oauth_x{i}"), "v");
		}

		assert!(ProtocolParams::extract(&params).is_ok());

		params.push("oauth_x19999", "again");

		assert_eq!(
			ProtocolParams::extract(&params),
			Err(ProtocolError::DuplicateParameter { name: "oauth_x19999".into() })
		);
	}

	#[test]
	fn callback_parsing_accepts_oob_and_http_urls() {
		assert_eq!("OOB".parse::<Callback>(), Ok(Callback::OutOfBand));
		assert!("ftp://example.com/".parse::<Callback>().is_err());

		let callback = "https://printer.example.com/ready?x=1"
			.parse::<Callback>()
			.expect("HTTPS callback should parse.");

		assert_eq!(callback.as_wire(), "https://printer.example.com/ready?x=1");
	}

	#[test]
	fn access_token_version_follows_verifier() {
		let params =
			ProtocolParams::extract(&signed().with(TOKEN, "hh5s93j4hdidpola")).expect("Parameters should extract.");

		assert_eq!(MessageKind::AccessToken.infer_version(&params), ProtocolVersion::V10);

		let revised = ProtocolParams::extract(&signed().with(TOKEN, "hh5s93j4hdidpola").with(VERIFIER, "hfdp7dh39dks9884"))
			.expect("Parameters should extract.");

		assert_eq!(MessageKind::AccessToken.infer_version(&revised), ProtocolVersion::V10a);
	}
}
