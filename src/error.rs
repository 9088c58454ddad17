//! Crate-level error types shared across the service provider, consumer, stores, and OpenID
//! verification.

// self
use crate::{
	_prelude::*,
	auth::TokenKind,
	message::ProtocolVersion,
};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Incoming message violated the protocol and must be rejected.
	#[error(transparent)]
	Protocol(#[from] ProtocolError),
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Service provider rejected the token (expired, revoked, or never authorized).
	#[error("Service provider rejected the token: {reason}.")]
	InvalidGrant {
		/// Provider- or crate-supplied reason string.
		reason: String,
	},
	/// Consumer authentication failed or the signature was refused.
	#[error("Consumer authentication failed: {reason}.")]
	InvalidClient {
		/// Provider- or crate-supplied reason string.
		reason: String,
	},
}
impl Error {
	/// Returns the protocol error when this error is a protocol rejection.
	pub fn as_protocol(&self) -> Option<&ProtocolError> {
		match self {
			Self::Protocol(e) => Some(e),
			_ => None,
		}
	}
}

/// Protocol violations detected while reading an incoming message.
///
/// Each variant maps onto an OAuth Problem Reporting code via [`ProtocolError::problem`] so hosts
/// can answer with an `oauth_problem` body the consumer understands.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ProtocolError {
	/// A required parameter was absent.
	#[error("Required parameter `{name}` is missing.")]
	MissingParameter {
		/// Wire name of the missing parameter.
		name: String,
	},
	/// A protocol parameter appeared more than once.
	#[error("Parameter `{name}` appears more than once.")]
	DuplicateParameter {
		/// Wire name of the duplicated parameter.
		name: String,
	},
	/// A parameter value could not be parsed.
	#[error("Parameter `{name}` is malformed: {reason}.")]
	MalformedParameter {
		/// Wire name of the offending parameter.
		name: String,
		/// Parsing failure summary.
		reason: String,
	},
	/// `oauth_version` carried something other than `1.0`.
	#[error("Protocol version `{version}` is not supported.")]
	UnsupportedVersion {
		/// Version string received.
		version: String,
	},
	/// The message asked for a signature method this endpoint does not accept.
	#[error("Signature method `{method}` is not accepted.")]
	UnsupportedSignatureMethod {
		/// Method name received.
		method: String,
	},
	/// Signature verification failed.
	#[error("Message signature is invalid.")]
	InvalidSignature,
	/// Message timestamp fell outside the accepted window.
	#[error("Message expired at {expired_at}.")]
	ExpiredMessage {
		/// Instant the message stopped being acceptable.
		expired_at: OffsetDateTime,
	},
	/// Message timestamp lies further in the future than the allowed clock skew.
	#[error("Message timestamp {timestamp} lies in the future.")]
	FutureMessage {
		/// Timestamp carried by the message.
		timestamp: OffsetDateTime,
	},
	/// Nonce was already used with this timestamp and context.
	#[error("Nonce has already been used.")]
	ReplayedNonce,
	/// Consumer key is not registered.
	#[error("Consumer `{consumer_key}` is not recognized.")]
	UnknownConsumer {
		/// Consumer key received.
		consumer_key: String,
	},
	/// Token is not recognized, already exchanged, or revoked.
	#[error("Token `{token}` is not recognized.")]
	UnknownToken {
		/// Token received.
		token: String,
	},
	/// Token exists but is of the wrong kind for this endpoint.
	#[error("Expected {expected} token but `{token}` is of another kind.")]
	WrongTokenKind {
		/// Token received.
		token: String,
		/// Token kind the endpoint requires.
		expected: TokenKind,
	},
	/// Request token has not been authorized by the user.
	#[error("Request token `{token}` has not been authorized.")]
	TokenNotAuthorized {
		/// Token received.
		token: String,
	},
	/// Token outlived its time to live.
	#[error("Token `{token}` has expired.")]
	ExpiredToken {
		/// Token received.
		token: String,
	},
	/// `oauth_verifier` did not match the verifier issued at authorization time.
	#[error("Verification code is incorrect.")]
	IncorrectVerifier,
	/// The consumer speaks an older protocol revision than the provider accepts.
	#[error("Protocol {actual} does not meet the minimum required version {required}.")]
	MinimumVersionNotMet {
		/// Minimum version accepted by the provider.
		required: ProtocolVersion,
		/// Version inferred from the message.
		actual: ProtocolVersion,
	},
	/// Binding elements did not apply a protection the message kind requires.
	#[error("Message lacks the required {protection} protection.")]
	MissingProtection {
		/// Protection label that was not applied.
		protection: &'static str,
	},
	/// The assertion's return_to does not match the URL it arrived at.
	#[error("The return_to URL does not match: {reason}.")]
	ReturnToMismatch {
		/// Mismatch summary.
		reason: String,
	},
	/// A field that must be covered by the signature was left unsigned.
	#[error("Field `{field}` must be signed.")]
	UnsignedField {
		/// Field name without the `openid.` prefix.
		field: String,
	},
	/// Message structure is invalid for its declared mode.
	#[error("Message is malformed: {reason}.")]
	MalformedMessage {
		/// Failure summary.
		reason: String,
	},
}
impl ProtocolError {
	/// Shorthand for [`ProtocolError::MissingParameter`].
	pub fn missing(name: impl Into<String>) -> Self {
		Self::MissingParameter { name: name.into() }
	}

	/// Shorthand for [`ProtocolError::MalformedParameter`].
	pub fn malformed(name: impl Into<String>, reason: impl Display) -> Self {
		Self::MalformedParameter { name: name.into(), reason: reason.to_string() }
	}

	/// OAuth Problem Reporting code describing this failure.
	pub fn problem(&self) -> &'static str {
		match self {
			Self::MissingParameter { .. } => "parameter_absent",
			Self::DuplicateParameter { .. }
			| Self::MalformedParameter { .. }
			| Self::MalformedMessage { .. }
			| Self::ReturnToMismatch { .. }
			| Self::UnsignedField { .. } => "parameter_rejected",
			Self::UnsupportedVersion { .. } | Self::MinimumVersionNotMet { .. } =>
				"version_rejected",
			Self::UnsupportedSignatureMethod { .. } => "signature_method_rejected",
			Self::InvalidSignature | Self::MissingProtection { .. } => "signature_invalid",
			Self::ExpiredMessage { .. } | Self::FutureMessage { .. } => "timestamp_refused",
			Self::ReplayedNonce => "nonce_used",
			Self::UnknownConsumer { .. } => "consumer_key_unknown",
			Self::UnknownToken { .. } | Self::WrongTokenKind { .. } => "token_rejected",
			Self::TokenNotAuthorized { .. } => "permission_unknown",
			Self::ExpiredToken { .. } => "token_expired",
			Self::IncorrectVerifier => "verifier_invalid",
		}
	}

	/// HTTP status a service provider should answer with (400 or 401).
	pub fn http_status(&self) -> u16 {
		match self {
			Self::MissingParameter { .. }
			| Self::DuplicateParameter { .. }
			| Self::MalformedParameter { .. }
			| Self::MalformedMessage { .. }
			| Self::UnsupportedVersion { .. }
			| Self::UnsupportedSignatureMethod { .. } => 400,
			_ => 401,
		}
	}
}

/// Configuration and validation failures raised locally.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Settings document could not be parsed.
	#[error("Settings could not be parsed at `{path}`.")]
	SettingsParse {
		/// Path of the offending field inside the document.
		path: String,
		/// Structured parsing failure.
		#[source]
		source: serde_json::Error,
	},
	/// Settings carry an invalid value.
	#[error("Setting `{field}` is invalid: {reason}.")]
	InvalidSetting {
		/// Field name.
		field: &'static str,
		/// Why the value was refused.
		reason: String,
	},
	/// An endpoint URL is invalid.
	#[error("Endpoint `{endpoint}` is invalid.")]
	InvalidEndpoint {
		/// Endpoint label.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A signing key is required but was not configured.
	#[error("Signature method {method} requires a signing key that is not configured.")]
	MissingSigningKey {
		/// Signature method label.
		method: &'static str,
	},
	/// RSA key material could not be decoded or used.
	#[error("RSA key material is unusable.")]
	InvalidRsaKey {
		/// Underlying decoding or signing failure.
		#[source]
		source: BoxError,
	},
	/// Identifier validation failed.
	#[error("Identifier is invalid.")]
	Identifier(#[from] crate::auth::IdentifierError),
	/// Token record builder validation failed.
	#[error("Unable to build token record.")]
	TokenBuild(#[from] crate::auth::TokenRecordBuilderError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	/// Wraps an RSA decoding or signing failure.
	pub fn invalid_rsa_key(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::InvalidRsaKey { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Upstream endpoint returned an unexpected but non-fatal response.
	#[error("Endpoint returned an unexpected response: {message}.")]
	Endpoint {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Upstream returned a body that could not be parsed.
	#[error("Endpoint returned a malformed response: {message}.")]
	ResponseParse {
		/// Parsing failure summary.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn protocol_errors_map_to_problem_codes() {
		assert_eq!(ProtocolError::missing("oauth_nonce").problem(), "parameter_absent");
		assert_eq!(ProtocolError::ReplayedNonce.problem(), "nonce_used");
		assert_eq!(ProtocolError::InvalidSignature.problem(), "signature_invalid");
		assert_eq!(
			ProtocolError::UnknownConsumer { consumer_key: "c".into() }.problem(),
			"consumer_key_unknown"
		);
		assert_eq!(ProtocolError::missing("oauth_nonce").http_status(), 400);
		assert_eq!(ProtocolError::InvalidSignature.http_status(), 401);
	}

	#[test]
	fn protocol_error_converts_into_crate_error() {
		let err: Error = ProtocolError::IncorrectVerifier.into();

		assert_eq!(err.as_protocol(), Some(&ProtocolError::IncorrectVerifier));
		assert_eq!(err.to_string(), "Verification code is incorrect.");
	}
}
