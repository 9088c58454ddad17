//! Service provider security settings.

// self
use crate::{
	_prelude::*,
	auth::VerifierFormat,
	error::ConfigError,
	message::ProtocolVersion,
	signing::SignatureMethod,
};

/// Security knobs applied by the binding chain and token issuance.
///
/// Durations are (de)serialized as whole seconds. Missing fields fall back to
/// [`ServiceProviderSettings::default`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceProviderSettings {
	/// How long a signed message stays acceptable after its `oauth_timestamp`.
	#[serde(with = "crate::clock::seconds")]
	pub maximum_message_lifetime: Duration,
	/// Tolerated difference between consumer and provider clocks.
	#[serde(with = "crate::clock::seconds")]
	pub maximum_clock_skew: Duration,
	/// Lifetime of an unauthorized or authorized request token.
	#[serde(with = "crate::clock::seconds")]
	pub maximum_request_token_ttl: Duration,
	/// Lifetime of issued access tokens; `None` issues non-expiring tokens.
	#[serde(with = "crate::clock::seconds::option")]
	pub access_token_ttl: Option<Duration>,
	/// Oldest protocol revision a consumer may speak.
	pub minimum_required_version: ProtocolVersion,
	/// Signature methods accepted on incoming messages.
	pub signature_methods: Vec<SignatureMethod>,
	/// Verification code shape used unless the consumer overrides it.
	pub verifier_format: VerifierFormat,
	/// Verification code length used unless the consumer overrides it.
	pub verifier_length: usize,
	/// Length of generated request and access tokens.
	pub token_length: usize,
	/// Length of generated token secrets.
	pub secret_length: usize,
}
impl ServiceProviderSettings {
	/// Parses settings from JSON; a bad field reports its path.
	pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
		let deserializer = &mut serde_json::Deserializer::from_str(raw);
		let settings: Self = serde_path_to_error::deserialize(deserializer).map_err(|e| {
			ConfigError::SettingsParse { path: e.path().to_string(), source: e.into_inner() }
		})?;

		settings.validate()?;

		Ok(settings)
	}

	/// Checks value ranges.
	pub fn validate(&self) -> Result<(), ConfigError> {
		for (field, value) in [
			("maximum_message_lifetime", self.maximum_message_lifetime),
			("maximum_clock_skew", self.maximum_clock_skew),
			("maximum_request_token_ttl", self.maximum_request_token_ttl),
		] {
			if value.is_negative() {
				return Err(invalid(field, "duration must not be negative"));
			}
		}

		if self.access_token_ttl.is_some_and(|ttl| !ttl.is_positive()) {
			return Err(invalid("access_token_ttl", "duration must be positive"));
		}
		if self.signature_methods.is_empty() {
			return Err(invalid("signature_methods", "at least one method must be accepted"));
		}

		for (field, value) in [
			("verifier_length", self.verifier_length),
			("token_length", self.token_length),
			("secret_length", self.secret_length),
		] {
			if value == 0 {
				return Err(invalid(field, "length must be greater than zero"));
			}
		}

		Ok(())
	}

	/// Length of the replay window: message lifetime plus clock skew.
	pub fn nonce_window(&self) -> Duration {
		self.maximum_message_lifetime + self.maximum_clock_skew
	}

	/// Whether `method` is accepted on incoming messages.
	pub fn accepts(&self, method: SignatureMethod) -> bool {
		self.signature_methods.contains(&method)
	}
}
impl Default for ServiceProviderSettings {
	fn default() -> Self {
		Self {
			maximum_message_lifetime: Duration::minutes(3),
			maximum_clock_skew: Duration::minutes(10),
			maximum_request_token_ttl: Duration::minutes(5),
			access_token_ttl: None,
			minimum_required_version: ProtocolVersion::V10,
			signature_methods: vec![SignatureMethod::HmacSha1, SignatureMethod::RsaSha1],
			verifier_format: VerifierFormat::default(),
			verifier_length: 8,
			token_length: 24,
			secret_length: 32,
		}
	}
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
	ConfigError::InvalidSetting { field, reason: reason.into() }
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn defaults_match_documented_values() {
		let settings = ServiceProviderSettings::default();

		assert_eq!(settings.nonce_window(), Duration::minutes(13));
		assert_eq!(settings.maximum_request_token_ttl, Duration::minutes(5));
		assert!(settings.accepts(SignatureMethod::HmacSha1));
		assert!(!settings.accepts(SignatureMethod::Plaintext));
		assert!(settings.validate().is_ok());
	}

	#[test]
	fn json_overrides_merge_with_defaults() {
		let settings = ServiceProviderSettings::from_json(
			r#"{"maximum_clock_skew":60,"access_token_ttl":3600,"signature_methods":["PLAINTEXT"],"verifier_format":"numeric"}"#,
		)
		.expect("Settings JSON should parse.");

		assert_eq!(settings.maximum_clock_skew, Duration::minutes(1));
		assert_eq!(settings.access_token_ttl, Some(Duration::hours(1)));
		assert_eq!(settings.signature_methods, vec![SignatureMethod::Plaintext]);
		assert_eq!(settings.verifier_format, VerifierFormat::Numeric);
		assert_eq!(settings.maximum_message_lifetime, Duration::minutes(3));
	}

	#[test]
	fn bad_fields_report_their_path() {
		let err = ServiceProviderSettings::from_json(r#"{"minimum_required_version":"2.0"}"#)
			.expect_err("Unknown versions should be rejected.");

		assert!(
			matches!(err, ConfigError::SettingsParse { ref path, .. } if path == "minimum_required_version"),
			"Unexpected error: {err:?}."
		);
	}

	#[test]
	fn validation_rejects_empty_methods_and_zero_lengths() {
		let err = ServiceProviderSettings::from_json(r#"{"signature_methods":[]}"#)
			.expect_err("Empty method lists should be rejected.");

		assert!(matches!(err, ConfigError::InvalidSetting { field: "signature_methods", .. }));

		let settings = ServiceProviderSettings { token_length: 0, ..Default::default() };

		assert!(matches!(
			settings.validate(),
			Err(ConfigError::InvalidSetting { field: "token_length", .. })
		));
	}
}
