//! Token records, lifecycle helpers, and builders.

// self
use crate::{
	_prelude::*,
	auth::{ConsumerKey, Secret, TokenKey},
	clock::{Clock, SystemClock},
	message::ProtocolVersion,
};

/// Distinguishes request tokens from access tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
	/// Short-lived token awaiting user authorization.
	Request,
	/// Token granting access to protected resources.
	Access,
}
impl Display for TokenKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(match self {
			Self::Request => "request",
			Self::Access => "access",
		})
	}
}

/// Current lifecycle status for a token record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// Request token issued but not yet approved by the user.
	Unauthorized,
	/// Request token approved and ready to be exchanged.
	Authorized,
	/// Request token already traded for an access token.
	Exchanged,
	/// Access token usable for protected resources.
	Active,
	/// Token outlived its time to live.
	Expired,
	/// Token has been revoked.
	Revoked,
}

/// Errors produced by [`TokenRecordBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenRecordBuilderError {
	/// Issued when no token value was provided.
	#[error("Token value is required.")]
	MissingToken,
	/// Issued when no token secret was provided.
	#[error("Token secret is required.")]
	MissingSecret,
}

/// User approval captured when a request token is authorized.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenAuthorization {
	/// Username of the approving user.
	pub user: String,
	/// Roles granted to the consumer on behalf of the user.
	pub roles: Vec<String>,
	/// Verification code handed back to the consumer (1.0a).
	pub verifier: Option<Secret>,
	/// Instant the user approved the token.
	pub authorized_at: OffsetDateTime,
}
impl Debug for TokenAuthorization {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenAuthorization")
			.field("user", &self.user)
			.field("roles", &self.roles)
			.field("verifier", &self.verifier.as_ref().map(|_| "<redacted>"))
			.field("authorized_at", &self.authorized_at)
			.finish()
	}
}

/// Record describing an issued request or access token.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenRecord {
	/// Token value sent as `oauth_token`.
	pub token: TokenKey,
	/// Token secret used as the second half of the signing key.
	pub secret: Secret,
	/// Consumer the token was issued to.
	pub consumer_key: ConsumerKey,
	/// Request or access token.
	pub kind: TokenKind,
	/// Issued-at instant.
	pub created_at: OffsetDateTime,
	/// Instant after which the token is no longer honored.
	pub expires_at: Option<OffsetDateTime>,
	/// Callback supplied with the request token request (`None` for out-of-band).
	pub callback: Option<Url>,
	/// Protocol revision the consumer spoke when obtaining the token.
	pub consumer_version: ProtocolVersion,
	/// User approval, once granted.
	pub authorization: Option<TokenAuthorization>,
	/// Instant the request token was exchanged.
	pub exchanged_at: Option<OffsetDateTime>,
	/// Access token issued in exchange for this request token.
	pub exchanged_for: Option<TokenKey>,
	/// Revocation instant if the record has been revoked.
	pub revoked_at: Option<OffsetDateTime>,
	/// Extra response parameters returned alongside the token.
	#[serde(default)]
	pub extra: BTreeMap<String, String>,
}
impl TokenRecord {
	/// Returns a builder for a token of the given kind issued to `consumer_key`.
	pub fn builder(kind: TokenKind, consumer_key: ConsumerKey) -> TokenRecordBuilder {
		TokenRecordBuilder::new(kind, consumer_key)
	}

	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> TokenStatus {
		if self.revoked_at.is_some() {
			return TokenStatus::Revoked;
		}
		if self.kind == TokenKind::Request && self.exchanged_at.is_some() {
			return TokenStatus::Exchanged;
		}
		if self.expires_at.is_some_and(|expiry| instant >= expiry) {
			return TokenStatus::Expired;
		}

		match self.kind {
			TokenKind::Request if self.authorization.is_some() => TokenStatus::Authorized,
			TokenKind::Request => TokenStatus::Unauthorized,
			TokenKind::Access => TokenStatus::Active,
		}
	}

	/// Checks the status against `clock`.
	pub fn status(&self, clock: &dyn Clock) -> TokenStatus {
		self.status_at(clock.now())
	}

	/// Returns `true` if the record has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), TokenStatus::Expired)
	}

	/// Returns `true` if the record has been revoked.
	pub fn is_revoked(&self) -> bool {
		self.revoked_at.is_some()
	}

	/// Returns `true` for request tokens the user has approved.
	pub fn is_authorized(&self) -> bool {
		self.authorization.is_some()
	}

	/// Records user approval.
	pub fn authorize(&mut self, authorization: TokenAuthorization) {
		self.authorization = Some(authorization);
	}

	/// Marks the request token as traded for `access_token`.
	pub fn mark_exchanged(&mut self, access_token: TokenKey, instant: OffsetDateTime) {
		self.exchanged_at = Some(instant);
		self.exchanged_for = Some(access_token);
	}

	/// Marks the record as revoked.
	pub fn revoke(&mut self, instant: OffsetDateTime) {
		self.revoked_at = Some(instant);
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("token", &self.token)
			.field("secret", &"<redacted>")
			.field("consumer_key", &self.consumer_key)
			.field("kind", &self.kind)
			.field("created_at", &self.created_at)
			.field("expires_at", &self.expires_at)
			.field("callback", &self.callback)
			.field("consumer_version", &self.consumer_version)
			.field("authorization", &self.authorization)
			.field("exchanged_at", &self.exchanged_at)
			.field("exchanged_for", &self.exchanged_for)
			.field("revoked_at", &self.revoked_at)
			.finish()
	}
}

/// Builder for [`TokenRecord`].
#[derive(Clone, Debug)]
pub struct TokenRecordBuilder {
	kind: TokenKind,
	consumer_key: ConsumerKey,
	token: Option<TokenKey>,
	secret: Option<Secret>,
	created_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
	callback: Option<Url>,
	consumer_version: ProtocolVersion,
	extra: BTreeMap<String, String>,
}
impl TokenRecordBuilder {
	fn new(kind: TokenKind, consumer_key: ConsumerKey) -> Self {
		Self {
			kind,
			consumer_key,
			token: None,
			secret: None,
			created_at: None,
			expires_at: None,
			expires_in: None,
			callback: None,
			consumer_version: ProtocolVersion::V10a,
			extra: BTreeMap::new(),
		}
	}

	/// Provides the token value.
	pub fn token(mut self, token: TokenKey) -> Self {
		self.token = Some(token);

		self
	}

	/// Provides the token secret.
	pub fn secret(mut self, secret: impl Into<Secret>) -> Self {
		self.secret = Some(secret.into());

		self
	}

	/// Sets the issued-at instant.
	pub fn created_at(mut self, instant: OffsetDateTime) -> Self {
		self.created_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Records the consumer callback (`None` for out-of-band).
	pub fn callback(mut self, callback: Option<Url>) -> Self {
		self.callback = callback;

		self
	}

	/// Records the protocol revision the consumer spoke.
	pub fn consumer_version(mut self, version: ProtocolVersion) -> Self {
		self.consumer_version = version;

		self
	}

	/// Attaches extra response parameters.
	pub fn extra(mut self, extra: BTreeMap<String, String>) -> Self {
		self.extra = extra;

		self
	}

	/// Consumes the builder and produces a [`TokenRecord`].
	pub fn build(self) -> Result<TokenRecord, TokenRecordBuilderError> {
		let token = self.token.ok_or(TokenRecordBuilderError::MissingToken)?;
		let secret = self.secret.ok_or(TokenRecordBuilderError::MissingSecret)?;
		let created_at = self.created_at.unwrap_or_else(|| SystemClock.now());
		let expires_at = self.expires_at.or(self.expires_in.map(|delta| created_at + delta));

		Ok(TokenRecord {
			token,
			secret,
			consumer_key: self.consumer_key,
			kind: self.kind,
			created_at,
			expires_at,
			callback: self.callback,
			consumer_version: self.consumer_version,
			authorization: None,
			exchanged_at: None,
			exchanged_for: None,
			revoked_at: None,
			extra: self.extra,
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::clock::FixedClock;

	fn request_token() -> TokenRecord {
		TokenRecord::builder(
			TokenKind::Request,
			ConsumerKey::new("dpf43f3p2l4k3l03").expect("Consumer key fixture should be valid."),
		)
		.token(TokenKey::new("hh5s93j4hdidpola").expect("Token fixture should be valid."))
		.secret("hdhd0244k9j7ao03")
		.created_at(macros::datetime!(2025-01-01 00:00 UTC))
		.expires_in(Duration::minutes(5))
		.build()
		.expect("Request token builder should succeed.")
	}

	#[test]
	fn request_token_walks_the_state_machine() {
		let mut record = request_token();

		assert_eq!(
			record.status_at(macros::datetime!(2025-01-01 00:01 UTC)),
			TokenStatus::Unauthorized
		);
		assert_eq!(
			record.status(&FixedClock::new(macros::datetime!(2025-01-01 00:06 UTC))),
			TokenStatus::Expired
		);

		record.authorize(TokenAuthorization {
			user: "alice".into(),
			roles: vec!["photos".into()],
			verifier: Some(Secret::new("hfdp7dh39dks9884")),
			authorized_at: macros::datetime!(2025-01-01 00:02 UTC),
		});

		assert_eq!(
			record.status_at(macros::datetime!(2025-01-01 00:03 UTC)),
			TokenStatus::Authorized
		);
		assert_eq!(
			record.status_at(macros::datetime!(2025-01-01 00:05 UTC)),
			TokenStatus::Expired
		);

		record.mark_exchanged(
			TokenKey::new("nnch734d00sl2jdk").expect("Access token fixture should be valid."),
			macros::datetime!(2025-01-01 00:04 UTC),
		);

		assert_eq!(
			record.status_at(macros::datetime!(2025-01-01 00:04 UTC)),
			TokenStatus::Exchanged
		);
		assert!(record.exchanged_for.is_some());
	}

	#[test]
	fn access_token_without_expiry_stays_active_until_revoked() {
		let mut record = TokenRecord::builder(
			TokenKind::Access,
			ConsumerKey::new("dpf43f3p2l4k3l03").expect("Consumer key fixture should be valid."),
		)
		.token(TokenKey::new("nnch734d00sl2jdk").expect("Token fixture should be valid."))
		.secret("pfkkdhi9sl3r4s00")
		.created_at(macros::datetime!(2025-01-01 00:00 UTC))
		.build()
		.expect("Access token builder should succeed.");

		assert_eq!(record.status_at(macros::datetime!(2030-01-01 00:00 UTC)), TokenStatus::Active);

		record.revoke(macros::datetime!(2025-01-02 00:00 UTC));

		assert_eq!(record.status_at(macros::datetime!(2025-01-01 00:00 UTC)), TokenStatus::Revoked);
		assert!(record.is_revoked());
	}

	#[test]
	fn builder_requires_token_and_secret() {
		let consumer =
			ConsumerKey::new("consumer").expect("Consumer key fixture should be valid.");

		assert_eq!(
			TokenRecord::builder(TokenKind::Access, consumer.clone()).secret("s").build().err(),
			Some(TokenRecordBuilderError::MissingToken)
		);
		assert_eq!(
			TokenRecord::builder(TokenKind::Access, consumer)
				.token(TokenKey::new("t").expect("Token fixture should be valid."))
				.build()
				.err(),
			Some(TokenRecordBuilderError::MissingSecret)
		);
	}

	#[test]
	fn debug_output_redacts_secrets() {
		let rendered = format!("{:?}", request_token());

		assert!(!rendered.contains("hdhd0244k9j7ao03"));
		assert!(rendered.contains("<redacted>"));
	}
}
