//! Storage contracts for tokens, registered consumers, and replay-protection nonces.

pub mod file;
pub mod memory;
pub mod nonce;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use nonce::MemoryNonceStore;

// self
use crate::{
	_prelude::*,
	auth::{ConsumerDescription, ConsumerKey, TokenAuthorization, TokenKind, TokenRecord, TokenKey},
};

/// Boxed future returned by every storage operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Token manager contract shared by service providers and consumers.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Persists or replaces a token record.
	fn save(&self, record: TokenRecord) -> StoreFuture<'_, ()>;

	/// Fetches the record for `token`, if present.
	fn fetch<'a>(&'a self, token: &'a TokenKey) -> StoreFuture<'a, Option<TokenRecord>>;

	/// Records user approval of a request token that is neither exchanged nor revoked.
	///
	/// Returns the updated record, or `None` when no such request token exists.
	fn authorize<'a>(
		&'a self,
		token: &'a TokenKey,
		authorization: TokenAuthorization,
	) -> StoreFuture<'a, Option<TokenRecord>>;

	/// Atomically trades an authorized request token for `access`.
	///
	/// The access record is only stored when the outcome is [`ExchangeOutcome::Exchanged`]. It
	/// inherits the approving user and roles unless it already carries an authorization.
	fn exchange<'a>(
		&'a self,
		request_token: &'a TokenKey,
		access: TokenRecord,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, ExchangeOutcome>;

	/// Marks a record as revoked at the provided instant.
	fn revoke<'a>(
		&'a self,
		token: &'a TokenKey,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, Option<TokenRecord>>;

	/// Removes every record whose expiry is at or before `instant`; returns how many were removed.
	fn purge_expired(&self, instant: OffsetDateTime) -> StoreFuture<'_, usize>;
}

/// Registry of consumers known to the service provider.
pub trait ConsumerStore
where
	Self: Send + Sync,
{
	/// Registers or replaces a consumer.
	fn register(&self, consumer: ConsumerDescription) -> StoreFuture<'_, ()>;

	/// Looks up a consumer by key.
	fn consumer<'a>(&'a self, key: &'a ConsumerKey) -> StoreFuture<'a, Option<ConsumerDescription>>;
}

/// Replay-protection contract.
pub trait NonceStore
where
	Self: Send + Sync,
{
	/// Records `(context, nonce, timestamp)`.
	///
	/// Returns `false` when the triple was already seen or when `timestamp` already lies outside
	/// the replay window. Context is the consumer key for OAuth and the OP endpoint for OpenID.
	fn store_nonce<'a>(
		&'a self,
		context: &'a str,
		nonce: &'a str,
		timestamp: OffsetDateTime,
	) -> StoreFuture<'a, bool>;
}

/// Result of an atomic request-token exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeOutcome {
	/// The request token was authorized and is now exchanged; the access token was stored.
	Exchanged,
	/// The request token exists but is not authorized (or was revoked).
	NotAuthorized,
	/// The request token was already traded for an access token.
	AlreadyExchanged,
	/// No request token matched.
	Missing,
}

/// Error type produced by storage implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

type TokenMap = HashMap<TokenKey, TokenRecord>;

fn authorize_in(
	tokens: &mut TokenMap,
	token: &TokenKey,
	authorization: TokenAuthorization,
) -> Option<TokenRecord> {
	let record = tokens.get_mut(token).filter(|record| {
		record.kind == TokenKind::Request
			&& record.exchanged_at.is_none()
			&& record.revoked_at.is_none()
	})?;

	record.authorize(authorization);

	Some(record.clone())
}

fn exchange_in(
	tokens: &mut TokenMap,
	request_token: &TokenKey,
	access: TokenRecord,
	instant: OffsetDateTime,
) -> ExchangeOutcome {
	let Some(record) = tokens.get_mut(request_token).filter(|record| record.kind == TokenKind::Request)
	else {
		return ExchangeOutcome::Missing;
	};

	if record.exchanged_at.is_some() {
		return ExchangeOutcome::AlreadyExchanged;
	}
	if !record.is_authorized() || record.is_revoked() {
		return ExchangeOutcome::NotAuthorized;
	}

	let mut access = access;

	if access.authorization.is_none() {
		access.authorization = record
			.authorization
			.clone()
			.map(|authorization| TokenAuthorization { verifier: None, ..authorization });
	}

	record.mark_exchanged(access.token.clone(), instant);
	tokens.insert(access.token.clone(), access);

	ExchangeOutcome::Exchanged
}

fn revoke_in(tokens: &mut TokenMap, token: &TokenKey, instant: OffsetDateTime) -> Option<TokenRecord> {
	let record = tokens.get_mut(token)?;

	record.revoke(instant);

	Some(record.clone())
}

fn purge_in(tokens: &mut TokenMap, instant: OffsetDateTime) -> usize {
	let before = tokens.len();

	tokens.retain(|_, record| record.expires_at.is_none_or(|expiry| expiry > instant));

	before - tokens.len()
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::{auth::Secret, error::Error};

	fn key(raw: &str) -> TokenKey {
		TokenKey::new(raw).expect("Token fixture should be valid.")
	}

	fn consumer() -> ConsumerKey {
		ConsumerKey::new("consumer").expect("Consumer fixture should be valid.")
	}

	fn record(kind: TokenKind, token: &str) -> TokenRecord {
		TokenRecord::builder(kind, consumer())
			.token(key(token))
			.secret("secret")
			.created_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_in(Duration::minutes(5))
			.build()
			.expect("Token fixture should build.")
	}

	fn approval() -> TokenAuthorization {
		TokenAuthorization {
			user: "alice".into(),
			roles: Vec::new(),
			verifier: Some(Secret::new("verifier")),
			authorized_at: macros::datetime!(2025-01-01 00:01 UTC),
		}
	}

	#[test]
	fn store_error_converts_into_crate_error_with_source() {
		let store_error = StoreError::Backend { message: "database unreachable".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("database unreachable"));

		let source = StdError::source(&error)
			.expect("Crate error should expose the store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn exchange_walks_every_outcome() {
		let mut tokens = TokenMap::new();

		assert_eq!(
			exchange_in(
				&mut tokens,
				&key("request"),
				record(TokenKind::Access, "access"),
				macros::datetime!(2025-01-01 00:02 UTC),
			),
			ExchangeOutcome::Missing
		);

		tokens.insert(key("request"), record(TokenKind::Request, "request"));

		assert_eq!(
			exchange_in(
				&mut tokens,
				&key("request"),
				record(TokenKind::Access, "access"),
				macros::datetime!(2025-01-01 00:02 UTC),
			),
			ExchangeOutcome::NotAuthorized
		);
		assert!(!tokens.contains_key("access"));
		assert!(authorize_in(&mut tokens, &key("request"), approval()).is_some());
		assert_eq!(
			exchange_in(
				&mut tokens,
				&key("request"),
				record(TokenKind::Access, "access"),
				macros::datetime!(2025-01-01 00:02 UTC),
			),
			ExchangeOutcome::Exchanged
		);
		assert!(tokens.contains_key("access"));
		assert_eq!(
			exchange_in(
				&mut tokens,
				&key("request"),
				record(TokenKind::Access, "access-2"),
				macros::datetime!(2025-01-01 00:03 UTC),
			),
			ExchangeOutcome::AlreadyExchanged
		);
		assert!(
			authorize_in(&mut tokens, &key("request"), approval()).is_none(),
			"Exchanged tokens cannot be re-authorized."
		);
	}

	#[test]
	fn purge_removes_only_expired_records() {
		let mut tokens = TokenMap::new();

		tokens.insert(key("request"), record(TokenKind::Request, "request"));
		tokens.insert(
			key("forever"),
			TokenRecord::builder(TokenKind::Access, consumer())
				.token(key("forever"))
				.secret("secret")
				.build()
				.expect("Token fixture should build."),
		);

		assert_eq!(purge_in(&mut tokens, macros::datetime!(2025-01-01 00:04 UTC)), 0);
		assert_eq!(purge_in(&mut tokens, macros::datetime!(2025-01-01 00:05 UTC)), 1);
		assert!(tokens.contains_key("forever"));
		assert!(
			revoke_in(&mut tokens, &key("forever"), macros::datetime!(2025-01-01 00:06 UTC))
				.is_some_and(|r| r.is_revoked())
		);
	}

	#[test]
	fn exchange_outcome_can_be_serialized() {
		let payload = serde_json::to_string(&ExchangeOutcome::AlreadyExchanged)
			.expect("ExchangeOutcome should serialize to JSON.");

		assert_eq!(payload, "\"AlreadyExchanged\"");
	}
}
