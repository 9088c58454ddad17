//! Thread-safe in-memory token and consumer store for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{ConsumerDescription, ConsumerKey, TokenAuthorization, TokenKey, TokenRecord},
	store::{self, ConsumerStore, ExchangeOutcome, StoreFuture, TokenMap, TokenStore},
};

type Shared<K, V> = Arc<RwLock<HashMap<K, V>>>;

/// Storage backend that keeps tokens and consumers in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
	tokens: Shared<TokenKey, TokenRecord>,
	consumers: Shared<ConsumerKey, ConsumerDescription>,
}
impl MemoryStore {
	/// Number of token records currently held.
	pub fn token_count(&self) -> usize {
		self.tokens.read().len()
	}

	fn with_tokens<T>(&self, f: impl FnOnce(&mut TokenMap) -> T) -> T {
		f(&mut self.tokens.write())
	}
}
impl TokenStore for MemoryStore {
	fn save(&self, record: TokenRecord) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.with_tokens(|tokens| tokens.insert(record.token.clone(), record));

			Ok(())
		})
	}

	fn fetch<'a>(&'a self, token: &'a TokenKey) -> StoreFuture<'a, Option<TokenRecord>> {
		Box::pin(async move { Ok(self.tokens.read().get(token).cloned()) })
	}

	fn authorize<'a>(
		&'a self,
		token: &'a TokenKey,
		authorization: TokenAuthorization,
	) -> StoreFuture<'a, Option<TokenRecord>> {
		Box::pin(async move {
			Ok(self.with_tokens(|tokens| store::authorize_in(tokens, token, authorization)))
		})
	}

	fn exchange<'a>(
		&'a self,
		request_token: &'a TokenKey,
		access: TokenRecord,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, ExchangeOutcome> {
		Box::pin(async move {
			Ok(self.with_tokens(|tokens| store::exchange_in(tokens, request_token, access, instant)))
		})
	}

	fn revoke<'a>(
		&'a self,
		token: &'a TokenKey,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, Option<TokenRecord>> {
		Box::pin(async move { Ok(self.with_tokens(|tokens| store::revoke_in(tokens, token, instant))) })
	}

	fn purge_expired(&self, instant: OffsetDateTime) -> StoreFuture<'_, usize> {
		Box::pin(async move { Ok(self.with_tokens(|tokens| store::purge_in(tokens, instant))) })
	}
}
impl ConsumerStore for MemoryStore {
	fn register(&self, consumer: ConsumerDescription) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.consumers.write().insert(consumer.key.clone(), consumer);

			Ok(())
		})
	}

	fn consumer<'a>(&'a self, key: &'a ConsumerKey) -> StoreFuture<'a, Option<ConsumerDescription>> {
		Box::pin(async move { Ok(self.consumers.read().get(key).cloned()) })
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::auth::TokenKind;

	fn consumer_key() -> ConsumerKey {
		ConsumerKey::new("dpf43f3p2l4k3l03").expect("Consumer key fixture should be valid.")
	}

	fn request_token(token: &str) -> TokenRecord {
		TokenRecord::builder(TokenKind::Request, consumer_key())
			.token(TokenKey::new(token).expect("Token fixture should be valid."))
			.secret("hdhd0244k9j7ao03")
			.expires_in(Duration::minutes(5))
			.build()
			.expect("Request token fixture should build.")
	}

	#[tokio::test]
	async fn save_fetch_and_revoke() {
		let store = MemoryStore::default();
		let record = request_token("hh5s93j4hdidpola");
		let key = record.token.clone();

		store.save(record).await.expect("Saving should succeed.");

		assert_eq!(store.token_count(), 1);
		assert!(store.fetch(&key).await.expect("Fetching should succeed.").is_some());

		let revoked = store
			.revoke(&key, macros::datetime!(2025-01-01 00:01 UTC))
			.await
			.expect("Revoking should succeed.")
			.expect("Revoked record should be returned.");

		assert!(revoked.is_revoked());
	}

	#[tokio::test]
	async fn consumers_register_and_resolve() {
		let store = MemoryStore::default();

		store
			.register(ConsumerDescription::new(consumer_key(), "kd94hf93k423kf44"))
			.await
			.expect("Registering should succeed.");

		let found = store
			.consumer(&consumer_key())
			.await
			.expect("Lookup should succeed.")
			.expect("Registered consumer should be found.");

		assert!(found.secret.matches("kd94hf93k423kf44"));
		assert!(
			store
				.consumer(&ConsumerKey::new("unknown").expect("Consumer key fixture should be valid."))
				.await
				.expect("Lookup should succeed.")
				.is_none()
		);
	}
}
