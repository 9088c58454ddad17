//! OAuth 1.0a for Rust, both ends of the wire: sign and verify HMAC-SHA1/RSA-SHA1/PLAINTEXT
//! messages, run a replay-safe service provider, drive the three-legged consumer flow, and
//! verify OpenID 2.0 positive assertions.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod clock;
pub mod consumer;
pub mod error;
pub mod ext;
pub mod http;
pub mod message;
pub mod obs;
pub mod openid;
pub mod provider;
pub mod signing;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{ConsumerKey, TokenKey},
		consumer::{ConsumerCredentials, ReqwestConsumer, ServiceProviderDescription},
		http::ReqwestHttpClient,
		store::{MemoryStore, TokenStore},
	};

	/// Consumer key used across integration tests.
	pub const TEST_CONSUMER_KEY: &str = "dpf43f3p2l4k3l03";
	/// Consumer secret used across integration tests.
	pub const TEST_CONSUMER_SECRET: &str = "kd94hf93k423kf44";

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests and never follows redirects.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Constructs a [`ReqwestConsumer`] backed by an in-memory token store and the test
	/// consumer credentials.
	pub fn build_reqwest_test_consumer(
		description: ServiceProviderDescription,
	) -> (ReqwestConsumer, Arc<MemoryStore>) {
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn TokenStore> = store_backend.clone();
		let credentials = ConsumerCredentials::new(
			ConsumerKey::new(TEST_CONSUMER_KEY).expect("Test consumer key should be valid."),
			TEST_CONSUMER_SECRET,
		);
		let consumer =
			ReqwestConsumer::with_http_client(description, credentials, store, test_reqwest_http_client());

		(consumer, store_backend)
	}

	/// Parses a token key fixture.
	pub fn token_key(raw: &str) -> TokenKey {
		TokenKey::new(raw).expect("Token fixture should be valid.")
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use time;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
