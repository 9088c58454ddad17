//! File-backed token and consumer store for single-process deployments.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{ConsumerDescription, ConsumerKey, TokenAuthorization, TokenKey, TokenRecord},
	store::{self, ConsumerStore, ExchangeOutcome, StoreError, StoreFuture, TokenMap, TokenStore},
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
	#[serde(default)]
	tokens: Vec<TokenRecord>,
	#[serde(default)]
	consumers: Vec<ConsumerDescription>,
}

#[derive(Clone, Debug, Default)]
struct State {
	tokens: TokenMap,
	consumers: HashMap<ConsumerKey, ConsumerDescription>,
}

/// Persists tokens and consumers to a JSON snapshot after each mutation.
///
/// The snapshot is rewritten through a temporary file and an atomic rename while the in-process
/// write lock is held, so concurrent callers inside one process never interleave writes. A
/// mutation only becomes visible once its snapshot is on disk. Sharing a snapshot file between
/// processes is not supported.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<State>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;
		let state = State {
			tokens: snapshot.tokens.into_iter().map(|record| (record.token.clone(), record)).collect(),
			consumers: snapshot
				.consumers
				.into_iter()
				.map(|consumer| (consumer.key.clone(), consumer))
				.collect(),
		};

		Ok(Self { path, inner: Arc::new(RwLock::new(state)) })
	}

	fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
		if !path.exists() {
			return Ok(Snapshot::default());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(Snapshot::default());
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, state: &State) -> Result<(), StoreError> {
		let mut tokens = state.tokens.values().collect::<Vec<_>>();
		let mut consumers = state.consumers.values().collect::<Vec<_>>();

		tokens.sort_by(|a, b| a.token.cmp(&b.token));
		consumers.sort_by(|a, b| a.key.cmp(&b.key));

		#[derive(Serialize)]
		struct SnapshotRef<'a> {
			tokens: Vec<&'a TokenRecord>,
			consumers: Vec<&'a ConsumerDescription>,
		}

		let serialized = serde_json::to_vec_pretty(&SnapshotRef { tokens, consumers }).map_err(|e| {
			StoreError::Serialization { message: format!("Failed to serialize store snapshot: {e}") }
		})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	fn mutate<T>(&self, f: impl FnOnce(&mut State) -> T) -> Result<T, StoreError> {
		let mut guard = self.inner.write();
		let mut next = guard.clone();
		let out = f(&mut next);

		self.persist_locked(&next)?;

		*guard = next;

		Ok(out)
	}
}
impl TokenStore for FileStore {
	fn save(&self, record: TokenRecord) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.mutate(|state| {
				state.tokens.insert(record.token.clone(), record);
			})
		})
	}

	fn fetch<'a>(&'a self, token: &'a TokenKey) -> StoreFuture<'a, Option<TokenRecord>> {
		Box::pin(async move { Ok(self.inner.read().tokens.get(token).cloned()) })
	}

	fn authorize<'a>(
		&'a self,
		token: &'a TokenKey,
		authorization: TokenAuthorization,
	) -> StoreFuture<'a, Option<TokenRecord>> {
		Box::pin(async move {
			self.mutate(|state| store::authorize_in(&mut state.tokens, token, authorization))
		})
	}

	fn exchange<'a>(
		&'a self,
		request_token: &'a TokenKey,
		access: TokenRecord,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, ExchangeOutcome> {
		Box::pin(async move {
			self.mutate(|state| store::exchange_in(&mut state.tokens, request_token, access, instant))
		})
	}

	fn revoke<'a>(
		&'a self,
		token: &'a TokenKey,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, Option<TokenRecord>> {
		Box::pin(async move { self.mutate(|state| store::revoke_in(&mut state.tokens, token, instant)) })
	}

	fn purge_expired(&self, instant: OffsetDateTime) -> StoreFuture<'_, usize> {
		Box::pin(async move { self.mutate(|state| store::purge_in(&mut state.tokens, instant)) })
	}
}
impl ConsumerStore for FileStore {
	fn register(&self, consumer: ConsumerDescription) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.mutate(|state| {
				state.consumers.insert(consumer.key.clone(), consumer);
			})
		})
	}

	fn consumer<'a>(&'a self, key: &'a ConsumerKey) -> StoreFuture<'a, Option<ConsumerDescription>> {
		Box::pin(async move { Ok(self.inner.read().consumers.get(key).cloned()) })
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// crates.io
	use tokio::runtime::Runtime;
	// self
	use super::*;
	use crate::{
		auth::{Secret, TokenKind},
		clock::{Clock, SystemClock},
	};

	fn temp_path() -> PathBuf {
		let unique = format!(
			"oauth1_kit_file_store_{}_{}.json",
			process::id(),
			SystemClock.now().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	fn approval() -> TokenAuthorization {
		TokenAuthorization {
			user: "alice".into(),
			roles: vec!["photos".into()],
			verifier: Some(Secret::new("hfdp7dh39dks9884")),
			authorized_at: SystemClock.now(),
		}
	}

	fn build_record() -> TokenRecord {
		TokenRecord::builder(
			TokenKind::Request,
			ConsumerKey::new("dpf43f3p2l4k3l03").expect("Failed to build consumer key fixture."),
		)
		.token(TokenKey::new("hh5s93j4hdidpola").expect("Failed to build token fixture."))
		.secret("hdhd0244k9j7ao03")
		.expires_in(Duration::hours(1))
		.build()
		.expect("Failed to build file-store test record.")
	}

	#[test]
	fn save_and_reload_round_trip() {
		let path = temp_path();
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let record = build_record();
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		rt.block_on(store.save(record.clone())).expect("Failed to save fixture record to file store.");
		rt.block_on(store.register(ConsumerDescription::new(record.consumer_key.clone(), "kd94hf93k423kf44")))
			.expect("Failed to register consumer fixture.");
		rt.block_on(store.authorize(&record.token, approval()))
		.expect("Failed to authorize fixture record.")
		.expect("Fixture record should be authorizable.");
		drop(store);

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");
		let fetched = rt
			.block_on(reopened.fetch(&record.token))
			.expect("Failed to fetch fixture record from file store.")
			.expect("File store lost record after reopen.");

		assert_eq!(fetched.secret.expose(), record.secret.expose());
		assert_eq!(fetched.authorization.as_ref().map(|auth| auth.user.as_str()), Some("alice"));
		assert!(
			rt.block_on(reopened.consumer(&record.consumer_key))
				.expect("Failed to look up consumer.")
				.is_some()
		);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[test]
	fn failed_writes_leave_the_exchange_retryable() {
		let dir = temp_path().with_extension("d");
		let path = dir.join("store.json");
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let record = build_record();
		let access = TokenRecord::builder(TokenKind::Access, record.consumer_key.clone())
			.token(TokenKey::new("nnch734d00sl2jdk").expect("Failed to build token fixture."))
			.secret("pfkkdhi9sl3r4s00")
			.build()
			.expect("Failed to build access token fixture.");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		rt.block_on(store.save(record.clone())).expect("Failed to save fixture record to file store.");
		rt.block_on(store.authorize(&record.token, approval()))
			.expect("Failed to authorize fixture record.")
			.expect("Fixture record should be authorizable.");
		fs::remove_dir_all(&dir).expect("Failed to remove the store directory.");

		let failed = rt.block_on(store.exchange(&record.token, access.clone(), SystemClock.now()));

		assert!(failed.is_err(), "Exchanges must fail when the snapshot cannot be written.");
		assert!(
			rt.block_on(store.fetch(&record.token))
				.expect("Failed to fetch fixture record.")
				.expect("Request token should still be present.")
				.exchanged_for
				.is_none(),
			"A failed write must not burn the request token."
		);
		assert!(rt.block_on(store.fetch(&access.token)).expect("Failed to fetch access token.").is_none());

		fs::create_dir_all(&dir).expect("Failed to recreate the store directory.");

		assert_eq!(
			rt.block_on(store.exchange(&record.token, access, SystemClock.now()))
				.expect("Exchange should succeed once the snapshot is writable."),
			ExchangeOutcome::Exchanged
		);

		fs::remove_dir_all(&dir).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store directory {}: {e}", dir.display())
		});
	}
}
