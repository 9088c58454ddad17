//! In-memory replay-protection store.

// std
use std::collections::BTreeSet;
// self
use crate::{
	_prelude::*,
	clock::{Clock, SystemClock},
	store::{NonceStore, StoreFuture},
};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct NonceEntry {
	timestamp: OffsetDateTime,
	context: String,
	nonce: String,
}

/// Nonce store that remembers `(context, nonce, timestamp)` triples for one replay window.
///
/// Entries are ordered by timestamp so every insert can cheaply drop everything older than the
/// window. Messages carrying such timestamps are rejected as expired anyway.
pub struct MemoryNonceStore {
	window: Duration,
	clock: Arc<dyn Clock>,
	entries: Mutex<BTreeSet<NonceEntry>>,
}
impl MemoryNonceStore {
	/// Creates a store that remembers nonces for `window` using the system clock.
	pub fn new(window: Duration) -> Self {
		Self::with_clock(window, Arc::new(SystemClock))
	}

	/// Creates a store driven by a custom clock.
	pub fn with_clock(window: Duration, clock: Arc<dyn Clock>) -> Self {
		Self { window, clock, entries: Mutex::new(BTreeSet::new()) }
	}

	/// Replay window length.
	pub fn window(&self) -> Duration {
		self.window
	}

	/// Number of remembered nonces.
	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	/// Returns `true` when no nonce is remembered.
	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}

	/// Synchronous [`NonceStore::store_nonce`] evaluated at `now`.
	pub fn store_nonce_at(
		&self,
		context: &str,
		nonce: &str,
		timestamp: OffsetDateTime,
		now: OffsetDateTime,
	) -> bool {
		let cutoff = now - self.window;

		if timestamp < cutoff {
			return false;
		}

		let mut entries = self.entries.lock();
		let boundary = NonceEntry { timestamp: cutoff, context: String::new(), nonce: String::new() };
		let retained = entries.split_off(&boundary);

		*entries = retained;

		entries.insert(NonceEntry { timestamp, context: context.to_owned(), nonce: nonce.to_owned() })
	}
}
impl NonceStore for MemoryNonceStore {
	fn store_nonce<'a>(
		&'a self,
		context: &'a str,
		nonce: &'a str,
		timestamp: OffsetDateTime,
	) -> StoreFuture<'a, bool> {
		Box::pin(async move { Ok(self.store_nonce_at(context, nonce, timestamp, self.clock.now())) })
	}
}
impl Debug for MemoryNonceStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MemoryNonceStore")
			.field("window", &self.window)
			.field("entries", &self.len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::clock::FixedClock;

	#[test]
	fn repeated_triples_are_rejected() {
		let store = MemoryNonceStore::new(Duration::minutes(13));
		let now = macros::datetime!(2025-01-01 12:00 UTC);
		let stamp = now - Duration::seconds(5);

		assert!(store.store_nonce_at("consumer-a", "n1", stamp, now));
		assert!(!store.store_nonce_at("consumer-a", "n1", stamp, now));
		assert!(store.store_nonce_at("consumer-b", "n1", stamp, now), "Contexts partition nonces.");
		assert!(store.store_nonce_at("consumer-a", "n1", stamp + Duration::seconds(1), now));
		assert_eq!(store.len(), 3);
	}

	#[test]
	fn timestamps_outside_the_window_are_refused_and_evicted() {
		let store = MemoryNonceStore::new(Duration::minutes(13));
		let now = macros::datetime!(2025-01-01 12:00 UTC);

		assert!(!store.store_nonce_at("c", "old", now - Duration::minutes(14), now));
		assert!(store.store_nonce_at("c", "n1", now - Duration::minutes(12), now));

		let later = now + Duration::minutes(2);

		assert!(store.store_nonce_at("c", "n2", later, later));
		assert_eq!(store.len(), 1, "Entries older than the window should be evicted on insert.");
		assert!(!store.store_nonce_at("c", "n1", now - Duration::minutes(12), later));
	}

	#[tokio::test]
	async fn trait_calls_use_the_injected_clock() {
		let clock = Arc::new(FixedClock::new(macros::datetime!(2025-01-01 12:00 UTC)));
		let store = MemoryNonceStore::with_clock(Duration::minutes(1), clock.clone());
		let stamp = macros::datetime!(2025-01-01 11:59:30 UTC);

		assert!(store.store_nonce("c", "n", stamp).await.expect("Nonce store should not fail."));
		assert!(!store.store_nonce("c", "n", stamp).await.expect("Nonce store should not fail."));

		clock.advance(Duration::minutes(5));

		assert!(!store.store_nonce("c", "fresh", stamp).await.expect("Nonce store should not fail."));
		assert!(!store.is_empty());
	}
}
