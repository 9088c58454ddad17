//! Shared secrets negotiated with OpenID Providers and the signatures they produce.

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
// self
use crate::{
	_prelude::*,
	error::ProtocolError,
	openid::{IndirectMessage, kvform, message::PREFIX},
	signing::shared,
	store::StoreFuture,
};

/// MAC algorithm of an association.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssociationType {
	/// `HMAC-SHA1` with a 20-byte secret.
	#[serde(rename = "HMAC-SHA1")]
	HmacSha1,
	/// `HMAC-SHA256` with a 32-byte secret.
	#[serde(rename = "HMAC-SHA256")]
	HmacSha256,
}
impl AssociationType {
	/// Wire name.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::HmacSha1 => "HMAC-SHA1",
			Self::HmacSha256 => "HMAC-SHA256",
		}
	}

	/// Required secret length in bytes.
	pub fn secret_len(self) -> usize {
		match self {
			Self::HmacSha1 => 20,
			Self::HmacSha256 => 32,
		}
	}
}
impl Display for AssociationType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for AssociationType {
	type Err = ProtocolError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"HMAC-SHA1" => Ok(Self::HmacSha1),
			"HMAC-SHA256" => Ok(Self::HmacSha256),
			other => Err(ProtocolError::malformed("assoc_type", format!("`{other}` is not supported"))),
		}
	}
}

/// Shared secret identified by a handle.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
	/// `assoc_handle`
	pub handle: String,
	/// MAC algorithm.
	pub kind: AssociationType,
	secret: Vec<u8>,
	/// When the association was negotiated.
	pub issued_at: OffsetDateTime,
	/// How long the provider keeps the association alive.
	pub lifetime: Duration,
}
impl Association {
	/// Creates an association after checking the secret length.
	pub fn new(
		handle: impl Into<String>,
		kind: AssociationType,
		secret: Vec<u8>,
		issued_at: OffsetDateTime,
		lifetime: Duration,
	) -> Result<Self, ProtocolError> {
		if secret.len() != kind.secret_len() {
			return Err(ProtocolError::malformed(
				"mac_key",
				format!("{kind} needs a {}-byte secret, got {}", kind.secret_len(), secret.len()),
			));
		}

		Ok(Self { handle: handle.into(), kind, secret, issued_at, lifetime })
	}

	/// Creates an association from a base64 `mac_key`.
	pub fn from_base64_secret(
		handle: impl Into<String>,
		kind: AssociationType,
		mac_key: &str,
		issued_at: OffsetDateTime,
		lifetime: Duration,
	) -> Result<Self, ProtocolError> {
		let secret = STANDARD.decode(mac_key).map_err(|e| ProtocolError::malformed("mac_key", e))?;

		Self::new(handle, kind, secret, issued_at, lifetime)
	}

	/// Instant the association stops being usable.
	pub fn expires_at(&self) -> OffsetDateTime {
		self.issued_at + self.lifetime
	}

	/// Whether the association is expired at `instant`.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.expires_at() <= instant
	}

	/// Raw MAC over `data`.
	pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
		let mac = match self.kind {
			AssociationType::HmacSha1 => shared::hmac_sha1(&self.secret, data)?,
			AssociationType::HmacSha256 => shared::hmac_sha256(&self.secret, data)?,
		};

		Ok(mac)
	}

	/// Base64 signature over the Key-Value Form of `fields` taken from `message`.
	pub fn sign_fields(&self, message: &IndirectMessage, fields: &[&str]) -> Result<String> {
		let pairs = fields
			.iter()
			.map(|field| {
				message
					.get(field)
					.map(|value| (*field, value))
					.ok_or_else(|| ProtocolError::missing(format!("{PREFIX}{field}")))
			})
			.collect::<Result<Vec<_>, _>>()?;
		let data = kvform::encode(pairs)
			.map_err(|e| ProtocolError::MalformedMessage { reason: e.to_string() })?;

		Ok(STANDARD.encode(self.sign(data.as_bytes())?))
	}

	/// Checks `openid.sig` against the fields listed in `openid.signed`.
	pub fn verify(&self, message: &IndirectMessage) -> Result<bool> {
		let provided = message.required("sig")?;
		let expected = self.sign_fields(message, &message.signed_fields())?;

		Ok(shared::signatures_match(&expected, provided))
	}
}
impl Debug for Association {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Association")
			.field("handle", &self.handle)
			.field("kind", &self.kind)
			.field("secret", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("lifetime", &self.lifetime)
			.finish()
	}
}

/// Associations known to a relying party, keyed by OP endpoint and handle.
pub trait AssociationStore
where
	Self: Send + Sync,
{
	/// Stores or replaces an association for `op_endpoint`.
	fn store<'a>(&'a self, op_endpoint: &'a Url, association: Association) -> StoreFuture<'a, ()>;

	/// Looks up an association by handle.
	fn get<'a>(
		&'a self,
		op_endpoint: &'a Url,
		handle: &'a str,
	) -> StoreFuture<'a, Option<Association>>;

	/// Forgets an association; returns whether it existed.
	fn remove<'a>(&'a self, op_endpoint: &'a Url, handle: &'a str) -> StoreFuture<'a, bool>;
}

/// Thread-safe in-memory [`AssociationStore`].
#[derive(Debug, Default)]
pub struct MemoryAssociationStore {
	associations: RwLock<HashMap<(String, String), Association>>,
}
impl MemoryAssociationStore {
	/// Drops associations expired at `instant`; returns how many were removed.
	pub fn purge_expired(&self, instant: OffsetDateTime) -> usize {
		let mut associations = self.associations.write();
		let before = associations.len();

		associations.retain(|_, association| !association.is_expired_at(instant));

		before - associations.len()
	}

	fn key(op_endpoint: &Url, handle: &str) -> (String, String) {
		(op_endpoint.as_str().to_owned(), handle.to_owned())
	}
}
impl AssociationStore for MemoryAssociationStore {
	fn store<'a>(&'a self, op_endpoint: &'a Url, association: Association) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.associations.write().insert(Self::key(op_endpoint, &association.handle), association);

			Ok(())
		})
	}

	fn get<'a>(
		&'a self,
		op_endpoint: &'a Url,
		handle: &'a str,
	) -> StoreFuture<'a, Option<Association>> {
		Box::pin(async move { Ok(self.associations.read().get(&Self::key(op_endpoint, handle)).cloned()) })
	}

	fn remove<'a>(&'a self, op_endpoint: &'a Url, handle: &'a str) -> StoreFuture<'a, bool> {
		Box::pin(async move {
			Ok(self.associations.write().remove(&Self::key(op_endpoint, handle)).is_some())
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn association(kind: AssociationType) -> Association {
		Association::new(
			"{HMAC}{1}",
			kind,
			vec![7; kind.secret_len()],
			OffsetDateTime::UNIX_EPOCH,
			Duration::hours(1),
		)
		.expect("Association fixture should be valid.")
	}

	fn message(pairs: &[(&str, &str)]) -> IndirectMessage {
		IndirectMessage::from_pairs(pairs.iter().map(|(k, v)| (format!("openid.{k}"), (*v).to_owned())))
			.expect("Message fixture should parse.")
	}

	#[test]
	fn secret_length_must_match_the_type() {
		let err = Association::new(
			"h",
			AssociationType::HmacSha256,
			vec![0; 20],
			OffsetDateTime::UNIX_EPOCH,
			Duration::hours(1),
		)
		.expect_err("Short secrets should be rejected.");

		assert!(matches!(err, ProtocolError::MalformedParameter { .. }));
		assert!(!format!("{:?}", association(AssociationType::HmacSha1)).contains("7, 7"));
	}

	#[test]
	fn signatures_cover_the_signed_list_in_order() {
		for kind in [AssociationType::HmacSha1, AssociationType::HmacSha256] {
			let assoc = association(kind);
			let unsigned = message(&[("mode", "id_res"), ("return_to", "https://rp.example.com/")]);
			let sig = assoc
				.sign_fields(&unsigned, &["mode", "return_to"])
				.expect("Signing should succeed.");
			let expected = STANDARD.encode(
				assoc
					.sign(b"mode:id_res\nreturn_to:https://rp.example.com/\n")
					.expect("Raw signing should succeed."),
			);

			assert_eq!(sig, expected);

			let signed = message(&[
				("mode", "id_res"),
				("return_to", "https://rp.example.com/"),
				("signed", "mode,return_to"),
				("sig", sig.as_str()),
			]);

			assert!(assoc.verify(&signed).expect("Verification should run."));

			let tampered = message(&[
				("mode", "id_res"),
				("return_to", "https://evil.example.com/"),
				("signed", "mode,return_to"),
				("sig", sig.as_str()),
			]);

			assert!(!assoc.verify(&tampered).expect("Verification should run."));
		}
	}

	#[tokio::test]
	async fn memory_store_is_keyed_by_endpoint_and_handle() {
		let store = MemoryAssociationStore::default();
		let op = Url::parse("https://op.example.com/server").expect("Endpoint fixture should parse.");
		let other = Url::parse("https://other.example.com/server").expect("Endpoint fixture should parse.");

		store.store(&op, association(AssociationType::HmacSha1)).await.expect("Store should accept.");

		assert!(store.get(&op, "{HMAC}{1}").await.expect("Lookup should work.").is_some());
		assert!(store.get(&other, "{HMAC}{1}").await.expect("Lookup should work.").is_none());
		assert_eq!(store.purge_expired(OffsetDateTime::UNIX_EPOCH + Duration::hours(2)), 1);
		assert!(!store.remove(&op, "{HMAC}{1}").await.expect("Removal should work."));
	}
}
