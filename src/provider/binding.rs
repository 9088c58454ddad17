//! Binding elements that validate incoming signed messages.
//!
//! Each element inspects an [`IncomingMessage`] and either rejects it or reports the protection
//! it applied. [`BindingChain`] runs the elements in order and then insists that every signed
//! message received expiration, replay, and tamper protection.

// self
use crate::{
	_prelude::*,
	auth::{TokenKey, TokenKind, TokenRecord, TokenStatus},
	clock::Clock,
	error::ProtocolError,
	message::{self, IncomingMessage, MessageKind, ProtocolVersion},
	signing::{self, RsaVerifier, SignatureMethod, SigningSecrets},
	store::{ConsumerStore, NonceStore, TokenStore},
};

/// Boxed future returned by [`BindingElement::process_incoming`].
pub type BindingFuture<'a> = Pin<Box<dyn Future<Output = Result<Option<Protection>>> + 'a + Send>>;

/// Protection a binding element guarantees once it accepted a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Protection {
	/// The message is fresh.
	Expiration,
	/// The message was not seen before.
	ReplayProtection,
	/// The message was signed by the claimed consumer and was not altered.
	TamperProtection,
}
impl Protection {
	/// Every protection a signed OAuth message requires.
	pub const REQUIRED: [Protection; 3] =
		[Protection::Expiration, Protection::ReplayProtection, Protection::TamperProtection];

	/// Stable label.
	pub const fn as_str(self) -> &'static str {
		match self {
			Protection::Expiration => "expiration",
			Protection::ReplayProtection => "replay",
			Protection::TamperProtection => "tamper",
		}
	}
}
impl Display for Protection {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Validation step applied to every incoming signed message.
///
/// Returning `Ok(None)` means the element did not apply to the message.
pub trait BindingElement
where
	Self: Send + Sync,
{
	/// Validates `message`, reporting the protection applied.
	fn process_incoming<'a>(&'a self, message: &'a IncomingMessage) -> BindingFuture<'a>;
}

/// Ordered list of binding elements.
#[derive(Clone, Default)]
pub struct BindingChain {
	elements: Vec<Arc<dyn BindingElement>>,
}
impl BindingChain {
	/// Creates an empty chain.
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends an element; elements run in insertion order.
	pub fn with(mut self, element: Arc<dyn BindingElement>) -> Self {
		self.push(element);

		self
	}

	/// Appends an element.
	pub fn push(&mut self, element: Arc<dyn BindingElement>) {
		self.elements.push(element);
	}

	/// Number of elements.
	pub fn len(&self) -> usize {
		self.elements.len()
	}

	/// Returns `true` when no element is installed.
	pub fn is_empty(&self) -> bool {
		self.elements.is_empty()
	}

	/// Runs every element and checks that the required protections were applied.
	pub async fn process(&self, message: &IncomingMessage) -> Result<Vec<Protection>> {
		let mut applied = Vec::with_capacity(Protection::REQUIRED.len());

		for element in &self.elements {
			if let Some(protection) = element.process_incoming(message).await? {
				applied.push(protection);
			}
		}

		if let Some(missing) =
			Protection::REQUIRED.iter().find(|protection| !applied.contains(protection))
		{
			return Err(ProtocolError::MissingProtection { protection: missing.as_str() }.into());
		}

		Ok(applied)
	}
}
impl Debug for BindingChain {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BindingChain").field("elements", &self.elements.len()).finish()
	}
}

/// Rejects messages whose timestamp is too old or too far in the future.
pub struct ExpirationElement {
	lifetime: Duration,
	skew: Duration,
	clock: Arc<dyn Clock>,
}
impl ExpirationElement {
	/// Accepts timestamps within `lifetime + skew` in the past and `skew` in the future.
	pub fn new(lifetime: Duration, skew: Duration, clock: Arc<dyn Clock>) -> Self {
		Self { lifetime, skew, clock }
	}

	fn check(&self, timestamp: OffsetDateTime) -> Result<(), ProtocolError> {
		let now = self.clock.now();

		if now.checked_add(self.skew).is_some_and(|latest| timestamp > latest) {
			return Err(ProtocolError::FutureMessage { timestamp });
		}

		let expired_at = timestamp
			.checked_add(self.lifetime.saturating_add(self.skew))
			.ok_or(ProtocolError::FutureMessage { timestamp })?;

		if expired_at < now {
			return Err(ProtocolError::ExpiredMessage { expired_at });
		}

		Ok(())
	}
}
impl BindingElement for ExpirationElement {
	fn process_incoming<'a>(&'a self, message: &'a IncomingMessage) -> BindingFuture<'a> {
		Box::pin(async move {
			self.check(message.protocol.timestamp)?;

			Ok(Some(Protection::Expiration))
		})
	}
}

/// Rejects nonces already used by the same consumer with the same timestamp.
pub struct ReplayProtectionElement {
	nonces: Arc<dyn NonceStore>,
}
impl ReplayProtectionElement {
	/// Records nonces in `nonces`, partitioned by consumer key.
	pub fn new(nonces: Arc<dyn NonceStore>) -> Self {
		Self { nonces }
	}
}
impl BindingElement for ReplayProtectionElement {
	fn process_incoming<'a>(&'a self, message: &'a IncomingMessage) -> BindingFuture<'a> {
		Box::pin(async move {
			let protocol = &message.protocol;
			let fresh = self
				.nonces
				.store_nonce(protocol.consumer_key.as_ref(), protocol.nonce.as_ref(), protocol.timestamp)
				.await?;

			if !fresh {
				return Err(ProtocolError::ReplayedNonce.into());
			}

			Ok(Some(Protection::ReplayProtection))
		})
	}
}

/// Verifies `oauth_signature` against the consumer and token secrets.
pub struct SigningElement {
	methods: Vec<SignatureMethod>,
	consumers: Arc<dyn ConsumerStore>,
	tokens: Arc<dyn TokenStore>,
}
impl SigningElement {
	/// Accepts `methods`, resolving secrets through the provided stores.
	pub fn new(
		methods: Vec<SignatureMethod>,
		consumers: Arc<dyn ConsumerStore>,
		tokens: Arc<dyn TokenStore>,
	) -> Self {
		Self { methods, consumers, tokens }
	}
}
impl BindingElement for SigningElement {
	fn process_incoming<'a>(&'a self, message: &'a IncomingMessage) -> BindingFuture<'a> {
		Box::pin(async move {
			let protocol = &message.protocol;
			let method = protocol.signature_method;

			if !self.methods.contains(&method) {
				return Err(ProtocolError::UnsupportedSignatureMethod {
					method: method.as_str().into(),
				}
				.into());
			}

			let consumer =
				self.consumers.consumer(&protocol.consumer_key).await?.ok_or_else(|| {
					ProtocolError::UnknownConsumer {
						consumer_key: protocol.consumer_key.as_ref().into(),
					}
				})?;
			let token = match (message.kind.requires_token(), &protocol.token) {
				(true, Some(token)) =>
					Some(owned_token(self.tokens.as_ref(), token, message).await?),
				(true, None) => return Err(ProtocolError::missing(message::TOKEN).into()),
				(false, _) => None,
			};
			let verifier = match (method, consumer.rsa_public_key.as_deref()) {
				(SignatureMethod::RsaSha1, Some(pem)) => Some(RsaVerifier::from_pem(pem)?),
				(SignatureMethod::RsaSha1, None) =>
					return Err(ProtocolError::UnsupportedSignatureMethod {
						method: method.as_str().into(),
					}
					.into()),
				_ => None,
			};
			let base = signing::signature_base_string(
				message.request.method,
				&message.request.url,
				&message.parameters,
			);
			let secrets =
				SigningSecrets::new(&consumer.secret, token.as_ref().map(|record| &record.secret));

			if !signing::verify(method, &base, &protocol.signature, secrets, verifier.as_ref())? {
				return Err(ProtocolError::InvalidSignature.into());
			}

			Ok(Some(Protection::TamperProtection))
		})
	}
}

/// Applies token lifetime, kind, and verifier rules.
pub struct TokenHandlingElement {
	tokens: Arc<dyn TokenStore>,
	request_token_ttl: Duration,
	clock: Arc<dyn Clock>,
}
impl TokenHandlingElement {
	/// Enforces `request_token_ttl` on request tokens presented for exchange.
	pub fn new(tokens: Arc<dyn TokenStore>, request_token_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
		Self { tokens, request_token_ttl, clock }
	}

	fn check_request_token(
		&self,
		message: &IncomingMessage,
		record: &TokenRecord,
	) -> Result<(), ProtocolError> {
		check_live_request_token(record, self.clock.now(), self.request_token_ttl)?;

		let authorization = record
			.authorization
			.as_ref()
			.ok_or_else(|| ProtocolError::TokenNotAuthorized { token: record.token.as_ref().into() })?;

		if record.consumer_version >= ProtocolVersion::V10a
			|| message.version >= ProtocolVersion::V10a
		{
			let provided = message.protocol.verifier.as_deref().unwrap_or_default();
			let matches = authorization
				.verifier
				.as_ref()
				.is_some_and(|expected| expected.matches(provided));

			if !matches {
				return Err(ProtocolError::IncorrectVerifier);
			}
		}

		Ok(())
	}

	fn check_access_token(&self, record: &TokenRecord) -> Result<(), ProtocolError> {
		expect_kind(record, TokenKind::Access)?;

		match record.status_at(self.clock.now()) {
			TokenStatus::Active => Ok(()),
			TokenStatus::Expired => Err(expired(record)),
			_ => Err(unknown(record)),
		}
	}
}
impl BindingElement for TokenHandlingElement {
	fn process_incoming<'a>(&'a self, message: &'a IncomingMessage) -> BindingFuture<'a> {
		Box::pin(async move {
			let Some(token) = message.protocol.token.as_ref() else {
				return Ok(None);
			};

			match message.kind {
				MessageKind::RequestToken => return Ok(None),
				MessageKind::AccessToken => {
					let record = owned_token(self.tokens.as_ref(), token, message).await?;

					self.check_request_token(message, &record)?;
				},
				MessageKind::ProtectedResource => {
					let record = owned_token(self.tokens.as_ref(), token, message).await?;

					self.check_access_token(&record)?;
				},
			}

			Ok(None)
		})
	}
}

async fn owned_token(
	tokens: &dyn TokenStore,
	token: &TokenKey,
	message: &IncomingMessage,
) -> Result<TokenRecord> {
	let record = tokens
		.fetch(token)
		.await?
		.filter(|record| record.consumer_key == message.protocol.consumer_key)
		.ok_or_else(|| ProtocolError::UnknownToken { token: token.as_ref().into() })?;

	Ok(record)
}

/// Fails unless `record` is a request token that is still usable at `now`.
pub(crate) fn check_live_request_token(
	record: &TokenRecord,
	now: OffsetDateTime,
	ttl: Duration,
) -> Result<(), ProtocolError> {
	expect_kind(record, TokenKind::Request)?;

	match record.status_at(now) {
		TokenStatus::Exchanged | TokenStatus::Revoked => Err(unknown(record)),
		TokenStatus::Expired => Err(expired(record)),
		_ if now >= record.created_at + ttl => Err(expired(record)),
		_ => Ok(()),
	}
}

fn expect_kind(record: &TokenRecord, expected: TokenKind) -> Result<(), ProtocolError> {
	if record.kind == expected {
		Ok(())
	} else {
		Err(ProtocolError::WrongTokenKind { token: record.token.as_ref().into(), expected })
	}
}

fn unknown(record: &TokenRecord) -> ProtocolError {
	ProtocolError::UnknownToken { token: record.token.as_ref().into() }
}

fn expired(record: &TokenRecord) -> ProtocolError {
	ProtocolError::ExpiredToken { token: record.token.as_ref().into() }
}
