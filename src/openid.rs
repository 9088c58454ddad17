//! OpenID 2.0 relying party: builds authentication requests, negotiates associations, and
//! verifies positive assertions returned through the user agent.
//!
//! Discovery happens elsewhere; callers hand in the OP endpoint. Associations are negotiated
//! without Diffie-Hellman, so [`RelyingParty::associate`] only talks to HTTPS endpoints. When
//! an assertion names an unknown or unusable association, the signature is checked with the OP
//! directly (`check_authentication`) if an HTTP client is configured.

pub mod association;
pub mod extensions;
pub mod kvform;
pub mod message;
pub mod request;

pub use association::*;
pub use extensions::*;
pub use kvform::Conformance;
pub use message::*;
pub use request::*;

// crates.io
use time::format_description::well_known::Rfc3339;
// self
use crate::{
	_prelude::*,
	clock::{Clock, SystemClock},
	error::{ConfigError, ProtocolError, TransientError},
	http::HttpClient,
	message::{HttpMethod, HttpRequest},
	obs::{self, Operation},
	store::NonceStore,
};

const REQUIRED_FIELDS: [&str; 6] =
	["op_endpoint", "return_to", "response_nonce", "assoc_handle", "signed", "sig"];
const SIGNED_FIELDS: [&str; 4] = ["op_endpoint", "return_to", "response_nonce", "assoc_handle"];
const NONCE_TIMESTAMP_LEN: usize = 20;
const NO_ENCRYPTION: &str = "no-encryption";

/// Relying party security settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelyingPartySettings {
	/// How long after its `response_nonce` timestamp an assertion is accepted.
	#[serde(with = "crate::clock::seconds")]
	pub maximum_message_age: Duration,
	/// Tolerated difference between the OP clock and ours.
	#[serde(with = "crate::clock::seconds")]
	pub maximum_clock_skew: Duration,
	/// Association types trusted for local signature checks.
	pub allowed_association_types: Vec<AssociationType>,
	/// Ignore extension arguments that the OP did not sign.
	pub require_signed_extensions: bool,
}
impl RelyingPartySettings {
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
		if !self.maximum_message_age.is_positive() {
			return Err(ConfigError::InvalidSetting {
				field: "maximum_message_age",
				reason: "duration must be positive".into(),
			});
		}
		if self.maximum_clock_skew.is_negative() {
			return Err(ConfigError::InvalidSetting {
				field: "maximum_clock_skew",
				reason: "duration must not be negative".into(),
			});
		}

		Ok(())
	}

	/// Replay window a [`NonceStore`] shared with this relying party must cover.
	pub fn nonce_window(&self) -> Duration {
		self.maximum_message_age + self.maximum_clock_skew
	}
}
impl Default for RelyingPartySettings {
	fn default() -> Self {
		Self {
			maximum_message_age: Duration::minutes(5),
			maximum_clock_skew: Duration::minutes(10),
			allowed_association_types: vec![AssociationType::HmacSha1, AssociationType::HmacSha256],
			require_signed_extensions: false,
		}
	}
}

/// Verified positive assertion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PositiveAssertion {
	/// `openid.claimed_id`, absent for assertions about no particular identifier.
	pub claimed_id: Option<String>,
	/// `openid.identity` (the OP-local identifier).
	pub local_identifier: Option<String>,
	/// OP endpoint that signed the assertion.
	pub op_endpoint: Url,
	/// Verified `openid.return_to`.
	pub return_to: Url,
	/// Consumed `openid.response_nonce`.
	pub response_nonce: String,
	message: IndirectMessage,
	signed_extensions_only: bool,
}
impl PositiveAssertion {
	/// Underlying message.
	pub fn message(&self) -> &IndirectMessage {
		&self.message
	}

	/// Parses extension `E` from the assertion.
	///
	/// Returns `Ok(None)` when the extension is absent. With
	/// [`RelyingPartySettings::require_signed_extensions`], unsigned arguments are dropped before
	/// parsing, and an unsigned namespace declaration hides the extension entirely.
	pub fn extension<E>(&self) -> Result<Option<E>, ProtocolError>
	where
		E: ExtensionResponse,
	{
		let Some(alias) = self.message.extension_alias(E::NAMESPACES, E::DEFAULT_ALIAS) else {
			return Ok(None);
		};
		let mut args = self.message.extension_args(alias);

		if self.signed_extensions_only {
			let signed = self.message.signed_fields();

			if self.message.version() == OpenIdVersion::V20
				&& !signed.contains(&format!("ns.{alias}").as_str())
			{
				return Ok(None);
			}

			args.retain(|name, _| signed.contains(&format!("{alias}.{name}").as_str()));
		}
		if args.is_empty() {
			return Ok(None);
		}

		E::from_args(&args).map(Some)
	}
}

/// Verifies assertions against stored associations and a shared nonce store.
#[derive(Clone)]
pub struct RelyingParty {
	/// Security settings.
	pub settings: RelyingPartySettings,
	/// Associations negotiated with OPs.
	pub associations: Arc<dyn AssociationStore>,
	/// Replay protection; the OP endpoint is the nonce context.
	pub nonces: Arc<dyn NonceStore>,
	clock: Arc<dyn Clock>,
	http_client: Option<Arc<dyn HttpClient>>,
}
impl RelyingParty {
	/// Creates a relying party after validating `settings`.
	///
	/// The nonce store must remember nonces for at least
	/// [`RelyingPartySettings::nonce_window`].
	pub fn new(
		settings: RelyingPartySettings,
		associations: Arc<dyn AssociationStore>,
		nonces: Arc<dyn NonceStore>,
	) -> Result<Self, ConfigError> {
		settings.validate()?;

		Ok(Self { settings, associations, nonces, clock: Arc::new(SystemClock), http_client: None })
	}

	/// Replaces the clock used for nonce age checks.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Enables direct verification with the OP for assertions without a usable association.
	pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
		self.http_client = Some(http_client);

		self
	}

	/// Verifies the positive assertion carried by `request_url`, the full URL the user agent
	/// was redirected to.
	pub async fn verify_assertion(&self, request_url: &Url) -> Result<PositiveAssertion> {
		obs::observe(Operation::Assertion, "relying_party.verify_assertion", async {
			let message = IndirectMessage::from_url(request_url)?;
			let mode = message.mode()?;

			if mode != "id_res" {
				return Err(ProtocolError::malformed(
					format!("{PREFIX}mode"),
					format!("`{mode}` is not a positive assertion"),
				)
				.into());
			}

			for field in REQUIRED_FIELDS {
				message.required(field)?;
			}

			check_signed_coverage(&message)?;

			let return_to = parse_url(&message, "return_to")?;

			check_return_to(&return_to, request_url)?;

			let op_endpoint = parse_url(&message, "op_endpoint")?;

			self.verify_signature(&op_endpoint, &message).await?;

			let response_nonce = message.required("response_nonce")?.to_owned();

			self.verify_nonce(&op_endpoint, &response_nonce).await?;

			#[cfg(feature = "tracing")]
			tracing::debug!(op_endpoint = %op_endpoint, "assertion verified");

			Ok(PositiveAssertion {
				claimed_id: message.get("claimed_id").map(str::to_owned),
				local_identifier: message.get("identity").map(str::to_owned),
				op_endpoint,
				return_to,
				response_nonce,
				signed_extensions_only: self.settings.require_signed_extensions,
				message,
			})
		})
		.await
	}

	/// Negotiates an unencrypted association of `kind` with the OP at `op_endpoint` and stores it.
	///
	/// The MAC key travels in the clear, so the endpoint must use HTTPS. When the OP refuses
	/// `kind` but suggests another allowed type over `no-encryption`, the suggestion is tried once.
	pub async fn associate(&self, op_endpoint: &Url, kind: AssociationType) -> Result<Association> {
		obs::observe(Operation::Association, "relying_party.associate", async {
			let Some(http_client) = &self.http_client else {
				return Err(ConfigError::InvalidSetting {
					field: "http_client",
					reason: "negotiating associations needs an HTTP client".into(),
				}
				.into());
			};

			if op_endpoint.scheme() != "https" {
				return Err(ConfigError::InvalidSetting {
					field: "op_endpoint",
					reason: format!("`{NO_ENCRYPTION}` associations require HTTPS, got `{op_endpoint}`"),
				}
				.into());
			}

			let mut kind = kind;

			for attempt in 0..2 {
				if !self.settings.allowed_association_types.contains(&kind) {
					return Err(ConfigError::InvalidSetting {
						field: "allowed_association_types",
						reason: format!("{kind} is not allowed"),
					}
					.into());
				}

				let request = HttpRequest::new(HttpMethod::Post, op_endpoint.clone()).with_form_body([
					("openid.ns", NS_V20),
					("openid.mode", "associate"),
					("openid.assoc_type", kind.as_str()),
					("openid.session_type", NO_ENCRYPTION),
				]);
				let response = http_client.execute(request).await?;

				if response.is_success() {
					let fields = kvform::decode(&response.body, Conformance::Loose).map_err(|e| {
						TransientError::ResponseParse { message: e.to_string(), status: Some(response.status) }
					})?;
					let association = self.association_from(&fields, kind)?;

					self.associations.store(op_endpoint, association.clone()).await?;

					#[cfg(feature = "tracing")]
					tracing::debug!(op_endpoint = %op_endpoint, kind = %kind, "association negotiated");

					return Ok(association);
				}

				let fields = kvform::decode(&response.body, Conformance::Loose).unwrap_or_default();
				let suggested = fields
					.get("error_code")
					.filter(|code| *code == "unsupported-type")
					.and(fields.get("assoc_type"))
					.and_then(|suggested| suggested.parse::<AssociationType>().ok())
					.filter(|suggested| *suggested != kind)
					.filter(|_| fields.get("session_type").is_none_or(|session| session == NO_ENCRYPTION));

				match suggested {
					Some(suggested) if attempt == 0 => kind = suggested,
					_ =>
						return Err(TransientError::Endpoint {
							message: format!(
								"associate answered HTTP {}: {}",
								response.status,
								fields.get("error").map_or("no reason given", String::as_str)
							),
							status: Some(response.status),
							retry_after: response.retry_after(),
						}
						.into()),
				}
			}

			Err(TransientError::Endpoint {
				message: "associate refused every suggested association type".into(),
				status: None,
				retry_after: None,
			}
			.into())
		})
		.await
	}

	fn association_from(
		&self,
		fields: &BTreeMap<String, String>,
		kind: AssociationType,
	) -> Result<Association, ProtocolError> {
		let field = |name: &str| {
			fields.get(name).map(String::as_str).filter(|value| !value.is_empty()).ok_or_else(|| {
				ProtocolError::missing(name)
			})
		};
		let answered = field("assoc_type")?.parse::<AssociationType>()?;

		if answered != kind {
			return Err(ProtocolError::malformed("assoc_type", format!("asked for {kind}, got {answered}")));
		}

		let session = fields.get("session_type").map(String::as_str).unwrap_or_default();

		if !session.is_empty() && session != NO_ENCRYPTION {
			return Err(ProtocolError::malformed("session_type", format!("`{session}` was not requested")));
		}

		let expires_in = field("expires_in")?
			.parse::<u32>()
			.ok()
			.filter(|seconds| *seconds > 0)
			.ok_or_else(|| ProtocolError::malformed("expires_in", "expected a positive number of seconds"))?;

		Association::from_base64_secret(
			field("assoc_handle")?,
			kind,
			field("mac_key")?,
			self.clock.now(),
			Duration::seconds(expires_in.into()),
		)
	}

	async fn verify_signature(&self, op_endpoint: &Url, message: &IndirectMessage) -> Result<()> {
		let handle = message.required("assoc_handle")?;

		if let Some(association) = self.associations.get(op_endpoint, handle).await? {
			let usable = !association.is_expired_at(self.clock.now())
				&& self.settings.allowed_association_types.contains(&association.kind);

			if usable {
				return if association.verify(message)? {
					Ok(())
				} else {
					Err(ProtocolError::InvalidSignature.into())
				};
			}
		}

		self.check_authentication(op_endpoint, message).await
	}

	async fn check_authentication(&self, op_endpoint: &Url, message: &IndirectMessage) -> Result<()> {
		let Some(http_client) = &self.http_client else {
			return Err(ProtocolError::InvalidSignature.into());
		};
		let mode = format!("{PREFIX}mode");
		let mut parameters = message.to_parameters();

		for (name, value) in &mut parameters {
			if *name == mode {
				*value = "check_authentication".into();
			}
		}

		let request = HttpRequest::new(HttpMethod::Post, op_endpoint.clone())
			.with_form_body(parameters.iter().map(|(name, value)| (name.as_str(), value.as_str())));
		let response = http_client.execute(request).await?;

		if !response.is_success() {
			return Err(TransientError::Endpoint {
				message: format!("check_authentication answered HTTP {}", response.status),
				status: Some(response.status),
				retry_after: response.retry_after(),
			}
			.into());
		}

		let fields = kvform::decode(&response.body, Conformance::Loose).map_err(|e| {
			TransientError::ResponseParse { message: e.to_string(), status: Some(response.status) }
		})?;

		if let Some(handle) = fields.get("invalidate_handle") {
			self.associations.remove(op_endpoint, handle).await?;
		}

		if fields.get("is_valid").is_some_and(|valid| valid == "true") {
			Ok(())
		} else {
			Err(ProtocolError::InvalidSignature.into())
		}
	}

	async fn verify_nonce(&self, op_endpoint: &Url, nonce: &str) -> Result<()> {
		let timestamp = nonce
			.get(..NONCE_TIMESTAMP_LEN)
			.and_then(|prefix| OffsetDateTime::parse(prefix, &Rfc3339).ok())
			.ok_or_else(|| {
				ProtocolError::malformed(
					format!("{PREFIX}response_nonce"),
					"missing `YYYY-MM-DDTHH:MM:SSZ` timestamp prefix",
				)
			})?;
		let now = self.clock.now();
		let skew = self.settings.maximum_clock_skew;

		if now.checked_add(skew).is_some_and(|latest| timestamp > latest) {
			return Err(ProtocolError::FutureMessage { timestamp }.into());
		}

		let expired_at = timestamp
			.checked_add(self.settings.maximum_message_age.saturating_add(skew))
			.ok_or(ProtocolError::FutureMessage { timestamp })?;

		if expired_at < now {
			return Err(ProtocolError::ExpiredMessage { expired_at }.into());
		}
		if !self.nonces.store_nonce(op_endpoint.as_str(), nonce, timestamp).await? {
			return Err(ProtocolError::ReplayedNonce.into());
		}

		Ok(())
	}
}
impl Debug for RelyingParty {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RelyingParty")
			.field("settings", &self.settings)
			.field("direct_verification", &self.http_client.is_some())
			.finish()
	}
}

fn check_signed_coverage(message: &IndirectMessage) -> Result<(), ProtocolError> {
	let signed = message.signed_fields();
	let identifiers = ["claimed_id", "identity"].into_iter().filter(|f| message.get(f).is_some());

	if message.get("claimed_id").is_some() != message.get("identity").is_some() {
		return Err(ProtocolError::MalformedMessage {
			reason: "claimed_id and identity must be present together".into(),
		});
	}

	for field in SIGNED_FIELDS.into_iter().chain(identifiers) {
		if !signed.contains(&field) {
			return Err(ProtocolError::UnsignedField { field: field.into() });
		}
	}

	Ok(())
}

fn check_return_to(return_to: &Url, request_url: &Url) -> Result<(), ProtocolError> {
	let mismatch = |reason: String| ProtocolError::ReturnToMismatch { reason };

	if return_to.scheme() != request_url.scheme() {
		return Err(mismatch(format!("scheme `{}` differs", return_to.scheme())));
	}
	if return_to.host_str() != request_url.host_str()
		|| return_to.port_or_known_default() != request_url.port_or_known_default()
	{
		return Err(mismatch("authority differs".into()));
	}
	if return_to.path() != request_url.path() {
		return Err(mismatch(format!("path `{}` differs", return_to.path())));
	}

	let received = request_url.query_pairs().collect::<Vec<_>>();

	for (name, value) in return_to.query_pairs() {
		if !received.iter().any(|(n, v)| *n == name && *v == value) {
			return Err(mismatch(format!("query argument `{name}` is missing or differs")));
		}
	}

	Ok(())
}

fn parse_url(message: &IndirectMessage, field: &str) -> Result<Url, ProtocolError> {
	Url::parse(message.required(field)?)
		.map_err(|e| ProtocolError::malformed(format!("{PREFIX}{field}"), e))
}
