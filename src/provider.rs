//! Service provider: reads signed consumer requests and issues request and access tokens.
//!
//! Every signed request runs through a [`BindingChain`] (expiration, replay protection, signature
//! verification, token handling). The `read_*` operations return typed messages once the chain
//! accepted them; the `prepare_*` operations update the token store and build the reply that the
//! host renders with [`form_response`] or [`UserAuthorizationResponse::redirect_url`].

pub mod binding;
pub mod settings;

pub use binding::*;
pub use settings::*;

// crates.io
use rand::distr::{Alphanumeric, SampleString};
// self
use crate::{
	_prelude::*,
	auth::{
		ConsumerKey, Secret, TokenAuthorization, TokenKey, TokenKind, TokenRecord, VerifierFormat,
	},
	clock::{Clock, SystemClock},
	error::{ConfigError, ProtocolError},
	message::{
		self, AccessProtectedResourceRequest, AuthorizedTokenRequest, AuthorizedTokenResponse,
		Callback, HttpRequest, HttpResponse, IncomingMessage, MessageKind, Parameters,
		ProtocolMessage, ProtocolVersion, UnauthorizedTokenRequest, UnauthorizedTokenResponse,
		UserAuthorizationRequest, UserAuthorizationResponse,
	},
	obs::{self, Operation},
	store::{ConsumerStore, ExchangeOutcome, NonceStore, TokenStore},
};

/// Identity a verified protected resource request acts on behalf of.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthPrincipal {
	/// User who approved the access token.
	pub user: String,
	/// Roles granted to the user.
	pub roles: Vec<String>,
	/// Consumer acting for the user.
	pub consumer: ConsumerKey,
	/// Access token presented.
	pub token: TokenKey,
}
impl OAuthPrincipal {
	/// Returns `true` if the principal carries `role`.
	pub fn is_in_role(&self, role: &str) -> bool {
		self.roles.iter().any(|candidate| candidate == role)
	}
}

/// OAuth 1.0a service provider.
#[derive(Clone)]
pub struct ServiceProvider {
	settings: ServiceProviderSettings,
	tokens: Arc<dyn TokenStore>,
	consumers: Arc<dyn ConsumerStore>,
	nonces: Arc<dyn NonceStore>,
	clock: Arc<dyn Clock>,
	custom_elements: Vec<Arc<dyn BindingElement>>,
	chain: BindingChain,
}
impl ServiceProvider {
	/// Creates a provider using the system clock and the standard binding chain.
	pub fn new(
		settings: ServiceProviderSettings,
		tokens: Arc<dyn TokenStore>,
		consumers: Arc<dyn ConsumerStore>,
		nonces: Arc<dyn NonceStore>,
	) -> Result<Self, ConfigError> {
		settings.validate()?;

		let mut provider = Self {
			settings,
			tokens,
			consumers,
			nonces,
			clock: Arc::new(SystemClock),
			custom_elements: Vec::new(),
			chain: BindingChain::new(),
		};

		provider.rebuild_chain();

		Ok(provider)
	}

	/// Replaces the clock consulted by expiration and token checks.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self.rebuild_chain();

		self
	}

	/// Appends a custom binding element after the standard ones.
	pub fn with_binding_element(mut self, element: Arc<dyn BindingElement>) -> Self {
		self.custom_elements.push(element.clone());
		self.chain.push(element);

		self
	}

	/// Active settings.
	pub fn settings(&self) -> &ServiceProviderSettings {
		&self.settings
	}

	/// Token store backing the provider.
	pub fn token_store(&self) -> &Arc<dyn TokenStore> {
		&self.tokens
	}

	/// Consumer registry backing the provider.
	pub fn consumer_store(&self) -> &Arc<dyn ConsumerStore> {
		&self.consumers
	}

	/// Reads and verifies a request for an unauthorized request token.
	pub async fn read_token_request(&self, request: &HttpRequest) -> Result<UnauthorizedTokenRequest> {
		obs::observe(Operation::RequestToken, "read_token_request", async {
			let message = self.read_signed(MessageKind::RequestToken, request).await?;
			let required = self.settings.minimum_required_version;

			if message.version < required {
				return Err(
					ProtocolError::MinimumVersionNotMet { required, actual: message.version }.into()
				);
			}

			Ok(UnauthorizedTokenRequest::from_parameters(&message.parameters)?)
		})
		.await
	}

	/// Issues and stores a new request token.
	pub async fn prepare_unauthorized_token(
		&self,
		request: &UnauthorizedTokenRequest,
	) -> Result<UnauthorizedTokenResponse> {
		obs::observe(Operation::RequestToken, "prepare_unauthorized_token", async {
			let version = request.version();
			let token = self.generate_token()?;
			let secret = self.generate_secret();
			let record = TokenRecord::builder(TokenKind::Request, request.consumer_key.clone())
				.token(token.clone())
				.secret(secret.clone())
				.created_at(self.clock.now())
				.expires_in(self.settings.maximum_request_token_ttl)
				.callback(request.callback.as_ref().and_then(Callback::url).cloned())
				.consumer_version(version)
				.extra(request.extra.iter().cloned().collect())
				.build()
				.map_err(ConfigError::from)?;

			self.tokens.save(record).await?;

			Ok(UnauthorizedTokenResponse {
				token,
				secret,
				callback_confirmed: version >= ProtocolVersion::V10a,
				extra: Vec::new(),
			})
		})
		.await
	}

	/// Reads the user authorization request sent through the user agent.
	///
	/// The request is not signed; the request token must exist and still be within its time to
	/// live.
	pub async fn read_authorization_request(
		&self,
		request: &HttpRequest,
	) -> Result<UserAuthorizationRequest> {
		obs::observe(Operation::UserAuthorization, "read_authorization_request", async {
			let message = UserAuthorizationRequest::from_parameters(&request.parameters()?)?;

			self.live_request_token(&message.token).await?;

			Ok(message)
		})
		.await
	}

	/// Records that `user` approved the request token and builds the reply to the consumer.
	///
	/// The callback is the token's callback (then the registered one) for 1.0a consumers, and
	/// the registered callback (then the one supplied at authorization time) for 1.0 consumers.
	/// When no callback applies the reply has no redirect and the host shows the verifier to
	/// the user.
	pub async fn prepare_authorization_response(
		&self,
		request: &UserAuthorizationRequest,
		user: impl Into<String>,
		roles: Vec<String>,
	) -> Result<UserAuthorizationResponse> {
		let user = user.into();

		obs::observe(Operation::UserAuthorization, "prepare_authorization_response", async {
			let record = self.live_request_token(&request.token).await?;
			let consumer = self.consumers.consumer(&record.consumer_key).await?.ok_or_else(|| {
				ProtocolError::UnknownConsumer { consumer_key: record.consumer_key.as_ref().into() }
			})?;
			let revised = record.consumer_version >= ProtocolVersion::V10a;
			let callback = if revised {
				record.callback.clone().or_else(|| consumer.callback.clone())
			} else {
				consumer.callback.clone().or_else(|| request.callback.clone())
			};
			let verifier = revised.then(|| {
				let format = consumer.verifier_format.unwrap_or(self.settings.verifier_format);
				let format = match (format, &callback) {
					(VerifierFormat::IncludedInCallback, None) =>
						VerifierFormat::AlphaNumericNoLookAlikes,
					(format, _) => format,
				};

				format.generate(consumer.verifier_length.unwrap_or(self.settings.verifier_length))
			});
			let authorization = TokenAuthorization {
				user: user.clone(),
				roles: roles.clone(),
				verifier: verifier.clone(),
				authorized_at: self.clock.now(),
			};

			self.tokens
				.authorize(&request.token, authorization)
				.await?
				.ok_or_else(|| ProtocolError::UnknownToken { token: request.token.as_ref().into() })?;

			Ok(UserAuthorizationResponse { token: request.token.clone(), verifier, callback })
		})
		.await
	}

	/// Reads and verifies a request to trade an authorized request token for an access token.
	pub async fn read_access_token_request(
		&self,
		request: &HttpRequest,
	) -> Result<AuthorizedTokenRequest> {
		obs::observe(Operation::AccessToken, "read_access_token_request", async {
			let message = self.read_signed(MessageKind::AccessToken, request).await?;

			Ok(AuthorizedTokenRequest::from_parameters(&message.parameters)?)
		})
		.await
	}

	/// Exchanges the request token for a new access token, atomically.
	pub async fn prepare_access_token(
		&self,
		request: &AuthorizedTokenRequest,
	) -> Result<AuthorizedTokenResponse> {
		obs::observe(Operation::AccessToken, "prepare_access_token", async {
			let now = self.clock.now();
			let token = self.generate_token()?;
			let secret = self.generate_secret();
			let mut builder = TokenRecord::builder(TokenKind::Access, request.consumer_key.clone())
				.token(token.clone())
				.secret(secret.clone())
				.created_at(now)
				.consumer_version(request.version());

			if let Some(ttl) = self.settings.access_token_ttl {
				builder = builder.expires_in(ttl);
			}

			let access = builder.build().map_err(ConfigError::from)?;

			match self.tokens.exchange(&request.token, access, now).await? {
				ExchangeOutcome::Exchanged =>
					Ok(AuthorizedTokenResponse { token, secret, extra: Vec::new() }),
				ExchangeOutcome::NotAuthorized =>
					Err(ProtocolError::TokenNotAuthorized { token: request.token.as_ref().into() }
						.into()),
				ExchangeOutcome::AlreadyExchanged | ExchangeOutcome::Missing =>
					Err(ProtocolError::UnknownToken { token: request.token.as_ref().into() }.into()),
			}
		})
		.await
	}

	/// Reads and verifies a signed protected resource request.
	pub async fn read_protected_resource_request(
		&self,
		request: &HttpRequest,
	) -> Result<AccessProtectedResourceRequest> {
		obs::observe(Operation::ProtectedResource, "read_protected_resource_request", async {
			let message = self.read_signed(MessageKind::ProtectedResource, request).await?;

			Ok(AccessProtectedResourceRequest::from_parameters(&message.parameters)?)
		})
		.await
	}

	/// Builds the principal an authorized protected resource request acts for.
	pub async fn create_principal(
		&self,
		request: &AccessProtectedResourceRequest,
	) -> Result<OAuthPrincipal> {
		let record = self
			.tokens
			.fetch(&request.token)
			.await?
			.filter(|record| record.kind == TokenKind::Access)
			.ok_or_else(|| ProtocolError::UnknownToken { token: request.token.as_ref().into() })?;
		let authorization = record.authorization.unwrap_or_else(|| TokenAuthorization {
			user: String::new(),
			roles: Vec::new(),
			verifier: None,
			authorized_at: record.created_at,
		});

		Ok(OAuthPrincipal {
			user: authorization.user,
			roles: authorization.roles,
			consumer: record.consumer_key,
			token: record.token,
		})
	}

	/// Generates a verification code; see [`VerifierFormat::generate`].
	pub fn create_verification_code(format: VerifierFormat, length: usize) -> Secret {
		format.generate(length)
	}

	async fn read_signed(&self, kind: MessageKind, request: &HttpRequest) -> Result<IncomingMessage> {
		let message = IncomingMessage::read(kind, request)?;

		self.chain.process(&message).await?;

		Ok(message)
	}

	async fn live_request_token(&self, token: &TokenKey) -> Result<TokenRecord> {
		let record = self
			.tokens
			.fetch(token)
			.await?
			.ok_or_else(|| ProtocolError::UnknownToken { token: token.as_ref().into() })?;

		binding::check_live_request_token(
			&record,
			self.clock.now(),
			self.settings.maximum_request_token_ttl,
		)?;

		Ok(record)
	}

	fn generate_token(&self) -> Result<TokenKey, ConfigError> {
		Ok(TokenKey::new(Alphanumeric.sample_string(&mut rand::rng(), self.settings.token_length))?)
	}

	fn generate_secret(&self) -> Secret {
		Secret::new(Alphanumeric.sample_string(&mut rand::rng(), self.settings.secret_length))
	}

	fn rebuild_chain(&mut self) {
		let mut chain = BindingChain::new()
			.with(Arc::new(ExpirationElement::new(
				self.settings.maximum_message_lifetime,
				self.settings.maximum_clock_skew,
				self.clock.clone(),
			)))
			.with(Arc::new(ReplayProtectionElement::new(self.nonces.clone())))
			.with(Arc::new(SigningElement::new(
				self.settings.signature_methods.clone(),
				self.consumers.clone(),
				self.tokens.clone(),
			)))
			.with(Arc::new(TokenHandlingElement::new(
				self.tokens.clone(),
				self.settings.maximum_request_token_ttl,
				self.clock.clone(),
			)));

		for element in &self.custom_elements {
			chain.push(element.clone());
		}

		self.chain = chain;
	}
}
impl Debug for ServiceProvider {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceProvider")
			.field("settings", &self.settings)
			.field("chain", &self.chain)
			.finish()
	}
}

/// Renders a reply as a `200 OK` form-encoded response.
pub fn form_response<M>(message: &M) -> HttpResponse
where
	M: ProtocolMessage,
{
	HttpResponse::form(200, &message.to_parameters())
}

/// Renders an error as an OAuth Problem Reporting response.
///
/// Protocol rejections answer 400 or 401 with `oauth_problem`; anything else is a 500 without
/// details.
pub fn problem_response(error: &Error) -> HttpResponse {
	match error.as_protocol() {
		Some(rejection) => {
			let params = Parameters::new()
				.with(message::PROBLEM, rejection.problem())
				.with("oauth_problem_advice", rejection.to_string());

			HttpResponse::form(rejection.http_status(), &params)
		},
		None => HttpResponse { status: 500, headers: Vec::new(), body: String::new() },
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::{
		auth::ConsumerDescription,
		clock::FixedClock,
		consumer::{ConsumerCredentials, OAuthSigner, TokenCredentials},
		message::HttpMethod,
		store::{MemoryNonceStore, MemoryStore},
	};

	struct Fixture {
		provider: ServiceProvider,
		store: Arc<MemoryStore>,
		clock: Arc<FixedClock>,
		signer: OAuthSigner,
	}

	async fn fixture(callback: Option<&str>) -> Fixture {
		let store = Arc::new(MemoryStore::default());
		let clock = Arc::new(FixedClock::new(macros::datetime!(2025-01-01 12:00 UTC)));
		let key = ConsumerKey::new("printer").expect("Consumer fixture should be valid.");
		let mut consumer = ConsumerDescription::new(key.clone(), "printer-secret");

		if let Some(callback) = callback {
			consumer = consumer.with_callback(Url::parse(callback).expect("Callback should parse."));
		}

		store.register(consumer).await.expect("Registration should succeed.");

		let provider = ServiceProvider::new(
			ServiceProviderSettings::default(),
			store.clone(),
			store.clone(),
			Arc::new(MemoryNonceStore::with_clock(Duration::minutes(13), clock.clone())),
		)
		.expect("Default settings should be valid.")
		.with_clock(clock.clone());
		let signer = OAuthSigner::new(ConsumerCredentials::new(key, "printer-secret"));

		Fixture { provider, store, clock, signer }
	}

	fn endpoint(path: &str) -> Url {
		Url::parse("https://photos.example.net/")
			.and_then(|base| base.join(path))
			.expect("Endpoint should parse.")
	}

	impl Fixture {
		fn signed(
			&self,
			path: &str,
			token: Option<&TokenCredentials>,
			protocol: &[(&str, &str)],
			nonce: &str,
		) -> HttpRequest {
			let mut request = HttpRequest::new(HttpMethod::Post, endpoint(path));

			self.signer
				.sign_at(&mut request, token, protocol, self.clock.now(), nonce)
				.expect("Signing should succeed.");

			request
		}
	}

	#[tokio::test]
	async fn three_legged_flow_issues_a_usable_access_token() {
		let fx = fixture(None).await;
		let request = fx.signed(
			"/request_token",
			None,
			&[(message::CALLBACK, "https://printer.example.com/ready")],
			"n1",
		);
		let token_request =
			fx.provider.read_token_request(&request).await.expect("Token request should verify.");
		let unauthorized = fx
			.provider
			.prepare_unauthorized_token(&token_request)
			.await
			.expect("Request token should be issued.");

		assert!(unauthorized.callback_confirmed);

		let authorize = HttpRequest::new(
			HttpMethod::Get,
			UserAuthorizationRequest {
				token: unauthorized.token.clone(),
				callback: None,
				extra: Vec::new(),
			}
			.to_url(&endpoint("/authorize")),
		);
		let auth_request = fx
			.provider
			.read_authorization_request(&authorize)
			.await
			.expect("Authorization request should be accepted.");
		let auth_response = fx
			.provider
			.prepare_authorization_response(&auth_request, "alice", vec!["photos".into()])
			.await
			.expect("Authorization should be recorded.");
		let redirect = auth_response.redirect_url().expect("1.0a token callback should be used.");
		let verifier = auth_response.verifier.clone().expect("1.0a consumers receive a verifier.");

		assert_eq!(redirect.host_str(), Some("printer.example.com"));
		assert_eq!(verifier.expose().len(), 8);

		let request_token = TokenCredentials::new(unauthorized.token.clone(), unauthorized.secret);
		let exchange = fx.signed(
			"/access_token",
			Some(&request_token),
			&[(message::VERIFIER, verifier.expose())],
			"n2",
		);
		let access_request = fx
			.provider
			.read_access_token_request(&exchange)
			.await
			.expect("Access token request should verify.");
		let access =
			fx.provider.prepare_access_token(&access_request).await.expect("Exchange should succeed.");
		let access_token = TokenCredentials::new(access.token.clone(), access.secret);
		let resource = fx.signed("/photos", Some(&access_token), &[], "n3");
		let resource_request = fx
			.provider
			.read_protected_resource_request(&resource)
			.await
			.expect("Protected resource request should verify.");
		let principal =
			fx.provider.create_principal(&resource_request).await.expect("Principal should resolve.");

		assert_eq!(principal.user, "alice");
		assert!(principal.is_in_role("photos"));
		assert_eq!(principal.consumer.as_ref(), "printer");

		let replay = fx.provider.prepare_access_token(&access_request).await.expect_err(
			"A request token can only be exchanged once.",
		);

		assert!(matches!(replay.as_protocol(), Some(ProtocolError::UnknownToken { .. })));
	}

	#[tokio::test]
	async fn replayed_and_tampered_requests_are_rejected() {
		let fx = fixture(None).await;
		let request = fx.signed("/request_token", None, &[(message::CALLBACK, "oob")], "once");

		fx.provider.read_token_request(&request).await.expect("First request should verify.");

		let err = fx.provider.read_token_request(&request).await.expect_err("Replay should fail.");

		assert_eq!(err.as_protocol(), Some(&ProtocolError::ReplayedNonce));

		let mut tampered = fx.signed("/request_token", None, &[(message::CALLBACK, "oob")], "other");

		tampered.url.query_pairs_mut().append_pair("scope", "everything");

		let err = fx.provider.read_token_request(&tampered).await.expect_err("Tampering should fail.");

		assert_eq!(err.as_protocol(), Some(&ProtocolError::InvalidSignature));

		let response = problem_response(&err);

		assert_eq!(response.status, 401);
		assert_eq!(response.form_parameters().get(message::PROBLEM), Some("signature_invalid"));
	}

	#[tokio::test]
	async fn far_future_timestamps_are_refused_before_signature_checks() {
		let fx = fixture(None).await;
		let mut url = endpoint("/request_token");

		url.query_pairs_mut()
			.append_pair(message::CONSUMER_KEY, "printer")
			.append_pair(message::TIMESTAMP, "253402300799")
			.append_pair(message::NONCE, "n")
			.append_pair(message::SIGNATURE_METHOD, "HMAC-SHA1")
			.append_pair(message::SIGNATURE, "x");

		let err = fx
			.provider
			.read_token_request(&HttpRequest::new(HttpMethod::Get, url))
			.await
			.expect_err("Timestamps from the far future should be refused.");

		assert!(matches!(err.as_protocol(), Some(ProtocolError::FutureMessage { .. })));
		assert_eq!(problem_response(&err).status, 401);
	}

	#[tokio::test]
	async fn minimum_version_rejects_legacy_consumers() {
		let mut fx = fixture(None).await;

		fx.provider.settings.minimum_required_version = ProtocolVersion::V10a;

		let request = fx.signed("/request_token", None, &[], "legacy");
		let err = fx.provider.read_token_request(&request).await.expect_err("1.0 should be refused.");

		assert_eq!(
			err.as_protocol(),
			Some(&ProtocolError::MinimumVersionNotMet {
				required: ProtocolVersion::V10a,
				actual: ProtocolVersion::V10,
			})
		);
	}

	#[tokio::test]
	async fn legacy_consumers_prefer_the_registered_callback() {
		let fx = fixture(Some("https://printer.example.com/registered")).await;
		let request = fx.signed("/request_token", None, &[], "legacy");
		let token_request =
			fx.provider.read_token_request(&request).await.expect("1.0 request should verify.");
		let unauthorized = fx
			.provider
			.prepare_unauthorized_token(&token_request)
			.await
			.expect("Request token should be issued.");

		assert!(!unauthorized.callback_confirmed);

		let auth_request = UserAuthorizationRequest {
			token: unauthorized.token.clone(),
			callback: Some(Url::parse("https://evil.example.com/").expect("URL should parse.")),
			extra: Vec::new(),
		};
		let response = fx
			.provider
			.prepare_authorization_response(&auth_request, "bob", Vec::new())
			.await
			.expect("Authorization should be recorded.");

		assert!(response.verifier.is_none(), "1.0 consumers do not receive a verifier.");
		assert_eq!(
			response.callback.as_ref().map(Url::as_str),
			Some("https://printer.example.com/registered")
		);
	}

	#[tokio::test]
	async fn out_of_band_authorization_has_no_redirect() {
		let fx = fixture(None).await;
		let request = fx.signed("/request_token", None, &[(message::CALLBACK, "oob")], "oob");
		let token_request =
			fx.provider.read_token_request(&request).await.expect("Request should verify.");
		let unauthorized = fx
			.provider
			.prepare_unauthorized_token(&token_request)
			.await
			.expect("Request token should be issued.");
		let auth_request =
			UserAuthorizationRequest { token: unauthorized.token, callback: None, extra: Vec::new() };
		let response = fx
			.provider
			.prepare_authorization_response(&auth_request, "carol", Vec::new())
			.await
			.expect("Authorization should be recorded.");

		assert!(response.redirect_url().is_none());
		assert!(response.verifier.is_some());
	}

	#[tokio::test]
	async fn stale_request_tokens_cannot_be_authorized() {
		let fx = fixture(None).await;
		let request = fx.signed("/request_token", None, &[(message::CALLBACK, "oob")], "stale");
		let token_request =
			fx.provider.read_token_request(&request).await.expect("Request should verify.");
		let unauthorized = fx
			.provider
			.prepare_unauthorized_token(&token_request)
			.await
			.expect("Request token should be issued.");

		fx.clock.advance(Duration::minutes(6));

		let authorize = HttpRequest::new(
			HttpMethod::Get,
			UserAuthorizationRequest { token: unauthorized.token, callback: None, extra: Vec::new() }
				.to_url(&endpoint("/authorize")),
		);
		let err = fx
			.provider
			.read_authorization_request(&authorize)
			.await
			.expect_err("Expired request tokens should be refused.");

		assert!(matches!(err.as_protocol(), Some(ProtocolError::ExpiredToken { .. })));
		assert_eq!(fx.store.token_count(), 1);
	}

	#[test]
	fn non_protocol_errors_render_as_server_errors() {
		let err = Error::from(crate::store::StoreError::Backend { message: "down".into() });

		assert_eq!(problem_response(&err).status, 500);
	}
}
