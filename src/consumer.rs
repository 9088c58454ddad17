//! Consumer: obtains request tokens, sends users to the service provider, exchanges authorized
//! request tokens, and signs protected resource requests.
//!
//! Request and access token secrets live in a [`TokenStore`] so a callback handled by another
//! worker (or after a restart, with a persistent store) can still finish the exchange.
//! Exchanges are single-flighted per request token: concurrent callbacks for the same token
//! perform one access token request and share its result.

pub mod descriptor;
pub mod problem;
pub mod session;
pub mod signer;

pub use descriptor::*;
pub use problem::*;
pub use session::*;
pub use signer::*;

// self
use crate::{
	_prelude::*,
	auth::{Secret, TokenKey, TokenKind, TokenRecord, TokenStatus},
	clock::{Clock, SystemClock},
	error::{ConfigError, ProtocolError, TransientError},
	http::HttpClient,
	message::{
		self, AuthorizedTokenResponse, Callback, HttpMethod, HttpRequest, HttpResponse,
		ParameterSource, Parameters, ProtocolMessage, ProtocolVersion, UnauthorizedTokenResponse,
		UserAuthorizationRequest, UserAuthorizationResponse,
	},
	obs::{self, Operation},
	store::TokenStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

#[cfg(feature = "reqwest")]
/// Consumer specialized for the crate's default reqwest transport.
pub type ReqwestConsumer = Consumer<ReqwestHttpClient>;

type ExchangeGuards = Arc<Mutex<HashMap<TokenKey, Arc<AsyncMutex<()>>>>>;

/// Single-flight slot for one request token, released from the map once the last holder drops.
struct ExchangeGuard<'a> {
	guards: &'a ExchangeGuards,
	request_token: TokenKey,
	lock: Arc<AsyncMutex<()>>,
}
impl<'a> ExchangeGuard<'a> {
	fn acquire(guards: &'a ExchangeGuards, request_token: &TokenKey) -> Self {
		let lock = guards
			.lock()
			.entry(request_token.clone())
			.or_insert_with(|| Arc::new(AsyncMutex::new(())))
			.clone();

		Self { guards, request_token: request_token.clone(), lock }
	}
}
impl Drop for ExchangeGuard<'_> {
	fn drop(&mut self) {
		let mut guards = self.guards.lock();

		// One reference in the map plus ours means nobody else is waiting.
		if Arc::strong_count(&self.lock) == 2 {
			guards.remove(&self.request_token);
		}
	}
}

/// Runs the consumer side of the three-legged flow against one service provider.
#[derive(Clone)]
pub struct Consumer<C>
where
	C: ?Sized + HttpClient,
{
	/// HTTP client used for every call to the service provider.
	pub http_client: Arc<C>,
	/// Endpoints and signing preferences of the service provider.
	pub description: ServiceProviderDescription,
	/// Holds request token secrets and issued access tokens.
	pub tokens: Arc<dyn TokenStore>,
	signer: OAuthSigner,
	classifier: Arc<dyn ProblemClassifier>,
	clock: Arc<dyn Clock>,
	exchange_guards: ExchangeGuards,
}
impl<C> Consumer<C>
where
	C: ?Sized + HttpClient,
{
	/// Creates a consumer that reuses the caller-provided HTTP client.
	pub fn with_http_client(
		description: ServiceProviderDescription,
		credentials: ConsumerCredentials,
		tokens: Arc<dyn TokenStore>,
		http_client: impl Into<Arc<C>>,
	) -> Self {
		let mut signer = OAuthSigner::new(credentials)
			.with_method(description.signature_method)
			.with_transport(description.transport);

		if let Some(realm) = &description.realm {
			signer = signer.with_realm(realm.clone());
		}

		Self {
			http_client: http_client.into(),
			description,
			tokens,
			signer,
			classifier: Arc::new(DefaultProblemClassifier),
			clock: Arc::new(SystemClock),
			exchange_guards: Default::default(),
		}
	}

	/// Replaces the classifier applied to failed service provider responses.
	pub fn with_problem_classifier(mut self, classifier: Arc<dyn ProblemClassifier>) -> Self {
		self.classifier = classifier;

		self
	}

	/// Replaces the clock behind `oauth_timestamp` and stored token records.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.signer = self.signer.with_clock(clock.clone());
		self.clock = clock;

		self
	}

	/// Signer holding this consumer's credentials.
	pub fn signer(&self) -> &OAuthSigner {
		&self.signer
	}

	/// Obtains an unauthorized request token and builds the URL the user should visit.
	///
	/// `callback` of `None` requests out-of-band authorization. For 1.0a providers the callback
	/// is sent with the request token request and must be confirmed by the provider; for 1.0
	/// providers it is appended to the authorization URL instead. `extra` parameters (such as
	/// `scope`) are sent with the request.
	pub async fn request_user_authorization(
		&self,
		callback: Option<Url>,
		extra: &[(&str, &str)],
	) -> Result<AuthorizationSession> {
		obs::observe(Operation::RequestToken, "consumer.request_user_authorization", async {
			let version = self.description.version;
			let wire_callback = callback.clone().map_or(Callback::OutOfBand, Callback::Url);
			let mut protocol = Vec::new();

			if version >= ProtocolVersion::V10a {
				protocol.push((message::CALLBACK, wire_callback.as_wire()));
			}

			let mut request = self.token_request(&self.description.endpoints.request_token, extra);

			self.signer.sign(&mut request, None, &protocol)?;

			let response = self.http_client.execute(request).await?;
			let reply: UnauthorizedTokenResponse = self.read_reply(&response)?;

			if version >= ProtocolVersion::V10a && !reply.callback_confirmed {
				return Err(ProtocolError::missing(message::CALLBACK_CONFIRMED).into());
			}

			let issued_at = self.clock.now();
			let record = TokenRecord::builder(TokenKind::Request, self.signer.credentials().key.clone())
				.token(reply.token.clone())
				.secret(reply.secret)
				.created_at(issued_at)
				.callback(callback.clone())
				.consumer_version(version)
				.extra(reply.extra.into_iter().collect())
				.build()
				.map_err(ConfigError::from)?;

			self.tokens.save(record).await?;

			let authorization_url = UserAuthorizationRequest {
				token: reply.token.clone(),
				callback: if version >= ProtocolVersion::V10a { None } else { callback.clone() },
				extra: Vec::new(),
			}
			.to_url(&self.description.endpoints.user_authorization);

			Ok(AuthorizationSession {
				request_token: reply.token,
				authorization_url,
				callback,
				callback_confirmed: reply.callback_confirmed,
				version,
				issued_at,
			})
		})
		.await
	}

	/// Completes the flow from the URL the service provider redirected the user agent to.
	///
	/// Reads `oauth_token` and `oauth_verifier` from the query string and exchanges the request
	/// token. Repeated calls for the same token return the stored access token.
	pub async fn process_user_authorization(&self, callback_url: &Url) -> Result<TokenRecord> {
		let params = Parameters::from_form(
			callback_url.query().unwrap_or_default(),
			Some(ParameterSource::Query),
		);
		let reply = UserAuthorizationResponse::from_parameters(&params)?;

		self.exchange_authorized_token(&reply.token, reply.verifier.as_ref()).await
	}

	/// Exchanges an authorized request token for an access token.
	///
	/// Use this directly for out-of-band flows where the user types in the verifier.
	pub async fn exchange_authorized_token(
		&self,
		request_token: &TokenKey,
		verifier: Option<&Secret>,
	) -> Result<TokenRecord> {
		obs::observe(Operation::AccessToken, "consumer.exchange_authorized_token", async {
			let guard = ExchangeGuard::acquire(&self.exchange_guards, request_token);
			let _lock = guard.lock.lock().await;

			self.exchange_locked(request_token, verifier).await
		})
		.await
	}

	/// Builds and signs a request for a protected resource using a stored access token.
	///
	/// `extra` parameters are form-encoded into the body for methods that carry one and appended
	/// to the query string otherwise.
	pub async fn prepare_authorized_request(
		&self,
		method: HttpMethod,
		url: Url,
		access_token: &TokenKey,
		extra: &[(&str, &str)],
	) -> Result<HttpRequest> {
		obs::observe(Operation::ProtectedResource, "consumer.prepare_authorized_request", async {
			let record = self.access_record(access_token).await?;
			let mut request = build_request(method, url, extra);

			self.sign_request(&mut request, Some(&TokenCredentials::new(record.token, record.secret)))?;

			Ok(request)
		})
		.await
	}

	/// Sends a protected resource request and returns the successful response.
	///
	/// Failed responses are classified like token endpoint failures.
	pub async fn call_protected_resource(
		&self,
		method: HttpMethod,
		url: Url,
		access_token: &TokenKey,
		extra: &[(&str, &str)],
	) -> Result<HttpResponse> {
		let request = self.prepare_authorized_request(method, url, access_token, extra).await?;
		let response = self.http_client.execute(request).await?;

		if response.is_success() {
			Ok(response)
		} else {
			Err(problem::response_error(self.classifier.as_ref(), &response))
		}
	}

	/// Signs an arbitrary request with this consumer's credentials and an optional token.
	pub fn sign_request(
		&self,
		request: &mut HttpRequest,
		token: Option<&TokenCredentials>,
	) -> Result<()> {
		self.signer.sign(request, token, &[])
	}

	async fn exchange_locked(
		&self,
		request_token: &TokenKey,
		verifier: Option<&Secret>,
	) -> Result<TokenRecord> {
		let record = self
			.tokens
			.fetch(request_token)
			.await?
			.ok_or_else(|| ProtocolError::UnknownToken { token: request_token.to_string() })?;

		if record.kind != TokenKind::Request {
			return Err(ProtocolError::WrongTokenKind {
				token: request_token.to_string(),
				expected: TokenKind::Request,
			}
			.into());
		}
		if let Some(access_token) = &record.exchanged_for {
			if let Some(access) = self.tokens.fetch(access_token).await? {
				return Ok(access);
			}
		}

		let mut protocol = Vec::new();

		match verifier {
			Some(verifier) => protocol.push((message::VERIFIER, verifier.expose())),
			None if record.consumer_version >= ProtocolVersion::V10a =>
				return Err(ProtocolError::missing(message::VERIFIER).into()),
			None => {},
		}

		let mut request = self.token_request(&self.description.endpoints.access_token, &[]);
		let credentials = TokenCredentials::new(record.token.clone(), record.secret.clone());

		self.signer.sign(&mut request, Some(&credentials), &protocol)?;

		let response = self.http_client.execute(request).await?;
		let reply: AuthorizedTokenResponse = self.read_reply(&response)?;
		let now = self.clock.now();
		let access = TokenRecord::builder(TokenKind::Access, record.consumer_key.clone())
			.token(reply.token)
			.secret(reply.secret)
			.created_at(now)
			.consumer_version(record.consumer_version)
			.extra(reply.extra.into_iter().collect())
			.build()
			.map_err(ConfigError::from)?;

		self.tokens.save(access.clone()).await?;

		let mut exchanged = record;

		exchanged.mark_exchanged(access.token.clone(), now);
		self.tokens.save(exchanged).await?;

		Ok(access)
	}

	async fn access_record(&self, access_token: &TokenKey) -> Result<TokenRecord> {
		let record = self
			.tokens
			.fetch(access_token)
			.await?
			.ok_or_else(|| ProtocolError::UnknownToken { token: access_token.to_string() })?;

		if record.kind != TokenKind::Access {
			return Err(ProtocolError::WrongTokenKind {
				token: access_token.to_string(),
				expected: TokenKind::Access,
			}
			.into());
		}

		match record.status_at(self.clock.now()) {
			TokenStatus::Active => Ok(record),
			TokenStatus::Expired =>
				Err(ProtocolError::ExpiredToken { token: access_token.to_string() }.into()),
			_ => Err(ProtocolError::UnknownToken { token: access_token.to_string() }.into()),
		}
	}

	fn read_reply<M>(&self, response: &HttpResponse) -> Result<M>
	where
		M: ProtocolMessage,
	{
		if !response.is_success() {
			return Err(problem::response_error(self.classifier.as_ref(), response));
		}

		M::from_parameters(&response.form_parameters()).map_err(|e| {
			TransientError::ResponseParse { message: e.to_string(), status: Some(response.status) }
				.into()
		})
	}

	fn token_request(&self, endpoint: &Url, extra: &[(&str, &str)]) -> HttpRequest {
		build_request(self.description.token_endpoint_method, endpoint.clone(), extra)
	}
}
#[cfg(feature = "reqwest")]
impl Consumer<ReqwestHttpClient> {
	/// Creates a consumer backed by a reqwest client that does not follow redirects.
	pub fn new(
		description: ServiceProviderDescription,
		credentials: ConsumerCredentials,
		tokens: Arc<dyn TokenStore>,
	) -> Result<Self, ConfigError> {
		Ok(Self::with_http_client(
			description,
			credentials,
			tokens,
			ReqwestHttpClient::without_redirects()?,
		))
	}
}
impl<C> Debug for Consumer<C>
where
	C: ?Sized + HttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Consumer")
			.field("description", &self.description)
			.field("consumer_key", &self.signer.credentials().key)
			.field("signature_method", &self.signer.method())
			.finish()
	}
}

fn build_request(method: HttpMethod, mut url: Url, extra: &[(&str, &str)]) -> HttpRequest {
	if extra.is_empty() {
		return HttpRequest::new(method, url);
	}
	if method.allows_body() {
		return HttpRequest::new(method, url).with_form_body(extra.iter().copied());
	}

	url.query_pairs_mut().extend_pairs(extra);

	HttpRequest::new(method, url)
}
