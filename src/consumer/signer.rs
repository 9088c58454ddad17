//! Request signing shared by the consumer flows and [`RequestSignerExt`](crate::ext::RequestSignerExt).

// crates.io
use rand::distr::{Alphanumeric, SampleString};
// self
use crate::{
	_prelude::*,
	auth::{ConsumerKey, Secret, TokenKey},
	clock::{Clock, SystemClock},
	error::ConfigError,
	message::{self, FORM_CONTENT_TYPE, HttpRequest},
	signing::{self, RsaSigner, SignatureMethod, SigningSecrets},
};

const NONCE_LENGTH: usize = 16;

/// Where the `oauth_*` parameters travel on outgoing requests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterTransport {
	/// `Authorization: OAuth ...` header.
	#[default]
	AuthorizationHeader,
	/// Form-encoded entity body; falls back to the query string for body-less methods.
	PostBody,
	/// Query string.
	QueryString,
}

/// Consumer identity used to sign requests.
#[derive(Clone, Debug)]
pub struct ConsumerCredentials {
	/// `oauth_consumer_key`
	pub key: ConsumerKey,
	/// Shared secret for HMAC-SHA1 and PLAINTEXT.
	pub secret: Secret,
	rsa_signer: Option<Arc<RsaSigner>>,
}
impl ConsumerCredentials {
	/// Creates credentials from a key and shared secret.
	pub fn new(key: ConsumerKey, secret: impl Into<Secret>) -> Self {
		Self { key, secret: secret.into(), rsa_signer: None }
	}

	/// Attaches the private key used for RSA-SHA1.
	pub fn with_rsa_signer(mut self, signer: RsaSigner) -> Self {
		self.rsa_signer = Some(Arc::new(signer));

		self
	}

	/// Attaches an RSA private key given as PEM.
	pub fn with_rsa_private_key_pem(self, pem: &str) -> Result<Self, ConfigError> {
		Ok(self.with_rsa_signer(RsaSigner::from_pem(pem)?))
	}

	/// RSA signer, when configured.
	pub fn rsa_signer(&self) -> Option<&RsaSigner> {
		self.rsa_signer.as_deref()
	}
}

/// Token and secret pair held by a consumer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCredentials {
	/// Request or access token.
	pub token: TokenKey,
	/// Matching token secret.
	pub secret: Secret,
}
impl TokenCredentials {
	/// Pairs a token with its secret.
	pub fn new(token: TokenKey, secret: impl Into<Secret>) -> Self {
		Self { token, secret: secret.into() }
	}
}

/// Signs [`HttpRequest`]s on behalf of one consumer.
#[derive(Clone)]
pub struct OAuthSigner {
	credentials: ConsumerCredentials,
	method: SignatureMethod,
	transport: ParameterTransport,
	realm: Option<String>,
	clock: Arc<dyn Clock>,
}
impl OAuthSigner {
	/// HMAC-SHA1 signer sending parameters in the `Authorization` header.
	pub fn new(credentials: ConsumerCredentials) -> Self {
		Self {
			credentials,
			method: SignatureMethod::HmacSha1,
			transport: ParameterTransport::default(),
			realm: None,
			clock: Arc::new(SystemClock),
		}
	}

	/// Replaces the clock that stamps `oauth_timestamp`.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Overrides the signature method.
	pub fn with_method(mut self, method: SignatureMethod) -> Self {
		self.method = method;

		self
	}

	/// Overrides the parameter transport.
	pub fn with_transport(mut self, transport: ParameterTransport) -> Self {
		self.transport = transport;

		self
	}

	/// Sets the `realm` sent in the `Authorization` header.
	pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
		self.realm = Some(realm.into());

		self
	}

	/// Credentials used for signing.
	pub fn credentials(&self) -> &ConsumerCredentials {
		&self.credentials
	}

	/// Signature method in use.
	pub fn method(&self) -> SignatureMethod {
		self.method
	}

	/// Signs `request` with a fresh nonce and the signer's clock.
	///
	/// `protocol` carries additional `oauth_*` parameters such as `oauth_callback` or
	/// `oauth_verifier`.
	pub fn sign(
		&self,
		request: &mut HttpRequest,
		token: Option<&TokenCredentials>,
		protocol: &[(&str, &str)],
	) -> Result<()> {
		let nonce = Alphanumeric.sample_string(&mut rand::rng(), NONCE_LENGTH);

		self.sign_at(request, token, protocol, self.clock.now(), &nonce)
	}

	/// Signs `request` with the provided timestamp and nonce.
	pub fn sign_at(
		&self,
		request: &mut HttpRequest,
		token: Option<&TokenCredentials>,
		protocol: &[(&str, &str)],
		timestamp: OffsetDateTime,
		nonce: &str,
	) -> Result<()> {
		request.headers.retain(|(name, _)| !name.eq_ignore_ascii_case("Authorization"));

		let transport = self.effective_transport(request);
		let timestamp = timestamp.unix_timestamp().to_string();
		let mut oauth = vec![
			(message::CONSUMER_KEY, self.credentials.key.as_ref()),
			(message::SIGNATURE_METHOD, self.method.as_str()),
			(message::TIMESTAMP, timestamp.as_str()),
			(message::NONCE, nonce),
			(message::VERSION, "1.0"),
		];

		if let Some(token) = token {
			oauth.push((message::TOKEN, token.token.as_ref()));
		}

		oauth.extend(protocol.iter().copied());

		let mut params = request.parameters()?;

		params.extend(oauth.iter().copied());

		let base = signing::signature_base_string(request.method, &request.url, &params);
		let secrets =
			SigningSecrets::new(&self.credentials.secret, token.map(|token| &token.secret));
		let signature = signing::sign(self.method, &base, secrets, self.credentials.rsa_signer())?;

		oauth.push((message::SIGNATURE, signature.as_str()));

		match transport {
			ParameterTransport::AuthorizationHeader => request.set_header(
				"Authorization",
				message::format_authorization_header(self.realm.as_deref(), oauth),
			),
			ParameterTransport::PostBody => {
				let appended = message::to_form(oauth);
				let body = match request.body.take().filter(|body| !body.is_empty()) {
					Some(body) => format!("{body}&{appended}"),
					None => appended,
				};

				request.body = Some(body);
				request.set_header("Content-Type", FORM_CONTENT_TYPE);
			},
			ParameterTransport::QueryString => {
				request.url.query_pairs_mut().extend_pairs(oauth);
			},
		}

		Ok(())
	}

	fn effective_transport(&self, request: &HttpRequest) -> ParameterTransport {
		match self.transport {
			ParameterTransport::PostBody if !request.method.allows_body() =>
				ParameterTransport::QueryString,
			ParameterTransport::PostBody if request.body.is_some() && !request.has_form_body() =>
				ParameterTransport::AuthorizationHeader,
			transport => transport,
		}
	}
}
impl Debug for OAuthSigner {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuthSigner")
			.field("credentials", &self.credentials)
			.field("method", &self.method)
			.field("transport", &self.transport)
			.field("realm", &self.realm)
			.finish()
	}
}
