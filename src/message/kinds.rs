//! Typed protocol messages and their explicit parameter mapping.

// self
use crate::{
	_prelude::*,
	auth::{ConsumerKey, Secret, TokenKey},
	error::ProtocolError,
	message::{
		Parameters, ProtocolVersion,
		params::{self, Callback, required},
	},
};

/// Message that maps to and from wire parameters.
pub trait ProtocolMessage
where
	Self: Sized,
{
	/// Parameters that must be present for the message to parse.
	const REQUIRED: &'static [&'static str];

	/// Renders the message, extra parameters included.
	fn to_parameters(&self) -> Parameters;

	/// Parses the message; unknown non-protocol parameters are kept as extras.
	fn from_parameters(params: &Parameters) -> Result<Self, ProtocolError>;

	/// Fails with [`ProtocolError::MissingParameter`] for the first absent required key.
	fn check_required(params: &Parameters) -> Result<(), ProtocolError> {
		Self::REQUIRED.iter().try_for_each(|name| required(params, name).map(|_| ()))
	}
}

/// Consumer request for an unauthorized request token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnauthorizedTokenRequest {
	/// Requesting consumer.
	pub consumer_key: ConsumerKey,
	/// `oauth_callback`; its presence marks a 1.0a consumer.
	pub callback: Option<Callback>,
	/// Non-protocol parameters (e.g. `scope`).
	pub extra: Vec<(String, String)>,
}
impl UnauthorizedTokenRequest {
	/// Protocol revision the consumer speaks.
	pub fn version(&self) -> ProtocolVersion {
		if self.callback.is_some() { ProtocolVersion::V10a } else { ProtocolVersion::V10 }
	}
}
impl ProtocolMessage for UnauthorizedTokenRequest {
	const REQUIRED: &'static [&'static str] = &[params::CONSUMER_KEY];

	fn to_parameters(&self) -> Parameters {
		let mut out = Parameters::new().with(params::CONSUMER_KEY, self.consumer_key.as_ref());

		if let Some(callback) = &self.callback {
			out.push(params::CALLBACK, callback.as_wire());
		}

		out.extend(self.extra.iter().map(|(k, v)| (k.as_str(), v.as_str())));

		out
	}

	fn from_parameters(params: &Parameters) -> Result<Self, ProtocolError> {
		Self::check_required(params)?;

		Ok(Self {
			consumer_key: consumer_key(params)?,
			callback: params.get(params::CALLBACK).map(str::parse::<Callback>).transpose()?,
			extra: params.extra(),
		})
	}
}

/// Service provider reply carrying a fresh request token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnauthorizedTokenResponse {
	/// Request token.
	pub token: TokenKey,
	/// Request token secret.
	pub secret: Secret,
	/// `oauth_callback_confirmed=true`, sent to 1.0a consumers.
	pub callback_confirmed: bool,
	/// Additional response parameters.
	pub extra: Vec<(String, String)>,
}
impl ProtocolMessage for UnauthorizedTokenResponse {
	const REQUIRED: &'static [&'static str] = &[params::TOKEN, params::TOKEN_SECRET];

	fn to_parameters(&self) -> Parameters {
		let mut out = Parameters::new()
			.with(params::TOKEN, self.token.as_ref())
			.with(params::TOKEN_SECRET, self.secret.expose());

		if self.callback_confirmed {
			out.push(params::CALLBACK_CONFIRMED, "true");
		}

		out.extend(self.extra.iter().map(|(k, v)| (k.as_str(), v.as_str())));

		out
	}

	fn from_parameters(params: &Parameters) -> Result<Self, ProtocolError> {
		Self::check_required(params)?;

		Ok(Self {
			token: token(params)?,
			secret: Secret::new(required(params, params::TOKEN_SECRET)?),
			callback_confirmed: params.get(params::CALLBACK_CONFIRMED) == Some("true"),
			extra: params.extra(),
		})
	}
}

/// Indirect request sent through the user agent to the authorization page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserAuthorizationRequest {
	/// Request token the user is asked to approve.
	pub token: TokenKey,
	/// `oauth_callback` supplied at authorization time (1.0 only; ignored for 1.0a tokens).
	pub callback: Option<Url>,
	/// Non-protocol parameters.
	pub extra: Vec<(String, String)>,
}
impl UserAuthorizationRequest {
	/// Builds the URL the user agent is sent to.
	pub fn to_url(&self, endpoint: &Url) -> Url {
		let mut url = endpoint.clone();

		url.query_pairs_mut().extend_pairs(self.to_parameters().pairs());

		url
	}
}
impl ProtocolMessage for UserAuthorizationRequest {
	const REQUIRED: &'static [&'static str] = &[params::TOKEN];

	fn to_parameters(&self) -> Parameters {
		let mut out = Parameters::new().with(params::TOKEN, self.token.as_ref());

		if let Some(callback) = &self.callback {
			out.push(params::CALLBACK, callback.as_str());
		}

		out.extend(self.extra.iter().map(|(k, v)| (k.as_str(), v.as_str())));

		out
	}

	fn from_parameters(params: &Parameters) -> Result<Self, ProtocolError> {
		Self::check_required(params)?;

		let callback = match params.get(params::CALLBACK).map(str::parse::<Callback>).transpose()? {
			Some(Callback::Url(url)) => Some(url),
			_ => None,
		};

		Ok(Self { token: token(params)?, callback, extra: params.extra() })
	}
}

/// Reply sent back to the consumer once the user approved the request token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserAuthorizationResponse {
	/// Approved request token.
	pub token: TokenKey,
	/// Verification code (1.0a).
	pub verifier: Option<Secret>,
	/// Where the user agent should be sent; `None` means the code is displayed to the user.
	pub callback: Option<Url>,
}
impl UserAuthorizationResponse {
	/// Callback URL with `oauth_token` and `oauth_verifier` appended.
	pub fn redirect_url(&self) -> Option<Url> {
		let mut url = self.callback.clone()?;

		url.query_pairs_mut().extend_pairs(self.to_parameters().pairs());

		Some(url)
	}
}
impl ProtocolMessage for UserAuthorizationResponse {
	const REQUIRED: &'static [&'static str] = &[params::TOKEN];

	fn to_parameters(&self) -> Parameters {
		let mut out = Parameters::new().with(params::TOKEN, self.token.as_ref());

		if let Some(verifier) = &self.verifier {
			out.push(params::VERIFIER, verifier.expose());
		}

		out
	}

	fn from_parameters(params: &Parameters) -> Result<Self, ProtocolError> {
		Self::check_required(params)?;

		Ok(Self {
			token: token(params)?,
			verifier: params.get(params::VERIFIER).map(Secret::new),
			callback: None,
		})
	}
}

/// Consumer request trading an authorized request token for an access token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizedTokenRequest {
	/// Requesting consumer.
	pub consumer_key: ConsumerKey,
	/// Authorized request token.
	pub token: TokenKey,
	/// `oauth_verifier`; its presence marks a 1.0a consumer.
	pub verifier: Option<Secret>,
	/// Non-protocol parameters.
	pub extra: Vec<(String, String)>,
}
impl AuthorizedTokenRequest {
	/// Protocol revision the consumer speaks.
	pub fn version(&self) -> ProtocolVersion {
		if self.verifier.is_some() { ProtocolVersion::V10a } else { ProtocolVersion::V10 }
	}
}
impl ProtocolMessage for AuthorizedTokenRequest {
	const REQUIRED: &'static [&'static str] = &[params::CONSUMER_KEY, params::TOKEN];

	fn to_parameters(&self) -> Parameters {
		let mut out = Parameters::new()
			.with(params::CONSUMER_KEY, self.consumer_key.as_ref())
			.with(params::TOKEN, self.token.as_ref());

		if let Some(verifier) = &self.verifier {
			out.push(params::VERIFIER, verifier.expose());
		}

		out.extend(self.extra.iter().map(|(k, v)| (k.as_str(), v.as_str())));

		out
	}

	fn from_parameters(params: &Parameters) -> Result<Self, ProtocolError> {
		Self::check_required(params)?;

		Ok(Self {
			consumer_key: consumer_key(params)?,
			token: token(params)?,
			verifier: params.get(params::VERIFIER).map(Secret::new),
			extra: params.extra(),
		})
	}
}

/// Service provider reply carrying the access token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizedTokenResponse {
	/// Access token.
	pub token: TokenKey,
	/// Access token secret.
	pub secret: Secret,
	/// Additional response parameters (e.g. a user identifier).
	pub extra: Vec<(String, String)>,
}
impl ProtocolMessage for AuthorizedTokenResponse {
	const REQUIRED: &'static [&'static str] = &[params::TOKEN, params::TOKEN_SECRET];

	fn to_parameters(&self) -> Parameters {
		let mut out = Parameters::new()
			.with(params::TOKEN, self.token.as_ref())
			.with(params::TOKEN_SECRET, self.secret.expose());

		out.extend(self.extra.iter().map(|(k, v)| (k.as_str(), v.as_str())));

		out
	}

	fn from_parameters(params: &Parameters) -> Result<Self, ProtocolError> {
		Self::check_required(params)?;

		Ok(Self {
			token: token(params)?,
			secret: Secret::new(required(params, params::TOKEN_SECRET)?),
			extra: params.extra(),
		})
	}
}

/// Signed request for a protected resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessProtectedResourceRequest {
	/// Requesting consumer.
	pub consumer_key: ConsumerKey,
	/// Access token.
	pub token: TokenKey,
	/// Non-protocol parameters (resource query and body fields).
	pub extra: Vec<(String, String)>,
}
impl ProtocolMessage for AccessProtectedResourceRequest {
	const REQUIRED: &'static [&'static str] = &[params::CONSUMER_KEY, params::TOKEN];

	fn to_parameters(&self) -> Parameters {
		let mut out = Parameters::new()
			.with(params::CONSUMER_KEY, self.consumer_key.as_ref())
			.with(params::TOKEN, self.token.as_ref());

		out.extend(self.extra.iter().map(|(k, v)| (k.as_str(), v.as_str())));

		out
	}

	fn from_parameters(params: &Parameters) -> Result<Self, ProtocolError> {
		Self::check_required(params)?;

		Ok(Self { consumer_key: consumer_key(params)?, token: token(params)?, extra: params.extra() })
	}
}

fn consumer_key(params: &Parameters) -> Result<ConsumerKey, ProtocolError> {
	ConsumerKey::new(required(params, params::CONSUMER_KEY)?)
		.map_err(|e| ProtocolError::malformed(params::CONSUMER_KEY, e))
}

fn token(params: &Parameters) -> Result<TokenKey, ProtocolError> {
	TokenKey::new(required(params, params::TOKEN)?).map_err(|e| ProtocolError::malformed(params::TOKEN, e))
}
