//! Service provider metadata consumed by [`Consumer`](crate::consumer::Consumer).

// self
use crate::{
	_prelude::*,
	consumer::ParameterTransport,
	message::{HttpMethod, ProtocolVersion},
	signing::SignatureMethod,
};

/// Errors raised while constructing a [`ServiceProviderDescription`].
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ServiceProviderDescriptionError {
	/// Request token endpoint is mandatory.
	#[error("Missing request token endpoint.")]
	MissingRequestTokenEndpoint,
	/// User authorization endpoint is mandatory.
	#[error("Missing user authorization endpoint.")]
	MissingUserAuthorizationEndpoint,
	/// Access token endpoint is mandatory.
	#[error("Missing access token endpoint.")]
	MissingAccessTokenEndpoint,
	/// Endpoints must use HTTPS unless explicitly allowed.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
}

/// Endpoint set published by a service provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceProviderEndpoints {
	/// Where unauthorized request tokens are obtained.
	pub request_token: Url,
	/// Where the user agent is sent to approve a request token.
	pub user_authorization: Url,
	/// Where authorized request tokens are exchanged.
	pub access_token: Url,
}

/// Immutable description of a service provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceProviderDescription {
	/// Endpoint definitions.
	pub endpoints: ServiceProviderEndpoints,
	/// HTTP method used on the token endpoints.
	pub token_endpoint_method: HttpMethod,
	/// Signature method the provider expects.
	pub signature_method: SignatureMethod,
	/// Where the `oauth_*` parameters are sent.
	pub transport: ParameterTransport,
	/// `realm` sent in the `Authorization` header.
	pub realm: Option<String>,
	/// Protocol revision the provider speaks.
	pub version: ProtocolVersion,
}
impl ServiceProviderDescription {
	/// Creates a builder.
	pub fn builder() -> ServiceProviderDescriptionBuilder {
		ServiceProviderDescriptionBuilder::default()
	}

	fn validate(&self, allow_insecure: bool) -> Result<(), ServiceProviderDescriptionError> {
		if allow_insecure {
			return Ok(());
		}

		validate_endpoint("request token", &self.endpoints.request_token)?;
		validate_endpoint("user authorization", &self.endpoints.user_authorization)?;
		validate_endpoint("access token", &self.endpoints.access_token)?;

		Ok(())
	}
}

/// Builder for [`ServiceProviderDescription`] values.
#[derive(Debug)]
pub struct ServiceProviderDescriptionBuilder {
	/// Request token endpoint.
	pub request_token_endpoint: Option<Url>,
	/// User authorization endpoint.
	pub user_authorization_endpoint: Option<Url>,
	/// Access token endpoint.
	pub access_token_endpoint: Option<Url>,
	/// HTTP method used on the token endpoints.
	pub token_endpoint_method: HttpMethod,
	/// Signature method.
	pub signature_method: SignatureMethod,
	/// Parameter transport.
	pub transport: ParameterTransport,
	/// Header realm.
	pub realm: Option<String>,
	/// Protocol revision.
	pub version: ProtocolVersion,
	/// Accept plain-HTTP endpoints (local testing only).
	pub allow_insecure: bool,
}
impl ServiceProviderDescriptionBuilder {
	/// Sets the request token endpoint.
	pub fn request_token_endpoint(mut self, url: Url) -> Self {
		self.request_token_endpoint = Some(url);

		self
	}

	/// Sets the user authorization endpoint.
	pub fn user_authorization_endpoint(mut self, url: Url) -> Self {
		self.user_authorization_endpoint = Some(url);

		self
	}

	/// Sets the access token endpoint.
	pub fn access_token_endpoint(mut self, url: Url) -> Self {
		self.access_token_endpoint = Some(url);

		self
	}

	/// Overrides the token endpoint method (`POST` by default).
	pub fn token_endpoint_method(mut self, method: HttpMethod) -> Self {
		self.token_endpoint_method = method;

		self
	}

	/// Overrides the signature method.
	pub fn signature_method(mut self, method: SignatureMethod) -> Self {
		self.signature_method = method;

		self
	}

	/// Overrides the parameter transport.
	pub fn transport(mut self, transport: ParameterTransport) -> Self {
		self.transport = transport;

		self
	}

	/// Sets the header realm.
	pub fn realm(mut self, realm: impl Into<String>) -> Self {
		self.realm = Some(realm.into());

		self
	}

	/// Overrides the protocol revision (1.0a by default).
	pub fn version(mut self, version: ProtocolVersion) -> Self {
		self.version = version;

		self
	}

	/// Accepts `http://` endpoints.
	pub fn allow_insecure(mut self, allow: bool) -> Self {
		self.allow_insecure = allow;

		self
	}

	/// Consumes the builder and validates the resulting description.
	pub fn build(self) -> Result<ServiceProviderDescription, ServiceProviderDescriptionError> {
		let request_token = self
			.request_token_endpoint
			.ok_or(ServiceProviderDescriptionError::MissingRequestTokenEndpoint)?;
		let user_authorization = self
			.user_authorization_endpoint
			.ok_or(ServiceProviderDescriptionError::MissingUserAuthorizationEndpoint)?;
		let access_token = self
			.access_token_endpoint
			.ok_or(ServiceProviderDescriptionError::MissingAccessTokenEndpoint)?;
		let description = ServiceProviderDescription {
			endpoints: ServiceProviderEndpoints { request_token, user_authorization, access_token },
			token_endpoint_method: self.token_endpoint_method,
			signature_method: self.signature_method,
			transport: self.transport,
			realm: self.realm,
			version: self.version,
		};

		description.validate(self.allow_insecure)?;

		Ok(description)
	}
}
impl Default for ServiceProviderDescriptionBuilder {
	fn default() -> Self {
		Self {
			request_token_endpoint: None,
			user_authorization_endpoint: None,
			access_token_endpoint: None,
			token_endpoint_method: HttpMethod::Post,
			signature_method: SignatureMethod::HmacSha1,
			transport: ParameterTransport::default(),
			realm: None,
			version: ProtocolVersion::V10a,
			allow_insecure: false,
		}
	}
}

fn validate_endpoint(
	name: &'static str,
	url: &Url,
) -> Result<(), ServiceProviderDescriptionError> {
	if url.scheme() != "https" {
		Err(ServiceProviderDescriptionError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	} else {
		Ok(())
	}
}
