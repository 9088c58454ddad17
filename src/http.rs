//! Transport primitives for consumer calls and OpenID direct verification.
//!
//! The crate depends on an HTTP stack only through [`HttpClient`]. Implementations receive the
//! stack-neutral [`HttpRequest`] and hand back an [`HttpResponse`] carrying the status, headers,
//! and body so error mapping (including `Retry-After`) happens in one place.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// self
use crate::{
	_prelude::*,
	message::{HttpMethod, HttpRequest, HttpResponse},
};
#[cfg(feature = "reqwest")]
use crate::error::{ConfigError, TransientError, TransportError};

/// Boxed future returned by [`HttpClient::execute`].
pub type HttpFuture<'a> = Pin<Box<dyn Future<Output = Result<HttpResponse>> + 'a + Send>>;

/// Abstraction over HTTP transports.
///
/// Implementations must be `Send + Sync + 'static` so a single client can be shared by many
/// consumers and relying parties. Any HTTP status, including 4xx and 5xx, must be returned as an
/// [`HttpResponse`]; only transport failures become errors.
pub trait HttpClient
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and collects the full response.
	fn execute(&self, request: HttpRequest) -> HttpFuture<'_>;
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Token endpoints answer directly, so custom clients should disable redirect following.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client that never follows redirects.
	pub fn without_redirects() -> Result<Self, ConfigError> {
		Ok(Self(ReqwestClient::builder().redirect(reqwest::redirect::Policy::none()).build()?))
	}

	fn to_reqwest(&self, request: HttpRequest) -> Result<reqwest::Request, ReqwestError> {
		let method = match request.method {
			HttpMethod::Get => reqwest::Method::GET,
			HttpMethod::Post => reqwest::Method::POST,
			HttpMethod::Put => reqwest::Method::PUT,
			HttpMethod::Delete => reqwest::Method::DELETE,
			HttpMethod::Patch => reqwest::Method::PATCH,
			HttpMethod::Head => reqwest::Method::HEAD,
		};
		let mut builder = self.0.request(method, request.url);

		for (name, value) in &request.headers {
			builder = builder.header(name.as_str(), value.as_str());
		}
		if let Some(body) = request.body {
			builder = builder.body(body);
		}

		builder.build()
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpClient for ReqwestHttpClient {
	fn execute(&self, request: HttpRequest) -> HttpFuture<'_> {
		Box::pin(async move {
			let request = self.to_reqwest(request).map_err(map_reqwest_error)?;
			let response = self.0.execute(request).await.map_err(map_reqwest_error)?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
				})
				.collect();
			let body = response.text().await.map_err(map_reqwest_error)?;

			Ok(HttpResponse { status, headers, body })
		})
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::Endpoint {
			message: "Request timed out".into(),
			status: err.status().map(|code| code.as_u16()),
			retry_after: None,
		}
		.into();
	}

	TransportError::from(err).into()
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// crates.io
	use httpmock::prelude::*;
	// self
	use super::*;

	#[tokio::test]
	async fn reqwest_client_captures_status_headers_and_body() {
		let server = MockServer::start_async().await;
		let mock = server
			.mock_async(|when, then| {
				when.method(POST).path("/initiate").header("authorization", "OAuth oauth_nonce=\"n\"");
				then.status(401)
					.header("Retry-After", "30")
					.header("Content-Type", "application/x-www-form-urlencoded")
					.body("oauth_problem=nonce_used");
			})
			.await;
		let client = crate::_preludet::test_reqwest_http_client();
		let request = HttpRequest::new(
			HttpMethod::Post,
			Url::parse(&server.url("/initiate")).expect("Mock URL should parse."),
		)
		.with_header("Authorization", "OAuth oauth_nonce=\"n\"");
		let response = client.execute(request).await.expect("Mock server should answer.");

		mock.assert_async().await;

		assert_eq!(response.status, 401);
		assert_eq!(response.retry_after(), Some(Duration::seconds(30)));
		assert_eq!(response.form_parameters().get("oauth_problem"), Some("nonce_used"));
	}
}
