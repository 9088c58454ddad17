//! Attaches stored access tokens to requests built outside the crate.

// self
use crate::{
	_prelude::*,
	auth::{TokenKind, TokenRecord},
	consumer::{OAuthSigner, TokenCredentials},
	error::ProtocolError,
	message::HttpRequest,
};
#[cfg(feature = "reqwest")]
use crate::message::{FORM_CONTENT_TYPE, HttpMethod};

/// Signs an outbound request with a [`TokenRecord`] without constraining the HTTP client type.
///
/// Generic over both the request and error types so implementers can integrate with any client
/// builder while keeping the crate free of those dependencies.
pub trait RequestSignerExt<Request, Error>
where
	Self: Send + Sync,
{
	/// Consumes the request and returns it signed with the access token in `record`.
	fn attach_token(&self, request: Request, record: &TokenRecord) -> Result<Request, Error>;
}
impl RequestSignerExt<HttpRequest, Error> for OAuthSigner {
	fn attach_token(&self, mut request: HttpRequest, record: &TokenRecord) -> Result<HttpRequest> {
		if record.kind != TokenKind::Access {
			return Err(ProtocolError::WrongTokenKind {
				token: record.token.to_string(),
				expected: TokenKind::Access,
			}
			.into());
		}

		let credentials = TokenCredentials::new(record.token.clone(), record.secret.clone());

		self.sign(&mut request, Some(&credentials), &[])?;

		Ok(request)
	}
}
#[cfg(feature = "reqwest")]
impl RequestSignerExt<reqwest::Request, Error> for OAuthSigner {
	fn attach_token(
		&self,
		mut request: reqwest::Request,
		record: &TokenRecord,
	) -> Result<reqwest::Request> {
		use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};

		let view = signing_view(&request)?;
		let original_body = view.body.clone();
		let signed: HttpRequest = self.attach_token(view, record)?;

		if let Some(value) = signed.header("Authorization") {
			let value = HeaderValue::from_str(value)
				.map_err(|e| ProtocolError::malformed("Authorization", e))?;

			request.headers_mut().insert(AUTHORIZATION, value);
		}
		if signed.body != original_body {
			request.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
			*request.body_mut() = signed.body.map(reqwest::Body::from);
		}

		*request.url_mut() = signed.url;

		Ok(request)
	}
}

#[cfg(feature = "reqwest")]
fn signing_view(request: &reqwest::Request) -> Result<HttpRequest> {
	let method = request.method().as_str().parse::<HttpMethod>()?;
	let mut view = HttpRequest::new(method, request.url().clone());

	for (name, value) in request.headers() {
		if let Ok(value) = value.to_str() {
			view.headers.push((name.as_str().to_owned(), value.to_owned()));
		}
	}

	view.body = request.body().map(|body| {
		body.as_bytes().map(|bytes| String::from_utf8_lossy(bytes).into_owned()).unwrap_or_default()
	});

	if view.has_form_body() && request.body().and_then(|body| body.as_bytes()).is_none() {
		return Err(ProtocolError::MalformedMessage {
			reason: "streaming form bodies cannot be signed".into(),
		}
		.into());
	}

	Ok(view)
}
