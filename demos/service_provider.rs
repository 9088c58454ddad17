//! Hosts a service provider in-process: registers a consumer, walks a request token through user
//! approval and exchange, then verifies a signed protected resource request.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use url::Url;
// self
use oauth1_kit::{
	auth::{ConsumerDescription, ConsumerKey},
	consumer::{ConsumerCredentials, OAuthSigner, TokenCredentials},
	message::{self, HttpMethod, HttpRequest, ProtocolMessage, UnauthorizedTokenResponse},
	provider::{self, ServiceProvider, ServiceProviderSettings},
	store::{ConsumerStore, MemoryNonceStore, MemoryStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let settings = ServiceProviderSettings::default();
	let store = Arc::new(MemoryStore::default());
	let key = ConsumerKey::new("dpf43f3p2l4k3l03")?;

	store.register(ConsumerDescription::new(key.clone(), "kd94hf93k423kf44")).await?;

	let nonces = Arc::new(MemoryNonceStore::new(settings.nonce_window()));
	let sp = ServiceProvider::new(settings, store.clone(), store, nonces)?;
	let signer = OAuthSigner::new(ConsumerCredentials::new(key, "kd94hf93k423kf44"));
	// Request token.
	let mut request =
		HttpRequest::new(HttpMethod::Post, Url::parse("https://photos.example.net/request_token")?);

	signer.sign(&mut request, None, &[(message::CALLBACK, "https://printer.example.com/ready")])?;

	let response = match sp.read_token_request(&request).await {
		Ok(message) => provider::form_response(&sp.prepare_unauthorized_token(&message).await?),
		Err(e) => provider::problem_response(&e),
	};
	let issued = UnauthorizedTokenResponse::from_parameters(&response.form_parameters())?;

	println!("Issued request token {}.", issued.token);

	// User approval.
	let mut authorize = Url::parse("https://photos.example.net/authorize")?;

	authorize.query_pairs_mut().append_pair(message::TOKEN, issued.token.as_ref());

	let approval = sp.read_authorization_request(&HttpRequest::new(HttpMethod::Get, authorize)).await?;
	let reply = sp.prepare_authorization_response(&approval, "jane", vec!["reader".into()]).await?;

	match reply.redirect_url() {
		Some(url) => println!("Redirect the user agent to {url}."),
		None => println!("Show the verifier to the user."),
	}

	// Access token.
	let verifier = reply.verifier.as_ref().map(|v| v.expose().to_owned()).unwrap_or_default();
	let mut request =
		HttpRequest::new(HttpMethod::Post, Url::parse("https://photos.example.net/access_token")?);

	signer.sign(
		&mut request,
		Some(&TokenCredentials::new(issued.token.clone(), issued.secret.clone())),
		&[(message::VERIFIER, verifier.as_str())],
	)?;

	let exchange = sp.read_access_token_request(&request).await?;
	let access = sp.prepare_access_token(&exchange).await?;

	println!("Issued access token {}.", access.token);

	// Protected resource.
	let mut request = HttpRequest::new(
		HttpMethod::Get,
		Url::parse("https://photos.example.net/photos?file=vacation.jpg&size=original")?,
	);

	signer.sign(&mut request, Some(&TokenCredentials::new(access.token, access.secret)), &[])?;

	let resource = sp.read_protected_resource_request(&request).await?;
	let principal = sp.create_principal(&resource).await?;

	println!("Request acts for {} (reader: {}).", principal.user, principal.is_in_role("reader"));

	// The same signed request cannot be replayed.
	if let Err(e) = sp.read_protected_resource_request(&request).await {
		let problem = provider::problem_response(&e);

		println!("Replay refused with HTTP {}: {}.", problem.status, problem.body);
	}

	Ok(())
}
