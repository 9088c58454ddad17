//! Runs the consumer side of the three-legged flow against a mocked service provider: obtain a
//! request token, follow the callback, exchange it, and call a protected resource.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use url::Url;
// self
use oauth1_kit::{
	auth::ConsumerKey,
	consumer::{ConsumerCredentials, ReqwestConsumer, ServiceProviderDescription},
	http::ReqwestHttpClient,
	message::HttpMethod,
	reqwest::{Client, redirect::Policy},
	store::{MemoryStore, TokenStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let request_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/request_token");
			then.status(200).body(
				"oauth_token=hh5s93j4hdidpola&oauth_token_secret=hdhd0244k9j7ao03&oauth_callback_confirmed=true",
			);
		})
		.await;
	let access_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/access_token").header_exists("authorization");
			then.status(200).body("oauth_token=nnch734d00sl2jdk&oauth_token_secret=pfkkdhi9sl3r4s00");
		})
		.await;
	let photos_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/photos").query_param("size", "original");
			then.status(200).body("<jpeg bytes>");
		})
		.await;
	let description = ServiceProviderDescription::builder()
		.request_token_endpoint(Url::parse(&server.url("/request_token"))?)
		.user_authorization_endpoint(Url::parse(&server.url("/authorize"))?)
		.access_token_endpoint(Url::parse(&server.url("/access_token"))?)
		.allow_insecure(true)
		.build()?;
	let tokens: Arc<dyn TokenStore> = Arc::new(MemoryStore::default());
	let credentials =
		ConsumerCredentials::new(ConsumerKey::new("dpf43f3p2l4k3l03")?, "kd94hf93k423kf44");
	let http_client = ReqwestHttpClient::with_client(
		Client::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.redirect(Policy::none())
			.build()?,
	);
	let consumer = ReqwestConsumer::with_http_client(description, credentials, tokens, http_client);
	let session = consumer
		.request_user_authorization(Some(Url::parse("https://printer.example.com/ready")?), &[])
		.await?;

	println!("Send your user to {}.", session.authorization_url);

	// The provider redirects the user agent back with the token and a verifier.
	let mut callback = Url::parse("https://printer.example.com/ready")?;

	callback
		.query_pairs_mut()
		.append_pair("oauth_token", session.request_token.as_ref())
		.append_pair("oauth_verifier", "hfdp7dh39dks9884");

	let access = consumer.process_user_authorization(&callback).await?;

	println!("Access token {} issued.", access.token);

	let response = consumer
		.call_protected_resource(
			HttpMethod::Get,
			Url::parse(&server.url("/photos?file=vacation.jpg&size=original"))?,
			&access.token,
			&[],
		)
		.await?;

	println!("Protected resource answered {} with {} bytes.", response.status, response.body.len());

	request_mock.assert_async().await;
	access_mock.assert_async().await;
	photos_mock.assert_async().await;

	Ok(())
}
