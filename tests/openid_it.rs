#![cfg(feature = "reqwest")]

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use time::{Duration, OffsetDateTime, format_description::well_known::Rfc3339};
use url::Url;
// self
use oauth1_kit::{
	error::ProtocolError,
	http::ReqwestHttpClient,
	openid::{
		Association, AssociationStore, AssociationType, AttributeRequest, AuthenticationRequest,
		ClaimsRequest, DemandLevel, FetchRequest, FetchResponse, IndirectMessage,
		MemoryAssociationStore, NS_V20, RelyingParty, RelyingPartySettings, append_extension,
	},
	store::MemoryNonceStore,
};

/// Accepts the self-signed certificate `httpmock` serves.
fn mock_http_client() -> Arc<ReqwestHttpClient> {
	let client = reqwest::Client::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.build()
		.expect("Insecure reqwest client for mock servers should build.");

	Arc::new(ReqwestHttpClient::with_client(client))
}

const RETURN_TO: &str = "https://rp.example.com/login/return";
const EMAIL: &str = "http://axschema.org/contact/email";

fn fresh_nonce() -> String {
	let now = OffsetDateTime::now_utc()
		.replace_nanosecond(0)
		.expect("Zero nanoseconds should always be valid.");

	format!("{}0001", now.format(&Rfc3339).expect("Timestamp should format."))
}

fn assertion_url(op_endpoint: &str, handle: &str) -> Url {
	let nonce = fresh_nonce();
	let mut url = Url::parse(RETURN_TO).expect("Return URL should parse.");

	url.query_pairs_mut()
		.append_pair("openid.ns", NS_V20)
		.append_pair("openid.mode", "id_res")
		.append_pair("openid.op_endpoint", op_endpoint)
		.append_pair("openid.claimed_id", "https://jane.example.com/")
		.append_pair("openid.identity", "https://jane.example.com/")
		.append_pair("openid.return_to", RETURN_TO)
		.append_pair("openid.response_nonce", &nonce)
		.append_pair("openid.assoc_handle", handle)
		.append_pair("openid.ns.ax", "http://openid.net/srv/ax/1.0")
		.append_pair("openid.ax.mode", "fetch_response")
		.append_pair("openid.ax.type.email", EMAIL)
		.append_pair("openid.ax.value.email", "jane@example.com")
		.append_pair(
			"openid.signed",
			"op_endpoint,claimed_id,identity,return_to,response_nonce,assoc_handle,ns.ax,ax.mode,ax.type.email,ax.value.email",
		)
		.append_pair("openid.sig", "dGhlIE9QIGtub3dzIGJlc3Q=");

	url
}

fn relying_party(associations: Arc<MemoryAssociationStore>) -> RelyingParty {
	let settings = RelyingPartySettings { require_signed_extensions: true, ..Default::default() };

	RelyingParty::new(
		settings.clone(),
		associations,
		Arc::new(MemoryNonceStore::new(settings.nonce_window())),
	)
	.expect("Relying party should build.")
}

#[tokio::test]
async fn unknown_associations_fall_back_to_direct_verification() {
	let server = MockServer::start_async().await;
	let op_endpoint = server.url("/server");
	let op = Url::parse(&op_endpoint).expect("OP endpoint should parse.");
	let associations = Arc::new(MemoryAssociationStore::default());

	associations
		.store(
			&op,
			Association::new(
				"stale",
				AssociationType::HmacSha1,
				vec![1; 20],
				OffsetDateTime::now_utc(),
				Duration::hours(1),
			)
			.expect("Association should be valid."),
		)
		.await
		.expect("Association should be stored.");

	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/server")
				.form_urlencoded_tuple("openid.mode", "check_authentication")
				.form_urlencoded_tuple("openid.assoc_handle", "{HMAC-SHA1}{unknown}");
			then.status(200).body("ns:http://specs.openid.net/auth/2.0\nis_valid:true\ninvalidate_handle:stale\n");
		})
		.await;
	let rp = relying_party(associations.clone())
		.with_http_client(mock_http_client());
	let url = assertion_url(&op_endpoint, "{HMAC-SHA1}{unknown}");
	let assertion = rp.verify_assertion(&url).await.expect("OP should vouch for the assertion.");

	mock.assert_async().await;
	assert_eq!(assertion.claimed_id.as_deref(), Some("https://jane.example.com/"));
	assert!(
		associations.get(&op, "stale").await.expect("Lookup should succeed.").is_none(),
		"Invalidated handles should be forgotten."
	);

	let ax = assertion
		.extension::<FetchResponse>()
		.expect("Attribute exchange response should parse.")
		.expect("Signed attributes should be present.");

	assert_eq!(ax.first_value(EMAIL), Some("jane@example.com"));

	let replay = rp.verify_assertion(&url).await.expect_err("Replays should be rejected.");

	assert_eq!(replay.as_protocol(), Some(&ProtocolError::ReplayedNonce));
}

#[tokio::test]
async fn op_refusal_and_missing_transport_reject_the_assertion() {
	let server = MockServer::start_async().await;
	let op_endpoint = server.url("/server");

	server
		.mock_async(|when, then| {
			when.method(POST).path("/server");
			then.status(200).body("is_valid:false\n");
		})
		.await;

	let rp = relying_party(Arc::new(MemoryAssociationStore::default()))
		.with_http_client(mock_http_client());
	let err = rp
		.verify_assertion(&assertion_url(&op_endpoint, "h1"))
		.await
		.expect_err("Refused assertions should fail.");

	assert_eq!(err.as_protocol(), Some(&ProtocolError::InvalidSignature));

	let offline = relying_party(Arc::new(MemoryAssociationStore::default()));
	let err = offline
		.verify_assertion(&assertion_url(&op_endpoint, "h2"))
		.await
		.expect_err("Without a usable association or transport the signature cannot be trusted.");

	assert_eq!(err.as_protocol(), Some(&ProtocolError::InvalidSignature));
}

#[test]
fn authentication_requests_carry_extension_arguments() {
	let mut url = Url::parse("https://op.example.com/server?openid.mode=checkid_setup")
		.expect("Authentication URL should parse.");

	append_extension(&mut url, &ClaimsRequest {
		email: DemandLevel::Require,
		nickname: DemandLevel::Request,
		..Default::default()
	});
	append_extension(
		&mut url,
		&FetchRequest::default().with(AttributeRequest::required(EMAIL)),
	);

	let pairs = url.query_pairs().into_owned().collect::<Vec<_>>();
	let get = |name: &str| {
		pairs.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
	};

	assert_eq!(get("openid.ns.sreg"), Some("http://openid.net/extensions/sreg/1.1"));
	assert_eq!(get("openid.sreg.required"), Some("email"));
	assert_eq!(get("openid.sreg.optional"), Some("nickname"));
	assert_eq!(get("openid.ax.mode"), Some("fetch_request"));
	assert_eq!(get("openid.ax.type.a1"), Some(EMAIL));
	assert_eq!(get("openid.ax.required"), Some("a1"));
}

#[tokio::test]
async fn negotiated_associations_sign_later_requests() {
	let server = MockServer::start_async().await;
	let op = Url::parse(&server.url("/server")).expect("OP endpoint should parse.");
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/server")
				.form_urlencoded_tuple("openid.ns", NS_V20)
				.form_urlencoded_tuple("openid.mode", "associate")
				.form_urlencoded_tuple("openid.assoc_type", "HMAC-SHA256")
				.form_urlencoded_tuple("openid.session_type", "no-encryption");
			then.status(200).body(
				"ns:http://specs.openid.net/auth/2.0\nassoc_handle:{HMAC-SHA256}{77}\nassoc_type:HMAC-SHA256\nsession_type:no-encryption\nexpires_in:1209600\nmac_key:CQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQk=\n",
			);
		})
		.await;
	let associations = Arc::new(MemoryAssociationStore::default());
	let rp = relying_party(associations.clone()).with_http_client(mock_http_client());
	let association =
		rp.associate(&op, AssociationType::HmacSha256).await.expect("Association should be negotiated.");

	mock.assert_async().await;
	assert_eq!(association.handle, "{HMAC-SHA256}{77}");
	assert_eq!(association.lifetime, Duration::days(14));
	assert_eq!(
		associations.get(&op, &association.handle).await.expect("Lookup should succeed."),
		Some(association.clone())
	);

	let redirect = AuthenticationRequest::new(op.clone(), Url::parse(RETURN_TO).expect("Return URL should parse."))
		.realm("https://rp.example.com/")
		.assoc_handle(association.handle.clone())
		.with_extension(&FetchRequest::default().with(AttributeRequest::required(EMAIL)))
		.redirect_url()
		.expect("Authentication request should render.");
	let message = IndirectMessage::from_url(&redirect).expect("Redirect should parse.");

	assert!(redirect.as_str().starts_with(op.as_str()));
	assert_eq!(message.mode(), Ok("checkid_setup"));
	assert_eq!(message.get("assoc_handle"), Some("{HMAC-SHA256}{77}"));
	assert_eq!(message.get("return_to"), Some(RETURN_TO));
	assert_eq!(message.extension_args("ax").get("type.a1"), Some(&EMAIL));
}

#[tokio::test]
async fn refused_associations_surface_the_op_error() {
	let server = MockServer::start_async().await;
	let op = Url::parse(&server.url("/server")).expect("OP endpoint should parse.");

	server
		.mock_async(|when, then| {
			when.method(POST).path("/server").form_urlencoded_tuple("openid.mode", "associate");
			then.status(400).body("ns:http://specs.openid.net/auth/2.0\nerror:associations are disabled\n");
		})
		.await;

	let associations = Arc::new(MemoryAssociationStore::default());
	let rp = relying_party(associations.clone()).with_http_client(mock_http_client());
	let err = rp
		.associate(&op, AssociationType::HmacSha1)
		.await
		.expect_err("Refused associations should fail.");

	assert!(err.to_string().contains("associations are disabled"));
	assert!(associations.get(&op, "anything").await.expect("Lookup should succeed.").is_none());
}
