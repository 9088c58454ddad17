//! Request token handshake state carried between the authorization redirect and the callback.

// self
use crate::{
	_prelude::*,
	auth::TokenKey,
	message::{self, ProtocolVersion},
};

/// Returned by [`Consumer::request_user_authorization`](crate::consumer::Consumer::request_user_authorization).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationSession {
	/// Unauthorized request token; its secret stays in the token store.
	pub request_token: TokenKey,
	/// URL the user agent should be sent to.
	pub authorization_url: Url,
	/// Callback registered for this token, `None` for out-of-band.
	pub callback: Option<Url>,
	/// Whether the provider acknowledged the callback (1.0a).
	pub callback_confirmed: bool,
	/// Protocol revision used for the handshake.
	pub version: ProtocolVersion,
	/// When the request token was obtained.
	pub issued_at: OffsetDateTime,
}
impl AuthorizationSession {
	/// Whether the user has to copy the verifier by hand.
	pub fn is_out_of_band(&self) -> bool {
		self.callback.is_none()
	}

	/// Whether `callback_url` carries this session's request token.
	pub fn matches_callback(&self, callback_url: &Url) -> bool {
		callback_url
			.query_pairs()
			.any(|(name, value)| name == message::TOKEN && value == self.request_token.as_ref())
	}
}
