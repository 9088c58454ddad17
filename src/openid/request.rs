//! Authentication requests sent to an OpenID Provider through the user agent.

// self
use crate::{
	_prelude::*,
	error::ProtocolError,
	openid::{
		extensions::{ExtensionRequest, extension_parameters},
		message::{NS_V20, PREFIX},
	},
};

/// Identifier asking the OP to let the user pick who they are.
pub const IDENTIFIER_SELECT: &str = "http://specs.openid.net/auth/2.0/identifier_select";

/// Whether the OP may interact with the user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CheckIdMode {
	/// `checkid_setup`: the OP may show pages to the user.
	#[default]
	Setup,
	/// `checkid_immediate`: the OP must answer without user interaction.
	Immediate,
}
impl CheckIdMode {
	/// Wire name.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Setup => "checkid_setup",
			Self::Immediate => "checkid_immediate",
		}
	}
}

/// OpenID 2.0 `checkid_*` request rendered as a redirect to the OP endpoint.
///
/// Without explicit identifiers the request uses [`IDENTIFIER_SELECT`] for both
/// `claimed_id` and `identity`. The realm defaults to `return_to`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticationRequest {
	op_endpoint: Url,
	return_to: Url,
	realm: Option<String>,
	mode: CheckIdMode,
	assoc_handle: Option<String>,
	claimed_id: String,
	local_identifier: String,
	extensions: Vec<(String, String)>,
}
impl AuthenticationRequest {
	/// Starts a `checkid_setup` request for `op_endpoint` that returns to `return_to`.
	pub fn new(op_endpoint: Url, return_to: Url) -> Self {
		Self {
			op_endpoint,
			return_to,
			realm: None,
			mode: CheckIdMode::Setup,
			assoc_handle: None,
			claimed_id: IDENTIFIER_SELECT.into(),
			local_identifier: IDENTIFIER_SELECT.into(),
			extensions: Vec::new(),
		}
	}

	/// Switches to `checkid_immediate`.
	pub fn immediate(mut self) -> Self {
		self.mode = CheckIdMode::Immediate;

		self
	}

	/// Sets the realm the user is asked to trust, e.g. `https://*.example.com/`.
	pub fn realm(mut self, realm: impl Into<String>) -> Self {
		self.realm = Some(realm.into());

		self
	}

	/// Asks the OP to sign the assertion with an existing association.
	pub fn assoc_handle(mut self, handle: impl Into<String>) -> Self {
		self.assoc_handle = Some(handle.into());

		self
	}

	/// Names the identifier being asserted and the OP-local identifier behind it.
	pub fn identifiers(mut self, claimed_id: impl Into<String>, local_identifier: impl Into<String>) -> Self {
		self.claimed_id = claimed_id.into();
		self.local_identifier = local_identifier.into();

		self
	}

	/// Carries an extension request under its default alias.
	pub fn with_extension<R>(mut self, request: &R) -> Self
	where
		R: ExtensionRequest,
	{
		let declaration = format!("{PREFIX}ns.{}", R::DEFAULT_ALIAS);

		if !self.extensions.iter().any(|(name, _)| *name == declaration) {
			self.extensions.extend(extension_parameters(request));
		}

		self
	}

	/// Mode the request will be sent with.
	pub fn mode(&self) -> CheckIdMode {
		self.mode
	}

	/// Builds the URL the user agent is redirected to.
	///
	/// Fails when `return_to` is not covered by the realm.
	pub fn redirect_url(&self) -> Result<Url, ProtocolError> {
		let realm = self.realm.as_deref().unwrap_or(self.return_to.as_str());

		if !realm_covers(realm, &self.return_to)? {
			return Err(ProtocolError::malformed(
				format!("{PREFIX}realm"),
				format!("`{}` is not under `{realm}`", self.return_to),
			));
		}

		let mut url = self.op_endpoint.clone();

		{
			let mut pairs = url.query_pairs_mut();

			pairs
				.append_pair(&format!("{PREFIX}ns"), NS_V20)
				.append_pair(&format!("{PREFIX}mode"), self.mode.as_str())
				.append_pair(&format!("{PREFIX}claimed_id"), &self.claimed_id)
				.append_pair(&format!("{PREFIX}identity"), &self.local_identifier)
				.append_pair(&format!("{PREFIX}return_to"), self.return_to.as_str())
				.append_pair(&format!("{PREFIX}realm"), realm);

			if let Some(handle) = &self.assoc_handle {
				pairs.append_pair(&format!("{PREFIX}assoc_handle"), handle);
			}

			pairs.extend_pairs(&self.extensions);
		}

		Ok(url)
	}
}

/// Whether `return_to` falls under `realm`, honouring a leading `*.` host wildcard.
pub fn realm_covers(realm: &str, return_to: &Url) -> Result<bool, ProtocolError> {
	let malformed = |reason: &str| ProtocolError::malformed(format!("{PREFIX}realm"), reason);
	let (wildcard, literal) = match realm.split_once("://*.") {
		Some((scheme, rest)) => (true, format!("{scheme}://{rest}")),
		None => (false, realm.to_owned()),
	};
	let realm = Url::parse(&literal).map_err(|e| ProtocolError::malformed(format!("{PREFIX}realm"), e))?;

	if realm.fragment().is_some() {
		return Err(malformed("a realm may not carry a fragment"));
	}

	let Some(realm_host) = realm.host_str() else {
		return Err(malformed("a realm needs a host"));
	};
	let Some(host) = return_to.host_str() else {
		return Ok(false);
	};
	let host_matches = host.eq_ignore_ascii_case(realm_host)
		|| (wildcard
			&& host.len() > realm_host.len()
			&& host.to_ascii_lowercase().ends_with(&format!(".{}", realm_host.to_ascii_lowercase())));
	let realm_path = realm.path();
	let path = return_to.path();
	let path_matches = path == realm_path
		|| (path.starts_with(realm_path)
			&& (realm_path.ends_with('/') || path[realm_path.len()..].starts_with('/')));

	Ok(realm.scheme() == return_to.scheme()
		&& realm.port_or_known_default() == return_to.port_or_known_default()
		&& host_matches
		&& path_matches)
}
