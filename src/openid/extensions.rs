//! OpenID extensions carried inside authentication requests and positive assertions.

pub mod ax;
pub mod sreg;

pub use ax::*;
pub use sreg::*;

// self
use crate::{_prelude::*, error::ProtocolError, openid::message::PREFIX};

/// Extension arguments an authentication request carries.
pub trait ExtensionRequest {
	/// Namespace URI declared with `openid.ns.<alias>`.
	const NAMESPACE: &'static str;
	/// Alias used when rendering.
	const DEFAULT_ALIAS: &'static str;

	/// Arguments without the `openid.<alias>.` prefix.
	fn to_args(&self) -> Vec<(String, String)>;
}

/// Extension data read from a positive assertion.
pub trait ExtensionResponse
where
	Self: Sized,
{
	/// Namespace URIs the extension is known under.
	const NAMESPACES: &'static [&'static str];
	/// Alias assumed for OpenID 1.x messages, which do not declare namespaces.
	const DEFAULT_ALIAS: &'static str;

	/// Parses the arguments found under the extension alias.
	fn from_args(args: &BTreeMap<&str, &str>) -> Result<Self, ProtocolError>;
}

/// Appends `request` to an authentication request URL under its default alias.
pub fn append_extension<R>(url: &mut Url, request: &R)
where
	R: ExtensionRequest,
{
	url.query_pairs_mut().extend_pairs(extension_parameters(request));
}

/// `openid.ns.<alias>` followed by the prefixed arguments of `request`.
pub fn extension_parameters<R>(request: &R) -> Vec<(String, String)>
where
	R: ExtensionRequest,
{
	let alias = R::DEFAULT_ALIAS;

	std::iter::once((format!("{PREFIX}ns.{alias}"), R::NAMESPACE.to_owned()))
		.chain(request.to_args().into_iter().map(|(name, value)| (format!("{PREFIX}{alias}.{name}"), value)))
		.collect()
}

fn field_list<'a>(fields: impl IntoIterator<Item = &'a str>) -> Option<String> {
	let joined = fields.into_iter().collect::<Vec<_>>().join(",");

	(!joined.is_empty()).then_some(joined)
}
