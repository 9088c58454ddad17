//! `openid.*` parameters carried through the user agent.

// self
use crate::{_prelude::*, error::ProtocolError};

/// Prefix shared by every OpenID parameter.
pub const PREFIX: &str = "openid.";
/// `openid.ns` value of OpenID Authentication 2.0 messages.
pub const NS_V20: &str = "http://specs.openid.net/auth/2.0";

const NS_V1X: [&str; 2] = ["http://openid.net/signon/1.0", "http://openid.net/signon/1.1"];

/// Protocol generation of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OpenIdVersion {
	/// OpenID 1.0 or 1.1 (no `openid.ns`).
	V1x,
	/// OpenID Authentication 2.0.
	V20,
}

/// Indirect message with the `openid.` prefix stripped from its field names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndirectMessage {
	fields: BTreeMap<String, String>,
	version: OpenIdVersion,
}
impl IndirectMessage {
	/// Reads the `openid.*` query parameters of `url`; other parameters are ignored.
	pub fn from_url(url: &Url) -> Result<Self, ProtocolError> {
		Self::from_pairs(url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())))
	}

	/// Builds a message from decoded name/value pairs.
	pub fn from_pairs(
		pairs: impl IntoIterator<Item = (String, String)>,
	) -> Result<Self, ProtocolError> {
		let mut fields = BTreeMap::new();

		for (name, value) in pairs {
			let Some(field) = name.strip_prefix(PREFIX) else {
				continue;
			};

			if fields.insert(field.to_owned(), value).is_some() {
				return Err(ProtocolError::DuplicateParameter { name });
			}
		}

		let version = match fields.get("ns").map(String::as_str) {
			Some(NS_V20) => OpenIdVersion::V20,
			None => OpenIdVersion::V1x,
			Some(ns) if NS_V1X.contains(&ns) => OpenIdVersion::V1x,
			Some(ns) => {
				return Err(ProtocolError::malformed(
					format!("{PREFIX}ns"),
					format!("unknown namespace `{ns}`"),
				));
			},
		};

		Ok(Self { fields, version })
	}

	/// Protocol generation derived from `openid.ns`.
	pub fn version(&self) -> OpenIdVersion {
		self.version
	}

	/// Value of `openid.<name>`.
	pub fn get(&self, name: &str) -> Option<&str> {
		self.fields.get(name).map(String::as_str)
	}

	/// Value of `openid.<name>`, or [`ProtocolError::MissingParameter`].
	pub fn required(&self, name: &str) -> Result<&str, ProtocolError> {
		self.get(name)
			.filter(|value| !value.is_empty())
			.ok_or_else(|| ProtocolError::missing(format!("{PREFIX}{name}")))
	}

	/// `openid.mode`.
	pub fn mode(&self) -> Result<&str, ProtocolError> {
		self.required("mode")
	}

	/// Field names listed in `openid.signed`, in order.
	pub fn signed_fields(&self) -> Vec<&str> {
		self.get("signed")
			.map(|signed| signed.split(',').map(str::trim).filter(|f| !f.is_empty()).collect())
			.unwrap_or_default()
	}

	/// Whether `name` is covered by `openid.signed`.
	pub fn is_signed(&self, name: &str) -> bool {
		self.signed_fields().contains(&name)
	}

	/// Alias declared for an extension whose namespace is one of `namespaces`.
	///
	/// OpenID 1.x messages carry no `openid.ns.<alias>` declarations, so `default_alias` is used
	/// when it has arguments.
	pub fn extension_alias<'a>(
		&'a self,
		namespaces: &[&str],
		default_alias: &'a str,
	) -> Option<&'a str> {
		let declared = self.fields.iter().find_map(|(name, value)| {
			let alias = name.strip_prefix("ns.")?;

			namespaces.contains(&value.as_str()).then_some(alias)
		});

		declared.or_else(|| {
			let prefix = format!("{default_alias}.");

			(self.version == OpenIdVersion::V1x
				&& self.fields.keys().any(|name| name.starts_with(&prefix)))
			.then_some(default_alias)
		})
	}

	/// Arguments under `openid.<alias>.`, keyed by the remainder of the name.
	pub fn extension_args(&self, alias: &str) -> BTreeMap<&str, &str> {
		let prefix = format!("{alias}.");

		self.fields
			.iter()
			.filter_map(|(name, value)| {
				name.strip_prefix(prefix.as_str()).map(|rest| (rest, value.as_str()))
			})
			.collect()
	}

	/// Every field with its `openid.` prefix restored.
	pub fn to_parameters(&self) -> Vec<(String, String)> {
		self.fields.iter().map(|(name, value)| (format!("{PREFIX}{name}"), value.clone())).collect()
	}
}
