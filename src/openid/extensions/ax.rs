//! Attribute Exchange 1.0 fetch messages.

// self
use crate::{
	_prelude::*,
	error::ProtocolError,
	openid::extensions::{ExtensionRequest, ExtensionResponse, field_list},
};

/// Attribute Exchange 1.0 namespace.
pub const AX_NS: &str = "http://openid.net/srv/ax/1.0";

/// One attribute asked for in a [`FetchRequest`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRequest {
	/// Attribute type URI, e.g. `http://axschema.org/contact/email`.
	pub type_uri: String,
	/// Listed under `required` instead of `if_available`.
	pub required: bool,
	/// Maximum number of values; `None` asks for all of them.
	pub count: Option<u32>,
}
impl AttributeRequest {
	/// Single-valued optional attribute.
	pub fn optional(type_uri: impl Into<String>) -> Self {
		Self { type_uri: type_uri.into(), required: false, count: Some(1) }
	}

	/// Single-valued required attribute.
	pub fn required(type_uri: impl Into<String>) -> Self {
		Self { type_uri: type_uri.into(), required: true, count: Some(1) }
	}

	/// Overrides the value count.
	pub fn with_count(mut self, count: Option<u32>) -> Self {
		self.count = count;

		self
	}
}

/// `fetch_request` message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
	/// Requested attributes; aliases `a1`, `a2`, … follow this order.
	pub attributes: Vec<AttributeRequest>,
	/// Where the provider may push later updates.
	pub update_url: Option<Url>,
}
impl FetchRequest {
	/// Adds an attribute.
	pub fn with(mut self, attribute: AttributeRequest) -> Self {
		self.attributes.push(attribute);

		self
	}

	fn aliases(&self) -> impl Iterator<Item = (String, &AttributeRequest)> {
		self.attributes.iter().enumerate().map(|(i, attribute)| (format!("a{}", i + 1), attribute))
	}
}
impl ExtensionRequest for FetchRequest {
	const DEFAULT_ALIAS: &'static str = "ax";
	const NAMESPACE: &'static str = AX_NS;

	fn to_args(&self) -> Vec<(String, String)> {
		let mut args = vec![("mode".to_owned(), "fetch_request".to_owned())];
		let mut required = Vec::new();
		let mut if_available = Vec::new();

		for (alias, attribute) in self.aliases() {
			args.push((format!("type.{alias}"), attribute.type_uri.clone()));

			match attribute.count {
				Some(1) => (),
				Some(count) => args.push((format!("count.{alias}"), count.to_string())),
				None => args.push((format!("count.{alias}"), "unlimited".to_owned())),
			}

			if attribute.required {
				required.push(alias);
			} else {
				if_available.push(alias);
			}
		}

		if let Some(list) = field_list(required.iter().map(String::as_str)) {
			args.push(("required".into(), list));
		}
		if let Some(list) = field_list(if_available.iter().map(String::as_str)) {
			args.push(("if_available".into(), list));
		}
		if let Some(update_url) = &self.update_url {
			args.push(("update_url".into(), update_url.to_string()));
		}

		args
	}
}

/// Values released for one attribute type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValues {
	/// Attribute type URI.
	pub type_uri: String,
	/// Released values, possibly none.
	pub values: Vec<String>,
}

/// `fetch_response` message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
	/// Attributes in alias order.
	pub attributes: Vec<AttributeValues>,
	/// Echoed `update_url`.
	pub update_url: Option<String>,
}
impl FetchResponse {
	/// Every value released for `type_uri`.
	pub fn get(&self, type_uri: &str) -> Option<&[String]> {
		self.attributes
			.iter()
			.find(|attribute| attribute.type_uri == type_uri)
			.map(|attribute| attribute.values.as_slice())
	}

	/// First value released for `type_uri`.
	pub fn first_value(&self, type_uri: &str) -> Option<&str> {
		self.get(type_uri)?.first().map(String::as_str)
	}
}
impl ExtensionResponse for FetchResponse {
	const DEFAULT_ALIAS: &'static str = "ax";
	const NAMESPACES: &'static [&'static str] = &[AX_NS];

	fn from_args(args: &BTreeMap<&str, &str>) -> Result<Self, ProtocolError> {
		match args.get("mode").copied() {
			Some("fetch_response") => (),
			Some(other) =>
				return Err(ProtocolError::malformed("ax.mode", format!("`{other}` is not fetch_response"))),
			None => return Err(ProtocolError::missing("ax.mode")),
		}

		let mut attributes = Vec::new();

		for (name, type_uri) in args {
			let Some(alias) = name.strip_prefix("type.") else {
				continue;
			};
			let values = match args.get(format!("count.{alias}").as_str()) {
				Some(count) => {
					let count = count.parse::<u32>().map_err(|e| {
						ProtocolError::malformed(format!("ax.count.{alias}"), e)
					})?;

					(1..=count)
						.map(|n| {
							let name = format!("value.{alias}.{n}");

							args.get(name.as_str())
								.map(|value| (*value).to_owned())
								.ok_or_else(|| ProtocolError::missing(format!("ax.{name}")))
						})
						.collect::<Result<Vec<_>, _>>()?
				},
				None => args
					.get(format!("value.{alias}").as_str())
					.map(|value| vec![(*value).to_owned()])
					.unwrap_or_default(),
			};

			attributes.push(AttributeValues { type_uri: (*type_uri).to_owned(), values });
		}

		Ok(Self { attributes, update_url: args.get("update_url").map(|url| (*url).to_owned()) })
	}
}
