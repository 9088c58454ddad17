//! Simple Registration (`sreg`) 1.0/1.1.

// self
use crate::{
	_prelude::*,
	error::ProtocolError,
	openid::extensions::{ExtensionRequest, ExtensionResponse, field_list},
};

/// Simple Registration 1.1 namespace.
pub const SREG_NS_11: &str = "http://openid.net/extensions/sreg/1.1";
/// Simple Registration 1.0 namespace.
pub const SREG_NS_10: &str = "http://openid.net/sreg/1.0";

const FIELDS: [&str; 9] =
	["nickname", "email", "fullname", "dob", "gender", "postcode", "country", "language", "timezone"];

/// How badly the relying party wants a field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandLevel {
	/// Not asked for.
	#[default]
	NoRequest,
	/// Listed under `optional`.
	Request,
	/// Listed under `required`.
	Require,
}

/// Fields requested from the provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsRequest {
	/// `nickname`
	pub nickname: DemandLevel,
	/// `email`
	pub email: DemandLevel,
	/// `fullname`
	pub full_name: DemandLevel,
	/// `dob`
	pub birth_date: DemandLevel,
	/// `gender`
	pub gender: DemandLevel,
	/// `postcode`
	pub postal_code: DemandLevel,
	/// `country`
	pub country: DemandLevel,
	/// `language`
	pub language: DemandLevel,
	/// `timezone`
	pub time_zone: DemandLevel,
	/// Page describing how the data will be used.
	pub policy_url: Option<Url>,
}
impl ClaimsRequest {
	fn levels(&self) -> [(&'static str, DemandLevel); 9] {
		let levels = [
			self.nickname,
			self.email,
			self.full_name,
			self.birth_date,
			self.gender,
			self.postal_code,
			self.country,
			self.language,
			self.time_zone,
		];

		std::array::from_fn(|i| (FIELDS[i], levels[i]))
	}

	fn fields_at(&self, level: DemandLevel) -> Option<String> {
		field_list(self.levels().into_iter().filter(|(_, l)| *l == level).map(|(name, _)| name))
	}
}
impl ExtensionRequest for ClaimsRequest {
	const DEFAULT_ALIAS: &'static str = "sreg";
	const NAMESPACE: &'static str = SREG_NS_11;

	fn to_args(&self) -> Vec<(String, String)> {
		let mut args = Vec::new();

		if let Some(required) = self.fields_at(DemandLevel::Require) {
			args.push(("required".into(), required));
		}
		if let Some(optional) = self.fields_at(DemandLevel::Request) {
			args.push(("optional".into(), optional));
		}
		if let Some(policy_url) = &self.policy_url {
			args.push(("policy_url".into(), policy_url.to_string()));
		}

		args
	}
}

/// `gender` values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
	/// `M`
	Male,
	/// `F`
	Female,
}

/// Fields released by the provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsResponse {
	/// `nickname`
	pub nickname: Option<String>,
	/// `email`
	pub email: Option<String>,
	/// `fullname`
	pub full_name: Option<String>,
	/// `dob` as sent (`YYYY-MM-DD`, unknown parts zeroed).
	pub birth_date: Option<String>,
	/// `gender`
	pub gender: Option<Gender>,
	/// `postcode`
	pub postal_code: Option<String>,
	/// `country`
	pub country: Option<String>,
	/// `language`
	pub language: Option<String>,
	/// `timezone`
	pub time_zone: Option<String>,
}
impl ExtensionResponse for ClaimsResponse {
	const DEFAULT_ALIAS: &'static str = "sreg";
	const NAMESPACES: &'static [&'static str] = &[SREG_NS_11, SREG_NS_10];

	fn from_args(args: &BTreeMap<&str, &str>) -> Result<Self, ProtocolError> {
		let text = |name: &str| args.get(name).filter(|v| !v.is_empty()).map(|v| (*v).to_owned());
		let gender = match args.get("gender").copied() {
			None | Some("") => None,
			Some("M") => Some(Gender::Male),
			Some("F") => Some(Gender::Female),
			Some(other) =>
				return Err(ProtocolError::malformed("sreg.gender", format!("`{other}` is not M or F"))),
		};

		Ok(Self {
			nickname: text("nickname"),
			email: text("email"),
			full_name: text("fullname"),
			birth_date: text("dob"),
			gender,
			postal_code: text("postcode"),
			country: text("country"),
			language: text("language"),
			time_zone: text("timezone"),
		})
	}
}
