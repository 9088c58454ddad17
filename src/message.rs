//! HTTP-stack neutral requests/responses and the OAuth parameter collections built from them.
//!
//! [`HttpRequest`] is what a service provider reads and what a consumer produces. Parameters are
//! gathered from the `Authorization: OAuth` header, a form-encoded body, and the query string,
//! keeping track of where each one came from because the header `realm` is excluded from
//! signing while a query or body `realm` is not.

pub mod encoding;
pub mod kinds;
pub mod params;

pub use encoding::*;
pub use kinds::*;
pub use params::*;

// std
use std::slice::Iter;
// crates.io
use time::format_description::well_known::Rfc2822;
// self
use crate::{
	_prelude::*,
	clock::{Clock, SystemClock},
	error::ProtocolError,
};

/// Media type of form-encoded bodies.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// OAuth protocol revision spoken by a consumer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProtocolVersion {
	/// OAuth Core 1.0 (no verifier, callback supplied at authorization time).
	#[serde(rename = "1.0")]
	V10,
	/// OAuth Core 1.0 Revision A (callback at request token time, verifier required).
	#[serde(rename = "1.0a")]
	V10a,
}
impl Display for ProtocolVersion {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(match self {
			Self::V10 => "1.0",
			Self::V10a => "1.0a",
		})
	}
}

/// HTTP method of a signed request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
	/// `GET`
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `DELETE`
	Delete,
	/// `PATCH`
	Patch,
	/// `HEAD`
	Head,
}
impl HttpMethod {
	/// Uppercase method name as used in the signature base string.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Get => "GET",
			Self::Post => "POST",
			Self::Put => "PUT",
			Self::Delete => "DELETE",
			Self::Patch => "PATCH",
			Self::Head => "HEAD",
		}
	}

	/// Methods that may carry a form-encoded entity body.
	pub fn allows_body(self) -> bool {
		matches!(self, Self::Post | Self::Put | Self::Patch)
	}
}
impl Display for HttpMethod {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for HttpMethod {
	type Err = ProtocolError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_uppercase().as_str() {
			"GET" => Ok(Self::Get),
			"POST" => Ok(Self::Post),
			"PUT" => Ok(Self::Put),
			"DELETE" => Ok(Self::Delete),
			"PATCH" => Ok(Self::Patch),
			"HEAD" => Ok(Self::Head),
			other => Err(ProtocolError::MalformedMessage {
				reason: format!("HTTP method `{other}` is not supported"),
			}),
		}
	}
}

/// Where a parameter was read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParameterSource {
	/// `Authorization: OAuth ...` header.
	AuthorizationHeader,
	/// `application/x-www-form-urlencoded` entity body.
	Body,
	/// Request URL query string.
	Query,
}

/// Single decoded parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Parameter {
	/// Decoded name.
	pub name: String,
	/// Decoded value.
	pub value: String,
	/// Origin of the parameter; `None` for locally built parameters.
	pub source: Option<ParameterSource>,
}

/// Ordered multimap of decoded parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Parameters(Vec<Parameter>);
impl Parameters {
	/// Creates an empty collection.
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends a parameter read from `source`.
	pub fn push_from(
		&mut self,
		name: impl Into<String>,
		value: impl Into<String>,
		source: ParameterSource,
	) {
		self.0.push(Parameter { name: name.into(), value: value.into(), source: Some(source) });
	}

	/// Appends a locally built parameter, keeping any existing values for `name`.
	pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
		self.0.push(Parameter { name: name.into(), value: value.into(), source: None });
	}

	/// Replaces every value of `name` with `value`.
	pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
		let name = name.into();

		self.remove(&name);
		self.push(name, value);
	}

	/// Builder-style [`Parameters::insert`].
	pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.insert(name, value);

		self
	}

	/// Removes every value of `name`, returning the first one.
	pub fn remove(&mut self, name: &str) -> Option<String> {
		let mut first = None;

		self.0.retain(|param| {
			if param.name != name {
				return true;
			}
			if first.is_none() {
				first = Some(param.value.clone());
			}

			false
		});

		first
	}

	/// First value of `name`.
	pub fn get(&self, name: &str) -> Option<&str> {
		self.0.iter().find(|param| param.name == name).map(|param| param.value.as_str())
	}

	/// Every value of `name` in insertion order.
	pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
		self.0.iter().filter(move |param| param.name == name).map(|param| param.value.as_str())
	}

	/// Number of values recorded for `name`.
	pub fn count(&self, name: &str) -> usize {
		self.get_all(name).count()
	}

	/// Returns `true` if `name` is present.
	pub fn contains(&self, name: &str) -> bool {
		self.0.iter().any(|param| param.name == name)
	}

	/// Iterates over every parameter.
	pub fn iter(&self) -> Iter<'_, Parameter> {
		self.0.iter()
	}

	/// Iterates over `(name, value)` pairs.
	pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
		self.0.iter().map(|param| (param.name.as_str(), param.value.as_str()))
	}

	/// Number of parameters (counting repeats).
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` when no parameters are present.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Parameters that are not part of the OAuth protocol (`oauth_*`).
	pub fn extra(&self) -> Vec<(String, String)> {
		self.pairs()
			.filter(|(name, _)| !is_protocol_parameter(name))
			.map(|(name, value)| (name.to_owned(), value.to_owned()))
			.collect()
	}

	/// Renders the collection as an `application/x-www-form-urlencoded` string.
	pub fn to_form(&self) -> String {
		encoding::to_form(self.pairs())
	}

	/// Parses an `application/x-www-form-urlencoded` string.
	pub fn from_form(input: &str, source: Option<ParameterSource>) -> Self {
		Self(
			encoding::parse_form(input)
				.into_iter()
				.map(|(name, value)| Parameter { name, value, source })
				.collect(),
		)
	}
}
impl<K, V> FromIterator<(K, V)> for Parameters
where
	K: Into<String>,
	V: Into<String>,
{
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		let mut params = Self::new();

		iter.into_iter().for_each(|(name, value)| params.push(name, value));

		params
	}
}
impl<K, V> Extend<(K, V)> for Parameters
where
	K: Into<String>,
	V: Into<String>,
{
	fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
		iter.into_iter().for_each(|(name, value)| self.push(name, value));
	}
}
impl<'a> IntoIterator for &'a Parameters {
	type IntoIter = Iter<'a, Parameter>;
	type Item = &'a Parameter;

	fn into_iter(self) -> Self::IntoIter {
		self.0.iter()
	}
}

/// HTTP request view consumed by the service provider and produced by the consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpRequest {
	/// Request method.
	pub method: HttpMethod,
	/// Absolute request URL including the query string.
	pub url: Url,
	/// Header name/value pairs; names compare case-insensitively.
	pub headers: Vec<(String, String)>,
	/// Raw entity body, if any.
	pub body: Option<String>,
}
impl HttpRequest {
	/// Creates a request without headers or body.
	pub fn new(method: HttpMethod, url: Url) -> Self {
		Self { method, url, headers: Vec::new(), body: None }
	}

	/// Appends a header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Sets a form-encoded body and the matching content type.
	pub fn with_form_body<'a>(mut self, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
		self.set_header("Content-Type", FORM_CONTENT_TYPE);
		self.body = Some(encoding::to_form(pairs));

		self
	}

	/// Replaces every header named `name` (case-insensitive) with a single value.
	pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
		self.headers.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
		self.headers.push((name.to_owned(), value.into()));
	}

	/// First header named `name` (case-insensitive).
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}

	/// Returns `true` when the body is `application/x-www-form-urlencoded`.
	pub fn has_form_body(&self) -> bool {
		self.body.is_some()
			&& self.header("Content-Type").is_some_and(|value| {
				value
					.split(';')
					.next()
					.is_some_and(|mime| mime.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
			})
	}

	/// Gathers parameters from the Authorization header, form body, and query string.
	pub fn parameters(&self) -> Result<Parameters, ProtocolError> {
		let mut params = Parameters::new();

		for (name, value) in &self.headers {
			if !name.eq_ignore_ascii_case("Authorization") {
				continue;
			}
			if let Some(parsed) = encoding::parse_authorization_header(value) {
				for (name, value) in parsed? {
					params.push_from(name, value, ParameterSource::AuthorizationHeader);
				}
			}
		}
		if let (true, Some(body)) = (self.has_form_body(), &self.body) {
			for (name, value) in encoding::parse_form(body) {
				params.push_from(name, value, ParameterSource::Body);
			}
		}
		for (name, value) in self.url.query_pairs() {
			params.push_from(name, value, ParameterSource::Query);
		}

		Ok(params)
	}
}

/// HTTP response produced by the service provider or received by the consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
	/// Status code.
	pub status: u16,
	/// Header name/value pairs.
	pub headers: Vec<(String, String)>,
	/// Entity body.
	pub body: String,
}
impl HttpResponse {
	/// Builds a form-encoded response.
	pub fn form(status: u16, params: &Parameters) -> Self {
		Self {
			status,
			headers: vec![("Content-Type".into(), FORM_CONTENT_TYPE.into())],
			body: params.to_form(),
		}
	}

	/// Builds a `302 Found` redirect.
	pub fn redirect(location: &Url) -> Self {
		Self {
			status: 302,
			headers: vec![("Location".into(), location.to_string())],
			body: String::new(),
		}
	}

	/// First header named `name` (case-insensitive).
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Parses the body as form-encoded parameters.
	pub fn form_parameters(&self) -> Parameters {
		Parameters::from_form(&self.body, Some(ParameterSource::Body))
	}

	/// `Retry-After` hint as a relative duration (delta-seconds or HTTP date).
	pub fn retry_after(&self) -> Option<Duration> {
		parse_retry_after(self.header("Retry-After")?, SystemClock.now())
	}
}

/// Returns `true` for parameters reserved by the protocol.
pub fn is_protocol_parameter(name: &str) -> bool {
	name.starts_with("oauth_")
}

fn parse_retry_after(raw: &str, now: OffsetDateTime) -> Option<Duration> {
	let raw = raw.trim();

	if let Ok(secs) = raw.parse::<u32>() {
		return Some(Duration::seconds(secs.into()));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - now;

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}
