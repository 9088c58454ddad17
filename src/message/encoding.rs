//! RFC 3986 parameter encoding, form bodies, and the `Authorization: OAuth` header.

// crates.io
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
// self
use crate::{_prelude::*, error::ProtocolError};

/// Everything except the RFC 3986 unreserved set (`ALPHA / DIGIT / "-" / "." / "_" / "~"`).
const RESERVED: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');
const AUTHORIZATION_SCHEME: &str = "OAuth";

/// Percent-encodes `value` per RFC 5849 section 3.6 (uppercase hex, unreserved set untouched).
pub fn encode(value: &str) -> String {
	utf8_percent_encode(value, RESERVED).to_string()
}

/// Reverses [`encode`]; `+` is left as-is.
pub fn decode(value: &str) -> Result<String, ProtocolError> {
	percent_decode_str(value)
		.decode_utf8()
		.map(|decoded| decoded.into_owned())
		.map_err(|e| ProtocolError::malformed(value, e))
}

/// Serializes pairs as `application/x-www-form-urlencoded` using RFC 3986 encoding.
pub fn to_form<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
	pairs
		.into_iter()
		.map(|(name, value)| format!("{}={}", encode(name), encode(value)))
		.collect::<Vec<_>>()
		.join("&")
}

/// Parses an `application/x-www-form-urlencoded` string (`+` decodes to a space).
pub fn parse_form(input: &str) -> Vec<(String, String)> {
	url::form_urlencoded::parse(input.as_bytes())
		.map(|(name, value)| (name.into_owned(), value.into_owned()))
		.collect()
}

/// Renders an `Authorization` header value carrying `params`, with an optional unsigned realm.
pub fn format_authorization_header<'a>(
	realm: Option<&str>,
	params: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> String {
	let mut parts = Vec::new();

	if let Some(realm) = realm {
		parts.push(format!("realm=\"{}\"", realm.replace('\\', "\\\\").replace('"', "\\\"")));
	}

	parts.extend(
		params.into_iter().map(|(name, value)| format!("{}=\"{}\"", encode(name), encode(value))),
	);

	format!("{AUTHORIZATION_SCHEME} {}", parts.join(", "))
}

/// Parses an `Authorization` header value.
///
/// Returns `None` when the header uses a scheme other than `OAuth`. The `realm` value is kept
/// verbatim; every other name and value is percent-decoded.
pub fn parse_authorization_header(value: &str) -> Option<Result<Vec<(String, String)>, ProtocolError>> {
	let value = value.trim_start();
	let (scheme, rest) = value.split_at_checked(AUTHORIZATION_SCHEME.len())?;

	if !scheme.eq_ignore_ascii_case(AUTHORIZATION_SCHEME) {
		return None;
	}
	if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
		return None;
	}

	Some(parse_auth_params(rest))
}

fn parse_auth_params(input: &str) -> Result<Vec<(String, String)>, ProtocolError> {
	let mut pairs = Vec::new();
	let mut chars = input.chars().peekable();

	loop {
		while chars.next_if(|c| c.is_whitespace() || *c == ',').is_some() {}

		if chars.peek().is_none() {
			break;
		}

		let mut name = String::new();

		while let Some(c) = chars.next_if(|c| *c != '=' && *c != ',') {
			name.push(c);
		}

		let name = name.trim().to_owned();

		if chars.next() != Some('=') {
			return Err(ProtocolError::malformed(
				"Authorization",
				format!("parameter `{name}` has no value"),
			));
		}

		while chars.next_if(|c| c.is_whitespace()).is_some() {}

		let mut value = String::new();

		if chars.next_if_eq(&'"').is_some() {
			let mut closed = false;

			while let Some(c) = chars.next() {
				match c {
					'\\' =>
						if let Some(escaped) = chars.next() {
							value.push(escaped);
						},
					'"' => {
						closed = true;

						break;
					},
					_ => value.push(c),
				}
			}

			if !closed {
				return Err(ProtocolError::malformed(
					"Authorization",
					format!("value of `{name}` is not terminated"),
				));
			}
		} else {
			while let Some(c) = chars.next_if(|c| *c != ',') {
				value.push(c);
			}

			value = value.trim_end().to_owned();
		}

		if name == "realm" {
			pairs.push((name, value));
		} else {
			pairs.push((decode(&name)?, decode(&value)?));
		}
	}

	Ok(pairs)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn encode_leaves_only_unreserved_characters() {
		assert_eq!(encode("abcABC123"), "abcABC123");
		assert_eq!(encode("-._~"), "-._~");
		assert_eq!(encode("%"), "%25");
		assert_eq!(encode("+"), "%2B");
		assert_eq!(encode("&=*"), "%26%3D%2A");
		assert_eq!(encode(" "), "%20");
		assert_eq!(encode("\u{2708}"), "%E2%9C%88");
		assert_eq!(decode("%E2%9C%88%20+").expect("Valid escape should decode."), "\u{2708} +");
	}

	#[test]
	fn form_round_trip_preserves_pairs() {
		let body = to_form([("a b", "c&d"), ("empty", "")]);

		assert_eq!(body, "a%20b=c%26d&empty=");
		assert_eq!(
			parse_form("a+b=c%26d&empty="),
			vec![("a b".to_owned(), "c&d".to_owned()), ("empty".to_owned(), String::new())]
		);
	}

	#[test]
	fn header_parsing_handles_realm_quotes_and_escapes() {
		let header = r#"OAuth realm="Photos \"2\"",
			oauth_consumer_key="dpf43f3p2l4k3l03", oauth_signature="tR3%2BTy81lMeYAr%2FFid0kMTYa%2FWM%3D",oauth_nonce=wIjqoS"#;
		let pairs = parse_authorization_header(header)
			.expect("OAuth scheme should be recognized.")
			.expect("Header should parse.");

		assert_eq!(pairs[0], ("realm".to_owned(), "Photos \"2\"".to_owned()));
		assert_eq!(pairs[1], ("oauth_consumer_key".to_owned(), "dpf43f3p2l4k3l03".to_owned()));
		assert_eq!(
			pairs[2],
			("oauth_signature".to_owned(), "tR3+Ty81lMeYAr/Fid0kMTYa/WM=".to_owned())
		);
		assert_eq!(pairs[3], ("oauth_nonce".to_owned(), "wIjqoS".to_owned()));
	}

	#[test]
	fn header_parsing_skips_other_schemes_and_rejects_garbage() {
		assert!(parse_authorization_header("Bearer abc").is_none());
		assert!(parse_authorization_header("OAuthx a=\"b\"").is_none());
		assert!(
			parse_authorization_header("OAuth oauth_token=\"unterminated")
				.expect("OAuth scheme should be recognized.")
				.is_err()
		);
		assert!(
			parse_authorization_header("OAuth oauth_token")
				.expect("OAuth scheme should be recognized.")
				.is_err()
		);
	}

	#[test]
	fn formatted_header_parses_back() {
		let header = format_authorization_header(
			Some("http://sp.example.com/"),
			[("oauth_consumer_key", "0685bd9184jfhq22"), ("oauth_signature", "wOJIO9A2W5mFwDgiDvZbTSMK/PY=")],
		);

		assert_eq!(
			header,
			"OAuth realm=\"http://sp.example.com/\", oauth_consumer_key=\"0685bd9184jfhq22\", oauth_signature=\"wOJIO9A2W5mFwDgiDvZbTSMK%2FPY%3D\""
		);

		let pairs = parse_authorization_header(&header)
			.expect("OAuth scheme should be recognized.")
			.expect("Formatted header should parse.");

		assert_eq!(pairs[2].1, "wOJIO9A2W5mFwDgiDvZbTSMK/PY=");
	}
}
