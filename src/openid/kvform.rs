//! Key-Value Form encoding: `key:value\n` lines used by direct responses and signatures.

// self
use crate::_prelude::*;

/// How strictly [`decode`] applies the encoding rules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Conformance {
	/// Trims lines and skips blank ones; no trailing newline required.
	#[default]
	Loose,
	/// Rejects whitespace around `:` and requires a trailing newline; values are trimmed.
	OpenId11,
	/// Like [`Conformance::OpenId11`] but keeps values verbatim.
	OpenId20,
}

/// Encoding or decoding failures.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum KvFormError {
	/// Keys may not contain `:` or a newline.
	#[error("Key `{key}` contains a forbidden character.")]
	InvalidKey {
		/// Offending key.
		key: String,
	},
	/// Values may not contain a newline.
	#[error("Value of `{key}` contains a newline.")]
	InvalidValue {
		/// Key whose value was refused.
		key: String,
	},
	/// A line had no `:`.
	#[error("Line {line} lacks the `:` separator.")]
	MissingSeparator {
		/// One-based line number.
		line: usize,
	},
	/// Whitespace surrounded the separator under a strict conformance level.
	#[error("Line {line} has whitespace around the `:` separator.")]
	Whitespace {
		/// One-based line number.
		line: usize,
	},
	/// Strict conformance levels require the input to end with a newline.
	#[error("Input does not end with a newline.")]
	MissingTrailingNewline,
	/// The same key appeared twice.
	#[error("Key `{key}` appears more than once.")]
	DuplicateKey {
		/// Repeated key.
		key: String,
	},
}

/// Encodes `pairs` in the given order; keys and values are trimmed first.
pub fn encode<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<String, KvFormError> {
	let mut out = String::new();

	for (key, value) in pairs {
		let (key, value) = (key.trim(), value.trim());

		if key.contains([':', '\n']) {
			return Err(KvFormError::InvalidKey { key: key.into() });
		}
		if value.contains('\n') {
			return Err(KvFormError::InvalidValue { key: key.into() });
		}

		out.push_str(key);
		out.push(':');
		out.push_str(value);
		out.push('\n');
	}

	Ok(out)
}

/// Decodes a Key-Value Form document.
pub fn decode(input: &str, conformance: Conformance) -> Result<BTreeMap<String, String>, KvFormError> {
	let mut out = BTreeMap::new();

	for (idx, raw) in input.lines().enumerate() {
		let line_number = idx + 1;
		let line = if conformance == Conformance::Loose { raw.trim() } else { raw };

		if conformance == Conformance::Loose && line.is_empty() {
			continue;
		}

		let (mut key, mut value) =
			line.split_once(':').ok_or(KvFormError::MissingSeparator { line: line_number })?;

		if conformance > Conformance::Loose
			&& (key.ends_with(char::is_whitespace) || value.starts_with(char::is_whitespace))
		{
			return Err(KvFormError::Whitespace { line: line_number });
		}
		if conformance < Conformance::OpenId20 {
			key = key.trim();
			value = value.trim();
		}
		if out.insert(key.to_owned(), value.to_owned()).is_some() {
			return Err(KvFormError::DuplicateKey { key: key.into() });
		}
	}

	if conformance > Conformance::Loose && !input.ends_with('\n') {
		return Err(KvFormError::MissingTrailingNewline);
	}

	Ok(out)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn encode_writes_lines_in_order() {
		let encoded = encode([("mode", "id_res"), ("op_endpoint", " https://op.example.com/ ")])
			.expect("Encoding should succeed.");

		assert_eq!(encoded, "mode:id_res\nop_endpoint:https://op.example.com/\n");
		assert_eq!(
			encode([("bad:key", "v")]),
			Err(KvFormError::InvalidKey { key: "bad:key".into() })
		);
		assert_eq!(
			encode([("key", "multi\nline")]),
			Err(KvFormError::InvalidValue { key: "key".into() })
		);
	}

	#[test]
	fn loose_decoding_forgives_whitespace_and_blank_lines() {
		let decoded = decode("  is_valid : true \n\nns:http://specs.openid.net/auth/2.0", Conformance::Loose)
			.expect("Loose decoding should succeed.");

		assert_eq!(decoded.get("is_valid").map(String::as_str), Some("true"));
		assert_eq!(decoded.get("ns").map(String::as_str), Some("http://specs.openid.net/auth/2.0"));
	}

	#[test]
	fn strict_decoding_enforces_the_grammar() {
		assert_eq!(
			decode("is_valid: true\n", Conformance::OpenId20),
			Err(KvFormError::Whitespace { line: 1 })
		);
		assert_eq!(decode("is_valid:true", Conformance::OpenId11), Err(KvFormError::MissingTrailingNewline));
		assert_eq!(decode("is_valid\n", Conformance::OpenId20), Err(KvFormError::MissingSeparator { line: 1 }));
		assert_eq!(
			decode("a:1\na:2\n", Conformance::OpenId20),
			Err(KvFormError::DuplicateKey { key: "a".into() })
		);

		let decoded = decode("expires_in:3600\nmac_key:a b \n", Conformance::OpenId20)
			.expect("Strict decoding should succeed.");

		assert_eq!(decoded.get("mac_key").map(String::as_str), Some("a b "));
	}
}
