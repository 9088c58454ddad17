//! Redacted wrapper for consumer secrets, token secrets, and verification codes.

// crates.io
use subtle::ConstantTimeEq;
// self
use crate::_prelude::*;

/// Shared secret kept out of logs and debug output.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);
impl Secret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Returns `true` when no secret material is present.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Compares against a candidate without short-circuiting on the first differing byte.
	pub fn matches(&self, candidate: &str) -> bool {
		self.0.as_bytes().ct_eq(candidate.as_bytes()).into()
	}
}
impl PartialEq for Secret {
	fn eq(&self, other: &Self) -> bool {
		self.matches(&other.0)
	}
}
impl Eq for Secret {}
impl AsRef<str> for Secret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl From<&str> for Secret {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}
impl From<String> for Secret {
	fn from(value: String) -> Self {
		Self(value)
	}
}
impl Debug for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("Secret").field(&"<redacted>").finish()
	}
}
impl Display for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}
