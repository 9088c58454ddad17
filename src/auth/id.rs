//! Strongly typed identifiers carried on the wire as `oauth_consumer_key`, `oauth_token`, and
//! `oauth_nonce`.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal, $max:expr) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Maximum number of bytes accepted for this identifier.
			pub const MAX_LEN: usize = $max;

			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate_view($kind, view, $max)?;

				Ok(Self(view.to_owned()))
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate_view($kind, &value, $max)?;

				Ok(Self(value))
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (consumer, token, nonce).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (consumer, token, nonce).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed length.
	#[error("{kind} identifier exceeds {max} bytes.")]
	TooLong {
		/// Kind of identifier (consumer, token, nonce).
		kind: &'static str,
		/// Maximum permitted byte count.
		max: usize,
	},
}

def_id! { ConsumerKey, "Key identifying a registered consumer (`oauth_consumer_key`).", "Consumer", 256 }
def_id! { TokenKey, "Request or access token identifier (`oauth_token`).", "Token", 256 }
def_id! { Nonce, "Single-use request nonce (`oauth_nonce`).", "Nonce", 128 }

fn validate_view(kind: &'static str, view: &str, max: usize) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.len() > max {
		return Err(IdentifierError::TooLong { kind, max });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn identifiers_reject_whitespace_and_empty() {
		assert!(ConsumerKey::new(" dpf43f3p2l4k3l03").is_err(), "Leading whitespace must be rejected.");
		assert!(TokenKey::new("nnch734d00sl2jdk ").is_err(), "Trailing whitespace must be rejected.");

		let key = ConsumerKey::new("dpf43f3p2l4k3l03")
			.expect("Consumer key fixture should be considered valid.");

		assert_eq!(key.as_ref(), "dpf43f3p2l4k3l03");
		assert!(Nonce::new("").is_err());
	}

	#[test]
	fn serde_round_trip_enforces_validation() {
		let token: TokenKey = serde_json::from_str("\"hh5s93j4hdidpola\"")
			.expect("Token should deserialize successfully.");

		assert_eq!(token.as_ref(), "hh5s93j4hdidpola");
		assert!(serde_json::from_str::<TokenKey>("\"with space\"").is_err());
	}

	#[test]
	fn length_limits_follow_identifier_kind() {
		Nonce::new("n".repeat(Nonce::MAX_LEN)).expect("Exact nonce length should succeed.");

		assert!(Nonce::new("n".repeat(Nonce::MAX_LEN + 1)).is_err());

		TokenKey::new("t".repeat(TokenKey::MAX_LEN)).expect("Exact token length should succeed.");

		assert_eq!(
			TokenKey::new("t".repeat(TokenKey::MAX_LEN + 1)),
			Err(IdentifierError::TooLong { kind: "Token", max: 256 })
		);
	}

	#[test]
	fn borrow_supports_fast_lookup() {
		let map: HashMap<ConsumerKey, u8> = HashMap::from_iter([(
			ConsumerKey::new("consumer-1").expect("Consumer key used for lookup should be valid."),
			7_u8,
		)]);

		assert_eq!(map.get("consumer-1"), Some(&7));
	}
}
