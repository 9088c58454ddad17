//! Optional observability helpers for provider, consumer, and relying-party operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `oauth1_kit.operation` with the
//!   `operation` and `stage` (call site) fields, completed with `outcome` and the rejection
//!   `problem` code, plus `warn` events for rejected messages.
//! - Enable `metrics` to increment the `oauth1_kit_operation_total` counter for every
//!   attempt/success/failure, labeled by `operation` + `outcome`, and
//!   `oauth1_kit_rejection_total` labeled by `operation` + `problem`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Protocol operations observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
	/// Obtaining an unauthorized request token.
	RequestToken,
	/// Sending the user to, or handling the user at, the authorization endpoint.
	UserAuthorization,
	/// Trading an authorized request token for an access token.
	AccessToken,
	/// Signing or authorizing a protected resource request.
	ProtectedResource,
	/// Verifying an OpenID positive assertion.
	Assertion,
	/// Negotiating an OpenID association.
	Association,
}
impl Operation {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Operation::RequestToken => "request_token",
			Operation::UserAuthorization => "user_authorization",
			Operation::AccessToken => "access_token",
			Operation::ProtectedResource => "protected_resource",
			Operation::Assertion => "assertion",
			Operation::Association => "association",
		}
	}
}
impl Display for Operation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl Outcome {
	/// Final outcome of a completed operation.
	pub fn of<T>(result: &Result<T>) -> Self {
		match result {
			Ok(_) => Self::Success,
			Err(_) => Self::Failure,
		}
	}

	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Outcome::Attempt => "attempt",
			Outcome::Success => "success",
			Outcome::Failure => "failure",
		}
	}
}
impl Display for Outcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Runs `fut` inside an operation span and records attempt/success/failure, plus the problem
/// code of protocol rejections.
pub async fn observe<T, F>(operation: Operation, stage: &'static str, fut: F) -> Result<T>
where
	F: Future<Output = Result<T>>,
{
	record_operation_outcome(operation, Outcome::Attempt);

	let span = OperationSpan::new(operation, stage);
	let result = span.run(fut).await;
	let outcome = Outcome::of(&result);
	let rejection = result.as_ref().err().and_then(Error::as_protocol);

	if let Some(rejection) = rejection {
		record_rejection(operation, rejection);
	}

	span.complete(outcome, rejection);
	record_operation_outcome(operation, outcome);

	result
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{error::ProtocolError, store::StoreError};

	#[tokio::test]
	async fn observe_passes_results_through() {
		let ok = observe(Operation::RequestToken, "ok", async { Ok(7) }).await;

		assert_eq!(ok.expect("Successful operations should pass through."), 7);

		let err = observe(Operation::AccessToken, "err", async {
			Err::<(), _>(ProtocolError::ReplayedNonce.into())
		})
		.await
		.expect_err("Failures should pass through.");

		assert_eq!(err.as_protocol(), Some(&ProtocolError::ReplayedNonce));
	}

	#[test]
	fn outcome_follows_the_result() {
		assert_eq!(Outcome::of(&Ok::<_, Error>(())), Outcome::Success);
		assert_eq!(
			Outcome::of(&Err::<(), Error>(StoreError::Backend { message: "down".into() }.into())),
			Outcome::Failure
		);
	}
}
