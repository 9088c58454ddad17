// self
use crate::{
	error::ProtocolError,
	obs::{Operation, Outcome},
};

/// Records an operation outcome via the global metrics recorder (when enabled).
pub fn record_operation_outcome(operation: Operation, outcome: Outcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oauth1_kit_operation_total",
			"operation" => operation.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (operation, outcome);
	}
}

/// Logs and counts a rejected incoming message.
pub fn record_rejection(operation: Operation, error: &ProtocolError) {
	#[cfg(feature = "tracing")]
	tracing::warn!(
		operation = operation.as_str(),
		problem = error.problem(),
		%error,
		"Rejected incoming message."
	);

	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oauth1_kit_rejection_total",
			"operation" => operation.as_str(),
			"problem" => error.problem()
		)
		.increment(1);
	}

	#[cfg(not(any(feature = "tracing", feature = "metrics")))]
	{
		let _ = (operation, error);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recorders_noop_without_features() {
		record_operation_outcome(Operation::AccessToken, Outcome::Failure);
		record_rejection(Operation::ProtectedResource, &ProtocolError::ReplayedNonce);
	}
}
