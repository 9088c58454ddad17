// self
use crate::{
	_prelude::*,
	error::ProtocolError,
	obs::{Operation, Outcome},
};

/// Span covering one protocol operation.
///
/// The span opens with `operation` and `stage` and is completed with `outcome` and, for
/// rejected messages, the `oauth_problem` code under `problem`.
#[derive(Clone, Debug)]
pub struct OperationSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OperationSpan {
	/// Opens a span for `operation` at `stage`.
	pub fn new(operation: Operation, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"oauth1_kit.operation",
				operation = operation.as_str(),
				stage,
				outcome = tracing::field::Empty,
				problem = tracing::field::Empty,
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (operation, stage);

			Self {}
		}
	}

	/// Runs `fut` inside the span without holding a guard across `.await` points.
	pub async fn run<Fut>(&self, fut: Fut) -> Fut::Output
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone()).await
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut.await
		}
	}

	/// Records the final outcome and the problem code of a rejection.
	pub fn complete(&self, outcome: Outcome, rejection: Option<&ProtocolError>) {
		#[cfg(feature = "tracing")]
		{
			self.span.record("outcome", outcome.as_str());

			if let Some(rejection) = rejection {
				self.span.record("problem", rejection.problem());
			}
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (outcome, rejection);
		}
	}
}
