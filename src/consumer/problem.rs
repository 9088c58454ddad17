//! Classification of service provider error responses.
//!
//! Providers that implement OAuth Problem Reporting answer with an `oauth_problem` code (and an
//! optional `oauth_problem_advice`); others only give a status code and a free-form body. The
//! classifier turns either shape into the crate's error taxonomy.

// self
use crate::{
	_prelude::*,
	error::TransientError,
	message::{self, HttpResponse},
};

const PROBLEM_ADVICE: &str = "oauth_problem_advice";

/// Hook that maps a failed service provider response onto an error category.
pub trait ProblemClassifier
where
	Self: Send + Sync,
{
	/// Picks the category for the response described by `ctx`.
	fn classify(&self, ctx: &ProblemContext) -> ProblemKind;
}

/// Error categories a failed response can fall into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProblemKind {
	/// The token was refused, expired, or the user denied access.
	InvalidGrant,
	/// The consumer key or signature was refused.
	InvalidClient,
	/// Retrying later may succeed.
	Transient,
}

/// Data extracted from a failed response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProblemContext {
	/// HTTP status code.
	pub http_status: Option<u16>,
	/// `oauth_problem` code, when the provider sent one.
	pub problem: Option<String>,
	/// `oauth_problem_advice`, when the provider sent one.
	pub advice: Option<String>,
	/// Truncated response body.
	pub body_preview: Option<String>,
	/// `Retry-After` hint.
	pub retry_after: Option<Duration>,
}
impl ProblemContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Extracts the context from a response.
	pub fn from_response(response: &HttpResponse) -> Self {
		let params = response.form_parameters();

		Self {
			http_status: Some(response.status),
			problem: params.get(message::PROBLEM).map(ToOwned::to_owned),
			advice: params.get(PROBLEM_ADVICE).map(ToOwned::to_owned),
			body_preview: Some(response.body.as_str())
				.filter(|body| !body.trim().is_empty())
				.map(|body| truncate_preview(body.to_owned())),
			retry_after: response.retry_after(),
		}
	}

	/// Human-readable summary used as the error reason.
	pub fn summary(&self) -> String {
		let mut summary = match (&self.problem, &self.advice) {
			(Some(problem), Some(advice)) => format!("{problem} ({advice})"),
			(Some(problem), None) => problem.clone(),
			_ => self.body_preview.clone().unwrap_or_else(|| "no details supplied".into()),
		};

		if let Some(status) = self.http_status {
			summary = format!("HTTP {status}: {summary}");
		}

		summary
	}

	/// Converts the context into an [`Error`] of the given category.
	pub fn into_error(self, kind: ProblemKind) -> Error {
		let reason = self.summary();

		match kind {
			ProblemKind::InvalidGrant => Error::InvalidGrant { reason },
			ProblemKind::InvalidClient => Error::InvalidClient { reason },
			ProblemKind::Transient => TransientError::Endpoint {
				message: reason,
				status: self.http_status,
				retry_after: self.retry_after,
			}
			.into(),
		}
	}
}

/// Classifier applying OAuth Problem Reporting codes, then the HTTP status.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultProblemClassifier;
impl ProblemClassifier for DefaultProblemClassifier {
	fn classify(&self, ctx: &ProblemContext) -> ProblemKind {
		if matches!(ctx.http_status, Some(429) | Some(500..)) {
			return ProblemKind::Transient;
		}
		if let Some(kind) = ctx.problem.as_deref().and_then(classify_problem) {
			return kind;
		}
		if let Some(kind) = classify_body(ctx.body_preview.as_deref()) {
			return kind;
		}

		classify_status(ctx.http_status)
	}
}

/// Classifies `response` with `classifier` and converts it into an [`Error`].
pub fn response_error(classifier: &dyn ProblemClassifier, response: &HttpResponse) -> Error {
	let ctx = ProblemContext::from_response(response);
	let kind = classifier.classify(&ctx);

	ctx.into_error(kind)
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= ProblemContext::BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut buf = body.chars().take(ProblemContext::BODY_PREVIEW_LIMIT).collect::<String>();

	buf.push('…');

	buf
}

fn classify_problem(problem: &str) -> Option<ProblemKind> {
	match problem {
		"token_rejected" | "token_expired" | "token_revoked" | "token_used" | "permission_denied"
		| "permission_unknown" | "verifier_invalid" => Some(ProblemKind::InvalidGrant),
		"consumer_key_unknown" | "consumer_key_rejected" | "consumer_key_refused"
		| "signature_invalid" | "signature_method_rejected" | "parameter_absent"
		| "parameter_rejected" | "version_rejected" => Some(ProblemKind::InvalidClient),
		"timestamp_refused" | "nonce_used" | "temporarily_unavailable" =>
			Some(ProblemKind::Transient),
		_ => None,
	}
}

fn classify_body(body: Option<&str>) -> Option<ProblemKind> {
	let lowered = body?.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("token") && (text.contains("expired") || text.contains("invalid")) =>
			Some(ProblemKind::InvalidGrant),
		text if text.contains("signature") || text.contains("consumer key") =>
			Some(ProblemKind::InvalidClient),
		text if text.contains("try again") || text.contains("retry") =>
			Some(ProblemKind::Transient),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> ProblemKind {
	match status {
		Some(400 | 404 | 410) => ProblemKind::InvalidGrant,
		Some(401 | 403) => ProblemKind::InvalidClient,
		_ => ProblemKind::Transient,
	}
}
