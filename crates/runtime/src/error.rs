//! Errors raised by a remote context bridge.

use thiserror::Error;

/// Failure of a single bridge operation.
///
/// Evaluation failures are expected during navigation races; callers that
/// poll treat them as "unknown" and retry on the next tick.
#[derive(Debug, Error)]
pub enum BridgeError {
	/// The expression threw or the context rejected the call.
	#[error("remote evaluation failed: {0}")]
	Evaluation(String),

	/// The context (page or process) is gone.
	#[error("remote context is closed")]
	ContextClosed,

	/// A host-callable function could not be exposed to the context.
	#[error("failed to register host callable '{name}': {message}")]
	Registration { name: String, message: String },

	/// The context returned a value of an unexpected shape.
	#[error("unexpected value from remote context: {0}")]
	Decode(#[from] serde_json::Error),
}

impl BridgeError {
	/// Returns `true` if this error means the context is gone for good.
	pub fn is_closed(&self) -> bool {
		matches!(self, BridgeError::ContextClosed)
	}
}

pub type Result<T> = std::result::Result<T, BridgeError>;
