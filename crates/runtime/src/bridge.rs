//! Contract of the remote context the session controller drives.
//!
//! The bridge is implemented by whatever automation engine hosts the remote
//! client (a browser page, a devtools connection, ...). The controller only
//! relies on the operations below:
//!
//! * evaluate a function expression in the context and get its JSON result
//! * expose a host function callable from inside the context
//! * observe `loaded`/`closed` lifecycle transitions
//! * close the context
//!
//! [`RemoteContextBridge::wait_until`] has a polling default so simple
//! implementations get it for free.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::error::{BridgeError, Result};

/// Host function invoked with the JSON argument the context passed.
pub type HostCallable = Arc<dyn Fn(Value) + Send + Sync>;

/// Lifecycle transitions of the remote context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextLifecycle {
	/// The document (re)loaded; injected state is gone and must be re-run.
	Loaded,
	/// The context or its process went away.
	Closed,
}

/// Polling parameters for [`RemoteContextBridge::wait_until`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
	/// Upper bound on the wait. `Duration::ZERO` waits until the context closes.
	pub timeout: Duration,
	pub poll: Duration,
}

impl WaitOptions {
	pub fn new(timeout: Duration, poll: Duration) -> Self {
		Self { timeout, poll }
	}
}

impl Default for WaitOptions {
	fn default() -> Self {
		Self {
			timeout: Duration::from_secs(30),
			poll: Duration::from_millis(100),
		}
	}
}

/// Result of a [`RemoteContextBridge::wait_until`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
	Satisfied,
	TimedOut,
}

/// Capability to drive one remote script context.
#[async_trait]
pub trait RemoteContextBridge: Send + Sync {
	/// Evaluates `function` (a function expression) with `arg` and returns its result.
	async fn run_in_context(&self, function: &str, arg: Value) -> Result<Value>;

	/// Makes `callable` reachable from inside the context as `window[name]`.
	///
	/// Registering the same name again replaces the previous callable.
	async fn register_callable(&self, name: &str, callable: HostCallable) -> Result<()>;

	/// Subscribes to lifecycle transitions.
	fn lifecycle(&self) -> broadcast::Receiver<ContextLifecycle>;

	fn is_closed(&self) -> bool;

	async fn close(&self) -> Result<()>;

	/// Polls `predicate` until it returns a truthy value or `options.timeout` elapses.
	///
	/// Evaluation errors count as "not yet"; a closed context ends the wait
	/// with [`BridgeError::ContextClosed`].
	async fn wait_until(&self, predicate: &str, options: WaitOptions) -> Result<WaitOutcome> {
		let start = Instant::now();

		loop {
			if self.is_closed() {
				return Err(BridgeError::ContextClosed);
			}

			match self.run_in_context(predicate, Value::Null).await {
				Ok(value) if is_truthy(&value) => return Ok(WaitOutcome::Satisfied),
				Ok(_) => {}
				Err(BridgeError::ContextClosed) => return Err(BridgeError::ContextClosed),
				Err(err) => tracing::trace!(target = "wa.bridge", error = %err, "wait predicate failed; retrying"),
			}

			if !options.timeout.is_zero() && start.elapsed() >= options.timeout {
				return Ok(WaitOutcome::TimedOut);
			}

			tokio::time::sleep(options.poll).await;
		}
	}
}

/// Typed helpers over any [`RemoteContextBridge`].
#[async_trait]
pub trait BridgeExt: RemoteContextBridge {
	/// Evaluates `function` and deserializes its result into `T`.
	async fn evaluate<T>(&self, function: &str, arg: Value) -> Result<T>
	where
		T: DeserializeOwned + Send,
	{
		let value = self.run_in_context(function, arg).await?;
		Ok(serde_json::from_value(value)?)
	}

	/// Evaluates a boolean predicate; non-boolean results are decode errors.
	async fn probe(&self, predicate: &str) -> Result<bool> {
		self.evaluate::<bool>(predicate, Value::Null).await
	}
}

impl<B: RemoteContextBridge + ?Sized> BridgeExt for B {}

/// JavaScript truthiness of a JSON value.
pub fn is_truthy(value: &Value) -> bool {
	match value {
		Value::Null => false,
		Value::Bool(b) => *b,
		Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
		Value::String(s) => !s.is_empty(),
		Value::Array(_) | Value::Object(_) => true,
	}
}
