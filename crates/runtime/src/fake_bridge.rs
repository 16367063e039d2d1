//! In-memory [`RemoteContextBridge`] for exercising controllers without a browser.
//!
//! Scripts are matched by their exact source text. Each one can be given a
//! fixed value, a failure, or a closure that sees the call index and the
//! argument; unscripted evaluations return `null`.
//!
//! # Example
//!
//! ```ignore
//! let bridge = Arc::new(FakeBridge::new());
//! bridge.respond(scripts::IS_REGISTERED, json!(true));
//! bridge.respond_with(scripts::IS_MAIN_READY, |call, _| Ok(json!(call >= 2)));
//!
//! // ... drive the controller ...
//!
//! bridge.dispatch(HOST_DISPATCH_FN, json!({"kind": "mainReady"}));
//! bridge.emit(ContextLifecycle::Closed);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::bridge::{ContextLifecycle, HostCallable, RemoteContextBridge};
use crate::error::{BridgeError, Result};

type Responder = Arc<dyn Fn(usize, &Value) -> Result<Value> + Send + Sync>;

#[derive(Default)]
struct ScriptLog {
	calls: usize,
	last_arg: Option<Value>,
}

/// Scriptable fake bridge.
pub struct FakeBridge {
	responders: Mutex<HashMap<String, Responder>>,
	log: Mutex<HashMap<String, ScriptLog>>,
	callables: Mutex<HashMap<String, HostCallable>>,
	lifecycle_tx: broadcast::Sender<ContextLifecycle>,
	closed: AtomicBool,
	close_calls: AtomicUsize,
	registrations: AtomicUsize,
}

impl FakeBridge {
	pub fn new() -> Self {
		let (lifecycle_tx, _) = broadcast::channel(64);
		Self {
			responders: Mutex::new(HashMap::new()),
			log: Mutex::new(HashMap::new()),
			callables: Mutex::new(HashMap::new()),
			lifecycle_tx,
			closed: AtomicBool::new(false),
			close_calls: AtomicUsize::new(0),
			registrations: AtomicUsize::new(0),
		}
	}

	/// Answers every evaluation of `script` with `value`.
	pub fn respond(&self, script: &str, value: Value) {
		self.respond_with(script, move |_, _| Ok(value.clone()));
	}

	/// Makes every evaluation of `script` fail with an evaluation error.
	pub fn fail(&self, script: &str, message: &str) {
		let message = message.to_string();
		self.respond_with(script, move |_, _| Err(BridgeError::Evaluation(message.clone())));
	}

	/// Answers evaluations of `script` through `responder`, which receives the
	/// zero-based call index and the argument.
	pub fn respond_with<F>(&self, script: &str, responder: F)
	where
		F: Fn(usize, &Value) -> Result<Value> + Send + Sync + 'static,
	{
		self.responders.lock().insert(script.to_string(), Arc::new(responder));
	}

	/// Number of times `script` has been evaluated.
	pub fn calls(&self, script: &str) -> usize {
		self.log.lock().get(script).map_or(0, |log| log.calls)
	}

	/// Argument of the most recent evaluation of `script`.
	pub fn last_arg(&self, script: &str) -> Option<Value> {
		self.log.lock().get(script).and_then(|log| log.last_arg.clone())
	}

	pub fn has_callable(&self, name: &str) -> bool {
		self.callables.lock().contains_key(name)
	}

	/// Invokes the host callable registered as `name`, as the context would.
	///
	/// Returns `false` if nothing is registered under that name.
	pub fn dispatch(&self, name: &str, payload: Value) -> bool {
		let callable = self.callables.lock().get(name).cloned();
		match callable {
			Some(callable) => {
				callable(payload);
				true
			}
			None => false,
		}
	}

	/// Broadcasts a lifecycle transition. `Closed` also marks the bridge closed,
	/// `Loaded` reopens it.
	pub fn emit(&self, event: ContextLifecycle) {
		match event {
			ContextLifecycle::Closed => self.closed.store(true, Ordering::SeqCst),
			ContextLifecycle::Loaded => self.closed.store(false, Ordering::SeqCst),
		}
		let _ = self.lifecycle_tx.send(event);
	}

	/// Number of host callables registered so far, replacements included.
	pub fn registrations(&self) -> usize {
		self.registrations.load(Ordering::SeqCst)
	}

	/// Number of times [`RemoteContextBridge::close`] was called.
	pub fn close_calls(&self) -> usize {
		self.close_calls.load(Ordering::SeqCst)
	}
}

impl Default for FakeBridge {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl RemoteContextBridge for FakeBridge {
	async fn run_in_context(&self, function: &str, arg: Value) -> Result<Value> {
		if self.closed.load(Ordering::SeqCst) {
			return Err(BridgeError::ContextClosed);
		}

		let call = {
			let mut log = self.log.lock();
			let entry = log.entry(function.to_string()).or_default();
			let call = entry.calls;
			entry.calls += 1;
			entry.last_arg = Some(arg.clone());
			call
		};

		let responder = self.responders.lock().get(function).cloned();
		match responder {
			Some(responder) => responder(call, &arg),
			None => Ok(Value::Null),
		}
	}

	async fn register_callable(&self, name: &str, callable: HostCallable) -> Result<()> {
		if self.closed.load(Ordering::SeqCst) {
			return Err(BridgeError::ContextClosed);
		}
		self.callables.lock().insert(name.to_string(), callable);
		self.registrations.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	fn lifecycle(&self) -> broadcast::Receiver<ContextLifecycle> {
		self.lifecycle_tx.subscribe()
	}

	fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	async fn close(&self) -> Result<()> {
		self.close_calls.fetch_add(1, Ordering::SeqCst);
		if !self.closed.swap(true, Ordering::SeqCst) {
			let _ = self.lifecycle_tx.send(ContextLifecycle::Closed);
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use serde_json::json;

	use super::*;
	use crate::bridge::{BridgeExt, WaitOptions, WaitOutcome};

	#[tokio::test]
	async fn scripted_responses_and_call_log() {
		let bridge = FakeBridge::new();
		bridge.respond("() => 1", json!(1));
		bridge.respond_with("(n) => n", |call, arg| Ok(json!({"call": call, "arg": arg})));

		assert_eq!(bridge.run_in_context("() => 1", Value::Null).await.unwrap(), json!(1));
		assert_eq!(bridge.run_in_context("() => other", Value::Null).await.unwrap(), Value::Null);
		let second = bridge.run_in_context("(n) => n", json!(7)).await.unwrap();
		assert_eq!(second, json!({"call": 0, "arg": 7}));

		assert_eq!(bridge.calls("() => 1"), 1);
		assert_eq!(bridge.calls("never"), 0);
		assert_eq!(bridge.last_arg("(n) => n"), Some(json!(7)));
	}

	#[tokio::test]
	async fn failures_surface_as_evaluation_errors() {
		let bridge = FakeBridge::new();
		bridge.fail("() => boom", "boom");

		let err = bridge.probe("() => boom").await.unwrap_err();
		assert!(matches!(err, BridgeError::Evaluation(ref m) if m == "boom"));
	}

	#[tokio::test]
	async fn dispatch_reaches_registered_callable() {
		let bridge = FakeBridge::new();
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&seen);
		bridge
			.register_callable("hostFn", Arc::new(move |v| sink.lock().push(v)))
			.await
			.unwrap();

		assert!(bridge.has_callable("hostFn"));
		assert!(bridge.dispatch("hostFn", json!("a")));
		assert!(!bridge.dispatch("missing", json!("b")));
		assert_eq!(*seen.lock(), vec![json!("a")]);
	}

	#[tokio::test]
	async fn close_is_observable() {
		let bridge = FakeBridge::new();
		let mut lifecycle = bridge.lifecycle();

		bridge.close().await.unwrap();
		bridge.close().await.unwrap();

		assert!(bridge.is_closed());
		assert_eq!(bridge.close_calls(), 2);
		assert_eq!(lifecycle.recv().await.unwrap(), ContextLifecycle::Closed);
		assert!(matches!(
			bridge.run_in_context("() => 1", Value::Null).await,
			Err(BridgeError::ContextClosed)
		));
	}

	#[tokio::test(start_paused = true)]
	async fn wait_until_polls_until_truthy() {
		let bridge = FakeBridge::new();
		bridge.respond_with("() => ready", |call, _| Ok(json!(call >= 3)));

		let outcome = bridge
			.wait_until("() => ready", WaitOptions::new(Duration::from_secs(5), Duration::from_millis(100)))
			.await
			.unwrap();

		assert_eq!(outcome, WaitOutcome::Satisfied);
		assert_eq!(bridge.calls("() => ready"), 4);
	}

	#[tokio::test(start_paused = true)]
	async fn wait_until_times_out() {
		let bridge = FakeBridge::new();
		bridge.respond("() => ready", json!(false));

		let outcome = bridge
			.wait_until("() => ready", WaitOptions::new(Duration::from_secs(1), Duration::from_millis(250)))
			.await
			.unwrap();

		assert_eq!(outcome, WaitOutcome::TimedOut);
	}
}
