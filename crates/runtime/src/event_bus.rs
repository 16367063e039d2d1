//! Typed inbound event bus from the remote context to the host.
//!
//! The context gets exactly one host-callable function. Every call carries a
//! tagged JSON payload that is decoded into a closed event enum and queued
//! for a single dispatcher on the host side. Payloads that do not decode are
//! logged and dropped.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::bridge::HostCallable;

/// Receiving half of the bus, owned by the host-side dispatcher.
pub type HostEventReceiver<E> = mpsc::UnboundedReceiver<E>;

/// Creates the host callable to register with the bridge and the receiver
/// its decoded events are delivered to.
pub fn host_event_bus<E>() -> (HostCallable, HostEventReceiver<E>)
where
	E: DeserializeOwned + Send + 'static,
{
	let (tx, rx) = mpsc::unbounded_channel::<E>();

	let callable: HostCallable = Arc::new(move |payload: Value| match serde_json::from_value::<E>(payload.clone()) {
		Ok(event) => {
			if tx.send(event).is_err() {
				trace!(target = "wa.bridge", "host event dispatcher gone; dropping event");
			}
		}
		Err(err) => {
			warn!(target = "wa.bridge", error = %err, %payload, "ignoring malformed host event");
		}
	});

	(callable, rx)
}
