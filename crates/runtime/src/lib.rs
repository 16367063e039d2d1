//! Runtime plumbing shared by the session controller: the remote context
//! bridge contract, the typed host event bus, and cancellable watchdogs.

pub mod bridge;
pub mod error;
pub mod event_bus;
pub mod fake_bridge;
pub mod watchdog;

pub use bridge::{BridgeExt, ContextLifecycle, HostCallable, RemoteContextBridge, WaitOptions, WaitOutcome, is_truthy};
pub use error::{BridgeError, Result};
pub use event_bus::{HostEventReceiver, host_event_bus};
pub use fake_bridge::FakeBridge;
pub use watchdog::Watchdog;
