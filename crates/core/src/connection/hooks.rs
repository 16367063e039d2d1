use std::fmt;
use std::sync::Arc;

use wa_protocol::StatusUpdate;

use crate::connection::pairing::PairingAttempt;

pub type StatusCallback = Arc<dyn Fn(StatusUpdate) + Send + Sync>;
pub type PairingCallback = Arc<dyn Fn(&PairingAttempt) + Send + Sync>;
pub type LinkCodeCallback = Arc<dyn Fn(&str) + Send + Sync>;
pub type LoadingScreenCallback = Arc<dyn Fn(u32, &str) + Send + Sync>;

/// Callbacks through which the controller reports to the embedding application.
///
/// Callbacks run inline on the controller's tasks and must not block.
#[derive(Clone, Default)]
pub struct SessionHooks {
	pub(crate) on_status: Option<StatusCallback>,
	pub(crate) on_pairing: Option<PairingCallback>,
	pub(crate) on_link_code: Option<LinkCodeCallback>,
	pub(crate) on_loading_screen: Option<LoadingScreenCallback>,
}

impl SessionHooks {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn on_status(mut self, callback: impl Fn(StatusUpdate) + Send + Sync + 'static) -> Self {
		self.on_status = Some(Arc::new(callback));
		self
	}

	/// Registering a pairing callback also turns on QR rendering.
	pub fn on_pairing(mut self, callback: impl Fn(&PairingAttempt) + Send + Sync + 'static) -> Self {
		self.on_pairing = Some(Arc::new(callback));
		self
	}

	pub fn on_link_code(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
		self.on_link_code = Some(Arc::new(callback));
		self
	}

	/// Startup progress as `(percent, message)`; repeats are not reported.
	pub fn on_loading_screen(mut self, callback: impl Fn(u32, &str) + Send + Sync + 'static) -> Self {
		self.on_loading_screen = Some(Arc::new(callback));
		self
	}
}

impl fmt::Debug for SessionHooks {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SessionHooks")
			.field("on_status", &self.on_status.is_some())
			.field("on_pairing", &self.on_pairing.is_some())
			.field("on_link_code", &self.on_link_code.is_some())
			.field("on_loading_screen", &self.on_loading_screen.is_some())
			.finish()
	}
}
