//! Session states and the transition table.

use std::fmt;

/// Where a session is in its lifecycle.
///
/// Moves forward only, except when registration is lost: `Authenticated`
/// or `InChat` drop to `Disconnected`, from where the session pairs again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
	Initializing,
	Injecting,
	AwaitingScan,
	Authenticated,
	InChat,
	Disconnected,
	Closed,
}

/// Everything that can move a session between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
	Start,
	/// Injection finished and the first registration check came back.
	Injected { registered: bool },
	Registered,
	NewPairingCode,
	MainReady,
	SyncTimedOut,
	Unregistered,
	ContextClosed,
}

impl SessionState {
	/// Next state for `trigger`, or `None` when the trigger does not apply.
	pub fn next(self, trigger: Trigger) -> Option<SessionState> {
		use SessionState::*;

		match (self, trigger) {
			(Closed, _) => None,
			(_, Trigger::ContextClosed) => Some(Closed),
			(Initializing, Trigger::Start) => Some(Injecting),
			(Injecting, Trigger::Injected { registered: true }) => Some(Authenticated),
			(Injecting, Trigger::Injected { registered: false }) => Some(AwaitingScan),
			(AwaitingScan, Trigger::Registered) => Some(Authenticated),
			(AwaitingScan, Trigger::NewPairingCode) => Some(AwaitingScan),
			(Authenticated, Trigger::MainReady) => Some(InChat),
			(Authenticated, Trigger::SyncTimedOut) => Some(Disconnected),
			(Authenticated | InChat, Trigger::Unregistered) => Some(Disconnected),
			(Disconnected, Trigger::NewPairingCode) => Some(AwaitingScan),
			(Disconnected, Trigger::Registered) => Some(Authenticated),
			_ => None,
		}
	}

	/// `true` once the account is linked and not yet lost.
	pub fn is_authenticated(self) -> bool {
		matches!(self, SessionState::Authenticated | SessionState::InChat)
	}

	pub fn as_str(self) -> &'static str {
		match self {
			SessionState::Initializing => "initializing",
			SessionState::Injecting => "injecting",
			SessionState::AwaitingScan => "awaitingScan",
			SessionState::Authenticated => "authenticated",
			SessionState::InChat => "inChat",
			SessionState::Disconnected => "disconnected",
			SessionState::Closed => "closed",
		}
	}
}

impl fmt::Display for SessionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
