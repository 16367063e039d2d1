//! Events flowing between the remote context, the host, and the application.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the single host-callable function the remote context uses to push
/// [`HostEvent`]s back to the host.
pub const HOST_DISPATCH_FN: &str = "__waHostDispatch";

/// Closed set of notifications the remote context pushes to the host.
///
/// Serialized as an internally tagged object, e.g.
/// `{"kind": "authCodeChange"}` or `{"kind": "stateChange", "state": "CONNECTED"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum HostEvent {
	/// The pairing code rotated (or appeared).
	AuthCodeChange,
	/// The main interface finished loading and syncing.
	MainReady,
	/// The remote socket changed state.
	StateChange { state: String },
	/// The web client's startup progress bar moved.
	LoadingScreen { percent: u32, message: String },
}

/// Lifecycle status surfaced to the embedding application.
///
/// Wire names match the status strings the original client reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusEvent {
	NotLogged,
	IsLogged,
	QrReadSuccess,
	QrReadFail,
	QrReadError,
	InChat,
	PhoneNotConnected,
	AutocloseCalled,
	DisconnectedMobile,
	BrowserClose,
}

impl StatusEvent {
	pub fn as_str(self) -> &'static str {
		match self {
			StatusEvent::NotLogged => "notLogged",
			StatusEvent::IsLogged => "isLogged",
			StatusEvent::QrReadSuccess => "qrReadSuccess",
			StatusEvent::QrReadFail => "qrReadFail",
			StatusEvent::QrReadError => "qrReadError",
			StatusEvent::InChat => "inChat",
			StatusEvent::PhoneNotConnected => "phoneNotConnected",
			StatusEvent::AutocloseCalled => "autocloseCalled",
			StatusEvent::DisconnectedMobile => "disconnectedMobile",
			StatusEvent::BrowserClose => "browserClose",
		}
	}
}

impl fmt::Display for StatusEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A status event tagged with the session it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
	pub session: String,
	pub status: StatusEvent,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn host_events_use_kind_tag() {
		let event: HostEvent = serde_json::from_str(r#"{"kind":"authCodeChange"}"#).unwrap();
		assert_eq!(event, HostEvent::AuthCodeChange);

		let event: HostEvent = serde_json::from_str(r#"{"kind":"stateChange","state":"CONFLICT"}"#).unwrap();
		assert_eq!(event, HostEvent::StateChange { state: "CONFLICT".into() });

		let event: HostEvent = serde_json::from_str(r#"{"kind":"loadingScreen","percent":42,"message":"Loading chats"}"#).unwrap();
		assert_eq!(
			event,
			HostEvent::LoadingScreen {
				percent: 42,
				message: "Loading chats".into()
			}
		);

		assert!(serde_json::from_str::<HostEvent>(r#"{"kind":"somethingElse"}"#).is_err());
	}

	#[test]
	fn status_wire_names_match_display() {
		for status in [
			StatusEvent::NotLogged,
			StatusEvent::QrReadSuccess,
			StatusEvent::PhoneNotConnected,
			StatusEvent::DisconnectedMobile,
			StatusEvent::AutocloseCalled,
		] {
			let wire = serde_json::to_value(status).unwrap();
			assert_eq!(wire, status.as_str());
		}
	}
}
