//! Pairing payloads read out of the remote context.

use serde::{Deserialize, Serialize};

/// Latest pairing payload exposed by the remote client.
///
/// `url_code` is the full QR payload string. `base64_image` is the rendered
/// QR canvas as a data URL when the context could produce one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingPayload {
	pub url_code: String,
	#[serde(default)]
	pub base64_image: Option<String>,
}

impl PairingPayload {
	/// Returns `true` when the payload carries a non-empty code.
	pub fn has_code(&self) -> bool {
		!self.url_code.trim().is_empty()
	}
}

/// Arguments for requesting a numeric link code for a phone number.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkCodeRequest {
	pub phone: String,
}
