//! Media descriptors consumed by the decrypt pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of media attachment, as reported by the remote client.
///
/// Parsing is case-insensitive so both `"image"` and `"IMAGE"` are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
	Image,
	Video,
	Audio,
	Ptt,
	Document,
	Sticker,
}

impl MediaType {
	/// All media types, in declaration order.
	pub const ALL: [MediaType; 6] = [
		MediaType::Image,
		MediaType::Video,
		MediaType::Audio,
		MediaType::Ptt,
		MediaType::Document,
		MediaType::Sticker,
	];

	/// Key family used in the HKDF info string.
	///
	/// Stickers share the image keys and voice notes (PTT) share the audio keys.
	pub fn key_family(self) -> &'static str {
		match self {
			MediaType::Image | MediaType::Sticker => "Image",
			MediaType::Video => "Video",
			MediaType::Audio | MediaType::Ptt => "Audio",
			MediaType::Document => "Document",
		}
	}

	/// HKDF info string for this media type, e.g. `"WhatsApp Image Keys"`.
	pub fn hkdf_info(self) -> String {
		format!("WhatsApp {} Keys", self.key_family())
	}

	pub fn as_str(self) -> &'static str {
		match self {
			MediaType::Image => "image",
			MediaType::Video => "video",
			MediaType::Audio => "audio",
			MediaType::Ptt => "ptt",
			MediaType::Document => "document",
			MediaType::Sticker => "sticker",
		}
	}
}

impl fmt::Display for MediaType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error returned when a string does not name a known [`MediaType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMediaType(pub String);

impl fmt::Display for UnknownMediaType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "unknown media type '{}'", self.0)
	}
}

impl std::error::Error for UnknownMediaType {}

impl FromStr for MediaType {
	type Err = UnknownMediaType;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"image" => Ok(MediaType::Image),
			"video" => Ok(MediaType::Video),
			"audio" => Ok(MediaType::Audio),
			"ptt" => Ok(MediaType::Ptt),
			"document" => Ok(MediaType::Document),
			"sticker" => Ok(MediaType::Sticker),
			_ => Err(UnknownMediaType(s.to_string())),
		}
	}
}

/// Key material needed to decrypt one attachment.
///
/// Never persisted; each decrypt call consumes its own copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaKeyMaterial {
	/// Base64 encoded 32-byte media key.
	pub media_key: String,
	#[serde(rename = "type")]
	pub media_type: MediaType,
	/// Size of the plaintext in bytes.
	pub size: u64,
}

impl MediaKeyMaterial {
	pub fn new(media_key: impl Into<String>, media_type: MediaType, size: u64) -> Self {
		Self {
			media_key: media_key.into(),
			media_type,
			size,
		}
	}
}

/// Key material plus the pre-authorized URL of the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRequest {
	#[serde(flatten)]
	pub key: MediaKeyMaterial,
	pub url: String,
}

impl MediaRequest {
	pub fn new(key: MediaKeyMaterial, url: impl Into<String>) -> Self {
		Self { key, url: url.into() }
	}
}

/// Media-bearing message as returned by the remote client.
///
/// Only the fields the decrypt pipeline needs are modelled; everything else
/// the context returns is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMessage {
	#[serde(default)]
	pub id: Option<String>,
	#[serde(rename = "type")]
	pub media_type: MediaType,
	pub media_key: String,
	pub size: u64,
	#[serde(default)]
	pub client_url: Option<String>,
	#[serde(default)]
	pub deprecated_mms3_url: Option<String>,
}

impl MediaMessage {
	/// Returns the URL to download from, preferring `clientUrl`.
	pub fn media_url(&self) -> Option<&str> {
		fn usable(url: &Option<String>) -> Option<&str> {
			url.as_deref().map(str::trim).filter(|url| !url.is_empty())
		}

		usable(&self.client_url).or_else(|| usable(&self.deprecated_mms3_url))
	}

	/// Builds a [`MediaRequest`] when the message carries a usable URL.
	pub fn to_request(&self) -> Option<MediaRequest> {
		let url = self.media_url()?;
		Some(MediaRequest::new(MediaKeyMaterial::new(self.media_key.clone(), self.media_type, self.size), url))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hkdf_info_per_media_type() {
		assert_eq!(MediaType::Image.hkdf_info(), "WhatsApp Image Keys");
		assert_eq!(MediaType::Sticker.hkdf_info(), "WhatsApp Image Keys");
		assert_eq!(MediaType::Video.hkdf_info(), "WhatsApp Video Keys");
		assert_eq!(MediaType::Audio.hkdf_info(), "WhatsApp Audio Keys");
		assert_eq!(MediaType::Ptt.hkdf_info(), "WhatsApp Audio Keys");
		assert_eq!(MediaType::Document.hkdf_info(), "WhatsApp Document Keys");
	}

	#[test]
	fn media_type_parses_case_insensitively() {
		assert_eq!("IMAGE".parse::<MediaType>().unwrap(), MediaType::Image);
		assert_eq!(" ptt ".parse::<MediaType>().unwrap(), MediaType::Ptt);
		assert!("gif".parse::<MediaType>().is_err());
		for media_type in MediaType::ALL {
			assert_eq!(media_type.as_str().parse::<MediaType>().unwrap(), media_type);
		}
	}

	#[test]
	fn media_message_prefers_client_url() {
		let message: MediaMessage = serde_json::from_str(
			r#"{
				"id": "true_123@c.us_ABC",
				"type": "image",
				"mediaKey": "a2V5",
				"size": 10,
				"clientUrl": " https://mmg.example/enc ",
				"deprecatedMms3Url": "https://mms3.example/enc"
			}"#,
		)
		.unwrap();
		assert_eq!(message.media_url(), Some("https://mmg.example/enc"));

		let request = message.to_request().unwrap();
		assert_eq!(request.url, "https://mmg.example/enc");
		assert_eq!(request.key.size, 10);
	}

	#[test]
	fn media_message_falls_back_to_deprecated_url() {
		let message: MediaMessage =
			serde_json::from_str(r#"{"type":"document","mediaKey":"a2V5","size":1,"clientUrl":"","deprecatedMms3Url":"https://mms3.example/enc"}"#).unwrap();
		assert_eq!(message.media_url(), Some("https://mms3.example/enc"));

		let missing: MediaMessage = serde_json::from_str(r#"{"type":"video","mediaKey":"a2V5","size":1}"#).unwrap();
		assert!(missing.to_request().is_none());
	}

	#[test]
	fn media_request_flattens_key_material() {
		let request = MediaRequest::new(MediaKeyMaterial::new("a2V5", MediaType::Audio, 42), "https://mmg.example/x");
		let json = serde_json::to_value(&request).unwrap();
		assert_eq!(json["mediaKey"], "a2V5");
		assert_eq!(json["type"], "audio");
		assert_eq!(json["size"], 42);
		assert_eq!(json["url"], "https://mmg.example/x");
	}
}
