use std::path::Path;
use std::process::Command;

use aes::Aes256;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use serde_json::Value;
use tempfile::TempDir;
use wa::{MediaCipher, MediaType};

/// Key bytes 0..=31.
const KEY_B64: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";
const PLAINTEXT: &[u8] = b"hello, media pipeline!";
const CIPHERTEXT_HEX: &str = "e9d2bec2b9186fb5b7edca2fcc3c07c3e20f0d01a7bbfc30d25f06dc6315530d";

fn run_wa(workdir: &Path, args: &[&str]) -> (bool, Value, String) {
	let output = Command::new(env!("CARGO_BIN_EXE_wa"))
		.current_dir(workdir)
		.args(args)
		.output()
		.expect("failed to execute wa");

	let stdout = String::from_utf8_lossy(&output.stdout).to_string();
	let stderr = String::from_utf8_lossy(&output.stderr).to_string();
	let json = serde_json::from_str(&stdout).unwrap_or_else(|_| Value::String(stdout));
	(output.status.success(), json, stderr)
}

fn unhex(hex: &str) -> Vec<u8> {
	(0..hex.len()).step_by(2).map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap()).collect()
}

#[test]
fn decrypts_known_document() {
	let tmp = TempDir::new().expect("temp dir should be created");
	std::fs::write(tmp.path().join("doc.enc"), unhex(CIPHERTEXT_HEX)).unwrap();

	let size = PLAINTEXT.len().to_string();
	let (success, json, stderr) = run_wa(
		tmp.path(),
		&[
			"media", "decrypt", "-i", "doc.enc", "--key", KEY_B64, "--type", "document", "--size", &size, "-o", "doc.txt",
		],
	);

	assert!(success, "media decrypt failed: {stderr}");
	assert_eq!(json["ok"], true);
	assert_eq!(json["command"], "media.decrypt");
	assert_eq!(json["data"]["bytes"], PLAINTEXT.len());
	assert_eq!(json["data"]["mediaType"], "document");
	assert_eq!(std::fs::read(tmp.path().join("doc.txt")).unwrap(), PLAINTEXT);
}

#[test]
fn decrypts_sticker_with_trailing_mac() {
	let tmp = TempDir::new().expect("temp dir should be created");
	let plaintext: Vec<u8> = (0..1000u32).map(|i| (i * 7 % 251) as u8).collect();
	let key_b64 = STANDARD.encode([42u8; 32]);

	let schedule = MediaCipher::derive(&key_b64, MediaType::Sticker).unwrap();
	let mut padded = plaintext.clone();
	padded.resize(1008, 8);
	let mut encrypted = cbc::Encryptor::<Aes256>::new_from_slices(schedule.cipher_key(), schedule.iv())
		.unwrap()
		.encrypt_padded_vec_mut::<NoPadding>(&padded);
	encrypted.extend_from_slice(&[0xEE; 10]);
	std::fs::write(tmp.path().join("sticker.enc"), encrypted).unwrap();

	let (success, json, stderr) = run_wa(
		tmp.path(),
		&[
			"media", "decrypt", "-i", "sticker.enc", "--key", &key_b64, "--type", "sticker", "--size", "1000", "-o", "sticker.webp",
		],
	);

	assert!(success, "media decrypt failed: {stderr}");
	assert_eq!(json["data"]["bytes"], 1000);
	assert_eq!(std::fs::read(tmp.path().join("sticker.webp")).unwrap(), plaintext);
}

#[test]
fn bad_key_reports_invalid_key() {
	let tmp = TempDir::new().expect("temp dir should be created");
	std::fs::write(tmp.path().join("doc.enc"), unhex(CIPHERTEXT_HEX)).unwrap();
	let short_key = STANDARD.encode([1u8; 16]);

	let (success, json, _) = run_wa(
		tmp.path(),
		&[
			"media", "decrypt", "-i", "doc.enc", "--key", &short_key, "--type", "image", "--size", "22", "-o", "out.bin",
		],
	);

	assert!(!success);
	assert_eq!(json["ok"], false);
	assert_eq!(json["error"]["code"], "INVALID_KEY");
}

#[test]
fn missing_input_reports_io_error() {
	let tmp = TempDir::new().expect("temp dir should be created");

	let (success, json, _) = run_wa(
		tmp.path(),
		&[
			"media", "decrypt", "-i", "nope.enc", "--key", KEY_B64, "--type", "image", "--size", "1", "-o", "out.bin",
		],
	);

	assert!(!success);
	assert_eq!(json["error"]["code"], "IO_ERROR");
}

#[test]
fn config_show_merges_file_with_defaults() {
	let tmp = TempDir::new().expect("temp dir should be created");
	std::fs::write(
		tmp.path().join("wa.json"),
		r#"{"session": {"session": "sales", "phone_number": "5511999999999"}, "download": {"max_retries": 5}}"#,
	)
	.unwrap();

	let (success, json, stderr) = run_wa(tmp.path(), &["--config", "wa.json", "config", "show"]);

	assert!(success, "config show failed: {stderr}");
	let config = &json["data"]["config"];
	assert_eq!(config["session"]["session"], "sales");
	assert_eq!(config["session"]["phone_number"], "5511999999999");
	assert_eq!(config["session"]["auth_poll_ms"], 200);
	assert_eq!(config["download"]["max_retries"], 5);
	assert_eq!(config["download"]["retry_delay_ms"], 5000);
}

#[test]
fn invalid_config_fails_cleanly() {
	let tmp = TempDir::new().expect("temp dir should be created");
	std::fs::write(tmp.path().join("wa.json"), r#"{"session": {"session": "  "}}"#).unwrap();

	let (success, json, _) = run_wa(tmp.path(), &["--config", "wa.json", "config", "show"]);

	assert!(!success);
	assert_eq!(json["error"]["code"], "INVALID_CONFIG");
}
