//! Media key derivation and AES-256-CBC decryption.
//!
//! The per-message key schedule is HKDF-SHA256 over the raw 32-byte media
//! key with a zero salt and a `"WhatsApp {Family} Keys"` info string,
//! expanded to 112 bytes: `iv[0..16] | cipher_key[16..48] | mac_key[48..80] | ref_key[80..112]`.
//!
//! Ciphertext is decrypted block by block without validating any padding.
//! Only whole 16-byte blocks are decrypted; a trailing partial block (the
//! MAC tail of a downloaded file) is ignored. The plaintext is then
//! reconciled against the size announced in the message, see
//! [`reconcile_padding`].

use std::fmt;

use aes::Aes256;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use futures_util::future;
use futures_util::{Stream, StreamExt};
use hkdf::Hkdf;
use sha2::Sha256;
use tracing::{debug, trace};
use wa_protocol::{MediaKeyMaterial, MediaType};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::DecryptError;

type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub const MEDIA_KEY_LEN: usize = 32;
pub const EXPANDED_KEY_LEN: usize = 112;
const BLOCK_LEN: usize = 16;
const HKDF_SALT: [u8; 32] = [0; 32];

/// The 112-byte HKDF output for one message. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ExpandedKeySchedule([u8; EXPANDED_KEY_LEN]);

impl ExpandedKeySchedule {
	pub fn iv(&self) -> &[u8] {
		&self.0[..16]
	}

	pub fn cipher_key(&self) -> &[u8] {
		&self.0[16..48]
	}

	/// Unused by decryption.
	pub fn mac_key(&self) -> &[u8] {
		&self.0[48..80]
	}

	/// Unused by decryption.
	pub fn ref_key(&self) -> &[u8] {
		&self.0[80..]
	}

	pub fn as_bytes(&self) -> &[u8; EXPANDED_KEY_LEN] {
		&self.0
	}

	fn decryptor(&self) -> Result<Aes256CbcDec, DecryptError> {
		Aes256CbcDec::new_from_slices(self.cipher_key(), self.iv()).map_err(|_| DecryptError::KeyDerivation)
	}
}

impl fmt::Debug for ExpandedKeySchedule {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("ExpandedKeySchedule(..)")
	}
}

/// Stateless entry points for key derivation and decryption.
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaCipher;

impl MediaCipher {
	/// Expands a base64 media key into the key schedule for `media_type`.
	pub fn derive(media_key_b64: &str, media_type: MediaType) -> Result<ExpandedKeySchedule, DecryptError> {
		let media_key = Zeroizing::new(STANDARD.decode(media_key_b64.trim())?);
		if media_key.len() != MEDIA_KEY_LEN {
			return Err(DecryptError::KeyLength(media_key.len()));
		}

		let hkdf = Hkdf::<Sha256>::new(Some(&HKDF_SALT), &media_key);
		let mut okm = [0u8; EXPANDED_KEY_LEN];
		hkdf.expand(media_type.hkdf_info().as_bytes(), &mut okm)
			.map_err(|_| DecryptError::KeyDerivation)?;

		let schedule = ExpandedKeySchedule(okm);
		okm.zeroize();
		Ok(schedule)
	}

	/// Decrypts a fully buffered ciphertext and reconciles it to `key.size`.
	pub fn decrypt(ciphertext: &[u8], key: &MediaKeyMaterial) -> Result<Vec<u8>, DecryptError> {
		let schedule = Self::derive(&key.media_key, key.media_type)?;
		let decoded = decrypt_blocks(&schedule, ciphertext)?;
		let decoded_len = decoded.len();
		let plaintext = reconcile_padding(decoded, key.size);

		debug!(
			target = "wa.media",
			media_type = %key.media_type,
			ciphertext = ciphertext.len(),
			decoded = decoded_len,
			plaintext = plaintext.len(),
			"decrypted media buffer"
		);
		Ok(plaintext)
	}

	/// Starts an incremental decryption of a ciphertext of any chunking.
	pub fn stream_decryptor(key: &MediaKeyMaterial) -> Result<StreamDecryptor, DecryptError> {
		let schedule = Self::derive(&key.media_key, key.media_type)?;
		Ok(StreamDecryptor {
			cipher: schedule.decryptor()?,
			carry: Vec::with_capacity(BLOCK_LEN),
			progress: CipherProgress {
				processed_bytes: 0,
				expected_size: key.size,
			},
		})
	}

	/// Decrypts a ciphertext stream into a plaintext stream of exactly `key.size` bytes.
	///
	/// Upstream errors are forwarded as [`DecryptError::Stream`] items; the
	/// stream itself keeps going so the consumer decides whether to stop.
	pub fn decrypt_stream<S, B, E>(
		ciphertext: S,
		key: &MediaKeyMaterial,
	) -> Result<impl Stream<Item = Result<Bytes, DecryptError>> + Send + use<S, B, E>, DecryptError>
	where
		S: Stream<Item = Result<B, E>> + Send,
		B: AsRef<[u8]>,
		E: fmt::Display,
	{
		let mut decryptor = Self::stream_decryptor(key)?;

		let plaintext = ciphertext
			.map(move |item| match item {
				Ok(chunk) => Ok(Bytes::from(decryptor.update(chunk.as_ref()))),
				Err(err) => Err(DecryptError::Stream(err.to_string())),
			})
			.filter(|item| future::ready(!matches!(item, Ok(chunk) if chunk.is_empty())));

		Ok(plaintext)
	}
}

/// Running totals of a streaming decryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherProgress {
	/// Plaintext bytes emitted so far.
	pub processed_bytes: u64,
	pub expected_size: u64,
}

impl CipherProgress {
	pub fn is_complete(&self) -> bool {
		self.processed_bytes >= self.expected_size
	}
}

/// One persistent CBC decryptor fed with arbitrary chunks.
///
/// Bytes that do not yet fill a block are carried into the next call. Output
/// stops once `expected_size` plaintext bytes have been emitted.
pub struct StreamDecryptor {
	cipher: Aes256CbcDec,
	carry: Vec<u8>,
	progress: CipherProgress,
}

impl StreamDecryptor {
	/// Feeds one ciphertext chunk and returns the plaintext it completes.
	pub fn update(&mut self, chunk: &[u8]) -> Vec<u8> {
		if self.progress.is_complete() {
			return Vec::new();
		}

		self.carry.extend_from_slice(chunk);
		let whole = self.carry.len() - self.carry.len() % BLOCK_LEN;
		if whole == 0 {
			return Vec::new();
		}

		let mut out: Vec<u8> = self.carry.drain(..whole).collect();
		for block in out.chunks_exact_mut(BLOCK_LEN) {
			self.cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
		}

		let remaining = self.progress.expected_size - self.progress.processed_bytes;
		if out.len() as u64 > remaining {
			trace!(target = "wa.media", dropped = out.len() as u64 - remaining, "truncating final plaintext chunk");
			out.truncate(remaining as usize);
		}
		self.progress.processed_bytes += out.len() as u64;
		out
	}

	pub fn progress(&self) -> CipherProgress {
		self.progress
	}

	/// Ciphertext bytes held back because they do not fill a block.
	pub fn pending_bytes(&self) -> usize {
		self.carry.len()
	}
}

impl fmt::Debug for StreamDecryptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("StreamDecryptor")
			.field("progress", &self.progress)
			.field("pending", &self.carry.len())
			.finish_non_exhaustive()
	}
}

/// Decrypts every whole block of `ciphertext`, ignoring a trailing partial block.
pub fn decrypt_blocks(schedule: &ExpandedKeySchedule, ciphertext: &[u8]) -> Result<Vec<u8>, DecryptError> {
	let mut cipher = schedule.decryptor()?;
	let whole = ciphertext.len() - ciphertext.len() % BLOCK_LEN;

	let mut out = ciphertext[..whole].to_vec();
	for block in out.chunks_exact_mut(BLOCK_LEN) {
		cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
	}
	Ok(out)
}

/// Reconciles decrypted bytes with the announced plaintext size.
///
/// With `pad = (16 - size % 16) % 16`:
/// * `decoded` is exactly `pad` bytes too long: the excess is dropped.
/// * `decoded` is exactly `pad` bytes too short: `pad` bytes valued `pad` are appended.
/// * Anything else is returned untouched.
pub fn reconcile_padding(mut decoded: Vec<u8>, expected_size: u64) -> Vec<u8> {
	let pad = ((BLOCK_LEN as u64 - expected_size % BLOCK_LEN as u64) % BLOCK_LEN as u64) as usize;
	if pad == 0 {
		return decoded;
	}

	let len = decoded.len() as u64;
	if len == expected_size + pad as u64 {
		decoded.truncate(expected_size as usize);
	} else if len + pad as u64 == expected_size {
		decoded.resize(decoded.len() + pad, pad as u8);
	}
	decoded
}
