//! Pairing attempts and their de-duplication.

use std::time::SystemTime;

use qrcode::{Color, QrCode};

/// How the account is being linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingKind {
	/// A QR payload to be scanned from the phone.
	Qr,
	/// A numeric code to be typed on the phone.
	LinkCode,
}

/// One observed pairing code. A new code supersedes the previous attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingAttempt {
	pub kind: PairingKind,
	/// QR payload or numeric link code.
	pub code: String,
	/// Rendered QR canvas as a data URL, when the context produced one.
	pub image: Option<String>,
	/// QR as terminal art, only rendered when someone will look at it.
	pub rendered: Option<String>,
	/// 1-based count of distinct codes seen since the last authentication.
	pub attempt_number: u32,
	pub observed_at: SystemTime,
}

/// Remembers the last pairing code so each distinct code is reported once.
#[derive(Debug, Default)]
pub(crate) struct PairingTracker {
	last_code: Option<String>,
	/// Code whose link-code request is still outstanding.
	in_flight: Option<String>,
	attempts: u32,
}

impl PairingTracker {
	/// Records `code` and returns its attempt number, or `None` if it was
	/// already the last code observed.
	pub(crate) fn observe(&mut self, code: &str) -> Option<u32> {
		if self.last_code.as_deref() == Some(code) {
			return None;
		}
		self.last_code = Some(code.to_string());
		self.attempts += 1;
		Some(self.attempts)
	}

	/// Reserves `code` while its link-code request runs. The code only counts
	/// as observed once [`confirm`](Self::confirm) is called, so a failed
	/// request is retried on the next poll.
	pub(crate) fn claim(&mut self, code: &str) -> bool {
		if self.last_code.as_deref() == Some(code) || self.in_flight.as_deref() == Some(code) {
			return false;
		}
		self.in_flight = Some(code.to_string());
		true
	}

	/// Records a claimed code as observed and returns its attempt number.
	pub(crate) fn confirm(&mut self, code: &str) -> Option<u32> {
		self.release(code);
		self.observe(code)
	}

	/// Drops the claim on `code` without observing it.
	pub(crate) fn release(&mut self, code: &str) {
		if self.in_flight.as_deref() == Some(code) {
			self.in_flight = None;
		}
	}

	/// Discards pairing progress once the device is registered.
	pub(crate) fn reset(&mut self) {
		self.attempts = 0;
	}

	pub(crate) fn attempts(&self) -> u32 {
		self.attempts
	}
}

/// Renders `data` as a QR code using half-block characters, two modules per row.
///
/// Returns `None` if the payload does not fit in a QR code.
pub fn render_qr(data: &str) -> Option<String> {
	let code = QrCode::new(data.as_bytes()).ok()?;
	let size = code.width();
	let colors = code.to_colors();
	let quiet_zone = 2;
	let total = size + quiet_zone * 2;

	let dark = |x: usize, y: usize| -> bool {
		if x < quiet_zone || y < quiet_zone {
			return false;
		}
		let (qx, qy) = (x - quiet_zone, y - quiet_zone);
		qx < size && qy < size && colors[qy * size + qx] == Color::Dark
	};

	let mut out = String::with_capacity(total * total.div_ceil(2) * 3);
	for row in 0..total.div_ceil(2) {
		let (upper, lower) = (row * 2, row * 2 + 1);
		for x in 0..total {
			out.push(match (dark(x, upper), lower < total && dark(x, lower)) {
				(true, true) => '█',
				(true, false) => '▀',
				(false, true) => '▄',
				(false, false) => ' ',
			});
		}
		out.push('\n');
	}
	Some(out)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn identical_codes_are_reported_once() {
		let mut tracker = PairingTracker::default();
		assert_eq!(tracker.observe("2@aaa"), Some(1));
		assert_eq!(tracker.observe("2@aaa"), None);
		assert_eq!(tracker.observe("2@bbb"), Some(2));
		assert_eq!(tracker.observe("2@aaa"), Some(3));
		assert_eq!(tracker.attempts(), 3);
	}

	#[test]
	fn reset_restarts_attempt_numbers_but_keeps_last_code() {
		let mut tracker = PairingTracker::default();
		tracker.observe("2@aaa");
		tracker.reset();

		assert_eq!(tracker.observe("2@aaa"), None);
		assert_eq!(tracker.observe("2@ccc"), Some(1));
	}

	#[test]
	fn claimed_code_counts_only_once_confirmed() {
		let mut tracker = PairingTracker::default();
		assert!(tracker.claim("2@aaa"));
		assert!(!tracker.claim("2@aaa"));

		tracker.release("2@aaa");
		assert_eq!(tracker.attempts(), 0);
		assert!(tracker.claim("2@aaa"));

		assert_eq!(tracker.confirm("2@aaa"), Some(1));
		assert!(!tracker.claim("2@aaa"));
		assert!(tracker.claim("2@bbb"));
	}

	#[test]
	fn renders_square_half_block_art() {
		let art = render_qr("2@abcdef,ghijkl,mnopqr").unwrap();
		let lines: Vec<&str> = art.lines().collect();

		let width = lines[0].chars().count();
		assert!(lines.iter().all(|line| line.chars().count() == width));
		assert_eq!(lines.len(), width.div_ceil(2));
		assert!(art.contains('█'));
	}
}
