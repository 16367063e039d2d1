//! Cancellable countdown timers.
//!
//! A [`Watchdog`] counts down in fixed ticks on a background task. On every
//! tick it asks its guard whether the awaited condition is still pending; a
//! guard returning `false` (condition met, context gone) retires the watchdog
//! silently. When the countdown reaches zero while still pending, the expiry
//! action runs exactly once.
//!
//! Cancelling is idempotent, and dropping a [`Watchdog`] cancels it.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Handle to a running countdown.
#[derive(Debug)]
pub struct Watchdog {
	name: &'static str,
	duration: Duration,
	started: Instant,
	token: CancellationToken,
	fired: Arc<AtomicBool>,
}

impl Watchdog {
	/// Starts a countdown of `duration`, ticking every `tick`.
	///
	/// `still_pending` is consulted on every tick and right before expiry;
	/// `on_expire` runs at most once, on the watchdog task.
	pub fn spawn<G, F, Fut>(name: &'static str, duration: Duration, tick: Duration, still_pending: G, on_expire: F) -> Self
	where
		G: Fn() -> bool + Send + 'static,
		F: FnOnce() -> Fut + Send + 'static,
		Fut: Future<Output = ()> + Send + 'static,
	{
		let token = CancellationToken::new();
		let fired = Arc::new(AtomicBool::new(false));
		let tick = if tick.is_zero() { Duration::from_secs(1) } else { tick };

		info!(target = "wa.watchdog", watchdog = name, seconds = duration.as_secs(), "watchdog armed");

		let task_token = token.clone();
		let task_fired = Arc::clone(&fired);
		tokio::spawn(async move {
			let mut remaining = duration;
			loop {
				let step = tick.min(remaining);
				tokio::select! {
					biased;
					_ = task_token.cancelled() => return,
					_ = tokio::time::sleep(step) => {}
				}

				if !still_pending() {
					debug!(target = "wa.watchdog", watchdog = name, "condition settled; watchdog retired");
					task_token.cancel();
					return;
				}

				remaining = remaining.saturating_sub(step);
				if remaining.is_zero() {
					break;
				}

				let secs = remaining.as_secs();
				if secs % 10 == 0 || secs <= 5 {
					info!(target = "wa.watchdog", watchdog = name, remaining_secs = secs, "watchdog counting down");
				}
			}

			if task_token.is_cancelled() {
				return;
			}
			task_fired.store(true, Ordering::SeqCst);
			task_token.cancel();
			info!(target = "wa.watchdog", watchdog = name, "watchdog expired");
			on_expire().await;
		});

		Self {
			name,
			duration,
			started: Instant::now(),
			token,
			fired,
		}
	}

	pub fn name(&self) -> &'static str {
		self.name
	}

	pub fn duration(&self) -> Duration {
		self.duration
	}

	/// Time left before expiry, zero once expired or cancelled.
	pub fn remaining(&self) -> Duration {
		if self.is_active() {
			self.duration.saturating_sub(self.started.elapsed())
		} else {
			Duration::ZERO
		}
	}

	pub fn is_active(&self) -> bool {
		!self.token.is_cancelled()
	}

	pub fn has_fired(&self) -> bool {
		self.fired.load(Ordering::SeqCst)
	}

	/// Stops the countdown. Returns `true` if this call stopped an active watchdog.
	pub fn cancel(&self) -> bool {
		if self.token.is_cancelled() {
			return false;
		}
		self.token.cancel();
		debug!(target = "wa.watchdog", watchdog = self.name, "watchdog cancelled");
		true
	}
}

impl Drop for Watchdog {
	fn drop(&mut self) {
		self.token.cancel();
	}
}
