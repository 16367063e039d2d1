//! Session controller: drives the remote context from cold start to a
//! synced, in-chat state and keeps that state observable.
//!
//! The controller reconciles two sources of truth: its own poll loops
//! (registration, pairing code, main-ready) and notifications the context
//! pushes through the host event bus. Every state-entry notification is
//! de-duplicated against the last value reported, so a push racing a poll
//! never produces the same status twice.
//!
//! Probe failures are expected while the context navigates; they read as
//! "unknown" and are retried on the next tick. Only the login orchestration
//! ([`ConnectionController::wait_for_login`]) reports failures upward.

pub mod hooks;
pub mod pairing;
pub mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use wa_protocol::{HOST_DISPATCH_FN, HostEvent, LinkCodeRequest, PairingPayload, StatusEvent, StatusUpdate, scripts};
use wa_runtime::{
	BridgeError, BridgeExt, ContextLifecycle, HostCallable, HostEventReceiver, RemoteContextBridge, WaitOptions, WaitOutcome,
	Watchdog, host_event_bus,
};

pub use hooks::SessionHooks;
pub use pairing::{PairingAttempt, PairingKind, render_qr};
pub use state::{SessionState, Trigger};

use crate::config::SessionOptions;
use crate::error::{Error, Result, SessionFailure};
use pairing::PairingTracker;

/// Pause between the end of a scan and the follow-up registration check.
const INTERFACE_SETTLE: Duration = Duration::from_millis(200);
const LIBRARY_READY_POLL: Duration = Duration::from_millis(200);
/// Grace period before logging in again after the account was unpaired.
const RELOGIN_DELAY: Duration = Duration::from_secs(2);

/// The two countdowns a session can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchdogPurpose {
	/// Idle close while waiting for login.
	AutoClose,
	/// Bound on the post-authentication sync.
	DeviceSync,
}

impl WatchdogPurpose {
	pub fn as_str(self) -> &'static str {
		match self {
			WatchdogPurpose::AutoClose => "auto-close",
			WatchdogPurpose::DeviceSync => "device-sync",
		}
	}
}

#[derive(Debug)]
struct Inner {
	state: SessionState,
	is_logged: bool,
	in_chat: bool,
	in_chat_notified: bool,
	auto_close_called: bool,
	/// Set once a login has run to completion; gates re-login.
	login_completed: bool,
	/// Last registration value known to the external notifier.
	registered: Option<bool>,
	pairing: PairingTracker,
	/// Last startup progress reported, as `(percent, message)`.
	last_progress: Option<(u32, String)>,
	auto_close: Option<Watchdog>,
	device_sync: Option<Watchdog>,
}

impl Inner {
	fn watchdog(&mut self, purpose: WatchdogPurpose) -> &mut Option<Watchdog> {
		match purpose {
			WatchdogPurpose::AutoClose => &mut self.auto_close,
			WatchdogPurpose::DeviceSync => &mut self.device_sync,
		}
	}
}

/// State machine for one remote session. Exclusively drives its bridge.
pub struct ConnectionController {
	session: String,
	bridge: Arc<dyn RemoteContextBridge>,
	options: SessionOptions,
	hooks: SessionHooks,
	started: AtomicBool,
	relogin_running: AtomicBool,
	inner: Mutex<Inner>,
	host_callable: HostCallable,
	host_events: Mutex<Option<HostEventReceiver<HostEvent>>>,
	injected: watch::Sender<bool>,
	stop: CancellationToken,
}

impl ConnectionController {
	pub fn new(session: impl Into<String>, bridge: Arc<dyn RemoteContextBridge>, options: SessionOptions, hooks: SessionHooks) -> Arc<Self> {
		let session = session.into();
		let (host_callable, host_events) = host_event_bus::<HostEvent>();
		let (injected, _) = watch::channel(false);

		info!(target = "wa.session", session = %session, "initializing session controller");

		Arc::new(Self {
			session,
			bridge,
			options,
			hooks,
			started: AtomicBool::new(false),
			relogin_running: AtomicBool::new(false),
			inner: Mutex::new(Inner {
				state: SessionState::Initializing,
				is_logged: false,
				in_chat: false,
				in_chat_notified: false,
				auto_close_called: false,
				login_completed: false,
				registered: None,
				pairing: PairingTracker::default(),
				last_progress: None,
				auto_close: None,
				device_sync: None,
			}),
			host_callable,
			host_events: Mutex::new(Some(host_events)),
			injected,
			stop: CancellationToken::new(),
		})
	}

	pub fn session(&self) -> &str {
		&self.session
	}

	pub fn options(&self) -> &SessionOptions {
		&self.options
	}

	/// Handle to the bridge, for one-shot commands.
	pub fn bridge(&self) -> Arc<dyn RemoteContextBridge> {
		Arc::clone(&self.bridge)
	}

	pub fn state(&self) -> SessionState {
		self.inner.lock().state
	}

	pub fn is_logged(&self) -> bool {
		self.inner.lock().is_logged
	}

	pub fn is_in_chat(&self) -> bool {
		self.inner.lock().in_chat
	}

	pub fn is_injected(&self) -> bool {
		*self.injected.borrow()
	}

	pub fn auto_close_called(&self) -> bool {
		self.inner.lock().auto_close_called
	}

	pub fn pairing_attempts(&self) -> u32 {
		self.inner.lock().pairing.attempts()
	}

	pub fn watchdog_active(&self, purpose: WatchdogPurpose) -> bool {
		self.inner.lock().watchdog(purpose).as_ref().is_some_and(Watchdog::is_active)
	}

	/// Starts the controller. Only the first call on an instance does anything.
	///
	/// Spawns the dispatcher that injects the remote library (now and on every
	/// reload) and handles host events, plus the health and registration loops.
	pub async fn start(self: &Arc<Self>) -> Result<()> {
		if self.started.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
			debug!(target = "wa.session", session = %self.session, "start ignored; already started");
			return Ok(());
		}
		if self.bridge.is_closed() {
			return Err(Error::Bridge(BridgeError::ContextClosed));
		}

		self.apply(Trigger::Start);

		let lifecycle = self.bridge.lifecycle();
		let events = self.host_events.lock().take();
		let Some(events) = events else {
			return Err(Error::session(&self.session, SessionFailure::Unknown));
		};

		tokio::spawn(run_dispatcher(Arc::downgrade(self), lifecycle, events, self.stop.clone()));

		if !self.options.health_tick().is_zero() {
			tokio::spawn(run_health_tick(Arc::downgrade(self), self.options.health_tick(), self.stop.clone()));
		}
		if !self.options.registration_poll().is_zero() {
			tokio::spawn(run_registration_monitor(
				Arc::downgrade(self),
				self.options.registration_poll(),
				self.stop.clone(),
			));
		}

		info!(target = "wa.session", session = %self.session, "session started");
		Ok(())
	}

	/// Re-registers the host event bus and re-runs injection after a (re)load.
	pub async fn on_context_loaded(&self) {
		debug!(target = "wa.session", session = %self.session, "context loaded; injecting");
		self.injected.send_replace(false);

		if let Err(err) = self.inject().await {
			warn!(target = "wa.session", session = %self.session, error = %err, "library injection failed");
			return;
		}
		debug!(target = "wa.session", session = %self.session, "library injected");

		self.after_injection().await;
		self.injected.send_replace(true);
	}

	async fn inject(&self) -> std::result::Result<(), BridgeError> {
		self.bridge.register_callable(HOST_DISPATCH_FN, Arc::clone(&self.host_callable)).await?;

		let config = json!({
			"deviceName": self.options.device_name,
			"poweredBy": self.options.powered_by,
		});
		self.bridge.run_in_context(scripts::SET_CONFIG, config).await?;
		self.bridge.run_in_context(scripts::INJECT_LIBRARY, json!({ "url": self.options.library_url })).await?;

		let wait = WaitOptions::new(self.options.inject_timeout(), LIBRARY_READY_POLL);
		match self.bridge.wait_until(scripts::LIBRARY_READY, wait).await? {
			WaitOutcome::Satisfied => Ok(()),
			WaitOutcome::TimedOut => Err(BridgeError::Evaluation(format!(
				"library not ready after {}ms",
				self.options.inject_timeout_ms
			))),
		}
	}

	async fn after_injection(&self) {
		match self.bridge.evaluate::<Option<String>>(scripts::CLIENT_VERSION, Value::Null).await {
			Ok(Some(version)) => info!(target = "wa.session", session = %self.session, %version, "remote client version"),
			Ok(None) => {}
			Err(err) => trace!(target = "wa.session", error = %err, "client version unavailable"),
		}
		match self.bridge.evaluate::<Option<String>>(scripts::LIBRARY_VERSION, Value::Null).await {
			Ok(Some(version)) => info!(target = "wa.session", session = %self.session, %version, "remote library version"),
			Ok(None) => {}
			Err(err) => trace!(target = "wa.session", error = %err, "library version unavailable"),
		}

		if let Err(err) = self.bridge.run_in_context(scripts::SUBSCRIBE_HOST_EVENTS, Value::Null).await {
			debug!(target = "wa.session", session = %self.session, error = %err, "host event subscription failed");
		}

		if self.check_auth_state().await == Some(false) {
			self.poll_pairing().await;
		}
	}

	/// Waits until injection has completed. Returns `false` if the controller stopped first.
	pub async fn wait_until_injected(&self) -> bool {
		let mut injected = self.injected.subscribe();
		tokio::select! {
			biased;
			_ = self.stop.cancelled() => false,
			ready = injected.wait_for(|done| *done) => ready.is_ok(),
		}
	}

	/// Probes registration. `None` means the probe failed and nothing is known.
	pub async fn check_auth_state(&self) -> Option<bool> {
		let registered = match self.bridge.probe(scripts::IS_REGISTERED).await {
			Ok(registered) => registered,
			Err(err) => {
				trace!(target = "wa.session", session = %self.session, error = %err, "registration probe failed");
				return None;
			}
		};

		let trigger = {
			let mut inner = self.inner.lock();
			inner.is_logged = registered;
			if registered {
				inner.pairing.reset();
				inner.registered = Some(true);
			} else if inner.registered.is_none() {
				inner.registered = Some(false);
			}

			if inner.state == SessionState::Injecting {
				Some(Trigger::Injected { registered })
			} else if registered {
				Some(Trigger::Registered)
			} else {
				None
			}
		};
		if let Some(trigger) = trigger {
			self.apply(trigger);
		}
		Some(registered)
	}

	/// Checks registration every auth poll until an answer comes back.
	///
	/// `None` only when the context closed or the controller stopped first.
	async fn settled_auth_state(&self) -> Option<bool> {
		loop {
			if let Some(registered) = self.check_auth_state().await {
				return Some(registered);
			}
			if self.bridge.is_closed() || !self.pause(self.options.auth_poll()).await {
				return None;
			}
			debug!(target = "wa.session", session = %self.session, "registration unknown; checking again");
		}
	}

	/// Reads the current pairing payload and reports it if it is new.
	///
	/// Does nothing once registered. With a configured phone number a
	/// numeric link code is requested for each new payload instead of a QR.
	pub async fn poll_pairing(&self) -> Option<PairingAttempt> {
		if self.check_auth_state().await != Some(false) {
			return None;
		}

		let payload = match self.bridge.evaluate::<Option<PairingPayload>>(scripts::PAIRING_PAYLOAD, Value::Null).await {
			Ok(payload) => payload.filter(PairingPayload::has_code)?,
			Err(err) => {
				trace!(target = "wa.pairing", session = %self.session, error = %err, "pairing payload unavailable");
				return None;
			}
		};

		if let Some(phone) = self.options.phone_number.clone() {
			return self.pair_by_link_code(&phone, &payload.url_code).await;
		}

		let attempt_number = self.inner.lock().pairing.observe(&payload.url_code)?;
		self.apply(Trigger::NewPairingCode);

		let rendered = if self.options.log_qr || self.hooks.on_pairing.is_some() {
			render_qr(&payload.url_code)
		} else {
			None
		};

		if self.options.log_qr {
			info!(
				target = "wa.pairing",
				session = %self.session,
				attempt = attempt_number,
				"waiting for QR scan\n{}",
				rendered.as_deref().unwrap_or_default()
			);
		} else {
			debug!(target = "wa.pairing", session = %self.session, attempt = attempt_number, "waiting for QR scan");
		}

		let attempt = PairingAttempt {
			kind: PairingKind::Qr,
			code: payload.url_code,
			image: payload.base64_image,
			rendered,
			attempt_number,
			observed_at: SystemTime::now(),
		};
		if let Some(callback) = &self.hooks.on_pairing {
			callback(&attempt);
		}
		Some(attempt)
	}

	/// Requests a link code for the pairing payload `url_code`. The payload
	/// only counts as seen once the request succeeds.
	async fn pair_by_link_code(&self, phone: &str, url_code: &str) -> Option<PairingAttempt> {
		if !self.inner.lock().pairing.claim(url_code) {
			return None;
		}

		let Some(code) = self.request_link_code(phone).await else {
			self.inner.lock().pairing.release(url_code);
			return None;
		};
		let attempt_number = self.inner.lock().pairing.confirm(url_code)?;
		self.apply(Trigger::NewPairingCode);

		if self.options.log_qr {
			info!(target = "wa.pairing", session = %self.session, %code, "waiting for login by code");
		} else {
			debug!(target = "wa.pairing", session = %self.session, attempt = attempt_number, "waiting for login by code");
		}
		if let Some(callback) = &self.hooks.on_link_code {
			callback(&code);
		}

		Some(PairingAttempt {
			kind: PairingKind::LinkCode,
			code,
			image: None,
			rendered: None,
			attempt_number,
			observed_at: SystemTime::now(),
		})
	}

	async fn request_link_code(&self, phone: &str) -> Option<String> {
		let request = LinkCodeRequest { phone: phone.to_string() };
		let arg = match serde_json::to_value(&request) {
			Ok(arg) => arg,
			Err(err) => {
				warn!(target = "wa.pairing", session = %self.session, error = %err, "could not encode link code request");
				return None;
			}
		};

		match self.bridge.evaluate::<String>(scripts::LINK_DEVICE_CODE, arg).await {
			Ok(code) => Some(code),
			Err(err) => {
				warn!(target = "wa.pairing", session = %self.session, error = %err, "link code request failed");
				None
			}
		}
	}

	/// Probes main-ready; the first positive answer moves the session in-chat.
	pub async fn check_in_chat(&self) -> bool {
		match self.bridge.probe(scripts::IS_MAIN_READY).await {
			Ok(true) => {
				self.mark_in_chat();
				true
			}
			Ok(false) => false,
			Err(err) => {
				trace!(target = "wa.session", session = %self.session, error = %err, "main-ready probe failed");
				false
			}
		}
	}

	fn mark_in_chat(&self) {
		let first = {
			let mut inner = self.inner.lock();
			inner.in_chat = true;
			!std::mem::replace(&mut inner.in_chat_notified, true)
		};
		self.apply(Trigger::MainReady);
		if first {
			info!(target = "wa.session", session = %self.session, "connected");
			self.emit(StatusEvent::InChat);
		}
	}

	/// Polls registration until it is observed, or the context closes.
	pub async fn wait_for_authentication(&self) -> bool {
		loop {
			if self.is_logged() {
				return true;
			}
			if self.bridge.is_closed() || !self.pause(self.options.auth_poll()).await {
				return false;
			}
			self.check_auth_state().await;
		}
	}

	/// Polls main-ready until it is observed, `timeout` elapses (when
	/// non-zero), or the context closes. Never fails on timeout.
	pub async fn wait_for_chat_ready(&self, timeout: Duration) -> bool {
		let started = Instant::now();
		loop {
			{
				let inner = self.inner.lock();
				if inner.in_chat {
					return true;
				}
				if !inner.is_logged {
					return false;
				}
			}
			if self.bridge.is_closed() {
				return false;
			}
			if !timeout.is_zero() && started.elapsed() >= timeout {
				debug!(target = "wa.session", session = %self.session, "chat-ready wait timed out");
				return false;
			}
			if !self.pause(self.options.chat_ready_poll()).await {
				return false;
			}
			self.check_in_chat().await;
		}
	}

	/// Runs login to completion: pairing if needed, then the synced main interface.
	///
	/// Terminal failures run the idle-close path before being returned.
	pub async fn wait_for_login(self: &Arc<Self>) -> Result<()> {
		self.start().await?;

		info!(target = "wa.session", session = %self.session, "waiting for the context to load");
		if self.wait_until_injected().await {
			self.start_watchdog(WatchdogPurpose::AutoClose, self.options.auto_close());
			let mut authenticated = self.settled_auth_state().await;

			if authenticated == Some(false) {
				let by_code = self.options.phone_number.is_some();
				info!(
					target = "wa.session",
					session = %self.session,
					"{}",
					if by_code { "waiting for login by code" } else { "waiting for QR scan" }
				);
				self.emit(StatusEvent::NotLogged);
				self.poll_pairing().await;

				self.wait_for_authentication().await;
				self.pause(INTERFACE_SETTLE).await;
				authenticated = self.settled_auth_state().await;

				match authenticated {
					None => {
						warn!(target = "wa.session", session = %self.session, "failed to authenticate");
						self.emit(StatusEvent::QrReadError);
					}
					Some(true) => {
						info!(target = "wa.session", session = %self.session, "login succeeded");
						self.emit(StatusEvent::QrReadSuccess);
					}
					Some(false) => {
						warn!(target = "wa.session", session = %self.session, "login failed");
						self.emit(StatusEvent::QrReadFail);
						self.try_auto_close().await;
						return Err(Error::session(&self.session, SessionFailure::QrFailed));
					}
				}
			} else if authenticated == Some(true) {
				info!(target = "wa.session", session = %self.session, "authenticated");
				self.emit(StatusEvent::IsLogged);
			}

			if authenticated == Some(true) {
				self.cancel_watchdog(WatchdogPurpose::AutoClose);
				self.pause(INTERFACE_SETTLE).await;
				self.start_watchdog(WatchdogPurpose::DeviceSync, self.options.device_sync_timeout());

				info!(target = "wa.session", session = %self.session, "checking phone is connected");
				if !self.wait_for_chat_ready(self.options.device_sync_timeout()).await {
					warn!(target = "wa.session", session = %self.session, "phone not connected");
					self.apply(Trigger::SyncTimedOut);
					self.emit(StatusEvent::PhoneNotConnected);
					self.try_auto_close().await;
					return Err(Error::session(&self.session, SessionFailure::PhoneNotConnected));
				}

				self.cancel_watchdog(WatchdogPurpose::DeviceSync);
				self.inner.lock().login_completed = true;
				return Ok(());
			}
		}

		self.try_auto_close().await;
		let kind = if self.auto_close_called() {
			SessionFailure::AutoCloseTriggered
		} else if self.bridge.is_closed() || self.state() == SessionState::Closed {
			SessionFailure::ContextClosed
		} else {
			SessionFailure::Unknown
		};
		warn!(target = "wa.session", session = %self.session, failure = %kind, "login did not complete");
		Err(Error::session(&self.session, kind))
	}

	/// Runs [`wait_for_login`](Self::wait_for_login) again after the account
	/// was unpaired, once a first login has completed.
	///
	/// At most one re-login runs at a time. Returns `true` if one was scheduled.
	pub fn schedule_relogin(self: &Arc<Self>) -> bool {
		if !self.inner.lock().login_completed || self.bridge.is_closed() {
			return false;
		}
		if self.relogin_running.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
			debug!(target = "wa.session", session = %self.session, "re-login already running");
			return false;
		}

		info!(target = "wa.session", session = %self.session, "session unpaired; logging in again");
		let controller = Arc::downgrade(self);
		let stop = self.stop.clone();
		tokio::spawn(async move {
			tokio::select! {
				biased;
				_ = stop.cancelled() => {}
				_ = tokio::time::sleep(RELOGIN_DELAY) => {
					if let Some(controller) = controller.upgrade() {
						match controller.wait_for_login().await {
							Ok(()) => info!(target = "wa.session", session = %controller.session, "re-login completed"),
							Err(err) => warn!(target = "wa.session", session = %controller.session, error = %err, "re-login failed"),
						}
					}
				}
			}
			if let Some(controller) = controller.upgrade() {
				controller.relogin_running.store(false, Ordering::SeqCst);
			}
		});
		true
	}

	pub fn is_relogin_running(&self) -> bool {
		self.relogin_running.load(Ordering::SeqCst)
	}

	/// Arms the countdown for `purpose` unless one is already running.
	///
	/// A zero duration disables the watchdog. Returns `true` if a new
	/// countdown was started.
	pub fn start_watchdog(self: &Arc<Self>, purpose: WatchdogPurpose, duration: Duration) -> bool {
		if duration.is_zero() {
			return false;
		}

		let mut inner = self.inner.lock();
		let slot = inner.watchdog(purpose);
		if slot.as_ref().is_some_and(Watchdog::is_active) {
			return false;
		}

		let guard = Arc::downgrade(self);
		let expire = Arc::downgrade(self);
		*slot = Some(Watchdog::spawn(
			purpose.as_str(),
			duration,
			self.options.watchdog_tick(),
			move || guard.upgrade().is_some_and(|controller| controller.watchdog_pending(purpose)),
			move || async move {
				if let Some(controller) = expire.upgrade() {
					controller.on_watchdog_expired(purpose).await;
				}
			},
		));
		true
	}

	/// Stops the countdown for `purpose`. Returns `true` if one was running.
	pub fn cancel_watchdog(&self, purpose: WatchdogPurpose) -> bool {
		let watchdog = self.inner.lock().watchdog(purpose).take();
		watchdog.is_some_and(|watchdog| watchdog.cancel())
	}

	fn watchdog_pending(&self, purpose: WatchdogPurpose) -> bool {
		if self.bridge.is_closed() || self.stop.is_cancelled() {
			return false;
		}
		let inner = self.inner.lock();
		match purpose {
			WatchdogPurpose::AutoClose => !inner.is_logged,
			WatchdogPurpose::DeviceSync => !inner.in_chat,
		}
	}

	async fn on_watchdog_expired(&self, purpose: WatchdogPurpose) {
		warn!(target = "wa.session", session = %self.session, watchdog = purpose.as_str(), "watchdog expired");
		if purpose == WatchdogPurpose::DeviceSync {
			self.apply(Trigger::SyncTimedOut);
		}
		self.try_auto_close().await;
	}

	/// Idle-close path: cancels watchdogs and, when a timeout is configured
	/// and the context is still open, closes it. Returns `true` if it closed.
	///
	/// A shut-down controller leaves the context alone.
	pub async fn try_auto_close(&self) -> bool {
		self.cancel_watchdog(WatchdogPurpose::AutoClose);
		self.cancel_watchdog(WatchdogPurpose::DeviceSync);

		if !self.options.close_on_timeout() || self.bridge.is_closed() || self.stop.is_cancelled() {
			return false;
		}

		info!(target = "wa.session", session = %self.session, "closing the context");
		self.inner.lock().auto_close_called = true;
		self.emit(StatusEvent::AutocloseCalled);
		if let Err(err) = self.bridge.close().await {
			warn!(target = "wa.session", session = %self.session, error = %err, "failed to close the context");
		}
		true
	}

	/// Feeds an out-of-band registration observation.
	///
	/// The first observation only seeds the baseline. Losing registration
	/// moves an authenticated session to `Disconnected` and emits
	/// `disconnectedMobile`. Returns `true` if a notification was emitted.
	pub fn notify_external_registration_change(&self, registered_now: bool) -> bool {
		{
			let mut inner = self.inner.lock();
			let previous = inner.registered.replace(registered_now);
			if previous.is_none() || previous == Some(registered_now) || registered_now {
				return false;
			}
			inner.is_logged = false;
			inner.in_chat = false;
			inner.in_chat_notified = false;
		}

		self.apply(Trigger::Unregistered);
		info!(target = "wa.session", session = %self.session, "session unpaired");
		self.emit(StatusEvent::DisconnectedMobile);
		true
	}

	fn on_context_closed(&self) {
		self.cancel_watchdog(WatchdogPurpose::AutoClose);
		self.cancel_watchdog(WatchdogPurpose::DeviceSync);
		self.stop.cancel();

		if self.apply(Trigger::ContextClosed).is_some() {
			info!(target = "wa.session", session = %self.session, "context closed");
			self.emit(StatusEvent::BrowserClose);
		}
	}

	async fn handle_host_event(self: &Arc<Self>, event: HostEvent) {
		trace!(target = "wa.bridge", session = %self.session, ?event, "host event");
		match event {
			HostEvent::AuthCodeChange => {
				self.poll_pairing().await;
			}
			HostEvent::MainReady => {
				self.check_in_chat().await;
			}
			HostEvent::StateChange { state } => {
				debug!(target = "wa.session", session = %self.session, %state, "socket state changed");
				if let Ok(false) = self.bridge.probe(scripts::IS_REGISTERED).await {
					self.notify_external_registration_change(false);
					self.schedule_relogin();
				}
			}
			HostEvent::LoadingScreen { percent, message } => {
				self.report_loading_screen(percent, message);
			}
		}
	}

	/// Forwards startup progress unless it repeats the last report.
	fn report_loading_screen(&self, percent: u32, message: String) -> bool {
		{
			let mut inner = self.inner.lock();
			if inner.last_progress.as_ref().is_some_and(|(p, m)| *p == percent && *m == message) {
				return false;
			}
			inner.last_progress = Some((percent, message.clone()));
		}

		debug!(target = "wa.session", session = %self.session, percent, %message, "loading screen");
		if let Some(callback) = &self.hooks.on_loading_screen {
			callback(percent, &message);
		}
		true
	}

	/// Stops every loop and wait of this controller and cancels its watchdogs.
	///
	/// The context itself is left open.
	pub fn shutdown(&self) {
		self.stop.cancel();
		self.cancel_watchdog(WatchdogPurpose::AutoClose);
		self.cancel_watchdog(WatchdogPurpose::DeviceSync);
		debug!(target = "wa.session", session = %self.session, "controller shut down");
	}

	pub fn is_shut_down(&self) -> bool {
		self.stop.is_cancelled()
	}

	fn apply(&self, trigger: Trigger) -> Option<SessionState> {
		let mut inner = self.inner.lock();
		let from = inner.state;
		let to = from.next(trigger)?;
		inner.state = to;
		drop(inner);

		if from != to {
			info!(target = "wa.session", session = %self.session, from = %from, to = %to, "session state changed");
		}
		Some(to)
	}

	fn emit(&self, status: StatusEvent) {
		debug!(target = "wa.session", session = %self.session, %status, "status");
		if let Some(callback) = &self.hooks.on_status {
			callback(StatusUpdate {
				session: self.session.clone(),
				status,
			});
		}
	}

	/// Sleeps for `duration`; returns `false` if the controller stopped meanwhile.
	async fn pause(&self, duration: Duration) -> bool {
		tokio::select! {
			biased;
			_ = self.stop.cancelled() => false,
			_ = tokio::time::sleep(duration) => true,
		}
	}
}

impl Drop for ConnectionController {
	fn drop(&mut self) {
		self.stop.cancel();
	}
}

async fn run_dispatcher(
	controller: Weak<ConnectionController>,
	mut lifecycle: broadcast::Receiver<ContextLifecycle>,
	mut events: HostEventReceiver<HostEvent>,
	stop: CancellationToken,
) {
	if let Some(controller) = controller.upgrade() {
		tokio::select! {
			biased;
			_ = stop.cancelled() => return,
			_ = controller.on_context_loaded() => {}
		}
	}

	loop {
		tokio::select! {
			biased;
			_ = stop.cancelled() => break,
			received = lifecycle.recv() => {
				let Some(controller) = controller.upgrade() else { break };
				match received {
					Ok(ContextLifecycle::Loaded) => {
						tokio::select! {
							biased;
							_ = stop.cancelled() => break,
							_ = controller.on_context_loaded() => {}
						}
					}
					Ok(ContextLifecycle::Closed) | Err(broadcast::error::RecvError::Closed) => {
						controller.on_context_closed();
						break;
					}
					Err(broadcast::error::RecvError::Lagged(missed)) => {
						warn!(target = "wa.bridge", session = %controller.session, missed, "lifecycle events dropped");
					}
				}
			}
			Some(event) = events.recv() => {
				let Some(controller) = controller.upgrade() else { break };
				controller.handle_host_event(event).await;
			}
		}
	}
	trace!(target = "wa.session", "dispatcher stopped");
}

async fn run_health_tick(controller: Weak<ConnectionController>, every: Duration, stop: CancellationToken) {
	loop {
		tokio::select! {
			biased;
			_ = stop.cancelled() => break,
			_ = tokio::time::sleep(every) => {}
		}
		let Some(controller) = controller.upgrade() else { break };
		if !controller.is_injected() {
			continue;
		}

		let registered = controller.check_auth_state().await;
		debug!(target = "wa.session", session = %controller.session, ?registered, state = %controller.state(), "health check");
		match registered {
			Some(false) => {
				controller.poll_pairing().await;
			}
			Some(true) if !controller.is_in_chat() => {
				controller.check_in_chat().await;
			}
			_ => {}
		}
	}
}

async fn run_registration_monitor(controller: Weak<ConnectionController>, every: Duration, stop: CancellationToken) {
	loop {
		tokio::select! {
			biased;
			_ = stop.cancelled() => break,
			_ = tokio::time::sleep(every) => {}
		}
		let Some(controller) = controller.upgrade() else { break };
		if !controller.is_injected() {
			continue;
		}

		if let Ok(registered) = controller.bridge.probe(scripts::IS_REGISTERED).await {
			if controller.notify_external_registration_change(registered) {
				controller.schedule_relogin();
			}
		}
	}
}
