//! Remote API expressions evaluated inside the context.
//!
//! Each constant is a function expression; the bridge invokes it with a
//! single JSON argument and returns its structurally-cloned result. The host
//! depends only on these names existing after injection and on their return
//! shapes.

/// Writes the host-provided config object before the library is injected.
pub const SET_CONFIG: &str = "(options) => { window.WPPConfig = options; }";

/// Loads the remote library from `{ url }` unless it is already present.
pub const INJECT_LIBRARY: &str = r#"async ({ url }) => {
	if (typeof WPP !== 'undefined') {
		return;
	}
	await new Promise((resolve, reject) => {
		const script = document.createElement('script');
		script.src = url;
		script.onload = resolve;
		script.onerror = () => reject(new Error('failed to load ' + url));
		document.head.appendChild(script);
	});
}"#;

/// `true` once the injected library has finished bootstrapping.
pub const LIBRARY_READY: &str = "() => typeof WPP !== 'undefined' && WPP.isReady === true";

/// `true` when the device is registered (linked) with an account.
pub const IS_REGISTERED: &str = "() => WPP.conn.isRegistered()";

/// `true` once the main interface is authenticated, loaded and synced.
pub const IS_MAIN_READY: &str = "() => WPP.conn.isMainReady()";

/// `true` once the main interface is loaded but possibly still syncing.
pub const IS_MAIN_LOADED: &str = "() => WPP.conn.isMainLoaded()";

/// Returns a [`PairingPayload`](crate::PairingPayload) or `null`.
pub const PAIRING_PAYLOAD: &str = r#"async () => {
	const code = await WPP.conn.getAuthCode();
	if (!code || !code.fullCode) {
		return null;
	}
	const canvas = document.querySelector('canvas');
	return {
		urlCode: code.fullCode,
		base64Image: canvas ? canvas.toDataURL() : null,
	};
}"#;

/// Requests a numeric link code for `{ phone }`.
pub const LINK_DEVICE_CODE: &str = "async ({ phone }) => JSON.parse(JSON.stringify(await WPP.conn.genLinkDeviceCodeForPhoneNumber(phone)))";

/// Routes remote connection notifications and startup progress into the
/// host dispatch function.
pub const SUBSCRIBE_HOST_EVENTS: &str = r#"() => {
	const dispatch = (event) => window.__waHostDispatch(event);
	WPP.on('conn.auth_code_change', () => dispatch({ kind: 'authCodeChange' }));
	WPP.on('conn.main_ready', () => dispatch({ kind: 'mainReady' }));
	WPP.whatsapp.Socket.on('change:state', (_, state) => dispatch({ kind: 'stateChange', state: String(state) }));

	const progress = () => {
		const bar = document.querySelector('progress');
		if (!bar) {
			return;
		}
		const label = bar.parentElement ? bar.parentElement.nextElementSibling : null;
		const text = label ? label.innerText : '';
		dispatch({
			kind: 'loadingScreen',
			percent: Math.round(Number(bar.value) || 0),
			message: text === 'WhatsApp' ? '' : text,
		});
	};
	new MutationObserver(progress).observe(document, { attributes: true, childList: true, subtree: true, characterData: true });
	progress();
}"#;

/// Version string of the remote web client.
pub const CLIENT_VERSION: &str = "() => WPP.version ? WPP.whatsapp.Debug.VERSION : null";

/// Version string of the injected library.
pub const LIBRARY_VERSION: &str = "() => WPP.version";

/// Current socket state, e.g. `"CONNECTED"`.
pub const CONNECTION_STATE: &str = "() => WPP.whatsapp.Socket.state";

/// Logs the device out of the account.
pub const LOGOUT: &str = "() => WPP.conn.logout()";

#[cfg(test)]
mod tests {
	use super::*;
	use crate::HOST_DISPATCH_FN;

	#[test]
	fn host_event_subscription_targets_dispatch_fn() {
		assert!(SUBSCRIBE_HOST_EVENTS.contains(HOST_DISPATCH_FN));
	}
}
