//! CDP-driven Chromium backend.
//!
//! Each opened page owns its own browser process bound to the target's
//! profile directory, so logins persist across runs through the Chromium
//! profile itself in addition to the core's cookie store. Launch flags and
//! the init script keep the sessions reusable on sites that reject obvious
//! automation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, CookieSameSite};
use chromiumoxide::cdp::browser_protocol::page::{
	AddScriptToEvaluateOnNewDocumentParams, ReloadParams,
};
use chromiumoxide::element::Element;
use futures::StreamExt;
use parley::locator::Locator;
use parley::page::{
	Cookie, ElementHandle, LoadState, PageController, PageError, PageFactory, PageResult,
};
use parley::target::TargetId;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const STEALTH_ARGS: &[&str] = &[
	"--disable-blink-features=AutomationControlled",
	"--disable-features=IsolateOrigins,site-per-process",
	"--no-first-run",
	"--no-default-browser-check",
];

const STEALTH_INIT_SCRIPT: &str = "\
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
window.chrome = window.chrome || { runtime: {} };";

const IS_VISIBLE_FN: &str = "\
function() {
	const rect = this.getBoundingClientRect();
	const style = window.getComputedStyle(this);
	return rect.width > 0 && rect.height > 0
		&& style.visibility !== 'hidden' && style.display !== 'none';
}";

const CLEAR_FN: &str = "\
function() {
	if (this.tagName === 'TEXTAREA' || this.tagName === 'INPUT') {
		this.value = '';
	} else {
		this.innerText = '';
	}
}";

const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn backend_err(err: impl std::fmt::Display) -> PageError {
	PageError::Backend(err.to_string())
}

pub struct ChromiumFactory;

impl ChromiumFactory {
	pub fn new() -> Self {
		Self
	}
}

impl Default for ChromiumFactory {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl PageFactory for ChromiumFactory {
	async fn open(
		&self,
		target: TargetId,
		profile_dir: &Path,
		headless: bool,
	) -> PageResult<Box<dyn PageController>> {
		let mut builder = BrowserConfig::builder()
			.user_data_dir(profile_dir)
			.window_size(1280, 900);
		for arg in STEALTH_ARGS {
			builder = builder.arg(*arg);
		}
		if !headless {
			builder = builder.with_head();
		}
		let config = builder.build().map_err(PageError::Backend)?;

		let (browser, mut handler) = Browser::launch(config).await.map_err(backend_err)?;
		let handler_task = tokio::spawn(async move {
			while let Some(event) = handler.next().await {
				if event.is_err() {
					debug!(target = "parley.backend", "CDP handler loop ended");
					break;
				}
			}
		});

		let page = browser.new_page("about:blank").await.map_err(backend_err)?;
		page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
			STEALTH_INIT_SCRIPT,
		))
		.await
		.map_err(backend_err)?;

		debug!(target = "parley.backend", site = %target, headless, "chromium page ready");
		Ok(Box::new(ChromiumPage {
			browser: Mutex::new(browser),
			page,
			elements: StdMutex::new(HashMap::new()),
			next_handle: AtomicU64::new(0),
			handler_task,
		}))
	}
}

/// How a [`Locator`] resolves against CDP queries.
enum LocatorQuery {
	Css(String),
	XPath(String),
}

fn locator_query(locator: &Locator) -> LocatorQuery {
	match locator {
		Locator::Css { selector } => LocatorQuery::Css(selector.clone()),
		Locator::Role { role, name } => LocatorQuery::Css(role_selector(role, name.as_deref())),
		Locator::Text { text } => LocatorQuery::XPath(format!(
			"//*[normalize-space(text())='{}']",
			text.replace('\'', "\\'")
		)),
	}
}

fn role_selector(role: &str, name: Option<&str>) -> String {
	if let Some(name) = name {
		let escaped = name.replace('\'', "\\'");
		return format!("[aria-label='{escaped}']");
	}
	match role {
		"button" => "button, [role='button']".to_owned(),
		"textbox" => "textarea, input, [contenteditable='true'], [role='textbox']".to_owned(),
		other => format!("[role='{other}']"),
	}
}

struct ChromiumPage {
	browser: Mutex<Browser>,
	page: chromiumoxide::Page,
	elements: StdMutex<HashMap<u64, Arc<Element>>>,
	next_handle: AtomicU64,
	handler_task: JoinHandle<()>,
}

impl ChromiumPage {
	fn store(&self, element: Element) -> ElementHandle {
		let id = self.next_handle.fetch_add(1, Ordering::Relaxed) + 1;
		self.elements.lock().unwrap().insert(id, Arc::new(element));
		ElementHandle::from_raw(id)
	}

	fn element(&self, handle: &ElementHandle) -> PageResult<Arc<Element>> {
		self.elements
			.lock()
			.unwrap()
			.get(&handle.raw())
			.cloned()
			.ok_or_else(|| PageError::Element(format!("stale element handle {}", handle.raw())))
	}

	/// Finds every element matching `locator`. Driver errors read as "no
	/// match" so the polling loops stay resilient to transient CDP hiccups.
	async fn find_all(&self, locator: &Locator) -> Vec<Element> {
		let found = match locator_query(locator) {
			LocatorQuery::Css(selector) => self.page.find_elements(selector).await,
			LocatorQuery::XPath(xpath) => self.page.find_xpaths(xpath).await,
		};
		match found {
			Ok(elements) => elements,
			Err(err) => {
				debug!(target = "parley.backend", %locator, error = %err, "query failed, treating as no match");
				Vec::new()
			}
		}
	}

	async fn element_visible(&self, element: &Element) -> bool {
		let Ok(result) = element.call_js_fn(IS_VISIBLE_FN, false).await else {
			return false;
		};
		result
			.result
			.value
			.as_ref()
			.and_then(|value| value.as_bool())
			.unwrap_or(false)
	}
}

#[async_trait]
impl PageController for ChromiumPage {
	async fn navigate(&self, url: &str, timeout: Duration) -> PageResult<()> {
		let navigation = async {
			self.page.goto(url).await.map_err(backend_err)?;
			Ok::<(), PageError>(())
		};
		match tokio::time::timeout(timeout, navigation).await {
			Ok(Ok(())) => Ok(()),
			Ok(Err(err)) => Err(PageError::Navigation {
				url: url.to_owned(),
				message: err.to_string(),
			}),
			Err(_) => Err(PageError::timeout(timeout, format!("navigation to {url}"))),
		}
	}

	async fn wait_for_load(&self, state: LoadState, timeout: Duration) -> PageResult<()> {
		let deadline = tokio::time::Instant::now() + timeout;
		loop {
			let ready = self
				.page
				.evaluate("document.readyState")
				.await
				.ok()
				.and_then(|value| value.into_value::<String>().ok())
				.unwrap_or_default();
			let done = match state {
				LoadState::DomContentLoaded => ready == "interactive" || ready == "complete",
				LoadState::Load | LoadState::NetworkIdle => ready == "complete",
			};
			if done {
				return Ok(());
			}
			if tokio::time::Instant::now() >= deadline {
				return Err(PageError::timeout(timeout, format!("load state {state}")));
			}
			tokio::time::sleep(POLL_INTERVAL).await;
		}
	}

	async fn reload(&self) -> PageResult<()> {
		self.page
			.execute(ReloadParams::default())
			.await
			.map_err(backend_err)?;
		Ok(())
	}

	async fn query(&self, locator: &Locator) -> PageResult<Option<ElementHandle>> {
		let mut elements = self.find_all(locator).await;
		if elements.is_empty() {
			return Ok(None);
		}
		Ok(Some(self.store(elements.remove(0))))
	}

	async fn query_all(&self, locator: &Locator) -> PageResult<Vec<ElementHandle>> {
		let elements = self.find_all(locator).await;
		Ok(elements
			.into_iter()
			.map(|element| self.store(element))
			.collect())
	}

	async fn wait_for_visible(
		&self,
		locator: &Locator,
		timeout: Duration,
	) -> PageResult<ElementHandle> {
		let deadline = tokio::time::Instant::now() + timeout;
		loop {
			for element in self.find_all(locator).await {
				if self.element_visible(&element).await {
					return Ok(self.store(element));
				}
			}
			if tokio::time::Instant::now() >= deadline {
				return Err(PageError::timeout(timeout, locator.to_string()));
			}
			tokio::time::sleep(POLL_INTERVAL).await;
		}
	}

	async fn click(&self, handle: &ElementHandle) -> PageResult<()> {
		let element = self.element(handle)?;
		element.click().await.map_err(backend_err)?;
		Ok(())
	}

	async fn set_text(&self, handle: &ElementHandle, text: &str) -> PageResult<()> {
		let element = self.element(handle)?;
		let payload =
			serde_json::to_string(text).map_err(|err| PageError::Element(err.to_string()))?;
		let script = format!(
			"function() {{\n\
			\tconst text = {payload};\n\
			\tif (this.tagName === 'TEXTAREA' || this.tagName === 'INPUT') {{\n\
			\t\tthis.value = text;\n\
			\t\tthis.dispatchEvent(new Event('input', {{ bubbles: true }}));\n\
			\t}} else {{\n\
			\t\tthis.innerText = text;\n\
			\t\tthis.dispatchEvent(new InputEvent('input', {{ bubbles: true, data: text }}));\n\
			\t}}\n\
			}}"
		);
		element.call_js_fn(&script, false).await.map_err(backend_err)?;
		Ok(())
	}

	async fn fill(&self, handle: &ElementHandle, text: &str) -> PageResult<()> {
		let element = self.element(handle)?;
		element.focus().await.map_err(backend_err)?;
		element
			.call_js_fn(CLEAR_FN, false)
			.await
			.map_err(backend_err)?;
		element.type_str(text).await.map_err(backend_err)?;
		Ok(())
	}

	async fn type_text(
		&self,
		handle: &ElementHandle,
		text: &str,
		per_char_delay: Duration,
	) -> PageResult<()> {
		let element = self.element(handle)?;
		element.focus().await.map_err(backend_err)?;
		let mut buf = [0u8; 4];
		for ch in text.chars() {
			let key = ch.encode_utf8(&mut buf);
			element.press_key(&*key).await.map_err(backend_err)?;
			tokio::time::sleep(per_char_delay).await;
		}
		Ok(())
	}

	async fn inner_text(&self, handle: &ElementHandle) -> PageResult<String> {
		let element = self.element(handle)?;
		let text = element.inner_text().await.map_err(backend_err)?;
		Ok(text.unwrap_or_default())
	}

	async fn is_visible(&self, handle: &ElementHandle) -> PageResult<bool> {
		let element = self.element(handle)?;
		Ok(self.element_visible(&element).await)
	}

	async fn cookies(&self) -> PageResult<Vec<Cookie>> {
		let cookies = self.page.get_cookies().await.map_err(backend_err)?;
		Ok(cookies
			.into_iter()
			.map(|cookie| Cookie {
				name: cookie.name,
				value: cookie.value,
				domain: cookie.domain,
				path: cookie.path,
				expires: None,
				http_only: cookie.http_only,
				secure: cookie.secure,
				same_site: cookie.same_site.map(same_site_label),
			})
			.collect())
	}

	async fn add_cookies(&self, cookies: Vec<Cookie>) -> PageResult<()> {
		if cookies.is_empty() {
			return Ok(());
		}
		let params: Vec<CookieParam> = cookies
			.into_iter()
			.map(|cookie| {
				let mut param = CookieParam::new(cookie.name, cookie.value);
				param.domain = Some(cookie.domain);
				param.path = Some(cookie.path);
				param.http_only = Some(cookie.http_only);
				param.secure = Some(cookie.secure);
				param.same_site = cookie.same_site.as_deref().and_then(parse_same_site);
				param
			})
			.collect();
		self.page.set_cookies(params).await.map_err(backend_err)?;
		Ok(())
	}

	async fn close(&self) -> PageResult<()> {
		let mut browser = self.browser.lock().await;
		if let Err(err) = browser.close().await {
			warn!(target = "parley.backend", error = %err, "browser close failed");
		}
		if let Err(err) = browser.wait().await {
			debug!(target = "parley.backend", error = %err, "browser wait failed");
		}
		self.handler_task.abort();
		Ok(())
	}
}

fn same_site_label(same_site: CookieSameSite) -> String {
	match same_site {
		CookieSameSite::Strict => "Strict".to_owned(),
		CookieSameSite::Lax => "Lax".to_owned(),
		CookieSameSite::None => "None".to_owned(),
	}
}

fn parse_same_site(label: &str) -> Option<CookieSameSite> {
	match label {
		"Strict" => Some(CookieSameSite::Strict),
		"Lax" => Some(CookieSameSite::Lax),
		"None" => Some(CookieSameSite::None),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn css_locator_passes_through() {
		let query = locator_query(&Locator::css("div.ProseMirror"));
		match query {
			LocatorQuery::Css(selector) => assert_eq!(selector, "div.ProseMirror"),
			LocatorQuery::XPath(_) => panic!("expected css"),
		}
	}

	#[test]
	fn named_role_maps_to_aria_label() {
		let query = locator_query(&Locator::role("button", "Send Message"));
		match query {
			LocatorQuery::Css(selector) => assert_eq!(selector, "[aria-label='Send Message']"),
			LocatorQuery::XPath(_) => panic!("expected css"),
		}
	}

	#[test]
	fn bare_textbox_role_covers_native_inputs() {
		let query = locator_query(&Locator::any_role("textbox"));
		match query {
			LocatorQuery::Css(selector) => {
				assert!(selector.contains("textarea"));
				assert!(selector.contains("[contenteditable='true']"));
			}
			LocatorQuery::XPath(_) => panic!("expected css"),
		}
	}

	#[test]
	fn text_locator_maps_to_xpath() {
		let query = locator_query(&Locator::text("Stop responding"));
		match query {
			LocatorQuery::XPath(xpath) => {
				assert!(xpath.contains("normalize-space"));
				assert!(xpath.contains("Stop responding"));
			}
			LocatorQuery::Css(_) => panic!("expected xpath"),
		}
	}

	#[test]
	fn same_site_labels_round_trip() {
		for label in ["Strict", "Lax", "None"] {
			let parsed = parse_same_site(label).unwrap();
			assert_eq!(same_site_label(parsed), label);
		}
		assert!(parse_same_site("bogus").is_none());
	}
}
