//! Testing infrastructure: a scripted page controller.
//!
//! [`MockPage`] implements [`PageController`] over an in-memory DOM script
//! so the locate/submit/stream pipeline can be exercised without a browser.
//! It records every probe, navigation, click, and injection, and supports
//! scripted response growth, completion indicators keyed to poll counts,
//! and failure injection for the fallback paths.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::locator::Locator;
use crate::page::{
	Cookie, ElementHandle, LoadState, PageController, PageError, PageFactory, PageResult,
};
use crate::target::TargetId;

/// Which injection path a prompt landed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionPath {
	SetText,
	Fill,
	TypeText,
}

#[derive(Default)]
struct ElementData {
	visible: bool,
	fixed_text: String,
	/// Successive `inner_text` results; the last entry repeats forever.
	text_script: Option<Vec<String>>,
	script_cursor: usize,
	/// Element only exists once the page-wide poll counter reaches this.
	present_after_polls: Option<usize>,
	/// Element reads as visible only while the poll counter is below this.
	visible_until_polls: Option<usize>,
}

#[derive(Default)]
struct MockState {
	next_handle: u64,
	elements: HashMap<Locator, Vec<u64>>,
	data: HashMap<u64, ElementData>,
	/// Every `inner_text` call on a scripted element advances this clock.
	poll_clock: usize,
	probes: Vec<Locator>,
	navigations: Vec<String>,
	reloads: usize,
	clicks: Vec<u64>,
	injections: Vec<(u64, String, InjectionPath)>,
	cookies: Vec<Cookie>,
	fail_navigations: usize,
	fail_set_text: bool,
	fail_fill: bool,
}

impl MockState {
	fn present(&self, handle: u64) -> bool {
		match self.data.get(&handle).and_then(|d| d.present_after_polls) {
			Some(after) => self.poll_clock >= after,
			_ => true,
		}
	}
}

/// Scripted in-memory page controller. Cloning shares the underlying state,
/// so a test can keep a handle while the client owns the boxed controller.
#[derive(Clone, Default)]
pub struct MockPage {
	state: Arc<Mutex<MockState>>,
}

impl MockPage {
	pub fn new() -> Self {
		Self::default()
	}

	fn register(&self, locator: Locator, data: ElementData) -> ElementHandle {
		let mut state = self.state.lock().unwrap();
		state.next_handle += 1;
		let handle = state.next_handle;
		state.data.insert(handle, data);
		state.elements.entry(locator).or_default().push(handle);
		ElementHandle::from_raw(handle)
	}

	/// Registers a visible element with fixed text.
	pub fn add_visible_element(&self, locator: Locator) -> ElementHandle {
		self.register(
			locator,
			ElementData {
				visible: true,
				..ElementData::default()
			},
		)
	}

	/// Registers an element present in the DOM but not visible.
	pub fn add_hidden_element(&self, locator: Locator) -> ElementHandle {
		self.register(locator, ElementData::default())
	}

	/// Registers a visible element whose `inner_text` follows `script`,
	/// holding the last value once the script runs out.
	pub fn add_streaming_element(&self, locator: Locator, script: &[&str]) -> ElementHandle {
		self.register(
			locator,
			ElementData {
				visible: true,
				text_script: Some(script.iter().map(|s| s.to_string()).collect()),
				..ElementData::default()
			},
		)
	}

	/// Registers a completion indicator that enters the DOM once the
	/// response element has been polled `after_polls` times.
	pub fn add_completion_indicator(&self, locator: Locator, after_polls: usize) {
		self.register(
			locator,
			ElementData {
				visible: true,
				present_after_polls: Some(after_polls),
				..ElementData::default()
			},
		);
	}

	/// Registers a stop control that stays visible for the first
	/// `visible_for_polls` response polls and turns invisible after.
	pub fn add_stop_control(&self, locator: Locator, visible_for_polls: usize) {
		self.register(
			locator,
			ElementData {
				visible: true,
				visible_until_polls: Some(visible_for_polls),
				..ElementData::default()
			},
		);
	}

	pub fn set_fixed_text(&self, handle: ElementHandle, text: impl Into<String>) {
		let mut state = self.state.lock().unwrap();
		if let Some(data) = state.data.get_mut(&handle.raw()) {
			data.fixed_text = text.into();
		}
	}

	pub fn fail_next_navigations(&self, count: usize) {
		self.state.lock().unwrap().fail_navigations = count;
	}

	pub fn fail_set_text(&self) {
		self.state.lock().unwrap().fail_set_text = true;
	}

	pub fn fail_fill(&self) {
		self.state.lock().unwrap().fail_fill = true;
	}

	pub fn seed_cookies(&self, cookies: Vec<Cookie>) {
		self.state.lock().unwrap().cookies = cookies;
	}

	// ── Recorded observations ───────────────────────────────────────

	pub fn probes(&self) -> Vec<Locator> {
		self.state.lock().unwrap().probes.clone()
	}

	pub fn probe_count(&self, locator: &Locator) -> usize {
		self.state
			.lock()
			.unwrap()
			.probes
			.iter()
			.filter(|probed| *probed == locator)
			.count()
	}

	pub fn navigations(&self) -> Vec<String> {
		self.state.lock().unwrap().navigations.clone()
	}

	pub fn reload_count(&self) -> usize {
		self.state.lock().unwrap().reloads
	}

	pub fn click_count(&self) -> usize {
		self.state.lock().unwrap().clicks.len()
	}

	/// `(text, path)` pairs for every successful injection.
	pub fn injections(&self) -> Vec<(String, InjectionPath)> {
		self.state
			.lock()
			.unwrap()
			.injections
			.iter()
			.map(|(_, text, path)| (text.clone(), *path))
			.collect()
	}

	pub fn stored_cookies(&self) -> Vec<Cookie> {
		self.state.lock().unwrap().cookies.clone()
	}
}

#[async_trait]
impl PageController for MockPage {
	async fn navigate(&self, url: &str, timeout: Duration) -> PageResult<()> {
		let mut state = self.state.lock().unwrap();
		if state.fail_navigations > 0 {
			state.fail_navigations -= 1;
			return Err(PageError::timeout(timeout, format!("navigation to {url}")));
		}
		state.navigations.push(url.to_owned());
		Ok(())
	}

	async fn wait_for_load(&self, _state: LoadState, _timeout: Duration) -> PageResult<()> {
		Ok(())
	}

	async fn reload(&self) -> PageResult<()> {
		self.state.lock().unwrap().reloads += 1;
		Ok(())
	}

	async fn query(&self, locator: &Locator) -> PageResult<Option<ElementHandle>> {
		let mut state = self.state.lock().unwrap();
		state.probes.push(locator.clone());
		let found = state
			.elements
			.get(locator)
			.into_iter()
			.flatten()
			.copied()
			.find(|&handle| state.present(handle));
		Ok(found.map(ElementHandle::from_raw))
	}

	async fn query_all(&self, locator: &Locator) -> PageResult<Vec<ElementHandle>> {
		let mut state = self.state.lock().unwrap();
		state.probes.push(locator.clone());
		let found = state
			.elements
			.get(locator)
			.into_iter()
			.flatten()
			.copied()
			.filter(|&handle| state.present(handle))
			.map(ElementHandle::from_raw)
			.collect();
		Ok(found)
	}

	async fn wait_for_visible(
		&self,
		locator: &Locator,
		timeout: Duration,
	) -> PageResult<ElementHandle> {
		let mut state = self.state.lock().unwrap();
		state.probes.push(locator.clone());
		let visible = state
			.elements
			.get(locator)
			.into_iter()
			.flatten()
			.copied()
			.find(|&handle| {
				state.present(handle) && state.data.get(&handle).is_some_and(|d| d.visible)
			});
		match visible {
			Some(handle) => Ok(ElementHandle::from_raw(handle)),
			_ => Err(PageError::timeout(timeout, locator.to_string())),
		}
	}

	async fn click(&self, element: &ElementHandle) -> PageResult<()> {
		self.state.lock().unwrap().clicks.push(element.raw());
		Ok(())
	}

	async fn set_text(&self, element: &ElementHandle, text: &str) -> PageResult<()> {
		let mut state = self.state.lock().unwrap();
		if state.fail_set_text {
			return Err(PageError::Element("synthetic set_text failure".into()));
		}
		state
			.injections
			.push((element.raw(), text.to_owned(), InjectionPath::SetText));
		Ok(())
	}

	async fn fill(&self, element: &ElementHandle, text: &str) -> PageResult<()> {
		let mut state = self.state.lock().unwrap();
		if state.fail_fill {
			return Err(PageError::Element("synthetic fill failure".into()));
		}
		state
			.injections
			.push((element.raw(), text.to_owned(), InjectionPath::Fill));
		Ok(())
	}

	async fn type_text(
		&self,
		element: &ElementHandle,
		text: &str,
		_per_char_delay: Duration,
	) -> PageResult<()> {
		let mut state = self.state.lock().unwrap();
		state
			.injections
			.push((element.raw(), text.to_owned(), InjectionPath::TypeText));
		Ok(())
	}

	async fn inner_text(&self, element: &ElementHandle) -> PageResult<String> {
		let mut state = self.state.lock().unwrap();
		let (text, scripted) = {
			let Some(data) = state.data.get_mut(&element.raw()) else {
				return Err(PageError::Element("stale element handle".into()));
			};
			match data.text_script.as_ref() {
				Some(script) => {
					let index = data.script_cursor.min(script.len().saturating_sub(1));
					let text = script.get(index).cloned().unwrap_or_default();
					data.script_cursor += 1;
					(text, true)
				}
				_ => (data.fixed_text.clone(), false),
			}
		};
		if scripted {
			state.poll_clock += 1;
		}
		Ok(text)
	}

	async fn is_visible(&self, element: &ElementHandle) -> PageResult<bool> {
		let state = self.state.lock().unwrap();
		let Some(data) = state.data.get(&element.raw()) else {
			return Ok(false);
		};
		if let Some(until) = data.visible_until_polls {
			return Ok(state.poll_clock < until);
		}
		Ok(data.visible)
	}

	async fn cookies(&self) -> PageResult<Vec<Cookie>> {
		Ok(self.state.lock().unwrap().cookies.clone())
	}

	async fn add_cookies(&self, cookies: Vec<Cookie>) -> PageResult<()> {
		self.state.lock().unwrap().cookies.extend(cookies);
		Ok(())
	}

	async fn close(&self) -> PageResult<()> {
		Ok(())
	}
}

/// Factory handing out pre-registered mock pages per target. A target with
/// no registered page fails to open, which is how start-failure isolation
/// is exercised.
#[derive(Default)]
pub struct MockFactory {
	pages: Mutex<HashMap<TargetId, MockPage>>,
}

impl MockFactory {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&self, target: TargetId, page: MockPage) {
		self.pages.lock().unwrap().insert(target, page);
	}

	pub fn page(&self, target: TargetId) -> Option<MockPage> {
		self.pages.lock().unwrap().get(&target).cloned()
	}
}

#[async_trait]
impl PageFactory for MockFactory {
	async fn open(
		&self,
		target: TargetId,
		_profile_dir: &Path,
		_headless: bool,
	) -> PageResult<Box<dyn PageController>> {
		let pages = self.pages.lock().unwrap();
		match pages.get(&target) {
			Some(page) => Ok(Box::new(page.clone())),
			_ => Err(PageError::Backend(format!(
				"no mock page registered for {target}"
			))),
		}
	}
}
