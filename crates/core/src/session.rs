//! Session ownership and cookie persistence.
//!
//! One session per (target, process lifetime): a live page handle plus an
//! isolated profile directory so logins survive process restarts. Cookies
//! are loaded before the first navigation and saved before teardown; a
//! corrupt or missing cookie file is skipped, never fatal.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Result;
use crate::page::{Cookie, PageController};
use crate::target::TargetId;

const COOKIE_FILE: &str = "cookies.json";

/// Live browser state exclusively owned by one single-target client.
pub struct Session {
	target: TargetId,
	page: Box<dyn PageController>,
	profile_dir: PathBuf,
}

impl Session {
	/// Wraps a freshly opened page and seeds it with any persisted cookies.
	pub async fn attach(
		target: TargetId,
		page: Box<dyn PageController>,
		profile_dir: PathBuf,
	) -> Result<Self> {
		let session = Self {
			target,
			page,
			profile_dir,
		};

		let cookies = load_cookies(&session.cookie_path());
		if !cookies.is_empty() {
			debug!(
				target = "parley",
				site = %session.target,
				count = cookies.len(),
				"injecting persisted cookies"
			);
			session.page.add_cookies(cookies).await?;
		}

		Ok(session)
	}

	pub fn page(&self) -> &dyn PageController {
		self.page.as_ref()
	}

	pub fn profile_dir(&self) -> &Path {
		&self.profile_dir
	}

	fn cookie_path(&self) -> PathBuf {
		self.profile_dir.join(COOKIE_FILE)
	}

	/// Persists the page's current cookies. Best effort; failures are
	/// reported as warnings so teardown can proceed.
	pub async fn persist_cookies(&self) {
		match self.page.cookies().await {
			Ok(cookies) => {
				if let Err(err) = save_cookies(&self.cookie_path(), &cookies) {
					warn!(target = "parley", site = %self.target, error = %err, "failed to persist cookies");
				} else {
					debug!(
						target = "parley",
						site = %self.target,
						count = cookies.len(),
						"persisted cookies"
					);
				}
			}
			Err(err) => {
				warn!(target = "parley", site = %self.target, error = %err, "failed to read cookies for persistence");
			}
		}
	}

	/// Saves cookies and tears the page down.
	pub async fn close(self) -> Result<()> {
		self.persist_cookies().await;
		self.page.close().await?;
		Ok(())
	}
}

/// Reads a cookie file, returning an empty set for missing or unreadable
/// content.
pub fn load_cookies(path: &Path) -> Vec<Cookie> {
	let Ok(raw) = fs::read_to_string(path) else {
		return Vec::new();
	};
	match serde_json::from_str(&raw) {
		Ok(cookies) => cookies,
		Err(err) => {
			debug!(target = "parley", path = %path.display(), error = %err, "skipping unreadable cookie file");
			Vec::new()
		}
	}
}

/// Writes cookies as a JSON blob, creating parent directories as needed.
pub fn save_cookies(path: &Path, cookies: &[Cookie]) -> Result<()> {
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent)?;
	}
	fs::write(path, serde_json::to_string_pretty(cookies)?)?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use tempfile::TempDir;

	use super::*;

	fn sample_cookie() -> Cookie {
		Cookie {
			name: "session".into(),
			value: "token".into(),
			domain: ".example.com".into(),
			path: "/".into(),
			expires: Some(-1.0),
			http_only: true,
			secure: true,
			same_site: Some("Lax".into()),
		}
	}

	#[test]
	fn cookies_round_trip_through_disk() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("profile").join(COOKIE_FILE);

		save_cookies(&path, &[sample_cookie()]).unwrap();
		let loaded = load_cookies(&path);
		assert_eq!(loaded, vec![sample_cookie()]);
	}

	#[test]
	fn missing_cookie_file_yields_empty_set() {
		assert!(load_cookies(Path::new("/definitely/missing/cookies.json")).is_empty());
	}

	#[test]
	fn corrupt_cookie_file_yields_empty_set() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join(COOKIE_FILE);
		fs::write(&path, "not json at all").unwrap();
		assert!(load_cookies(&path).is_empty());
	}
}
