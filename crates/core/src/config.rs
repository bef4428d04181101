//! Fully owned client configuration.
//!
//! These types are the stable handoff between orchestration and the client
//! internals; everything is plain data with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;

/// Tuning for the streaming completion-detection loop.
#[derive(Debug, Clone)]
pub struct StreamTuning {
	/// Interval between DOM polls.
	pub poll_interval: Duration,
	/// Consecutive no-growth polls before the stability heuristic reports
	/// completion. A tunable, not a load-bearing constant.
	pub stable_ticks: u32,
	/// Grace period before the first poll, giving the response a chance to
	/// appear at all.
	pub first_poll_delay: Duration,
}

impl Default for StreamTuning {
	fn default() -> Self {
		Self {
			poll_interval: Duration::from_millis(100),
			stable_ticks: 25,
			first_poll_delay: Duration::from_secs(1),
		}
	}
}

/// Retry policy for the submission pipeline.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	/// Base delay; attempt `n` waits `base * 2^n` plus jitter.
	pub base_delay: Duration,
	/// Upper bound of the uniform jitter added to every backoff wait.
	pub max_jitter: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::from_secs(2),
			max_jitter: Duration::from_secs(1),
		}
	}
}

impl RetryPolicy {
	/// Jittered exponential backoff delay before retrying `attempt`
	/// (zero-indexed).
	pub fn delay_for(&self, attempt: u32) -> Duration {
		let backoff = self.base_delay * 2u32.saturating_pow(attempt);
		if self.max_jitter.is_zero() {
			return backoff;
		}
		let jitter_ms = rand::thread_rng().gen_range(0..=self.max_jitter.as_millis() as u64);
		backoff + Duration::from_millis(jitter_ms)
	}
}

/// Configuration shared by every single-target client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
	/// Root under which each target keeps its isolated profile directory.
	pub data_dir: PathBuf,
	/// Whether backend pages launch headless. Interactive auth setup needs
	/// a headed browser.
	pub headless: bool,
	/// Bound for every page navigation.
	pub navigation_timeout: Duration,
	/// Bound for post-navigation DOM-content-loaded waits.
	pub load_timeout: Duration,
	/// Budget for locating the prompt input across its fallback chain.
	pub input_locate_timeout: Duration,
	/// Budget for locating the submit control across its fallback chain.
	pub submit_locate_timeout: Duration,
	pub tuning: StreamTuning,
	pub retry: RetryPolicy,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			data_dir: default_data_dir(),
			headless: false,
			navigation_timeout: Duration::from_secs(30),
			load_timeout: Duration::from_secs(15),
			input_locate_timeout: Duration::from_secs(15),
			submit_locate_timeout: Duration::from_secs(5),
			tuning: StreamTuning::default(),
			retry: RetryPolicy::default(),
		}
	}
}

/// `~/.parley/browser-data`, falling back to a relative path when no home
/// directory can be resolved.
pub fn default_data_dir() -> PathBuf {
	dirs::home_dir()
		.unwrap_or_else(|| PathBuf::from("."))
		.join(".parley")
		.join("browser-data")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn backoff_doubles_per_attempt_without_jitter() {
		let policy = RetryPolicy {
			max_attempts: 3,
			base_delay: Duration::from_millis(200),
			max_jitter: Duration::ZERO,
		};
		assert_eq!(policy.delay_for(0), Duration::from_millis(200));
		assert_eq!(policy.delay_for(1), Duration::from_millis(400));
		assert_eq!(policy.delay_for(2), Duration::from_millis(800));
	}

	#[test]
	fn jitter_stays_within_bound() {
		let policy = RetryPolicy {
			max_attempts: 3,
			base_delay: Duration::from_millis(100),
			max_jitter: Duration::from_millis(50),
		};
		for _ in 0..32 {
			let delay = policy.delay_for(0);
			assert!(delay >= Duration::from_millis(100));
			assert!(delay <= Duration::from_millis(150));
		}
	}

	#[test]
	fn default_data_dir_ends_with_browser_data() {
		assert!(default_data_dir().ends_with(".parley/browser-data"));
	}
}
