// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Reconnect delay computation.
//!
//! Delays grow as `first_delay * 2^attempt`, capped at `max_delay`. Jitter then
//! removes a uniform fraction of up to `jitter_ratio` of that value, so the
//! result always lies in `[capped * (1 - jitter_ratio), capped]`.
//!
//! A connection that stayed up for at least `reset_interval` before failing
//! starts over from the first delay. A forced delay is exactly `max_delay`.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

/// Source of jitter fractions in `[0, 1)`.
pub trait JitterSource: Send {
	fn next_fraction(&mut self) -> f64;
}

/// Pseudo-random jitter backed by `fastrand`.
pub struct RandomJitter {
	rng: fastrand::Rng,
}

impl RandomJitter {
	pub fn new() -> Self {
		Self {
			rng: fastrand::Rng::new(),
		}
	}

	/// Reproducible jitter sequence for a given seed.
	pub fn with_seed(seed: u64) -> Self {
		Self {
			rng: fastrand::Rng::with_seed(seed),
		}
	}
}

impl Default for RandomJitter {
	fn default() -> Self {
		Self::new()
	}
}

impl JitterSource for RandomJitter {
	fn next_fraction(&mut self) -> f64 {
		self.rng.f64()
	}
}

/// No jitter at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl JitterSource for NoJitter {
	fn next_fraction(&mut self) -> f64 {
		0.0
	}
}

pub struct BackoffStrategy {
	first_delay: Duration,
	max_delay: Duration,
	reset_interval: Duration,
	jitter_ratio: f64,
	attempt: u32,
	good_run_at: Option<Instant>,
	jitter: Box<dyn JitterSource>,
}

impl BackoffStrategy {
	pub fn new(first_delay: Duration, max_delay: Duration) -> Self {
		Self {
			first_delay,
			max_delay,
			reset_interval: crate::config::DEFAULT_RESET_INTERVAL,
			jitter_ratio: crate::config::DEFAULT_JITTER_RATIO,
			attempt: 0,
			good_run_at: None,
			jitter: Box::new(RandomJitter::new()),
		}
	}

	pub fn with_reset_interval(mut self, reset_interval: Duration) -> Self {
		self.reset_interval = reset_interval;
		self
	}

	pub fn with_jitter_ratio(mut self, ratio: f64) -> Self {
		self.jitter_ratio = ratio.clamp(0.0, 1.0);
		self
	}

	pub fn with_jitter(mut self, jitter: Box<dyn JitterSource>) -> Self {
		self.jitter = jitter;
		self
	}

	/// Records that a connection was just established.
	pub fn mark_good_run_now(&mut self) {
		self.good_run_at = Some(Instant::now());
	}

	/// Number of delays handed out since the last reset.
	pub fn attempt(&self) -> u32 {
		self.attempt
	}

	/// Computes the delay before the next reconnect.
	pub fn next_delay(&mut self, force_ceiling: bool) -> Duration {
		if let Some(good_run_at) = self.good_run_at {
			if good_run_at.elapsed() >= self.reset_interval {
				self.attempt = 0;
				self.good_run_at = None;
			}
		}

		if force_ceiling {
			self.attempt = self.attempt.saturating_add(1);
			return self.max_delay;
		}

		let exponential = self.first_delay.as_secs_f64() * 2f64.powi(self.attempt.min(63) as i32);
		let capped = exponential.min(self.max_delay.as_secs_f64());
		let removed = capped * self.jitter_ratio * self.jitter.next_fraction().clamp(0.0, 1.0);
		self.attempt = self.attempt.saturating_add(1);

		Duration::try_from_secs_f64((capped - removed).max(0.0)).unwrap_or(self.max_delay)
	}
}

impl fmt::Debug for BackoffStrategy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("BackoffStrategy")
			.field("first_delay", &self.first_delay)
			.field("max_delay", &self.max_delay)
			.field("reset_interval", &self.reset_interval)
			.field("jitter_ratio", &self.jitter_ratio)
			.field("attempt", &self.attempt)
			.field("good_run_at", &self.good_run_at)
			.finish_non_exhaustive()
	}
}
