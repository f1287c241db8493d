// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Status reporting.
//!
//! The controller reports every state transition to a [`StatusSink`].
//! [`StatusTracker`] is a sink that remembers the latest state and lets callers
//! wait for a given one.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ffc_streaming_core::{ConnectionState, ErrorInfo};
use tokio::sync::watch;
use tracing::{info, warn};

/// Receives connection state transitions.
///
/// Called from the transport and applier tasks; implementations must not block.
pub trait StatusSink: Send + Sync + 'static {
	fn update_status(&self, state: ConnectionState, error: Option<ErrorInfo>);
}

/// Logs transitions and forwards them to the sink.
#[derive(Clone)]
pub(crate) struct StatusReporter {
	sink: Arc<dyn StatusSink>,
}

impl StatusReporter {
	pub(crate) fn new(sink: Arc<dyn StatusSink>) -> Self {
		Self { sink }
	}

	pub(crate) fn report(&self, state: ConnectionState, error: Option<ErrorInfo>) {
		match &error {
			Some(err) => warn!(
				state = %state,
				kind = %err.kind,
				message = %err.message,
				"Streaming status changed with error"
			),
			None => info!(state = %state, "Streaming status changed"),
		}
		self.sink.update_status(state, error);
	}
}

/// Latest status observed by a [`StatusTracker`].
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
	pub state: ConnectionState,
	pub state_since: DateTime<Utc>,
	pub last_error: Option<ErrorInfo>,
	pub last_error_at: Option<DateTime<Utc>>,
}

/// [`StatusSink`] that keeps the current state and the last error.
///
/// An `Interrupted` report arriving before the first `Ok` leaves the state at
/// `Initializing`; the error is still recorded.
#[derive(Debug)]
pub struct StatusTracker {
	tx: watch::Sender<StatusSnapshot>,
}

impl StatusTracker {
	pub fn new() -> Self {
		let (tx, _rx) = watch::channel(StatusSnapshot {
			state: ConnectionState::Initializing,
			state_since: Utc::now(),
			last_error: None,
			last_error_at: None,
		});
		Self { tx }
	}

	pub fn snapshot(&self) -> StatusSnapshot {
		self.tx.borrow().clone()
	}

	pub fn state(&self) -> ConnectionState {
		self.tx.borrow().state
	}

	pub fn last_error(&self) -> Option<ErrorInfo> {
		self.tx.borrow().last_error.clone()
	}

	/// Waits until the state equals `state`.
	///
	/// Returns false on timeout, or as soon as the state becomes `Off` while
	/// waiting for anything else.
	pub async fn wait_for_state(&self, state: ConnectionState, timeout: Duration) -> bool {
		let mut rx = self.tx.subscribe();
		let reached = tokio::time::timeout(timeout, async {
			rx.wait_for(|s| s.state == state || s.state == ConnectionState::Off)
				.await
				.map(|s| s.state == state)
				.unwrap_or(false)
		})
		.await;
		reached.unwrap_or(false)
	}
}

impl Default for StatusTracker {
	fn default() -> Self {
		Self::new()
	}
}

impl StatusSink for StatusTracker {
	fn update_status(&self, state: ConnectionState, error: Option<ErrorInfo>) {
		let now = Utc::now();
		self.tx.send_modify(|current| {
			let next = if state == ConnectionState::Interrupted
				&& current.state == ConnectionState::Initializing
			{
				ConnectionState::Initializing
			} else {
				state
			};
			if next != current.state {
				current.state = next;
				current.state_since = now;
			}
			if let Some(err) = error {
				current.last_error = Some(err);
				current.last_error_at = Some(now);
			}
		});
	}
}
