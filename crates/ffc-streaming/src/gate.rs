// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! One-shot readiness signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StreamingError};

/// Fires once, on the first successfully applied update.
#[derive(Debug)]
pub(crate) struct InitializationGate {
	fired: AtomicBool,
	tx: watch::Sender<bool>,
}

impl InitializationGate {
	pub(crate) fn new() -> Self {
		let (tx, _rx) = watch::channel(false);
		Self {
			fired: AtomicBool::new(false),
			tx,
		}
	}

	/// Returns true only for the call that fired the gate.
	pub(crate) fn fire(&self) -> bool {
		if self.fired.swap(true, Ordering::SeqCst) {
			return false;
		}
		self.tx.send_replace(true);
		true
	}

	pub(crate) fn is_fired(&self) -> bool {
		self.fired.load(Ordering::SeqCst)
	}

	pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
		self.tx.subscribe()
	}
}

/// Handle returned by [`Streaming::start`](crate::Streaming::start).
///
/// Resolves once the first update has been applied. It never resolves if the
/// service stays unreachable, so callers should prefer
/// [`InitHandle::wait_timeout`].
#[derive(Debug, Clone)]
pub struct InitHandle {
	ready: watch::Receiver<bool>,
	shutdown: CancellationToken,
}

impl InitHandle {
	pub(crate) fn new(ready: watch::Receiver<bool>, shutdown: CancellationToken) -> Self {
		Self { ready, shutdown }
	}

	/// Returns true if the first update has already been applied.
	pub fn is_ready(&self) -> bool {
		*self.ready.borrow()
	}

	/// Waits for the first applied update.
	///
	/// Fails with [`StreamingError::Closed`] if the client is closed first.
	pub async fn wait(&self) -> Result<()> {
		let mut ready = self.ready.clone();
		tokio::select! {
			biased;
			fired = async { ready.wait_for(|r| *r).await.is_ok() } => {
				if fired {
					Ok(())
				} else {
					Err(StreamingError::Closed)
				}
			}
			_ = self.shutdown.cancelled() => Err(StreamingError::Closed),
		}
	}

	/// Like [`InitHandle::wait`], failing with
	/// [`StreamingError::InitializationTimeout`] after `timeout`.
	pub async fn wait_timeout(&self, timeout: Duration) -> Result<()> {
		tokio::time::timeout(timeout, self.wait())
			.await
			.map_err(|_| StreamingError::InitializationTimeout)?
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_fires_once() {
		let gate = InitializationGate::new();
		assert!(!gate.is_fired());
		assert!(gate.fire());
		assert!(!gate.fire());
		assert!(gate.is_fired());
	}

	#[tokio::test]
	async fn test_handle_resolves_after_fire() {
		let gate = InitializationGate::new();
		let handle = InitHandle::new(gate.subscribe(), CancellationToken::new());
		assert!(!handle.is_ready());

		let waiter = {
			let handle = handle.clone();
			tokio::spawn(async move { handle.wait().await })
		};
		gate.fire();

		assert!(waiter.await.unwrap().is_ok());
		assert!(handle.is_ready());
	}

	#[tokio::test]
	async fn test_handle_subscribed_after_fire_is_ready() {
		let gate = InitializationGate::new();
		gate.fire();
		let handle = InitHandle::new(gate.subscribe(), CancellationToken::new());
		assert!(handle.wait().await.is_ok());
	}

	#[tokio::test]
	async fn test_shutdown_fails_wait() {
		let gate = InitializationGate::new();
		let shutdown = CancellationToken::new();
		let handle = InitHandle::new(gate.subscribe(), shutdown.clone());

		shutdown.cancel();

		assert!(matches!(handle.wait().await, Err(StreamingError::Closed)));
	}

	#[tokio::test]
	async fn test_ready_wins_over_shutdown() {
		let gate = InitializationGate::new();
		let shutdown = CancellationToken::new();
		let handle = InitHandle::new(gate.subscribe(), shutdown.clone());

		gate.fire();
		shutdown.cancel();

		assert!(handle.wait().await.is_ok());
	}

	#[tokio::test(start_paused = true)]
	async fn test_wait_timeout() {
		let gate = InitializationGate::new();
		let handle = InitHandle::new(gate.subscribe(), CancellationToken::new());

		let result = handle.wait_timeout(Duration::from_secs(1)).await;
		assert!(matches!(result, Err(StreamingError::InitializationTimeout)));
	}
}
