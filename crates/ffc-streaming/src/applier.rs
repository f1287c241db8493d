// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Sequential application of inbound events to the data store.
//!
//! A single worker task drains a FIFO queue, so events are applied in receipt
//! order and never concurrently.

use std::sync::{Arc, Weak};

use ffc_streaming_core::{EventType, InboundEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::store::DataStore;

/// Told about the outcome of every applied event.
pub(crate) trait ApplyObserver: Send + Sync + 'static {
	fn on_applied(&self, session_id: u64, event: &InboundEvent);
	fn on_apply_failed(&self, session_id: u64, event: &InboundEvent);
}

struct ApplyJob {
	session_id: u64,
	event: InboundEvent,
}

pub(crate) struct UpdateApplier {
	queue: mpsc::UnboundedSender<ApplyJob>,
	worker: JoinHandle<()>,
}

impl UpdateApplier {
	pub(crate) fn spawn(store: Arc<dyn DataStore>, observer: Weak<dyn ApplyObserver>) -> Self {
		let (queue, jobs) = mpsc::unbounded_channel();
		let worker = tokio::spawn(run_worker(store, jobs, observer));
		Self { queue, worker }
	}

	/// Queues an event received on `session_id`.
	pub(crate) fn submit(&self, session_id: u64, event: InboundEvent) -> bool {
		self.queue.send(ApplyJob { session_id, event }).is_ok()
	}

	/// Stops accepting events and waits until queued ones are applied.
	pub(crate) async fn shutdown(self) {
		drop(self.queue);
		if let Err(e) = self.worker.await {
			warn!(error = %e, "Update worker ended abnormally");
		}
	}
}

async fn run_worker(
	store: Arc<dyn DataStore>,
	mut jobs: mpsc::UnboundedReceiver<ApplyJob>,
	observer: Weak<dyn ApplyObserver>,
) {
	while let Some(job) = jobs.recv().await {
		let applied = apply_event(store.as_ref(), &job.event).await;

		debug!(
			event_type = %job.event.event_type,
			version = job.event.version,
			items = job.event.item_count(),
			applied,
			"Applied streaming update"
		);

		let Some(observer) = observer.upgrade() else {
			continue;
		};
		if applied {
			observer.on_applied(job.session_id, &job.event);
		} else {
			observer.on_apply_failed(job.session_id, &job.event);
		}
	}
	debug!("Update worker drained");
}

/// Applies one event. Patches stop at the first failed upsert.
pub(crate) async fn apply_event(store: &dyn DataStore, event: &InboundEvent) -> bool {
	match event.event_type {
		EventType::Full => store.init(&event.payload, event.version).await,
		EventType::Patch => {
			for (category, key, item) in event.items() {
				if !store.upsert(category, key, item, event.version).await {
					return false;
				}
			}
			true
		}
	}
}
