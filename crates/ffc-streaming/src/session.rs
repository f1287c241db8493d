// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! One logical streaming connection.
//!
//! A [`ConnectionSession`] turns the transport's lifecycle events into
//! protocol actions: it sends the sync request on open, hands decoded events to
//! the applier, and classifies how the connection ended. Whether and when to
//! reconnect is left to its [`SessionOwner`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use ffc_streaming_core::close::{
	GOING_AWAY_CLOSE, INVALID_REQUEST_CLOSE, INVALID_REQUEST_CLOSE_REASON, NORMAL_CLOSE,
	NORMAL_CLOSE_REASON, RECONNECT_SENTINEL_REASON,
};
use ffc_streaming_core::{
	ConnectionState, ErrorInfo, ErrorKind, InboundEvent, MessageCodec, OutboundSyncRequest,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::fault::TransportFault;
use crate::lock;
use crate::transport::{ConnectRequest, Transport, TransportEvent, TransportHandle};

/// What a session needs from the controller that opened it.
#[async_trait]
pub(crate) trait SessionOwner: Send + Sync + 'static {
	/// True while `session_id` is the controller's latest session.
	fn is_current(&self, session_id: u64) -> bool;

	/// Marks the controller connected on behalf of `session_id`.
	///
	/// Fails if the session was superseded or another one is already connected.
	fn claim(&self, session_id: u64) -> bool;

	/// Clears the connected flag if `session_id` is still current.
	fn release(&self, session_id: u64);

	async fn sync_request(&self) -> OutboundSyncRequest;

	fn codec(&self) -> &dyn MessageCodec;

	fn record_event(&self);

	fn enqueue(&self, session_id: u64, event: InboundEvent);

	fn report(&self, state: ConnectionState, error: Option<ErrorInfo>);

	fn mark_good_run(&self);

	fn reconnect(self: Arc<Self>, force_ceiling: bool);
}

/// How a close code is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CloseDisposition {
	/// Normal or going-away close: report `Off`, stay down.
	Shutdown,
	/// Server rejected the request: report `Off` with an error, stay down.
	RequestRejected,
	/// Self-inflicted close after a failed apply: reconnect without reporting.
	SelfReconnect,
	/// Anything else: report `Interrupted` and reconnect.
	Unexpected,
}

pub(crate) fn classify_close(code: u16, reason: &str) -> CloseDisposition {
	if reason == RECONNECT_SENTINEL_REASON {
		return CloseDisposition::SelfReconnect;
	}
	match code {
		NORMAL_CLOSE | GOING_AWAY_CLOSE => CloseDisposition::Shutdown,
		INVALID_REQUEST_CLOSE => CloseDisposition::RequestRejected,
		_ => CloseDisposition::Unexpected,
	}
}

pub(crate) struct ConnectionSession {
	id: u64,
	handle: Box<dyn TransportHandle>,
	/// Close this side asked for; wins over whatever the peer reports.
	local_close: Mutex<Option<(u16, String)>>,
	/// Set once the end of this session has been handled.
	settled: AtomicBool,
}

impl ConnectionSession {
	/// Opens a connection and starts dispatching its events.
	pub(crate) fn open(
		id: u64,
		transport: &dyn Transport,
		request: ConnectRequest,
		owner: Weak<dyn SessionOwner>,
	) -> Arc<Self> {
		let (events_tx, events_rx) = mpsc::unbounded_channel();
		let handle = transport.open(request, events_tx);
		let session = Arc::new(Self {
			id,
			handle,
			local_close: Mutex::new(None),
			settled: AtomicBool::new(false),
		});
		tokio::spawn(dispatch(Arc::clone(&session), events_rx, owner));
		session
	}

	pub(crate) fn id(&self) -> u64 {
		self.id
	}

	/// Closes the connection, remembering the intent.
	///
	/// The latest intent is the one honored when the transport reports the end
	/// of the connection.
	pub(crate) fn close(&self, code: u16, reason: &str) {
		*lock(&self.local_close) = Some((code, reason.to_string()));
		if !self.handle.close(code, reason) {
			debug!(session = self.id, "Transport already gone");
		}
	}

	/// Closes a session that has been replaced, without reporting anything.
	pub(crate) fn retire(&self) {
		self.settled.store(true, Ordering::SeqCst);
		self.close(NORMAL_CLOSE, NORMAL_CLOSE_REASON);
	}

	fn local_close(&self) -> Option<(u16, String)> {
		lock(&self.local_close).clone()
	}

	async fn handle_open(&self, owner: &Arc<dyn SessionOwner>) {
		if !owner.claim(self.id) {
			debug!(session = self.id, "Dropping superseded connection");
			self.retire();
			return;
		}

		owner.mark_good_run();

		let request = owner.sync_request().await;
		match owner.codec().encode_sync_request(&request) {
			Ok(text) => {
				debug!(
					session = self.id,
					start_timestamp = request.last_known_version,
					"Sending data sync request"
				);
				if !self.handle.send(text) {
					warn!(session = self.id, "Failed to queue data sync request");
				}
			}
			Err(e) => {
				error!(session = self.id, error = %e, "Failed to encode data sync request");
				self.abandon(owner, TransportFault::Runtime(e.to_string()));
			}
		}
	}

	fn handle_message(&self, owner: &Arc<dyn SessionOwner>, text: &str) {
		if self.settled.load(Ordering::SeqCst) || !owner.is_current(self.id) {
			return;
		}
		owner.record_event();

		match owner.codec().decode(text) {
			Ok(Some(event)) => {
				debug!(
					session = self.id,
					event_type = %event.event_type,
					version = event.version,
					items = event.item_count(),
					"Received streaming update"
				);
				owner.enqueue(self.id, event);
			}
			Ok(None) => debug!(session = self.id, "Discarding message with nothing to apply"),
			Err(e) => {
				warn!(session = self.id, error = %e, "Failed to decode streaming message");
				self.abandon(owner, TransportFault::Decode(e.to_string()));
			}
		}
	}

	fn handle_closed(&self, owner: Arc<dyn SessionOwner>, code: u16, reason: String) {
		if self.settled.swap(true, Ordering::SeqCst) || !owner.is_current(self.id) {
			return;
		}
		owner.release(self.id);

		let (code, reason) = self.local_close().unwrap_or((code, reason));
		info!(session = self.id, code, reason = %reason, "Streaming connection closed");

		match classify_close(code, &reason) {
			CloseDisposition::Shutdown => owner.report(ConnectionState::Off, None),
			CloseDisposition::RequestRejected => {
				let message = if reason.is_empty() {
					INVALID_REQUEST_CLOSE_REASON.to_string()
				} else {
					reason
				};
				owner.report(
					ConnectionState::Off,
					Some(ErrorInfo::new(ErrorKind::RequestInvalidError, message)),
				);
			}
			CloseDisposition::SelfReconnect => owner.reconnect(false),
			CloseDisposition::Unexpected => {
				let message = if reason.is_empty() {
					format!("unexpected close code {code}")
				} else {
					reason
				};
				owner.report(
					ConnectionState::Interrupted,
					Some(ErrorInfo::new(ErrorKind::UnknownCloseCode, message)),
				);
				owner.reconnect(false);
			}
		}
	}

	fn handle_failure(&self, owner: Arc<dyn SessionOwner>, fault: TransportFault) {
		if let Some((code, reason)) = self.local_close() {
			debug!(session = self.id, error = %fault, "Connection failed while closing");
			self.handle_closed(owner, code, reason);
			return;
		}
		if self.settled.swap(true, Ordering::SeqCst) || !owner.is_current(self.id) {
			return;
		}
		owner.release(self.id);
		settle_fault(owner, fault);
	}

	/// Gives up on the connection after a local fault.
	fn abandon(&self, owner: &Arc<dyn SessionOwner>, fault: TransportFault) {
		if self.settled.swap(true, Ordering::SeqCst) {
			return;
		}
		owner.release(self.id);
		self.close(NORMAL_CLOSE, NORMAL_CLOSE_REASON);
		settle_fault(Arc::clone(owner), fault);
	}
}

fn settle_fault(owner: Arc<dyn SessionOwner>, fault: TransportFault) {
	let classification = fault.classify();
	warn!(
		error = %fault,
		retryable = classification.retryable,
		force_ceiling = classification.force_ceiling,
		"Streaming connection failed"
	);

	if classification.retryable {
		owner.report(ConnectionState::Interrupted, Some(classification.error));
		owner.reconnect(classification.force_ceiling);
	} else {
		owner.report(ConnectionState::Off, Some(classification.error));
	}
}

async fn dispatch(
	session: Arc<ConnectionSession>,
	mut events: mpsc::UnboundedReceiver<TransportEvent>,
	owner: Weak<dyn SessionOwner>,
) {
	while let Some(event) = events.recv().await {
		let Some(owner) = owner.upgrade() else {
			session.retire();
			break;
		};

		match event {
			TransportEvent::Opened => session.handle_open(&owner).await,
			TransportEvent::Message(text) => session.handle_message(&owner, &text),
			TransportEvent::Closed { code, reason } => {
				session.handle_closed(owner, code, reason);
				break;
			}
			TransportEvent::Failed(fault) => {
				session.handle_failure(owner, fault);
				break;
			}
		}
	}
}
