// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Stream controller: connect, run, fail, back off, reconnect.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use ffc_streaming_core::close::{
	NORMAL_CLOSE, NORMAL_CLOSE_REASON, RECONNECT_CLOSE, RECONNECT_SENTINEL_REASON,
};
use ffc_streaming_core::{
	ConnectionState, ErrorInfo, InboundEvent, JsonCodec, MessageCodec, OutboundSyncRequest,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::applier::{ApplyObserver, UpdateApplier};
use crate::backoff::{BackoffStrategy, JitterSource, RandomJitter};
use crate::config::{StreamingConfig, USER_AGENT};
use crate::gate::{InitHandle, InitializationGate};
use crate::lock;
use crate::session::{ConnectionSession, SessionOwner};
use crate::status::{StatusReporter, StatusSink};
use crate::store::DataStore;
use crate::token::{SignedTokenProvider, TokenProvider};
use crate::transport::{ConnectRequest, Transport};
use crate::ws::WsTransport;

/// Client-type marker sent with every connection.
const CLIENT_TYPE: &str = "server";

/// Builder for [`Streaming`].
pub struct StreamingBuilder {
	config: StreamingConfig,
	store: Arc<dyn DataStore>,
	status: Arc<dyn StatusSink>,
	transport: Option<Arc<dyn Transport>>,
	codec: Option<Box<dyn MessageCodec>>,
	tokens: Option<Arc<dyn TokenProvider>>,
	jitter: Option<Box<dyn JitterSource>>,
}

impl StreamingBuilder {
	/// Replaces the WebSocket transport.
	pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
		self.transport = Some(transport);
		self
	}

	/// Replaces the JSON codec.
	pub fn codec<C: MessageCodec>(mut self, codec: C) -> Self {
		self.codec = Some(Box::new(codec));
		self
	}

	/// Replaces the HMAC token provider.
	pub fn token_provider<P: TokenProvider>(mut self, provider: P) -> Self {
		self.tokens = Some(Arc::new(provider));
		self
	}

	/// Replaces the random jitter source of the backoff strategy.
	pub fn jitter<J: JitterSource + 'static>(mut self, jitter: J) -> Self {
		self.jitter = Some(Box::new(jitter));
		self
	}

	pub fn build(self) -> Streaming {
		let jitter = self
			.jitter
			.unwrap_or_else(|| Box::new(RandomJitter::new()));
		let backoff = BackoffStrategy::new(
			self.config.first_retry_delay(),
			self.config.max_retry_delay(),
		)
		.with_reset_interval(self.config.reset_interval())
		.with_jitter_ratio(self.config.jitter_ratio())
		.with_jitter(jitter);

		let tokens = self.tokens.unwrap_or_else(|| {
			Arc::new(SignedTokenProvider::new(self.config.env_secret().clone()))
		});

		let inner = StreamingInner {
			transport: self
				.transport
				.unwrap_or_else(|| Arc::new(WsTransport::new())),
			codec: self.codec.unwrap_or_else(|| Box::new(JsonCodec)),
			tokens,
			store: self.store,
			reporter: StatusReporter::new(self.status),
			backoff: Mutex::new(backoff),
			gate: InitializationGate::new(),
			connected: AtomicBool::new(false),
			closed: AtomicBool::new(false),
			attempts: AtomicU32::new(0),
			events_received: AtomicU64::new(0),
			next_session_id: AtomicU64::new(0),
			current_session: AtomicU64::new(0),
			session: Mutex::new(None),
			applier: Mutex::new(None),
			shutdown: Mutex::new(CancellationToken::new()),
			config: self.config,
		};

		Streaming {
			inner: Arc::new(inner),
		}
	}
}

/// Streaming update channel.
///
/// Keeps one connection to the streaming endpoint open, applies the updates it
/// receives to the [`DataStore`] in order, and reports connection health to a
/// [`StatusSink`]. Dropping it closes the connection without waiting.
pub struct Streaming {
	inner: Arc<StreamingInner>,
}

impl Streaming {
	pub fn builder(
		config: StreamingConfig,
		store: Arc<dyn DataStore>,
		status: Arc<dyn StatusSink>,
	) -> StreamingBuilder {
		StreamingBuilder {
			config,
			store,
			status,
			transport: None,
			codec: None,
			tokens: None,
			jitter: None,
		}
	}

	/// Starts streaming and returns a handle that resolves on the first applied
	/// update.
	///
	/// Must be called within a Tokio runtime. Calling it again restarts the
	/// connection with a fresh attempt counter.
	pub fn start(&self) -> InitHandle {
		let inner = &self.inner;
		inner.closed.store(false, Ordering::SeqCst);
		inner.attempts.store(0, Ordering::SeqCst);
		inner.connected.store(false, Ordering::SeqCst);

		let shutdown = {
			let mut token = lock(&inner.shutdown);
			if token.is_cancelled() {
				*token = CancellationToken::new();
			}
			token.clone()
		};

		if let Some(previous) = lock(&inner.session).take() {
			previous.retire();
		}

		{
			let mut applier = lock(&inner.applier);
			if applier.is_none() {
				let observer = Arc::downgrade(inner);
				let observer: Weak<dyn ApplyObserver> = observer;
				*applier = Some(UpdateApplier::spawn(Arc::clone(&inner.store), observer));
			}
		}

		info!(url = %inner.config.streaming_url(), "Starting streaming");
		inner.connect();

		InitHandle::new(inner.gate.subscribe(), shutdown)
	}

	/// Closes the connection and waits for queued updates to be applied.
	///
	/// Safe to call more than once and in any state.
	pub async fn close(&self) {
		let inner = &self.inner;
		if inner.closed.swap(true, Ordering::SeqCst) {
			debug!("Streaming already closed");
			return;
		}

		lock(&inner.shutdown).cancel();

		let session = lock(&inner.session).take();
		if let Some(session) = session {
			session.close(NORMAL_CLOSE, NORMAL_CLOSE_REASON);
		}

		let applier = lock(&inner.applier).take();
		if let Some(applier) = applier {
			applier.shutdown().await;
		}

		inner.transport.shutdown().await;
		inner.connected.store(false, Ordering::SeqCst);
		info!("Streaming closed");
	}

	/// True once the store is populated and an update has been applied.
	pub async fn is_initialized(&self) -> bool {
		self.inner.gate.is_fired() && self.inner.store.is_initialized().await
	}

	pub fn is_connected(&self) -> bool {
		self.inner.connected.load(Ordering::SeqCst)
	}

	/// Connection attempts since the last [`Streaming::start`].
	pub fn connection_attempts(&self) -> u32 {
		self.inner.attempts.load(Ordering::SeqCst)
	}

	/// Messages received from the server, including ones with nothing to apply.
	pub fn events_received(&self) -> u64 {
		self.inner.events_received.load(Ordering::SeqCst)
	}
}

impl Drop for Streaming {
	fn drop(&mut self) {
		self.inner.closed.store(true, Ordering::SeqCst);
		lock(&self.inner.shutdown).cancel();
		if let Some(session) = lock(&self.inner.session).take() {
			session.retire();
		}
	}
}

struct StreamingInner {
	config: StreamingConfig,
	transport: Arc<dyn Transport>,
	store: Arc<dyn DataStore>,
	codec: Box<dyn MessageCodec>,
	tokens: Arc<dyn TokenProvider>,
	reporter: StatusReporter,
	backoff: Mutex<BackoffStrategy>,
	gate: InitializationGate,
	connected: AtomicBool,
	closed: AtomicBool,
	attempts: AtomicU32,
	events_received: AtomicU64,
	next_session_id: AtomicU64,
	current_session: AtomicU64,
	session: Mutex<Option<Arc<ConnectionSession>>>,
	applier: Mutex<Option<UpdateApplier>>,
	/// Cancels pending reconnects; replaced on restart.
	shutdown: Mutex<CancellationToken>,
}

impl StreamingInner {
	fn connect(self: &Arc<Self>) {
		if self.closed.load(Ordering::SeqCst) {
			debug!("Skipping connect after close");
			return;
		}
		if self.connected.load(Ordering::SeqCst) {
			debug!("Already connected");
			return;
		}

		let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
		if let Some(max) = self.config.max_retry_times() {
			if attempt >= max {
				error!(attempts = attempt, max, "Giving up on streaming connection");
				return;
			}
		}

		lock(&self.backoff).mark_good_run_now();

		let request = self.connect_request();
		info!(attempt = attempt + 1, url = %request.redacted_url(), "Connecting to streaming endpoint");

		let id = self.next_session_id.fetch_add(1, Ordering::SeqCst) + 1;
		self.current_session.store(id, Ordering::SeqCst);

		let owner = Arc::downgrade(self);
		let owner: Weak<dyn SessionOwner> = owner;
		let session = ConnectionSession::open(id, self.transport.as_ref(), request, owner);
		if let Some(previous) = lock(&self.session).replace(session) {
			previous.retire();
		}
	}

	fn connect_request(&self) -> ConnectRequest {
		let mut url = self.config.streaming_url().clone();
		url.query_pairs_mut()
			.append_pair("token", &self.tokens.token())
			.append_pair("type", CLIENT_TYPE);

		let mut headers = vec![
			(
				"Authorization".to_string(),
				self.config.env_secret().expose().to_string(),
			),
			("User-Agent".to_string(), USER_AGENT.to_string()),
		];
		headers.extend(self.config.headers().iter().cloned());

		ConnectRequest {
			url,
			headers,
			connect_timeout: self.config.connect_timeout(),
			ping_interval: self.config.ping_interval(),
		}
	}

	fn schedule_reconnect(self: &Arc<Self>, force_ceiling: bool) {
		if self.closed.load(Ordering::SeqCst) {
			return;
		}

		let delay = lock(&self.backoff).next_delay(force_ceiling);
		info!(
			delay_ms = delay.as_millis() as u64,
			force_ceiling, "Reconnecting to streaming endpoint"
		);

		let shutdown = lock(&self.shutdown).clone();
		let weak = Arc::downgrade(self);
		tokio::spawn(async move {
			tokio::select! {
				_ = shutdown.cancelled() => {
					debug!("Reconnect cancelled");
					return;
				}
				_ = tokio::time::sleep(delay) => {}
			}
			if let Some(inner) = weak.upgrade() {
				inner.connect();
			}
		});
	}
}

#[async_trait]
impl SessionOwner for StreamingInner {
	fn is_current(&self, session_id: u64) -> bool {
		self.current_session.load(Ordering::SeqCst) == session_id
	}

	fn claim(&self, session_id: u64) -> bool {
		self.is_current(session_id)
			&& self
				.connected
				.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
				.is_ok()
	}

	fn release(&self, session_id: u64) {
		if self.is_current(session_id) {
			self.connected.store(false, Ordering::SeqCst);
		}
	}

	async fn sync_request(&self) -> OutboundSyncRequest {
		if self.store.is_initialized().await {
			OutboundSyncRequest::resume_from(self.store.version().await)
		} else {
			OutboundSyncRequest::origin()
		}
	}

	fn codec(&self) -> &dyn MessageCodec {
		self.codec.as_ref()
	}

	fn record_event(&self) {
		self.events_received.fetch_add(1, Ordering::SeqCst);
	}

	fn enqueue(&self, session_id: u64, event: InboundEvent) {
		let queued = lock(&self.applier)
			.as_ref()
			.map(|applier| applier.submit(session_id, event))
			.unwrap_or(false);
		if !queued {
			debug!(session = session_id, "Update worker stopped, dropping event");
		}
	}

	fn report(&self, state: ConnectionState, error: Option<ErrorInfo>) {
		self.reporter.report(state, error);
	}

	fn mark_good_run(&self) {
		lock(&self.backoff).mark_good_run_now();
	}

	fn reconnect(self: Arc<Self>, force_ceiling: bool) {
		self.schedule_reconnect(force_ceiling);
	}
}

impl ApplyObserver for StreamingInner {
	fn on_applied(&self, _session_id: u64, _event: &InboundEvent) {
		if !self.closed.load(Ordering::SeqCst) {
			self.reporter.report(ConnectionState::Ok, None);
		}
		if self.gate.fire() {
			info!("Streaming initialized");
		}
	}

	fn on_apply_failed(&self, session_id: u64, event: &InboundEvent) {
		if self.closed.load(Ordering::SeqCst) {
			return;
		}
		let session = lock(&self.session).clone();
		match session {
			Some(session) if session.id() == session_id && self.is_current(session_id) => {
				warn!(
					session = session_id,
					event_type = %event.event_type,
					version = event.version,
					"Store rejected update, reconnecting"
				);
				session.close(RECONNECT_CLOSE, RECONNECT_SENTINEL_REASON);
			}
			_ => debug!(session = session_id, "Ignoring failed update from stale session"),
		}
	}
}
