// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Scripted transport, recording store and recording sink for unit tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ffc_streaming_core::{
	Category, ConnectionState, ErrorInfo, InboundEvent, Item, Payload,
};
use serde_json::json;
use tokio::sync::mpsc;

use crate::config::{StreamingConfig, StreamingConfigBuilder};
use crate::fault::TransportFault;
use crate::status::StatusSink;
use crate::store::DataStore;
use crate::token::TokenProvider;
use crate::transport::{ConnectRequest, Transport, TransportEvent, TransportHandle};

pub(crate) fn test_config() -> StreamingConfigBuilder {
	StreamingConfig::builder()
		.streaming_uri("ws://127.0.0.1:9")
		.env_secret("test-secret")
		.jitter_ratio(0.0)
}

/// Lets spawned tasks run.
pub(crate) async fn settle() {
	tokio::time::sleep(Duration::from_millis(10)).await;
}

pub(crate) fn full_snapshot(version: i64, keys: &[&str]) -> InboundEvent {
	let items = keys
		.iter()
		.map(|key| (key.to_string(), Item::new(*key, version, json!({ "key": key }))))
		.collect();
	let mut payload = Payload::new();
	payload.insert(Category::FeatureFlags, items);
	InboundEvent::full(version, payload)
}

pub(crate) fn flag_patch(version: i64, key: &str) -> InboundEvent {
	let mut items = BTreeMap::new();
	items.insert(key.to_string(), Item::new(key, version, json!({ "key": key })));
	let mut payload = Payload::new();
	payload.insert(Category::FeatureFlags, items);
	InboundEvent::patch(version, payload)
}

pub(crate) fn full_snapshot_json(version: i64, keys: &[&str]) -> String {
	let flags: Vec<_> = keys
		.iter()
		.map(|key| json!({ "key": key, "timestamp": version }))
		.collect();
	json!({
		"messageType": "data-sync",
		"data": { "eventType": "full", "timestamp": version, "featureFlags": flags, "segments": [] }
	})
	.to_string()
}

pub(crate) fn flag_patch_json(version: i64, key: &str) -> String {
	json!({
		"messageType": "data-sync",
		"data": {
			"eventType": "patch",
			"timestamp": version,
			"featureFlags": [{ "key": key, "timestamp": version }]
		}
	})
	.to_string()
}

/// Transport whose connections are driven by the test.
pub(crate) struct FakeTransport {
	connections: Mutex<Vec<Arc<FakeConnection>>>,
	shutdowns: AtomicUsize,
}

impl FakeTransport {
	pub(crate) fn new() -> Self {
		Self {
			connections: Mutex::new(Vec::new()),
			shutdowns: AtomicUsize::new(0),
		}
	}

	pub(crate) fn connection_count(&self) -> usize {
		self.connections.lock().unwrap().len()
	}

	pub(crate) fn shutdown_count(&self) -> usize {
		self.shutdowns.load(Ordering::SeqCst)
	}

	/// Waits until `count` connections were opened and returns the last one.
	pub(crate) async fn wait_for_connections(
		&self,
		count: usize,
		within: Duration,
	) -> Arc<FakeConnection> {
		tokio::time::timeout(within, async {
			loop {
				if let Some(conn) = self.connections.lock().unwrap().get(count - 1) {
					return Arc::clone(conn);
				}
				settle().await;
			}
		})
		.await
		.unwrap_or_else(|_| panic!("expected {count} connections within {within:?}"))
	}
}

#[async_trait]
impl Transport for FakeTransport {
	fn open(
		&self,
		request: ConnectRequest,
		events: mpsc::UnboundedSender<TransportEvent>,
	) -> Box<dyn TransportHandle> {
		let conn = Arc::new(FakeConnection {
			request,
			events,
			sent: Mutex::new(Vec::new()),
			closes: Mutex::new(Vec::new()),
			ended: AtomicBool::new(false),
		});
		self.connections.lock().unwrap().push(Arc::clone(&conn));
		Box::new(FakeHandle(conn))
	}

	async fn shutdown(&self) {
		self.shutdowns.fetch_add(1, Ordering::SeqCst);
	}
}

pub(crate) struct FakeConnection {
	pub(crate) request: ConnectRequest,
	events: mpsc::UnboundedSender<TransportEvent>,
	sent: Mutex<Vec<String>>,
	closes: Mutex<Vec<(u16, String)>>,
	ended: AtomicBool,
}

impl FakeConnection {
	pub(crate) fn open(&self) {
		let _ = self.events.send(TransportEvent::Opened);
	}

	pub(crate) fn message(&self, text: String) {
		let _ = self.events.send(TransportEvent::Message(text));
	}

	pub(crate) fn close_from_server(&self, code: u16, reason: &str) {
		if !self.ended.swap(true, Ordering::SeqCst) {
			let _ = self.events.send(TransportEvent::Closed {
				code,
				reason: reason.to_string(),
			});
		}
	}

	pub(crate) fn fail(&self, fault: TransportFault) {
		if !self.ended.swap(true, Ordering::SeqCst) {
			let _ = self.events.send(TransportEvent::Failed(fault));
		}
	}

	/// Text frames sent by the client.
	pub(crate) fn sent(&self) -> Vec<String> {
		self.sent.lock().unwrap().clone()
	}

	/// Close requests made by the client.
	pub(crate) fn closes(&self) -> Vec<(u16, String)> {
		self.closes.lock().unwrap().clone()
	}
}

/// Echoes client closes back as `Closed`, like a well-behaved server.
struct FakeHandle(Arc<FakeConnection>);

impl TransportHandle for FakeHandle {
	fn send(&self, text: String) -> bool {
		if self.0.ended.load(Ordering::SeqCst) {
			return false;
		}
		self.0.sent.lock().unwrap().push(text);
		true
	}

	fn close(&self, code: u16, reason: &str) -> bool {
		self.0.closes.lock().unwrap().push((code, reason.to_string()));
		if self.0.ended.swap(true, Ordering::SeqCst) {
			return false;
		}
		let _ = self.0.events.send(TransportEvent::Closed {
			code,
			reason: reason.to_string(),
		});
		true
	}
}

/// Store that records every successful operation.
pub(crate) struct RecordingStore {
	ops: Mutex<Vec<String>>,
	fail_upserts: AtomicBool,
	initialized: AtomicBool,
	version: AtomicI64,
	in_flight: AtomicUsize,
	max_in_flight: AtomicUsize,
	op_delay_ms: AtomicU64,
}

impl RecordingStore {
	pub(crate) fn new() -> Self {
		Self {
			ops: Mutex::new(Vec::new()),
			fail_upserts: AtomicBool::new(false),
			initialized: AtomicBool::new(false),
			version: AtomicI64::new(0),
			in_flight: AtomicUsize::new(0),
			max_in_flight: AtomicUsize::new(0),
			op_delay_ms: AtomicU64::new(0),
		}
	}

	/// Makes every `init` and `upsert` take `delay` before completing.
	pub(crate) fn with_op_delay(self, delay: Duration) -> Self {
		self.op_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
		self
	}

	pub(crate) fn initialized_at(version: i64) -> Self {
		let store = Self::new();
		store.initialized.store(true, Ordering::SeqCst);
		store.version.store(version, Ordering::SeqCst);
		store
	}

	pub(crate) fn ops(&self) -> Vec<String> {
		self.ops.lock().unwrap().clone()
	}

	pub(crate) fn fail_upserts(&self, fail: bool) {
		self.fail_upserts.store(fail, Ordering::SeqCst);
	}

	pub(crate) fn max_in_flight(&self) -> usize {
		self.max_in_flight.load(Ordering::SeqCst)
	}

	async fn enter(&self) {
		let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
		self.max_in_flight.fetch_max(now, Ordering::SeqCst);
		tokio::task::yield_now().await;
		let delay = self.op_delay_ms.load(Ordering::SeqCst);
		if delay > 0 {
			tokio::time::sleep(Duration::from_millis(delay)).await;
		}
	}

	fn exit(&self) {
		self.in_flight.fetch_sub(1, Ordering::SeqCst);
	}
}

#[async_trait]
impl DataStore for RecordingStore {
	async fn is_initialized(&self) -> bool {
		self.initialized.load(Ordering::SeqCst)
	}

	async fn version(&self) -> i64 {
		self.version.load(Ordering::SeqCst)
	}

	async fn init(&self, _payload: &Payload, version: i64) -> bool {
		self.enter().await;
		self.ops.lock().unwrap().push(format!("init:{version}"));
		self.initialized.store(true, Ordering::SeqCst);
		self.version.fetch_max(version, Ordering::SeqCst);
		self.exit();
		true
	}

	async fn upsert(&self, category: Category, key: &str, _item: &Item, version: i64) -> bool {
		self.enter().await;
		let ok = !self.fail_upserts.load(Ordering::SeqCst);
		if ok {
			self.ops
				.lock()
				.unwrap()
				.push(format!("upsert:{}:{key}:{version}", category.wire_name()));
			self.version.fetch_max(version, Ordering::SeqCst);
		}
		self.exit();
		ok
	}
}

/// Status sink that keeps every report.
pub(crate) struct RecordingSink {
	reports: Mutex<Vec<(ConnectionState, Option<ErrorInfo>)>>,
}

impl RecordingSink {
	pub(crate) fn new() -> Self {
		Self {
			reports: Mutex::new(Vec::new()),
		}
	}

	pub(crate) fn reports(&self) -> Vec<(ConnectionState, Option<ErrorInfo>)> {
		self.reports.lock().unwrap().clone()
	}

	pub(crate) fn states(&self) -> Vec<ConnectionState> {
		self.reports().into_iter().map(|(state, _)| state).collect()
	}
}

impl StatusSink for RecordingSink {
	fn update_status(&self, state: ConnectionState, error: Option<ErrorInfo>) {
		self.reports.lock().unwrap().push((state, error));
	}
}

pub(crate) struct FixedToken(pub(crate) String);

impl TokenProvider for FixedToken {
	fn token(&self) -> String {
		self.0.clone()
	}
}
