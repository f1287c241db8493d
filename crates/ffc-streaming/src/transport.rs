// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Transport seam between the connection session and the network.
//!
//! A transport opens one connection per [`Transport::open`] call and reports
//! its lifecycle as [`TransportEvent`]s, in receipt order, on the channel it
//! was given. After `Closed` or `Failed` it sends nothing more.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use crate::fault::TransportFault;

/// Lifecycle event of one transport connection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
	Opened,
	Message(String),
	Closed { code: u16, reason: String },
	Failed(TransportFault),
}

/// Everything needed to open one connection.
#[derive(Clone)]
pub struct ConnectRequest {
	/// Endpoint including the `token` and `type` query parameters.
	pub url: Url,
	pub headers: Vec<(String, String)>,
	pub connect_timeout: Duration,
	pub ping_interval: Duration,
}

impl ConnectRequest {
	/// Endpoint with the query string removed, for logging.
	pub fn redacted_url(&self) -> String {
		let mut url = self.url.clone();
		url.set_query(None);
		url.to_string()
	}
}

impl fmt::Debug for ConnectRequest {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let header_names: Vec<&str> = self.headers.iter().map(|(name, _)| name.as_str()).collect();
		f.debug_struct("ConnectRequest")
			.field("url", &self.redacted_url())
			.field("headers", &header_names)
			.field("connect_timeout", &self.connect_timeout)
			.field("ping_interval", &self.ping_interval)
			.finish()
	}
}

/// Opens streaming connections.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
	/// Starts connecting in the background and returns a handle right away.
	///
	/// Events for this connection, starting with `Opened` or `Failed`, are sent
	/// on `events`.
	fn open(
		&self,
		request: ConnectRequest,
		events: mpsc::UnboundedSender<TransportEvent>,
	) -> Box<dyn TransportHandle>;

	/// Releases transport-wide resources. Safe to call more than once.
	async fn shutdown(&self) {}
}

/// Control side of one open connection.
pub trait TransportHandle: Send + Sync {
	/// Queues a text frame. Returns false if the connection is gone.
	fn send(&self, text: String) -> bool;

	/// Starts a close handshake. Returns false if the connection is gone.
	fn close(&self, code: u16, reason: &str) -> bool;
}
