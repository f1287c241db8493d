// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! WebSocket transport built on `tokio-tungstenite`.

use std::io::ErrorKind as IoErrorKind;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use ffc_streaming_core::close::{NORMAL_CLOSE, NORMAL_CLOSE_REASON, NO_STATUS_CLOSE};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::{Error as WsError, ProtocolError};
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::fault::TransportFault;
use crate::lock;
use crate::transport::{ConnectRequest, Transport, TransportEvent, TransportHandle};

/// How long a local close waits for the peer's close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// How long [`Transport::shutdown`] waits for each connection task.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Placeholder period for the ping timer when pings are disabled.
const IDLE_PERIOD: Duration = Duration::from_secs(3600);

enum Command {
	Send(String),
	Close(u16, String),
}

/// [`Transport`] that runs each connection on its own task.
#[derive(Debug, Default)]
pub struct WsTransport {
	tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WsTransport {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl Transport for WsTransport {
	fn open(
		&self,
		request: ConnectRequest,
		events: mpsc::UnboundedSender<TransportEvent>,
	) -> Box<dyn TransportHandle> {
		let (commands_tx, commands_rx) = mpsc::unbounded_channel();
		let task = tokio::spawn(run_connection(request, events, commands_rx));

		let mut tasks = lock(&self.tasks);
		tasks.retain(|t| !t.is_finished());
		tasks.push(task);

		Box::new(WsHandle {
			commands: commands_tx,
		})
	}

	async fn shutdown(&self) {
		let tasks = std::mem::take(&mut *lock(&self.tasks));
		for task in tasks {
			let abort = task.abort_handle();
			if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
				warn!("WebSocket task did not finish in time, aborting");
				abort.abort();
			}
		}
	}
}

struct WsHandle {
	commands: mpsc::UnboundedSender<Command>,
}

impl TransportHandle for WsHandle {
	fn send(&self, text: String) -> bool {
		self.commands.send(Command::Send(text)).is_ok()
	}

	fn close(&self, code: u16, reason: &str) -> bool {
		self
			.commands
			.send(Command::Close(code, reason.to_string()))
			.is_ok()
	}
}

/// Drives one connection from handshake to its final event.
async fn run_connection(
	request: ConnectRequest,
	events: mpsc::UnboundedSender<TransportEvent>,
	mut commands: mpsc::UnboundedReceiver<Command>,
) {
	let client_request = match build_request(&request) {
		Ok(r) => r,
		Err(fault) => {
			let _ = events.send(TransportEvent::Failed(fault));
			return;
		}
	};

	debug!(url = %request.redacted_url(), "Opening WebSocket connection");

	let connect = tokio::time::timeout(request.connect_timeout, connect_async(client_request));
	tokio::pin!(connect);

	let ws = loop {
		tokio::select! {
			result = &mut connect => match result {
				Ok(Ok((ws, _response))) => break ws,
				Ok(Err(e)) => {
					let _ = events.send(TransportEvent::Failed(fault_from_ws_error(&e)));
					return;
				}
				Err(_) => {
					let _ = events.send(TransportEvent::Failed(TransportFault::Timeout(format!(
						"connect timed out after {}ms",
						request.connect_timeout.as_millis()
					))));
					return;
				}
			},
			command = commands.recv() => match command {
				Some(Command::Close(code, reason)) => {
					debug!(code, "Connection closed before handshake completed");
					let _ = events.send(TransportEvent::Closed { code, reason });
					return;
				}
				Some(Command::Send(_)) => {}
				None => return,
			},
		}
	};

	info!(url = %request.redacted_url(), "WebSocket connection established");
	if events.send(TransportEvent::Opened).is_err() {
		return;
	}

	let (mut write, mut read) = ws.split();

	let pings_enabled = !request.ping_interval.is_zero();
	let ping_period = if pings_enabled {
		request.ping_interval
	} else {
		IDLE_PERIOD
	};
	let mut ping = tokio::time::interval_at(Instant::now() + ping_period, ping_period);
	ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

	let close_timer = tokio::time::sleep(IDLE_PERIOD);
	tokio::pin!(close_timer);

	let mut local_close: Option<(u16, String)> = None;
	let mut commands_open = true;
	let mut awaiting_pong = false;

	let outcome = loop {
		tokio::select! {
			frame = read.next() => match frame {
				Some(Ok(Message::Text(text))) => {
					let _ = events.send(TransportEvent::Message(text));
				}
				Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
					Ok(text) => {
						let _ = events.send(TransportEvent::Message(text));
					}
					Err(e) => {
						break TransportEvent::Failed(TransportFault::Decode(format!(
							"binary frame is not UTF-8: {e}"
						)));
					}
				},
				Some(Ok(Message::Close(frame))) => {
					let (code, reason) = match frame {
						Some(frame) => (u16::from(frame.code), frame.reason.into_owned()),
						None => local_close
							.clone()
							.unwrap_or((NO_STATUS_CLOSE, String::new())),
					};
					break TransportEvent::Closed { code, reason };
				}
				Some(Ok(Message::Pong(_))) => awaiting_pong = false,
				Some(Ok(_)) => {}
				Some(Err(e)) => break ended(local_close.take(), fault_from_ws_error(&e)),
				None => break ended(
					local_close.take(),
					TransportFault::AbruptEof("stream ended without close frame".to_string()),
				),
			},
			command = commands.recv(), if commands_open => {
				let close = match command {
					Some(Command::Send(text)) => {
						if let Err(e) = write.send(Message::Text(text)).await {
							break ended(local_close.take(), fault_from_ws_error(&e));
						}
						None
					}
					Some(Command::Close(code, reason)) => Some((code, reason)),
					None => {
						commands_open = false;
						Some((NORMAL_CLOSE, NORMAL_CLOSE_REASON.to_string()))
					}
				};

				if let Some((code, reason)) = close {
					if local_close.is_none() {
						debug!(code, reason = %reason, "Closing WebSocket connection");
						local_close = Some((code, reason.clone()));
						close_timer.as_mut().reset(Instant::now() + CLOSE_GRACE);
						let frame = CloseFrame {
							code: CloseCode::from(code),
							reason: reason.into(),
						};
						if write.send(Message::Close(Some(frame))).await.is_err() {
							break ended(
								local_close.take(),
								TransportFault::AbruptEof("close frame not sent".to_string()),
							);
						}
					}
				}
			},
			_ = ping.tick(), if pings_enabled => {
				if awaiting_pong {
					warn!("No pong received within ping interval");
					break ended(
						local_close.take(),
						TransportFault::Timeout("no pong within ping interval".to_string()),
					);
				}
				if let Err(e) = write.send(Message::Ping(Vec::new())).await {
					break ended(local_close.take(), fault_from_ws_error(&e));
				}
				awaiting_pong = true;
			},
			_ = &mut close_timer, if local_close.is_some() => {
				debug!("Peer did not answer close frame in time");
				break ended(
					local_close.take(),
					TransportFault::AbruptEof("close handshake timed out".to_string()),
				);
			},
		}
	};

	let _ = tokio::time::timeout(CLOSE_GRACE, write.close()).await;

	match &outcome {
		TransportEvent::Closed { code, reason } => {
			debug!(code, reason = %reason, "WebSocket connection closed");
		}
		TransportEvent::Failed(fault) => {
			debug!(error = %fault, "WebSocket connection failed");
		}
		_ => {}
	}
	let _ = events.send(outcome);
}

/// Final event when the stream ends: a pending local close wins over the fault.
fn ended(local_close: Option<(u16, String)>, fault: TransportFault) -> TransportEvent {
	match local_close {
		Some((code, reason)) => TransportEvent::Closed { code, reason },
		None => TransportEvent::Failed(fault),
	}
}

fn build_request(request: &ConnectRequest) -> Result<Request, TransportFault> {
	let mut client_request = request
		.url
		.as_str()
		.into_client_request()
		.map_err(|e| fault_from_ws_error(&e))?;

	for (name, value) in &request.headers {
		let header_name = HeaderName::from_bytes(name.as_bytes())
			.map_err(|e| TransportFault::Runtime(format!("invalid header name {name}: {e}")))?;
		let header_value = HeaderValue::from_str(value)
			.map_err(|_| TransportFault::Runtime(format!("invalid value for header {name}")))?;
		client_request
			.headers_mut()
			.insert(header_name, header_value);
	}

	Ok(client_request)
}

/// Maps a tungstenite error onto the transport fault taxonomy.
pub(crate) fn fault_from_ws_error(err: &WsError) -> TransportFault {
	let detail = err.to_string();
	match err {
		WsError::Io(io) => match io.kind() {
			IoErrorKind::TimedOut | IoErrorKind::WouldBlock => TransportFault::Timeout(detail),
			IoErrorKind::ConnectionReset
			| IoErrorKind::ConnectionAborted
			| IoErrorKind::ConnectionRefused
			| IoErrorKind::BrokenPipe
			| IoErrorKind::NotConnected => TransportFault::ConnectionReset(detail),
			IoErrorKind::UnexpectedEof => TransportFault::AbruptEof(detail),
			_ => TransportFault::Runtime(detail),
		},
		WsError::ConnectionClosed => TransportFault::AbruptEof(detail),
		WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
			TransportFault::AbruptEof(detail)
		}
		WsError::Protocol(_) => TransportFault::Runtime(detail),
		WsError::Utf8 | WsError::Capacity(_) => TransportFault::Decode(detail),
		WsError::Http(response) => match response.status() {
			StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
				TransportFault::RequestRejected(format!("HTTP {}", response.status()))
			}
			status => TransportFault::Runtime(format!("unexpected HTTP status {status}")),
		},
		WsError::AlreadyClosed
		| WsError::WriteBufferFull(_)
		| WsError::Tls(_)
		| WsError::Url(_)
		| WsError::HttpFormat(_) => TransportFault::Runtime(detail),
		_ => TransportFault::Unknown(detail),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io;
	use tokio::net::TcpListener;
	use tokio_tungstenite::tungstenite::http::Response;
	use url::Url;

	fn request(url: &str, connect_timeout: Duration) -> ConnectRequest {
		ConnectRequest {
			url: Url::parse(url).unwrap(),
			headers: vec![("Authorization".to_string(), "secret".to_string())],
			connect_timeout,
			ping_interval: Duration::from_secs(30),
		}
	}

	#[test]
	fn test_io_errors_map_to_network_faults() {
		let timeout = WsError::Io(io::Error::new(IoErrorKind::TimedOut, "t"));
		assert!(matches!(fault_from_ws_error(&timeout), TransportFault::Timeout(_)));

		let reset = WsError::Io(io::Error::new(IoErrorKind::ConnectionReset, "r"));
		assert!(matches!(fault_from_ws_error(&reset), TransportFault::ConnectionReset(_)));

		let eof = WsError::Io(io::Error::new(IoErrorKind::UnexpectedEof, "e"));
		assert!(matches!(fault_from_ws_error(&eof), TransportFault::AbruptEof(_)));

		let other = WsError::Io(io::Error::new(IoErrorKind::PermissionDenied, "p"));
		assert!(matches!(fault_from_ws_error(&other), TransportFault::Runtime(_)));
	}

	#[test]
	fn test_reset_without_handshake_is_abrupt_eof() {
		let err = WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake);
		assert!(matches!(fault_from_ws_error(&err), TransportFault::AbruptEof(_)));

		let err = WsError::Protocol(ProtocolError::HandshakeIncomplete);
		assert!(matches!(fault_from_ws_error(&err), TransportFault::Runtime(_)));
	}

	#[test]
	fn test_http_rejection() {
		let err = WsError::Http(Response::builder().status(401).body(None).unwrap());
		assert!(matches!(fault_from_ws_error(&err), TransportFault::RequestRejected(_)));

		let err = WsError::Http(Response::builder().status(403).body(None).unwrap());
		assert!(matches!(fault_from_ws_error(&err), TransportFault::RequestRejected(_)));

		let err = WsError::Http(Response::builder().status(502).body(None).unwrap());
		assert!(matches!(fault_from_ws_error(&err), TransportFault::Runtime(_)));
	}

	#[test]
	fn test_utf8_is_decode_fault() {
		assert!(matches!(fault_from_ws_error(&WsError::Utf8), TransportFault::Decode(_)));
	}

	#[tokio::test]
	async fn test_refused_connection_fails_with_network_fault() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		drop(listener);

		let transport = WsTransport::new();
		let (tx, mut rx) = mpsc::unbounded_channel();
		let _handle = transport.open(
			request(&format!("ws://{addr}/streaming"), Duration::from_secs(5)),
			tx,
		);

		let event = rx.recv().await.unwrap();
		assert!(matches!(
			event,
			TransportEvent::Failed(TransportFault::ConnectionReset(_))
		));
		transport.shutdown().await;
	}

	#[tokio::test]
	async fn test_silent_server_times_out() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		let server = tokio::spawn(async move {
			let (socket, _) = listener.accept().await.unwrap();
			tokio::time::sleep(Duration::from_secs(5)).await;
			drop(socket);
		});

		let transport = WsTransport::new();
		let (tx, mut rx) = mpsc::unbounded_channel();
		let _handle = transport.open(
			request(&format!("ws://{addr}/streaming"), Duration::from_millis(200)),
			tx,
		);

		let event = rx.recv().await.unwrap();
		assert!(matches!(event, TransportEvent::Failed(TransportFault::Timeout(_))));
		server.abort();
		transport.shutdown().await;
	}

	#[tokio::test]
	async fn test_missing_pong_fails_with_timeout() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		let server = tokio::spawn(async move {
			let (socket, _) = listener.accept().await.unwrap();
			// Complete the handshake, then never read so pings go unanswered.
			let _ws = tokio_tungstenite::accept_async(socket).await.unwrap();
			tokio::time::sleep(Duration::from_secs(30)).await;
		});

		let transport = WsTransport::new();
		let (tx, mut rx) = mpsc::unbounded_channel();
		let mut req = request(&format!("ws://{addr}/streaming"), Duration::from_secs(5));
		req.ping_interval = Duration::from_millis(100);
		let _handle = transport.open(req, tx);

		assert_eq!(rx.recv().await.unwrap(), TransportEvent::Opened);
		let event = tokio::time::timeout(Duration::from_secs(3), rx.recv())
			.await
			.expect("connection should fail without pongs")
			.unwrap();
		match event {
			TransportEvent::Failed(TransportFault::Timeout(detail)) => {
				assert!(detail.contains("pong"), "detail was {detail}");
			}
			other => panic!("expected pong timeout, got {other:?}"),
		}
		server.abort();
		transport.shutdown().await;
	}

	#[tokio::test]
	async fn test_answered_pings_keep_connection_open() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		let server = tokio::spawn(async move {
			let (socket, _) = listener.accept().await.unwrap();
			let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
			// Reading drives automatic pong replies.
			while let Some(Ok(_)) = ws.next().await {}
		});

		let transport = WsTransport::new();
		let (tx, mut rx) = mpsc::unbounded_channel();
		let mut req = request(&format!("ws://{addr}/streaming"), Duration::from_secs(5));
		req.ping_interval = Duration::from_millis(50);
		let _handle = transport.open(req, tx);

		assert_eq!(rx.recv().await.unwrap(), TransportEvent::Opened);
		let quiet = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await;
		assert!(quiet.is_err(), "unexpected event {quiet:?}");
		server.abort();
		transport.shutdown().await;
	}

	#[tokio::test]
	async fn test_close_before_handshake_reports_closed() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		let server = tokio::spawn(async move {
			let (socket, _) = listener.accept().await.unwrap();
			tokio::time::sleep(Duration::from_secs(5)).await;
			drop(socket);
		});

		let transport = WsTransport::new();
		let (tx, mut rx) = mpsc::unbounded_channel();
		let handle = transport.open(
			request(&format!("ws://{addr}/streaming"), Duration::from_secs(5)),
			tx,
		);
		assert!(handle.close(NORMAL_CLOSE, NORMAL_CLOSE_REASON));

		let event = rx.recv().await.unwrap();
		assert_eq!(
			event,
			TransportEvent::Closed {
				code: NORMAL_CLOSE,
				reason: NORMAL_CLOSE_REASON.to_string()
			}
		);
		server.abort();
		transport.shutdown().await;
	}
}
