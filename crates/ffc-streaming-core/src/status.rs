// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Connection health as reported to the status collaborator.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Observable state of the streaming channel.
///
/// Transitions follow `Initializing -> Ok -> Interrupted -> (Ok | Off)`.
/// `Off` is terminal for a session: no automatic reconnect follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
	Initializing,
	Ok,
	Interrupted,
	Off,
}

impl ConnectionState {
	pub fn as_str(&self) -> &'static str {
		match self {
			ConnectionState::Initializing => "INITIALIZING",
			ConnectionState::Ok => "OK",
			ConnectionState::Interrupted => "INTERRUPTED",
			ConnectionState::Off => "OFF",
		}
	}
}

impl fmt::Display for ConnectionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error taxonomy attached to status transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
	/// Timeouts, reset connections, abrupt end of stream.
	NetworkError,
	/// Malformed protocol payload.
	DataInvalidError,
	/// Rejected by the server; never retried.
	RequestInvalidError,
	/// Unexpected local fault; retried.
	RuntimeError,
	/// Server closed the connection with a code outside the known table.
	UnknownCloseCode,
	/// Unclassified fault; not retried.
	UnknownError,
}

impl ErrorKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			ErrorKind::NetworkError => "Network error",
			ErrorKind::DataInvalidError => "Data invalid",
			ErrorKind::RequestInvalidError => "Request invalid",
			ErrorKind::RuntimeError => "Runtime error",
			ErrorKind::UnknownCloseCode => "Unknown close code",
			ErrorKind::UnknownError => "Unknown error",
		}
	}
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error detail accompanying a status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
	pub kind: ErrorKind,
	pub message: String,
}

impl ErrorInfo {
	pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
		Self {
			kind,
			message: message.into(),
		}
	}
}

impl fmt::Display for ErrorInfo {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.kind, self.message)
	}
}
