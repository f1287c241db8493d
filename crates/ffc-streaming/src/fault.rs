// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Transport faults and their classification.

use ffc_streaming_core::{ErrorInfo, ErrorKind};
use thiserror::Error;

/// A fault raised by the transport or while decoding its messages.
///
/// Transports map their native errors onto this enum once, at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportFault {
	#[error("timed out: {0}")]
	Timeout(String),

	#[error("connection reset: {0}")]
	ConnectionReset(String),

	/// Peer dropped the connection without a close handshake.
	#[error("unexpected end of stream: {0}")]
	AbruptEof(String),

	#[error("invalid data: {0}")]
	Decode(String),

	/// Server refused the upgrade request (401/403).
	#[error("request rejected: {0}")]
	RequestRejected(String),

	#[error("runtime fault: {0}")]
	Runtime(String),

	#[error("unknown fault: {0}")]
	Unknown(String),
}

/// Outcome of classifying a [`TransportFault`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
	pub error: ErrorInfo,
	/// Whether the controller reconnects after this fault.
	pub retryable: bool,
	/// Whether the next delay is pinned to the backoff ceiling.
	pub force_ceiling: bool,
}

impl TransportFault {
	pub fn classify(&self) -> Classification {
		let (kind, retryable, force_ceiling) = match self {
			TransportFault::Timeout(_) | TransportFault::ConnectionReset(_) => {
				(ErrorKind::NetworkError, true, false)
			}
			TransportFault::AbruptEof(_) => (ErrorKind::NetworkError, true, true),
			TransportFault::Decode(_) => (ErrorKind::DataInvalidError, false, false),
			TransportFault::RequestRejected(_) => (ErrorKind::RequestInvalidError, false, false),
			TransportFault::Runtime(_) => (ErrorKind::RuntimeError, true, false),
			TransportFault::Unknown(_) => (ErrorKind::UnknownError, false, false),
		};

		Classification {
			error: ErrorInfo::new(kind, self.to_string()),
			retryable,
			force_ceiling,
		}
	}
}
