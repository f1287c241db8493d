// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Errors raised while decoding or encoding streaming messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
	#[error("malformed message: {0}")]
	Malformed(String),

	#[error("invalid message shape: {0}")]
	InvalidShape(String),

	#[error("failed to encode message: {0}")]
	Encode(String),
}

impl From<serde_json::Error> for CodecError {
	fn from(err: serde_json::Error) -> Self {
		CodecError::Malformed(err.to_string())
	}
}

pub type Result<T> = std::result::Result<T, CodecError>;
