// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the streaming client.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for the streaming client.
pub type Result<T> = std::result::Result<T, StreamingError>;

/// Errors surfaced to callers of the streaming client.
///
/// Connection faults never show up here: they are recovered internally or
/// reported through the status sink.
#[derive(Error, Debug)]
pub enum StreamingError {
	/// Env secret is missing or empty.
	#[error("Invalid or missing env secret")]
	MissingEnvSecret,

	/// Streaming URI could not be parsed or has an unsupported scheme.
	#[error("Invalid streaming URI: {0}")]
	InvalidStreamingUri(String),

	/// An extra request header has an invalid name or value.
	#[error("Invalid request header: {0}")]
	InvalidHeader(String),

	/// Failed to read the env secret from a file.
	#[error("Failed to read env secret file at {path}: {source}")]
	SecretFile {
		/// Path named by the `*_FILE` variable.
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	/// The `*_FILE` variable was set but empty.
	#[error("Env secret file path in {var} is empty")]
	EmptySecretPath {
		/// Name of the offending variable.
		var: String,
	},

	/// The streaming client was closed before it became ready.
	#[error("Streaming client has been closed")]
	Closed,

	/// Readiness was not reached within the caller's timeout.
	#[error("Streaming initialization timed out")]
	InitializationTimeout,
}

impl StreamingError {
	/// Returns true if the error comes from invalid configuration.
	pub fn is_config_error(&self) -> bool {
		matches!(
			self,
			StreamingError::MissingEnvSecret
				| StreamingError::InvalidStreamingUri(_)
				| StreamingError::InvalidHeader(_)
				| StreamingError::SecretFile { .. }
				| StreamingError::EmptySecretPath { .. }
		)
	}
}
