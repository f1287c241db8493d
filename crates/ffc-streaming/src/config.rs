// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the streaming client.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use ffc_streaming::StreamingConfig;
//!
//! let config = StreamingConfig::builder()
//!     .streaming_uri("https://ffc.example.com/")
//!     .env_secret("env-secret")
//!     .first_retry_delay(Duration::from_millis(500))
//!     .max_retry_times(10)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.streaming_url().as_str(), "wss://ffc.example.com/streaming");
//! assert_eq!(format!("{}", config.env_secret()), "[REDACTED]");
//! ```

use std::path::PathBuf;
use std::time::Duration;
use std::{env, fmt, fs};

use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use url::Url;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, StreamingError};

/// Environment variable holding the env secret.
pub const ENV_SECRET_VAR: &str = "FFC_ENV_SECRET";

pub const DEFAULT_FIRST_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(60);
pub const DEFAULT_RESET_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_JITTER_RATIO: f64 = 0.5;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Path appended to the base URI.
pub const STREAMING_PATH: &str = "/streaming";

/// User agent sent on the upgrade request.
pub const USER_AGENT: &str = concat!("ffc-rust-server-sdk/", env!("CARGO_PKG_VERSION"));

const REDACTED: &str = "[REDACTED]";

/// Env secret used to authenticate the streaming connection.
///
/// Debug and Display are redacted and the value is zeroized on drop. Call
/// [`EnvSecret::expose`] to read it.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EnvSecret {
	inner: String,
}

impl EnvSecret {
	pub fn new(secret: impl Into<String>) -> Self {
		Self {
			inner: secret.into(),
		}
	}

	pub fn expose(&self) -> &str {
		&self.inner
	}

	pub fn is_empty(&self) -> bool {
		self.inner.trim().is_empty()
	}
}

impl fmt::Debug for EnvSecret {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("EnvSecret").field(&REDACTED).finish()
	}
}

impl fmt::Display for EnvSecret {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

/// Loads an env secret using the `VAR` / `VAR_FILE` convention.
///
/// `{var}_FILE` wins over `{var}`. A single trailing newline is stripped from
/// file contents. Returns `Ok(None)` when neither is set.
pub fn load_env_secret(var: &str) -> Result<Option<EnvSecret>> {
	let file_var = format!("{var}_FILE");

	if let Ok(path_str) = env::var(&file_var) {
		if path_str.is_empty() {
			return Err(StreamingError::EmptySecretPath { var: file_var });
		}

		let path = PathBuf::from(&path_str);
		let content = fs::read_to_string(&path).map_err(|e| StreamingError::SecretFile {
			path: path.clone(),
			source: e,
		})?;

		let secret = content.strip_suffix('\n').unwrap_or(&content).to_string();
		return Ok(Some(EnvSecret::new(secret)));
	}

	if let Ok(value) = env::var(var) {
		return Ok(Some(EnvSecret::new(value)));
	}

	Ok(None)
}

/// Validated settings for the streaming channel.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
	streaming_url: Url,
	env_secret: EnvSecret,
	first_retry_delay: Duration,
	max_retry_delay: Duration,
	reset_interval: Duration,
	jitter_ratio: f64,
	max_retry_times: Option<u32>,
	connect_timeout: Duration,
	ping_interval: Duration,
	headers: Vec<(String, String)>,
}

impl StreamingConfig {
	pub fn builder() -> StreamingConfigBuilder {
		StreamingConfigBuilder::new()
	}

	/// Streaming endpoint without query parameters.
	pub fn streaming_url(&self) -> &Url {
		&self.streaming_url
	}

	pub fn env_secret(&self) -> &EnvSecret {
		&self.env_secret
	}

	pub fn first_retry_delay(&self) -> Duration {
		self.first_retry_delay
	}

	pub fn max_retry_delay(&self) -> Duration {
		self.max_retry_delay
	}

	pub fn reset_interval(&self) -> Duration {
		self.reset_interval
	}

	pub fn jitter_ratio(&self) -> f64 {
		self.jitter_ratio
	}

	/// Retry ceiling; `None` means unbounded.
	pub fn max_retry_times(&self) -> Option<u32> {
		self.max_retry_times
	}

	pub fn connect_timeout(&self) -> Duration {
		self.connect_timeout
	}

	pub fn ping_interval(&self) -> Duration {
		self.ping_interval
	}

	/// Extra headers for the upgrade request.
	pub fn headers(&self) -> &[(String, String)] {
		&self.headers
	}
}

/// Builder for [`StreamingConfig`].
#[derive(Debug, Clone)]
pub struct StreamingConfigBuilder {
	streaming_uri: Option<String>,
	env_secret: Option<EnvSecret>,
	first_retry_delay: Duration,
	max_retry_delay: Duration,
	reset_interval: Duration,
	jitter_ratio: f64,
	max_retry_times: Option<u32>,
	connect_timeout: Duration,
	ping_interval: Duration,
	headers: Vec<(String, String)>,
}

impl StreamingConfigBuilder {
	pub fn new() -> Self {
		Self {
			streaming_uri: None,
			env_secret: None,
			first_retry_delay: DEFAULT_FIRST_RETRY_DELAY,
			max_retry_delay: DEFAULT_MAX_RETRY_DELAY,
			reset_interval: DEFAULT_RESET_INTERVAL,
			jitter_ratio: DEFAULT_JITTER_RATIO,
			max_retry_times: None,
			connect_timeout: DEFAULT_CONNECT_TIMEOUT,
			ping_interval: DEFAULT_PING_INTERVAL,
			headers: Vec::new(),
		}
	}

	/// Sets the base URI of the flag service.
	///
	/// `http`/`https` are rewritten to `ws`/`wss`.
	pub fn streaming_uri(mut self, uri: impl Into<String>) -> Self {
		self.streaming_uri = Some(uri.into());
		self
	}

	pub fn env_secret(mut self, secret: impl Into<String>) -> Self {
		self.env_secret = Some(EnvSecret::new(secret));
		self
	}

	/// Reads the env secret from `FFC_ENV_SECRET` or `FFC_ENV_SECRET_FILE`.
	///
	/// Leaves any secret set earlier untouched when neither variable is set.
	pub fn env_secret_from_env(mut self) -> Result<Self> {
		if let Some(secret) = load_env_secret(ENV_SECRET_VAR)? {
			self.env_secret = Some(secret);
		}
		Ok(self)
	}

	pub fn first_retry_delay(mut self, delay: Duration) -> Self {
		self.first_retry_delay = delay;
		self
	}

	pub fn max_retry_delay(mut self, delay: Duration) -> Self {
		self.max_retry_delay = delay;
		self
	}

	/// Sets how long a connection must stay healthy before backoff resets.
	pub fn reset_interval(mut self, interval: Duration) -> Self {
		self.reset_interval = interval;
		self
	}

	/// Sets the fraction of each delay that jitter may remove. Clamped to `[0, 1]`.
	pub fn jitter_ratio(mut self, ratio: f64) -> Self {
		self.jitter_ratio = ratio;
		self
	}

	/// Sets the retry ceiling. Zero means unbounded.
	pub fn max_retry_times(mut self, times: u32) -> Self {
		self.max_retry_times = Some(times);
		self
	}

	pub fn connect_timeout(mut self, timeout: Duration) -> Self {
		self.connect_timeout = timeout;
		self
	}

	pub fn ping_interval(mut self, interval: Duration) -> Self {
		self.ping_interval = interval;
		self
	}

	/// Adds a header to the upgrade request.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));
		self
	}

	pub fn build(self) -> Result<StreamingConfig> {
		let env_secret = self
			.env_secret
			.filter(|s| !s.is_empty())
			.ok_or(StreamingError::MissingEnvSecret)?;

		let uri = self
			.streaming_uri
			.ok_or_else(|| StreamingError::InvalidStreamingUri("missing".to_string()))?;
		let streaming_url = derive_streaming_url(&uri)?;

		for (name, value) in &self.headers {
			HeaderName::from_bytes(name.as_bytes())
				.map_err(|_| StreamingError::InvalidHeader(name.clone()))?;
			HeaderValue::from_str(value).map_err(|_| StreamingError::InvalidHeader(name.clone()))?;
		}

		let jitter_ratio = if self.jitter_ratio.is_nan() {
			DEFAULT_JITTER_RATIO
		} else {
			self.jitter_ratio.clamp(0.0, 1.0)
		};

		Ok(StreamingConfig {
			streaming_url,
			env_secret,
			first_retry_delay: self.first_retry_delay,
			max_retry_delay: self.max_retry_delay,
			reset_interval: self.reset_interval,
			jitter_ratio,
			max_retry_times: self.max_retry_times.filter(|times| *times > 0),
			connect_timeout: self.connect_timeout,
			ping_interval: self.ping_interval,
			headers: self.headers,
		})
	}
}

impl Default for StreamingConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Turns a base URI into the streaming endpoint.
fn derive_streaming_url(uri: &str) -> Result<Url> {
	let mut url =
		Url::parse(uri.trim()).map_err(|e| StreamingError::InvalidStreamingUri(e.to_string()))?;

	let scheme = match url.scheme() {
		"http" | "ws" => "ws",
		"https" | "wss" => "wss",
		other => {
			return Err(StreamingError::InvalidStreamingUri(format!(
				"unsupported scheme {other}"
			)))
		}
	};
	url
		.set_scheme(scheme)
		.map_err(|_| StreamingError::InvalidStreamingUri(uri.to_string()))?;

	let base_path = url.path().trim_end_matches('/').to_string();
	url.set_path(&format!("{base_path}{STREAMING_PATH}"));
	url.set_query(None);
	url.set_fragment(None);

	Ok(url)
}
