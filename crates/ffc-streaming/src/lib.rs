// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Streaming update channel for the feature flags server SDK.
//!
//! Keeps a WebSocket connection to the flag service open, applies the full
//! snapshots and patches it pushes to a local [`DataStore`], and reports
//! connection health to a [`StatusSink`].
//!
//! # Features
//!
//! - **Ordered updates**: a single worker applies events in receipt order
//! - **Resume on reconnect**: each connection asks for changes since the store version
//! - **Backoff**: exponential, jittered, reset after a stable run
//! - **Error taxonomy**: faults are classified once and reported as status transitions
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use ffc_streaming::{InMemoryDataStore, StatusTracker, Streaming, StreamingConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StreamingConfig::builder()
//!         .streaming_uri("https://ffc.example.com")
//!         .env_secret_from_env()?
//!         .build()?;
//!
//!     let store = Arc::new(InMemoryDataStore::new());
//!     let status = Arc::new(StatusTracker::new());
//!     let streaming = Streaming::builder(config, store.clone(), status.clone()).build();
//!
//!     streaming.start().wait_timeout(Duration::from_secs(15)).await?;
//!     println!("{} flags", store.item_count(ffc_streaming::Category::FeatureFlags).await);
//!
//!     streaming.close().await;
//!     Ok(())
//! }
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

mod applier;
mod backoff;
mod config;
mod controller;
mod error;
mod fault;
mod gate;
mod session;
mod status;
mod store;
mod token;
mod transport;
mod ws;

#[cfg(test)]
mod test_support;

pub use backoff::{BackoffStrategy, JitterSource, NoJitter, RandomJitter};
pub use config::{
	load_env_secret, EnvSecret, StreamingConfig, StreamingConfigBuilder, DEFAULT_CONNECT_TIMEOUT,
	DEFAULT_FIRST_RETRY_DELAY, DEFAULT_JITTER_RATIO, DEFAULT_MAX_RETRY_DELAY, DEFAULT_PING_INTERVAL,
	DEFAULT_RESET_INTERVAL, ENV_SECRET_VAR, STREAMING_PATH, USER_AGENT,
};
pub use controller::{Streaming, StreamingBuilder};
pub use error::{Result, StreamingError};
pub use fault::{Classification, TransportFault};
pub use gate::InitHandle;
pub use status::{StatusSink, StatusSnapshot, StatusTracker};
pub use store::{DataStore, InMemoryDataStore};
pub use token::{SignedTokenProvider, TokenProvider};
pub use transport::{ConnectRequest, Transport, TransportEvent, TransportHandle};
pub use ws::WsTransport;

// Re-export core types for convenience
pub use ffc_streaming_core::{
	Category, CodecError, ConnectionState, ErrorInfo, ErrorKind, EventType, InboundEvent, Item,
	JsonCodec, MessageCodec, OutboundSyncRequest, Payload,
};

/// Locks a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
