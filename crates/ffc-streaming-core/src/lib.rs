// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the feature flags streaming update channel.
//!
//! This crate holds the runtime-free half of the streaming client: the event
//! model, the connection status taxonomy, the close code table, and the JSON
//! wire codec. The async controller lives in `ffc-streaming`.
//!
//! # Overview
//!
//! - [`InboundEvent`] is a full snapshot or a patch, tagged with a version
//! - [`OutboundSyncRequest`] asks the server to resume from a version
//! - [`ConnectionState`] and [`ErrorInfo`] describe channel health
//! - [`MessageCodec`] converts between transport text and these types
//!
//! # Example
//!
//! ```
//! use ffc_streaming_core::{Category, JsonCodec, MessageCodec};
//!
//! let event = JsonCodec
//!     .decode(r#"{"messageType":"data-sync","data":{"eventType":"full","timestamp":3,"featureFlags":[{"key":"beta"}]}}"#)
//!     .unwrap()
//!     .expect("data-sync message");
//!
//! assert_eq!(event.version, 3);
//! assert!(event.payload[&Category::FeatureFlags].contains_key("beta"));
//! ```

pub mod close;
pub mod codec;
pub mod error;
pub mod model;
pub mod status;

pub use codec::{JsonCodec, MessageCodec, DATA_SYNC_MESSAGE_TYPE};
pub use error::{CodecError, Result};
pub use model::{Category, EventType, InboundEvent, Item, OutboundSyncRequest, Payload};
pub use status::{ConnectionState, ErrorInfo, ErrorKind};
