// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wire codec for the streaming channel.
//!
//! # Messages
//!
//! Outbound, once per opened connection:
//!
//! ```json
//! {"messageType":"data-sync","startTimestamp":1700000000000}
//! ```
//!
//! Inbound data envelope:
//!
//! ```json
//! {
//!   "messageType": "data-sync",
//!   "data": {
//!     "eventType": "full",
//!     "timestamp": 1700000000000,
//!     "featureFlags": [{"id": "...", "key": "flag-a", "timestamp": 1700000000000}],
//!     "segments": []
//!   }
//! }
//! ```
//!
//! Any other message that parses as JSON (for example `{"messageType":"pong"}`)
//! carries nothing to apply and decodes to `None`.
//!
//! # Example
//!
//! ```
//! use ffc_streaming_core::codec::{JsonCodec, MessageCodec};
//! use ffc_streaming_core::{EventType, OutboundSyncRequest};
//!
//! let codec = JsonCodec;
//! let text = codec.encode_sync_request(&OutboundSyncRequest::origin()).unwrap();
//! assert_eq!(text, r#"{"messageType":"data-sync","startTimestamp":0}"#);
//!
//! let event = codec
//!     .decode(r#"{"messageType":"data-sync","data":{"eventType":"patch","timestamp":7,"segments":[{"id":"s1"}]}}"#)
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(event.event_type, EventType::Patch);
//! assert_eq!(event.version, 7);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CodecError, Result};
use crate::model::{Category, EventType, InboundEvent, Item, OutboundSyncRequest, Payload};

/// Message type of data-sync requests and responses.
pub const DATA_SYNC_MESSAGE_TYPE: &str = "data-sync";

/// Decoder/encoder seam between transport text and protocol types.
pub trait MessageCodec: Send + Sync + 'static {
	/// Decodes one transport message.
	///
	/// Returns `Ok(None)` for messages with nothing to apply (heartbeats,
	/// unknown message types, data envelopes that fail validation).
	fn decode(&self, text: &str) -> Result<Option<InboundEvent>>;

	/// Encodes the sync request sent after a connection opens.
	fn encode_sync_request(&self, request: &OutboundSyncRequest) -> Result<String>;
}

/// JSON implementation of [`MessageCodec`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DataSyncMessage {
	message_type: &'static str,
	start_timestamp: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
	#[serde(default)]
	message_type: Option<String>,
	#[serde(default)]
	data: Option<Value>,
}

impl MessageCodec for JsonCodec {
	fn decode(&self, text: &str) -> Result<Option<InboundEvent>> {
		let envelope: Envelope = serde_json::from_str(text)?;

		if envelope.message_type.as_deref() != Some(DATA_SYNC_MESSAGE_TYPE) {
			return Ok(None);
		}

		let data = match envelope.data {
			Some(Value::Object(data)) => data,
			None | Some(Value::Null) => return Ok(None),
			Some(other) => {
				return Err(CodecError::InvalidShape(format!(
					"data must be an object, got {}",
					json_type(&other)
				)))
			}
		};

		let Some(event_type) = data
			.get("eventType")
			.and_then(Value::as_str)
			.and_then(EventType::parse)
		else {
			return Ok(None);
		};
		let Some(version) = data.get("timestamp").and_then(Value::as_i64) else {
			return Ok(None);
		};

		let payload = decode_payload(&data, version)?;
		Ok(Some(match event_type {
			EventType::Full => InboundEvent::full(version, payload),
			EventType::Patch => InboundEvent::patch(version, payload),
		}))
	}

	fn encode_sync_request(&self, request: &OutboundSyncRequest) -> Result<String> {
		serde_json::to_string(&DataSyncMessage {
			message_type: DATA_SYNC_MESSAGE_TYPE,
			start_timestamp: request.last_known_version,
		})
		.map_err(|e| CodecError::Encode(e.to_string()))
	}
}

fn decode_payload(data: &Map<String, Value>, version: i64) -> Result<Payload> {
	let mut payload = Payload::new();

	for category in Category::ALL {
		let elements = match data.get(category.wire_name()) {
			None | Some(Value::Null) => continue,
			Some(Value::Array(elements)) => elements,
			Some(other) => {
				return Err(CodecError::InvalidShape(format!(
					"{} must be an array, got {}",
					category,
					json_type(other)
				)))
			}
		};

		let mut items = BTreeMap::new();
		for element in elements {
			let item = decode_item(category, element, version)?;
			items.insert(item.key.clone(), item);
		}
		payload.insert(category, items);
	}

	Ok(payload)
}

fn decode_item(category: Category, element: &Value, version: i64) -> Result<Item> {
	let Value::Object(fields) = element else {
		return Err(CodecError::InvalidShape(format!(
			"{} entries must be objects, got {}",
			category,
			json_type(element)
		)));
	};

	let key = fields
		.get("key")
		.and_then(Value::as_str)
		.or_else(|| fields.get("id").and_then(Value::as_str))
		.ok_or_else(|| CodecError::InvalidShape(format!("{category} entry has neither key nor id")))?;

	let timestamp = fields
		.get("timestamp")
		.and_then(Value::as_i64)
		.or_else(|| fields.get("updatedAt").and_then(Value::as_i64))
		.unwrap_or(version);

	let archived = fields
		.get("isArchived")
		.and_then(Value::as_bool)
		.unwrap_or(false);

	Ok(Item::new(key, timestamp, element.clone()).with_archived(archived))
}

fn json_type(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "boolean",
		Value::Number(_) => "number",
		Value::String(_) => "string",
		Value::Array(_) => "array",
		Value::Object(_) => "object",
	}
}
