// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Snapshot and patch types exchanged over the streaming channel.
//!
//! The streaming core treats item contents as opaque: it only groups items by
//! [`Category`] and key, and forwards them to the data store together with the
//! version of the event that carried them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Resource kind an item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
	/// Feature flag definitions.
	FeatureFlags,
	/// User segment definitions.
	Segments,
}

impl Category {
	/// Every category, in wire order.
	pub const ALL: [Category; 2] = [Category::FeatureFlags, Category::Segments];

	/// Field name carrying this category inside a data-sync payload.
	pub fn wire_name(&self) -> &'static str {
		match self {
			Category::FeatureFlags => "featureFlags",
			Category::Segments => "segments",
		}
	}
}

impl fmt::Display for Category {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.wire_name())
	}
}

/// A versioned value for one key within a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
	/// Key of the item within its category.
	pub key: String,
	/// Per-item timestamp the store uses to resolve conflicting writes.
	pub timestamp: i64,
	/// Whether the item has been archived upstream.
	pub archived: bool,
	/// Raw item body as received.
	pub value: serde_json::Value,
}

impl Item {
	pub fn new(key: impl Into<String>, timestamp: i64, value: serde_json::Value) -> Self {
		Self {
			key: key.into(),
			timestamp,
			archived: false,
			value,
		}
	}

	pub fn with_archived(mut self, archived: bool) -> Self {
		self.archived = archived;
		self
	}
}

/// Items grouped by category, then by key.
pub type Payload = BTreeMap<Category, BTreeMap<String, Item>>;

/// Whether an event replaces the store or patches individual entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
	Full,
	Patch,
}

impl EventType {
	/// Parses the wire `eventType`, ignoring case.
	pub fn parse(value: &str) -> Option<Self> {
		if value.eq_ignore_ascii_case("full") {
			Some(EventType::Full)
		} else if value.eq_ignore_ascii_case("patch") {
			Some(EventType::Patch)
		} else {
			None
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			EventType::Full => "full",
			EventType::Patch => "patch",
		}
	}
}

impl fmt::Display for EventType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One decoded data-sync message.
///
/// A `Full` event is a complete replacement snapshot; a `Patch` event touches a
/// small set of (category, key) pairs. Events are consumed exactly once by the
/// update applier.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
	pub event_type: EventType,
	/// Monotonically increasing version of the data carried by this event.
	pub version: i64,
	pub payload: Payload,
}

impl InboundEvent {
	/// Creates a full snapshot event.
	///
	/// Categories missing from `payload` are filled in as empty so the store
	/// sees a complete replacement.
	pub fn full(version: i64, mut payload: Payload) -> Self {
		for category in Category::ALL {
			payload.entry(category).or_default();
		}
		Self {
			event_type: EventType::Full,
			version,
			payload,
		}
	}

	pub fn patch(version: i64, payload: Payload) -> Self {
		Self {
			event_type: EventType::Patch,
			version,
			payload,
		}
	}

	/// Iterates every (category, key, item) triple in payload order.
	pub fn items(&self) -> impl Iterator<Item = (Category, &str, &Item)> + '_ {
		self.payload.iter().flat_map(|(category, items)| {
			items
				.iter()
				.map(move |(key, item)| (*category, key.as_str(), item))
		})
	}

	pub fn item_count(&self) -> usize {
		self.payload.values().map(BTreeMap::len).sum()
	}
}

/// Request sent once per opened connection asking the server to resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundSyncRequest {
	pub last_known_version: i64,
}

impl OutboundSyncRequest {
	/// Version requested when the local store has never been initialized.
	pub const ORIGIN: i64 = 0;

	pub fn origin() -> Self {
		Self {
			last_known_version: Self::ORIGIN,
		}
	}

	pub fn resume_from(version: i64) -> Self {
		Self {
			last_known_version: version,
		}
	}
}
