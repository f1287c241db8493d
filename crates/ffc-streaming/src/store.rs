// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Data store contract and an in-memory implementation.
//!
//! The streaming client only writes to the store through the update applier,
//! one event at a time.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ffc_streaming_core::{Category, Item, Payload};
use tokio::sync::RwLock;

/// Store the streaming client keeps in sync.
#[async_trait]
pub trait DataStore: Send + Sync + 'static {
	/// Returns true once a full snapshot has been applied.
	async fn is_initialized(&self) -> bool;

	/// Highest version applied so far.
	async fn version(&self) -> i64;

	/// Replaces all contents with `payload`. Returns false on failure.
	async fn init(&self, payload: &Payload, version: i64) -> bool;

	/// Inserts or replaces one item. Returns false on failure.
	async fn upsert(&self, category: Category, key: &str, item: &Item, version: i64) -> bool;
}

/// In-memory [`DataStore`].
///
/// Thread-safe with concurrent reads and exclusive writes. Clones share state.
/// On upsert the item with the greater per-item timestamp wins.
#[derive(Debug)]
pub struct InMemoryDataStore {
	inner: Arc<RwLock<StoreInner>>,
}

#[derive(Debug, Default)]
struct StoreInner {
	items: HashMap<Category, HashMap<String, Item>>,
	version: i64,
	last_updated: Option<DateTime<Utc>>,
	initialized: bool,
}

impl InMemoryDataStore {
	pub fn new() -> Self {
		Self {
			inner: Arc::new(RwLock::new(StoreInner::default())),
		}
	}

	/// Gets an item by category and key, including archived items.
	pub async fn get(&self, category: Category, key: &str) -> Option<Item> {
		self
			.inner
			.read()
			.await
			.items
			.get(&category)
			.and_then(|items| items.get(key))
			.cloned()
	}

	/// Gets all items of a category.
	pub async fn all(&self, category: Category) -> Vec<Item> {
		self
			.inner
			.read()
			.await
			.items
			.get(&category)
			.map(|items| items.values().cloned().collect())
			.unwrap_or_default()
	}

	/// Returns the number of items in a category.
	pub async fn item_count(&self, category: Category) -> usize {
		self
			.inner
			.read()
			.await
			.items
			.get(&category)
			.map_or(0, HashMap::len)
	}

	pub async fn last_updated(&self) -> Option<DateTime<Utc>> {
		self.inner.read().await.last_updated
	}

	/// Clears all data and the initialized marker.
	pub async fn clear(&self) {
		let mut inner = self.inner.write().await;
		inner.items.clear();
		inner.version = 0;
		inner.last_updated = None;
		inner.initialized = false;
	}
}

impl Default for InMemoryDataStore {
	fn default() -> Self {
		Self::new()
	}
}

impl Clone for InMemoryDataStore {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

#[async_trait]
impl DataStore for InMemoryDataStore {
	async fn is_initialized(&self) -> bool {
		self.inner.read().await.initialized
	}

	async fn version(&self) -> i64 {
		self.inner.read().await.version
	}

	async fn init(&self, payload: &Payload, version: i64) -> bool {
		let mut inner = self.inner.write().await;

		inner.items.clear();
		for (category, items) in payload {
			inner.items.insert(*category, items.clone().into_iter().collect());
		}

		inner.version = inner.version.max(version);
		inner.last_updated = Some(Utc::now());
		inner.initialized = true;
		true
	}

	async fn upsert(&self, category: Category, key: &str, item: &Item, version: i64) -> bool {
		let mut inner = self.inner.write().await;

		let items = inner.items.entry(category).or_default();
		let newer = items
			.get(key)
			.map_or(true, |existing| item.timestamp > existing.timestamp);
		if newer {
			items.insert(key.to_string(), item.clone());
		}

		inner.version = inner.version.max(version);
		inner.last_updated = Some(Utc::now());
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ffc_streaming_core::InboundEvent;
	use serde_json::json;

	fn item(key: &str, timestamp: i64) -> Item {
		Item::new(key, timestamp, json!({ "key": key, "ts": timestamp }))
	}

	fn snapshot(keys: &[&str], version: i64) -> Payload {
		let mut payload = Payload::new();
		let flags = payload.entry(Category::FeatureFlags).or_default();
		for key in keys {
			flags.insert(key.to_string(), item(key, version));
		}
		InboundEvent::full(version, payload).payload
	}

	#[tokio::test]
	async fn test_init_store() {
		let store = InMemoryDataStore::new();
		assert!(!store.is_initialized().await);
		assert_eq!(store.version().await, 0);

		assert!(store.init(&snapshot(&["flag-a", "flag-b"], 10), 10).await);

		assert!(store.is_initialized().await);
		assert_eq!(store.version().await, 10);
		assert_eq!(store.item_count(Category::FeatureFlags).await, 2);
		assert_eq!(store.item_count(Category::Segments).await, 0);
		assert!(store.last_updated().await.is_some());
	}

	#[tokio::test]
	async fn test_init_replaces_contents() {
		let store = InMemoryDataStore::new();
		store.init(&snapshot(&["flag-a", "flag-b"], 10), 10).await;
		store.init(&snapshot(&["flag-c"], 11), 11).await;

		assert!(store.get(Category::FeatureFlags, "flag-a").await.is_none());
		assert!(store.get(Category::FeatureFlags, "flag-c").await.is_some());
		assert_eq!(store.all(Category::FeatureFlags).await.len(), 1);
	}

	#[tokio::test]
	async fn test_upsert_keeps_newer_item() {
		let store = InMemoryDataStore::new();
		store.init(&snapshot(&["flag-a"], 10), 10).await;

		assert!(store.upsert(Category::FeatureFlags, "flag-a", &item("flag-a", 20), 20).await);
		assert_eq!(store.get(Category::FeatureFlags, "flag-a").await.unwrap().timestamp, 20);

		assert!(store.upsert(Category::FeatureFlags, "flag-a", &item("flag-a", 15), 21).await);
		assert_eq!(store.get(Category::FeatureFlags, "flag-a").await.unwrap().timestamp, 20);
		assert_eq!(store.version().await, 21);
	}

	#[tokio::test]
	async fn test_upsert_does_not_initialize() {
		let store = InMemoryDataStore::new();
		store.upsert(Category::Segments, "seg", &item("seg", 1), 1).await;

		assert!(!store.is_initialized().await);
		assert!(store.get(Category::Segments, "seg").await.is_some());
	}

	#[tokio::test]
	async fn test_version_never_decreases() {
		let store = InMemoryDataStore::new();
		store.init(&snapshot(&[], 50), 50).await;
		store.init(&snapshot(&[], 40), 40).await;
		assert_eq!(store.version().await, 50);
	}

	#[tokio::test]
	async fn test_clear_store() {
		let store = InMemoryDataStore::new();
		store.init(&snapshot(&["flag-a"], 10), 10).await;

		store.clear().await;

		assert!(!store.is_initialized().await);
		assert_eq!(store.version().await, 0);
		assert_eq!(store.item_count(Category::FeatureFlags).await, 0);
	}

	#[tokio::test]
	async fn test_clone_shares_state() {
		let store = InMemoryDataStore::new();
		let store_clone = store.clone();

		store.init(&snapshot(&["flag-a"], 1), 1).await;

		assert!(store_clone.is_initialized().await);
		assert_eq!(store_clone.item_count(Category::FeatureFlags).await, 1);
	}
}
