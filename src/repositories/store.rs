//! Document store contract.
//!
//! Documents live at slash-separated paths (`users/{id}`, `referralCodes/{code}`,
//! `userReferrals/{owner}/{referred}`). A path names exactly one JSON document; `children` lists
//! the documents one segment below a path. Writes are last-write-wins and independent of each
//! other; nothing here is transactional.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to read {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("Failed to write {path}: {reason}")]
    Write { path: String, reason: String },
    #[error("Malformed document at {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug)]
pub struct StoreEvent {
    pub path: String,
    pub value: Value,
}

/// Push notifications for writes at or below a path. Dropping it unsubscribes.
pub struct Subscription {
    prefix: String,
    receiver: broadcast::Receiver<StoreEvent>,
}

impl Subscription {
    pub fn new(prefix: &str, receiver: broadcast::Receiver<StoreEvent>) -> Self {
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
            receiver,
        }
    }

    pub async fn next(&mut self) -> Option<StoreEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if is_within(&event.path, &self.prefix) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("Subscription on {} skipped {} events.", self.prefix, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

fn is_within(path: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[async_trait]
pub trait Store: Send + Sync {
    /// The document at `path`, if any.
    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError>;
    /// Replace the document at `path`.
    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError>;
    /// `(key, document)` pairs one segment below `path`.
    async fn children(&self, path: &str) -> Result<Vec<(String, Value)>, StoreError>;
    /// Documents directly below `collection` whose string `field` equals `value`.
    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<(String, Value)>, StoreError>;
    fn subscribe(&self, path: &str) -> Subscription;
}

pub async fn read_document<T: DeserializeOwned>(
    store: &dyn Store,
    path: &str,
) -> Result<Option<T>, StoreError> {
    match store.read(path).await? {
        Some(value) => decode(path, value).map(Some),
        None => Ok(None),
    }
}

pub async fn write_document<T: Serialize + Sync>(
    store: &dyn Store,
    path: &str,
    document: &T,
) -> Result<(), StoreError> {
    let value = serde_json::to_value(document).map_err(|source| StoreError::Malformed {
        path: path.to_string(),
        source,
    })?;

    store.write(path, value).await
}

pub fn decode<T: DeserializeOwned>(path: &str, value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|source| StoreError::Malformed {
        path: path.to_string(),
        source,
    })
}

const EVENT_CAPACITY: usize = 512;

#[derive(Clone)]
pub struct MemoryStore {
    documents: Arc<RwLock<BTreeMap<String, Value>>>,
    events: broadcast::Sender<StoreEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            documents: Arc::new(RwLock::new(BTreeMap::new())),
            events,
        }
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents.get(path).cloned())
    }

    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        documents.insert(path.to_string(), value.clone());
        drop(documents);

        // No subscribers is not an error.
        let _ = self.events.send(StoreEvent {
            path: path.to_string(),
            value,
        });

        Ok(())
    }

    async fn children(&self, path: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let documents = self.documents.read().await;

        let children = documents
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, value)| {
                let child = &key[prefix.len()..];
                (!child.is_empty() && !child.contains('/'))
                    .then(|| (child.to_string(), value.clone()))
            })
            .collect();

        Ok(children)
    }

    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<(String, Value)>, StoreError> {
        let matches = self
            .children(collection)
            .await?
            .into_iter()
            .filter(|(_, document)| document.get(field).and_then(Value::as_str) == Some(value))
            .collect();

        Ok(matches)
    }

    fn subscribe(&self, path: &str) -> Subscription {
        Subscription::new(path, self.events.subscribe())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[tokio::test]
    async fn documents_round_trip_by_path() {
        let store = MemoryStore::new();

        assert_eq!(store.read("users/a").await.unwrap(), None);
        store.write("users/a", json!({"name": "A"})).await.unwrap();
        store.write("users/a", json!({"name": "A2"})).await.unwrap();

        assert_eq!(store.read("users/a").await.unwrap(), Some(json!({"name": "A2"})));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn children_are_one_segment_deep() {
        let store = MemoryStore::new();
        store.write("userReferrals/a/b", json!(1)).await.unwrap();
        store.write("userReferrals/a/c", json!(2)).await.unwrap();
        store.write("userReferrals/ab/d", json!(3)).await.unwrap();
        store.write("userReferrals/a/c/x", json!(4)).await.unwrap();

        let children = store.children("userReferrals/a").await.unwrap();
        let keys: Vec<&str> = children.iter().map(|(key, _)| key.as_str()).collect();

        assert_eq!(keys, vec!["b", "c"]);
        assert!(store.children("userReferrals/z").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn find_by_field_matches_string_fields() {
        let store = MemoryStore::new();
        store
            .write("users/a", json!({"referralCode": "AAAAAAA1"}))
            .await
            .unwrap();
        store
            .write("users/b", json!({"referralCode": "BBBBBBB2"}))
            .await
            .unwrap();

        let found = store
            .find_by_field("users", "referralCode", "BBBBBBB2")
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, "b");
    }

    #[tokio::test]
    async fn subscriptions_see_writes_under_their_path() {
        let store = MemoryStore::new();
        let mut subscription = store.subscribe("userReferrals/a");

        store.write("userReferrals/ab/x", json!(0)).await.unwrap();
        store.write("users/a", json!({})).await.unwrap();
        store.write("userReferrals/a/b", json!({"level": 1})).await.unwrap();

        let event = subscription.next().await.unwrap();
        assert_eq!(event.path, "userReferrals/a/b");
        assert_eq!(event.value, json!({"level": 1}));
    }

    #[tokio::test]
    async fn typed_helpers_report_malformed_documents() {
        let store = MemoryStore::new();
        store.write("users/a", json!("not a user")).await.unwrap();

        let result: Result<Option<crate::models::users::User>, _> =
            read_document(&store, "users/a").await;

        assert!(matches!(result, Err(StoreError::Malformed { .. })));
    }
}
