use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::{
    dao::{
        path::StorePath,
        room_store::{RoomStore, Snapshot, Subscription},
        storage::{StorageError, StorageResult},
    },
    identity::IdentityProvider,
};

/// Typed, identity-aware handle on the shared room store.
///
/// Every call is made on behalf of the identity currently signed in; with no
/// identity the call fails with [`StorageError::Unauthenticated`].
#[derive(Clone)]
pub struct StoreClient {
    store: Arc<dyn RoomStore>,
    identity: Arc<dyn IdentityProvider>,
}

impl StoreClient {
    /// Client acting as `identity` against `store`.
    pub fn new(store: Arc<dyn RoomStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { store, identity }
    }

    /// Identity this client acts as.
    pub fn current_id(&self) -> StorageResult<String> {
        self.identity
            .current_id()
            .ok_or(StorageError::Unauthenticated)
    }

    /// Read and decode the value at `path`.
    pub async fn get<T: DeserializeOwned>(&self, path: &StorePath) -> StorageResult<T> {
        let value = self.get_value(path).await?;
        decode(path, value)
    }

    /// Read the raw value at `path`.
    pub async fn get_value(&self, path: &StorePath) -> StorageResult<Value> {
        let caller = self.current_id()?;
        self.store.get(&caller, path).await
    }

    /// Like [`get`](Self::get) but maps a missing value to `None`.
    pub async fn get_optional<T: DeserializeOwned>(
        &self,
        path: &StorePath,
    ) -> StorageResult<Option<T>> {
        match self.get(path).await {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_no_data() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Replace the value at `path`.
    pub async fn set<T: Serialize>(&self, path: &StorePath, value: &T) -> StorageResult<()> {
        let caller = self.current_id()?;
        let value = encode(path, value)?;
        self.store.set(&caller, path, value).await
    }

    /// Merge `fields` into the object at `path`; a `null` field removes that child.
    pub async fn update(&self, path: &StorePath, fields: Map<String, Value>) -> StorageResult<()> {
        let caller = self.current_id()?;
        self.store.update(&caller, path, fields).await
    }

    /// Delete the subtree at `path`.
    pub async fn remove(&self, path: &StorePath) -> StorageResult<()> {
        let caller = self.current_id()?;
        self.store.remove(&caller, path).await
    }

    /// Append `value` under a generated key and return that key.
    pub async fn push<T: Serialize>(&self, path: &StorePath, value: &T) -> StorageResult<String> {
        let caller = self.current_id()?;
        let value = encode(path, value)?;
        self.store.push(&caller, path, value).await
    }

    /// Follow every change under `path`, starting with the current value.
    pub async fn subscribe(&self, path: &StorePath) -> StorageResult<Subscription> {
        let caller = self.current_id()?;
        self.store.subscribe(&caller, path).await
    }
}

/// Decode a value read from `path`.
pub fn decode<T: DeserializeOwned>(path: &StorePath, value: Value) -> StorageResult<T> {
    serde_json::from_value(value).map_err(|source| StorageError::Serialization {
        path: path.to_string(),
        source,
    })
}

/// Decode a subscription delivery, keeping an empty delivery as `None`.
pub fn decode_snapshot<T: DeserializeOwned>(
    path: &StorePath,
    snapshot: Snapshot,
) -> StorageResult<Option<T>> {
    snapshot.map(|value| decode(path, value)).transpose()
}

fn encode<T: Serialize>(path: &StorePath, value: &T) -> StorageResult<Value> {
    serde_json::to_value(value).map_err(|source| StorageError::Serialization {
        path: path.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        dao::{
            models::{WaitListEntryEntity, WaitListState},
            room_store::memory::MemoryRoomStore,
        },
        identity::AnonymousIdentity,
    };

    #[tokio::test]
    async fn calls_without_identity_are_rejected() {
        let client = StoreClient::new(
            Arc::new(MemoryRoomStore::new()),
            Arc::new(AnonymousIdentity::new()),
        );
        let err = client
            .set(&StorePath::parse("/rooms/r/locked"), &true)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Unauthenticated));
    }

    #[tokio::test]
    async fn typed_round_trip_and_optional_reads() {
        let client = StoreClient::new(
            Arc::new(MemoryRoomStore::new()),
            Arc::new(AnonymousIdentity::with_id("u1")),
        );
        let path = StorePath::parse("/rooms/r/waitList/u1");
        assert_eq!(
            client.get_optional::<WaitListEntryEntity>(&path).await.unwrap(),
            None
        );

        let entry = WaitListEntryEntity {
            passcode: "abc123".into(),
            state: WaitListState::Waiting,
        };
        client.set(&path, &entry).await.unwrap();
        assert_eq!(client.get::<WaitListEntryEntity>(&path).await.unwrap(), entry);
    }

    #[test]
    fn malformed_values_report_serialization_errors() {
        let path = StorePath::parse("/x");
        let err = decode::<WaitListEntryEntity>(&path, json!({"state": 3})).unwrap_err();
        assert!(matches!(err, StorageError::Serialization { .. }));
    }
}
