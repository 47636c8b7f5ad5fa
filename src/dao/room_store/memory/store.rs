use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, trace};

use super::{
    rules::{AccessPolicy, RoomAccessRules},
    tree,
};
use crate::dao::{
    path::StorePath,
    room_store::{RoomStore, Snapshot, Subscription},
    storage::{Access, StorageError, StorageResult},
};

/// Process-local [`RoomStore`] holding the whole tree in memory.
///
/// Clones share the same tree, so every simulated device in a process can hold
/// its own handle.
#[derive(Clone)]
pub struct MemoryRoomStore {
    inner: Arc<Inner>,
}

struct Inner {
    tree: RwLock<Value>,
    watchers: DashMap<u64, Watcher>,
    next_watcher: AtomicU64,
    next_push: AtomicU64,
    policy: Arc<dyn AccessPolicy>,
}

struct Watcher {
    path: StorePath,
    tx: mpsc::UnboundedSender<Snapshot>,
}

type Write = (StorePath, Option<Value>);

impl MemoryRoomStore {
    /// Empty store enforcing the room access rules.
    pub fn new() -> Self {
        Self::with_policy(Arc::new(RoomAccessRules))
    }

    /// Empty store enforcing a custom policy.
    pub fn with_policy(policy: Arc<dyn AccessPolicy>) -> Self {
        Self {
            inner: Arc::new(Inner {
                tree: RwLock::new(Value::Null),
                watchers: DashMap::new(),
                next_watcher: AtomicU64::new(0),
                next_push: AtomicU64::new(0),
                policy,
            }),
        }
    }

    /// Number of live subscriptions, handy for asserting listeners were released.
    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.len()
    }
}

impl Default for MemoryRoomStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    /// Check every write against the policy, then apply them all and notify
    /// the watchers whose subtree actually changed.
    async fn apply(&self, caller: &str, writes: Vec<Write>) -> StorageResult<()> {
        let mut tree = self.tree.write().await;

        for (path, value) in &writes {
            if !self.policy.can_write(&tree, caller, path, value.as_ref()) {
                debug!(caller, path = %path, "write rejected by access rules");
                return Err(StorageError::PermissionDenied {
                    access: Access::Write,
                    path: path.to_string(),
                });
            }
        }

        let affected: Vec<(u64, Snapshot)> = self
            .watchers
            .iter()
            .filter(|watcher| writes.iter().any(|(path, _)| watcher.path.overlaps(path)))
            .map(|watcher| (*watcher.key(), tree::snapshot_at(&tree, watcher.path.segments())))
            .collect();

        for (path, value) in writes {
            tree::write_at(&mut tree, path.segments(), value);
        }

        let mut closed = Vec::new();
        for (id, before) in affected {
            let Some(watcher) = self.watchers.get(&id) else {
                continue;
            };
            let after = tree::snapshot_at(&tree, watcher.path.segments());
            if after == before {
                continue;
            }
            trace!(watcher = id, path = %watcher.path, "delivering snapshot");
            if watcher.tx.send(after).is_err() {
                closed.push(id);
            }
        }
        drop(tree);

        for id in closed {
            self.watchers.remove(&id);
        }
        Ok(())
    }

    async fn get(&self, caller: &str, path: &StorePath) -> StorageResult<Value> {
        let tree = self.tree.read().await;
        if !self.policy.can_read(&tree, caller, path) {
            return Err(StorageError::PermissionDenied {
                access: Access::Read,
                path: path.to_string(),
            });
        }
        tree::snapshot_at(&tree, path.segments()).ok_or_else(|| StorageError::NoData {
            path: path.to_string(),
        })
    }

    fn next_push_key(&self) -> String {
        format!("-{:016}", self.next_push.fetch_add(1, Ordering::Relaxed))
    }
}

fn reject_null(path: &StorePath, value: &Value) -> StorageResult<()> {
    if value.is_null() {
        return Err(StorageError::EmptyWrite {
            path: path.to_string(),
        });
    }
    Ok(())
}

impl RoomStore for MemoryRoomStore {
    fn get(&self, caller: &str, path: &StorePath) -> BoxFuture<'static, StorageResult<Value>> {
        let inner = self.inner.clone();
        let caller = caller.to_owned();
        let path = path.clone();
        Box::pin(async move { inner.get(&caller, &path).await })
    }

    fn set(
        &self,
        caller: &str,
        path: &StorePath,
        value: Value,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        let caller = caller.to_owned();
        let path = path.clone();
        Box::pin(async move {
            reject_null(&path, &value)?;
            inner.apply(&caller, vec![(path, Some(value))]).await
        })
    }

    fn update(
        &self,
        caller: &str,
        path: &StorePath,
        fields: Map<String, Value>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        let caller = caller.to_owned();
        let path = path.clone();
        Box::pin(async move {
            if fields.is_empty() {
                return Err(StorageError::EmptyWrite {
                    path: path.to_string(),
                });
            }
            let writes = fields
                .into_iter()
                .map(|(key, value)| {
                    let value = (!value.is_null()).then_some(value);
                    (path.child(key), value)
                })
                .collect();
            inner.apply(&caller, writes).await
        })
    }

    fn remove(&self, caller: &str, path: &StorePath) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        let caller = caller.to_owned();
        let path = path.clone();
        Box::pin(async move { inner.apply(&caller, vec![(path, None)]).await })
    }

    fn push(
        &self,
        caller: &str,
        path: &StorePath,
        value: Value,
    ) -> BoxFuture<'static, StorageResult<String>> {
        let inner = self.inner.clone();
        let caller = caller.to_owned();
        let path = path.clone();
        Box::pin(async move {
            reject_null(&path, &value)?;
            let key = inner.next_push_key();
            inner
                .apply(&caller, vec![(path.child(key.clone()), Some(value))])
                .await?;
            Ok(key)
        })
    }

    fn subscribe(
        &self,
        caller: &str,
        path: &StorePath,
    ) -> BoxFuture<'static, StorageResult<Subscription>> {
        let inner = self.inner.clone();
        let caller = caller.to_owned();
        let path = path.clone();
        Box::pin(async move {
            // Registration happens under the read lock so no write can slip in
            // between the initial snapshot and the first notification.
            let tree = inner.tree.read().await;
            if !inner.policy.can_read(&tree, &caller, &path) {
                return Err(StorageError::PermissionDenied {
                    access: Access::Read,
                    path: path.to_string(),
                });
            }

            let (tx, rx) = mpsc::unbounded_channel();
            let _ = tx.send(tree::snapshot_at(&tree, path.segments()));
            let id = inner.next_watcher.fetch_add(1, Ordering::Relaxed);
            debug!(watcher = id, caller = %caller, path = %path, "subscription registered");
            inner.watchers.insert(id, Watcher { path, tx });
            drop(tree);

            let weak = Arc::downgrade(&inner);
            Ok(Subscription::new(rx, move || {
                if let Some(inner) = weak.upgrade() {
                    inner.watchers.remove(&id);
                }
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dao::{path::RoomPaths, room_store::memory::OpenAccess};

    fn open_store() -> MemoryRoomStore {
        MemoryRoomStore::with_policy(Arc::new(OpenAccess))
    }

    #[tokio::test]
    async fn get_missing_path_reports_no_data() {
        let store = open_store();
        let err = store
            .get("u1", &StorePath::parse("/nothing"))
            .await
            .unwrap_err();
        assert!(err.is_no_data());
    }

    #[tokio::test]
    async fn null_writes_are_rejected() {
        let store = open_store();
        let err = store
            .set("u1", &StorePath::parse("/a"), Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::EmptyWrite { .. }));
    }

    #[tokio::test]
    async fn update_merges_children_and_nulls_remove() {
        let store = open_store();
        let path = StorePath::parse("/obj");
        store.set("u", &path, json!({"a": 1, "b": 2})).await.unwrap();

        let mut fields = Map::new();
        fields.insert("b".into(), Value::Null);
        fields.insert("c".into(), json!(3));
        store.update("u", &path, fields).await.unwrap();

        assert_eq!(store.get("u", &path).await.unwrap(), json!({"a": 1, "c": 3}));
    }

    #[tokio::test]
    async fn push_keys_sort_in_insertion_order() {
        let store = open_store();
        let path = StorePath::parse("/list");
        let first = store.push("u", &path, json!(1)).await.unwrap();
        let second = store.push("u", &path, json!(2)).await.unwrap();
        assert!(first < second);
    }

    #[tokio::test]
    async fn subscription_delivers_initial_value_then_changes() {
        let store = open_store();
        let paths = RoomPaths::new("r1");
        store.set("u", &paths.locked(), json!(false)).await.unwrap();

        let mut sub = store.subscribe("u", &paths.root()).await.unwrap();
        assert_eq!(sub.next().await.unwrap(), Some(json!({"locked": false})));

        store.set("u", &paths.locked(), json!(true)).await.unwrap();
        assert_eq!(sub.next().await.unwrap(), Some(json!({"locked": true})));

        store.remove("u", &paths.root()).await.unwrap();
        assert_eq!(sub.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn unrelated_writes_do_not_notify() {
        let store = open_store();
        let paths = RoomPaths::new("r1");
        let mut sub = store.subscribe("u", &paths.wait_list()).await.unwrap();
        assert_eq!(sub.next().await.unwrap(), None);

        store.set("u", &paths.locked(), json!(true)).await.unwrap();
        store
            .set("u", &paths.wait_list_entry("a"), json!({"passcode": ""}))
            .await
            .unwrap();
        assert_eq!(
            sub.next().await.unwrap(),
            Some(json!({"a": {"passcode": ""}}))
        );
    }

    #[tokio::test]
    async fn dropping_subscription_unregisters_watcher() {
        let store = open_store();
        let sub = store.subscribe("u", &StorePath::parse("/x")).await.unwrap();
        assert_eq!(store.watcher_count(), 1);
        drop(sub);
        assert_eq!(store.watcher_count(), 0);
    }

    #[tokio::test]
    async fn access_rules_guard_claimed_rooms() {
        let store = MemoryRoomStore::new();
        let paths = RoomPaths::new("r1");
        store
            .set("boss", &paths.admin(), json!({"id": "boss"}))
            .await
            .unwrap();

        let err = store
            .set("intruder", &paths.locked(), json!(true))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::PermissionDenied { .. }));

        let err = store.get("intruder", &paths.admin()).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::PermissionDenied {
                access: Access::Read,
                ..
            }
        ));
    }
}
