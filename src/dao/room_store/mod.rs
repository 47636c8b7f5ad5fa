/// In-memory store with room access rules.
pub mod memory;
mod subscription;

use futures::future::BoxFuture;
use serde_json::{Map, Value};

use crate::dao::{path::StorePath, storage::StorageResult};

pub use self::subscription::{Snapshot, Subscription};

/// Abstraction over the shared, path-addressed room store.
///
/// Every call names the identity performing it so the backend can apply its
/// per-path read/write rules. Writes are last-write-wins per path; nothing
/// spans more than one path atomically except a single `update`.
pub trait RoomStore: Send + Sync {
    /// Read the value at `path`, failing with `NoData` when nothing is stored.
    fn get(&self, caller: &str, path: &StorePath) -> BoxFuture<'static, StorageResult<Value>>;
    /// Replace the value at `path`.
    fn set(&self, caller: &str, path: &StorePath, value: Value)
    -> BoxFuture<'static, StorageResult<()>>;
    /// Merge the given children into the object at `path`.
    fn update(
        &self,
        caller: &str,
        path: &StorePath,
        fields: Map<String, Value>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Delete the value at `path` and everything below it.
    fn remove(&self, caller: &str, path: &StorePath) -> BoxFuture<'static, StorageResult<()>>;
    /// Store `value` under a freshly generated child key of `path`, returning the key.
    fn push(
        &self,
        caller: &str,
        path: &StorePath,
        value: Value,
    ) -> BoxFuture<'static, StorageResult<String>>;
    /// Watch `path`. The current value is delivered immediately, then the whole
    /// subtree is re-delivered after every change inside it.
    fn subscribe(
        &self,
        caller: &str,
        path: &StorePath,
    ) -> BoxFuture<'static, StorageResult<Subscription>>;
}
