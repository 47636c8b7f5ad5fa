//! In-memory reference implementation of [`RoomStore`](super::RoomStore).

mod rules;
mod store;
mod tree;

pub use self::rules::{AccessPolicy, OpenAccess, RoomAccessRules};
pub use self::store::MemoryRoomStore;
