/// Typed, identity-aware client over the room store.
pub mod client;
/// Store entity definitions.
pub mod models;
/// Store paths and the room tree layout.
pub mod path;
/// Room store abstraction and its in-memory backend.
pub mod room_store;
/// Storage error types shared by every backend.
pub mod storage;
