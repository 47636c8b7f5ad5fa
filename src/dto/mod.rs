/// Comm envelopes and payloads exchanged between devices.
pub mod comm;
/// Results returned by the room and wait-list flows.
pub mod room;
