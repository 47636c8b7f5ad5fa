use serde::Serialize;

use crate::state::state_machine::GameState;

/// Returned to the device that created a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub room_id: String,
    pub room_passcode: String,
    pub is_admin: bool,
    pub game_state: GameState,
    pub is_room_locked: bool,
}

/// How the calling device relates to a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum RoomActivity {
    /// Closed, expired or never created.
    Inactive,
    /// Caller owns the room.
    Admin,
    /// Caller already sits in the lobby.
    Participant {
        #[serde(rename = "isReady")]
        is_ready: bool,
    },
    /// Active room the caller has not joined.
    Open,
}

/// Public room fields needed to enter an existing lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStateSummary {
    pub passcode: String,
    pub is_room_locked: bool,
    pub game_state: GameState,
}

/// Result of asking to join a room's wait-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum JoinOutcome {
    /// Caller is the room's admin; nothing was written.
    Admin,
    /// Caller is already in the lobby; nothing was written.
    Participant {
        #[serde(rename = "isReady")]
        is_ready: bool,
    },
    /// A previous request is still waiting; nothing was written.
    AlreadyWaiting,
    /// A new wait-list entry was written.
    Waiting,
}
