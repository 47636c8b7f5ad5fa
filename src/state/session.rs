use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::state::game::Team;

/// Per-device navigation snapshot, enough to resume after a reload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub room_id: Option<String>,
    pub room_passcode: Option<String>,
    pub is_admin: bool,
    pub is_ready: bool,
    pub is_room_locked: bool,
    pub is_baron: bool,
    pub winning_team: Option<Team>,
    pub game_ended: bool,
}

impl SessionState {
    /// Snapshot for a device sitting in `room_id`'s lobby.
    pub fn in_room(room_id: impl Into<String>, passcode: impl Into<String>) -> Self {
        Self {
            room_id: Some(room_id.into()),
            room_passcode: Some(passcode.into()),
            ..Self::default()
        }
    }
}

/// Host-provided persistence hook for [`SessionState`].
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Option<SessionState>;
    fn save(&self, state: &SessionState);
}

/// Session hook that keeps the snapshot in memory.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    state: Mutex<Option<SessionState>>,
}

impl MemorySessionStore {
    /// Store with no saved state.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Option<SessionState> {
        self.state.lock().ok().and_then(|guard| guard.clone())
    }

    fn save(&self, state: &SessionState) {
        match self.state.lock() {
            Ok(mut guard) => *guard = Some(state.clone()),
            Err(err) => warn!(error = %err, "session store poisoned; snapshot dropped"),
        }
    }
}

/// Apply `change` to the persisted snapshot (starting from an empty one) and save it.
pub fn update_session(store: &dyn SessionStore, change: impl FnOnce(&mut SessionState)) {
    let mut state = store.load().unwrap_or_default();
    change(&mut state);
    store.save(&state);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips_snapshot() {
        let store = MemorySessionStore::new();
        assert!(store.load().is_none());

        store.save(&SessionState::in_room("abc123", "pass12"));
        update_session(&store, |state| {
            state.game_ended = true;
            state.winning_team = Some(Team::Blue);
        });

        let state = store.load().unwrap();
        assert_eq!(state.room_id.as_deref(), Some("abc123"));
        assert!(state.game_ended);
        assert_eq!(state.winning_team, Some(Team::Blue));
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let value = serde_json::to_value(SessionState::in_room("r", "p")).unwrap();
        assert_eq!(value["roomId"], "r");
        assert_eq!(value["isRoomLocked"], false);
    }
}
