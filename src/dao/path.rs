//! Path addressing for the room store, plus the logical room tree layout.

use std::fmt;

const ROOMS: &str = "rooms";
const ROOM_ADMIN: &str = "admin";
const ROOM_LOCKED: &str = "locked";
const ROOM_ACTIVE_TIME: &str = "activeTime";
const ROOM_GAME_SETTINGS: &str = "settings";
const ROOM_PASSCODE: &str = "passcode";
const ROOM_BLOCK_LIST: &str = "blockList";
const ROOM_WAIT_LIST: &str = "waitList";
const ROOM_LOBBY_LIST: &str = "lobbyList";
const ROOM_GAME_STATE: &str = "gameState";
const ROOM_GAME_COMMS_TO_ADMIN: &str = "gameCommsToAdmin";
const PARTICIPANT_GAME_COMMS: &str = "gameComms";
const PARTICIPANT_INBOX: &str = "toUser";
const QUESTION_BANK: &str = "questionBank";
const QUESTION_BANK_QUESTIONS: &str = "questions";

/// Slash separated location inside the store tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    /// The root of the tree.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a `/a/b/c` style path, ignoring empty segments.
    pub fn parse(raw: &str) -> Self {
        Self {
            segments: raw
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }

    /// Return a new path with `segment` appended.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// Path segments from the root.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Last segment of the path, if any.
    pub fn key(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// True when `self` equals `other` or lies above it in the tree.
    pub fn is_ancestor_of(&self, other: &StorePath) -> bool {
        self.segments.len() <= other.segments.len()
            && self
                .segments
                .iter()
                .zip(other.segments.iter())
                .all(|(a, b)| a == b)
    }

    /// True when either path contains the other.
    pub fn overlaps(&self, other: &StorePath) -> bool {
        self.is_ancestor_of(other) || other.is_ancestor_of(self)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

/// Builder for every path owned by a single room.
#[derive(Debug, Clone)]
pub struct RoomPaths {
    root: StorePath,
}

impl RoomPaths {
    /// Paths of room `room_id`.
    pub fn new(room_id: &str) -> Self {
        Self {
            root: StorePath::root().child(ROOMS).child(room_id),
        }
    }

    pub fn root(&self) -> StorePath {
        self.root.clone()
    }

    /// Admin-only subtree; readable solely by the room's admin identity.
    pub fn admin(&self) -> StorePath {
        self.root.child(ROOM_ADMIN)
    }

    pub fn locked(&self) -> StorePath {
        self.root.child(ROOM_LOCKED)
    }

    pub fn active_time(&self) -> StorePath {
        self.root.child(ROOM_ACTIVE_TIME)
    }

    pub fn game_state(&self) -> StorePath {
        self.root.child(ROOM_GAME_STATE)
    }

    pub fn settings(&self) -> StorePath {
        self.root.child(ROOM_GAME_SETTINGS)
    }

    pub fn passcode(&self) -> StorePath {
        self.root.child(ROOM_PASSCODE)
    }

    pub fn block_list(&self) -> StorePath {
        self.root.child(ROOM_BLOCK_LIST)
    }

    pub fn wait_list(&self) -> StorePath {
        self.root.child(ROOM_WAIT_LIST)
    }

    pub fn wait_list_entry(&self, uid: &str) -> StorePath {
        self.wait_list().child(uid)
    }

    pub fn lobby_list(&self) -> StorePath {
        self.root.child(ROOM_LOBBY_LIST)
    }

    /// Lobby seat of `uid`; participant inboxes hang below it.
    pub fn lobby_entry(&self, uid: &str) -> StorePath {
        self.lobby_list().child(uid)
    }

    /// Inbox read by the admin device.
    pub fn admin_inbox(&self) -> StorePath {
        self.root.child(ROOM_GAME_COMMS_TO_ADMIN)
    }

    /// All comm channels nested under a participant's lobby entry.
    pub fn participant_comms(&self, uid: &str) -> StorePath {
        self.lobby_entry(uid).child(PARTICIPANT_GAME_COMMS)
    }

    /// Inbox read by a participant device.
    pub fn participant_inbox(&self, uid: &str) -> StorePath {
        self.participant_comms(uid).child(PARTICIPANT_INBOX)
    }
}

/// Location of the questions for a question bank.
pub fn question_bank_questions(bank_id: &str) -> StorePath {
    StorePath::root()
        .child(QUESTION_BANK)
        .child(bank_id)
        .child(QUESTION_BANK_QUESTIONS)
}

/// Segment names referenced by the access rules.
pub(crate) mod segments {
    pub const ROOMS: &str = super::ROOMS;
    pub const ADMIN: &str = super::ROOM_ADMIN;
    pub const WAIT_LIST: &str = super::ROOM_WAIT_LIST;
    pub const LOBBY_LIST: &str = super::ROOM_LOBBY_LIST;
    pub const IS_READY: &str = "isReady";
    pub const COMMS_TO_ADMIN: &str = super::ROOM_GAME_COMMS_TO_ADMIN;
    pub const PARTICIPANT_COMMS: &str = super::PARTICIPANT_GAME_COMMS;
    pub const PARTICIPANT_INBOX: &str = super::PARTICIPANT_INBOX;
    pub const COMM_STATE: &str = "commState";
    pub const QUESTION_BANK: &str = super::QUESTION_BANK;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_round_trip() {
        let path = StorePath::parse("/rooms/abc123/waitList/");
        assert_eq!(path.segments().len(), 3);
        assert_eq!(path.to_string(), "/rooms/abc123/waitList");
        assert_eq!(StorePath::root().to_string(), "/");
    }

    #[test]
    fn ancestry_checks() {
        let paths = RoomPaths::new("abc123");
        assert!(paths.root().is_ancestor_of(&paths.wait_list_entry("u1")));
        assert!(!paths.wait_list().is_ancestor_of(&paths.lobby_list()));
        assert!(paths.participant_inbox("u1").overlaps(&paths.lobby_entry("u1")));
        assert!(!paths.participant_inbox("u1").overlaps(&paths.lobby_entry("u2")));
    }

    #[test]
    fn participant_inbox_nests_under_lobby_entry() {
        let paths = RoomPaths::new("r");
        assert_eq!(
            paths.participant_inbox("u1").to_string(),
            "/rooms/r/lobbyList/u1/gameComms/toUser"
        );
        assert_eq!(
            question_bank_questions("bank").to_string(),
            "/questionBank/bank/questions"
        );
    }
}
