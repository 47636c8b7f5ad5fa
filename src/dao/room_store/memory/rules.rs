use serde_json::Value;

use crate::dao::{
    models::comm_sender,
    path::{StorePath, segments::*},
};

/// Per-path permission rules evaluated by the in-memory store.
pub trait AccessPolicy: Send + Sync {
    /// Whether `caller` may read or subscribe to `path`.
    fn can_read(&self, tree: &Value, caller: &str, path: &StorePath) -> bool;
    /// Whether `caller` may store `value` (or remove, when `None`) at `path`.
    fn can_write(
        &self,
        tree: &Value,
        caller: &str,
        path: &StorePath,
        value: Option<&Value>,
    ) -> bool;
}

/// Policy granting every identity full access. Meant for trusted tooling.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAccess;

impl AccessPolicy for OpenAccess {
    fn can_read(&self, _tree: &Value, _caller: &str, _path: &StorePath) -> bool {
        true
    }

    fn can_write(
        &self,
        _tree: &Value,
        _caller: &str,
        _path: &StorePath,
        _value: Option<&Value>,
    ) -> bool {
        true
    }
}

/// The room tree rules: the identity recorded at `admin.id` owns the room,
/// participants may only touch their own wait-list entry, readiness flag,
/// lobby entry removal, inbox acknowledgements and the comms they send to the
/// admin.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoomAccessRules;

impl RoomAccessRules {
    fn admin_of<'a>(tree: &'a Value, room_id: &str) -> Option<&'a str> {
        tree.get(ROOMS)?
            .get(room_id)?
            .get(ADMIN)?
            .get("id")?
            .as_str()
    }

    fn participant_may_write(caller: &str, rest: &[&str], value: Option<&Value>) -> bool {
        match rest {
            [WAIT_LIST, uid, ..] => *uid == caller,
            [LOBBY_LIST, uid] => *uid == caller && value.is_none(),
            [LOBBY_LIST, uid, IS_READY] => *uid == caller,
            [
                LOBBY_LIST,
                uid,
                PARTICIPANT_COMMS,
                PARTICIPANT_INBOX,
                _,
                COMM_STATE,
            ] => *uid == caller,
            [COMMS_TO_ADMIN, comm_id, ..] => comm_sender(comm_id) == Some(caller),
            _ => false,
        }
    }
}

impl AccessPolicy for RoomAccessRules {
    fn can_read(&self, tree: &Value, caller: &str, path: &StorePath) -> bool {
        let segments: Vec<&str> = path.segments().iter().map(String::as_str).collect();
        match segments.as_slice() {
            [ROOMS, room_id, ADMIN, ..] => match Self::admin_of(tree, room_id) {
                Some(admin) => admin == caller,
                None => true,
            },
            _ => true,
        }
    }

    fn can_write(
        &self,
        tree: &Value,
        caller: &str,
        path: &StorePath,
        value: Option<&Value>,
    ) -> bool {
        let segments: Vec<&str> = path.segments().iter().map(String::as_str).collect();
        match segments.as_slice() {
            [ROOMS, room_id, rest @ ..] => match Self::admin_of(tree, room_id) {
                None => true,
                Some(admin) if admin == caller => true,
                Some(_) => Self::participant_may_write(caller, rest, value),
            },
            [QUESTION_BANK, ..] => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dao::path::RoomPaths;

    fn tree() -> Value {
        json!({"rooms": {"r1": {"admin": {"id": "boss"}, "locked": false}}})
    }

    #[test]
    fn admin_path_is_readable_only_by_admin() {
        let rules = RoomAccessRules;
        let paths = RoomPaths::new("r1");
        assert!(rules.can_read(&tree(), "boss", &paths.admin()));
        assert!(!rules.can_read(&tree(), "u1", &paths.admin()));
        assert!(rules.can_read(&tree(), "u1", &paths.locked()));
    }

    #[test]
    fn participants_write_only_their_own_entries() {
        let rules = RoomAccessRules;
        let paths = RoomPaths::new("r1");
        let tree = tree();
        let val = json!(true);

        assert!(rules.can_write(&tree, "u1", &paths.wait_list_entry("u1"), Some(&val)));
        assert!(!rules.can_write(&tree, "u1", &paths.wait_list_entry("u2"), Some(&val)));
        assert!(rules.can_write(
            &tree,
            "u1",
            &paths.lobby_entry("u1").child("isReady"),
            Some(&val)
        ));
        assert!(!rules.can_write(
            &tree,
            "u1",
            &paths.lobby_entry("u1").child("role"),
            Some(&val)
        ));
        assert!(rules.can_write(&tree, "u1", &paths.lobby_entry("u1"), None));
        assert!(!rules.can_write(&tree, "u1", &paths.lobby_entry("u1"), Some(&val)));
        assert!(!rules.can_write(&tree, "u1", &paths.locked(), Some(&val)));
        assert!(rules.can_write(&tree, "boss", &paths.locked(), Some(&val)));
    }

    #[test]
    fn admin_inbox_writes_must_carry_the_callers_id() {
        let rules = RoomAccessRules;
        let paths = RoomPaths::new("r1");
        let val = json!({});
        assert!(rules.can_write(
            &tree(),
            "u1",
            &paths.admin_inbox().child("1700000000000_u1"),
            Some(&val)
        ));
        assert!(!rules.can_write(
            &tree(),
            "u1",
            &paths.admin_inbox().child("1700000000000_u2"),
            Some(&val)
        ));
    }

    #[test]
    fn unclaimed_rooms_can_be_created_by_anyone() {
        let rules = RoomAccessRules;
        let paths = RoomPaths::new("fresh");
        assert!(rules.can_write(&tree(), "u1", &paths.admin(), Some(&json!({"id": "u1"}))));
        assert!(!rules.can_write(&tree(), "u1", &StorePath::parse("/elsewhere"), None));
    }
}
