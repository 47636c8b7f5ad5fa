use std::{fmt, str::FromStr};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use validator::Validate;

/// Owner record stored under `rooms/<id>/admin`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdminEntity {
    /// Device identity of the room's admin.
    pub id: String,
}

/// Progress of a wait-list entry through the admission handshake.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WaitListState {
    /// Participant asked to join, admin has not processed it yet.
    Waiting,
    /// Admin moved the participant into the lobby, participant has not acked yet.
    Added,
}

/// Entry written by a participant under `waitList/<uid>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WaitListEntryEntity {
    /// Passcode typed by the participant.
    pub passcode: String,
    /// Handshake progress.
    pub state: WaitListState,
}

/// Role a lobby member plays once the game starts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GameRole {
    /// Room owner and game coordinator.
    Admin,
    /// Boss device whose health the teams reduce.
    Baron,
    /// Trivia answering device.
    Mcq,
}

/// Raised when a role string does not name a known role.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown game role `{0}`")]
pub struct UnknownRole(pub String);

impl GameRole {
    /// Profile image codes a member with this role may display.
    pub fn image_codes(self) -> &'static [&'static str] {
        match self {
            GameRole::Admin => &["786"],
            GameRole::Baron => &["839"],
            GameRole::Mcq => &["778", "779", "780"],
        }
    }

    /// Roles the admin can hand to a lobby member. The admin's own entry
    /// switches between admin and baron, everyone else between mcq and baron.
    pub fn selectable_for(is_admin_entry: bool) -> &'static [GameRole] {
        if is_admin_entry {
            &[GameRole::Admin, GameRole::Baron]
        } else {
            &[GameRole::Mcq, GameRole::Baron]
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            GameRole::Admin => "admin",
            GameRole::Baron => "baron",
            GameRole::Mcq => "mcq",
        }
    }
}

impl fmt::Display for GameRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameRole {
    type Err = UnknownRole;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "admin" => Ok(GameRole::Admin),
            "baron" => Ok(GameRole::Baron),
            "mcq" => Ok(GameRole::Mcq),
            other => Err(UnknownRole(other.to_owned())),
        }
    }
}

/// Entry maintained by the admin under `lobbyList/<uid>`.
///
/// The participant's comm inbox also nests below this node; it is ignored here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LobbyListEntryEntity {
    /// Whether the member is ready to start.
    pub is_ready: bool,
    /// Role assigned by the admin.
    pub role: GameRole,
    /// Profile image code picked from the role's image set.
    pub role_img_code: String,
}

/// Question as stored in a question bank. Fields are optional on the wire and
/// checked when converted into a runtime question.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(rename_all = "camelCase")]
pub struct QuestionEntity {
    #[validate(required, length(min = 1))]
    pub title: Option<String>,
    #[validate(required, length(min = 1))]
    pub answer: Option<String>,
    #[validate(required, length(min = 1))]
    pub image_url: Option<String>,
}

/// Distribution used to roll the damage of a Baron hit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DamageDistribution {
    /// Bell curve centred between the damage bounds.
    #[default]
    Gaussian,
    /// Flat draw between the damage bounds.
    Uniform,
}

/// Game settings stored flat under `rooms/<id>/settings`. Durations are in
/// milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameSettingsEntity {
    pub team_codes: IndexMap<String, String>,
    pub baron_max_health: u32,
    pub baron_code_active_duration: i64,
    pub baron_code_length: usize,
    pub min_damage: u32,
    pub max_damage: u32,
    pub question_answer_window_duration: i64,
    pub question_wrong_lockout_duration: i64,
    pub baron_code_wrong_lockout_duration: i64,
    pub minimum_team_computers: usize,
    pub random_sequence_multiplier: usize,
    pub damage_distribution: DamageDistribution,
    pub question_bank_id: String,
}

/// Processing state of a comm inside an inbox.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommState {
    /// Not handled by the receiver yet.
    Waiting,
    /// Handled; kept for the rest of the game.
    Processed,
}

/// Raw comm envelope as stored in an inbox. The message is decoded against
/// its declared type by the comm layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameCommEntity {
    pub id: String,
    pub comm_type: String,
    #[serde(default)]
    pub comm_message: Value,
    pub comm_state: CommState,
}

/// Sender identity embedded in a comm id (`<timestamp>_<senderId>`).
pub fn comm_sender(comm_id: &str) -> Option<&str> {
    comm_id
        .split_once('_')
        .map(|(_, sender)| sender)
        .filter(|sender| !sender.is_empty())
}

/// Timestamp prefix of a comm id, used to order inbox contents.
pub fn comm_timestamp(comm_id: &str) -> Option<i64> {
    comm_id
        .split_once('_')
        .and_then(|(timestamp, _)| timestamp.parse().ok())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn comm_id_parts() {
        assert_eq!(comm_sender("1700000000000_abc"), Some("abc"));
        assert_eq!(comm_timestamp("1700000000000_abc"), Some(1_700_000_000_000));
        assert_eq!(comm_sender("nounderscore"), None);
        assert_eq!(comm_sender("123_"), None);
    }

    #[test]
    fn role_parsing_rejects_unknown_values() {
        assert_eq!("baron".parse::<GameRole>(), Ok(GameRole::Baron));
        assert_eq!(
            "wizard".parse::<GameRole>(),
            Err(UnknownRole("wizard".into()))
        );
    }

    #[test]
    fn lobby_entry_ignores_nested_comms() {
        let entry: LobbyListEntryEntity = serde_json::from_value(json!({
            "isReady": true,
            "role": "mcq",
            "roleImgCode": "778",
            "gameComms": {"toUser": {}}
        }))
        .unwrap();
        assert_eq!(entry.role, GameRole::Mcq);
        assert!(entry.is_ready);
    }

    #[test]
    fn question_entity_requires_every_field() {
        let missing: QuestionEntity =
            serde_json::from_value(json!({"title": "Q", "answer": "a"})).unwrap();
        assert!(missing.validate().is_err());

        let complete: QuestionEntity = serde_json::from_value(
            json!({"title": "Q", "answer": "a", "imageUrl": "img/q.png"}),
        )
        .unwrap();
        assert!(complete.validate().is_ok());
    }
}
