use std::{
    fmt,
    sync::atomic::{AtomicI64, Ordering},
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    dao::models::{CommState, GameCommEntity},
    error::ServiceError,
    state::game::{Answer, Question, Team},
};

/// Admin → MCQ: first question, team and every team's code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeMcqQuestionAndCodes {
    pub question: Question,
    pub team: Team,
    pub team_codes: IndexMap<Team, String>,
    /// Milliseconds the device has to answer.
    pub answer_duration: i64,
    /// Milliseconds the device stays locked after a wrong answer.
    pub lockout_duration: i64,
}

/// Admin → Baron: starting health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeBaron {
    pub health: u32,
    /// Milliseconds the Baron device stays locked after an invalid code.
    #[serde(default)]
    pub lockout_duration: i64,
}

/// Participant → Admin: initialization comm handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializationDone {
    pub fire_user_uid: String,
}

/// MCQ → Admin: answer to the currently assigned question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyMcqAnswer {
    pub fire_user_uid: String,
    pub answer: Answer,
}

/// Admin → MCQ: answer verdict, with a Baron code when correct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMcqAnswerVerification {
    pub is_correct: bool,
    pub baron_code: Option<String>,
}

/// MCQ → Admin: current question done with (dismissed or timed out).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMcqQuestion {
    pub fire_user_uid: String,
}

/// Admin → MCQ: next question and team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignMcqQuestion {
    pub question: Question,
    pub team: Team,
}

/// Baron → Admin: code typed on the Baron device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyBaronCode {
    pub baron_code: String,
}

/// Admin → Baron: verdict on a submitted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportBaronCode {
    pub is_valid: bool,
    pub damage_amount: u32,
    pub health_after_damage: u32,
    pub team: Option<Team>,
    pub is_last_hit: bool,
}

/// Admin → every MCQ: the Baron fell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyMcqEndGame {
    pub winning_team: Team,
}

/// Typed comm payload, tagged by its comm type on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "commType",
    content = "commMessage",
    rename_all = "SCREAMING_SNAKE_CASE"
)]
pub enum CommMessage {
    /// Admin → MCQ: first question and team codes.
    InitializeMcqQuestionAndCodes(InitializeMcqQuestionAndCodes),
    /// Admin → Baron: starting health.
    InitializeBaron(InitializeBaron),
    /// Participant → Admin: initialization applied.
    InitializationDone(InitializationDone),
    /// MCQ → Admin: answer to check.
    VerifyMcqAnswer(VerifyMcqAnswer),
    /// Admin → MCQ: answer verdict.
    ReportMcqAnswerVerification(ReportMcqAnswerVerification),
    /// MCQ → Admin: next question please.
    RequestMcqQuestion(RequestMcqQuestion),
    /// Admin → MCQ: next question.
    AssignMcqQuestion(AssignMcqQuestion),
    /// Baron → Admin: code to redeem.
    VerifyBaronCode(VerifyBaronCode),
    /// Admin → Baron: code verdict.
    ReportBaronCode(ReportBaronCode),
    /// Admin → MCQ: game over.
    NotifyMcqEndGame(NotifyMcqEndGame),
}

impl CommMessage {
    /// Wire name of the comm type.
    pub fn comm_type(&self) -> &'static str {
        match self {
            CommMessage::InitializeMcqQuestionAndCodes(_) => "INITIALIZE_MCQ_QUESTION_AND_CODES",
            CommMessage::InitializeBaron(_) => "INITIALIZE_BARON",
            CommMessage::InitializationDone(_) => "INITIALIZATION_DONE",
            CommMessage::VerifyMcqAnswer(_) => "VERIFY_MCQ_ANSWER",
            CommMessage::ReportMcqAnswerVerification(_) => "REPORT_MCQ_ANSWER_VERIFICATION",
            CommMessage::RequestMcqQuestion(_) => "REQUEST_MCQ_QUESTION",
            CommMessage::AssignMcqQuestion(_) => "ASSIGN_MCQ_QUESTION",
            CommMessage::VerifyBaronCode(_) => "VERIFY_BARON_CODE",
            CommMessage::ReportBaronCode(_) => "REPORT_BARON_CODE",
            CommMessage::NotifyMcqEndGame(_) => "NOTIFY_MCQ_END_GAME",
        }
    }
}

impl fmt::Display for CommMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.comm_type())
    }
}

/// A comm envelope with a decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameComm {
    /// `<timestamp>_<senderId>`, also the key inside the inbox.
    pub id: String,
    pub message: CommMessage,
    pub state: CommState,
}

impl GameComm {
    /// Fresh comm waiting to be processed.
    pub fn new(id: String, message: CommMessage) -> Self {
        Self {
            id,
            message,
            state: CommState::Waiting,
        }
    }

    /// Flatten into the stored `{id, commType, commMessage, commState}` shape.
    pub fn to_entity(&self) -> Result<GameCommEntity, ServiceError> {
        let tagged = serde_json::to_value(&self.message).map_err(|err| {
            ServiceError::InvalidInput(format!("comm {} cannot be encoded: {err}", self.id))
        })?;
        let (comm_type, comm_message) = match tagged {
            Value::Object(mut fields) => (
                fields.remove("commType"),
                fields.remove("commMessage").unwrap_or(Value::Null),
            ),
            _ => (None, Value::Null),
        };
        let comm_type = comm_type
            .and_then(|value| value.as_str().map(str::to_owned))
            .ok_or_else(|| ServiceError::InvalidInput(format!("comm {} has no type", self.id)))?;

        Ok(GameCommEntity {
            id: self.id.clone(),
            comm_type,
            comm_message,
            comm_state: self.state,
        })
    }
}

impl TryFrom<GameCommEntity> for GameComm {
    type Error = ServiceError;

    /// Decode the payload against its declared type; a mismatch is invalid input.
    fn try_from(value: GameCommEntity) -> Result<Self, Self::Error> {
        let tagged = json!({
            "commType": value.comm_type,
            "commMessage": value.comm_message,
        });
        let message = serde_json::from_value(tagged).map_err(|err| {
            ServiceError::InvalidInput(format!(
                "comm {} does not match type {}: {err}",
                value.id, value.comm_type
            ))
        })?;
        Ok(Self {
            id: value.id,
            message,
            state: value.comm_state,
        })
    }
}

/// Issues comm ids for one sending device.
///
/// Ids are `<timestamp>_<senderId>`; the timestamp is bumped past the last one
/// issued so two comms sent within the same millisecond stay distinct.
#[derive(Debug)]
pub struct CommIdGenerator {
    sender: String,
    last: AtomicI64,
}

impl CommIdGenerator {
    /// Generator for comms sent by `sender`.
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            last: AtomicI64::new(i64::MIN),
        }
    }

    /// Sender segment of every id issued.
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Next id, never earlier than `now_ms`.
    pub fn next_id(&self, now_ms: i64) -> String {
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now_ms.max(last.saturating_add(1)))
            })
            .unwrap_or(now_ms);
        let timestamp = now_ms.max(previous.saturating_add(1));
        format!("{timestamp}_{}", self.sender)
    }
}
