use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    dao::path::{RoomPaths, StorePath},
    dto::comm::{
        CommIdGenerator, CommMessage, GameComm, InitializationDone, RequestMcqQuestion,
        VerifyMcqAnswer,
    },
    error::ServiceError,
    services::{
        comms::{self, CommHandler, CommInbox, CommOrigin, StoreTransport, Transport},
        game_state_service, room_service,
    },
    state::{
        SharedContext,
        game::{Answer, Question, Team},
        listeners::ListenerSlot,
        session::update_session,
        state_machine::GameState,
    },
};

/// What an MCQ device shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct McqView {
    pub game_state: GameState,
    pub team: Option<Team>,
    pub question: Option<Question>,
    pub team_codes: IndexMap<Team, String>,
    pub answer_duration_ms: i64,
    pub lockout_duration_ms: i64,
    /// The team code for the current question was typed correctly.
    pub team_code_accepted: bool,
    /// Epoch milliseconds after which the current question is given up.
    pub answer_deadline: Option<i64>,
    /// Epoch milliseconds until which answering is refused.
    pub lockout_until: Option<i64>,
    pub awaiting_verdict: bool,
    pub awaiting_question: bool,
    pub last_verdict: Option<bool>,
    /// Code to carry to the Baron after a correct answer.
    pub baron_code: Option<String>,
    pub winning_team: Option<Team>,
    pub game_ended: bool,
}

impl McqView {
    fn clear_round(&mut self) {
        self.team_code_accepted = false;
        self.answer_deadline = None;
        self.lockout_until = None;
        self.awaiting_verdict = false;
        self.last_verdict = None;
        self.baron_code = None;
    }
}

/// Trivia device: answers questions for whichever team the admin assigns and
/// earns Baron codes for it.
pub struct McqParticipant {
    ctx: SharedContext,
    room_id: String,
    uid: String,
    ids: CommIdGenerator,
    inbox: Arc<CommInbox>,
    inbox_path: StorePath,
    to_admin: StoreTransport,
    view: Mutex<McqView>,
    comms_slot: ListenerSlot,
    state_slot: ListenerSlot,
}

impl McqParticipant {
    /// Start following the game from the caller's lobby seat.
    pub async fn join(ctx: &SharedContext, room_id: &str) -> Result<Arc<Self>, ServiceError> {
        let uid = ctx.current_id()?;
        let paths = RoomPaths::new(room_id);
        let mcq = Arc::new(Self {
            ctx: ctx.clone(),
            room_id: room_id.to_owned(),
            ids: CommIdGenerator::new(uid.clone()),
            inbox: Arc::new(CommInbox::new()),
            inbox_path: paths.participant_inbox(&uid),
            to_admin: StoreTransport::to_admin(ctx.client().clone(), &paths),
            uid,
            view: Mutex::new(McqView::default()),
            comms_slot: ListenerSlot::new("mcq-comms"),
            state_slot: ListenerSlot::new("mcq-game-state"),
        });

        let subscription = ctx.client().subscribe(&mcq.inbox_path).await?;
        mcq.comms_slot.install(comms::spawn_comm_pump(
            Arc::downgrade(&mcq),
            mcq.inbox.clone(),
            mcq.inbox_path.clone(),
            Some(subscription),
            None,
        ));

        let weak = Arc::downgrade(&mcq);
        game_state_service::attach_game_state_listener(ctx, room_id, &mcq.state_slot, move |state| {
            if let Some(mcq) = weak.upgrade() {
                mcq.on_game_state(state);
            }
        })
        .await?;
        info!(room_id, uid = %mcq.uid, "mcq joined");
        Ok(mcq)
    }

    fn on_game_state(&self, state: GameState) {
        let mut view = self.view();
        let previous = std::mem::replace(&mut view.game_state, state);
        match state {
            GameState::GameInit => {
                view.game_ended = false;
                view.winning_team = None;
            }
            GameState::GameStarted => {}
            // The first delivery may land after initialization; a lobby only
            // ends a game that was seen running.
            GameState::Lobby if previous == GameState::Lobby => {}
            GameState::End | GameState::Lobby => {
                view.game_ended = true;
                view.question = None;
                view.awaiting_question = false;
                view.clear_round();
                if state == GameState::End {
                    update_session(self.ctx.session(), |session| session.game_ended = true);
                }
            }
        }
    }

    fn view(&self) -> MutexGuard<'_, McqView> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current screen state.
    pub fn snapshot(&self) -> McqView {
        self.view().clone()
    }

    /// Check the team code typed for the current question. A match reveals the
    /// question and starts its answer window.
    pub async fn submit_team_code(&self, code: &str) -> Result<bool, ServiceError> {
        let state = game_state_service::get_game_state(&self.ctx, &self.room_id).await?;
        if !state.is_game_in_progress() {
            return Err(ServiceError::InvalidState(format!(
                "team codes are only checked during play ({state:?})"
            )));
        }

        let now = self.ctx.now_ms();
        let mut view = self.view();
        let Some(team) = view.team else {
            return Err(ServiceError::InvalidState("no team assigned yet".into()));
        };
        if view.team_code_accepted {
            return Ok(true);
        }
        let accepted = view
            .team_codes
            .get(&team)
            .is_some_and(|expected| expected == code.trim());
        if accepted {
            let window = view.answer_duration_ms;
            view.team_code_accepted = true;
            view.answer_deadline = Some(now + window);
            debug!(room_id = %self.room_id, %team, "team code accepted");
        }
        Ok(accepted)
    }

    /// Send `answer` for the current question to the admin.
    pub async fn submit_answer(&self, answer: Answer) -> Result<(), ServiceError> {
        let now = self.ctx.now_ms();
        {
            let mut view = self.view();
            if !view.team_code_accepted {
                return Err(ServiceError::InvalidState("team code not entered".into()));
            }
            if view.lockout_until.is_some_and(|until| now < until) {
                return Err(ServiceError::InvalidState("answering is locked out".into()));
            }
            if view.answer_deadline.is_some_and(|deadline| now >= deadline) {
                return Err(ServiceError::InvalidState("answer window elapsed".into()));
            }
            if view.last_verdict == Some(true) {
                return Err(ServiceError::InvalidState("question already answered".into()));
            }
            if view.awaiting_verdict || view.awaiting_question {
                return Err(ServiceError::InvalidState("waiting on the admin".into()));
            }
            view.awaiting_verdict = true;
        }

        let comm = GameComm::new(
            self.ids.next_id(now),
            CommMessage::VerifyMcqAnswer(VerifyMcqAnswer {
                fire_user_uid: self.uid.clone(),
                answer,
            }),
        );
        if let Err(err) = self.to_admin.deliver(comm).await {
            self.view().awaiting_verdict = false;
            return Err(err);
        }
        Ok(())
    }

    /// Give up the current question (or move on after a correct answer) and
    /// ask the admin for the next one.
    pub async fn request_next_question(&self) -> Result<(), ServiceError> {
        {
            let mut view = self.view();
            if view.game_ended {
                return Err(ServiceError::InvalidState("game is over".into()));
            }
            if view.awaiting_question {
                return Err(ServiceError::InvalidState("next question already requested".into()));
            }
            view.awaiting_question = true;
        }

        let comm = GameComm::new(
            self.ids.next_id(self.ctx.now_ms()),
            CommMessage::RequestMcqQuestion(RequestMcqQuestion {
                fire_user_uid: self.uid.clone(),
            }),
        );
        if let Err(err) = self.to_admin.deliver(comm).await {
            self.view().awaiting_question = false;
            return Err(err);
        }
        Ok(())
    }

    /// Drive the answer timer. Once the window elapsed the next question is
    /// requested; returns whether that happened.
    pub async fn tick(&self) -> Result<bool, ServiceError> {
        let now = self.ctx.now_ms();
        let expired = {
            let view = self.view();
            !view.game_ended
                && !view.awaiting_question
                && !view.awaiting_verdict
                && view.answer_deadline.is_some_and(|deadline| now >= deadline)
        };
        if !expired {
            return Ok(false);
        }
        debug!(room_id = %self.room_id, uid = %self.uid, "answer window elapsed");
        self.request_next_question().await?;
        Ok(true)
    }

    /// Stop listening and leave the room.
    pub async fn leave(&self) -> Result<(), ServiceError> {
        self.comms_slot.cancel();
        self.state_slot.cancel();
        room_service::leave_room(&self.ctx, &self.room_id).await
    }

    /// Handle one comm. `Ok(false)` leaves it unacknowledged.
    async fn dispatch(&self, comm: GameComm) -> Result<bool, ServiceError> {
        match comm.message {
            CommMessage::InitializeMcqQuestionAndCodes(init) => {
                {
                    let mut view = self.view();
                    view.clear_round();
                    view.team = Some(init.team);
                    view.question = Some(init.question);
                    view.team_codes = init.team_codes;
                    view.answer_duration_ms = init.answer_duration;
                    view.lockout_duration_ms = init.lockout_duration;
                    view.awaiting_question = false;
                    view.winning_team = None;
                    view.game_ended = false;
                }
                let done = GameComm::new(
                    self.ids.next_id(self.ctx.now_ms()),
                    CommMessage::InitializationDone(InitializationDone {
                        fire_user_uid: self.uid.clone(),
                    }),
                );
                self.to_admin.deliver(done).await?;
                info!(room_id = %self.room_id, team = %init.team, "mcq initialized");
            }
            CommMessage::ReportMcqAnswerVerification(report) => {
                let mut view = self.view();
                view.awaiting_verdict = false;
                view.last_verdict = Some(report.is_correct);
                if report.is_correct {
                    view.baron_code = report.baron_code;
                } else {
                    let lockout = view.lockout_duration_ms;
                    view.lockout_until = Some(self.ctx.now_ms() + lockout);
                }
                debug!(room_id = %self.room_id, correct = report.is_correct, "answer verdict");
            }
            CommMessage::AssignMcqQuestion(assign) => {
                let mut view = self.view();
                view.clear_round();
                view.awaiting_question = false;
                view.team = Some(assign.team);
                debug!(room_id = %self.room_id, team = %assign.team, question = %assign.question.id, "question assigned");
                view.question = Some(assign.question);
            }
            CommMessage::NotifyMcqEndGame(notify) => {
                {
                    let mut view = self.view();
                    view.winning_team = Some(notify.winning_team);
                    view.game_ended = true;
                }
                update_session(self.ctx.session(), |session| {
                    session.winning_team = Some(notify.winning_team);
                    session.game_ended = true;
                });
                info!(room_id = %self.room_id, winning_team = %notify.winning_team, "game over");
            }
            other => {
                warn!(room_id = %self.room_id, comm_id = %comm.id, comm = %other, "unexpected comm for mcq");
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl CommHandler for McqParticipant {
    fn handle_comm(&self, comm: GameComm, origin: CommOrigin) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let comm_id = comm.id.clone();
            let handled = match self.dispatch(comm).await {
                Ok(handled) => handled,
                Err(err) => {
                    warn!(room_id = %self.room_id, comm_id = %comm_id, error = %err, "mcq failed to handle comm");
                    true
                }
            };
            if handled && origin == CommOrigin::Store {
                if let Err(err) =
                    comms::mark_processed(self.ctx.client(), &self.inbox_path, &comm_id).await
                {
                    warn!(room_id = %self.room_id, comm_id = %comm_id, error = %err, "failed to acknowledge comm");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        clock::ManualClock,
        config::AppConfig,
        dao::room_store::memory::MemoryRoomStore,
        dto::comm::InitializeMcqQuestionAndCodes,
        identity::AnonymousIdentity,
        services::lobby_service,
        state::AppContext,
    };

    fn device(store: &MemoryRoomStore, uid: &str) -> SharedContext {
        AppContext::seeded(
            Arc::new(store.clone()),
            Arc::new(AnonymousIdentity::with_id(uid)),
            Arc::new(ManualClock::new(1_000)),
            AppConfig::default(),
            5,
        )
    }

    fn initialize(team: Team) -> GameComm {
        let question = Question {
            id: "q1".into(),
            title: "Who takes first blood?".into(),
            answer: Answer::B,
            image_url: "img/q1.png".into(),
        };
        let team_codes = Team::ALL
            .into_iter()
            .map(|team| (team, format!("{team}1")))
            .collect();
        GameComm::new(
            "5_boss".into(),
            CommMessage::InitializeMcqQuestionAndCodes(InitializeMcqQuestionAndCodes {
                question,
                team,
                team_codes,
                answer_duration: 60_000,
                lockout_duration: 5_000,
            }),
        )
    }

    #[tokio::test]
    async fn late_lobby_delivery_keeps_the_first_question() {
        let store = MemoryRoomStore::new();
        let admin = device(&store, "boss");
        let player = device(&store, "m1");
        let room_id = room_service::create_room(&admin).await.unwrap().room_id;
        lobby_service::add_to_lobby_list(&admin, &room_id, "m1", false)
            .await
            .unwrap();
        let mcq = McqParticipant::join(&player, &room_id).await.unwrap();
        mcq.state_slot.cancel();

        assert!(mcq.dispatch(initialize(Team::Red)).await.unwrap());
        mcq.on_game_state(GameState::Lobby);
        let view = mcq.snapshot();
        assert_eq!(view.team, Some(Team::Red));
        assert_eq!(view.question.map(|question| question.id).as_deref(), Some("q1"));
        assert!(!view.game_ended);

        // Back in the lobby after a game really ran.
        mcq.on_game_state(GameState::GameInit);
        mcq.on_game_state(GameState::Lobby);
        let view = mcq.snapshot();
        assert!(view.game_ended);
        assert!(view.question.is_none());
        assert!(!player.session().load().is_some_and(|session| session.game_ended));
    }
}
