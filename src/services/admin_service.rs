use std::sync::Arc;

use futures::future::BoxFuture;
use indexmap::IndexMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    dao::{models::comm_sender, path::RoomPaths},
    dto::comm::{
        AssignMcqQuestion, CommIdGenerator, CommMessage, GameComm, InitializeBaron,
        InitializeMcqQuestionAndCodes, NotifyMcqEndGame, ReportBaronCode,
        ReportMcqAnswerVerification,
    },
    error::ServiceError,
    services::{
        baron_service::BaronParticipant,
        comms::{
            self, CommHandler, CommInbox, CommOrigin, InProcessTransport, StoreTransport,
            Transport, in_process_link,
        },
        game_state_service, lobby_service, question_bank, room_service, waitlist_service,
    },
    state::{
        SharedContext,
        combat::BaronCodePackage,
        game::{LeagueKookGame, Team},
        listeners::ListenerSlot,
        session::update_session,
        state_machine::{GameEvent, GameState, GameStateMachine},
    },
};

/// A game between initialization and the return to the lobby.
struct ActiveGame {
    game: LeagueKookGame,
    /// Participant uid to whether it echoed `INITIALIZATION_DONE`.
    initialized: IndexMap<String, bool>,
    /// Set when the admin device plays the Baron itself.
    baron_link: Option<InProcessTransport>,
}

struct Coordination {
    machine: GameStateMachine,
    game: Option<ActiveGame>,
}

/// What [`AdminCoordinator::initialize_game`] set in motion.
pub struct GameLaunch {
    /// Devices that were sent an initialization comm.
    pub participants: Vec<String>,
    /// Baron half of this device, when the admin plays the Baron.
    pub local_baron: Option<Arc<BaronParticipant>>,
}

/// Admin side of a room: admission, game lifecycle and the authoritative game.
///
/// Comms are handled one at a time; the game and the state machine sit behind
/// a single lock so a comm always sees a consistent pair.
pub struct AdminCoordinator {
    ctx: SharedContext,
    room_id: String,
    paths: RoomPaths,
    uid: String,
    ids: Arc<CommIdGenerator>,
    inbox: Arc<CommInbox>,
    coordination: Mutex<Coordination>,
    comms_slot: ListenerSlot,
    wait_list_slot: ListenerSlot,
}

impl AdminCoordinator {
    /// Coordinator for a room the caller owns, resumed from the stored game state.
    pub async fn new(ctx: &SharedContext, room_id: &str) -> Result<Arc<Self>, ServiceError> {
        let uid = ctx.current_id()?;
        if !room_service::is_admin_of_room(ctx, room_id).await {
            return Err(ServiceError::Unauthorized(format!(
                "{uid} does not own room {room_id}"
            )));
        }
        let state = game_state_service::get_game_state(ctx, room_id).await?;
        if state != GameState::Lobby {
            warn!(room_id, ?state, "resuming admin outside the lobby; game data is lost");
        }

        Ok(Arc::new(Self {
            ctx: ctx.clone(),
            room_id: room_id.to_owned(),
            paths: RoomPaths::new(room_id),
            ids: Arc::new(CommIdGenerator::new(uid.clone())),
            uid,
            inbox: Arc::new(CommInbox::new()),
            coordination: Mutex::new(Coordination {
                machine: GameStateMachine::resume(state),
                game: None,
            }),
            comms_slot: ListenerSlot::new("admin-comms"),
            wait_list_slot: ListenerSlot::new("admin-wait-list"),
        }))
    }

    /// Room this coordinator runs.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Start admitting wait-list entrants into the lobby.
    pub async fn start_admission(&self) -> Result<(), ServiceError> {
        waitlist_service::attach_admin_wait_list_listener(
            &self.ctx,
            &self.room_id,
            &self.wait_list_slot,
        )
        .await
    }

    /// Lock or unlock the room. Unlocking admits whoever queued up meanwhile.
    pub async fn set_room_lock(&self, locked: bool) -> Result<(), ServiceError> {
        room_service::set_room_lock(&self.ctx, &self.room_id, locked).await?;
        if !locked {
            let admitted = waitlist_service::admit_pending(&self.ctx, &self.room_id).await;
            debug!(room_id = %self.room_id, admitted, "pending entrants admitted after unlock");
        }
        Ok(())
    }

    /// Stop every listener and close the room.
    pub async fn close(&self) -> Result<(), ServiceError> {
        self.wait_list_slot.cancel();
        self.comms_slot.cancel();
        room_service::close_room(&self.ctx, &self.room_id).await
    }

    /// Close the lobby, build the game and send every participant its
    /// initialization comm.
    ///
    /// Nothing is published unless the lobby satisfies the start condition and
    /// the game can be built. Play starts once every participant echoed
    /// `INITIALIZATION_DONE`.
    pub async fn initialize_game(self: &Arc<Self>) -> Result<GameLaunch, ServiceError> {
        let mut coordination = self.coordination.lock().await;
        let plan = coordination.machine.plan(GameEvent::InitializeGame)?;

        let game = match self.build_game().await {
            Ok(game) => game,
            Err(err) => {
                coordination.machine.abort(plan.id)?;
                return Err(err);
            }
        };
        let participants = game.participant_uids();

        comms::clear_room_comms(&self.ctx, &self.room_id, &participants).await;
        if let Err(err) =
            game_state_service::set_game_state(&self.ctx, &self.room_id, plan.to).await
        {
            coordination.machine.abort(plan.id)?;
            return Err(err);
        }
        coordination.machine.apply(plan.id)?;
        self.inbox.reset();

        let plays_baron = game
            .baron_player()
            .is_some_and(|baron| baron.member.uid == self.uid);
        let (baron_link, local_baron, local_rx) = if plays_baron {
            let (to_baron, baron_rx) = in_process_link();
            let (to_admin, admin_rx) = in_process_link();
            let baron = BaronParticipant::co_located(
                &self.ctx,
                &self.room_id,
                to_admin,
                baron_rx,
                self.ids.clone(),
            )
            .await?;
            (Some(to_baron), Some(baron), Some(admin_rx))
        } else {
            (None, None, None)
        };

        let subscription = self.ctx.client().subscribe(&self.paths.admin_inbox()).await?;
        self.comms_slot.install(comms::spawn_comm_pump(
            Arc::downgrade(self),
            self.inbox.clone(),
            self.paths.admin_inbox(),
            Some(subscription),
            local_rx,
        ));

        let active = coordination.game.insert(ActiveGame {
            game,
            initialized: participants
                .iter()
                .map(|uid| (uid.clone(), false))
                .collect(),
            baron_link,
        });
        for (uid, message) in initialization_comms(&active.game) {
            if let Err(err) = self.send(active, &uid, message).await {
                warn!(room_id = %self.room_id, uid = %uid, error = %err, "failed to send initialization");
            }
        }
        info!(room_id = %self.room_id, participants = participants.len(), "game initialized");

        Ok(GameLaunch {
            participants,
            local_baron,
        })
    }

    async fn build_game(&self) -> Result<LeagueKookGame, ServiceError> {
        let members = lobby_service::get_lobby_members(&self.ctx, &self.room_id).await?;
        if !lobby_service::verify_game_start_condition(
            &members,
            self.ctx.config().room.min_mcq_role_count,
        ) {
            return Err(ServiceError::InvalidState(
                "lobby does not meet the start condition".into(),
            ));
        }
        let settings = room_service::get_game_settings(&self.ctx, &self.room_id).await?;
        let questions = question_bank::load_questions(&self.ctx, &settings.question_bank_id).await?;
        LeagueKookGame::initialize(settings, members, questions, self.ctx.rng())
    }

    /// Abandon the running or finished game and reopen the lobby.
    pub async fn leave_game(&self) -> Result<(), ServiceError> {
        let mut coordination = self.coordination.lock().await;
        game_state_service::transition(
            &self.ctx,
            &self.room_id,
            &mut coordination.machine,
            GameEvent::ReturnToLobby,
        )
        .await?;
        coordination.game = None;
        self.comms_slot.cancel();
        self.inbox.reset();
        update_session(self.ctx.session(), |session| {
            session.game_ended = false;
            session.winning_team = None;
        });
        Ok(())
    }

    /// State the admin's machine is in.
    pub async fn game_state(&self) -> GameState {
        self.coordination.lock().await.machine.state()
    }

    /// Remaining Baron health, `None` without a game.
    pub async fn baron_health(&self) -> Option<u32> {
        let coordination = self.coordination.lock().await;
        let active = coordination.game.as_ref()?;
        active.game.baron_player().map(|baron| baron.health())
    }

    /// Every Baron code issued during the current game.
    pub async fn code_history(&self) -> Vec<BaronCodePackage> {
        let coordination = self.coordination.lock().await;
        coordination
            .game
            .as_ref()
            .map(|active| active.game.ledger().history().to_vec())
            .unwrap_or_default()
    }

    /// Team that landed the last hit, once there is one.
    pub async fn winning_team(&self) -> Option<Team> {
        let coordination = self.coordination.lock().await;
        coordination.game.as_ref()?.game.winning_team()
    }

    /// Team codes of the current game.
    pub async fn team_codes(&self) -> Option<IndexMap<Team, String>> {
        let coordination = self.coordination.lock().await;
        let active = coordination.game.as_ref()?;
        Some(active.game.settings().team_codes.clone())
    }

    async fn send(
        &self,
        active: &ActiveGame,
        uid: &str,
        message: CommMessage,
    ) -> Result<(), ServiceError> {
        let comm = GameComm::new(self.ids.next_id(self.ctx.now_ms()), message);
        match &active.baron_link {
            Some(link) if uid == self.uid => link.deliver(comm).await,
            _ => {
                StoreTransport::to_participant(self.ctx.client().clone(), &self.paths, uid)
                    .deliver(comm)
                    .await
            }
        }
    }

    /// Handle one comm. `Ok(false)` leaves it unacknowledged.
    async fn dispatch(&self, comm: GameComm) -> Result<bool, ServiceError> {
        let sender = comm_sender(&comm.id).unwrap_or_default().to_owned();
        let mut coordination = self.coordination.lock().await;
        let Coordination { machine, game } = &mut *coordination;
        let Some(active) = game.as_mut() else {
            debug!(room_id = %self.room_id, comm_id = %comm.id, "no game running; comm left alone");
            return Ok(false);
        };

        match comm.message {
            CommMessage::InitializationDone(done) => {
                check_sender(&sender, &done.fire_user_uid)?;
                let Some(flag) = active.initialized.get_mut(&done.fire_user_uid) else {
                    return Err(ServiceError::Protocol(format!(
                        "{} is not part of this game",
                        done.fire_user_uid
                    )));
                };
                *flag = true;
                let pending = active.initialized.values().filter(|done| !**done).count();
                debug!(room_id = %self.room_id, uid = %done.fire_user_uid, pending, "participant initialized");
                if pending == 0 && machine.state() == GameState::GameInit {
                    game_state_service::transition(
                        &self.ctx,
                        &self.room_id,
                        machine,
                        GameEvent::StartGame,
                    )
                    .await?;
                }
            }
            CommMessage::VerifyMcqAnswer(verify) => {
                check_sender(&sender, &verify.fire_user_uid)?;
                require_in_progress(machine)?;
                let code = active.game.verify_answer(
                    &verify.fire_user_uid,
                    verify.answer,
                    self.ctx.now_ms(),
                )?;
                let report = ReportMcqAnswerVerification {
                    is_correct: code.is_some(),
                    baron_code: code,
                };
                self.send(
                    active,
                    &verify.fire_user_uid,
                    CommMessage::ReportMcqAnswerVerification(report),
                )
                .await?;
            }
            CommMessage::RequestMcqQuestion(request) => {
                check_sender(&sender, &request.fire_user_uid)?;
                require_in_progress(machine)?;
                let (team, question) = active.game.next_question_for(&request.fire_user_uid)?;
                debug!(room_id = %self.room_id, uid = %request.fire_user_uid, %team, question = %question.id, "question reassigned");
                self.send(
                    active,
                    &request.fire_user_uid,
                    CommMessage::AssignMcqQuestion(AssignMcqQuestion { question, team }),
                )
                .await?;
            }
            CommMessage::VerifyBaronCode(verify) => {
                let baron_uid = active
                    .game
                    .baron_player()
                    .map(|baron| baron.member.uid.clone())
                    .ok_or_else(|| ServiceError::InvalidState("game has no Baron".into()))?;
                check_sender(&sender, &baron_uid)?;
                if !machine.state().is_game_in_progress() {
                    // The Baron waits on a verdict, so refuse with a report.
                    let health = active
                        .game
                        .baron_player()
                        .map(|baron| baron.health())
                        .unwrap_or_default();
                    warn!(room_id = %self.room_id, state = ?machine.state(), "baron code outside play");
                    let report = ReportBaronCode {
                        is_valid: false,
                        damage_amount: 0,
                        health_after_damage: health,
                        team: None,
                        is_last_hit: false,
                    };
                    self.send(active, &baron_uid, CommMessage::ReportBaronCode(report))
                        .await?;
                    return Ok(true);
                }
                let hit = active
                    .game
                    .verify_baron_code(&verify.baron_code, self.ctx.now_ms());
                let report = ReportBaronCode {
                    is_valid: hit.is_valid,
                    damage_amount: hit.damage_amount,
                    health_after_damage: hit.health_after_damage,
                    team: hit.team,
                    is_last_hit: hit.is_last_hit,
                };
                self.send(active, &baron_uid, CommMessage::ReportBaronCode(report))
                    .await?;

                if let (true, Some(winning_team)) = (hit.is_last_hit, hit.team) {
                    self.finish_game(active, machine, winning_team).await?;
                }
            }
            other => {
                warn!(room_id = %self.room_id, comm_id = %comm.id, comm = %other, "unexpected comm for admin");
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn finish_game(
        &self,
        active: &ActiveGame,
        machine: &mut GameStateMachine,
        winning_team: Team,
    ) -> Result<(), ServiceError> {
        let mcqs: Vec<String> = active
            .game
            .mcq_players()
            .map(|mcq| mcq.member.uid.clone())
            .collect();
        for uid in &mcqs {
            let notify = CommMessage::NotifyMcqEndGame(NotifyMcqEndGame { winning_team });
            if let Err(err) = self.send(active, uid, notify).await {
                warn!(room_id = %self.room_id, uid = %uid, error = %err, "failed to notify end of game");
            }
        }
        update_session(self.ctx.session(), |session| {
            session.winning_team = Some(winning_team);
            session.game_ended = true;
        });
        game_state_service::transition(&self.ctx, &self.room_id, machine, GameEvent::EndGame)
            .await?;
        info!(room_id = %self.room_id, %winning_team, "game won");
        Ok(())
    }
}

impl CommHandler for AdminCoordinator {
    fn handle_comm(&self, comm: GameComm, origin: CommOrigin) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let comm_id = comm.id.clone();
            let comm_type = comm.message.comm_type();
            let handled = match self.dispatch(comm).await {
                Ok(handled) => handled,
                Err(err) => {
                    warn!(room_id = %self.room_id, comm_id = %comm_id, comm_type, error = %err, "comm rejected");
                    true
                }
            };
            if handled && origin == CommOrigin::Store {
                let inbox = self.paths.admin_inbox();
                if let Err(err) = comms::mark_processed(self.ctx.client(), &inbox, &comm_id).await
                {
                    warn!(room_id = %self.room_id, comm_id = %comm_id, error = %err, "failed to acknowledge comm");
                }
            }
        })
    }
}

fn initialization_comms(game: &LeagueKookGame) -> Vec<(String, CommMessage)> {
    let settings = game.settings();
    let mut comms: Vec<(String, CommMessage)> = game
        .mcq_players()
        .filter_map(|mcq| {
            let uid = mcq.member.uid.clone();
            let (team, question) = match game.current_assignment(&uid) {
                Ok(assignment) => assignment,
                Err(err) => {
                    warn!(uid = %uid, error = %err, "mcq left without an assignment");
                    return None;
                }
            };
            let message = CommMessage::InitializeMcqQuestionAndCodes(InitializeMcqQuestionAndCodes {
                question,
                team,
                team_codes: settings.team_codes.clone(),
                answer_duration: settings.question_answer_window_ms,
                lockout_duration: settings.question_wrong_lockout_ms,
            });
            Some((uid, message))
        })
        .collect();
    if let Some(baron) = game.baron_player() {
        comms.push((
            baron.member.uid.clone(),
            CommMessage::InitializeBaron(InitializeBaron {
                health: baron.max_health(),
                lockout_duration: settings.baron_code_wrong_lockout_ms,
            }),
        ));
    }
    comms
}

fn check_sender(sender: &str, claimed: &str) -> Result<(), ServiceError> {
    if sender == claimed {
        Ok(())
    } else {
        Err(ServiceError::Protocol(format!(
            "comm from {sender} claims to be from {claimed}"
        )))
    }
}

fn require_in_progress(machine: &GameStateMachine) -> Result<(), ServiceError> {
    let state = machine.state();
    if state.is_game_in_progress() {
        Ok(())
    } else {
        Err(ServiceError::InvalidState(format!(
            "game is not in progress ({state:?})"
        )))
    }
}

