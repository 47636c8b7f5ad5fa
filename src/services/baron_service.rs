use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    dao::path::{RoomPaths, StorePath},
    dto::comm::{
        CommIdGenerator, CommMessage, GameComm, InitializationDone, ReportBaronCode,
        VerifyBaronCode,
    },
    error::ServiceError,
    services::{
        comms::{
            self, CommHandler, CommInbox, CommOrigin, InProcessTransport, StoreTransport,
            Transport,
        },
        game_state_service, room_service,
    },
    state::{
        SharedContext,
        game::Team,
        listeners::ListenerSlot,
        session::update_session,
        state_machine::GameState,
    },
};

/// What the Baron device shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BaronView {
    pub game_state: GameState,
    /// `None` until the admin initialized this device.
    pub health: Option<u32>,
    pub max_health: Option<u32>,
    pub lockout_duration_ms: i64,
    /// Epoch milliseconds until which code entry is refused.
    pub lockout_until: Option<i64>,
    pub awaiting_verdict: bool,
    pub last_report: Option<ReportBaronCode>,
    pub winning_team: Option<Team>,
    pub game_ended: bool,
}

/// Baron device: receives codes typed by the teams and takes the damage the
/// admin reports back.
pub struct BaronParticipant {
    ctx: SharedContext,
    room_id: String,
    uid: String,
    ids: Arc<CommIdGenerator>,
    inbox: Arc<CommInbox>,
    inbox_path: StorePath,
    to_admin: Box<dyn Transport>,
    /// Shares the admin's device, identity and lobby entry.
    co_located: bool,
    view: Mutex<BaronView>,
    comms_slot: ListenerSlot,
    state_slot: ListenerSlot,
}

impl BaronParticipant {
    /// Baron on its own device, talking to the admin through the store.
    pub async fn join(ctx: &SharedContext, room_id: &str) -> Result<Arc<Self>, ServiceError> {
        let uid = ctx.current_id()?;
        let paths = RoomPaths::new(room_id);
        let to_admin = StoreTransport::to_admin(ctx.client().clone(), &paths);
        let baron = Arc::new(Self::build(
            ctx,
            room_id,
            Arc::new(CommIdGenerator::new(uid.clone())),
            paths.participant_inbox(&uid),
            Box::new(to_admin),
            false,
        )?);

        let subscription = ctx.client().subscribe(&baron.inbox_path).await?;
        baron.comms_slot.install(comms::spawn_comm_pump(
            Arc::downgrade(&baron),
            baron.inbox.clone(),
            baron.inbox_path.clone(),
            Some(subscription),
            None,
        ));
        baron.watch_game_state().await?;
        info!(room_id, uid = %baron.uid, "baron joined");
        Ok(baron)
    }

    /// Baron half of the admin's own device. Comms never touch the store; ids
    /// come from the admin's generator since both halves share one identity.
    pub async fn co_located(
        ctx: &SharedContext,
        room_id: &str,
        to_admin: InProcessTransport,
        from_admin: mpsc::UnboundedReceiver<GameComm>,
        ids: Arc<CommIdGenerator>,
    ) -> Result<Arc<Self>, ServiceError> {
        let uid = ctx.current_id()?;
        let inbox_path = RoomPaths::new(room_id).participant_inbox(&uid);
        let baron = Arc::new(Self::build(
            ctx,
            room_id,
            ids,
            inbox_path,
            Box::new(to_admin),
            true,
        )?);

        baron.comms_slot.install(comms::spawn_comm_pump(
            Arc::downgrade(&baron),
            baron.inbox.clone(),
            baron.inbox_path.clone(),
            None,
            Some(from_admin),
        ));
        baron.watch_game_state().await?;
        debug!(room_id, uid = %baron.uid, "co-located baron attached");
        Ok(baron)
    }

    fn build(
        ctx: &SharedContext,
        room_id: &str,
        ids: Arc<CommIdGenerator>,
        inbox_path: StorePath,
        to_admin: Box<dyn Transport>,
        co_located: bool,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            ctx: ctx.clone(),
            room_id: room_id.to_owned(),
            uid: ctx.current_id()?,
            ids,
            inbox: Arc::new(CommInbox::new()),
            inbox_path,
            to_admin,
            co_located,
            view: Mutex::new(BaronView::default()),
            comms_slot: ListenerSlot::new("baron-comms"),
            state_slot: ListenerSlot::new("baron-game-state"),
        })
    }

    async fn watch_game_state(self: &Arc<Self>) -> Result<(), ServiceError> {
        let weak = Arc::downgrade(self);
        game_state_service::attach_game_state_listener(
            &self.ctx,
            &self.room_id,
            &self.state_slot,
            move |state| {
                if let Some(baron) = weak.upgrade() {
                    baron.on_game_state(state);
                }
            },
        )
        .await
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
            GameState::Lobby if previous == GameState::Lobby => {}
            // A reopened lobby counts as a finished game too.
            GameState::End | GameState::Lobby => {
                view.game_ended = true;
                view.awaiting_verdict = false;
                if state == GameState::End {
                    update_session(self.ctx.session(), |session| session.game_ended = true);
                }
            }
        }
    }

    fn view(&self) -> MutexGuard<'_, BaronView> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current screen state.
    pub fn snapshot(&self) -> BaronView {
        self.view().clone()
    }

    /// Send a code typed on the Baron device to the admin for verification.
    ///
    /// Refused outside play, while locked out after an invalid code, once the
    /// Baron fell or while the previous code is still being verified.
    pub async fn submit_code(&self, baron_code: &str) -> Result<(), ServiceError> {
        let state = game_state_service::get_game_state(&self.ctx, &self.room_id).await?;
        if !state.is_game_in_progress() {
            return Err(ServiceError::InvalidState(format!(
                "codes are only accepted during play ({state:?})"
            )));
        }

        let now = self.ctx.now_ms();
        {
            let mut view = self.view();
            if view.lockout_until.is_some_and(|until| now < until) {
                return Err(ServiceError::InvalidState("code entry is locked out".into()));
            }
            match view.health {
                None => return Err(ServiceError::InvalidState("baron not initialized".into())),
                Some(0) => return Err(ServiceError::InvalidState("baron already fell".into())),
                Some(_) => {}
            }
            if view.awaiting_verdict {
                return Err(ServiceError::InvalidState(
                    "previous code still being verified".into(),
                ));
            }
            view.awaiting_verdict = true;
        }

        let comm = GameComm::new(
            self.ids.next_id(now),
            CommMessage::VerifyBaronCode(VerifyBaronCode {
                baron_code: baron_code.trim().to_owned(),
            }),
        );
        if let Err(err) = self.to_admin.deliver(comm).await {
            self.view().awaiting_verdict = false;
            return Err(err);
        }
        Ok(())
    }

    /// Stop listening and leave the room. A co-located Baron only detaches;
    /// the lobby entry belongs to the admin.
    pub async fn leave(&self) -> Result<(), ServiceError> {
        self.comms_slot.cancel();
        self.state_slot.cancel();
        if self.co_located {
            return Ok(());
        }
        room_service::leave_room(&self.ctx, &self.room_id).await
    }

    /// Handle one comm. `Ok(false)` leaves it unacknowledged.
    async fn dispatch(&self, comm: GameComm) -> Result<bool, ServiceError> {
        match comm.message {
            CommMessage::InitializeBaron(init) => {
                {
                    let mut view = self.view();
                    view.health = Some(init.health);
                    view.max_health = Some(init.health);
                    view.lockout_duration_ms = init.lockout_duration;
                    view.lockout_until = None;
                    view.awaiting_verdict = false;
                    view.last_report = None;
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
                info!(room_id = %self.room_id, health = init.health, "baron initialized");
            }
            CommMessage::ReportBaronCode(report) => {
                let mut view = self.view();
                view.awaiting_verdict = false;
                view.last_report = Some(report);
                if !report.is_valid {
                    let lockout = view.lockout_duration_ms;
                    view.lockout_until = Some(self.ctx.now_ms() + lockout);
                    debug!(room_id = %self.room_id, "invalid baron code");
                    return Ok(true);
                }
                view.health = Some(report.health_after_damage);
                debug!(room_id = %self.room_id, damage = report.damage_amount, health = report.health_after_damage, "baron hit");
                if report.is_last_hit {
                    view.winning_team = report.team;
                    view.game_ended = true;
                    drop(view);
                    update_session(self.ctx.session(), |session| {
                        session.winning_team = report.team;
                        session.game_ended = true;
                    });
                }
            }
            other => {
                warn!(room_id = %self.room_id, comm_id = %comm.id, comm = %other, "unexpected comm for baron");
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl CommHandler for BaronParticipant {
    fn handle_comm(&self, comm: GameComm, origin: CommOrigin) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let comm_id = comm.id.clone();
            let handled = match self.dispatch(comm).await {
                Ok(handled) => handled,
                Err(err) => {
                    warn!(room_id = %self.room_id, comm_id = %comm_id, error = %err, "baron failed to handle comm");
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
    use super::*;
    use crate::{
        clock::ManualClock,
        config::AppConfig,
        dao::room_store::memory::MemoryRoomStore,
        dto::comm::InitializeBaron,
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
            9,
        )
    }

    async fn joined_baron(store: &MemoryRoomStore) -> Arc<BaronParticipant> {
        let admin = device(store, "boss");
        let room_id = room_service::create_room(&admin).await.unwrap().room_id;
        lobby_service::add_to_lobby_list(&admin, &room_id, "baron", false)
            .await
            .unwrap();
        let baron = BaronParticipant::join(&device(store, "baron"), &room_id)
            .await
            .unwrap();
        baron.state_slot.cancel();
        baron
    }

    fn initialize() -> GameComm {
        GameComm::new(
            "5_boss".into(),
            CommMessage::InitializeBaron(InitializeBaron {
                health: 100,
                lockout_duration: 3_000,
            }),
        )
    }

    #[tokio::test]
    async fn codes_wait_for_play() {
        let baron = joined_baron(&MemoryRoomStore::new()).await;
        assert!(baron.dispatch(initialize()).await.unwrap());

        let err = baron.submit_code("abcde").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        let view = baron.snapshot();
        assert!(!view.awaiting_verdict);
        assert_eq!(view.health, Some(100));
    }

    #[tokio::test]
    async fn late_lobby_delivery_does_not_end_a_fresh_game() {
        let baron = joined_baron(&MemoryRoomStore::new()).await;
        assert!(baron.dispatch(initialize()).await.unwrap());
        baron.on_game_state(GameState::Lobby);
        assert!(!baron.snapshot().game_ended);

        baron.on_game_state(GameState::GameStarted);
        baron.on_game_state(GameState::Lobby);
        assert!(baron.snapshot().game_ended);
    }
}
