use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::{
    dao::{
        client::{decode, decode_snapshot},
        models::{WaitListEntryEntity, WaitListState},
        path::RoomPaths,
        room_store::Snapshot,
    },
    dto::room::JoinOutcome,
    error::ServiceError,
    services::{lobby_service, room_service},
    state::{
        SharedContext,
        listeners::ListenerSlot,
        session::{SessionState, update_session},
    },
};

/// Ask to be let into `room_id`.
///
/// Admins and members already in the lobby short-circuit without writing. A
/// pending request is not written twice. The passcode is checked here, on the
/// joining device; the admin only re-checks it when configured to.
pub async fn join_wait_list(
    ctx: &SharedContext,
    room_id: &str,
    passcode: &str,
) -> Result<JoinOutcome, ServiceError> {
    let uid = ctx.current_id()?;

    if room_service::is_admin_of_room(ctx, room_id).await {
        update_session(ctx.session(), |session| {
            session.room_id = Some(room_id.to_owned());
            session.is_admin = true;
        });
        return Ok(JoinOutcome::Admin);
    }
    if let Some(entry) = room_service::get_participant_of_room(ctx, room_id).await {
        update_session(ctx.session(), |session| {
            session.room_id = Some(room_id.to_owned());
            session.is_ready = entry.is_ready;
        });
        return Ok(JoinOutcome::Participant {
            is_ready: entry.is_ready,
        });
    }

    let paths = RoomPaths::new(room_id);
    let pending: Option<WaitListEntryEntity> = ctx
        .client()
        .get_optional(&paths.wait_list_entry(&uid))
        .await?;
    if pending.is_some_and(|entry| entry.state == WaitListState::Waiting) {
        debug!(room_id, uid = %uid, "join request already pending");
        return Ok(JoinOutcome::AlreadyWaiting);
    }

    let room = room_service::get_room_state(ctx, room_id).await?;
    if room.is_room_locked {
        return Err(ServiceError::InvalidState(format!("room {room_id} is locked")));
    }
    if room.passcode != passcode {
        return Err(ServiceError::Unauthorized(format!(
            "wrong passcode for room {room_id}"
        )));
    }

    let entry = WaitListEntryEntity {
        passcode: passcode.to_owned(),
        state: WaitListState::Waiting,
    };
    ctx.client().set(&paths.wait_list_entry(&uid), &entry).await?;
    update_session(ctx.session(), |session| {
        *session = SessionState::in_room(room_id, passcode);
    });
    info!(room_id, uid = %uid, "joined wait list");
    Ok(JoinOutcome::Waiting)
}

/// Admit every waiting entry of a wait-list delivery. Admin only.
///
/// Nothing is admitted while the room is locked or the game has left the
/// lobby; those entries stay waiting for a later pass. Per-entry failures are
/// logged and leave the entry waiting. Returns how many entrants were admitted.
pub async fn admit_waiting(ctx: &SharedContext, room_id: &str, snapshot: Snapshot) -> usize {
    let paths = RoomPaths::new(room_id);
    let entries = match decode_snapshot::<Map<String, Value>>(&paths.wait_list(), snapshot) {
        Ok(Some(entries)) => entries,
        Ok(None) => return 0,
        Err(err) => {
            warn!(room_id, error = %err, "unreadable wait list");
            return 0;
        }
    };

    let room = match room_service::get_room_state(ctx, room_id).await {
        Ok(room) => room,
        Err(err) => {
            warn!(room_id, error = %err, "cannot read room before admission");
            return 0;
        }
    };
    if room.is_room_locked || !room.game_state.is_lobby_open() {
        debug!(room_id, locked = room.is_room_locked, state = ?room.game_state, "admission paused");
        return 0;
    }
    let verify_passcode = ctx.config().admission.verify_passcode;

    let mut admitted = 0;
    for (uid, value) in entries {
        let entry: WaitListEntryEntity = match decode(&paths.wait_list_entry(&uid), value) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(room_id, uid = %uid, error = %err, "skipping malformed wait-list entry");
                continue;
            }
        };
        if entry.state != WaitListState::Waiting {
            continue;
        }
        if verify_passcode && entry.passcode != room.passcode {
            warn!(room_id, uid = %uid, "wrong passcode; entrant left waiting");
            continue;
        }

        if let Err(err) = lobby_service::add_to_lobby_list(ctx, room_id, &uid, false).await {
            warn!(room_id, uid = %uid, error = %err, "failed to add entrant to lobby");
            continue;
        }
        let mut fields = Map::new();
        fields.insert("state".into(), json!(WaitListState::Added));
        match ctx
            .client()
            .update(&paths.wait_list_entry(&uid), fields)
            .await
        {
            Ok(()) => {
                admitted += 1;
                info!(room_id, uid = %uid, "entrant admitted");
            }
            Err(err) => warn!(room_id, uid = %uid, error = %err, "failed to flag entrant as added"),
        }
    }
    admitted
}

/// Re-read the wait-list and admit whoever is waiting. Used after unlocking,
/// which does not touch the wait-list itself.
pub async fn admit_pending(ctx: &SharedContext, room_id: &str) -> usize {
    let path = RoomPaths::new(room_id).wait_list();
    match ctx.client().get_value(&path).await {
        Ok(value) => admit_waiting(ctx, room_id, Some(value)).await,
        Err(err) if err.is_no_data() => 0,
        Err(err) => {
            warn!(room_id, error = %err, "failed to read wait list");
            0
        }
    }
}

/// Admit entrants on every wait-list change until the slot is cancelled.
pub async fn attach_admin_wait_list_listener(
    ctx: &SharedContext,
    room_id: &str,
    slot: &ListenerSlot,
) -> Result<(), ServiceError> {
    let mut subscription = ctx
        .client()
        .subscribe(&RoomPaths::new(room_id).wait_list())
        .await?;
    info!(room_id, "admin wait-list listener attached");
    let ctx = ctx.clone();
    let room_id = room_id.to_owned();
    slot.install(tokio::spawn(async move {
        while let Some(snapshot) = subscription.latest().await {
            admit_waiting(&ctx, &room_id, snapshot).await;
        }
    }));
    Ok(())
}

/// Wait until the admin admits the caller.
///
/// Returns `false` if the request disappears first (withdrawn or dropped).
pub async fn wait_for_admission(ctx: &SharedContext, room_id: &str) -> Result<bool, ServiceError> {
    let uid = ctx.current_id()?;
    let path = RoomPaths::new(room_id).wait_list_entry(&uid);
    let mut subscription = ctx.client().subscribe(&path).await?;

    while let Some(snapshot) = subscription.next().await {
        match decode_snapshot::<WaitListEntryEntity>(&path, snapshot) {
            Ok(Some(entry)) if entry.state == WaitListState::Added => {
                subscription.cancel();
                info!(room_id, uid = %uid, "admitted to lobby");
                return Ok(true);
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!(room_id, uid = %uid, "wait-list entry gone before admission");
                return Ok(false);
            }
            Err(err) => warn!(room_id, uid = %uid, error = %err, "unreadable wait-list entry"),
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        clock::ManualClock,
        config::AppConfig,
        dao::{models::GameRole, room_store::memory::MemoryRoomStore},
        identity::AnonymousIdentity,
        state::AppContext,
    };

    fn device(store: &MemoryRoomStore, uid: &str, config: AppConfig) -> SharedContext {
        AppContext::seeded(
            Arc::new(store.clone()),
            Arc::new(AnonymousIdentity::with_id(uid)),
            Arc::new(ManualClock::new(1_000)),
            config,
            5,
        )
    }

    async fn entry_state(ctx: &SharedContext, room_id: &str, uid: &str) -> Option<WaitListState> {
        ctx.client()
            .get_optional::<WaitListEntryEntity>(&RoomPaths::new(room_id).wait_list_entry(uid))
            .await
            .unwrap()
            .map(|entry| entry.state)
    }

    #[tokio::test]
    async fn second_join_before_admission_writes_nothing() {
        let store = MemoryRoomStore::new();
        let admin = device(&store, "boss", AppConfig::default());
        let player = device(&store, "p1", AppConfig::default());
        let room = room_service::create_room(&admin).await.unwrap();

        assert_eq!(
            join_wait_list(&player, &room.room_id, &room.room_passcode)
                .await
                .unwrap(),
            JoinOutcome::Waiting
        );
        assert_eq!(
            join_wait_list(&player, &room.room_id, &room.room_passcode)
                .await
                .unwrap(),
            JoinOutcome::AlreadyWaiting
        );
        assert_eq!(
            entry_state(&admin, &room.room_id, "p1").await,
            Some(WaitListState::Waiting)
        );
        assert_eq!(
            join_wait_list(&admin, &room.room_id, &room.room_passcode)
                .await
                .unwrap(),
            JoinOutcome::Admin
        );
    }

    #[tokio::test]
    async fn joining_checks_lock_and_passcode() {
        let store = MemoryRoomStore::new();
        let admin = device(&store, "boss", AppConfig::default());
        let player = device(&store, "p1", AppConfig::default());
        let room = room_service::create_room(&admin).await.unwrap();

        assert!(matches!(
            join_wait_list(&player, &room.room_id, "nope").await,
            Err(ServiceError::Unauthorized(_))
        ));
        room_service::set_room_lock(&admin, &room.room_id, true)
            .await
            .unwrap();
        assert!(matches!(
            join_wait_list(&player, &room.room_id, &room.room_passcode).await,
            Err(ServiceError::InvalidState(_))
        ));
        assert_eq!(entry_state(&admin, &room.room_id, "p1").await, None);
    }

    #[tokio::test]
    async fn admission_is_exactly_once_and_acknowledged() {
        let store = MemoryRoomStore::new();
        let admin = device(&store, "boss", AppConfig::default());
        let player = device(&store, "p1", AppConfig::default());
        let room = room_service::create_room(&admin).await.unwrap();
        let slot = ListenerSlot::new("wait-list");
        attach_admin_wait_list_listener(&admin, &room.room_id, &slot)
            .await
            .unwrap();

        join_wait_list(&player, &room.room_id, &room.room_passcode)
            .await
            .unwrap();
        let admitted = tokio::time::timeout(
            Duration::from_secs(5),
            wait_for_admission(&player, &room.room_id),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(admitted);

        let members = lobby_service::get_lobby_members(&player, &room.room_id)
            .await
            .unwrap();
        let entry = members.iter().find(|m| m.uid == "p1").unwrap();
        assert_eq!(entry.role, GameRole::Mcq);
        assert!(!entry.is_ready);

        // Re-running admission over the same data admits nobody twice.
        assert_eq!(admit_pending(&admin, &room.room_id).await, 0);
        assert_eq!(
            join_wait_list(&player, &room.room_id, &room.room_passcode)
                .await
                .unwrap(),
            JoinOutcome::Participant { is_ready: false }
        );
        slot.cancel();
    }

    #[tokio::test]
    async fn locked_room_keeps_entrants_waiting_until_unlocked() {
        let store = MemoryRoomStore::new();
        let admin = device(&store, "boss", AppConfig::default());
        let player = device(&store, "p1", AppConfig::default());
        let room = room_service::create_room(&admin).await.unwrap();

        join_wait_list(&player, &room.room_id, &room.room_passcode)
            .await
            .unwrap();
        room_service::set_room_lock(&admin, &room.room_id, true)
            .await
            .unwrap();
        assert_eq!(admit_pending(&admin, &room.room_id).await, 0);
        assert_eq!(
            entry_state(&admin, &room.room_id, "p1").await,
            Some(WaitListState::Waiting)
        );

        room_service::set_room_lock(&admin, &room.room_id, false)
            .await
            .unwrap();
        assert_eq!(admit_pending(&admin, &room.room_id).await, 1);
        assert_eq!(
            entry_state(&admin, &room.room_id, "p1").await,
            Some(WaitListState::Added)
        );
    }

    #[tokio::test]
    async fn admin_side_passcode_check_is_opt_in() {
        let store = MemoryRoomStore::new();
        let mut strict = AppConfig::default();
        strict.admission.verify_passcode = true;
        let admin = device(&store, "boss", strict);
        let room = room_service::create_room(&admin).await.unwrap();

        // A hand-written entry bypassing the joining device's own check.
        let rogue = device(&store, "p2", AppConfig::default());
        rogue
            .client()
            .set(
                &RoomPaths::new(&room.room_id).wait_list_entry("p2"),
                &WaitListEntryEntity {
                    passcode: "guess1".into(),
                    state: WaitListState::Waiting,
                },
            )
            .await
            .unwrap();

        assert_eq!(admit_pending(&admin, &room.room_id).await, 0);
        assert_eq!(
            entry_state(&admin, &room.room_id, "p2").await,
            Some(WaitListState::Waiting)
        );
    }
}
