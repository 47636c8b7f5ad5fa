use indexmap::IndexMap;
use serde_json::Map;
use tracing::{debug, info, warn};

use crate::{
    codes::generate_code,
    dao::{
        models::{AdminEntity, GameSettingsEntity, LobbyListEntryEntity},
        path::RoomPaths,
    },
    dto::room::{CreateRoomResponse, RoomActivity, RoomStateSummary},
    error::ServiceError,
    services::lobby_service,
    state::{
        SharedContext,
        game::{GameSettings, Team},
        session::{SessionState, update_session},
        state_machine::GameState,
    },
};

/// Create a room owned by the caller and seat the caller in its lobby.
///
/// Room codes are not checked for collisions; a clash with a room owned by
/// someone else surfaces as a permission error on the first write.
pub async fn create_room(ctx: &SharedContext) -> Result<CreateRoomResponse, ServiceError> {
    let uid = ctx.current_id()?;
    let config = ctx.config();

    let (room_id, room_passcode, team_codes) = {
        let mut rng = ctx.rng();
        let room_id = generate_code(&mut rng, config.room.code_length);
        let passcode = generate_code(&mut rng, config.room.passcode_length);
        let team_codes: IndexMap<Team, String> = Team::ALL
            .into_iter()
            .map(|team| (team, generate_code(&mut rng, config.game.team_code_length)))
            .collect();
        (room_id, passcode, team_codes)
    };
    let settings: GameSettingsEntity = GameSettings::from_config(&config.game, team_codes).into();

    let client = ctx.client();
    let paths = RoomPaths::new(&room_id);
    // Ownership is recorded first; every later write is authorized against it.
    client.set(&paths.admin(), &AdminEntity { id: uid.clone() }).await?;
    client.set(&paths.active_time(), &ctx.now_ms()).await?;
    client.set(&paths.locked(), &false).await?;
    client.set(&paths.game_state(), &GameState::Lobby).await?;
    client.set(&paths.block_list(), &Map::new()).await?;
    client.set(&paths.passcode(), &room_passcode).await?;
    client.set(&paths.settings(), &settings).await?;

    lobby_service::add_to_lobby_list(ctx, &room_id, &uid, true).await?;

    update_session(ctx.session(), |session| {
        *session = SessionState {
            is_admin: true,
            is_ready: true,
            ..SessionState::in_room(&room_id, &room_passcode)
        };
    });
    info!(room_id = %room_id, uid = %uid, "room created");

    Ok(CreateRoomResponse {
        room_id,
        room_passcode,
        is_admin: true,
        game_state: GameState::Lobby,
        is_room_locked: false,
    })
}

/// Probe the admin-only path: only the owner can read it.
pub async fn is_admin_of_room(ctx: &SharedContext, room_id: &str) -> bool {
    match ctx.client().get_value(&RoomPaths::new(room_id).admin()).await {
        Ok(_) => true,
        Err(err) => {
            debug!(room_id, error = %err, "not admin of room");
            false
        }
    }
}

/// Caller's lobby entry, if it has one.
pub async fn get_participant_of_room(
    ctx: &SharedContext,
    room_id: &str,
) -> Option<LobbyListEntryEntity> {
    let uid = ctx.current_id().ok()?;
    let path = RoomPaths::new(room_id).lobby_entry(&uid);
    match ctx.client().get_optional(&path).await {
        Ok(entry) => entry,
        Err(err) => {
            warn!(room_id, uid = %uid, error = %err, "failed to read lobby entry");
            None
        }
    }
}

/// Whether a room touched at `active_time` is still alive at `now_ms`.
/// Closed rooms carry `-1` and are never active.
pub fn is_room_active(active_time: i64, now_ms: i64, active_duration_ms: i64) -> bool {
    active_time > 0 && now_ms - active_time < active_duration_ms
}

/// Classify the room for the caller: expired, owned, joined or open to join.
pub async fn get_is_room_active(ctx: &SharedContext, room_id: &str) -> RoomActivity {
    let path = RoomPaths::new(room_id).active_time();
    let active_time = match ctx.client().get::<i64>(&path).await {
        Ok(active_time) => active_time,
        Err(err) => {
            debug!(room_id, error = %err, "room activity unavailable");
            return RoomActivity::Inactive;
        }
    };
    if !is_room_active(
        active_time,
        ctx.now_ms(),
        ctx.config().room.active_duration_ms,
    ) {
        return RoomActivity::Inactive;
    }

    if is_admin_of_room(ctx, room_id).await {
        return RoomActivity::Admin;
    }
    match get_participant_of_room(ctx, room_id).await {
        Some(entry) => RoomActivity::Participant {
            is_ready: entry.is_ready,
        },
        None => RoomActivity::Open,
    }
}

/// Passcode, lock flag and game state of an existing room.
pub async fn get_room_state(
    ctx: &SharedContext,
    room_id: &str,
) -> Result<RoomStateSummary, ServiceError> {
    let client = ctx.client();
    let paths = RoomPaths::new(room_id);
    Ok(RoomStateSummary {
        passcode: client.get(&paths.passcode()).await?,
        is_room_locked: client.get(&paths.locked()).await?,
        game_state: client.get(&paths.game_state()).await?,
    })
}

/// Lock or unlock the wait-list. Admin only.
pub async fn set_room_lock(
    ctx: &SharedContext,
    room_id: &str,
    locked: bool,
) -> Result<(), ServiceError> {
    ctx.client()
        .set(&RoomPaths::new(room_id).locked(), &locked)
        .await?;
    update_session(ctx.session(), |session| session.is_room_locked = locked);
    info!(room_id, locked, "room lock updated");
    Ok(())
}

/// Mark the room closed for good. Admin only.
pub async fn close_room(ctx: &SharedContext, room_id: &str) -> Result<(), ServiceError> {
    ctx.client()
        .set(&RoomPaths::new(room_id).active_time(), &-1_i64)
        .await?;
    info!(room_id, "room closed");
    Ok(())
}

/// Refresh the room's activity timestamp. Admin only.
pub async fn heartbeat(ctx: &SharedContext, room_id: &str) -> Result<(), ServiceError> {
    ctx.client()
        .set(&RoomPaths::new(room_id).active_time(), &ctx.now_ms())
        .await?;
    Ok(())
}

/// Drop the caller's lobby and wait-list entries. Each removal is attempted
/// even when the other fails.
pub async fn leave_room(ctx: &SharedContext, room_id: &str) -> Result<(), ServiceError> {
    let uid = ctx.current_id()?;
    let paths = RoomPaths::new(room_id);
    let client = ctx.client();

    match client.remove(&paths.lobby_entry(&uid)).await {
        Ok(()) => debug!(room_id, uid = %uid, "left lobby list"),
        Err(err) => warn!(room_id, uid = %uid, error = %err, "failed to leave lobby list"),
    }
    match client.remove(&paths.wait_list_entry(&uid)).await {
        Ok(()) => debug!(room_id, uid = %uid, "left wait list"),
        Err(err) => warn!(room_id, uid = %uid, error = %err, "failed to leave wait list"),
    }
    update_session(ctx.session(), |session| *session = SessionState::default());
    Ok(())
}

/// Settings written at room creation.
pub async fn get_game_settings(
    ctx: &SharedContext,
    room_id: &str,
) -> Result<GameSettings, ServiceError> {
    let entity: GameSettingsEntity = ctx
        .client()
        .get(&RoomPaths::new(room_id).settings())
        .await?;
    GameSettings::try_from(entity)
}
