use rand::seq::IndexedRandom;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::{
    dao::{
        client::decode_snapshot,
        models::{GameRole, LobbyListEntryEntity},
        path::{RoomPaths, StorePath},
        room_store::Snapshot,
    },
    error::ServiceError,
    services::game_state_service,
    state::{SharedContext, game::LobbyMember, listeners::ListenerSlot, session::update_session},
};

fn random_image_code(ctx: &SharedContext, role: GameRole) -> String {
    role.image_codes()
        .choose(&mut ctx.rng())
        .map(|code| (*code).to_owned())
        .unwrap_or_default()
}

/// Seat `uid` in the lobby. The admin's own entry starts ready with the admin
/// role; everyone else starts as a not-ready MCQ.
pub async fn add_to_lobby_list(
    ctx: &SharedContext,
    room_id: &str,
    uid: &str,
    is_admin: bool,
) -> Result<(), ServiceError> {
    let role = if is_admin {
        GameRole::Admin
    } else {
        GameRole::Mcq
    };
    let entry = LobbyListEntryEntity {
        is_ready: is_admin,
        role,
        role_img_code: random_image_code(ctx, role),
    };
    ctx.client()
        .set(&RoomPaths::new(room_id).lobby_entry(uid), &entry)
        .await?;
    info!(room_id, uid, %role, "added to lobby");
    Ok(())
}

/// Lobby entries only change while the lobby is open, and only existing ones.
async fn require_open_seat(
    ctx: &SharedContext,
    room_id: &str,
    uid: &str,
) -> Result<(), ServiceError> {
    let state = game_state_service::get_game_state(ctx, room_id).await?;
    if !state.is_lobby_open() {
        return Err(ServiceError::InvalidState(format!(
            "lobby entries are fixed once the game left the lobby ({state:?})"
        )));
    }
    let entry: Option<Value> = ctx
        .client()
        .get_optional(&RoomPaths::new(room_id).lobby_entry(uid))
        .await?;
    if entry.is_none() {
        return Err(ServiceError::NotFound(format!("lobby entry {uid}")));
    }
    Ok(())
}

/// Toggle the caller's readiness.
pub async fn update_participant_ready(
    ctx: &SharedContext,
    room_id: &str,
    is_ready: bool,
) -> Result<(), ServiceError> {
    let uid = ctx.current_id()?;
    require_open_seat(ctx, room_id, &uid).await?;
    let mut fields = Map::new();
    fields.insert("isReady".into(), Value::Bool(is_ready));
    ctx.client()
        .update(&RoomPaths::new(room_id).lobby_entry(&uid), fields)
        .await?;
    update_session(ctx.session(), |session| session.is_ready = is_ready);
    debug!(room_id, uid = %uid, is_ready, "readiness updated");
    Ok(())
}

/// Hand `uid` a new role while the room sits in the lobby. Admin only.
///
/// `role` is the wire name; anything outside the roles selectable for that
/// entry is refused.
pub async fn update_participant_role(
    ctx: &SharedContext,
    room_id: &str,
    uid: &str,
    role: &str,
) -> Result<GameRole, ServiceError> {
    let role: GameRole = role.parse()?;
    let admin_uid = ctx.current_id()?;
    let is_admin_entry = uid == admin_uid;
    if !GameRole::selectable_for(is_admin_entry).contains(&role) {
        return Err(ServiceError::InvalidInput(format!(
            "role {role} cannot be given to {uid}"
        )));
    }

    require_open_seat(ctx, room_id, uid).await?;

    let mut fields = Map::new();
    fields.insert("role".into(), json!(role));
    fields.insert("roleImgCode".into(), json!(random_image_code(ctx, role)));
    ctx.client()
        .update(&RoomPaths::new(room_id).lobby_entry(uid), fields)
        .await?;

    if is_admin_entry {
        update_session(ctx.session(), |session| {
            session.is_baron = role == GameRole::Baron
        });
    }
    info!(room_id, uid, %role, "role updated");
    Ok(role)
}

/// Decode a lobby-list delivery. Malformed entries are logged and skipped.
pub fn decode_lobby(path: &StorePath, snapshot: Snapshot) -> Vec<LobbyMember> {
    let entries = match decode_snapshot::<Map<String, Value>>(path, snapshot) {
        Ok(entries) => entries.unwrap_or_default(),
        Err(err) => {
            warn!(path = %path, error = %err, "unreadable lobby list");
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|(uid, value)| {
            match serde_json::from_value::<LobbyListEntryEntity>(value) {
                Ok(entry) => Some(LobbyMember::from_entity(uid, entry)),
                Err(err) => {
                    warn!(path = %path, uid = %uid, error = %err, "skipping malformed lobby entry");
                    None
                }
            }
        })
        .collect()
}

/// Current lobby members.
pub async fn get_lobby_members(
    ctx: &SharedContext,
    room_id: &str,
) -> Result<Vec<LobbyMember>, ServiceError> {
    let path = RoomPaths::new(room_id).lobby_list();
    let snapshot = match ctx.client().get_value(&path).await {
        Ok(value) => Some(value),
        Err(err) if err.is_no_data() => None,
        Err(err) => return Err(err.into()),
    };
    Ok(decode_lobby(&path, snapshot))
}

/// Deliver every lobby-list change to `on_change` until the slot is cancelled.
pub async fn attach_lobby_list_listener<F>(
    ctx: &SharedContext,
    room_id: &str,
    slot: &ListenerSlot,
    mut on_change: F,
) -> Result<(), ServiceError>
where
    F: FnMut(Vec<LobbyMember>) + Send + 'static,
{
    let path = RoomPaths::new(room_id).lobby_list();
    let mut subscription = ctx.client().subscribe(&path).await?;
    slot.install(tokio::spawn(async move {
        while let Some(snapshot) = subscription.latest().await {
            on_change(decode_lobby(&path, snapshot));
        }
    }));
    Ok(())
}

/// Everyone ready, exactly one Baron and enough MCQ devices.
pub fn verify_game_start_condition(members: &[LobbyMember], min_mcq_role_count: usize) -> bool {
    let all_ready = members.iter().all(|member| member.is_ready);
    let barons = members
        .iter()
        .filter(|member| member.role == GameRole::Baron)
        .count();
    let mcqs = members
        .iter()
        .filter(|member| member.role == GameRole::Mcq)
        .count();
    all_ready && barons == 1 && mcqs >= min_mcq_role_count
}
