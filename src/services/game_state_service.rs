use tracing::{info, warn};

use crate::{
    dao::{client::decode_snapshot, path::RoomPaths},
    error::ServiceError,
    state::{
        SharedContext,
        listeners::ListenerSlot,
        state_machine::{GameEvent, GameState, GameStateMachine},
    },
};

/// Stored game state; a room without one is still in the lobby.
pub async fn get_game_state(ctx: &SharedContext, room_id: &str) -> Result<GameState, ServiceError> {
    let state = ctx
        .client()
        .get_optional(&RoomPaths::new(room_id).game_state())
        .await?;
    Ok(state.unwrap_or_default())
}

/// Overwrite the stored game state. Admin only; prefer [`transition`].
pub async fn set_game_state(
    ctx: &SharedContext,
    room_id: &str,
    state: GameState,
) -> Result<(), ServiceError> {
    ctx.client()
        .set(&RoomPaths::new(room_id).game_state(), &state)
        .await?;
    Ok(())
}

/// Plan `event` on the admin's machine, publish the target state and commit.
/// A failed write aborts the plan so the machine keeps its current state.
pub async fn transition(
    ctx: &SharedContext,
    room_id: &str,
    machine: &mut GameStateMachine,
    event: GameEvent,
) -> Result<GameState, ServiceError> {
    let plan = machine.plan(event)?;
    if let Err(err) = set_game_state(ctx, room_id, plan.to).await {
        warn!(room_id, ?event, error = %err, "failed to publish game state");
        machine.abort(plan.id)?;
        return Err(err);
    }
    let state = machine.apply(plan.id)?;
    info!(room_id, from = ?plan.from, to = ?state, "game state changed");
    Ok(state)
}

/// Deliver every game state change to `on_change` until the slot is cancelled.
/// Unreadable deliveries are logged and skipped.
pub async fn attach_game_state_listener<F>(
    ctx: &SharedContext,
    room_id: &str,
    slot: &ListenerSlot,
    mut on_change: F,
) -> Result<(), ServiceError>
where
    F: FnMut(GameState) + Send + 'static,
{
    let path = RoomPaths::new(room_id).game_state();
    let mut subscription = ctx.client().subscribe(&path).await?;
    slot.install(tokio::spawn(async move {
        while let Some(snapshot) = subscription.next().await {
            match decode_snapshot::<GameState>(&path, snapshot) {
                Ok(Some(state)) => on_change(state),
                Ok(None) => {}
                Err(err) => warn!(path = %path, error = %err, "unreadable game state"),
            }
        }
    }));
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        clock::ManualClock, config::AppConfig, dao::room_store::memory::MemoryRoomStore,
        identity::AnonymousIdentity, services::room_service, state::AppContext,
    };

    fn device(store: &MemoryRoomStore, uid: &str) -> SharedContext {
        AppContext::seeded(
            Arc::new(store.clone()),
            Arc::new(AnonymousIdentity::with_id(uid)),
            Arc::new(ManualClock::new(1_000)),
            AppConfig::default(),
            3,
        )
    }

    #[tokio::test]
    async fn transitions_publish_and_commit() {
        let store = MemoryRoomStore::new();
        let admin = device(&store, "boss");
        let room_id = room_service::create_room(&admin).await.unwrap().room_id;
        let mut machine = GameStateMachine::new();

        let state = transition(&admin, &room_id, &mut machine, GameEvent::InitializeGame)
            .await
            .unwrap();
        assert_eq!(state, GameState::GameInit);
        assert_eq!(
            get_game_state(&admin, &room_id).await.unwrap(),
            GameState::GameInit
        );
        assert!(
            transition(&admin, &room_id, &mut machine, GameEvent::InitializeGame)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn rejected_write_leaves_machine_untouched() {
        let store = MemoryRoomStore::new();
        let admin = device(&store, "boss");
        let intruder = device(&store, "intruder");
        let room_id = room_service::create_room(&admin).await.unwrap().room_id;
        let mut machine = GameStateMachine::new();

        let err = transition(&intruder, &room_id, &mut machine, GameEvent::InitializeGame)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Storage(_)));
        assert_eq!(machine.state(), GameState::Lobby);
        assert_eq!(
            get_game_state(&intruder, &room_id).await.unwrap(),
            GameState::Lobby
        );
        // The aborted plan does not block the next one.
        transition(&admin, &room_id, &mut machine, GameEvent::InitializeGame)
            .await
            .unwrap();
    }
}
