use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle states of a room's game, as stored under `gameState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum GameState {
    /// Members gather, ready up and get their roles.
    #[default]
    Lobby,
    /// Admin built the game and waits for every device to echo its initialization.
    GameInit,
    /// Play is under way.
    GameStarted,
    /// The Baron fell; the winning team is known.
    End,
}

impl GameState {
    /// Observers treat both init and play as a started game.
    pub fn has_game_started(self) -> bool {
        matches!(self, GameState::GameInit | GameState::GameStarted)
    }

    /// Only play accepts answers and codes.
    pub fn is_game_in_progress(self) -> bool {
        self == GameState::GameStarted
    }

    /// Lobby entries can still change.
    pub fn is_lobby_open(self) -> bool {
        self == GameState::Lobby
    }

    /// Observers treat both the end screen and the lobby as an ended game.
    pub fn has_game_ended(self) -> bool {
        matches!(self, GameState::End | GameState::Lobby)
    }
}

/// Events the admin applies to the game state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    /// Lobby closed, game being built and distributed.
    InitializeGame,
    /// Every participant acknowledged initialization.
    StartGame,
    /// Abandon whatever is running and reopen the lobby.
    ReturnToLobby,
    /// A winning hit was confirmed.
    EndGame,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The state the machine was in when the invalid event was received.
    pub from: GameState,
    /// The event that cannot be applied from this state.
    pub event: GameEvent,
}

/// Errors that can occur when planning a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The requested transition is not valid from the current state.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying or aborting a planned transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned transition.
pub type PlanId = Uuid;

/// A validated transition waiting for its store write to land.
#[derive(Debug, Clone, Copy)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// State before the transition.
    pub from: GameState,
    /// State after the transition.
    pub to: GameState,
    /// Event that triggered this transition.
    pub event: GameEvent,
}

/// Admin-side view of the room's game state.
///
/// The store is the source of truth for every other device, so a transition is
/// planned, written to the store, then applied (or aborted when the write
/// fails).
#[derive(Debug, Clone, Default)]
pub struct GameStateMachine {
    state: GameState,
    version: usize,
    pending: Option<Plan>,
}

impl GameStateMachine {
    /// Create a new state machine in the lobby.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a state read back from the store.
    pub fn resume(state: GameState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    /// Committed state.
    pub fn state(&self) -> GameState {
        self.state
    }

    /// Number of transitions applied so far.
    pub fn version(&self) -> usize {
        self.version
    }

    /// Validate `event` against the current state and hold the resulting plan.
    pub fn plan(&mut self, event: GameEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let to = compute_transition(self.state, event).map_err(PlanError::InvalidTransition)?;
        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.state,
            to,
            event,
        };
        self.pending = Some(plan);
        Ok(plan)
    }

    /// Apply a planned transition and return the new state.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<GameState, ApplyError> {
        let plan = self.take_pending(plan_id)?;
        self.state = plan.to;
        self.version += 1;
        Ok(self.state)
    }

    /// Drop a planned transition without applying it.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), ApplyError> {
        self.take_pending(plan_id).map(|_| ())
    }

    fn take_pending(&mut self, plan_id: PlanId) -> Result<Plan, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;
        if plan.id != plan_id {
            let expected = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected,
                got: plan_id,
            });
        }
        Ok(plan)
    }
}

/// Compute a transition from an event if the transition is valid.
pub fn compute_transition(from: GameState, event: GameEvent) -> Result<GameState, InvalidTransition> {
    let next = match (from, event) {
        (GameState::Lobby, GameEvent::InitializeGame) => GameState::GameInit,
        (GameState::GameInit, GameEvent::StartGame) => GameState::GameStarted,
        (_, GameEvent::ReturnToLobby) => GameState::Lobby,
        (GameState::End, GameEvent::EndGame) => return Err(InvalidTransition { from, event }),
        (_, GameEvent::EndGame) => GameState::End,
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(sm: &mut GameStateMachine, event: GameEvent) -> GameState {
        let plan = sm.plan(event).unwrap();
        sm.apply(plan.id).unwrap()
    }

    #[test]
    fn initial_state_is_lobby() {
        let sm = GameStateMachine::new();
        assert_eq!(sm.state(), GameState::Lobby);
        assert_eq!(sm.version(), 0);
    }

    #[test]
    fn full_happy_path_through_game() {
        let mut sm = GameStateMachine::new();
        assert_eq!(apply(&mut sm, GameEvent::InitializeGame), GameState::GameInit);
        assert_eq!(apply(&mut sm, GameEvent::StartGame), GameState::GameStarted);
        assert_eq!(apply(&mut sm, GameEvent::EndGame), GameState::End);
        assert_eq!(apply(&mut sm, GameEvent::ReturnToLobby), GameState::Lobby);
        assert_eq!(sm.version(), 4);
    }

    #[test]
    fn start_requires_initialization() {
        let mut sm = GameStateMachine::new();
        let err = sm.plan(GameEvent::StartGame).unwrap_err();
        match err {
            PlanError::InvalidTransition(invalid) => {
                assert_eq!(invalid.from, GameState::Lobby);
                assert_eq!(invalid.event, GameEvent::StartGame);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn ended_game_cannot_end_again_or_restart_without_lobby() {
        let mut sm = GameStateMachine::resume(GameState::End);
        assert!(sm.plan(GameEvent::EndGame).is_err());
        assert!(sm.plan(GameEvent::InitializeGame).is_err());
        assert_eq!(apply(&mut sm, GameEvent::ReturnToLobby), GameState::Lobby);
    }

    #[test]
    fn abort_clears_pending() {
        let mut sm = GameStateMachine::new();
        let plan = sm.plan(GameEvent::InitializeGame).unwrap();
        assert_eq!(
            sm.plan(GameEvent::InitializeGame).unwrap_err(),
            PlanError::AlreadyPending
        );
        sm.abort(plan.id).unwrap();
        assert!(sm.pending.is_none());
        assert_eq!(sm.state(), GameState::Lobby);
    }

    #[test]
    fn apply_with_wrong_plan_keeps_pending() {
        let mut sm = GameStateMachine::new();
        let plan = sm.plan(GameEvent::InitializeGame).unwrap();
        let err = sm.apply(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ApplyError::IdMismatch { .. }));
        assert_eq!(sm.apply(plan.id).unwrap(), GameState::GameInit);
    }

    #[test]
    fn observer_predicates() {
        assert!(GameState::GameInit.has_game_started());
        assert!(GameState::GameStarted.has_game_started());
        assert!(GameState::GameStarted.is_game_in_progress());
        assert!(!GameState::GameInit.is_game_in_progress());
        assert!(GameState::Lobby.is_lobby_open());
        assert!(GameState::Lobby.has_game_ended());
        assert!(GameState::End.has_game_ended());
        assert!(!GameState::GameStarted.has_game_ended());
    }

    #[test]
    fn stored_representation_matches_room_tree() {
        assert_eq!(
            serde_json::to_value(GameState::GameStarted).unwrap(),
            serde_json::json!("gameStarted")
        );
        assert_eq!(
            serde_json::from_value::<GameState>(serde_json::json!("end")).unwrap(),
            GameState::End
        );
    }
}
