//! Library crate for leaguekook-core, exposing modules for the simulator binary and integration tests.

/// Wall-clock abstraction.
pub mod clock;
/// Random room, passcode and Baron codes.
pub mod codes;
/// Configuration loading.
pub mod config;
/// Store access layer.
pub mod dao;
/// Comm payloads and service responses.
pub mod dto;
/// Service-level errors.
pub mod error;
/// Device identity.
pub mod identity;
/// Room, lobby and game services.
pub mod services;
/// Device context and in-memory game state.
pub mod state;
