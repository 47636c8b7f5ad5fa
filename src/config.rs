//! Application-level configuration loading: room constants, default game
//! settings and admission policy.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::dao::models::DamageDistribution;

/// Default location on disk where the configuration is looked up.
const DEFAULT_CONFIG_PATH: &str = "config/leaguekook.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "LEAGUEKOOK_CONFIG_PATH";

/// Immutable runtime configuration shared by every service.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub room: RoomConfig,
    pub game: GameConfig,
    pub admission: AdmissionConfig,
}

/// Room directory constants.
#[derive(Debug, Clone, Deserialize, Validate, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomConfig {
    #[validate(range(min = 4, max = 32))]
    pub code_length: usize,
    #[validate(range(min = 4, max = 32))]
    pub passcode_length: usize,
    /// A room whose admin has not refreshed `activeTime` for this long is inactive.
    #[validate(range(min = 1))]
    pub active_duration_ms: i64,
    /// MCQ devices required in the lobby before a game may start.
    #[validate(range(min = 2))]
    pub min_mcq_role_count: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            code_length: 6,
            passcode_length: 6,
            active_duration_ms: 3 * 60 * 60 * 1000,
            min_mcq_role_count: 2,
        }
    }
}

/// Settings written into every new room.
#[derive(Debug, Clone, Deserialize, Validate, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GameConfig {
    #[validate(range(min = 1))]
    pub baron_max_health: u32,
    #[validate(range(min = 1))]
    pub baron_code_active_duration_ms: i64,
    #[validate(range(min = 3, max = 16))]
    pub baron_code_length: usize,
    pub min_damage: u32,
    #[validate(range(min = 1))]
    pub max_damage: u32,
    #[validate(range(min = 1))]
    pub question_answer_window_ms: i64,
    #[validate(range(min = 0))]
    pub question_wrong_lockout_ms: i64,
    #[validate(range(min = 0))]
    pub baron_code_wrong_lockout_ms: i64,
    pub minimum_team_computers: usize,
    #[validate(range(min = 1))]
    pub random_sequence_multiplier: usize,
    pub damage_distribution: DamageDistribution,
    #[validate(length(min = 1))]
    pub question_bank_id: String,
    #[validate(range(min = 1, max = 16))]
    pub team_code_length: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            baron_max_health: 100,
            baron_code_active_duration_ms: 5 * 60 * 1000,
            baron_code_length: 5,
            min_damage: 5,
            max_damage: 15,
            question_answer_window_ms: 60 * 1000,
            question_wrong_lockout_ms: 60 * 1000,
            baron_code_wrong_lockout_ms: 3 * 1000,
            minimum_team_computers: 1,
            random_sequence_multiplier: 2,
            damage_distribution: DamageDistribution::Gaussian,
            question_bank_id: "default".into(),
            team_code_length: 4,
        }
    }
}

/// Wait-list admission policy.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AdmissionConfig {
    /// Have the admin compare the submitted passcode before admitting. Off by
    /// default: only the joining device checks it.
    pub verify_passcode: bool,
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(room_errors) = self.room.validate() {
            errors.merge_self("room", Err(room_errors));
        }
        if let Err(game_errors) = self.game.validate() {
            errors.merge_self("game", Err(game_errors));
        }

        if self.game.min_damage > self.game.max_damage {
            let mut err = ValidationError::new("damage_bounds");
            err.message = Some("minDamage must not exceed maxDamage".into());
            errors.add("game", err);
        }
        if self.game.minimum_team_computers * 2 > self.room.min_mcq_role_count {
            let mut err = ValidationError::new("team_minimum");
            err.message = Some(
                "minimumTeamComputers for both teams must fit in minMcqRoleCount".into(),
            );
            errors.add("game", err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded configuration");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "invalid config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse and validate a JSON configuration document.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }
}

/// Reasons a configuration document is refused.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("config validation failed: {0}")]
    Invalid(#[from] ValidationErrors),
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
