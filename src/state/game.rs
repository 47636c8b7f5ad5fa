use std::{fmt, str::FromStr};

use indexmap::IndexMap;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use validator::Validate;

use crate::{
    config::GameConfig,
    dao::models::{
        DamageDistribution, GameRole, GameSettingsEntity, LobbyListEntryEntity, QuestionEntity,
    },
    error::ServiceError,
    state::{
        assignment::{QuestionPools, TeamAssignmentEngine},
        combat::{BaronCodeLedger, roll_damage},
    },
};

/// The two teams competing to land the last hit on the Baron.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    /// Red side, listed first.
    Red,
    /// Blue side.
    Blue,
}

impl Team {
    /// Every team, in display order.
    pub const ALL: [Team; 2] = [Team::Red, Team::Blue];

    fn as_str(self) -> &'static str {
        match self {
            Team::Red => "red",
            Team::Blue => "blue",
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Team {
    type Err = ServiceError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "red" => Ok(Team::Red),
            "blue" => Ok(Team::Blue),
            other => Err(ServiceError::InvalidInput(format!("unknown team `{other}`"))),
        }
    }
}

/// One of the four options of a multiple-choice question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Answer {
    /// First option.
    A,
    /// Second option.
    B,
    /// Third option.
    C,
    /// Fourth option.
    D,
}

impl FromStr for Answer {
    type Err = ServiceError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "a" => Ok(Answer::A),
            "b" => Ok(Answer::B),
            "c" => Ok(Answer::C),
            "d" => Ok(Answer::D),
            other => Err(ServiceError::InvalidInput(format!("unknown answer `{other}`"))),
        }
    }
}

/// Multiple-choice question served to MCQ devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub title: String,
    pub answer: Answer,
    pub image_url: String,
}

impl Question {
    /// Build a question from a bank entry, rejecting entries with missing fields
    /// or an answer outside `a`..`d`.
    pub fn from_entity(id: &str, entity: QuestionEntity) -> Result<Self, ServiceError> {
        if id.is_empty() {
            return Err(ServiceError::InvalidInput("question without id".into()));
        }
        entity.validate()?;
        let missing =
            |field: &str| ServiceError::InvalidInput(format!("question {id}: missing {field}"));
        let answer = entity.answer.ok_or_else(|| missing("answer"))?.parse()?;
        Ok(Self {
            id: id.to_owned(),
            title: entity.title.ok_or_else(|| missing("title"))?,
            answer,
            image_url: entity.image_url.ok_or_else(|| missing("imageUrl"))?,
        })
    }
}

/// Per-room game settings, fixed at room creation.
#[derive(Debug, Clone, PartialEq)]
pub struct GameSettings {
    /// Secret each team's MCQ devices must type before seeing a question.
    pub team_codes: IndexMap<Team, String>,
    pub baron_max_health: u32,
    pub baron_code_active_duration_ms: i64,
    pub baron_code_length: usize,
    pub min_damage: u32,
    pub max_damage: u32,
    pub question_answer_window_ms: i64,
    pub question_wrong_lockout_ms: i64,
    pub baron_code_wrong_lockout_ms: i64,
    pub minimum_team_computers: usize,
    pub random_sequence_multiplier: usize,
    pub damage_distribution: DamageDistribution,
    pub question_bank_id: String,
}

impl GameSettings {
    /// Settings for a new room: configured values plus freshly drawn team codes.
    pub fn from_config(config: &GameConfig, team_codes: IndexMap<Team, String>) -> Self {
        Self {
            team_codes,
            baron_max_health: config.baron_max_health,
            baron_code_active_duration_ms: config.baron_code_active_duration_ms,
            baron_code_length: config.baron_code_length,
            min_damage: config.min_damage,
            max_damage: config.max_damage,
            question_answer_window_ms: config.question_answer_window_ms,
            question_wrong_lockout_ms: config.question_wrong_lockout_ms,
            baron_code_wrong_lockout_ms: config.baron_code_wrong_lockout_ms,
            minimum_team_computers: config.minimum_team_computers,
            random_sequence_multiplier: config.random_sequence_multiplier,
            damage_distribution: config.damage_distribution,
            question_bank_id: config.question_bank_id.clone(),
        }
    }
}

impl From<GameSettings> for GameSettingsEntity {
    fn from(value: GameSettings) -> Self {
        Self {
            team_codes: value
                .team_codes
                .into_iter()
                .map(|(team, code)| (team.to_string(), code))
                .collect(),
            baron_max_health: value.baron_max_health,
            baron_code_active_duration: value.baron_code_active_duration_ms,
            baron_code_length: value.baron_code_length,
            min_damage: value.min_damage,
            max_damage: value.max_damage,
            question_answer_window_duration: value.question_answer_window_ms,
            question_wrong_lockout_duration: value.question_wrong_lockout_ms,
            baron_code_wrong_lockout_duration: value.baron_code_wrong_lockout_ms,
            minimum_team_computers: value.minimum_team_computers,
            random_sequence_multiplier: value.random_sequence_multiplier,
            damage_distribution: value.damage_distribution,
            question_bank_id: value.question_bank_id,
        }
    }
}

impl TryFrom<GameSettingsEntity> for GameSettings {
    type Error = ServiceError;

    fn try_from(value: GameSettingsEntity) -> Result<Self, Self::Error> {
        let team_codes = value
            .team_codes
            .into_iter()
            .map(|(team, code)| Ok((team.parse::<Team>()?, code)))
            .collect::<Result<IndexMap<_, _>, ServiceError>>()?;
        if let Some(team) = Team::ALL.iter().find(|team| !team_codes.contains_key(*team)) {
            return Err(ServiceError::InvalidInput(format!("no team code for {team}")));
        }
        if value.min_damage > value.max_damage {
            return Err(ServiceError::InvalidInput(format!(
                "min damage {} exceeds max damage {}",
                value.min_damage, value.max_damage
            )));
        }

        Ok(Self {
            team_codes,
            baron_max_health: value.baron_max_health,
            baron_code_active_duration_ms: value.baron_code_active_duration,
            baron_code_length: value.baron_code_length,
            min_damage: value.min_damage,
            max_damage: value.max_damage,
            question_answer_window_ms: value.question_answer_window_duration,
            question_wrong_lockout_ms: value.question_wrong_lockout_duration,
            baron_code_wrong_lockout_ms: value.baron_code_wrong_lockout_duration,
            minimum_team_computers: value.minimum_team_computers,
            random_sequence_multiplier: value.random_sequence_multiplier,
            damage_distribution: value.damage_distribution,
            question_bank_id: value.question_bank_id,
        })
    }
}

/// Lobby member as read from `lobbyList/<uid>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyMember {
    pub uid: String,
    pub is_ready: bool,
    pub role: GameRole,
    pub role_img_code: String,
}

impl LobbyMember {
    pub fn from_entity(uid: impl Into<String>, entity: LobbyListEntryEntity) -> Self {
        Self {
            uid: uid.into(),
            is_ready: entity.is_ready,
            role: entity.role,
            role_img_code: entity.role_img_code,
        }
    }
}

/// MCQ device tracked by the admin, with its current team and question.
#[derive(Debug, Clone)]
pub struct McqPlayer {
    pub member: LobbyMember,
    assigned_team: Option<Team>,
    assigned_question: Option<Question>,
}

impl McqPlayer {
    /// Unassigned MCQ for `member`.
    pub fn new(member: LobbyMember) -> Self {
        Self {
            member,
            assigned_team: None,
            assigned_question: None,
        }
    }

    /// Team the device currently plays for.
    pub fn assigned_team(&self) -> Option<Team> {
        self.assigned_team
    }

    pub fn assigned_question(&self) -> Option<&Question> {
        self.assigned_question.as_ref()
    }

    pub fn assign_to_team(&mut self, team: Team) {
        self.assigned_team = Some(team);
    }

    pub fn assign_question(&mut self, question: Question) {
        self.assigned_question = Some(question);
    }

    /// Free the device for a new round: both team and question are cleared.
    pub fn completed_question(&mut self) {
        self.assigned_team = None;
        self.assigned_question = None;
    }

    /// No team yet.
    pub fn needs_team_assignment(&self) -> bool {
        self.assigned_team.is_none()
    }

    pub fn needs_question_assignment(&self) -> bool {
        self.assigned_question.is_none()
    }
}

/// Baron device tracked by the admin.
#[derive(Debug, Clone)]
pub struct BaronPlayer {
    pub member: LobbyMember,
    health: u32,
    max_health: u32,
}

impl BaronPlayer {
    /// Baron at full health.
    pub fn new(member: LobbyMember, max_health: u32) -> Self {
        Self {
            member,
            health: max_health,
            max_health,
        }
    }

    pub fn health(&self) -> u32 {
        self.health
    }

    pub fn max_health(&self) -> u32 {
        self.max_health
    }

    /// Apply a hit, clamping at zero, and return the remaining health.
    pub fn receive_damage(&mut self, amount: u32) -> u32 {
        self.health = self.health.saturating_sub(amount);
        self.health
    }

    /// The Baron fell.
    pub fn is_dead(&self) -> bool {
        self.health == 0
    }
}

/// Lobby member turned game participant.
#[derive(Debug, Clone)]
pub enum Player {
    /// The coordinator when it does not play the Baron itself.
    Admin(LobbyMember),
    /// Device taking the hits.
    Baron(BaronPlayer),
    /// Trivia device.
    Mcq(McqPlayer),
}

impl Player {
    fn from_member(member: LobbyMember, baron_max_health: u32) -> Self {
        match member.role {
            GameRole::Admin => Player::Admin(member),
            GameRole::Baron => Player::Baron(BaronPlayer::new(member, baron_max_health)),
            GameRole::Mcq => Player::Mcq(McqPlayer::new(member)),
        }
    }

    /// Identity of the underlying lobby member.
    pub fn uid(&self) -> &str {
        match self {
            Player::Admin(member) => &member.uid,
            Player::Baron(baron) => &baron.member.uid,
            Player::Mcq(mcq) => &mcq.member.uid,
        }
    }
}

/// Verdict on a submitted Baron code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaronHit {
    pub is_valid: bool,
    pub damage_amount: u32,
    pub health_after_damage: u32,
    /// Team credited with the hit; `None` for an invalid code.
    pub team: Option<Team>,
    pub is_last_hit: bool,
}

/// Authoritative game state kept in the admin's memory for one game.
#[derive(Debug)]
pub struct LeagueKookGame {
    settings: GameSettings,
    players: Vec<Player>,
    engine: TeamAssignmentEngine,
    questions: QuestionPools,
    ledger: BaronCodeLedger,
    winning_team: Option<Team>,
    rng: StdRng,
}

impl LeagueKookGame {
    /// Build the game from the lobby, then hand every MCQ device a team and a
    /// question.
    ///
    /// Fails unless the lobby holds exactly one Baron, enough MCQ devices to
    /// cover the per-team minimum, and at least one valid question.
    pub fn initialize(
        settings: GameSettings,
        members: Vec<LobbyMember>,
        questions: Vec<Question>,
        rng: StdRng,
    ) -> Result<Self, ServiceError> {
        let barons = members
            .iter()
            .filter(|member| member.role == GameRole::Baron)
            .count();
        if barons != 1 {
            return Err(ServiceError::Protocol(format!(
                "expected one Baron in lobby but found {barons}"
            )));
        }
        if questions.is_empty() {
            return Err(ServiceError::InvalidInput(
                "question bank holds no valid question".into(),
            ));
        }

        let players: Vec<Player> = members
            .into_iter()
            .map(|member| Player::from_member(member, settings.baron_max_health))
            .collect();
        let num_mcqs = players
            .iter()
            .filter(|player| matches!(player, Player::Mcq(_)))
            .count();
        let engine = TeamAssignmentEngine::new(
            num_mcqs,
            settings.minimum_team_computers,
            settings.random_sequence_multiplier,
        )?;
        let ledger = BaronCodeLedger::new(
            settings.baron_code_length,
            settings.baron_code_active_duration_ms,
        );

        let mut game = Self {
            settings,
            players,
            engine,
            questions: QuestionPools::new(questions),
            ledger,
            winning_team: None,
            rng,
        };
        game.assign_teams_to_unassigned_mcqs();
        game.assign_questions_to_mcqs();
        info!(mcqs = num_mcqs, "game initialized");
        Ok(game)
    }

    /// Settings the game was started with.
    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    /// Every player, admin included, in lobby order.
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn mcq_players(&self) -> impl Iterator<Item = &McqPlayer> {
        self.players.iter().filter_map(|player| match player {
            Player::Mcq(mcq) => Some(mcq),
            _ => None,
        })
    }

    pub fn mcq_player(&self, uid: &str) -> Option<&McqPlayer> {
        self.mcq_players().find(|mcq| mcq.member.uid == uid)
    }

    fn mcq_player_mut(&mut self, uid: &str) -> Option<&mut McqPlayer> {
        self.players.iter_mut().find_map(|player| match player {
            Player::Mcq(mcq) if mcq.member.uid == uid => Some(mcq),
            _ => None,
        })
    }

    /// The single Baron, if the game has one.
    pub fn baron_player(&self) -> Option<&BaronPlayer> {
        self.players.iter().find_map(|player| match player {
            Player::Baron(baron) => Some(baron),
            _ => None,
        })
    }

    fn baron_player_mut(&mut self) -> Option<&mut BaronPlayer> {
        self.players.iter_mut().find_map(|player| match player {
            Player::Baron(baron) => Some(baron),
            _ => None,
        })
    }

    /// Identities that must echo `INITIALIZATION_DONE` before play starts.
    pub fn participant_uids(&self) -> Vec<String> {
        self.players
            .iter()
            .filter(|player| !matches!(player, Player::Admin(_)))
            .map(|player| player.uid().to_owned())
            .collect()
    }

    pub fn winning_team(&self) -> Option<Team> {
        self.winning_team
    }

    /// Codes issued so far.
    pub fn ledger(&self) -> &BaronCodeLedger {
        &self.ledger
    }

    /// Give every MCQ device without a team one, keeping each team at its minimum.
    pub fn assign_teams_to_unassigned_mcqs(&mut self) {
        let mcqs = self.players.iter_mut().filter_map(|player| match player {
            Player::Mcq(mcq) => Some(mcq),
            _ => None,
        });
        self.engine.assign(mcqs, &mut self.rng);
    }

    /// Draw a question from its team's pool for every MCQ device without one.
    /// Call after [`assign_teams_to_unassigned_mcqs`](Self::assign_teams_to_unassigned_mcqs).
    pub fn assign_questions_to_mcqs(&mut self) {
        for player in &mut self.players {
            let Player::Mcq(mcq) = player else {
                continue;
            };
            if !mcq.needs_question_assignment() {
                continue;
            }
            let Some(team) = mcq.assigned_team() else {
                warn!(uid = %mcq.member.uid, "mcq has no team; skipping question assignment");
                continue;
            };
            if let Some(question) = self.questions.draw(team, &mut self.rng) {
                mcq.assign_question(question);
            }
        }
    }

    /// Release `uid`'s current question, then reassign teams and questions.
    /// Returns the device's new team and question.
    pub fn next_question_for(&mut self, uid: &str) -> Result<(Team, Question), ServiceError> {
        self.mcq_player_mut(uid)
            .ok_or_else(|| ServiceError::NotFound(format!("mcq player {uid}")))?
            .completed_question();
        self.assign_teams_to_unassigned_mcqs();
        self.assign_questions_to_mcqs();
        self.current_assignment(uid)
    }

    /// Team and question currently held by `uid`.
    pub fn current_assignment(&self, uid: &str) -> Result<(Team, Question), ServiceError> {
        let mcq = self
            .mcq_player(uid)
            .ok_or_else(|| ServiceError::NotFound(format!("mcq player {uid}")))?;
        match (mcq.assigned_team(), mcq.assigned_question()) {
            (Some(team), Some(question)) => Ok((team, question.clone())),
            _ => Err(ServiceError::InvalidState(format!(
                "mcq player {uid} holds no assignment"
            ))),
        }
    }

    /// Check `answer` against `uid`'s question. A correct answer issues a Baron
    /// code for the device's team.
    pub fn verify_answer(
        &mut self,
        uid: &str,
        answer: Answer,
        now_ms: i64,
    ) -> Result<Option<String>, ServiceError> {
        let (team, question) = self.current_assignment(uid)?;
        if question.answer != answer {
            debug!(uid, question = %question.id, "incorrect answer");
            return Ok(None);
        }
        let code = self.ledger.issue(team, now_ms, &mut self.rng);
        debug!(uid, %team, "baron code issued");
        Ok(Some(code))
    }

    /// Resolve a submitted Baron code: consume it, roll damage and detect the
    /// last hit. Codes submitted after the Baron fell are reported invalid.
    pub fn verify_baron_code(&mut self, code: &str, now_ms: i64) -> BaronHit {
        let mut hit = BaronHit {
            is_valid: false,
            damage_amount: 0,
            health_after_damage: self.baron_player().map_or(0, BaronPlayer::health),
            team: None,
            is_last_hit: false,
        };
        if self.winning_team.is_some() {
            return hit;
        }
        let Some(team) = self.ledger.verify(code, now_ms) else {
            return hit;
        };

        let damage = roll_damage(
            self.settings.damage_distribution,
            self.settings.min_damage,
            self.settings.max_damage,
            &mut self.rng,
        );
        let Some(baron) = self.baron_player_mut() else {
            return hit;
        };
        let health = baron.receive_damage(damage);
        let is_dead = baron.is_dead();

        hit.is_valid = true;
        hit.damage_amount = damage;
        hit.health_after_damage = health;
        hit.team = Some(team);
        hit.is_last_hit = is_dead;
        if is_dead {
            self.winning_team = Some(team);
            info!(%team, "baron defeated");
        }
        hit
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    fn settings() -> GameSettings {
        GameSettings {
            team_codes: IndexMap::from([(Team::Red, "rrrr".into()), (Team::Blue, "bbbb".into())]),
            baron_max_health: 30,
            baron_code_active_duration_ms: 300_000,
            baron_code_length: 5,
            min_damage: 5,
            max_damage: 15,
            question_answer_window_ms: 60_000,
            question_wrong_lockout_ms: 60_000,
            baron_code_wrong_lockout_ms: 3_000,
            minimum_team_computers: 1,
            random_sequence_multiplier: 2,
            damage_distribution: DamageDistribution::Gaussian,
            question_bank_id: "default".into(),
        }
    }

    fn member(uid: &str, role: GameRole) -> LobbyMember {
        LobbyMember {
            uid: uid.into(),
            is_ready: true,
            role,
            role_img_code: role.image_codes()[0].into(),
        }
    }

    fn questions() -> Vec<Question> {
        (0..3)
            .map(|i| Question {
                id: format!("q{i}"),
                title: format!("Question {i}"),
                answer: Answer::B,
                image_url: format!("img/{i}.png"),
            })
            .collect()
    }

    fn game() -> LeagueKookGame {
        LeagueKookGame::initialize(
            settings(),
            vec![
                member("admin", GameRole::Admin),
                member("baron", GameRole::Baron),
                member("m1", GameRole::Mcq),
                member("m2", GameRole::Mcq),
                member("m3", GameRole::Mcq),
            ],
            questions(),
            StdRng::seed_from_u64(42),
        )
        .unwrap()
    }

    #[test]
    fn question_entity_conversion_checks_fields() {
        let entity = QuestionEntity {
            title: Some("T".into()),
            answer: Some("C".into()),
            image_url: Some("u".into()),
        };
        assert_eq!(Question::from_entity("q", entity).unwrap().answer, Answer::C);

        let bad_answer = QuestionEntity {
            title: Some("T".into()),
            answer: Some("e".into()),
            image_url: Some("u".into()),
        };
        assert!(Question::from_entity("q", bad_answer).is_err());
        assert!(Question::from_entity("q", QuestionEntity::default()).is_err());
    }

    #[test]
    fn settings_round_trip_through_entity() {
        let entity: GameSettingsEntity = settings().into();
        assert_eq!(entity.team_codes.get("red").map(String::as_str), Some("rrrr"));
        assert_eq!(GameSettings::try_from(entity).unwrap(), settings());
    }

    #[test]
    fn settings_without_both_team_codes_are_rejected() {
        let mut entity: GameSettingsEntity = settings().into();
        entity.team_codes.shift_remove("blue");
        assert!(GameSettings::try_from(entity).is_err());
    }

    #[test]
    fn initialize_requires_exactly_one_baron() {
        let err = LeagueKookGame::initialize(
            settings(),
            vec![member("m1", GameRole::Mcq), member("m2", GameRole::Mcq)],
            questions(),
            StdRng::seed_from_u64(1),
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::Protocol(_)));
    }

    #[test]
    fn initialize_rejects_too_few_mcqs_for_team_minimum() {
        let err = LeagueKookGame::initialize(
            settings(),
            vec![member("b", GameRole::Baron), member("m1", GameRole::Mcq)],
            questions(),
            StdRng::seed_from_u64(1),
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[test]
    fn initialize_assigns_every_mcq() {
        let game = game();
        assert_eq!(game.mcq_players().count(), 3);
        for mcq in game.mcq_players() {
            assert!(mcq.assigned_team().is_some());
            assert!(mcq.assigned_question().is_some());
        }
        for team in Team::ALL {
            assert!(game.mcq_players().any(|mcq| mcq.assigned_team() == Some(team)));
        }
        let mut uids = game.participant_uids();
        uids.sort();
        assert_eq!(uids, vec!["baron", "m1", "m2", "m3"]);
    }

    #[test]
    fn correct_answer_yields_single_use_code() {
        let mut game = game();
        assert_eq!(game.verify_answer("m1", Answer::A, 0).unwrap(), None);
        let code = game.verify_answer("m1", Answer::B, 0).unwrap().unwrap();

        let hit = game.verify_baron_code(&code, 1_000);
        assert!(hit.is_valid);
        assert!((5..=15).contains(&hit.damage_amount));
        assert_eq!(hit.health_after_damage, 30 - hit.damage_amount);
        assert_eq!(hit.team, game.mcq_player("m1").unwrap().assigned_team());

        let again = game.verify_baron_code(&code, 1_000);
        assert!(!again.is_valid);
        assert_eq!(again.health_after_damage, hit.health_after_damage);
    }

    #[test]
    fn baron_falls_after_enough_hits() {
        let mut game = game();
        let mut last = None;
        for round in 0..10 {
            let code = game.verify_answer("m2", Answer::B, round).unwrap().unwrap();
            let hit = game.verify_baron_code(&code, round);
            assert!(hit.is_valid);
            if hit.is_last_hit {
                last = Some(hit);
                break;
            }
        }
        let last = last.expect("baron should fall within ten hits");
        assert_eq!(last.health_after_damage, 0);
        assert_eq!(game.winning_team(), last.team);
        assert!(game.baron_player().unwrap().is_dead());

        let code = game.verify_answer("m2", Answer::B, 99).unwrap().unwrap();
        assert!(!game.verify_baron_code(&code, 99).is_valid);
    }

    #[test]
    fn next_question_reassigns_the_freed_device() {
        let mut game = game();
        let (team, question) = game.next_question_for("m3").unwrap();
        assert_eq!(game.current_assignment("m3").unwrap(), (team, question));
        assert!(game.next_question_for("nobody").is_err());
    }

    #[test]
    fn baron_damage_clamps_at_zero() {
        let mut baron = BaronPlayer::new(member("b", GameRole::Baron), 10);
        assert_eq!(baron.receive_damage(4), 6);
        assert_eq!(baron.receive_damage(50), 0);
        assert!(baron.is_dead());
        assert_eq!(baron.max_health(), 10);
    }
}
