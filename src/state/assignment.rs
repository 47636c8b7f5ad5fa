//! Balanced-random team assignment and per-team question pools.
//!
//! With `N` MCQ devices, a per-team minimum `T` and a multiplier `X`, every
//! round first tops each team up to `T` devices, then serves the remaining
//! demand from a persistent pool holding `X * (N - 2T)` entries of each team.
//! The pool bounds how long one team can keep winning the draw: `X = 1` makes
//! every pool cycle perfectly balanced, larger values allow longer streaks.

use indexmap::IndexMap;
use rand::{Rng, seq::SliceRandom};
use tracing::debug;

use crate::{
    error::ServiceError,
    state::game::{McqPlayer, Question, Team},
};

/// Team assignment state persisting across rounds of one game.
#[derive(Debug, Clone)]
pub struct TeamAssignmentEngine {
    num_mcqs: usize,
    minimum_team_computers: usize,
    random_sequence_multiplier: usize,
    pool: Vec<Team>,
    generations: usize,
}

impl TeamAssignmentEngine {
    /// Fails when `num_mcqs` cannot cover the minimum of both teams.
    pub fn new(
        num_mcqs: usize,
        minimum_team_computers: usize,
        random_sequence_multiplier: usize,
    ) -> Result<Self, ServiceError> {
        if num_mcqs < minimum_team_computers * Team::ALL.len() {
            return Err(ServiceError::InvalidInput(format!(
                "{num_mcqs} mcq devices cannot cover a minimum of {minimum_team_computers} per team"
            )));
        }
        Ok(Self {
            num_mcqs,
            minimum_team_computers,
            random_sequence_multiplier,
            pool: Vec::new(),
            generations: 0,
        })
    }

    /// Entries produced by one pool generation: `2 * X * (N - 2T)`.
    pub fn pool_generation_size(&self) -> usize {
        let unconstrained = self.num_mcqs - self.minimum_team_computers * Team::ALL.len();
        Team::ALL.len() * self.random_sequence_multiplier * unconstrained
    }

    /// Entries left in the persistent pool.
    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    /// How many times the pool has been generated so far.
    pub fn generations(&self) -> usize {
        self.generations
    }

    fn regenerate_pool(&mut self, rng: &mut impl Rng) {
        let per_team = self.pool_generation_size() / Team::ALL.len();
        let mut pool = Vec::with_capacity(self.pool_generation_size());
        for _ in 0..per_team {
            pool.extend(Team::ALL);
        }
        pool.shuffle(rng);
        self.pool = pool;
        self.generations += 1;
        debug!(size = self.pool.len(), generation = self.generations, "team assignment pool generated");
    }

    /// Assign a team to every device in `mcqs` that has none.
    pub fn assign<'a>(
        &mut self,
        mcqs: impl Iterator<Item = &'a mut McqPlayer>,
        rng: &mut impl Rng,
    ) {
        let mcqs: Vec<&'a mut McqPlayer> = mcqs.collect();

        let mut team_assignments = Vec::new();
        for team in Team::ALL {
            let assigned = mcqs
                .iter()
                .filter(|mcq| mcq.assigned_team() == Some(team))
                .count();
            for _ in assigned..self.minimum_team_computers {
                team_assignments.push(team);
            }
        }

        let unassigned: Vec<&'a mut McqPlayer> = mcqs
            .into_iter()
            .filter(|mcq| mcq.needs_team_assignment())
            .collect();
        if unassigned.is_empty() {
            return;
        }

        let pooled_demand = unassigned.len().saturating_sub(team_assignments.len());
        let left_in_pool = self.pool.len() as isize - pooled_demand as isize;
        let from_current = if left_in_pool >= 0 {
            pooled_demand
        } else {
            self.pool.len()
        };
        team_assignments.extend(self.pool.drain(self.pool.len() - from_current..));

        // Regenerate as soon as the pool runs dry, even when demand was met exactly.
        if left_in_pool <= 0 {
            self.regenerate_pool(rng);
            let still_needed = left_in_pool.unsigned_abs().min(self.pool.len());
            team_assignments.extend(self.pool.drain(self.pool.len() - still_needed..));
        }

        team_assignments.shuffle(rng);
        for mcq in unassigned {
            if let Some(team) = team_assignments.pop() {
                mcq.assign_to_team(team);
            }
        }
    }
}

/// Question pools drawn from per team, refilled from the master list when empty.
#[derive(Debug, Clone)]
pub struct QuestionPools {
    master: Vec<Question>,
    pools: IndexMap<Team, Vec<Question>>,
}

impl QuestionPools {
    /// Both pools start as full copies of `master`.
    pub fn new(master: Vec<Question>) -> Self {
        let pools = Team::ALL
            .into_iter()
            .map(|team| (team, master.clone()))
            .collect();
        Self { master, pools }
    }

    /// Questions left before `team`'s pool refills.
    pub fn remaining(&self, team: Team) -> usize {
        self.pools.get(&team).map_or(0, Vec::len)
    }

    /// Remove and return a random question from `team`'s pool.
    pub fn draw(&mut self, team: Team, rng: &mut impl Rng) -> Option<Question> {
        let pool = self.pools.entry(team).or_default();
        if pool.is_empty() {
            debug!(%team, "team ran out of questions; refreshing pool");
            pool.clone_from(&self.master);
        }
        if pool.is_empty() {
            return None;
        }
        let index = rng.random_range(0..pool.len());
        Some(pool.swap_remove(index))
    }
}
