//! Baron codes and the damage they deal.

use std::f64::consts::TAU;

use rand::Rng;
use serde::Serialize;
use tracing::warn;

use crate::{codes::generate_code, dao::models::DamageDistribution, state::game::Team};

/// Attack code earned by a correct answer, redeemable once by the Baron.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BaronCodePackage {
    pub baron_code: String,
    pub team: Team,
    /// Epoch milliseconds after which the code is refused.
    pub expiry_time: i64,
    pub active: bool,
}

impl BaronCodePackage {
    fn redeemable(&self, code: &str, now_ms: i64) -> bool {
        self.active && now_ms <= self.expiry_time && self.baron_code == code
    }
}

/// History of every code issued during the current game.
#[derive(Debug, Clone)]
pub struct BaronCodeLedger {
    history: Vec<BaronCodePackage>,
    code_length: usize,
    active_duration_ms: i64,
}

impl BaronCodeLedger {
    /// Empty ledger issuing `code_length` codes that stay valid for
    /// `active_duration_ms`.
    pub fn new(code_length: usize, active_duration_ms: i64) -> Self {
        Self {
            history: Vec::new(),
            code_length,
            active_duration_ms,
        }
    }

    /// Every code issued so far, oldest first.
    pub fn history(&self) -> &[BaronCodePackage] {
        &self.history
    }

    /// Issue a fresh code for `team`, distinct from every still-active code.
    pub fn issue(&mut self, team: Team, now_ms: i64, rng: &mut impl Rng) -> String {
        let code = loop {
            let candidate = generate_code(rng, self.code_length);
            let collides = self
                .history
                .iter()
                .any(|package| package.active && package.baron_code == candidate);
            if !collides {
                break candidate;
            }
        };
        self.history.push(BaronCodePackage {
            baron_code: code.clone(),
            team,
            expiry_time: now_ms + self.active_duration_ms,
            active: true,
        });
        code
    }

    /// Consume `code` and return the team it credits.
    ///
    /// Several redeemable matches break the issuing invariant: all of them are
    /// deactivated and the hit is credited once.
    pub fn verify(&mut self, code: &str, now_ms: i64) -> Option<Team> {
        let mut matches = self
            .history
            .iter_mut()
            .filter(|package| package.redeemable(code, now_ms))
            .peekable();
        let team = matches.peek()?.team;

        let mut consumed = 0usize;
        for package in matches {
            package.active = false;
            consumed += 1;
        }
        if consumed > 1 {
            warn!(code, consumed, "several active packages matched one baron code");
        }
        Some(team)
    }
}

/// Roll the damage of a valid hit within `[min, max]`.
pub fn roll_damage(
    distribution: DamageDistribution,
    min: u32,
    max: u32,
    rng: &mut impl Rng,
) -> u32 {
    let (low, high) = if min <= max { (min, max) } else { (max, min) };
    let sample = match distribution {
        DamageDistribution::Gaussian => bell_sample(rng),
        DamageDistribution::Uniform => rng.random::<f64>(),
    };
    let span = f64::from(high - low);
    low + (sample * span).round() as u32
}

/// Normal sample squeezed into `[0, 1]` around 0.5, resampled when it falls outside.
fn bell_sample(rng: &mut impl Rng) -> f64 {
    loop {
        let u = 1.0 - rng.random::<f64>();
        let v = rng.random::<f64>();
        let z = (-2.0 * u.ln()).sqrt() * (TAU * v).cos();
        let sample = z / 10.0 + 0.5;
        if (0.0..=1.0).contains(&sample) {
            return sample;
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn codes_are_single_use() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut ledger = BaronCodeLedger::new(5, 1_000);
        let code = ledger.issue(Team::Red, 0, &mut rng);
        assert_eq!(code.len(), 5);

        assert_eq!(ledger.verify(&code, 10), Some(Team::Red));
        assert_eq!(ledger.verify(&code, 10), None);
        assert!(!ledger.history()[0].active);
    }

    #[test]
    fn expired_codes_are_refused() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut ledger = BaronCodeLedger::new(5, 1_000);
        let code = ledger.issue(Team::Blue, 0, &mut rng);
        assert_eq!(ledger.verify(&code, 1_001), None);
        assert!(ledger.history()[0].active);

        let fresh = ledger.issue(Team::Blue, 5_000, &mut rng);
        assert_eq!(ledger.verify(&fresh, 6_000), Some(Team::Blue));
    }

    #[test]
    fn duplicate_active_codes_are_all_consumed() {
        let mut ledger = BaronCodeLedger::new(5, 1_000);
        for team in [Team::Red, Team::Blue] {
            ledger.history.push(BaronCodePackage {
                baron_code: "dupe1".into(),
                team,
                expiry_time: 1_000,
                active: true,
            });
        }
        assert_eq!(ledger.verify("dupe1", 0), Some(Team::Red));
        assert!(ledger.history().iter().all(|package| !package.active));
        assert_eq!(ledger.verify("dupe1", 0), None);
    }

    #[test]
    fn issued_codes_avoid_active_collisions() {
        let mut rng = StdRng::seed_from_u64(4);
        // One-character codes over 36 symbols force collisions quickly.
        let mut ledger = BaronCodeLedger::new(1, 1_000);
        let codes: Vec<String> = (0..36)
            .map(|_| ledger.issue(Team::Red, 0, &mut rng))
            .collect();
        let mut unique = codes.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn damage_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(8);
        for distribution in [DamageDistribution::Gaussian, DamageDistribution::Uniform] {
            for _ in 0..1_000 {
                let damage = roll_damage(distribution, 5, 15, &mut rng);
                assert!((5..=15).contains(&damage));
            }
        }
        assert_eq!(roll_damage(DamageDistribution::Uniform, 7, 7, &mut rng), 7);
    }

    #[test]
    fn gaussian_damage_centres_between_bounds() {
        let mut rng = StdRng::seed_from_u64(12);
        let rolls = 2_000;
        let total: u32 = (0..rolls)
            .map(|_| roll_damage(DamageDistribution::Gaussian, 0, 100, &mut rng))
            .sum();
        let mean = f64::from(total) / f64::from(rolls);
        assert!((45.0..=55.0).contains(&mean), "mean {mean}");
    }
}
