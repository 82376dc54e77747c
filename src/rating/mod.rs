//! Glicko-2 rating engine shared by users and puzzles.
//!
//! Users and puzzles are both rating-bearing players: every attempt is modelled as a
//! single game between the two, and each side is re-rated from its own perspective.

pub mod glicko2;
pub mod scale;

use std::ops::Not;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Public-scale rating triple carried by users and puzzles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    /// Skill estimate, centred at 1500.
    pub rating: f64,
    /// Uncertainty of [`Rating::rating`] ("RD").
    pub deviation: f64,
    /// Expected fluctuation of the rating over time.
    pub volatility: f64,
}

impl Rating {
    /// Build a rating from its public-scale components.
    pub fn new(rating: f64, deviation: f64, volatility: f64) -> Self {
        Self {
            rating,
            deviation,
            volatility,
        }
    }
}

/// Result of a single game, from the perspective of the player being re-rated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The re-rated player lost the game.
    Loss,
    /// The re-rated player won the game.
    Win,
}

impl Outcome {
    /// Glicko score of the outcome.
    pub fn score(self) -> f64 {
        match self {
            Outcome::Loss => 0.0,
            Outcome::Win => 1.0,
        }
    }
}

impl From<bool> for Outcome {
    fn from(won: bool) -> Self {
        if won { Outcome::Win } else { Outcome::Loss }
    }
}

impl Not for Outcome {
    type Output = Outcome;

    fn not(self) -> Outcome {
        match self {
            Outcome::Loss => Outcome::Win,
            Outcome::Win => Outcome::Loss,
        }
    }
}

/// Tunables of the rating system.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RatingSettings {
    /// Rating assigned to newly created users.
    pub default_rating: f64,
    /// Deviation assigned to newly created users.
    pub default_deviation: f64,
    /// Volatility assigned to newly created users.
    pub default_volatility: f64,
    /// Upper bound for any post-update deviation.
    pub max_deviation: f64,
    /// Lower bound for any post-update deviation.
    pub deviation_floor: f64,
    /// System constant constraining volatility changes.
    pub tau: f64,
    /// Width under which the volatility bisection is considered converged.
    pub convergence_tolerance: f64,
    /// Hard cap on bracket widening steps and on bisection steps.
    pub max_iterations: u32,
}

impl Default for RatingSettings {
    fn default() -> Self {
        Self {
            default_rating: 1500.0,
            default_deviation: 350.0,
            default_volatility: 0.06,
            max_deviation: 350.0,
            deviation_floor: 30.0,
            tau: 0.2,
            convergence_tolerance: 1e-6,
            max_iterations: 100,
        }
    }
}

impl RatingSettings {
    /// Rating triple given to a player with no history.
    pub fn default_rating(&self) -> Rating {
        Rating::new(
            self.default_rating,
            self.default_deviation,
            self.default_volatility,
        )
    }
}

/// Failures of a rating update. Prior ratings must be kept when one is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RatingError {
    /// Inputs cannot produce a meaningful update (non-finite values, zero variance...).
    #[error("degenerate rating input: {0}")]
    Degenerate(&'static str),
    /// The volatility root-finder could not bracket or converge.
    #[error("volatility solver did not converge after {iterations} iteration(s)")]
    NonConvergent { iterations: u32 },
}

/// Stateless rating calculator bound to a set of [`RatingSettings`].
#[derive(Debug, Clone, Default)]
pub struct RatingEngine {
    settings: RatingSettings,
}

impl RatingEngine {
    /// Engine applying `settings` to every update.
    pub fn new(settings: RatingSettings) -> Self {
        Self { settings }
    }

    /// Settings the engine was built with.
    pub fn settings(&self) -> &RatingSettings {
        &self.settings
    }

    /// Re-rate `subject` after one game against `opponent`.
    pub fn update(
        &self,
        subject: &Rating,
        opponent: &Rating,
        outcome: Outcome,
    ) -> Result<Rating, RatingError> {
        glicko2::update(subject, &[(*opponent, outcome)], &self.settings)
    }

    /// Re-rate `subject` after several simultaneous games.
    pub fn update_many(
        &self,
        subject: &Rating,
        results: &[(Rating, Outcome)],
    ) -> Result<Rating, RatingError> {
        glicko2::update(subject, results, &self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_negation_swaps_sides() {
        assert_eq!(!Outcome::Win, Outcome::Loss);
        assert_eq!(!Outcome::Loss, Outcome::Win);
        assert_eq!(Outcome::from(true), Outcome::Win);
        assert_eq!(Outcome::from(false).score(), 0.0);
    }

    #[test]
    fn settings_deserialize_with_defaults() {
        let settings: RatingSettings = serde_json::from_str(r#"{"tau": 0.5}"#).unwrap();
        assert_eq!(settings.tau, 0.5);
        assert_eq!(settings.default_rating, 1500.0);
        assert_eq!(settings.max_deviation, 350.0);
        assert_eq!(settings.max_iterations, 100);
    }
}
