//! Glicko-2 building blocks and the rating-period update.
//!
//! Reference: Mark Glickman, "Example of the Glicko-2 system".

use std::f64::consts::PI;

use super::{
    Outcome, Rating, RatingError, RatingSettings,
    scale::{InternalRating, from_glicko2_scale, to_glicko2_scale},
};

/// Dampens the impact of a game according to the opponent's deviation.
pub fn g(phi: f64) -> f64 {
    1.0 / (1.0 + 3.0 * phi * phi / (PI * PI)).sqrt()
}

/// Expected score of a player at `mu` against an opponent at `(mu_j, phi_j)`.
pub fn expectation(mu: f64, mu_j: f64, phi_j: f64) -> f64 {
    1.0 / (1.0 + (-g(phi_j) * (mu - mu_j)).exp())
}

/// Inputs of the volatility root-finding step, on the internal scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolatilityProblem {
    /// Estimated improvement `Δ`.
    pub delta: f64,
    /// Pre-period deviation `φ`.
    pub phi: f64,
    /// Estimated variance `v`.
    pub variance: f64,
    /// Pre-period volatility `σ`.
    pub volatility: f64,
}

/// Outcome of [`solve_volatility`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolatilitySolution {
    /// New volatility `σ'`, or the prior volatility when `converged` is false.
    pub value: f64,
    /// Whether the bisection met the tolerance within the iteration cap.
    pub converged: bool,
    /// Bracket widening steps or bisection steps consumed.
    pub iterations: u32,
}

/// Find the new volatility by bisecting the Glicko-2 convergence function.
///
/// The bracket starts at `A = ln(σ²)`. When `Δ² > φ² + v` the other end is
/// `ln(Δ² - φ² - v)`, otherwise it is the first `A - kτ` (k = 1, 2, ...) where the
/// function is non-negative. Both the bracket search and the bisection stop after
/// `max_iterations` steps and report `converged: false`.
pub fn solve_volatility(
    problem: &VolatilityProblem,
    tau: f64,
    tolerance: f64,
    max_iterations: u32,
) -> VolatilitySolution {
    let VolatilityProblem {
        delta,
        phi,
        variance,
        volatility,
    } = *problem;

    let failed = |iterations| VolatilitySolution {
        value: volatility,
        converged: false,
        iterations,
    };

    let ln_sigma_sq = (volatility * volatility).ln();
    let phi_sq = phi * phi;
    let delta_sq = delta * delta;
    let tau_sq = tau * tau;
    let f = |x: f64| {
        let ex = x.exp();
        let denominator = phi_sq + variance + ex;
        ex * (delta_sq - phi_sq - variance - ex) / (2.0 * denominator * denominator)
            - (x - ln_sigma_sq) / tau_sq
    };

    let mut a = ln_sigma_sq;
    let mut b = if delta_sq > phi_sq + variance {
        (delta_sq - phi_sq - variance).ln()
    } else {
        let mut k = 1;
        loop {
            if k > max_iterations {
                return failed(k - 1);
            }
            let candidate = a - f64::from(k) * tau;
            let value = f(candidate);
            if !value.is_finite() {
                return failed(k);
            }
            if value >= 0.0 {
                break candidate;
            }
            k += 1;
        }
    };

    let mut f_a = f(a);
    if !f_a.is_finite() || !f(b).is_finite() {
        return failed(0);
    }

    let mut iterations = 0;
    while (b - a).abs() > tolerance {
        if iterations >= max_iterations {
            return failed(iterations);
        }
        let c = (a + b) / 2.0;
        let f_c = f(c);
        if f_c * f_a < 0.0 {
            b = c;
        } else {
            a = c;
            f_a = f_c;
        }
        iterations += 1;
    }

    VolatilitySolution {
        value: ((a + b) / 4.0).exp(),
        converged: true,
        iterations,
    }
}

/// Re-rate `subject` after the games in `results`, all treated as one rating period.
///
/// An empty `results` slice leaves the rating untouched.
pub fn update(
    subject: &Rating,
    results: &[(Rating, Outcome)],
    settings: &RatingSettings,
) -> Result<Rating, RatingError> {
    check_rating(subject)?;
    if results.is_empty() {
        return Ok(*subject);
    }
    if !(settings.tau > 0.0 && settings.tau.is_finite()) {
        return Err(RatingError::Degenerate("tau must be positive"));
    }

    let player = to_glicko2_scale(subject.rating, subject.deviation);

    let mut inverse_variance = 0.0;
    let mut improvement = 0.0;
    for (opponent, outcome) in results {
        check_rating(opponent)?;
        let opponent = to_glicko2_scale(opponent.rating, opponent.deviation);
        let g_opponent = g(opponent.phi);
        let expected = expectation(player.mu, opponent.mu, opponent.phi);
        inverse_variance += g_opponent * g_opponent * expected * (1.0 - expected);
        improvement += g_opponent * (outcome.score() - expected);
    }

    let variance = 1.0 / inverse_variance;
    if !variance.is_finite() || variance <= 0.0 {
        return Err(RatingError::Degenerate("estimated variance is not finite"));
    }

    let solution = solve_volatility(
        &VolatilityProblem {
            delta: variance * improvement,
            phi: player.phi,
            variance,
            volatility: subject.volatility,
        },
        settings.tau,
        settings.convergence_tolerance,
        settings.max_iterations,
    );
    if !solution.converged {
        return Err(RatingError::NonConvergent {
            iterations: solution.iterations,
        });
    }
    let volatility = solution.value;

    let phi_star_sq = player.phi * player.phi + volatility * volatility;
    let precision = 1.0 / phi_star_sq + 1.0 / variance;
    if !precision.is_finite() || precision <= 0.0 {
        return Err(RatingError::Degenerate("pre-rating deviation is degenerate"));
    }
    let phi = 1.0 / precision.sqrt();
    let mu = player.mu + phi * phi * improvement;

    let (rating, deviation) = from_glicko2_scale(InternalRating { mu, phi });
    if !rating.is_finite() || !deviation.is_finite() || !(volatility > 0.0) {
        return Err(RatingError::Degenerate("updated rating is not finite"));
    }

    Ok(Rating {
        rating,
        deviation: deviation.clamp(settings.deviation_floor, settings.max_deviation),
        volatility,
    })
}

fn check_rating(rating: &Rating) -> Result<(), RatingError> {
    if !rating.rating.is_finite() || !rating.deviation.is_finite() || !rating.volatility.is_finite()
    {
        return Err(RatingError::Degenerate("rating fields must be finite"));
    }
    if rating.deviation <= 0.0 {
        return Err(RatingError::Degenerate("deviation must be positive"));
    }
    if rating.volatility <= 0.0 {
        return Err(RatingError::Degenerate("volatility must be positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Rating {
        Rating::new(1500.0, 350.0, 0.06)
    }

    fn assert_close(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() < tolerance,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn g_is_one_without_deviation_and_decreases() {
        assert_eq!(g(0.0), 1.0);
        assert!(g(1.0) < 1.0);
        assert!(g(2.0) < g(1.0));
    }

    #[test]
    fn expectation_is_even_for_equal_players() {
        assert_close(expectation(0.3, 0.3, 1.2), 0.5, 1e-12);
        assert!(expectation(1.0, 0.0, 0.5) > 0.5);
        assert!(expectation(-1.0, 0.0, 0.5) < 0.5);
    }

    #[test]
    fn solver_matches_reference_example() {
        let solution = solve_volatility(
            &VolatilityProblem {
                delta: -0.4834,
                phi: 1.1513,
                variance: 1.7785,
                volatility: 0.06,
            },
            0.5,
            1e-6,
            100,
        );
        assert!(solution.converged);
        assert_close(solution.value, 0.05999, 1e-5);
    }

    #[test]
    fn solver_reports_exhausted_iteration_budget() {
        let solution = solve_volatility(
            &VolatilityProblem {
                delta: -0.4834,
                phi: 1.1513,
                variance: 1.7785,
                volatility: 0.06,
            },
            0.5,
            1e-6,
            2,
        );
        assert!(!solution.converged);
        assert_eq!(solution.value, 0.06);
    }

    #[test]
    fn multi_opponent_period_matches_reference_example() {
        let settings = RatingSettings {
            tau: 0.5,
            ..RatingSettings::default()
        };
        let subject = Rating::new(1500.0, 200.0, 0.06);
        let results = [
            (Rating::new(1400.0, 30.0, 0.06), Outcome::Win),
            (Rating::new(1550.0, 100.0, 0.06), Outcome::Loss),
            (Rating::new(1700.0, 300.0, 0.06), Outcome::Loss),
        ];

        let updated = update(&subject, &results, &settings).unwrap();
        assert_close(updated.rating, 1464.0507, 1e-3);
        assert_close(updated.deviation, 151.5165, 1e-3);
        assert_close(updated.volatility, 0.059996, 1e-6);
    }

    #[test]
    fn fresh_players_win_regression() {
        let settings = RatingSettings::default();
        let updated = update(&fresh(), &[(fresh(), Outcome::Win)], &settings).unwrap();

        assert_close(updated.rating, 1662.3109, 1e-3);
        assert_close(updated.deviation, 290.3190, 1e-3);
        assert_close(updated.volatility, 0.06, 1e-6);
        assert!(updated.deviation < 350.0);
    }

    #[test]
    fn single_exchange_is_symmetric() {
        let settings = RatingSettings::default();
        let won = update(&fresh(), &[(fresh(), Outcome::Win)], &settings).unwrap();
        let lost = update(&fresh(), &[(fresh(), Outcome::Loss)], &settings).unwrap();

        assert!(won.rating > 1500.0);
        assert!(lost.rating < 1500.0);
        assert_close(won.rating - 1500.0, 1500.0 - lost.rating, 1e-9);
        assert_close(won.deviation, lost.deviation, 1e-9);
    }

    #[test]
    fn deviation_and_volatility_stay_in_bounds() {
        let settings = RatingSettings::default();
        let ratings = [600.0, 1500.0, 2700.0];
        let deviations = [30.0, 120.0, 350.0];
        let volatilities = [0.01, 0.06, 0.9];

        for &r in &ratings {
            for &rd in &deviations {
                for &vol in &volatilities {
                    let subject = Rating::new(r, rd, vol);
                    for &opponent_rating in &ratings {
                        let opponent = Rating::new(opponent_rating, 350.0, 0.06);
                        for outcome in [Outcome::Win, Outcome::Loss] {
                            let updated =
                                update(&subject, &[(opponent, outcome)], &settings).unwrap();
                            assert!(updated.deviation <= 350.0);
                            assert!(updated.deviation >= settings.deviation_floor);
                            assert!(updated.volatility > 0.0);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn deviation_is_clamped_to_floor() {
        let settings = RatingSettings {
            deviation_floor: 40.0,
            ..RatingSettings::default()
        };
        let settled = Rating::new(1500.0, 30.0, 0.06);
        let updated = update(&settled, &[(settled, Outcome::Win)], &settings).unwrap();
        assert_eq!(updated.deviation, 40.0);
    }

    #[test]
    fn empty_period_keeps_rating() {
        let subject = Rating::new(1720.0, 80.0, 0.05);
        let updated = update(&subject, &[], &RatingSettings::default()).unwrap();
        assert_eq!(updated, subject);
    }

    #[test]
    fn degenerate_inputs_are_rejected() {
        let settings = RatingSettings::default();
        let nan = Rating::new(f64::NAN, 350.0, 0.06);
        assert!(matches!(
            update(&nan, &[(fresh(), Outcome::Win)], &settings),
            Err(RatingError::Degenerate(_))
        ));
        let frozen = Rating::new(1500.0, 350.0, 0.0);
        assert!(matches!(
            update(&fresh(), &[(frozen, Outcome::Win)], &settings),
            Err(RatingError::Degenerate(_))
        ));
    }

    #[test]
    fn iteration_budget_surfaces_as_non_convergence() {
        let settings = RatingSettings {
            max_iterations: 1,
            ..RatingSettings::default()
        };
        let result = update(&fresh(), &[(fresh(), Outcome::Win)], &settings);
        assert!(matches!(result, Err(RatingError::NonConvergent { .. })));
    }
}
