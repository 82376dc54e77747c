//! On-disk catalog format used to seed the puzzle store.

use serde::Deserialize;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dao::models::{PuzzleEntity, PuzzleId, Side},
    dto::validation::validate_fen,
    rating::{Rating, RatingSettings},
};

/// One puzzle as written in a catalog file.
///
/// Rating fields are optional; missing ones take the configured defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogPuzzle {
    pub id: PuzzleId,
    pub fen1: String,
    pub move1: String,
    pub fen2: String,
    pub move2: String,
    pub solution: bool,
    pub color: Side,
    #[serde(default)]
    pub type_id: u32,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub rating_deviation: Option<f64>,
    #[serde(default)]
    pub volatility: Option<f64>,
}

impl Validate for CatalogPuzzle {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_fen(&self.fen1) {
            errors.add("fen1", e);
        } else {
            let side = self
                .fen1
                .split_whitespace()
                .nth(1)
                .and_then(Side::from_fen_field);
            if side != Some(self.color) {
                let mut err = ValidationError::new("color_mismatch");
                err.message = Some("color must match the side to move in fen1".into());
                errors.add("color", err);
            }
        }

        if let Err(e) = validate_fen(&self.fen2) {
            errors.add("fen2", e);
        }

        for (field, value) in [("move1", &self.move1), ("move2", &self.move2)] {
            if value.trim().is_empty() {
                let mut err = ValidationError::new("move_empty");
                err.message = Some(format!("{field} must not be empty").into());
                errors.add(field, err);
            }
        }

        if self.rating.is_some_and(|r| !r.is_finite()) {
            errors.add("rating", ValidationError::new("rating_not_finite"));
        }
        if self
            .rating_deviation
            .is_some_and(|rd| !rd.is_finite() || rd <= 0.0)
        {
            errors.add("rating_deviation", ValidationError::new("deviation_not_positive"));
        }
        if self
            .volatility
            .is_some_and(|sigma| !sigma.is_finite() || sigma <= 0.0)
        {
            errors.add("volatility", ValidationError::new("volatility_not_positive"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl CatalogPuzzle {
    /// Turn the catalog row into a fresh entity, filling rating gaps from `settings`.
    pub fn into_entity(self, settings: &RatingSettings) -> PuzzleEntity {
        let defaults = settings.default_rating();
        PuzzleEntity {
            id: self.id,
            fen1: self.fen1,
            move1: self.move1,
            fen2: self.fen2,
            move2: self.move2,
            solution: self.solution,
            color: self.color,
            type_id: self.type_id,
            rating: Rating::new(
                self.rating.unwrap_or(defaults.rating),
                self.rating_deviation.unwrap_or(defaults.deviation),
                self.volatility.unwrap_or(defaults.volatility),
            ),
            solve_count: 0,
        }
    }
}
