use serde::Serialize;
use utoipa::ToSchema;

use crate::rating::Rating;

/// Public rating triple of a user.
#[derive(Debug, Serialize, ToSchema)]
pub struct RatingResponse {
    pub rating: f64,
    pub rating_deviation: f64,
    pub volatility: f64,
}

impl From<Rating> for RatingResponse {
    fn from(value: Rating) -> Self {
        Self {
            rating: value.rating,
            rating_deviation: value.deviation,
            volatility: value.volatility,
        }
    }
}
