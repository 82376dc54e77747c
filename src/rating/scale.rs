//! Conversion between the public rating scale and the internal Glicko-2 scale.

/// Ratio between one internal unit and one public rating point.
pub const GLICKO2_SCALE: f64 = 173.7178;
/// Public rating that maps to `mu = 0`.
pub const RATING_CENTER: f64 = 1500.0;

/// Rating and deviation expressed on the zero-centred Glicko-2 scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InternalRating {
    /// Rating offset from 1500 in internal units.
    pub mu: f64,
    /// Deviation in internal units.
    pub phi: f64,
}

/// Map a public `(rating, deviation)` pair to `(mu, phi)`.
pub fn to_glicko2_scale(rating: f64, deviation: f64) -> InternalRating {
    InternalRating {
        mu: (rating - RATING_CENTER) / GLICKO2_SCALE,
        phi: deviation / GLICKO2_SCALE,
    }
}

/// Map `(mu, phi)` back to a public `(rating, deviation)` pair.
pub fn from_glicko2_scale(internal: InternalRating) -> (f64, f64) {
    (
        internal.mu * GLICKO2_SCALE + RATING_CENTER,
        internal.phi * GLICKO2_SCALE,
    )
}
