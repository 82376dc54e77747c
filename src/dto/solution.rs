use std::time::Duration;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dto::validation::validate_username, rating::Rating, services::attempt_recorder::AttemptInput,
};

/// Payload reporting the result of one puzzle attempt.
///
/// Every field is optional at the deserialization level so that a missing field is
/// reported as a validation failure rather than a malformed body.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordSolutionRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub puzzle_id: Option<u64>,
    /// Whether the user judged the candidate move correctly.
    #[serde(default)]
    pub success: Option<bool>,
    /// Seconds spent on the puzzle.
    #[serde(default)]
    pub time: Option<f64>,
}

impl Validate for RecordSolutionRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        match self.username.as_deref() {
            Some(username) => {
                if let Err(e) = validate_username(username) {
                    errors.add("username", e);
                }
            }
            None => errors.add("username", ValidationError::new("required")),
        }

        if self.puzzle_id.is_none() {
            errors.add("puzzleId", ValidationError::new("required"));
        }

        if self.success.is_none() {
            errors.add("success", ValidationError::new("required"));
        }

        match self.time.map(elapsed_time) {
            Some(Ok(_)) => {}
            Some(Err(err)) => errors.add("time", err),
            None => errors.add("time", ValidationError::new("required")),
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Convert seconds into a [`Duration`], rejecting negative, non-finite and overflowing values.
fn elapsed_time(seconds: f64) -> Result<Duration, ValidationError> {
    Duration::try_from_secs_f64(seconds).map_err(|_| {
        let mut err = ValidationError::new("time_range");
        err.message = Some("time must be a non-negative number of seconds".into());
        err
    })
}

impl TryFrom<RecordSolutionRequest> for AttemptInput {
    type Error = ValidationErrors;

    fn try_from(value: RecordSolutionRequest) -> Result<Self, Self::Error> {
        value.validate()?;
        match value {
            RecordSolutionRequest {
                username: Some(username),
                puzzle_id: Some(puzzle_id),
                success: Some(success),
                time: Some(time),
            } => {
                let time = elapsed_time(time).map_err(|err| {
                    let mut errors = ValidationErrors::new();
                    errors.add("time", err);
                    errors
                })?;
                Ok(AttemptInput {
                    username,
                    puzzle_id,
                    success,
                    time,
                })
            }
            _ => Err(ValidationErrors::new()),
        }
    }
}

/// Acknowledgement of a recorded attempt with the user's new rating.
#[derive(Debug, Serialize, ToSchema)]
pub struct RecordSolutionResponse {
    pub status: String,
    pub rating: f64,
    pub rating_deviation: f64,
    pub volatility: f64,
}

impl RecordSolutionResponse {
    pub fn recorded(rating: Rating) -> Self {
        Self {
            status: "ok".to_string(),
            rating: rating.rating,
            rating_deviation: rating.deviation,
            volatility: rating.volatility,
        }
    }
}
