use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Tactics Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::users::get_rating,
        crate::routes::users::next_puzzle,
        crate::routes::users::get_history,
        crate::routes::solutions::record_solution,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::rating::RatingResponse,
            crate::dto::puzzle::PuzzleResponse,
            crate::dto::puzzle::Verdict,
            crate::dto::puzzle::ColorDto,
            crate::dto::history::HistoryResponse,
            crate::dto::history::JournalEntryResponse,
            crate::dto::history::DifficultyDto,
            crate::dto::solution::RecordSolutionRequest,
            crate::dto::solution::RecordSolutionResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "users", description = "Ratings, puzzle selection and attempt history"),
        (name = "solutions", description = "Attempt recording"),
    )
)]
pub struct ApiDoc;
