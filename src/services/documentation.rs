use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Balderdash Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::session::get_session,
        crate::routes::session::launch,
        crate::routes::session::kick,
        crate::routes::round::submit_prompt,
        crate::routes::round::submit_guess,
        crate::routes::round::close_guessing,
        crate::routes::round::submit_marks,
        crate::routes::round::submit_groups,
        crate::routes::round::read_next,
        crate::routes::round::read_skip,
        crate::routes::round::submit_vote,
        crate::routes::round::reveal,
        crate::routes::round::proceed,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::session::KickRequest,
            crate::dto::round::PromptRequest,
            crate::dto::round::GuessRequest,
            crate::dto::round::MarksRequest,
            crate::dto::round::GroupsRequest,
            crate::dto::round::VoteRequest,
            crate::dto::round::RevealRequest,
            crate::state::session::Session,
            crate::state::session::Round,
            crate::state::session::Guess,
            crate::state::session::ReadOut,
            crate::state::session::SessionState,
            crate::state::session::RoundState,
            crate::state::session::ClientType,
            crate::state::scoring::ScoringPolicy,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "session", description = "Session lookup, launch and moderation"),
        (name = "round", description = "Round actions driving the state machine"),
    )
)]
pub struct ApiDoc;
