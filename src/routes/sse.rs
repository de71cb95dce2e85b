use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use serde::Deserialize;
use tracing::info;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    error::AppError,
    routes::moderator::MODERATOR_TOKEN_HEADER,
    services::sse_service::{self, StreamCredentials},
    state::SharedState,
};

/// Session credentials accepted on the query string, since `EventSource` cannot set headers.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StreamQuery {
    /// Session join code.
    pub code: Option<String>,
    /// Contestant or observer password.
    pub password: Option<String>,
}

#[utoipa::path(
    get,
    path = "/sse/matches/{match_id}",
    tag = "sse",
    params(
        ("match_id" = Uuid, Path, description = "Match identifier"),
        ("X-Moderator-Token" = String, Header, description = "Moderator token, instead of code and password"),
        StreamQuery
    ),
    responses(
        (status = 200, description = "Change stream of the match", content_type = "text/event-stream", body = String),
        (status = 401, description = "Missing or invalid credentials")
    )
)]
/// Stream every committed change of a match, preceded by a handshake.
pub async fn match_stream(
    State(state): State<SharedState>,
    Path(match_id): Path<Uuid>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let moderator_token = headers
        .get(MODERATOR_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_owned());

    let credentials = match (moderator_token, query.code, query.password) {
        (Some(token), _, _) => StreamCredentials::Moderator(token),
        (None, Some(join_code), Some(password)) => StreamCredentials::Session {
            join_code,
            password,
        },
        _ => {
            return Err(AppError::Unauthorized(
                "provide a moderator token or the join code and password".into(),
            ));
        }
    };

    let subscription = sse_service::subscribe(&state, match_id, credentials).await?;
    info!(%match_id, role = subscription.role.as_str(), "new SSE connection");
    Ok(sse_service::to_sse_stream(state, subscription).await)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/matches/{match_id}", get(match_stream))
}
