use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::sse::{Handshake, ServerEvent},
    error::ServiceError,
    services::access::{self, ViewerRole},
    state::SharedState,
};

const EVENT_HANDSHAKE: &str = "handshake";

/// How an SSE subscriber proves who they are.
pub enum StreamCredentials {
    /// Moderator token from the `x-moderator-token` header.
    Moderator(String),
    /// Join code and contestant or observer password from the query string.
    Session {
        /// Join code printed for the session.
        join_code: String,
        /// Contestant or observer password.
        password: String,
    },
}

/// A subscription to one match's change bus, opened after authentication.
pub struct MatchSubscription {
    /// Match whose bus is being followed.
    pub match_id: Uuid,
    /// Role resolved from the credentials.
    pub role: ViewerRole,
    receiver: broadcast::Receiver<ServerEvent>,
}

/// Authenticate and subscribe to the change bus of `match_id`.
pub async fn subscribe(
    state: &SharedState,
    match_id: Uuid,
    credentials: StreamCredentials,
) -> Result<MatchSubscription, ServiceError> {
    let role = match credentials {
        StreamCredentials::Moderator(token) => {
            if !state.access().is_moderator(&token, match_id) {
                return Err(ServiceError::Unauthorized("invalid moderator token".into()));
            }
            // the match must exist even for moderators
            state.session(match_id).await?;
            ViewerRole::Moderator
        }
        StreamCredentials::Session {
            join_code,
            password,
        } => access::authenticate_viewer(state, match_id, &join_code, &password).await?,
    };

    Ok(MatchSubscription {
        match_id,
        role,
        receiver: state.events().subscribe(match_id),
    })
}

/// Convert a subscription into an SSE response. The handshake goes out first, then
/// every change published on the match bus until the client disconnects.
pub async fn to_sse_stream(
    state: SharedState,
    subscription: MatchSubscription,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let MatchSubscription {
        match_id,
        role,
        mut receiver,
    } = subscription;

    let handshake = ServerEvent::json(
        Some(EVENT_HANDSHAKE.to_string()),
        &Handshake {
            match_id,
            role: role.as_str().to_string(),
            degraded: state.is_degraded().await,
        },
    );

    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        match handshake {
            Ok(handshake) => {
                if tx.send(Ok(to_event(handshake))).await.is_err() {
                    return;
                }
            }
            Err(err) => warn!(%match_id, error = %err, "failed to serialize SSE handshake"),
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(%match_id, skipped, "SSE subscriber lagged; skipping events");
                            continue;
                        }
                    }
                }
            }
        }

        info!(%match_id, role = role.as_str(), "SSE stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_event(payload: ServerEvent) -> Event {
    let event = Event::default().data(payload.data);
    match payload.event {
        Some(name) => event.event(name),
        None => event,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{session_service, test_support::Fixture};

    #[tokio::test]
    async fn observer_password_subscribes_as_observer() {
        let fixture = Fixture::registered().await;
        let opened = session_service::open_session(&fixture.state, fixture.match_id)
            .await
            .unwrap();

        let subscription = subscribe(
            &fixture.state,
            fixture.match_id,
            StreamCredentials::Session {
                join_code: opened.join_code.clone(),
                password: opened.observer_password.clone(),
            },
        )
        .await
        .unwrap();
        assert_eq!(subscription.role, ViewerRole::Observer);

        let rejected = subscribe(
            &fixture.state,
            fixture.match_id,
            StreamCredentials::Session {
                join_code: opened.join_code,
                password: "wrong".into(),
            },
        )
        .await;
        assert!(matches!(rejected, Err(ServiceError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn stream_opens_with_a_handshake() {
        use axum::response::IntoResponse;
        use futures::StreamExt;

        let fixture = Fixture::registered().await;
        let opened = session_service::open_session(&fixture.state, fixture.match_id)
            .await
            .unwrap();
        let subscription = subscribe(
            &fixture.state,
            fixture.match_id,
            StreamCredentials::Session {
                join_code: opened.join_code,
                password: opened.contestant_password,
            },
        )
        .await
        .unwrap();

        let response = to_sse_stream(fixture.state.clone(), subscription)
            .await
            .into_response();
        let mut body = response.into_body().into_data_stream();
        let first = body.next().await.unwrap().unwrap();
        let text = String::from_utf8_lossy(&first);

        assert!(text.contains("event: handshake"));
        assert!(text.contains("\"role\":\"contestant\""));
    }

    #[tokio::test]
    async fn unknown_moderator_token_is_rejected() {
        let fixture = Fixture::registered().await;
        let result = subscribe(
            &fixture.state,
            fixture.match_id,
            StreamCredentials::Moderator("nope".into()),
        )
        .await;
        assert!(matches!(result, Err(ServiceError::Unauthorized(_))));
    }
}
