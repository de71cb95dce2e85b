//! Authorization seams: moderator grants and contestant/observer credentials.

use serde::Serialize;
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::ModeratorGrant,
    dao::models::SessionStatus,
    error::ServiceError,
    services::credentials::{join_code_matches, verify_password},
    state::SharedState,
};

/// Moderator authorization check consulted by every write route.
pub trait AccessControl: Send + Sync {
    /// Whether `token` may drive `match_id`.
    fn is_moderator(&self, token: &str, match_id: Uuid) -> bool;
}

/// Static grants from the configuration file.
pub struct ConfigAccessControl {
    grants: Vec<ModeratorGrant>,
}

impl ConfigAccessControl {
    /// Grant access to the configured tokens.
    pub fn new(grants: Vec<ModeratorGrant>) -> Self {
        Self { grants }
    }
}

impl AccessControl for ConfigAccessControl {
    fn is_moderator(&self, token: &str, match_id: Uuid) -> bool {
        self.grants.iter().any(|grant| {
            grant.token == token && (grant.matches.is_empty() || grant.matches.contains(&match_id))
        })
    }
}

/// Who an SSE subscriber authenticated as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ViewerRole {
    /// Holder of a moderator token.
    Moderator,
    /// Seated player.
    Contestant,
    /// Read-only guest display or spectator.
    Observer,
}

impl ViewerRole {
    /// Wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            ViewerRole::Moderator => "moderator",
            ViewerRole::Contestant => "contestant",
            ViewerRole::Observer => "observer",
        }
    }
}

/// Contestant resolved from session credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contestant {
    /// Match the credentials were issued for.
    pub match_id: Uuid,
    /// Seat identity of the caller.
    pub player_id: Uuid,
}

const CREDENTIALS_REJECTED: &str = "invalid session credentials";

/// Resolve a contestant from the join code, contestant password and seat identity.
pub async fn authenticate_contestant(
    state: &SharedState,
    match_id: Uuid,
    join_code: &str,
    password: &str,
    player_id: Uuid,
) -> Result<Contestant, ServiceError> {
    let role = authenticate_viewer(state, match_id, join_code, password).await?;
    if role != ViewerRole::Contestant {
        return Err(ServiceError::Unauthorized(CREDENTIALS_REJECTED.into()));
    }

    let store = state.require_store().await?;
    let players = store.list_players(match_id).await?;
    if !players.iter().any(|player| player.id == player_id) {
        debug!(%match_id, %player_id, "contestant identity not seated in match");
        return Err(ServiceError::Unauthorized(CREDENTIALS_REJECTED.into()));
    }

    Ok(Contestant {
        match_id,
        player_id,
    })
}

/// Resolve the role a join code and password grant on a running session.
pub async fn authenticate_viewer(
    state: &SharedState,
    match_id: Uuid,
    join_code: &str,
    password: &str,
) -> Result<ViewerRole, ServiceError> {
    let session = state.session(match_id).await?;
    let credentials = match (&session.status, &session.credentials) {
        (SessionStatus::Running, Some(credentials)) => credentials,
        _ => return Err(ServiceError::Unauthorized("session is not open".into())),
    };

    if !join_code_matches(credentials, join_code) {
        return Err(ServiceError::Unauthorized(CREDENTIALS_REJECTED.into()));
    }

    if verify_password(
        &credentials.salt,
        password,
        &credentials.contestant_password_hash,
    ) {
        Ok(ViewerRole::Contestant)
    } else if verify_password(&credentials.salt, password, &credentials.observer_password_hash) {
        Ok(ViewerRole::Observer)
    } else {
        Err(ServiceError::Unauthorized(CREDENTIALS_REJECTED.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_without_matches_covers_every_match() {
        let access = ConfigAccessControl::new(vec![
            ModeratorGrant {
                token: "global".into(),
                matches: Vec::new(),
            },
            ModeratorGrant {
                token: "scoped".into(),
                matches: vec![Uuid::nil()],
            },
        ]);

        assert!(access.is_moderator("global", Uuid::new_v4()));
        assert!(access.is_moderator("scoped", Uuid::nil()));
        assert!(!access.is_moderator("scoped", Uuid::new_v4()));
        assert!(!access.is_moderator("unknown", Uuid::nil()));
    }
}
