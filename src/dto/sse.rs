use serde::Serialize;
use serde_json::{Map, Value};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Build an event from an already encoded payload.
    pub fn new(event: Option<String>, data: String) -> Self {
        Self { event, data }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Match whose changes the stream carries.
    pub match_id: Uuid,
    /// Role the credentials resolved to (`moderator`, `contestant` or `observer`).
    pub role: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Kind of entity change.
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Serialize, ToSchema)]
/// Coarse-grained entity change published after every committed mutation.
pub struct ChangeEvent {
    /// Entity name such as `session`, `question` or `score_change`.
    pub entity: String,
    pub entity_id: String,
    pub kind: ChangeKind,
    /// Flattened field payload of the entity after the change.
    #[schema(value_type = Object)]
    pub fields: Map<String, Value>,
}
