use serde::Serialize;
use utoipa::ToSchema;

use crate::dto::common::{QuestionView, ScoreboardRow, SessionView};

/// Obstacle sub-clue as shown on the board.
#[derive(Debug, Serialize, ToSchema)]
pub struct ObstacleClueView {
    pub code: String,
    pub resolved: bool,
    /// Only present once the clue is resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

/// Read model for guest displays and contestant screens.
#[derive(Debug, Serialize, ToSchema)]
pub struct PublicStateResponse {
    pub session: SessionView,
    /// Current question; the answer is withheld until revealed or decided.
    pub current_question: Option<QuestionView>,
    pub scoreboard: Vec<ScoreboardRow>,
    pub obstacle_board: Vec<ObstacleClueView>,
    pub degraded: bool,
}
