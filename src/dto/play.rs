//! DTO definitions used by contestant routes.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::dto::validation::{validate_not_blank, validate_package_values};

/// Signal a contestant device can send.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Buzz,
    Steal,
    /// Self-test; published but never adjudicated.
    Trial,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignalRequest {
    pub kind: SignalKind,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SignalResponse {
    /// First signal of the current epoch.
    pub won: bool,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SubmitAnswerRequest {
    #[validate(length(max = 500), custom(function = "validate_not_blank"))]
    pub text: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitAnswerResponse {
    pub answer_id: Uuid,
    /// Milliseconds since the question was last (re)displayed.
    pub response_time_ms: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SelectPackageRequest {
    /// Three values, each 20 or 30, in slot order.
    #[validate(custom(function = "validate_package_values"))]
    pub values: Vec<u8>,
}

#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct PackageSlotView {
    pub question_id: Uuid,
    pub code: String,
    pub value: u8,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PackageResponse {
    pub slots: Vec<PackageSlotView>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeclareStarRequest {
    pub question_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StarResponse {
    pub star_id: Uuid,
    pub question_id: Uuid,
}
