/// Moderator grants and contestant/observer authentication.
pub mod access;
/// Answer submission and review.
pub mod answer_service;
/// Buzz and steal signals adjudicated per epoch.
pub mod buzzer_service;
/// Match registration and question-bank import.
pub mod catalog_service;
/// Join codes and password hashing for session credentials.
pub mod credentials;
/// OpenAPI documentation generation.
pub mod documentation;
/// Finish-round packages and stars.
pub mod finish_service;
/// Health check service.
pub mod health_service;
/// Lookups shared by the live-play services.
pub mod live;
/// Round and question navigation, display and timers.
pub mod navigation_service;
/// Buzzer, overlay and guest media toggles.
pub mod presentation_service;
/// Public read model for displays.
pub mod public_service;
/// Decisions, manual edits, undo and the scoreboard.
pub mod scoring_service;
/// Session lifecycle and moderator snapshot.
pub mod session_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events subscription service.
pub mod sse_service;
/// Live store connection supervisor.
pub mod storage_supervisor;

#[cfg(test)]
mod test_support;
