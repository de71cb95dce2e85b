//! Persisted entities shared by every storage backend.
//!
//! Identifiers are serialised as strings so the MongoDB documents and the JSON change
//! notifications expose the same representation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{DisplayFromStr, serde_as};
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle of a match, owned by the tournament side but mirrored here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Being prepared, not yet published.
    Draft,
    /// Published with a start time.
    Scheduled,
    /// In progress.
    Live,
    /// Played to the end.
    Finished,
    /// Called off.
    Cancelled,
}

/// The four fixed rounds of a match, in play order.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RoundKind {
    /// Warm-up round: personal questions per seat, then a common pool.
    Opening,
    /// Four sub-clues hiding a keyword.
    Obstacle,
    /// Everyone answers against the clock, ranked by speed.
    Speed,
    /// Per-player packages of 20/30 point questions with steals.
    Finish,
}

impl RoundKind {
    /// Every round in play order.
    pub const ALL: [RoundKind; 4] = [
        RoundKind::Opening,
        RoundKind::Obstacle,
        RoundKind::Speed,
        RoundKind::Finish,
    ];

    /// Zero-based play order index.
    pub fn index(self) -> usize {
        match self {
            RoundKind::Opening => 0,
            RoundKind::Obstacle => 1,
            RoundKind::Speed => 2,
            RoundKind::Finish => 3,
        }
    }

    /// Stable storage key, identical to the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            RoundKind::Opening => "opening",
            RoundKind::Obstacle => "obstacle",
            RoundKind::Speed => "speed",
            RoundKind::Finish => "finish",
        }
    }
}

/// Status of the live session attached to a match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, not yet opened to contestants.
    Pending,
    /// Open; credentials are valid.
    Running,
    /// Closed; credentials are rejected.
    Ended,
}

/// Display state of the current question.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QuestionState {
    /// Selected but not on screen (also the waiting state between seats).
    Hidden,
    /// On screen; buzzing and answering are open.
    Showing,
    /// Answer revealed; in the finish round this is the steal window.
    AnswerRevealed,
    /// Decided; nothing more to do until the moderator moves on or re-displays.
    Completed,
}

/// Kind of buzzer signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BuzzKind {
    /// Regular buzz on the current question.
    Buzz,
    /// Finish-round steal attempt.
    Steal,
    /// Epoch boundary inserted by navigation; never sent by contestants.
    Reset,
    /// Self-test signal; never persisted into an epoch.
    Trial,
}

/// Adjudication result of a buzz or steal signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BuzzResult {
    /// First valid signal of the epoch.
    Win,
    /// Arrived after the epoch was won.
    Lose,
}

/// Final outcome of a declared star.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StarOutcome {
    /// Doubled the question result.
    Applied,
    /// Declared on a question that was never decided.
    Wasted,
}

/// Origin of a ledger mutation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScoreChangeSource {
    /// Moderator decision on the current question.
    Decision,
    /// Points moved by a finish-round steal (gain or transfer).
    Steal,
    /// Relative manual adjustment.
    Manual,
    /// Absolute total override.
    SetTotal,
    /// Bulk reset of the match scores.
    Reset,
    /// Undo of an earlier change.
    Revert,
}

/// Overlay toggles shown on the guest display.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OverlayKind {
    /// Player totals.
    Scoreboard,
    /// Correct answer of the current question.
    Answer,
    /// Obstacle board with revealed tiles.
    ObstacleBoard,
    /// Round introduction card.
    Intro,
}

/// Media channel on the guest display.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaChannel {
    /// Audio playback.
    Audio,
    /// Video playback.
    Video,
}

/// Playback command for a media channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaAction {
    /// Start or resume playback.
    Play,
    /// Pause playback.
    Pause,
    /// Stop and rewind.
    Stop,
    /// Restart from the beginning.
    Restart,
}

/// Match owning rounds, players and a single session.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchEntity {
    /// Stable identifier for the match.
    #[serde_as(as = "DisplayFromStr")]
    pub id: Uuid,
    /// Human-readable name.
    pub name: String,
    /// Lifecycle status.
    pub status: MatchStatus,
    /// Creation time, unix milliseconds.
    pub created_at: i64,
    /// Last modification time, unix milliseconds.
    pub updated_at: i64,
}

/// Contestant seated in a match.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerEntity {
    /// Stable identifier for the player.
    #[serde_as(as = "DisplayFromStr")]
    pub id: Uuid,
    /// Match the player is seated in.
    #[serde_as(as = "DisplayFromStr")]
    pub match_id: Uuid,
    /// Seat number, 1 to 4, unique per match.
    pub seat: u8,
    /// Name shown on displays.
    pub display_name: String,
    /// Excluded from the rest of the obstacle round after a wrong guess.
    #[serde(default)]
    pub is_disqualified_obstacle: bool,
}

/// Round-scoped question. Payload is fixed at import, except for finish slots which
/// receive theirs from package selection.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionEntity {
    /// Stable identifier for the question.
    #[serde_as(as = "DisplayFromStr")]
    pub id: Uuid,
    /// Match owning the question.
    #[serde_as(as = "DisplayFromStr")]
    pub match_id: Uuid,
    /// Round the question belongs to.
    pub round: RoundKind,
    /// Order inside the round.
    pub position: u32,
    /// Code of the question inside the round, such as `KD1-2`.
    pub code: String,
    /// Question text.
    pub text: String,
    /// Expected answer.
    pub answer: String,
    /// Optional image, audio or video resource.
    #[serde(default)]
    pub media_url: Option<String>,
    /// Seat the question is addressed to, for personal and package questions.
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub target_player: Option<Uuid>,
    /// Point value, finish round only.
    #[serde(default)]
    pub value: Option<u8>,
    /// Free-form import metadata, such as the obstacle keyword.
    #[serde(default)]
    pub meta: BTreeMap<String, Value>,
}

/// Finish-round pool question, drawn into player slots.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolItemEntity {
    /// Stable identifier for the pool item.
    #[serde_as(as = "DisplayFromStr")]
    pub id: Uuid,
    /// Match owning the pool.
    #[serde_as(as = "DisplayFromStr")]
    pub match_id: Uuid,
    /// Code of the pool item, such as `VD-20-3`.
    pub code: String,
    /// Point value, 20 or 30.
    pub value: u8,
    /// Question text.
    pub text: String,
    /// Expected answer.
    pub answer: String,
    /// Optional image, audio or video resource.
    #[serde(default)]
    pub media_url: Option<String>,
}

/// Overlay flags of the guest display.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct OverlayFlags {
    /// Scoreboard overlay.
    pub scoreboard: bool,
    /// Answer overlay.
    pub answer: bool,
    /// Obstacle board overlay.
    pub obstacle_board: bool,
    /// Round intro overlay.
    pub intro: bool,
}

impl OverlayFlags {
    /// Set a single overlay flag.
    pub fn set(&mut self, kind: OverlayKind, enabled: bool) {
        match kind {
            OverlayKind::Scoreboard => self.scoreboard = enabled,
            OverlayKind::Answer => self.answer = enabled,
            OverlayKind::ObstacleBoard => self.obstacle_board = enabled,
            OverlayKind::Intro => self.intro = enabled,
        }
    }
}

/// Last command issued on a media channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct MediaCommand {
    /// Monotonically increasing per channel so displays can skip replays.
    pub command_id: i64,
    /// Action to perform.
    pub action: MediaAction,
    /// Issue time, unix milliseconds.
    pub issued_at: i64,
}

/// Per-channel media command envelope.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct GuestMediaControl {
    /// Latest audio command.
    pub audio: Option<MediaCommand>,
    /// Latest video command.
    pub video: Option<MediaCommand>,
}

impl GuestMediaControl {
    /// Command slot of a channel.
    pub fn channel_mut(&mut self, channel: MediaChannel) -> &mut Option<MediaCommand> {
        match channel {
            MediaChannel::Audio => &mut self.audio,
            MediaChannel::Video => &mut self.video,
        }
    }
}

/// Salted password hashes rotated on every session open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionCredentials {
    /// Short code contestants and observers join with.
    pub join_code: String,
    /// Hex salt shared by both password hashes.
    pub salt: String,
    /// SHA-256 of salt and contestant password.
    pub contestant_password_hash: String,
    /// SHA-256 of salt and observer password.
    pub observer_password_hash: String,
}

/// Live session of a match: the single versioned aggregate behind every transition.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionEntity {
    /// Stable identifier for the session.
    #[serde_as(as = "DisplayFromStr")]
    pub id: Uuid,
    /// Match owning the session.
    #[serde_as(as = "DisplayFromStr")]
    pub match_id: Uuid,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Bumped by every committed transition.
    pub version: i64,
    /// Round being played.
    #[serde(default)]
    pub current_round: Option<RoundKind>,
    /// Question selected by the moderator.
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub current_question: Option<Uuid>,
    /// Display state of the current question.
    pub question_state: QuestionState,
    /// Unix milliseconds; answers are rejected once reached.
    #[serde(default)]
    pub timer_deadline: Option<i64>,
    /// Whether contestants may buzz.
    pub buzzer_enabled: bool,
    /// Overlay toggles of the guest display.
    #[serde(default)]
    pub overlays: OverlayFlags,
    /// Latest media commands of the guest display.
    #[serde(default)]
    pub guest_media_control: GuestMediaControl,
    /// Credentials of the current opening, cleared on end.
    #[serde(default)]
    pub credentials: Option<SessionCredentials>,
    /// Players already decided on the current question.
    #[serde_as(as = "Vec<DisplayFromStr>")]
    #[serde(default)]
    pub decided_players: Vec<Uuid>,
    /// Speed-round ranks already awarded on the current question.
    #[serde(default)]
    pub awarded_ranks: u32,
    /// Last transition time, unix milliseconds.
    pub updated_at: i64,
}

impl SessionEntity {
    /// Fresh pending session for a match.
    pub fn pending(match_id: Uuid, now: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            match_id,
            status: SessionStatus::Pending,
            version: 0,
            current_round: None,
            current_question: None,
            question_state: QuestionState::Hidden,
            timer_deadline: None,
            buzzer_enabled: false,
            overlays: OverlayFlags::default(),
            guest_media_control: GuestMediaControl::default(),
            credentials: None,
            decided_players: Vec::new(),
            awarded_ranks: 0,
            updated_at: now,
        }
    }
}

/// Append-only buzzer log entry.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuzzerEventEntity {
    /// Stable identifier for the event.
    #[serde_as(as = "DisplayFromStr")]
    pub id: Uuid,
    /// Match the event belongs to.
    #[serde_as(as = "DisplayFromStr")]
    pub match_id: Uuid,
    /// Question the signal targets.
    #[serde_as(as = "DisplayFromStr")]
    pub question_id: Uuid,
    /// Absent for reset markers.
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub player_id: Option<Uuid>,
    /// Kind of signal.
    pub event_type: BuzzKind,
    /// Adjudication result, absent for markers and trials.
    #[serde(default)]
    pub result: Option<BuzzResult>,
    /// Reset marker the signal was adjudicated against.
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub epoch_id: Option<Uuid>,
    /// Arrival time, unix milliseconds.
    pub occurred_at: i64,
}

/// One answer submission.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerEntity {
    /// Stable identifier for the answer.
    #[serde_as(as = "DisplayFromStr")]
    pub id: Uuid,
    /// Match the answer belongs to.
    #[serde_as(as = "DisplayFromStr")]
    pub match_id: Uuid,
    /// Question being answered.
    #[serde_as(as = "DisplayFromStr")]
    pub question_id: Uuid,
    /// Submitting player.
    #[serde_as(as = "DisplayFromStr")]
    pub player_id: Uuid,
    /// Answer text as typed.
    pub text: String,
    /// Submission time, unix milliseconds.
    pub submitted_at: i64,
    /// Milliseconds since the latest reset marker of the question.
    #[serde(default)]
    pub response_time_ms: Option<i64>,
    /// Reset marker the answer was timed against.
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub epoch_id: Option<Uuid>,
    /// Set once the moderator has decided.
    #[serde(default)]
    pub is_correct: Option<bool>,
    /// Points granted by the decision.
    #[serde(default)]
    pub points_awarded: Option<i32>,
}

/// Key of a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScoreKey {
    /// Match of the row.
    pub match_id: Uuid,
    /// Player of the row.
    pub player_id: Uuid,
    /// Round of the row.
    pub round: RoundKind,
}

impl ScoreKey {
    /// Storage identifier of the ledger row.
    pub fn storage_id(&self) -> String {
        format!("{}:{}:{}", self.match_id, self.player_id, self.round.as_str())
    }
}

/// Running total per (match, player, round).
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreEntity {
    /// Match of the row.
    #[serde_as(as = "DisplayFromStr")]
    pub match_id: Uuid,
    /// Player of the row.
    #[serde_as(as = "DisplayFromStr")]
    pub player_id: Uuid,
    /// Round of the row.
    pub round: RoundKind,
    /// Running total, never below zero.
    pub points: i32,
}

/// Append-only audit entry of a ledger mutation.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreChangeEntity {
    /// Stable identifier for the change.
    #[serde_as(as = "DisplayFromStr")]
    pub id: Uuid,
    /// Match of the ledger row.
    #[serde_as(as = "DisplayFromStr")]
    pub match_id: Uuid,
    /// Player of the ledger row.
    #[serde_as(as = "DisplayFromStr")]
    pub player_id: Uuid,
    /// Round of the ledger row.
    pub round: RoundKind,
    /// Question that caused the change, if any.
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub question_id: Option<Uuid>,
    /// What caused the change.
    pub source: ScoreChangeSource,
    /// Delta asked for by the caller.
    pub requested_delta: i32,
    /// Delta after clamping at zero.
    pub applied_delta: i32,
    /// Total before the change.
    pub points_before: i32,
    /// Total after the change.
    pub points_after: i32,
    /// Free-form moderator note.
    #[serde(default)]
    pub reason: Option<String>,
    /// Set on reversal entries.
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub revert_of: Option<Uuid>,
    /// Set on the original once it has been reverted.
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub reverted_by: Option<Uuid>,
    /// Creation time, unix milliseconds.
    pub created_at: i64,
}

/// Finish-round star declaration.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StarUseEntity {
    /// Stable identifier for the declaration.
    #[serde_as(as = "DisplayFromStr")]
    pub id: Uuid,
    /// Match the star belongs to.
    #[serde_as(as = "DisplayFromStr")]
    pub match_id: Uuid,
    /// Declaring player.
    #[serde_as(as = "DisplayFromStr")]
    pub player_id: Uuid,
    /// Question the star was declared on.
    #[serde_as(as = "DisplayFromStr")]
    pub question_id: Uuid,
    /// `None` while declared, immutable once set.
    #[serde(default)]
    pub outcome: Option<StarOutcome>,
    /// Declaration time, unix milliseconds.
    pub declared_at: i64,
}

/// Claim of a pool item by a player's package slot.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolReservationEntity {
    /// Match of the reservation.
    #[serde_as(as = "DisplayFromStr")]
    pub match_id: Uuid,
    /// Reserved pool item.
    #[serde_as(as = "DisplayFromStr")]
    pub pool_item_id: Uuid,
    /// Player whose package holds the item.
    #[serde_as(as = "DisplayFromStr")]
    pub player_id: Uuid,
    /// Hash of the normalised question and answer text.
    pub fingerprint: String,
}
