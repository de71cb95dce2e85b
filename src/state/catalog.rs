//! Per-match question catalog.
//!
//! Codes are parsed once into [`QuestionCode`] when the catalog is built, so the rest of
//! the engine matches on a tagged union instead of re-reading prefixes.

use std::{
    fmt,
    str::FromStr,
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::{QuestionEntity, RoundKind};

/// Meta key set on obstacle sub-clues once opened.
pub const META_RESOLVED: &str = "resolved";
/// Meta key holding the pool item drawn into a finish slot.
pub const META_POOL_ITEM: &str = "pool_item_id";

/// Number of obstacle sub-clues.
pub const OBSTACLE_CLUES: u8 = 4;
/// Finish-round slots per seat.
pub const FINISH_SLOTS: u8 = 3;
/// Highest seat number.
pub const MAX_SEAT: u8 = 4;

/// Round classification of a question code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuestionCode {
    /// `KD{seat}-{n}`
    OpeningPersonal {
        /// Seat the question is addressed to.
        seat: u8,
        /// Order within the seat.
        number: u32,
    },
    /// `DKA-{n}`
    OpeningCommon {
        /// Order within the common pool.
        number: u32,
    },
    /// `VCNV-{1..4}`
    ObstacleClue {
        /// Clue index, 1 to 4.
        index: u8,
    },
    /// `CNV` or `CNV-{n}`
    ObstacleKeyword,
    /// `TT-{n}` or `TT{n}`
    Speed {
        /// Question number.
        number: u32,
    },
    /// `VD{seat}-{slot}`, generated per seat.
    FinishSlot {
        /// Owning seat.
        seat: u8,
        /// Slot 1 to 3.
        slot: u8,
    },
    /// `VD-{20|30}-{n}`, drawn into slots.
    FinishPool {
        /// Point value.
        value: u8,
        /// Order within the value bucket.
        number: u32,
    },
}

/// Why a question code was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    /// Blank code.
    #[error("empty question code")]
    Empty,
    /// Prefix matches no round.
    #[error("unknown question code prefix in `{0}`")]
    UnknownPrefix(String),
    /// Known prefix, unparsable numbers.
    #[error("malformed question code `{0}`")]
    Malformed(String),
    /// Seat outside 1 to 4.
    #[error("seat out of range in `{0}`")]
    Seat(String),
}

impl QuestionCode {
    /// Round the code belongs to.
    pub fn round(&self) -> RoundKind {
        match self {
            QuestionCode::OpeningPersonal { .. } | QuestionCode::OpeningCommon { .. } => {
                RoundKind::Opening
            }
            QuestionCode::ObstacleClue { .. } | QuestionCode::ObstacleKeyword => {
                RoundKind::Obstacle
            }
            QuestionCode::Speed { .. } => RoundKind::Speed,
            QuestionCode::FinishSlot { .. } | QuestionCode::FinishPool { .. } => RoundKind::Finish,
        }
    }

    /// Seat owning a personal question.
    pub fn seat(&self) -> Option<u8> {
        match self {
            QuestionCode::OpeningPersonal { seat, .. } | QuestionCode::FinishSlot { seat, .. } => {
                Some(*seat)
            }
            _ => None,
        }
    }

    /// Questions opened to everyone, where the buzz winner becomes the target.
    pub fn locks_on_buzz(&self) -> bool {
        matches!(
            self,
            QuestionCode::OpeningCommon { .. }
                | QuestionCode::ObstacleClue { .. }
                | QuestionCode::ObstacleKeyword
        )
    }

    /// Questions whose target is cleared on every landing.
    pub fn is_common(&self) -> bool {
        self.locks_on_buzz() || matches!(self, QuestionCode::Speed { .. })
    }
}

fn number(raw: &str, code: &str) -> Result<u32, CodeError> {
    match raw.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(CodeError::Malformed(code.to_string())),
    }
}

fn seat(raw: &str, code: &str) -> Result<u8, CodeError> {
    match raw.parse::<u8>() {
        Ok(n) if (1..=MAX_SEAT).contains(&n) => Ok(n),
        Ok(_) => Err(CodeError::Seat(code.to_string())),
        Err(_) => Err(CodeError::Malformed(code.to_string())),
    }
}

impl FromStr for QuestionCode {
    type Err = CodeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let code = raw.trim().to_ascii_uppercase();
        if code.is_empty() {
            return Err(CodeError::Empty);
        }
        let malformed = || CodeError::Malformed(code.clone());

        if let Some(rest) = code.strip_prefix("VCNV-") {
            let index = rest.parse::<u8>().map_err(|_| malformed())?;
            if !(1..=OBSTACLE_CLUES).contains(&index) {
                return Err(malformed());
            }
            return Ok(QuestionCode::ObstacleClue { index });
        }
        if let Some(rest) = code.strip_prefix("CNV") {
            return match rest.strip_prefix('-') {
                None if rest.is_empty() => Ok(QuestionCode::ObstacleKeyword),
                Some(n) => number(n, &code).map(|_| QuestionCode::ObstacleKeyword),
                None => Err(malformed()),
            };
        }
        if let Some(rest) = code.strip_prefix("DKA-") {
            return Ok(QuestionCode::OpeningCommon {
                number: number(rest, &code)?,
            });
        }
        if let Some(rest) = code.strip_prefix("KD") {
            let (s, n) = rest.split_once('-').ok_or_else(malformed)?;
            return Ok(QuestionCode::OpeningPersonal {
                seat: seat(s, &code)?,
                number: number(n, &code)?,
            });
        }
        if let Some(rest) = code.strip_prefix("TT") {
            let rest = rest.strip_prefix('-').unwrap_or(rest);
            return Ok(QuestionCode::Speed {
                number: number(rest, &code)?,
            });
        }
        if let Some(rest) = code.strip_prefix("VD-") {
            let (v, n) = rest.split_once('-').ok_or_else(malformed)?;
            let value = match v {
                "20" => 20,
                "30" => 30,
                _ => return Err(malformed()),
            };
            return Ok(QuestionCode::FinishPool {
                value,
                number: number(n, &code)?,
            });
        }
        if let Some(rest) = code.strip_prefix("VD") {
            let (s, n) = rest.split_once('-').ok_or_else(malformed)?;
            let slot = n.parse::<u8>().map_err(|_| malformed())?;
            if !(1..=FINISH_SLOTS).contains(&slot) {
                return Err(malformed());
            }
            return Ok(QuestionCode::FinishSlot {
                seat: seat(s, &code)?,
                slot,
            });
        }

        Err(CodeError::UnknownPrefix(code))
    }
}

impl fmt::Display for QuestionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionCode::OpeningPersonal { seat, number } => write!(f, "KD{seat}-{number}"),
            QuestionCode::OpeningCommon { number } => write!(f, "DKA-{number}"),
            QuestionCode::ObstacleClue { index } => write!(f, "VCNV-{index}"),
            QuestionCode::ObstacleKeyword => f.write_str("CNV"),
            QuestionCode::Speed { number } => write!(f, "TT-{number}"),
            QuestionCode::FinishSlot { seat, slot } => write!(f, "VD{seat}-{slot}"),
            QuestionCode::FinishPool { value, number } => write!(f, "VD-{value}-{number}"),
        }
    }
}

/// Question with its parsed code.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    /// Stored question.
    pub question: QuestionEntity,
    /// Parsed form of `question.code`.
    pub code: QuestionCode,
}

impl CatalogEntry {
    /// Whether an obstacle sub-clue has been opened.
    pub fn is_resolved(&self) -> bool {
        self.question
            .meta
            .get(META_RESOLVED)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Direction for question traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Towards the end of the match.
    Next,
    /// Towards the start of the match.
    Previous,
}

/// Ordered questions of one match, grouped by round.
#[derive(Debug, Clone)]
pub struct MatchCatalog {
    /// Match the questions belong to.
    pub match_id: Uuid,
    entries: Vec<CatalogEntry>,
}

impl MatchCatalog {
    /// Parse every code and order the questions by round and position.
    pub fn build(match_id: Uuid, questions: Vec<QuestionEntity>) -> Result<Self, CodeError> {
        let mut entries = questions
            .into_iter()
            .map(|question| {
                let code = question.code.parse::<QuestionCode>()?;
                Ok(CatalogEntry { question, code })
            })
            .collect::<Result<Vec<_>, CodeError>>()?;
        entries.sort_by_key(|entry| (entry.question.round.index(), entry.question.position));
        Ok(Self { match_id, entries })
    }

    /// Every entry in play order.
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Entry of a question.
    pub fn get(&self, question_id: Uuid) -> Option<&CatalogEntry> {
        self.entries
            .iter()
            .find(|entry| entry.question.id == question_id)
    }

    /// Questions of a round in play order.
    pub fn round(&self, round: RoundKind) -> impl Iterator<Item = &CatalogEntry> {
        self.entries
            .iter()
            .filter(move |entry| entry.question.round == round)
    }

    /// Neighbour of `question_id` inside its round.
    pub fn neighbour(&self, question_id: Uuid, direction: Direction) -> Option<&CatalogEntry> {
        let current = self.get(question_id)?;
        let round: Vec<&CatalogEntry> = self.round(current.question.round).collect();
        let index = round
            .iter()
            .position(|entry| entry.question.id == question_id)?;
        match direction {
            Direction::Next => round.get(index + 1).copied(),
            Direction::Previous => index.checked_sub(1).and_then(|i| round.get(i).copied()),
        }
    }

    /// Zero-based index of a question inside its round.
    pub fn index_in_round(&self, question_id: Uuid) -> Option<usize> {
        let current = self.get(question_id)?;
        self.round(current.question.round)
            .position(|entry| entry.question.id == question_id)
    }

    /// The finish slots of a seat, ordered by slot.
    pub fn finish_slots(&self, seat: u8) -> Vec<&CatalogEntry> {
        let mut slots: Vec<&CatalogEntry> = self
            .entries
            .iter()
            .filter(|entry| matches!(entry.code, QuestionCode::FinishSlot { seat: s, .. } if s == seat))
            .collect();
        slots.sort_by_key(|entry| match entry.code {
            QuestionCode::FinishSlot { slot, .. } => slot,
            _ => 0,
        });
        slots
    }

    /// Obstacle sub-clues, ordered by clue index.
    pub fn obstacle_clues(&self) -> Vec<&CatalogEntry> {
        let mut clues: Vec<&CatalogEntry> = self
            .entries
            .iter()
            .filter(|entry| matches!(entry.code, QuestionCode::ObstacleClue { .. }))
            .collect();
        clues.sort_by_key(|entry| match entry.code {
            QuestionCode::ObstacleClue { index } => index,
            _ => 0,
        });
        clues
    }
}

/// Short-lived per-match catalog cache. Every write path calls [`CatalogCache::invalidate`].
pub struct CatalogCache {
    ttl: Duration,
    entries: DashMap<Uuid, (Instant, Arc<MatchCatalog>)>,
}

impl CatalogCache {
    /// Empty cache serving entries for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Cached catalog, if still fresh.
    pub fn get(&self, match_id: Uuid) -> Option<Arc<MatchCatalog>> {
        let entry = self.entries.get(&match_id)?;
        let (loaded_at, catalog) = entry.value();
        (loaded_at.elapsed() < self.ttl).then(|| catalog.clone())
    }

    /// Store a freshly built catalog.
    pub fn put(&self, catalog: Arc<MatchCatalog>) {
        self.entries
            .insert(catalog.match_id, (Instant::now(), catalog));
    }

    /// Drop the cached catalog of a match.
    pub fn invalidate(&self, match_id: Uuid) {
        self.entries.remove(&match_id);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn question(match_id: Uuid, code: &str, round: RoundKind, position: u32) -> QuestionEntity {
        QuestionEntity {
            id: Uuid::new_v4(),
            match_id,
            round,
            position,
            code: code.into(),
            text: format!("text {code}"),
            answer: format!("answer {code}"),
            media_url: None,
            target_player: None,
            value: None,
            meta: BTreeMap::new(),
        }
    }

    #[test]
    fn parses_every_prefix() {
        assert_eq!(
            "kd2-3".parse(),
            Ok(QuestionCode::OpeningPersonal { seat: 2, number: 3 })
        );
        assert_eq!("DKA-7".parse(), Ok(QuestionCode::OpeningCommon { number: 7 }));
        assert_eq!("VCNV-4".parse(), Ok(QuestionCode::ObstacleClue { index: 4 }));
        assert_eq!("CNV".parse(), Ok(QuestionCode::ObstacleKeyword));
        assert_eq!("CNV-1".parse(), Ok(QuestionCode::ObstacleKeyword));
        assert_eq!("TT-2".parse(), Ok(QuestionCode::Speed { number: 2 }));
        assert_eq!("TT12".parse(), Ok(QuestionCode::Speed { number: 12 }));
        assert_eq!(
            "VD-30-5".parse(),
            Ok(QuestionCode::FinishPool { value: 30, number: 5 })
        );
        assert_eq!("VD3-2".parse(), Ok(QuestionCode::FinishSlot { seat: 3, slot: 2 }));
    }

    #[test]
    fn rejects_malformed_codes() {
        assert!(matches!("KD5-1".parse::<QuestionCode>(), Err(CodeError::Seat(_))));
        assert!(matches!("VCNV-5".parse::<QuestionCode>(), Err(CodeError::Malformed(_))));
        assert!(matches!("VD-25-1".parse::<QuestionCode>(), Err(CodeError::Malformed(_))));
        assert!(matches!("VD1-4".parse::<QuestionCode>(), Err(CodeError::Malformed(_))));
        assert!(matches!("CNVX".parse::<QuestionCode>(), Err(CodeError::Malformed(_))));
        assert!(matches!("XYZ-1".parse::<QuestionCode>(), Err(CodeError::UnknownPrefix(_))));
        assert_eq!("  ".parse::<QuestionCode>(), Err(CodeError::Empty));
    }

    #[test]
    fn display_round_trips_canonical_codes() {
        for raw in ["KD1-2", "DKA-3", "VCNV-1", "CNV", "TT-4", "VD2-3", "VD-20-9"] {
            let code: QuestionCode = raw.parse().unwrap();
            assert_eq!(code.to_string(), raw);
        }
    }

    #[test]
    fn neighbour_stays_inside_round() {
        let m = Uuid::new_v4();
        let a = question(m, "KD1-1", RoundKind::Opening, 1);
        let b = question(m, "KD2-1", RoundKind::Opening, 2);
        let c = question(m, "VCNV-1", RoundKind::Obstacle, 1);
        let catalog =
            MatchCatalog::build(m, vec![c.clone(), b.clone(), a.clone()]).unwrap();

        assert_eq!(
            catalog.neighbour(a.id, Direction::Next).map(|e| e.question.id),
            Some(b.id)
        );
        assert!(catalog.neighbour(b.id, Direction::Next).is_none());
        assert!(catalog.neighbour(a.id, Direction::Previous).is_none());
        assert_eq!(catalog.index_in_round(c.id), Some(0));
    }

    #[test]
    fn build_rejects_unknown_code() {
        let m = Uuid::new_v4();
        let bad = question(m, "ZZ-1", RoundKind::Opening, 1);
        assert!(MatchCatalog::build(m, vec![bad]).is_err());
    }

    #[test]
    fn cache_expires_and_invalidates() {
        let m = Uuid::new_v4();
        let catalog = Arc::new(MatchCatalog::build(m, Vec::new()).unwrap());

        let cache = CatalogCache::new(Duration::from_secs(60));
        cache.put(catalog.clone());
        assert!(cache.get(m).is_some());
        cache.invalidate(m);
        assert!(cache.get(m).is_none());

        let stale = CatalogCache::new(Duration::ZERO);
        stale.put(catalog);
        assert!(stale.get(m).is_none());
    }
}
