//! Shared fixtures for the service tests: an in-memory store with a seated, imported match.

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        live_store::{LiveStore, memory::MemoryLiveStore},
        models::RoundKind,
    },
    dto::{
        common::PlayerView,
        moderator::{ImportQuestionsRequest, PlayerInput, QuestionRow, RegisterMatchRequest},
    },
    services::{access::ConfigAccessControl, catalog_service, session_service},
    state::{AppState, SharedState},
};

/// Registered match with four seats over the in-memory store.
pub struct Fixture {
    pub state: SharedState,
    /// Concrete store behind `state`, for failure injection.
    pub store: Arc<MemoryLiveStore>,
    pub match_id: Uuid,
    /// Seated players ordered by seat.
    pub players: Vec<PlayerView>,
}

/// Import row with the given code and payload.
pub fn row(code: &str, text: &str, answer: &str) -> QuestionRow {
    QuestionRow {
        code: code.into(),
        text: text.into(),
        answer: answer.into(),
        media_url: None,
        value: None,
    }
}

/// Player id of a seat.
pub fn seat(fixture: &Fixture, seat: u8) -> Uuid {
    fixture.players[usize::from(seat - 1)].id
}

/// A question of every kind, with six pool items per finish tier.
pub fn standard_rows() -> Vec<QuestionRow> {
    let mut rows = vec![
        row("KD1-1", "Seat one, first", "one"),
        row("KD1-2", "Seat one, second", "two"),
        row("KD2-1", "Seat two, first", "three"),
        row("KD2-2", "Seat two, second", "four"),
        row("KD3-1", "Seat three, first", "five"),
        row("KD4-1", "Seat four, first", "six"),
        row("DKA-1", "Common one", "seven"),
        row("DKA-2", "Common two", "eight"),
        row("VCNV-1", "Clue one", "red"),
        row("VCNV-2", "Clue two", "green"),
        row("VCNV-3", "Clue three", "blue"),
        row("VCNV-4", "Clue four", "white"),
        row("CNV", "Keyword", "flag"),
        row("TT-1", "Capital of Vietnam", "Hà Nội|Ha Noi"),
        row("TT-2", "Speed two", "nine"),
        row("TT-3", "Speed three", "ten"),
        row("TT-4", "Speed four", "eleven"),
    ];
    for value in [20, 30] {
        for n in 1..=6 {
            rows.push(row(
                &format!("VD-{value}-{n}"),
                &format!("Pool {value} question {n}"),
                &format!("answer {value}/{n}"),
            ));
        }
    }
    rows
}

impl Fixture {
    /// Four seated players and a pending session, no questions.
    pub async fn registered() -> Self {
        let store = Arc::new(MemoryLiveStore::new());
        let state = AppState::new(
            AppConfig::default(),
            Arc::new(ConfigAccessControl::new(Vec::new())),
        );
        state.install_store(store.clone()).await;

        let response = catalog_service::register_match(
            &state,
            RegisterMatchRequest {
                name: "Weekly final".into(),
                players: (1..=4)
                    .map(|seat| PlayerInput {
                        seat,
                        display_name: format!("Player {seat}"),
                    })
                    .collect(),
            },
        )
        .await
        .unwrap();

        let mut players = response.players;
        players.sort_by_key(|player| player.seat);

        Self {
            state,
            store,
            match_id: response.id,
            players,
        }
    }

    /// Standard question set imported and the session running.
    pub async fn running() -> Self {
        let fixture = Self::registered().await;
        catalog_service::import_questions(
            &fixture.state,
            fixture.match_id,
            ImportQuestionsRequest {
                rows: standard_rows(),
            },
        )
        .await
        .unwrap();
        session_service::open_session(&fixture.state, fixture.match_id)
            .await
            .unwrap();
        fixture
    }

    /// Catalog identifier of the question with `code`.
    pub async fn question_id(&self, code: &str) -> Uuid {
        let catalog = self.state.catalog(self.match_id).await.unwrap();
        catalog
            .entries()
            .iter()
            .find(|entry| entry.question.code == code)
            .map(|entry| entry.question.id)
            .unwrap_or_else(|| panic!("no question {code}"))
    }

    /// Stored round total of a player.
    pub async fn points(&self, player_id: Uuid, round: RoundKind) -> i32 {
        self.store
            .list_scores(self.match_id)
            .await
            .unwrap()
            .into_iter()
            .find(|score| score.player_id == player_id && score.round == round)
            .map(|score| score.points)
            .unwrap_or(0)
    }
}
