use rand::Rng;

use crate::quiz::oracle::OracleError;
use crate::quiz::score::GameResult;
use crate::quiz::{GameMode, Question, RawQuestion};

pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    Loading,
    Playing,
    Finished,
    Error,
}

/// Identifies one outstanding question request. A response is only applied to
/// the session (and attempt) that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadTicket {
    pub session: SessionId,
    pub attempt: u32,
}

/// How an option button should look given what has been picked so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionMark {
    /// Nothing picked yet.
    Neutral,
    /// Picked and right.
    Correct,
    /// Picked and wrong.
    IncorrectSelected,
    /// The right answer, shown after a wrong pick.
    RevealedCorrect,
    /// Another wrong option, after the reveal.
    Dimmed,
}

pub fn option_mark(option: &str, selected: Option<&str>, answer: &str) -> OptionMark {
    let Some(selected) = selected else {
        return OptionMark::Neutral;
    };
    match (option == answer, option == selected) {
        (true, true) => OptionMark::Correct,
        (true, false) => OptionMark::RevealedCorrect,
        (false, true) => OptionMark::IncorrectSelected,
        (false, false) => OptionMark::Dimmed,
    }
}

/// One round of the quiz, from the mode pick until the player goes back to the menu.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    mode: GameMode,
    questions: Vec<Question>,
    current_index: usize,
    score: usize,
    selected_answer: Option<String>,
    state: GameState,
    attempt: u32,
}

impl Session {
    /// Starts in `Loading`; the returned ticket belongs to the first request.
    pub fn new(id: SessionId, mode: GameMode) -> (Self, LoadTicket) {
        let session = Self {
            id,
            mode,
            questions: Vec::new(),
            current_index: 0,
            score: 0,
            selected_answer: None,
            state: GameState::Loading,
            attempt: 0,
        };
        let ticket = session.current_ticket();
        (session, ticket)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn score(&self) -> usize {
        self.score
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn total(&self) -> usize {
        self.questions.len()
    }

    pub fn selected_answer(&self) -> Option<&str> {
        self.selected_answer.as_deref()
    }

    fn current_ticket(&self) -> LoadTicket {
        LoadTicket {
            session: self.id,
            attempt: self.attempt,
        }
    }

    /// The ticket a response must carry to be accepted, if a request is outstanding.
    pub fn pending_ticket(&self) -> Option<LoadTicket> {
        match self.state {
            GameState::Loading => Some(self.current_ticket()),
            _ => None,
        }
    }

    /// Applies the outcome of a question request.
    ///
    /// Returns `false` when the ticket is stale (another attempt or another
    /// session); nothing changes in that case.
    pub fn complete_load<R: Rng + ?Sized>(
        &mut self,
        ticket: LoadTicket,
        result: Result<Vec<RawQuestion>, OracleError>,
        rng: &mut R,
    ) -> bool {
        if self.pending_ticket() != Some(ticket) {
            log::debug!(
                "Discarding stale question batch {:?} for session {}",
                ticket,
                self.id
            );
            return false;
        }

        match result {
            Ok(batch) if !batch.is_empty() => {
                self.questions = batch
                    .into_iter()
                    .map(|raw| Question::from_raw(raw, rng))
                    .collect();
                self.current_index = 0;
                self.score = 0;
                self.selected_answer = None;
                self.state = GameState::Playing;
                log::info!(
                    "Session {} playing {} questions ({})",
                    self.id,
                    self.questions.len(),
                    self.mode
                );
            }
            Ok(_) => {
                log::warn!("Session {}: question service returned no questions", self.id);
                self.state = GameState::Error;
            }
            Err(err) => {
                log::warn!(
                    "Session {}: failed to load questions ({}): {}",
                    self.id,
                    err.kind(),
                    err
                );
                self.state = GameState::Error;
            }
        }
        true
    }

    pub fn current_question(&self) -> Option<&Question> {
        match self.state {
            GameState::Playing => self.questions.get(self.current_index),
            _ => None,
        }
    }

    /// Records the first pick for the current question. Later picks, picks
    /// outside `Playing` and texts that are not options are ignored.
    pub fn select_answer(&mut self, option: &str) -> bool {
        if self.selected_answer.is_some() {
            return false;
        }
        let Some(question) = self.current_question() else {
            return false;
        };
        if !question.has_option(option) {
            return false;
        }
        let correct = question.is_correct(option);

        self.selected_answer = Some(option.to_string());
        if correct {
            self.score += 1;
        }
        true
    }

    /// Moves past an answered question. No-op until something is selected.
    pub fn advance(&mut self) -> bool {
        if self.state != GameState::Playing || self.selected_answer.is_none() {
            return false;
        }
        self.selected_answer = None;
        if self.current_index + 1 < self.questions.len() {
            self.current_index += 1;
        } else {
            self.state = GameState::Finished;
            let result = GameResult::new(self.score, self.questions.len());
            log::info!(
                "Session {} finished with {}/{} ({})",
                self.id,
                result.score,
                result.total,
                result.tier
            );
        }
        true
    }

    /// From `Error` or `Finished`, goes back to `Loading` with a fresh ticket for
    /// the same mode.
    pub fn retry(&mut self) -> Option<LoadTicket> {
        match self.state {
            GameState::Error | GameState::Finished => {
                self.attempt += 1;
                self.questions.clear();
                self.current_index = 0;
                self.score = 0;
                self.selected_answer = None;
                self.state = GameState::Loading;
                Some(self.current_ticket())
            }
            GameState::Loading | GameState::Playing => None,
        }
    }

    /// Marks for the current question's options, in display order.
    pub fn option_marks(&self) -> Vec<(&str, OptionMark)> {
        let Some(question) = self.current_question() else {
            return Vec::new();
        };
        question
            .options
            .iter()
            .map(|option| {
                (
                    option.as_str(),
                    option_mark(option, self.selected_answer(), &question.answer),
                )
            })
            .collect()
    }

    pub fn result(&self) -> Option<GameResult> {
        match self.state {
            GameState::Finished => Some(GameResult::new(self.score, self.questions.len())),
            _ => None,
        }
    }
}
