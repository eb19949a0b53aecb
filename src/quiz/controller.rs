//! Owns the session of one game and publishes what the player should see.
//!
//! ```text
//! GameHandle ── GameCommand ──> controller task ──> watch<GameView> ──> renderer
//!                                  │      ^
//!                          spawn   v      │ Loaded { ticket, result }
//!                           QuestionOracle::request_questions
//! ```
//!
//! The task is the only owner of the `Session`. Question requests run in their
//! own tasks and report back tagged with the `LoadTicket` they were issued
//! for, so a batch that arrives after the player left (or retried) is dropped.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::quiz::game::{GameState, LoadTicket, OptionMark, Session, SessionId};
use crate::quiz::oracle::{OracleError, QuestionOracle};
use crate::quiz::score::GameResult;
use crate::quiz::{GameMode, RawQuestion};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameCommand {
    SelectMode(GameMode),
    SelectAnswer(String),
    Advance,
    Retry,
    ReturnToMenu,
}

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("game controller has shut down")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionView {
    pub text: String,
    pub mark: OptionMark,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayingView {
    pub mode: GameMode,
    pub prompt: String,
    pub hint: String,
    pub options: Vec<OptionView>,
    pub score: usize,
    /// 1-based.
    pub position: usize,
    pub total: usize,
    pub revealed: bool,
}

/// Snapshot of a game for rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum GameView {
    Menu,
    Loading { mode: GameMode },
    Error { mode: GameMode },
    Playing(PlayingView),
    Finished { mode: GameMode, result: GameResult },
}

impl GameView {
    pub fn of(session: Option<&Session>) -> GameView {
        let Some(session) = session else {
            return GameView::Menu;
        };
        let mode = session.mode();
        match session.state() {
            GameState::Loading => GameView::Loading { mode },
            GameState::Error => GameView::Error { mode },
            GameState::Finished => match session.result() {
                Some(result) => GameView::Finished { mode, result },
                None => GameView::Error { mode },
            },
            GameState::Playing => match session.current_question() {
                Some(question) => GameView::Playing(PlayingView {
                    mode,
                    prompt: question.prompt.clone(),
                    hint: question.hint.clone(),
                    options: session
                        .option_marks()
                        .into_iter()
                        .map(|(text, mark)| OptionView {
                            text: text.to_string(),
                            mark,
                        })
                        .collect(),
                    score: session.score(),
                    position: session.current_index() + 1,
                    total: session.total(),
                    revealed: session.selected_answer().is_some(),
                }),
                None => GameView::Error { mode },
            },
        }
    }
}

/// Cheap to clone; the game ends once every handle is gone.
#[derive(Clone)]
pub struct GameHandle {
    commands: mpsc::UnboundedSender<GameCommand>,
    view: watch::Receiver<GameView>,
}

impl GameHandle {
    pub fn send(&self, command: GameCommand) -> Result<(), ControllerError> {
        self.commands
            .send(command)
            .map_err(|_| ControllerError::Closed)
    }

    pub fn select_mode(&self, mode: GameMode) -> Result<(), ControllerError> {
        self.send(GameCommand::SelectMode(mode))
    }

    pub fn select_answer(&self, option: impl Into<String>) -> Result<(), ControllerError> {
        self.send(GameCommand::SelectAnswer(option.into()))
    }

    pub fn advance(&self) -> Result<(), ControllerError> {
        self.send(GameCommand::Advance)
    }

    pub fn retry(&self) -> Result<(), ControllerError> {
        self.send(GameCommand::Retry)
    }

    pub fn return_to_menu(&self) -> Result<(), ControllerError> {
        self.send(GameCommand::ReturnToMenu)
    }

    pub fn view(&self) -> GameView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GameView> {
        self.view.clone()
    }
}

pub fn spawn_game(oracle: Arc<dyn QuestionOracle>) -> GameHandle {
    spawn_game_with_rng(oracle, StdRng::from_entropy())
}

pub fn spawn_game_with_rng(oracle: Arc<dyn QuestionOracle>, rng: StdRng) -> GameHandle {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (loaded_tx, loaded_rx) = mpsc::unbounded_channel();
    let (view_tx, view_rx) = watch::channel(GameView::Menu);

    let controller = GameController {
        oracle,
        session: None,
        next_session: 1,
        rng,
        view_tx,
        loaded_tx,
    };
    tokio::spawn(controller.run(commands_rx, loaded_rx));

    GameHandle {
        commands: commands_tx,
        view: view_rx,
    }
}

struct Loaded {
    ticket: LoadTicket,
    result: Result<Vec<RawQuestion>, OracleError>,
}

struct GameController {
    oracle: Arc<dyn QuestionOracle>,
    session: Option<Session>,
    next_session: SessionId,
    rng: StdRng,
    view_tx: watch::Sender<GameView>,
    loaded_tx: mpsc::UnboundedSender<Loaded>,
}

impl GameController {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<GameCommand>,
        mut loaded: mpsc::UnboundedReceiver<Loaded>,
    ) {
        loop {
            tokio::select! {
                biased;

                Some(done) = loaded.recv() => {
                    if self.handle_loaded(done) {
                        self.publish();
                    }
                }
                command = commands.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command) {
                            self.publish();
                        }
                    }
                    None => break,
                },
            }
        }
        log::debug!("Game controller stopped");
    }

    fn publish(&self) {
        self.view_tx.send_replace(GameView::of(self.session.as_ref()));
    }

    fn handle_command(&mut self, command: GameCommand) -> bool {
        match command {
            GameCommand::SelectMode(mode) => {
                if let Some(session) = &self.session {
                    log::debug!("Ignoring mode pick, session {} still open", session.id());
                    return false;
                }
                let id = self.next_session;
                self.next_session += 1;
                let (session, ticket) = Session::new(id, mode);
                self.session = Some(session);
                self.start_load(ticket, mode);
                true
            }
            GameCommand::SelectAnswer(option) => match self.session.as_mut() {
                Some(session) => session.select_answer(&option),
                None => false,
            },
            GameCommand::Advance => match self.session.as_mut() {
                Some(session) => session.advance(),
                None => false,
            },
            GameCommand::Retry => {
                let Some(session) = self.session.as_mut() else {
                    return false;
                };
                let mode = session.mode();
                match session.retry() {
                    Some(ticket) => {
                        self.start_load(ticket, mode);
                        true
                    }
                    None => false,
                }
            }
            GameCommand::ReturnToMenu => self.session.take().is_some(),
        }
    }

    fn handle_loaded(&mut self, done: Loaded) -> bool {
        match self.session.as_mut() {
            Some(session) => session.complete_load(done.ticket, done.result, &mut self.rng),
            None => {
                log::debug!("Discarding question batch {:?}, back at the menu", done.ticket);
                false
            }
        }
    }

    fn start_load(&self, ticket: LoadTicket, mode: GameMode) {
        log::info!("Requesting questions for {} ({:?})", mode, ticket);
        let oracle = self.oracle.clone();
        let loaded = self.loaded_tx.clone();
        tokio::spawn(async move {
            let result = oracle.request_questions(mode).await;
            // The controller may be gone already; nobody is left to tell.
            let _ = loaded.send(Loaded { ticket, result });
        });
    }
}
